//! Dynamic parking-lot pricing engine.
//!
//! Consumes a stream of lot occupancy observations and keeps a current price
//! per lot, advanced incrementally by one of three interchangeable pricing
//! models. The Competitive model reads nearby lots' prices through a
//! precomputed geospatial index.
//!
//! ## Architecture
//!
//! - **Per-lot serialization**: each lot's state sits behind its own mutex;
//!   the service routes every lot to a single worker
//! - **Lock-free competitor reads**: committed prices are published to an
//!   atomic that neighbors read without locking
//! - **Pure models**: pricing strategies hold only configuration
//!
//! ## Modules
//!
//! - `config`: Configuration loading and validation
//! - `geo`: Great-circle neighbor index over static lot coordinates
//! - `pricing`: Baseline, Demand and Competitive models
//! - `state`: Per-lot state, control flags and metrics
//! - `engine`: The keyed update protocol
//! - `data_source`: Observation sources (in-memory replay, JSON lines)
//! - `sink`: Priced event sinks (channel, JSON lines)
//! - `service`: Sharded async workers, graceful drain, source pump

pub mod config;
pub mod data_source;
pub mod engine;
pub mod geo;
pub mod pricing;
pub mod service;
pub mod sink;
pub mod state;

pub use config::{
    BaselineConfig, CompetitiveConfig, DemandConfig, EngineConfig, GeoConfig, PricingConfig,
    RuntimeConfig,
};
pub use data_source::{JsonLinesSource, ObservationSource, SourceError, VecReplaySource};
pub use engine::{EngineError, LotSelector, PricingEngine};
pub use geo::{GeoIndex, GeoIndexError, Neighbor, haversine_km};
pub use pricing::{
    BaselineModel, ClampedValue, CompetitiveAdjustment, CompetitiveModel, CompetitorPrice,
    CompetitorSnapshot, DemandModel, PriceBounds, PriceOutcome, PricingContext, PricingModel,
    PricingModels,
};
pub use service::{PricingService, PumpReport, ServiceError, ServiceReport, pump};
pub use sink::{ChannelSink, JsonLinesSink, PricedEventSink, SinkError};
pub use state::{LotPriceState, MetricsSnapshot};
