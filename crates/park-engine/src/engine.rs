//! Per-lot incremental pricing engine.
//!
//! `PricingEngine` owns the lot map and advances one lot per observation:
//! look up or create the lot, dispatch to its active model, clamp, commit,
//! publish, emit. Updates to a single lot are serialized by that lot's
//! mutex; distinct lots proceed in parallel. The only cross-lot access is the
//! Competitive model's read of neighbor prices, which is a lock-free atomic
//! load and may be stale.

use std::sync::Arc;

use park_common::{Observation, PricedEvent, PricingModelKind};
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::geo::GeoIndex;
use crate::pricing::{
    CompetitorPrice, CompetitorSnapshot, PriceOutcome, PricingContext, PricingModel,
    PricingModels,
};
use crate::state::{EngineState, LotPriceState, LotSlot, MetricsSnapshot};

/// Engine errors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Unknown lot: {0}")]
    UnknownLot(String),

    #[error("Engine is shutting down")]
    ShuttingDown,

    #[error("Invalid configuration: {0:#}")]
    InvalidConfig(anyhow::Error),
}

/// Target of a control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LotSelector {
    /// One lot, which must already have state.
    Lot(String),
    /// Every lot that currently has state.
    All,
}

impl LotSelector {
    pub fn lot(id: impl Into<String>) -> Self {
        LotSelector::Lot(id.into())
    }
}

/// Dynamic pricing engine.
#[derive(Debug)]
pub struct PricingEngine {
    config: EngineConfig,
    models: PricingModels,
    geo: Arc<GeoIndex>,
    state: EngineState,
}

impl PricingEngine {
    /// Create an engine over a prebuilt geo index.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration fails validation.
    pub fn new(config: EngineConfig, geo: Arc<GeoIndex>) -> Result<Self, EngineError> {
        config.validate().map_err(EngineError::InvalidConfig)?;
        let models = PricingModels::from_config(&config);

        info!(
            lots = geo.len(),
            default_model = %config.default_model,
            base_price = %config.pricing.base_price,
            min_price = %config.pricing.min_price,
            max_price = %config.pricing.max_price,
            "Pricing engine created"
        );

        Ok(Self {
            config,
            models,
            geo,
            state: EngineState::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn geo(&self) -> &GeoIndex {
        &self.geo
    }

    /// Apply one observation to its lot and return the priced event.
    ///
    /// Unseen lots start at the base price with the default model. Late
    /// observations are still priced but never move the lot's timestamp
    /// backward.
    ///
    /// # Errors
    ///
    /// Returns `ShuttingDown` once `close` has been called.
    pub fn on_observation(&self, obs: &Observation) -> Result<PricedEvent, EngineError> {
        if !self.state.control.is_accepting() {
            self.state.metrics.inc_rejected();
            return Err(EngineError::ShuttingDown);
        }

        let (slot, created) = self.state.lots.get_or_create(&obs.lot_id, || {
            LotPriceState::new(
                self.config.pricing.base_price,
                self.config.default_model,
                obs.timestamp,
            )
        });
        if created {
            self.state.metrics.inc_lots_created();
            debug!(lot_id = %obs.lot_id, model = %self.config.default_model, "New lot");
        }

        let mut state = slot.lock();
        if state.is_late(obs.timestamp) {
            self.state.metrics.inc_late();
            debug!(
                lot_id = %obs.lot_id,
                timestamp = %obs.timestamp,
                last_updated = %state.last_updated,
                "Late observation"
            );
        }

        let outcome = self.evaluate(state.model, state.price, obs);
        if let Some(clamp) = outcome.clamped {
            self.state.metrics.inc_clamped();
            warn!(
                lot_id = %obs.lot_id,
                model = %state.model,
                raw = %clamp.raw,
                clamped = %clamp.clamped,
                "Price clamped to bounds"
            );
        }

        state.commit(outcome.price, obs.timestamp);
        slot.publish(outcome.price);
        drop(state);

        self.state.metrics.inc_processed();

        Ok(PricedEvent {
            lot_id: obs.lot_id.clone(),
            timestamp: obs.timestamp,
            price: outcome.price,
            occupancy: obs.occupancy,
            capacity: obs.capacity,
            utilization: obs.utilization(),
        })
    }

    fn evaluate(&self, kind: PricingModelKind, current: Decimal, obs: &Observation) -> PriceOutcome {
        match kind {
            PricingModelKind::Competitive => {
                let snapshot = self.build_snapshot(&obs.lot_id);
                let model = self.models.competitive();
                let (adjustment, raw) = model.decide(current, obs.utilization(), &snapshot);
                let (price, clamped) = model.bounds().clamp_checked(raw);
                debug!(
                    lot_id = %obs.lot_id,
                    competitors = snapshot.len(),
                    adjustment = %adjustment,
                    price = %price,
                    "Competitive update"
                );
                PriceOutcome { price, clamped }
            }
            other => self
                .models
                .evaluate(other, current, obs, &PricingContext::default()),
        }
    }

    /// Nearest lots with state, at most `nearby_lots_k`, priced at their
    /// published value. Lots without state do not use up the cap.
    fn build_snapshot(&self, lot_id: &str) -> CompetitorSnapshot {
        let params = self.models.competitive().config();
        let Ok(neighbors) = self
            .geo
            .neighbors_within(lot_id, params.max_distance_km, usize::MAX)
        else {
            return CompetitorSnapshot::empty();
        };

        CompetitorSnapshot::new(
            neighbors
                .into_iter()
                .filter_map(|n| {
                    let price = self.state.lots.published_price(&n.lot_id)?;
                    Some(CompetitorPrice {
                        lot_id: n.lot_id,
                        price,
                        distance_km: n.distance_km,
                    })
                })
                .take(params.nearby_lots_k)
                .collect(),
        )
    }

    /// Switch the model used for subsequent updates. Prices are not recomputed.
    ///
    /// Returns the number of lots changed.
    ///
    /// # Errors
    ///
    /// Returns `UnknownLot` if a single selected lot has no state.
    pub fn set_model(
        &self,
        selector: LotSelector,
        model: PricingModelKind,
    ) -> Result<usize, EngineError> {
        let slots = self.select(&selector)?;
        for (_, slot) in &slots {
            slot.lock().model = model;
        }

        self.state.metrics.add_model_switches(slots.len() as u64);
        info!(selector = ?selector, model = %model, lots = slots.len(), "Pricing model switched");
        Ok(slots.len())
    }

    /// Reset prices to the base price. Timestamps are left unchanged.
    ///
    /// Returns the number of lots reset.
    ///
    /// # Errors
    ///
    /// Returns `UnknownLot` if a single selected lot has no state.
    pub fn reset(&self, selector: LotSelector) -> Result<usize, EngineError> {
        let base = self.config.pricing.base_price;
        let slots = self.select(&selector)?;
        for (_, slot) in &slots {
            let mut state = slot.lock();
            state.price = base;
            slot.publish(base);
        }

        self.state.metrics.add_resets(slots.len() as u64);
        info!(selector = ?selector, lots = slots.len(), base_price = %base, "Prices reset");
        Ok(slots.len())
    }

    fn select(&self, selector: &LotSelector) -> Result<Vec<(String, Arc<LotSlot>)>, EngineError> {
        match selector {
            LotSelector::Lot(id) => self
                .state
                .lots
                .get(id)
                .map(|slot| vec![(id.clone(), slot)])
                .ok_or_else(|| EngineError::UnknownLot(id.clone())),
            LotSelector::All => Ok(self.state.lots.all()),
        }
    }

    /// Copy of a lot's state.
    pub fn lot_state(&self, lot_id: &str) -> Option<LotPriceState> {
        self.state.lots.get(lot_id).map(|slot| slot.read())
    }

    /// A lot's last published price, without locking it.
    pub fn current_price(&self, lot_id: &str) -> Option<Decimal> {
        self.state.lots.published_price(lot_id)
    }

    /// The snapshot the Competitive model would see for this lot right now.
    pub fn competitor_snapshot(&self, lot_id: &str) -> CompetitorSnapshot {
        self.build_snapshot(lot_id)
    }

    /// Every lot's state, sorted by lot id.
    pub fn snapshot(&self) -> Vec<(String, LotPriceState)> {
        let mut all: Vec<(String, LotPriceState)> = self
            .state
            .lots
            .all()
            .into_iter()
            .map(|(id, slot)| {
                let state = slot.read();
                (id, state)
            })
            .collect();
        all.sort_by(|a, b| a.0.cmp(&b.0));
        all
    }

    /// Number of lots with state.
    pub fn lot_count(&self) -> usize {
        self.state.lots.len()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.state.metrics.snapshot()
    }

    /// Stop accepting observations. Lot state stays readable.
    pub fn close(&self) {
        if self.state.control.request_shutdown() {
            info!(lots = self.lot_count(), "Pricing engine closed");
        }
    }

    pub fn is_closed(&self) -> bool {
        !self.state.control.is_accepting()
    }
}
