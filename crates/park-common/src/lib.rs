//! Shared types for the dynamic parking pricing engine.
//!
//! This crate contains:
//! - Observation input types (wire record and validated core form)
//! - Priced output events
//! - Pricing model selector and vehicle weight table
//! - Static lot locations

pub mod types;

pub use types::*;
