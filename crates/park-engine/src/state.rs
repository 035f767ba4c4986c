//! Shared engine state with lock-free reads.
//!
//! Each lot lives in its own `LotSlot`: a mutex that serializes updates to
//! that lot only, plus an atomic copy of the committed price that other
//! lots read when building a competitor snapshot. No lock ever spans two
//! lots.
//!
//! ## Locking rules
//!
//! - Never hold a `DashMap` guard while locking a slot. Clone the `Arc` out
//!   of the map first.
//! - The published price is stored after the slot state is committed, so a
//!   reader never observes a price that was not committed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use park_common::PricingModelKind;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::Serialize;

/// Decimal places kept in the published price.
pub const PUBLISHED_PRICE_SCALE: u32 = 6;

const MICROS_PER_UNIT: i64 = 1_000_000;

/// Mutable pricing state of one lot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LotPriceState {
    /// Current price, always within the configured bounds.
    pub price: Decimal,
    /// Model used for the next update.
    pub model: PricingModelKind,
    /// Latest observation timestamp applied. Never moves backward.
    pub last_updated: DateTime<Utc>,
    /// Observations applied since creation.
    pub update_count: u64,
}

impl LotPriceState {
    pub fn new(price: Decimal, model: PricingModelKind, created_at: DateTime<Utc>) -> Self {
        Self {
            price,
            model,
            last_updated: created_at,
            update_count: 0,
        }
    }

    /// Returns true if `timestamp` is older than the last applied observation.
    #[inline]
    pub fn is_late(&self, timestamp: DateTime<Utc>) -> bool {
        timestamp < self.last_updated
    }

    /// Commit a computed price.
    pub fn commit(&mut self, price: Decimal, timestamp: DateTime<Utc>) {
        self.price = price;
        self.last_updated = self.last_updated.max(timestamp);
        self.update_count += 1;
    }
}

/// One lot's state plus its lock-free published price.
#[derive(Debug)]
pub struct LotSlot {
    state: Mutex<LotPriceState>,
    /// Committed price in micro-units (6 decimal places).
    published_micros: AtomicI64,
}

impl LotSlot {
    pub fn new(state: LotPriceState) -> Self {
        let slot = Self {
            published_micros: AtomicI64::new(0),
            state: Mutex::new(state),
        };
        let price = slot.state.lock().price;
        slot.publish(price);
        slot
    }

    /// Lock this lot for an update.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, LotPriceState> {
        self.state.lock()
    }

    /// Copy of the current state.
    pub fn read(&self) -> LotPriceState {
        self.state.lock().clone()
    }

    /// Last committed price without taking the lock.
    #[inline]
    pub fn published_price(&self) -> Decimal {
        Decimal::new(
            self.published_micros.load(Ordering::Acquire),
            PUBLISHED_PRICE_SCALE,
        )
    }

    /// Store a committed price for lock-free readers.
    #[inline]
    pub fn publish(&self, price: Decimal) {
        let micros = (price.round_dp(PUBLISHED_PRICE_SCALE) * Decimal::from(MICROS_PER_UNIT))
            .to_i64();
        // Out of range only for prices beyond i64 micro-units.
        if let Some(micros) = micros {
            self.published_micros.store(micros, Ordering::Release);
        }
    }
}

/// All known lots, keyed by lot id.
#[derive(Debug, Default)]
pub struct LotTable {
    slots: DashMap<String, Arc<LotSlot>>,
}

impl LotTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot for a known lot.
    #[inline]
    pub fn get(&self, lot_id: &str) -> Option<Arc<LotSlot>> {
        self.slots.get(lot_id).map(|r| Arc::clone(r.value()))
    }

    /// Slot for a lot, creating it with `init` on first sight.
    ///
    /// Returns the slot and whether it was created by this call.
    pub fn get_or_create<F>(&self, lot_id: &str, init: F) -> (Arc<LotSlot>, bool)
    where
        F: FnOnce() -> LotPriceState,
    {
        if let Some(slot) = self.get(lot_id) {
            return (slot, false);
        }
        let mut created = false;
        let slot = self
            .slots
            .entry(lot_id.to_string())
            .or_insert_with(|| {
                created = true;
                Arc::new(LotSlot::new(init()))
            })
            .value()
            .clone();
        (slot, created)
    }

    /// Published price of a known lot.
    #[inline]
    pub fn published_price(&self, lot_id: &str) -> Option<Decimal> {
        self.slots.get(lot_id).map(|r| r.value().published_price())
    }

    /// Every slot, collected so no map guard outlives the call.
    pub fn all(&self) -> Vec<(String, Arc<LotSlot>)> {
        self.slots
            .iter()
            .map(|r| (r.key().clone(), Arc::clone(r.value())))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

/// Lifecycle flags.
#[derive(Debug)]
pub struct ControlFlags {
    /// New observations are accepted. Cleared once on shutdown.
    pub accepting: AtomicBool,
}

impl ControlFlags {
    /// Create new control flags, accepting input.
    pub fn new() -> Self {
        Self {
            accepting: AtomicBool::new(true),
        }
    }

    #[inline]
    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Stop accepting new observations.
    ///
    /// Returns true only for the call that performed the transition.
    #[inline]
    pub fn request_shutdown(&self) -> bool {
        self.accepting.swap(false, Ordering::AcqRel)
    }
}

impl Default for ControlFlags {
    fn default() -> Self {
        Self::new()
    }
}

/// Metrics counters for observability.
///
/// Uses relaxed ordering since exact counts aren't critical.
#[derive(Debug, Default)]
pub struct MetricsCounters {
    /// Observations priced.
    pub observations_processed: AtomicU64,

    /// Observations older than their lot's last update.
    pub late_observations: AtomicU64,

    /// Prices that had to be clamped into bounds.
    pub clamped_prices: AtomicU64,

    /// Lots seen for the first time.
    pub lots_created: AtomicU64,

    /// Lots reset to the base price.
    pub resets: AtomicU64,

    /// Per-lot model changes.
    pub model_switches: AtomicU64,

    /// Observations refused after shutdown.
    pub rejected_observations: AtomicU64,
}

impl MetricsCounters {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn inc_processed(&self) {
        self.observations_processed.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_late(&self) {
        self.late_observations.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_clamped(&self) {
        self.clamped_prices.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_lots_created(&self) {
        self.lots_created.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_resets(&self, n: u64) {
        self.resets.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn add_model_switches(&self, n: u64) {
        self.model_switches.fetch_add(n, Ordering::Relaxed);
    }

    #[inline]
    pub fn inc_rejected(&self) {
        self.rejected_observations.fetch_add(1, Ordering::Relaxed);
    }

    /// Get a snapshot of all metrics.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            observations_processed: self.observations_processed.load(Ordering::Relaxed),
            late_observations: self.late_observations.load(Ordering::Relaxed),
            clamped_prices: self.clamped_prices.load(Ordering::Relaxed),
            lots_created: self.lots_created.load(Ordering::Relaxed),
            resets: self.resets.load(Ordering::Relaxed),
            model_switches: self.model_switches.load(Ordering::Relaxed),
            rejected_observations: self.rejected_observations.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub observations_processed: u64,
    pub late_observations: u64,
    pub clamped_prices: u64,
    pub lots_created: u64,
    pub resets: u64,
    pub model_switches: u64,
    pub rejected_observations: u64,
}

/// Shared state of one engine.
#[derive(Debug, Default)]
pub struct EngineState {
    pub lots: LotTable,
    pub control: ControlFlags,
    pub metrics: MetricsCounters,
}

impl EngineState {
    pub fn new() -> Self {
        Self::default()
    }
}
