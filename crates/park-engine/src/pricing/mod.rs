//! Pricing models.
//!
//! Three interchangeable strategies share one contract: given the lot's
//! current price, an observation and a context, return a new price inside the
//! configured bounds. Models are pure; all state lives in the engine.
//!
//! - `baseline`: incremental, `price + alpha * utilization`
//! - `demand`: weighted demand score applied to the fixed base price
//! - `competitive`: adjusts toward or against nearby lots' current prices
//!
//! Models never fail. Out-of-range proposals are clamped, and the clamp is
//! reported through `PriceOutcome` so the caller can log it.

pub mod baseline;
pub mod competitive;
pub mod demand;

use std::fmt;

use park_common::{Observation, PricingModelKind};
use rust_decimal::Decimal;

use crate::config::EngineConfig;

pub use baseline::BaselineModel;
pub use competitive::{CompetitiveAdjustment, CompetitiveModel};
pub use demand::DemandModel;

/// Inclusive price bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceBounds {
    pub min: Decimal,
    pub max: Decimal,
}

impl PriceBounds {
    pub fn new(min: Decimal, max: Decimal) -> Self {
        Self { min, max }
    }

    /// Returns true if `price` lies within the bounds.
    #[inline]
    pub fn contains(&self, price: Decimal) -> bool {
        price >= self.min && price <= self.max
    }

    /// Clamp `price` into the bounds.
    #[inline]
    pub fn clamp(&self, price: Decimal) -> Decimal {
        price.max(self.min).min(self.max)
    }

    /// Clamp `price`, reporting the original value when it moved.
    pub fn clamp_checked(&self, price: Decimal) -> (Decimal, Option<ClampedValue>) {
        let clamped = self.clamp(price);
        if clamped == price {
            (clamped, None)
        } else {
            (
                clamped,
                Some(ClampedValue {
                    raw: price,
                    clamped,
                }),
            )
        }
    }
}

/// Non-fatal warning: a proposed price fell outside the bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClampedValue {
    /// Unclamped proposal.
    pub raw: Decimal,
    /// Value actually used.
    pub clamped: Decimal,
}

impl fmt::Display for ClampedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "price {} clamped to {}", self.raw, self.clamped)
    }
}

/// A nearby lot's current price.
#[derive(Debug, Clone, PartialEq)]
pub struct CompetitorPrice {
    pub lot_id: String,
    pub price: Decimal,
    pub distance_km: f64,
}

/// Current prices of nearby lots, nearest first.
///
/// Built on demand for one Competitive evaluation and then discarded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompetitorSnapshot {
    competitors: Vec<CompetitorPrice>,
}

impl CompetitorSnapshot {
    pub fn new(competitors: Vec<CompetitorPrice>) -> Self {
        Self { competitors }
    }

    /// Snapshot with no competitors.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.competitors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.competitors.len()
    }

    pub fn competitors(&self) -> &[CompetitorPrice] {
        &self.competitors
    }

    /// Mean competitor price.
    pub fn average(&self) -> Option<Decimal> {
        if self.competitors.is_empty() {
            return None;
        }
        let total: Decimal = self.competitors.iter().map(|c| c.price).sum();
        Some(total / Decimal::from(self.competitors.len()))
    }

    /// Cheapest competitor price.
    pub fn min_price(&self) -> Option<Decimal> {
        self.competitors.iter().map(|c| c.price).min()
    }

    /// Most expensive competitor price.
    pub fn max_price(&self) -> Option<Decimal> {
        self.competitors.iter().map(|c| c.price).max()
    }
}

/// Extra inputs a model may need beyond price and observation.
#[derive(Debug, Clone, Copy, Default)]
pub struct PricingContext<'a> {
    /// Neighbor prices. Only read by the Competitive model.
    pub competitors: Option<&'a CompetitorSnapshot>,
}

impl<'a> PricingContext<'a> {
    pub fn with_competitors(snapshot: &'a CompetitorSnapshot) -> Self {
        Self {
            competitors: Some(snapshot),
        }
    }
}

/// Result of one model evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceOutcome {
    /// Price to commit, within bounds.
    pub price: Decimal,
    /// Set when the proposal had to be clamped.
    pub clamped: Option<ClampedValue>,
}

/// A pure pricing strategy.
pub trait PricingModel: Send + Sync {
    /// Which variant this is.
    fn kind(&self) -> PricingModelKind;

    /// Bounds applied to every result.
    fn bounds(&self) -> PriceBounds;

    /// Proposed price before the final clamp.
    fn raw_price(
        &self,
        current_price: Decimal,
        obs: &Observation,
        ctx: &PricingContext<'_>,
    ) -> Decimal;

    /// Evaluate and clamp, keeping track of whether the clamp fired.
    fn evaluate(
        &self,
        current_price: Decimal,
        obs: &Observation,
        ctx: &PricingContext<'_>,
    ) -> PriceOutcome {
        let (price, clamped) = self
            .bounds()
            .clamp_checked(self.raw_price(current_price, obs, ctx));
        PriceOutcome { price, clamped }
    }

    /// New price, always within bounds.
    fn apply(&self, current_price: Decimal, obs: &Observation, ctx: &PricingContext<'_>) -> Decimal {
        self.evaluate(current_price, obs, ctx).price
    }
}

/// The three model variants, dispatched by `PricingModelKind`.
#[derive(Debug, Clone)]
pub struct PricingModels {
    baseline: BaselineModel,
    demand: DemandModel,
    competitive: CompetitiveModel,
}

impl PricingModels {
    /// Build all models from a validated configuration.
    pub fn from_config(config: &EngineConfig) -> Self {
        let bounds = PriceBounds::new(config.pricing.min_price, config.pricing.max_price);
        Self {
            baseline: BaselineModel::new(config.baseline, bounds),
            demand: DemandModel::new(config.demand, config.pricing.base_price, bounds),
            competitive: CompetitiveModel::new(config.competitive, bounds),
        }
    }

    /// The model for a variant.
    pub fn get(&self, kind: PricingModelKind) -> &dyn PricingModel {
        match kind {
            PricingModelKind::Baseline => &self.baseline,
            PricingModelKind::Demand => &self.demand,
            PricingModelKind::Competitive => &self.competitive,
        }
    }

    pub fn competitive(&self) -> &CompetitiveModel {
        &self.competitive
    }

    /// Evaluate the selected model.
    #[inline]
    pub fn evaluate(
        &self,
        kind: PricingModelKind,
        current_price: Decimal,
        obs: &Observation,
        ctx: &PricingContext<'_>,
    ) -> PriceOutcome {
        self.get(kind).evaluate(current_price, obs, ctx)
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::observation;
    use super::*;
    use rust_decimal_macros::dec;

    fn competitors(prices: &[Decimal]) -> CompetitorSnapshot {
        CompetitorSnapshot::new(
            prices
                .iter()
                .enumerate()
                .map(|(i, p)| CompetitorPrice {
                    lot_id: format!("N{}", i),
                    price: *p,
                    distance_km: i as f64 * 0.1,
                })
                .collect(),
        )
    }

    #[test]
    fn test_bounds_clamp_checked() {
        let bounds = PriceBounds::new(dec!(5), dec!(20));
        assert_eq!(bounds.clamp_checked(dec!(12.5)), (dec!(12.5), None));

        let (price, warning) = bounds.clamp_checked(dec!(21.3));
        assert_eq!(price, dec!(20));
        assert_eq!(
            warning,
            Some(ClampedValue {
                raw: dec!(21.3),
                clamped: dec!(20)
            })
        );

        let (price, warning) = bounds.clamp_checked(dec!(-1));
        assert_eq!(price, dec!(5));
        assert!(warning.is_some());
        assert!(bounds.contains(dec!(5)) && bounds.contains(dec!(20)));
    }

    #[test]
    fn test_snapshot_stats() {
        let snap = competitors(&[dec!(10.0), dec!(11.0), dec!(13.0)]);
        assert_eq!(snap.len(), 3);
        assert_eq!(snap.min_price(), Some(dec!(10)));
        assert_eq!(snap.max_price(), Some(dec!(13)));
        assert_eq!(snap.average().unwrap().round_dp(6), dec!(11.333333));

        let empty = CompetitorSnapshot::empty();
        assert!(empty.is_empty());
        assert_eq!(empty.average(), None);
        assert_eq!(empty.min_price(), None);
    }

    #[test]
    fn test_dispatch_by_kind() {
        let models = PricingModels::from_config(&EngineConfig::default());
        for kind in PricingModelKind::ALL {
            assert_eq!(models.get(kind).kind(), kind);
        }

        let obs = observation(50, 100);
        let ctx = PricingContext::default();
        assert_eq!(
            models.evaluate(PricingModelKind::Baseline, dec!(10), &obs, &ctx).price,
            dec!(10.05)
        );
        // No snapshot behaves like an empty one.
        assert_eq!(
            models.evaluate(PricingModelKind::Competitive, dec!(13.7), &obs, &ctx).price,
            dec!(13.7)
        );
    }

    #[test]
    fn test_bounds_hold_for_every_model() {
        let models = PricingModels::from_config(&EngineConfig::default());
        let snap = competitors(&[dec!(5.0), dec!(19.9), dec!(20.0)]);
        let ctx = PricingContext::with_competitors(&snap);

        for kind in PricingModelKind::ALL {
            for occupancy in [0u32, 10, 49, 50, 51, 94, 95, 100, 250, 10_000] {
                for capacity in [0u32, 1, 100] {
                    for current in [dec!(5), dec!(9.99), dec!(15), dec!(20)] {
                        let mut obs = observation(occupancy, capacity);
                        obs.queue_length = occupancy / 3;
                        obs.traffic = Decimal::from(occupancy % 7);
                        obs.is_special_day = occupancy % 2 == 0;
                        let price = models.get(kind).apply(current, &obs, &ctx);
                        assert!(
                            price >= dec!(5) && price <= dec!(20),
                            "{} produced {} for occ={} cap={} cur={}",
                            kind,
                            price,
                            occupancy,
                            capacity,
                            current
                        );
                    }
                }
            }
        }
    }
}
