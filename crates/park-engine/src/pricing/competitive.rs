//! Competitor-aware model.
//!
//! Branches are checked in order and at most one fires:
//!
//! 1. Nearly full (`utilization >= high_utilization`) and dearer than the
//!    cheapest neighbor: undercut that neighbor.
//! 2. Mostly empty (`utilization <= low_utilization`) and cheaper than the
//!    most expensive neighbor: price just above it.
//! 3. Otherwise revert toward the neighbor average when more than
//!    `reversion_band` away from it.
//!
//! An extreme-utilization lot whose price condition does not hold falls
//! through to step 3. With no neighbors the price is returned unchanged.

use std::fmt;

use park_common::{Observation, PricingModelKind};
use rust_decimal::Decimal;

use super::{CompetitorSnapshot, PriceBounds, PricingContext, PricingModel};
use crate::config::CompetitiveConfig;

/// Which branch produced a Competitive price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompetitiveAdjustment {
    /// Undercut the cheapest neighbor.
    Undercut,
    /// Premium over the most expensive neighbor.
    Premium,
    /// Pulled down toward the average.
    RevertDown,
    /// Pulled up toward the average.
    RevertUp,
    /// Within the band; unchanged.
    Hold,
    /// Empty snapshot; unchanged.
    NoCompetitors,
}

impl CompetitiveAdjustment {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompetitiveAdjustment::Undercut => "undercut",
            CompetitiveAdjustment::Premium => "premium",
            CompetitiveAdjustment::RevertDown => "revert_down",
            CompetitiveAdjustment::RevertUp => "revert_up",
            CompetitiveAdjustment::Hold => "hold",
            CompetitiveAdjustment::NoCompetitors => "no_competitors",
        }
    }
}

impl fmt::Display for CompetitiveAdjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct CompetitiveModel {
    config: CompetitiveConfig,
    bounds: PriceBounds,
}

impl CompetitiveModel {
    pub fn new(config: CompetitiveConfig, bounds: PriceBounds) -> Self {
        Self { config, bounds }
    }

    pub fn config(&self) -> &CompetitiveConfig {
        &self.config
    }

    /// Pick a branch and the proposed price.
    pub fn decide(
        &self,
        current_price: Decimal,
        utilization: Decimal,
        snapshot: &CompetitorSnapshot,
    ) -> (CompetitiveAdjustment, Decimal) {
        let c = &self.config;
        let (Some(avg), Some(min), Some(max)) =
            (snapshot.average(), snapshot.min_price(), snapshot.max_price())
        else {
            return (CompetitiveAdjustment::NoCompetitors, current_price);
        };

        if utilization >= c.high_utilization && current_price > min {
            return (
                CompetitiveAdjustment::Undercut,
                (min * c.undercut_factor).max(self.bounds.min),
            );
        }
        if utilization <= c.low_utilization && current_price < max {
            return (
                CompetitiveAdjustment::Premium,
                (max * c.premium_factor).min(self.bounds.max),
            );
        }

        if current_price > avg * (Decimal::ONE + c.reversion_band) {
            (
                CompetitiveAdjustment::RevertDown,
                (avg * c.undercut_factor).max(self.bounds.min),
            )
        } else if current_price < avg * (Decimal::ONE - c.reversion_band) {
            (
                CompetitiveAdjustment::RevertUp,
                (avg * c.premium_factor).min(self.bounds.max),
            )
        } else {
            (CompetitiveAdjustment::Hold, current_price)
        }
    }
}

impl PricingModel for CompetitiveModel {
    fn kind(&self) -> PricingModelKind {
        PricingModelKind::Competitive
    }

    fn bounds(&self) -> PriceBounds {
        self.bounds
    }

    fn raw_price(
        &self,
        current_price: Decimal,
        obs: &Observation,
        ctx: &PricingContext<'_>,
    ) -> Decimal {
        match ctx.competitors {
            Some(snapshot) => self.decide(current_price, obs.utilization(), snapshot).1,
            None => current_price,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::CompetitorPrice;
    use crate::pricing::test_support::observation;
    use rust_decimal_macros::dec;

    fn model() -> CompetitiveModel {
        CompetitiveModel::new(
            CompetitiveConfig::default(),
            PriceBounds::new(dec!(5), dec!(20)),
        )
    }

    fn snapshot(prices: &[Decimal]) -> CompetitorSnapshot {
        CompetitorSnapshot::new(
            prices
                .iter()
                .enumerate()
                .map(|(i, p)| CompetitorPrice {
                    lot_id: format!("N{}", i),
                    price: *p,
                    distance_km: 0.2 * (i + 1) as f64,
                })
                .collect(),
        )
    }

    #[test]
    fn test_full_lot_undercuts_cheapest() {
        let snap = snapshot(&[dec!(10.0), dec!(11.0), dec!(13.0)]);
        let (adj, price) = model().decide(dec!(12.0), dec!(0.97), &snap);
        assert_eq!(adj, CompetitiveAdjustment::Undercut);
        assert_eq!(price, dec!(9.5));

        let obs = observation(97, 100);
        let ctx = PricingContext::with_competitors(&snap);
        assert_eq!(model().apply(dec!(12.0), &obs, &ctx), dec!(9.5));
    }

    #[test]
    fn test_undercut_floored_at_min() {
        let snap = snapshot(&[dec!(5.0), dec!(6.0)]);
        let (adj, price) = model().decide(dec!(8), dec!(1), &snap);
        assert_eq!(adj, CompetitiveAdjustment::Undercut);
        assert_eq!(price, dec!(5));
    }

    #[test]
    fn test_empty_lot_prices_above_dearest() {
        let snap = snapshot(&[dec!(10.0), dec!(11.0), dec!(13.0)]);
        let (adj, price) = model().decide(dec!(9.0), dec!(0.3), &snap);
        assert_eq!(adj, CompetitiveAdjustment::Premium);
        assert_eq!(price, dec!(13.65));
    }

    #[test]
    fn test_premium_capped_at_max() {
        let snap = snapshot(&[dec!(19.8)]);
        let (_, price) = model().decide(dec!(10), dec!(0.1), &snap);
        assert_eq!(price, dec!(20));
    }

    #[test]
    fn test_full_lot_already_cheapest_falls_through() {
        // 8 <= min(10), average 12 -> 8 < 12 * 0.9 -> 12 * 1.05
        let snap = snapshot(&[dec!(10.0), dec!(12.0), dec!(14.0)]);
        let (adj, price) = model().decide(dec!(8.0), dec!(0.99), &snap);
        assert_eq!(adj, CompetitiveAdjustment::RevertUp);
        assert_eq!(price, dec!(12.6));
    }

    #[test]
    fn test_reverts_down_toward_average() {
        let snap = snapshot(&[dec!(10.0), dec!(10.0)]);
        let (adj, price) = model().decide(dec!(11.5), dec!(0.7), &snap);
        assert_eq!(adj, CompetitiveAdjustment::RevertDown);
        assert_eq!(price, dec!(9.5));
    }

    #[test]
    fn test_holds_within_band() {
        let snap = snapshot(&[dec!(10.0), dec!(10.0)]);
        for current in [dec!(9.0), dec!(10.0), dec!(11.0)] {
            let (adj, price) = model().decide(current, dec!(0.7), &snap);
            assert_eq!(adj, CompetitiveAdjustment::Hold);
            assert_eq!(price, current);
        }
    }

    #[test]
    fn test_no_competitors_is_identity() {
        let m = model();
        let empty = CompetitorSnapshot::empty();
        for utilization in [dec!(0), dec!(0.5), dec!(0.97), dec!(3)] {
            let (adj, price) = m.decide(dec!(14.2), utilization, &empty);
            assert_eq!(adj, CompetitiveAdjustment::NoCompetitors);
            assert_eq!(price, dec!(14.2));
        }

        let ctx = PricingContext::with_competitors(&empty);
        assert_eq!(m.apply(dec!(14.2), &observation(99, 100), &ctx), dec!(14.2));
        assert_eq!(
            m.apply(dec!(14.2), &observation(99, 100), &PricingContext::default()),
            dec!(14.2)
        );
    }

    #[test]
    fn test_adjustment_labels() {
        assert_eq!(CompetitiveAdjustment::RevertDown.to_string(), "revert_down");
        assert_eq!(CompetitiveAdjustment::NoCompetitors.as_str(), "no_competitors");
    }
}
