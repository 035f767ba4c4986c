//! Demand-based model.
//!
//! Computes a linear demand score
//!
//! ```text
//! d = alpha*utilization + beta*queue - gamma*traffic + delta*special + epsilon*vehicle_weight
//! ```
//!
//! normalizes it with `clamp(d / normalizer, 0, 1)` and prices from the fixed
//! base: `base * (1 + lambda * d_norm)`. The current price is ignored, so
//! two lots with identical observations always get the same price.
//!
//! Traffic carries a negative weight: heavy congestion around a lot is
//! treated as suppressing further arrivals.

use park_common::{Observation, PricingModelKind};
use rust_decimal::Decimal;

use super::{PriceBounds, PricingContext, PricingModel};
use crate::config::DemandConfig;

#[derive(Debug, Clone)]
pub struct DemandModel {
    config: DemandConfig,
    base_price: Decimal,
    bounds: PriceBounds,
}

impl DemandModel {
    pub fn new(config: DemandConfig, base_price: Decimal, bounds: PriceBounds) -> Self {
        Self {
            config,
            base_price,
            bounds,
        }
    }

    /// Raw weighted demand score.
    pub fn demand_score(&self, obs: &Observation) -> Decimal {
        let c = &self.config;
        let special = if obs.is_special_day {
            Decimal::ONE
        } else {
            Decimal::ZERO
        };

        c.alpha * obs.utilization() + c.beta * Decimal::from(obs.queue_length)
            - c.gamma * obs.traffic
            + c.delta * special
            + c.epsilon * obs.vehicle_weight
    }

    /// Demand score mapped into [0, 1].
    pub fn normalized_demand(&self, obs: &Observation) -> Decimal {
        (self.demand_score(obs) / self.config.normalizer).clamp(Decimal::ZERO, Decimal::ONE)
    }
}

impl PricingModel for DemandModel {
    fn kind(&self) -> PricingModelKind {
        PricingModelKind::Demand
    }

    fn bounds(&self) -> PriceBounds {
        self.bounds
    }

    fn raw_price(
        &self,
        _current_price: Decimal,
        obs: &Observation,
        _ctx: &PricingContext<'_>,
    ) -> Decimal {
        self.base_price * (Decimal::ONE + self.config.lambda * self.normalized_demand(obs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pricing::test_support::observation;
    use rust_decimal_macros::dec;

    fn model() -> DemandModel {
        DemandModel::new(
            DemandConfig::default(),
            dec!(10),
            PriceBounds::new(dec!(5), dec!(20)),
        )
    }

    fn busy_special_day() -> Observation {
        let mut obs = observation(80, 100);
        obs.queue_length = 2;
        obs.traffic = dec!(0.5);
        obs.is_special_day = true;
        obs.vehicle_weight = dec!(1.0);
        obs
    }

    #[test]
    fn test_reference_scenario() {
        // 0.6*0.8 + 0.3*2 - 0.2*0.5 + 0.4*1 + 0.1*1 = 1.48
        let m = model();
        let obs = busy_special_day();
        assert_eq!(m.demand_score(&obs), dec!(1.48));
        assert_eq!(m.normalized_demand(&obs), dec!(0.148));
        assert_eq!(m.apply(dec!(10), &obs, &PricingContext::default()), dec!(10.296));
    }

    #[test]
    fn test_ignores_current_price() {
        let m = model();
        let obs = busy_special_day();
        let ctx = PricingContext::default();
        assert_eq!(m.apply(dec!(5), &obs, &ctx), m.apply(dec!(19.5), &obs, &ctx));
    }

    #[test]
    fn test_negative_score_floors_at_base() {
        let mut obs = observation(0, 100);
        obs.traffic = dec!(10);
        let m = model();
        assert!(m.demand_score(&obs) < Decimal::ZERO);
        assert_eq!(m.normalized_demand(&obs), Decimal::ZERO);
        assert_eq!(m.apply(dec!(17), &obs, &PricingContext::default()), dec!(10));
    }

    #[test]
    fn test_saturated_score_caps_surcharge() {
        let mut obs = observation(100, 100);
        obs.queue_length = 200;
        let m = model();
        assert_eq!(m.normalized_demand(&obs), Decimal::ONE);
        // 10 * (1 + 0.2)
        assert_eq!(m.apply(dec!(10), &obs, &PricingContext::default()), dec!(12));
    }

    #[test]
    fn test_traffic_suppresses_demand() {
        let m = model();
        let calm = busy_special_day();
        let mut jammed = busy_special_day();
        jammed.traffic = dec!(3);
        assert!(m.demand_score(&jammed) < m.demand_score(&calm));
    }

    #[test]
    fn test_result_clamped_to_bounds() {
        let m = DemandModel::new(
            DemandConfig {
                lambda: dec!(5),
                ..DemandConfig::default()
            },
            dec!(10),
            PriceBounds::new(dec!(5), dec!(20)),
        );
        let mut obs = observation(100, 100);
        obs.queue_length = 100;
        let outcome = m.evaluate(dec!(10), &obs, &PricingContext::default());
        assert_eq!(outcome.price, dec!(20));
        assert_eq!(outcome.clamped.map(|c| c.raw), Some(dec!(60)));
    }
}
