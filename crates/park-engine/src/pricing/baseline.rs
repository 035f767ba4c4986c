//! Baseline linear model.
//!
//! `new_price = current_price + alpha * utilization`
//!
//! Purely incremental: the result depends on the prior price, never on the
//! base price. For a fixed capacity the increment grows with occupancy.

use park_common::{Observation, PricingModelKind};
use rust_decimal::Decimal;

use super::{PriceBounds, PricingContext, PricingModel};
use crate::config::BaselineConfig;

#[derive(Debug, Clone)]
pub struct BaselineModel {
    config: BaselineConfig,
    bounds: PriceBounds,
}

impl BaselineModel {
    pub fn new(config: BaselineConfig, bounds: PriceBounds) -> Self {
        Self { config, bounds }
    }
}

impl PricingModel for BaselineModel {
    fn kind(&self) -> PricingModelKind {
        PricingModelKind::Baseline
    }

    fn bounds(&self) -> PriceBounds {
        self.bounds
    }

    #[inline]
    fn raw_price(
        &self,
        current_price: Decimal,
        obs: &Observation,
        _ctx: &PricingContext<'_>,
    ) -> Decimal {
        current_price + self.config.alpha * obs.utilization()
    }
}
