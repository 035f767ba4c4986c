//! Configuration for park-engine.
//!
//! Supports loading from TOML file with environment variable and CLI
//! overrides. Every pricing constant is overridable at startup and immutable
//! afterwards.

use std::path::Path;

use anyhow::{bail, Context, Result};
use park_common::{LotLocation, PricingModelKind};
use rust_decimal::Decimal;
use serde::Deserialize;

/// Top-level configuration for park-engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Logging level.
    pub log_level: String,

    /// Model assigned to a lot on its first observation.
    pub default_model: PricingModelKind,

    /// Price anchor and bounds.
    pub pricing: PricingConfig,

    /// Baseline model parameters.
    pub baseline: BaselineConfig,

    /// Demand model parameters.
    pub demand: DemandConfig,

    /// Competitive model parameters.
    pub competitive: CompetitiveConfig,

    /// Geospatial parameters.
    pub geo: GeoConfig,

    /// Worker pool parameters.
    pub runtime: RuntimeConfig,

    /// Static lot coordinates used to build the neighbor index.
    pub lots: Vec<LotLocation>,
}

/// Price anchor and hard bounds shared by every model.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingConfig {
    /// Initial price of a lot and the Demand model's anchor.
    pub base_price: Decimal,

    /// Lower bound on any committed price.
    pub min_price: Decimal,

    /// Upper bound on any committed price.
    pub max_price: Decimal,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            base_price: Decimal::new(10, 0), // $10.00
            min_price: Decimal::new(5, 0),   // $5.00
            max_price: Decimal::new(20, 0),  // $20.00
        }
    }
}

impl PricingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_price <= Decimal::ZERO {
            bail!("min_price must be positive");
        }
        if self.min_price > self.max_price {
            bail!("min_price cannot exceed max_price");
        }
        if self.base_price < self.min_price || self.base_price > self.max_price {
            bail!("base_price must lie between min_price and max_price");
        }
        Ok(())
    }
}

/// Baseline model: `price += alpha * utilization`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BaselineConfig {
    /// Price increment per unit of utilization.
    pub alpha: Decimal,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            alpha: Decimal::new(1, 1), // 0.1
        }
    }
}

impl BaselineConfig {
    pub fn validate(&self) -> Result<()> {
        if self.alpha < Decimal::ZERO {
            bail!("baseline.alpha must not be negative");
        }
        Ok(())
    }
}

/// Demand model coefficients.
///
/// `d = alpha*u + beta*queue - gamma*traffic + delta*special + epsilon*weight`
/// and `price = base * (1 + lambda * clamp(d / normalizer, 0, 1))`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DemandConfig {
    /// Utilization weight.
    pub alpha: Decimal,
    /// Queue length weight.
    pub beta: Decimal,
    /// Traffic weight (subtracted).
    pub gamma: Decimal,
    /// Special day weight.
    pub delta: Decimal,
    /// Vehicle weight coefficient.
    pub epsilon: Decimal,
    /// Maximum relative surcharge over the base price.
    pub lambda: Decimal,
    /// Divisor mapping the raw score into [0, 1].
    pub normalizer: Decimal,
}

impl Default for DemandConfig {
    fn default() -> Self {
        Self {
            alpha: Decimal::new(6, 1),       // 0.6
            beta: Decimal::new(3, 1),        // 0.3
            gamma: Decimal::new(2, 1),       // 0.2
            delta: Decimal::new(4, 1),       // 0.4
            epsilon: Decimal::new(1, 1),     // 0.1
            lambda: Decimal::new(2, 1),      // 0.2
            normalizer: Decimal::new(10, 0), // 10
        }
    }
}

impl DemandConfig {
    pub fn validate(&self) -> Result<()> {
        if self.normalizer <= Decimal::ZERO {
            bail!("demand.normalizer must be positive");
        }
        if self.lambda < Decimal::ZERO {
            bail!("demand.lambda must not be negative");
        }
        Ok(())
    }
}

/// Competitive model parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CompetitiveConfig {
    /// Maximum number of competitors considered.
    pub nearby_lots_k: usize,

    /// Competitor search radius (km).
    pub max_distance_km: f64,

    /// Utilization at or above which the lot undercuts the cheapest rival.
    pub high_utilization: Decimal,

    /// Utilization at or below which the lot moves above the priciest rival.
    pub low_utilization: Decimal,

    /// Factor applied to the competitor min (high) or average (reversion) price.
    pub undercut_factor: Decimal,

    /// Factor applied to the competitor max (low) or average (reversion) price.
    pub premium_factor: Decimal,

    /// Relative distance from the competitor average that triggers reversion.
    pub reversion_band: Decimal,
}

impl Default for CompetitiveConfig {
    fn default() -> Self {
        Self {
            nearby_lots_k: 3,
            max_distance_km: 2.0,
            high_utilization: Decimal::new(95, 2), // 0.95
            low_utilization: Decimal::new(5, 1),   // 0.5
            undercut_factor: Decimal::new(95, 2),  // 0.95
            premium_factor: Decimal::new(105, 2),  // 1.05
            reversion_band: Decimal::new(1, 1),    // 0.1
        }
    }
}

impl CompetitiveConfig {
    pub fn validate(&self) -> Result<()> {
        if self.nearby_lots_k == 0 {
            bail!("competitive.nearby_lots_k must be at least 1");
        }
        if !self.max_distance_km.is_finite() || self.max_distance_km <= 0.0 {
            bail!("competitive.max_distance_km must be positive");
        }
        if self.low_utilization > self.high_utilization {
            bail!("competitive.low_utilization cannot exceed high_utilization");
        }
        if self.undercut_factor <= Decimal::ZERO || self.premium_factor <= Decimal::ZERO {
            bail!("competitive price factors must be positive");
        }
        if self.reversion_band < Decimal::ZERO || self.reversion_band >= Decimal::ONE {
            bail!("competitive.reversion_band must be in [0, 1)");
        }
        Ok(())
    }
}

/// Geospatial parameters.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoConfig {
    /// Sphere radius used by the haversine distance (km).
    pub earth_radius_km: f64,
}

impl Default for GeoConfig {
    fn default() -> Self {
        Self {
            earth_radius_km: 6371.0,
        }
    }
}

/// Worker pool parameters for the pricing service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Number of shard workers. Each lot is pinned to one worker.
    pub workers: usize,

    /// Bounded queue capacity per worker.
    pub queue_capacity: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            default_model: PricingModelKind::Demand,
            pricing: PricingConfig::default(),
            baseline: BaselineConfig::default(),
            demand: DemandConfig::default(),
            competitive: CompetitiveConfig::default(),
            geo: GeoConfig::default(),
            runtime: RuntimeConfig::default(),
            lots: Vec::new(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML string.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: TomlConfig = toml::from_str(content).context("Failed to parse TOML config")?;
        Self::try_from(file)
    }

    /// Apply environment variable overrides.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary variable lookup.
    ///
    /// Unparseable values are ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(level) = lookup("PARK_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(model) = lookup("PARK_DEFAULT_MODEL")
            && let Ok(kind) = model.parse::<PricingModelKind>()
        {
            self.default_model = kind;
        }
        if let Some(workers) = lookup("PARK_WORKERS")
            && let Ok(n) = workers.trim().parse::<usize>()
        {
            self.runtime.workers = n;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_cli_overrides(
        &mut self,
        model: Option<String>,
        workers: Option<usize>,
        log_level: Option<String>,
    ) {
        if let Some(model_str) = model
            && let Ok(kind) = model_str.parse::<PricingModelKind>()
        {
            self.default_model = kind;
        }

        if let Some(n) = workers {
            self.runtime.workers = n;
        }

        if let Some(level) = log_level {
            self.log_level = level;
        }
    }

    /// Validate configuration and return errors for invalid values.
    pub fn validate(&self) -> Result<()> {
        self.pricing.validate()?;
        self.baseline.validate()?;
        self.demand.validate()?;
        self.competitive.validate()?;

        if !self.geo.earth_radius_km.is_finite() || self.geo.earth_radius_km <= 0.0 {
            bail!("geo.earth_radius_km must be positive");
        }
        if self.runtime.workers == 0 {
            bail!("runtime.workers must be at least 1");
        }
        if self.runtime.queue_capacity == 0 {
            bail!("runtime.queue_capacity must be at least 1");
        }

        Ok(())
    }
}

// ============================================================================
// TOML deserialization structures
// ============================================================================

#[derive(Debug, Deserialize)]
struct TomlConfig {
    #[serde(default)]
    general: GeneralToml,
    #[serde(default)]
    pricing: PricingToml,
    #[serde(default)]
    baseline: BaselineToml,
    #[serde(default)]
    demand: DemandToml,
    #[serde(default)]
    competitive: CompetitiveToml,
    #[serde(default)]
    geo: GeoToml,
    #[serde(default)]
    runtime: RuntimeToml,
    #[serde(default)]
    lots: Vec<LotLocation>,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GeneralToml {
    log_level: String,
    default_model: String,
}

impl Default for GeneralToml {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            default_model: "demand".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct PricingToml {
    base_price: f64,
    min_price: f64,
    max_price: f64,
}

impl Default for PricingToml {
    fn default() -> Self {
        Self {
            base_price: 10.0,
            min_price: 5.0,
            max_price: 20.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct BaselineToml {
    alpha: f64,
}

impl Default for BaselineToml {
    fn default() -> Self {
        Self { alpha: 0.1 }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct DemandToml {
    alpha: f64,
    beta: f64,
    gamma: f64,
    delta: f64,
    epsilon: f64,
    lambda: f64,
    normalizer: f64,
}

impl Default for DemandToml {
    fn default() -> Self {
        Self {
            alpha: 0.6,
            beta: 0.3,
            gamma: 0.2,
            delta: 0.4,
            epsilon: 0.1,
            lambda: 0.2,
            normalizer: 10.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct CompetitiveToml {
    nearby_lots_k: usize,
    max_distance_km: f64,
    high_utilization: f64,
    low_utilization: f64,
    undercut_factor: f64,
    premium_factor: f64,
    reversion_band: f64,
}

impl Default for CompetitiveToml {
    fn default() -> Self {
        Self {
            nearby_lots_k: 3,
            max_distance_km: 2.0,
            high_utilization: 0.95,
            low_utilization: 0.5,
            undercut_factor: 0.95,
            premium_factor: 1.05,
            reversion_band: 0.1,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct GeoToml {
    earth_radius_km: f64,
}

impl Default for GeoToml {
    fn default() -> Self {
        Self {
            earth_radius_km: 6371.0,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
struct RuntimeToml {
    workers: usize,
    queue_capacity: usize,
}

impl Default for RuntimeToml {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_capacity: 1024,
        }
    }
}

/// Convert f64 to Decimal.
fn f64_to_decimal(val: f64) -> Decimal {
    Decimal::try_from(val).unwrap_or(Decimal::ZERO)
}

impl TryFrom<TomlConfig> for EngineConfig {
    type Error = anyhow::Error;

    fn try_from(toml: TomlConfig) -> Result<Self> {
        let default_model = toml
            .general
            .default_model
            .parse::<PricingModelKind>()
            .map_err(anyhow::Error::msg)?;

        Ok(Self {
            log_level: toml.general.log_level,
            default_model,
            pricing: PricingConfig {
                base_price: f64_to_decimal(toml.pricing.base_price),
                min_price: f64_to_decimal(toml.pricing.min_price),
                max_price: f64_to_decimal(toml.pricing.max_price),
            },
            baseline: BaselineConfig {
                alpha: f64_to_decimal(toml.baseline.alpha),
            },
            demand: DemandConfig {
                alpha: f64_to_decimal(toml.demand.alpha),
                beta: f64_to_decimal(toml.demand.beta),
                gamma: f64_to_decimal(toml.demand.gamma),
                delta: f64_to_decimal(toml.demand.delta),
                epsilon: f64_to_decimal(toml.demand.epsilon),
                lambda: f64_to_decimal(toml.demand.lambda),
                normalizer: f64_to_decimal(toml.demand.normalizer),
            },
            competitive: CompetitiveConfig {
                nearby_lots_k: toml.competitive.nearby_lots_k,
                max_distance_km: toml.competitive.max_distance_km,
                high_utilization: f64_to_decimal(toml.competitive.high_utilization),
                low_utilization: f64_to_decimal(toml.competitive.low_utilization),
                undercut_factor: f64_to_decimal(toml.competitive.undercut_factor),
                premium_factor: f64_to_decimal(toml.competitive.premium_factor),
                reversion_band: f64_to_decimal(toml.competitive.reversion_band),
            },
            geo: GeoConfig {
                earth_radius_km: toml.geo.earth_radius_km,
            },
            runtime: RuntimeConfig {
                workers: toml.runtime.workers,
                queue_capacity: toml.runtime.queue_capacity,
            },
            lots: toml.lots,
        })
    }
}
