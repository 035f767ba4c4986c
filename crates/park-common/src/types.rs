//! Shared types for the dynamic parking pricing engine.
//!
//! All prices, coefficients and derived ratios use `rust_decimal::Decimal`.
//! Geographic coordinates and distances stay `f64`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Pricing strategy applied to a lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PricingModelKind {
    /// Incremental utilization-based pricing.
    Baseline,
    /// Multi-factor demand score, recomputed from the base price.
    #[default]
    Demand,
    /// Competitor-aware adjustment against nearby lots.
    Competitive,
}

impl PricingModelKind {
    /// All variants, in dashboard order.
    pub const ALL: [PricingModelKind; 3] = [
        PricingModelKind::Baseline,
        PricingModelKind::Demand,
        PricingModelKind::Competitive,
    ];

    /// Returns the lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            PricingModelKind::Baseline => "baseline",
            PricingModelKind::Demand => "demand",
            PricingModelKind::Competitive => "competitive",
        }
    }
}

impl std::fmt::Display for PricingModelKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PricingModelKind {
    type Err = String;

    /// Accepts the model name or its legacy numeric code (1, 2, 3).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "baseline" | "linear" | "1" => Ok(PricingModelKind::Baseline),
            "demand" | "demand-based" | "2" => Ok(PricingModelKind::Demand),
            "competitive" | "competition" | "3" => Ok(PricingModelKind::Competitive),
            _ => Err(format!("Unknown pricing model: {}", s)),
        }
    }
}

/// Vehicle class reported with an observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VehicleType {
    Car,
    Bike,
    Truck,
    /// Any label outside the weight table.
    Other,
}

impl VehicleType {
    /// Maps a free-form label to a vehicle type. Unknown labels map to `Other`.
    pub fn from_label(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "car" => VehicleType::Car,
            "bike" => VehicleType::Bike,
            "truck" => VehicleType::Truck,
            _ => VehicleType::Other,
        }
    }

    /// Demand weight of this vehicle class.
    pub fn weight(&self) -> Decimal {
        match self {
            VehicleType::Car => Decimal::ONE,
            VehicleType::Bike => Decimal::new(8, 1),
            VehicleType::Truck => Decimal::new(12, 1),
            VehicleType::Other => Decimal::ONE,
        }
    }
}

/// Static coordinates of a parking lot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LotLocation {
    /// Lot identifier.
    pub id: String,
    /// Latitude in degrees.
    pub latitude: f64,
    /// Longitude in degrees.
    pub longitude: f64,
}

impl LotLocation {
    pub fn new(id: impl Into<String>, latitude: f64, longitude: f64) -> Self {
        Self {
            id: id.into(),
            latitude,
            longitude,
        }
    }
}

/// One timestamped reading of a lot, as consumed by the pricing core.
///
/// Every field is required; defaulting of missing feed columns happens
/// before a record becomes an `Observation`.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    /// Lot identifier.
    pub lot_id: String,
    /// Reading timestamp.
    pub timestamp: DateTime<Utc>,
    /// Vehicles currently parked. May exceed capacity.
    pub occupancy: u32,
    /// Lot capacity. Zero is floored to one wherever it divides.
    pub capacity: u32,
    /// Vehicles waiting to enter.
    pub queue_length: u32,
    /// Normalized nearby traffic level (non-negative).
    pub traffic: Decimal,
    /// Holiday or event day.
    pub is_special_day: bool,
    /// Weight of the arriving vehicle class.
    pub vehicle_weight: Decimal,
}

impl Observation {
    /// Occupancy over capacity, with capacity floored at one.
    ///
    /// Values above 1.0 are valid (over-full lot).
    #[inline]
    pub fn utilization(&self) -> Decimal {
        Decimal::from(self.occupancy) / Decimal::from(self.capacity.max(1))
    }
}

/// Errors converting a wire record into an `Observation`.
#[derive(Debug, Error, PartialEq)]
pub enum RecordError {
    #[error("Lot id is empty")]
    EmptyLotId,

    #[error("Traffic level is not a finite number: {0}")]
    NonFiniteTraffic(f64),

    #[error("Traffic level exceeds the decimal range: {0}")]
    TrafficOutOfRange(f64),
}

/// Input event as delivered by the feed (JSON).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub lot_id: String,
    /// RFC 3339 timestamp.
    pub timestamp: DateTime<Utc>,
    pub occupancy: u32,
    pub capacity: u32,
    pub queue_length: u32,
    pub traffic: f64,
    pub is_special_day: bool,
    pub vehicle_type: String,
}

impl ObservationRecord {
    /// True if the traffic level would be clamped on conversion.
    pub fn traffic_out_of_range(&self) -> bool {
        self.traffic.is_finite() && self.traffic < 0.0
    }
}

impl TryFrom<ObservationRecord> for Observation {
    type Error = RecordError;

    /// Negative traffic is clamped to zero. Non-finite traffic, or traffic
    /// too large for a `Decimal`, is rejected.
    fn try_from(record: ObservationRecord) -> Result<Self, Self::Error> {
        if record.lot_id.trim().is_empty() {
            return Err(RecordError::EmptyLotId);
        }
        if !record.traffic.is_finite() {
            return Err(RecordError::NonFiniteTraffic(record.traffic));
        }
        let traffic = Decimal::try_from(record.traffic.max(0.0))
            .map_err(|_| RecordError::TrafficOutOfRange(record.traffic))?;

        Ok(Observation {
            lot_id: record.lot_id,
            timestamp: record.timestamp,
            occupancy: record.occupancy,
            capacity: record.capacity,
            queue_length: record.queue_length,
            traffic,
            is_special_day: record.is_special_day,
            vehicle_weight: VehicleType::from_label(&record.vehicle_type).weight(),
        })
    }
}

/// Output event: one per processed observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricedEvent {
    pub lot_id: String,
    pub timestamp: DateTime<Utc>,
    /// Committed price, within the configured bounds.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub occupancy: u32,
    pub capacity: u32,
    /// Occupancy over capacity (capacity floored at one).
    #[serde(with = "rust_decimal::serde::float")]
    pub utilization: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_record() -> ObservationRecord {
        ObservationRecord {
            lot_id: "BHMBCCMKT01".to_string(),
            timestamp: DateTime::parse_from_rfc3339("2016-10-04T07:59:42Z")
                .unwrap()
                .with_timezone(&Utc),
            occupancy: 61,
            capacity: 577,
            queue_length: 1,
            traffic: 0.5,
            is_special_day: false,
            vehicle_type: "truck".to_string(),
        }
    }

    #[test]
    fn test_model_kind_from_str() {
        assert_eq!("baseline".parse::<PricingModelKind>(), Ok(PricingModelKind::Baseline));
        assert_eq!("DEMAND".parse::<PricingModelKind>(), Ok(PricingModelKind::Demand));
        assert_eq!(" competitive ".parse::<PricingModelKind>(), Ok(PricingModelKind::Competitive));
        assert_eq!("1".parse::<PricingModelKind>(), Ok(PricingModelKind::Baseline));
        assert_eq!("2".parse::<PricingModelKind>(), Ok(PricingModelKind::Demand));
        assert_eq!("3".parse::<PricingModelKind>(), Ok(PricingModelKind::Competitive));
        assert!("surge".parse::<PricingModelKind>().is_err());
    }

    #[test]
    fn test_model_kind_display_roundtrips() {
        for kind in PricingModelKind::ALL {
            assert_eq!(kind.to_string().parse::<PricingModelKind>(), Ok(kind));
        }
        assert_eq!(PricingModelKind::default(), PricingModelKind::Demand);
    }

    #[test]
    fn test_vehicle_weights() {
        assert_eq!(VehicleType::from_label("car").weight(), dec!(1.0));
        assert_eq!(VehicleType::from_label("Bike").weight(), dec!(0.8));
        assert_eq!(VehicleType::from_label("truck").weight(), dec!(1.2));
        assert_eq!(VehicleType::from_label("cycle"), VehicleType::Other);
        assert_eq!(VehicleType::from_label("cycle").weight(), dec!(1.0));
    }

    #[test]
    fn test_utilization_floors_capacity() {
        let mut obs = Observation::try_from(sample_record()).unwrap();
        obs.occupancy = 3;
        obs.capacity = 0;
        assert_eq!(obs.utilization(), dec!(3));

        obs.occupancy = 120;
        obs.capacity = 100;
        assert_eq!(obs.utilization(), dec!(1.2));
    }

    #[test]
    fn test_record_conversion() {
        let obs = Observation::try_from(sample_record()).unwrap();
        assert_eq!(obs.lot_id, "BHMBCCMKT01");
        assert_eq!(obs.traffic, dec!(0.5));
        assert_eq!(obs.vehicle_weight, dec!(1.2));
        assert!(!obs.is_special_day);
    }

    #[test]
    fn test_record_negative_traffic_clamped() {
        let mut record = sample_record();
        record.traffic = -2.0;
        assert!(record.traffic_out_of_range());

        let obs = Observation::try_from(record).unwrap();
        assert_eq!(obs.traffic, Decimal::ZERO);
    }

    #[test]
    fn test_record_rejects_bad_input() {
        let mut record = sample_record();
        record.traffic = f64::NAN;
        assert!(matches!(
            Observation::try_from(record),
            Err(RecordError::NonFiniteTraffic(_))
        ));

        let mut record = sample_record();
        record.lot_id = "  ".to_string();
        assert_eq!(Observation::try_from(record), Err(RecordError::EmptyLotId));
    }

    #[test]
    fn test_record_rejects_huge_traffic() {
        let mut record = sample_record();
        record.traffic = 1e30;
        assert_eq!(
            Observation::try_from(record),
            Err(RecordError::TrafficOutOfRange(1e30))
        );

        let mut record = sample_record();
        record.traffic = 50.0;
        assert_eq!(Observation::try_from(record).unwrap().traffic, dec!(50));
    }

    #[test]
    fn test_record_parses_json() {
        let json = r#"{
            "lot_id": "LOT-A",
            "timestamp": "2016-10-04T08:25:42Z",
            "occupancy": 80,
            "capacity": 100,
            "queue_length": 2,
            "traffic": 0.5,
            "is_special_day": true,
            "vehicle_type": "car"
        }"#;
        let record: ObservationRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.occupancy, 80);
        assert!(record.is_special_day);
    }

    #[test]
    fn test_priced_event_serializes_numbers() {
        let event = PricedEvent {
            lot_id: "LOT-A".to_string(),
            timestamp: DateTime::parse_from_rfc3339("2016-10-04T08:25:42Z")
                .unwrap()
                .with_timezone(&Utc),
            price: dec!(10.296),
            occupancy: 80,
            capacity: 100,
            utilization: dec!(0.8),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert!((json["price"].as_f64().unwrap() - 10.296).abs() < 1e-9);
        assert!((json["utilization"].as_f64().unwrap() - 0.8).abs() < 1e-9);
        assert_eq!(json["lot_id"], "LOT-A");
    }
}
