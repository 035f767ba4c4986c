//! Precomputed nearest-neighbor index over static lot coordinates.
//!
//! The lot set is fixed at construction. For every lot the index stores all
//! other lots sorted by great-circle distance, so a radius query is a binary
//! search over a sorted slice followed by a bounded copy.
//!
//! Distances use the haversine formula on a sphere. This ignores ellipsoidal
//! correction, which is well below pricing relevance at intra-city range.

use std::collections::HashMap;

use park_common::LotLocation;
use thiserror::Error;

/// Mean Earth radius (km).
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Errors from building or querying the index.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeoIndexError {
    #[error("Invalid lot input: {0}")]
    InvalidInput(String),

    #[error("Unknown lot: {0}")]
    UnknownLot(String),
}

/// A neighboring lot and its distance from the query lot.
#[derive(Debug, Clone, PartialEq)]
pub struct Neighbor {
    pub lot_id: String,
    pub distance_km: f64,
}

/// Great-circle distance between two coordinates in degrees.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64, radius_km: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let lat1 = lat1.to_radians();
    let lat2 = lat2.to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push `a` a hair past 1.0 for antipodal points.
    let c = 2.0 * a.min(1.0).sqrt().asin();
    radius_km * c
}

/// Read-only all-pairs neighbor index.
#[derive(Debug)]
pub struct GeoIndex {
    /// Lot ids in construction order.
    ids: Vec<String>,
    /// Lot id -> position in `ids`.
    positions: HashMap<String, usize>,
    /// Per lot: (neighbor position, distance km), ascending by distance.
    neighbors: Vec<Vec<(usize, f64)>>,
}

impl GeoIndex {
    /// Build the index with the standard Earth radius.
    pub fn build(lots: &[LotLocation]) -> Result<Self, GeoIndexError> {
        Self::build_with_radius(lots, EARTH_RADIUS_KM)
    }

    /// Build the index on a sphere of the given radius.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty lot set, a duplicate id, or a
    /// coordinate that is not finite or out of range.
    pub fn build_with_radius(lots: &[LotLocation], radius_km: f64) -> Result<Self, GeoIndexError> {
        if lots.is_empty() {
            return Err(GeoIndexError::InvalidInput(
                "at least one lot is required".to_string(),
            ));
        }
        if !radius_km.is_finite() || radius_km <= 0.0 {
            return Err(GeoIndexError::InvalidInput(format!(
                "sphere radius must be positive, got {}",
                radius_km
            )));
        }

        let mut positions = HashMap::with_capacity(lots.len());
        for (idx, lot) in lots.iter().enumerate() {
            if !lot.latitude.is_finite() || !(-90.0..=90.0).contains(&lot.latitude) {
                return Err(GeoIndexError::InvalidInput(format!(
                    "lot {} has invalid latitude {}",
                    lot.id, lot.latitude
                )));
            }
            if !lot.longitude.is_finite() || !(-180.0..=180.0).contains(&lot.longitude) {
                return Err(GeoIndexError::InvalidInput(format!(
                    "lot {} has invalid longitude {}",
                    lot.id, lot.longitude
                )));
            }
            if positions.insert(lot.id.clone(), idx).is_some() {
                return Err(GeoIndexError::InvalidInput(format!(
                    "duplicate lot id {}",
                    lot.id
                )));
            }
        }

        let n = lots.len();
        let mut neighbors: Vec<Vec<(usize, f64)>> =
            (0..n).map(|_| Vec::with_capacity(n - 1)).collect();
        for i in 0..n {
            for j in (i + 1)..n {
                let d = haversine_km(
                    lots[i].latitude,
                    lots[i].longitude,
                    lots[j].latitude,
                    lots[j].longitude,
                    radius_km,
                );
                // Same value on both sides keeps the index exactly symmetric.
                neighbors[i].push((j, d));
                neighbors[j].push((i, d));
            }
        }
        for list in &mut neighbors {
            list.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
        }

        Ok(Self {
            ids: lots.iter().map(|l| l.id.clone()).collect(),
            positions,
            neighbors,
        })
    }

    /// Number of indexed lots.
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if no lots are indexed.
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns true if the lot is indexed.
    pub fn contains(&self, lot_id: &str) -> bool {
        self.positions.contains_key(lot_id)
    }

    /// Indexed lot ids in construction order.
    pub fn lot_ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Other lots within `radius_km` (inclusive), nearest first, at most `limit`.
    ///
    /// Returns an empty list when nothing is in range.
    pub fn neighbors_within(
        &self,
        lot_id: &str,
        radius_km: f64,
        limit: usize,
    ) -> Result<Vec<Neighbor>, GeoIndexError> {
        let pos = self.position(lot_id)?;
        let list = &self.neighbors[pos];
        let in_range = list.partition_point(|&(_, d)| d <= radius_km);

        Ok(list[..in_range.min(limit)]
            .iter()
            .map(|&(idx, d)| Neighbor {
                lot_id: self.ids[idx].clone(),
                distance_km: d,
            })
            .collect())
    }

    /// Distance between two indexed lots.
    pub fn distance_km(&self, a: &str, b: &str) -> Result<f64, GeoIndexError> {
        let pa = self.position(a)?;
        let pb = self.position(b)?;
        if pa == pb {
            return Ok(0.0);
        }
        self.neighbors[pa]
            .iter()
            .find(|&&(idx, _)| idx == pb)
            .map(|&(_, d)| d)
            .ok_or_else(|| GeoIndexError::UnknownLot(b.to_string()))
    }

    fn position(&self, lot_id: &str) -> Result<usize, GeoIndexError> {
        self.positions
            .get(lot_id)
            .copied()
            .ok_or_else(|| GeoIndexError::UnknownLot(lot_id.to_string()))
    }
}
