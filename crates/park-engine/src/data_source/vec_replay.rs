//! In-memory replay source.
//!
//! Takes pre-loaded observations and yields them in order with no pacing.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use park_common::Observation;

use super::{ObservationSource, SourceError};

/// Vec-based replay source.
///
/// Uses Arc to share observations across runs without cloning the list.
pub struct VecReplaySource {
    observations: Arc<Vec<Observation>>,
    position: usize,
    current_time: Option<DateTime<Utc>>,
}

impl VecReplaySource {
    pub fn new(observations: Arc<Vec<Observation>>) -> Self {
        Self {
            observations,
            position: 0,
            current_time: None,
        }
    }

    /// Returns the number of observations.
    pub fn observation_count(&self) -> usize {
        self.observations.len()
    }
}

impl From<Vec<Observation>> for VecReplaySource {
    fn from(observations: Vec<Observation>) -> Self {
        Self::new(Arc::new(observations))
    }
}

#[async_trait]
impl ObservationSource for VecReplaySource {
    async fn next_observation(&mut self) -> Result<Option<Observation>, SourceError> {
        let Some(obs) = self.observations.get(self.position) else {
            return Ok(None);
        };
        self.position += 1;
        self.current_time = Some(obs.timestamp);
        Ok(Some(obs.clone()))
    }

    fn has_more(&self) -> bool {
        self.position < self.observations.len()
    }

    fn current_time(&self) -> Option<DateTime<Utc>> {
        self.current_time
    }

    async fn shutdown(&mut self) {
        self.position = self.observations.len();
    }
}
