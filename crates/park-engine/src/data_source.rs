//! Observation source abstraction.
//!
//! The engine does not produce its own input. An `ObservationSource` hands
//! it observations in arrival order, whether they come from memory (tests,
//! repeated runs over the same data) or from a JSON lines stream.

pub mod json_lines;
pub mod vec_replay;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use park_common::{Observation, RecordError};
use thiserror::Error;

pub use json_lines::JsonLinesSource;
pub use vec_replay::VecReplaySource;

/// Errors that can occur while reading observations.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: u64, message: String },

    #[error("Invalid record at line {line}: {source}")]
    Record {
        line: u64,
        #[source]
        source: RecordError,
    },
}

impl SourceError {
    /// True if the source can keep going after this error.
    ///
    /// A bad line only loses that line; I/O failures end the stream.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, SourceError::Parse { .. } | SourceError::Record { .. })
    }
}

/// A stream of observations.
#[async_trait]
pub trait ObservationSource: Send {
    /// Receive the next observation.
    ///
    /// Returns `None` when the source is exhausted or was shut down.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying reader fails or a record cannot be
    /// parsed. Recoverable errors leave the source positioned after the bad
    /// record.
    async fn next_observation(&mut self) -> Result<Option<Observation>, SourceError>;

    /// Returns true if more observations may be available.
    fn has_more(&self) -> bool;

    /// Timestamp of the last observation returned.
    fn current_time(&self) -> Option<DateTime<Utc>>;

    /// Stop the source. Subsequent reads return `None`.
    async fn shutdown(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_errors() {
        let parse = SourceError::Parse {
            line: 3,
            message: "expected value".to_string(),
        };
        assert!(parse.is_recoverable());
        assert_eq!(parse.to_string(), "Parse error at line 3: expected value");

        let record = SourceError::Record {
            line: 7,
            source: RecordError::EmptyLotId,
        };
        assert!(record.is_recoverable());

        let io = SourceError::from(std::io::Error::other("disk gone"));
        assert!(!io.is_recoverable());
    }
}
