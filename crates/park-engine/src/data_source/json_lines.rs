//! JSON lines source: one `ObservationRecord` per line.
//!
//! Blank lines are skipped. A malformed line yields a recoverable error that
//! carries its 1-based line number, and the next read continues with the
//! following line.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use park_common::{Observation, ObservationRecord};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines, Stdin};
use tracing::{debug, warn};

use super::{ObservationSource, SourceError};

pub struct JsonLinesSource<R> {
    lines: Lines<R>,
    line: u64,
    finished: bool,
    current_time: Option<DateTime<Utc>>,
}

impl<R> JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    pub fn new(reader: R) -> Self {
        Self {
            lines: reader.lines(),
            line: 0,
            finished: false,
            current_time: None,
        }
    }

    /// Lines consumed so far, including blank and rejected ones.
    pub fn lines_read(&self) -> u64 {
        self.line
    }

    fn parse(&self, text: &str) -> Result<Observation, SourceError> {
        let record: ObservationRecord =
            serde_json::from_str(text).map_err(|e| SourceError::Parse {
                line: self.line,
                message: e.to_string(),
            })?;

        if record.traffic_out_of_range() {
            warn!(
                line = self.line,
                lot_id = %record.lot_id,
                traffic = record.traffic,
                "Negative traffic clamped to zero"
            );
        }

        Observation::try_from(record).map_err(|source| SourceError::Record {
            line: self.line,
            source,
        })
    }
}

impl JsonLinesSource<BufReader<Stdin>> {
    /// Read observations from standard input.
    pub fn stdin() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()))
    }
}

#[async_trait]
impl<R> ObservationSource for JsonLinesSource<R>
where
    R: AsyncBufRead + Unpin + Send,
{
    async fn next_observation(&mut self) -> Result<Option<Observation>, SourceError> {
        while !self.finished {
            let Some(text) = self.lines.next_line().await? else {
                self.finished = true;
                debug!(lines = self.line, "Observation stream ended");
                break;
            };
            self.line += 1;

            let text = text.trim();
            if text.is_empty() {
                continue;
            }

            let obs = self.parse(text)?;
            self.current_time = Some(obs.timestamp);
            return Ok(Some(obs));
        }
        Ok(None)
    }

    fn has_more(&self) -> bool {
        !self.finished
    }

    fn current_time(&self) -> Option<DateTime<Utc>> {
        self.current_time
    }

    async fn shutdown(&mut self) {
        self.finished = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use park_common::RecordError;
    use rust_decimal_macros::dec;

    const FEED: &str = r#"{"lot_id":"BHMBCCMKT01","timestamp":"2016-10-04T07:59:42Z","occupancy":61,"capacity":577,"queue_length":1,"traffic":0.4,"is_special_day":false,"vehicle_type":"car"}

{"lot_id":"BHMNCPHCP01","timestamp":"2016-10-04T08:25:42Z","occupancy":64,"capacity":387,"queue_length":0,"traffic":-0.3,"is_special_day":true,"vehicle_type":"truck"}
"#;

    fn source(text: &'static str) -> JsonLinesSource<&'static [u8]> {
        JsonLinesSource::new(text.as_bytes())
    }

    #[tokio::test]
    async fn test_reads_records_and_skips_blank_lines() {
        let mut src = source(FEED);

        let first = src.next_observation().await.unwrap().unwrap();
        assert_eq!(first.lot_id, "BHMBCCMKT01");
        assert_eq!(first.occupancy, 61);
        assert_eq!(first.queue_length, 1);
        assert_eq!(first.vehicle_weight, dec!(1.0));

        let second = src.next_observation().await.unwrap().unwrap();
        assert_eq!(second.lot_id, "BHMNCPHCP01");
        assert_eq!(second.traffic, dec!(0));
        assert_eq!(second.vehicle_weight, dec!(1.2));
        assert!(second.is_special_day);
        assert_eq!(src.lines_read(), 3);
        assert_eq!(src.current_time(), Some(second.timestamp));

        assert!(src.next_observation().await.unwrap().is_none());
        assert!(!src.has_more());
    }

    #[tokio::test]
    async fn test_malformed_line_is_recoverable() {
        let text = "not json\n{\"lot_id\":\"\",\"timestamp\":\"2016-10-04T08:00:00Z\",\"occupancy\":1,\"capacity\":2,\"queue_length\":0,\"traffic\":0.0,\"is_special_day\":false,\"vehicle_type\":\"bike\"}\n{\"lot_id\":\"A\",\"timestamp\":\"2016-10-04T08:00:00Z\",\"occupancy\":1,\"capacity\":2,\"queue_length\":0,\"traffic\":0.0,\"is_special_day\":false,\"vehicle_type\":\"bike\"}\n";
        let mut src = JsonLinesSource::new(text.as_bytes());

        let err = src.next_observation().await.unwrap_err();
        assert!(matches!(err, SourceError::Parse { line: 1, .. }));
        assert!(err.is_recoverable());

        let err = src.next_observation().await.unwrap_err();
        assert!(matches!(
            err,
            SourceError::Record {
                line: 2,
                source: RecordError::EmptyLotId
            }
        ));

        let obs = src.next_observation().await.unwrap().unwrap();
        assert_eq!(obs.lot_id, "A");
        assert_eq!(obs.vehicle_weight, dec!(0.8));
    }

    #[tokio::test]
    async fn test_shutdown_stops_reading() {
        let mut src = source(FEED);
        src.shutdown().await;
        assert!(!src.has_more());
        assert!(src.next_observation().await.unwrap().is_none());
    }
}
