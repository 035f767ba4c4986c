//! Priced event sinks.
//!
//! A sink receives every `PricedEvent` the engine emits. The service feeds a
//! single sink from one task, so implementations need no internal locking.

use async_trait::async_trait;
use park_common::PricedEvent;
use thiserror::Error;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter, Stdout};
use tokio::sync::mpsc;

/// Errors from publishing priced events.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Sink closed")]
    Closed,
}

/// Downstream consumer of priced events.
#[async_trait]
pub trait PricedEventSink: Send {
    /// Publish one event.
    async fn publish(&mut self, event: PricedEvent) -> Result<(), SinkError>;

    /// Flush anything buffered.
    async fn flush(&mut self) -> Result<(), SinkError>;
}

/// Forwards events into a tokio channel.
pub struct ChannelSink {
    tx: mpsc::Sender<PricedEvent>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<PricedEvent>) -> Self {
        Self { tx }
    }

    /// Create a sink and the receiver that observes it.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<PricedEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self::new(tx), rx)
    }
}

#[async_trait]
impl PricedEventSink for ChannelSink {
    async fn publish(&mut self, event: PricedEvent) -> Result<(), SinkError> {
        self.tx.send(event).await.map_err(|_| SinkError::Closed)
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Writes one JSON object per line.
pub struct JsonLinesSink<W: AsyncWrite> {
    writer: BufWriter<W>,
    written: u64,
}

impl<W> JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(writer: W) -> Self {
        Self {
            writer: BufWriter::new(writer),
            written: 0,
        }
    }

    /// Events written so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Flush and return the underlying writer.
    pub async fn into_inner(mut self) -> Result<W, SinkError> {
        self.writer.flush().await?;
        Ok(self.writer.into_inner())
    }
}

impl JsonLinesSink<Stdout> {
    /// Write events to standard output.
    pub fn stdout() -> Self {
        Self::new(tokio::io::stdout())
    }
}

#[async_trait]
impl<W> PricedEventSink for JsonLinesSink<W>
where
    W: AsyncWrite + Unpin + Send,
{
    async fn publish(&mut self, event: PricedEvent) -> Result<(), SinkError> {
        let mut line = serde_json::to_vec(&event)?;
        line.push(b'\n');
        self.writer.write_all(&line).await?;
        self.written += 1;
        Ok(())
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.writer.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};
    use rust_decimal_macros::dec;

    fn event(lot: &str) -> PricedEvent {
        PricedEvent {
            lot_id: lot.to_string(),
            timestamp: DateTime::parse_from_rfc3339("2016-10-04T08:00:00Z")
                .unwrap()
                .with_timezone(&Utc),
            price: dec!(10.296),
            occupancy: 80,
            capacity: 100,
            utilization: dec!(0.8),
        }
    }

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (mut sink, mut rx) = ChannelSink::channel(4);
        sink.publish(event("A")).await.unwrap();
        sink.flush().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().lot_id, "A");
    }

    #[tokio::test]
    async fn test_channel_sink_closed() {
        let (mut sink, rx) = ChannelSink::channel(1);
        drop(rx);
        assert!(matches!(sink.publish(event("A")).await, Err(SinkError::Closed)));
    }

    #[tokio::test]
    async fn test_json_lines_sink_writes_one_object_per_line() {
        let mut sink = JsonLinesSink::new(Vec::new());
        sink.publish(event("A")).await.unwrap();
        sink.publish(event("B")).await.unwrap();
        assert_eq!(sink.written(), 2);

        let bytes = sink.into_inner().await.unwrap();
        let text = String::from_utf8(bytes).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);

        let value: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(value["lot_id"], "B");
        assert!((value["price"].as_f64().unwrap() - 10.296).abs() < 1e-9);
        assert_eq!(value["capacity"], 100);
    }
}
