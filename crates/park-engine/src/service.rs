//! Sharded async front end for the pricing engine.
//!
//! ## Architecture
//!
//! ```text
//! [Source] ──pump──► submit() ──hash(lot_id)──► [Worker 0..N] ──► [Sink task] ──► [Sink]
//! ```
//!
//! Each worker owns one bounded queue. A lot always hashes to the same
//! worker, so its observations are applied one at a time in arrival order
//! while distinct lots run in parallel. A single task owns the sink.
//!
//! Shutdown stops intake, closes the queues, waits for every worker to
//! drain, flushes the sink and finally closes the engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use park_common::{Observation, PricedEvent};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::data_source::{ObservationSource, SourceError};
use crate::engine::PricingEngine;
use crate::sink::{PricedEventSink, SinkError};

/// Errors from the pricing service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Service is shutting down")]
    ShuttingDown,

    #[error("Worker task failed: {0}")]
    WorkerFailed(String),

    #[error("Sink error: {0}")]
    Sink(#[from] SinkError),
}

/// FNV-1a hash of a lot id.
#[inline]
pub fn hash_lot_id(s: &str) -> u64 {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    let mut hash = FNV_OFFSET;
    for byte in s.bytes() {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Worker index for a lot.
#[inline]
pub fn shard_for(lot_id: &str, workers: usize) -> usize {
    (hash_lot_id(lot_id) % workers.max(1) as u64) as usize
}

/// Per-worker totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct WorkerReport {
    priced: u64,
    failed: u64,
    undelivered: u64,
}

/// Totals reported by `PricingService::shutdown`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServiceReport {
    /// Observations priced by the engine.
    pub priced: u64,
    /// Observations the engine refused.
    pub failed: u64,
    /// Events handed to the sink.
    pub published: u64,
    /// Events lost because the sink stopped early.
    pub undelivered: u64,
}

/// Totals reported by `pump`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PumpReport {
    /// Observations handed to the service.
    pub submitted: u64,
    /// Bad records skipped.
    pub skipped: u64,
    /// True if a shutdown signal ended the pump early.
    pub interrupted: bool,
}

/// Running pricing service.
pub struct PricingService {
    engine: Arc<PricingEngine>,
    senders: Vec<mpsc::Sender<Observation>>,
    workers: Vec<JoinHandle<WorkerReport>>,
    sink_task: JoinHandle<Result<u64, SinkError>>,
    accepting: AtomicBool,
}

impl PricingService {
    /// Spawn workers and the sink task on the current runtime.
    ///
    /// Worker count and queue capacity come from the engine's runtime config.
    pub fn spawn<S>(engine: Arc<PricingEngine>, sink: S) -> Self
    where
        S: PricedEventSink + 'static,
    {
        let runtime = engine.config().runtime;
        let workers = runtime.workers.max(1);
        let capacity = runtime.queue_capacity.max(1);

        let (events_tx, events_rx) = mpsc::channel(capacity);
        let sink_task = tokio::spawn(run_sink(sink, events_rx));

        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let (tx, rx) = mpsc::channel(capacity);
            senders.push(tx);
            handles.push(tokio::spawn(run_worker(
                id,
                Arc::clone(&engine),
                rx,
                events_tx.clone(),
            )));
        }
        // Workers hold the only event senders; the sink task ends when they do.
        drop(events_tx);

        info!(workers, queue_capacity = capacity, "Pricing service started");

        Self {
            engine,
            senders,
            workers: handles,
            sink_task,
            accepting: AtomicBool::new(true),
        }
    }

    pub fn engine(&self) -> &Arc<PricingEngine> {
        &self.engine
    }

    pub fn worker_count(&self) -> usize {
        self.senders.len()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    /// Queue an observation on its lot's worker.
    ///
    /// Waits when that worker's queue is full.
    ///
    /// # Errors
    ///
    /// Returns `ShuttingDown` once intake has been closed.
    pub async fn submit(&self, obs: Observation) -> Result<(), ServiceError> {
        if !self.is_accepting() {
            return Err(ServiceError::ShuttingDown);
        }
        let shard = shard_for(&obs.lot_id, self.senders.len());
        self.senders[shard]
            .send(obs)
            .await
            .map_err(|_| ServiceError::ShuttingDown)
    }

    /// Refuse further submissions. Queued observations are still processed.
    pub fn close_intake(&self) {
        if self.accepting.swap(false, Ordering::AcqRel) {
            debug!("Pricing service intake closed");
        }
    }

    /// Drain every queue, flush the sink and close the engine.
    ///
    /// # Errors
    ///
    /// Returns `WorkerFailed` if a task panicked, or the sink's error if
    /// publishing or the final flush failed. The engine is closed either way.
    pub async fn shutdown(mut self) -> Result<ServiceReport, ServiceError> {
        self.close_intake();
        self.senders.clear();

        let mut report = ServiceReport::default();
        let mut failure = None;
        for handle in self.workers.drain(..) {
            match handle.await {
                Ok(worker) => {
                    report.priced += worker.priced;
                    report.failed += worker.failed;
                    report.undelivered += worker.undelivered;
                }
                Err(e) => {
                    error!(error = %e, "Pricing worker failed");
                    failure.get_or_insert(ServiceError::WorkerFailed(e.to_string()));
                }
            }
        }

        match self.sink_task.await {
            Ok(Ok(published)) => report.published = published,
            Ok(Err(e)) => {
                error!(error = %e, "Sink failed");
                failure.get_or_insert(ServiceError::Sink(e));
            }
            Err(e) => {
                error!(error = %e, "Sink task failed");
                failure.get_or_insert(ServiceError::WorkerFailed(e.to_string()));
            }
        }

        self.engine.close();

        info!(
            priced = report.priced,
            failed = report.failed,
            published = report.published,
            undelivered = report.undelivered,
            "Pricing service stopped"
        );

        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}

async fn run_worker(
    id: usize,
    engine: Arc<PricingEngine>,
    mut rx: mpsc::Receiver<Observation>,
    events: mpsc::Sender<PricedEvent>,
) -> WorkerReport {
    let mut report = WorkerReport::default();
    let mut sink_open = true;

    while let Some(obs) = rx.recv().await {
        match engine.on_observation(&obs) {
            Ok(event) => {
                report.priced += 1;
                if !sink_open {
                    report.undelivered += 1;
                } else if events.send(event).await.is_err() {
                    error!(worker = id, "Sink stopped; priced events are no longer delivered");
                    sink_open = false;
                    report.undelivered += 1;
                }
            }
            Err(e) => {
                report.failed += 1;
                warn!(worker = id, lot_id = %obs.lot_id, error = %e, "Observation rejected");
            }
        }
    }

    debug!(worker = id, priced = report.priced, "Pricing worker drained");
    report
}

async fn run_sink<S>(mut sink: S, mut rx: mpsc::Receiver<PricedEvent>) -> Result<u64, SinkError>
where
    S: PricedEventSink,
{
    let mut published = 0;
    while let Some(event) = rx.recv().await {
        sink.publish(event).await?;
        published += 1;
    }
    sink.flush().await?;
    Ok(published)
}

/// Feed a source into the service until it is exhausted or `shutdown` fires.
///
/// Recoverable source errors (bad lines) are logged and skipped.
///
/// # Errors
///
/// Returns the source error if reading fails for good.
pub async fn pump<S>(
    source: &mut S,
    service: &PricingService,
    mut shutdown: broadcast::Receiver<()>,
) -> Result<PumpReport, SourceError>
where
    S: ObservationSource + ?Sized,
{
    let mut report = PumpReport::default();
    let mut listening = true;

    loop {
        let next = tokio::select! {
            biased;
            signal = shutdown.recv(), if listening => {
                // A dropped sender means no signal can arrive, not a shutdown.
                if let Err(broadcast::error::RecvError::Closed) = signal {
                    listening = false;
                    continue;
                }
                report.interrupted = true;
                break;
            }
            next = source.next_observation() => next,
        };

        match next {
            Ok(Some(obs)) => {
                if let Err(e) = service.submit(obs).await {
                    warn!(error = %e, "Submission refused, stopping pump");
                    report.interrupted = true;
                    break;
                }
                report.submitted += 1;
            }
            Ok(None) => break,
            Err(e) if e.is_recoverable() => {
                report.skipped += 1;
                warn!(error = %e, "Skipping bad record");
            }
            Err(e) => {
                error!(error = %e, "Observation source failed");
                return Err(e);
            }
        }
    }

    if report.interrupted {
        source.shutdown().await;
        info!(
            submitted = report.submitted,
            at = ?source.current_time(),
            "Pump interrupted"
        );
    } else {
        info!(
            submitted = report.submitted,
            skipped = report.skipped,
            "Source exhausted"
        );
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_is_fnv1a() {
        assert_eq!(hash_lot_id(""), 0xcbf29ce484222325);
        assert_eq!(hash_lot_id("a"), 0xaf63dc4c8601ec8c);
    }

    #[test]
    fn test_shard_is_stable_and_in_range() {
        for workers in [1usize, 2, 4, 7] {
            for lot in ["BHMBCCMKT01", "Broad Street", "Shopping", "x"] {
                let shard = shard_for(lot, workers);
                assert!(shard < workers);
                assert_eq!(shard, shard_for(lot, workers));
            }
        }
        assert_eq!(shard_for("anything", 0), 0);
    }
}
