// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The producer-facing [`Pipeline`].
//!
//! `send` enqueues without blocking; a fixed pool of tokio tasks, one
//! [`Worker`] each, drains the queue into the configured backend.

use crate::backend::{Backend, IngestBackend};
use crate::config::{BackendConfig, HttpBackendConfig, PipelineConfig};
use crate::error::PipelineError;
use crate::meter::MeterRecord;
use crate::queue::BoundedQueue;
use crate::stats::{PipelineStats, StatsSnapshot};
use crate::worker::Worker;
use crate::Record;
use std::fmt;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

/// Producer handle over a bounded queue and a fixed pool of workers.
///
/// `send` never blocks and never fails loudly: a full queue or an oversized
/// record is reported as `false`, and delivery failures only ever reach the
/// configured error callback.
///
/// Dropping the pipeline without calling [`shutdown`](Self::shutdown) or
/// [`join`](Self::join) stops the workers at their next iteration; records
/// still queued at that point are lost.
pub struct Pipeline {
    queue: Arc<BoundedQueue<Record>>,
    config: Arc<PipelineConfig>,
    stats: Arc<PipelineStats>,
    cancel: CancellationToken,
    workers: Mutex<Vec<JoinHandle<()>>>,
    active_workers: Arc<WorkerCount>,
}

/// Live worker count, with a wake-up for when the last worker ends.
#[derive(Default)]
struct WorkerCount {
    active: AtomicUsize,
    all_stopped: Notify,
}

/// Decrements the live worker count when a worker task ends, however it ends.
struct ActiveWorker(Arc<WorkerCount>);

impl Drop for ActiveWorker {
    fn drop(&mut self) {
        if self.0.active.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.0.all_stopped.notify_waiters();
        }
    }
}

impl Pipeline {
    /// Starts `config.threads` workers, each with its own backend from
    /// `make_backend`. Must be called from within a tokio runtime.
    pub fn new<F, B>(config: PipelineConfig, mut make_backend: F) -> Result<Self, PipelineError>
    where
        F: FnMut() -> Result<B, PipelineError>,
        B: Backend + 'static,
    {
        config.validate()?;
        let runtime = Handle::try_current().map_err(|_| PipelineError::NoRuntime)?;

        // All backends are built before anything is spawned, so a failure
        // leaves no workers behind.
        let backends = (0..config.threads)
            .map(|_| make_backend())
            .collect::<Result<Vec<_>, _>>()?;

        let config = Arc::new(config);
        let queue = Arc::new(BoundedQueue::new(config.max_queue_size));
        let stats = Arc::new(PipelineStats::default());
        let cancel = CancellationToken::new();
        let active_workers = Arc::new(WorkerCount::default());

        let mut handles = Vec::with_capacity(backends.len());
        for (id, backend) in backends.into_iter().enumerate() {
            let worker = Worker::new(
                format!("worker-{id}"),
                Arc::clone(&queue),
                Box::new(backend),
                Arc::clone(&config),
                Arc::clone(&stats),
            );
            active_workers.active.fetch_add(1, Ordering::SeqCst);
            let active = ActiveWorker(Arc::clone(&active_workers));
            let token = cancel.clone();
            handles.push(runtime.spawn(async move {
                let _active = active;
                worker.run(token).await;
            }));
        }

        debug!(
            threads = config.threads,
            queue_size = config.max_queue_size,
            batch_size = config.batch_size,
            "Pipeline started"
        );

        Ok(Self {
            queue,
            config,
            stats,
            cancel,
            workers: Mutex::new(handles),
            active_workers,
        })
    }

    /// Builds every worker's backend from `backend`.
    pub fn from_backend_config(
        backend: &BackendConfig,
        config: PipelineConfig,
    ) -> Result<Self, PipelineError> {
        backend.validate()?;
        Self::new(config, || IngestBackend::from_config(backend))
    }

    /// Enqueues one record. Returns `false` if the queue is full or the
    /// record's JSON encoding exceeds `max_record_size_bytes`.
    pub fn send(&self, record: Record) -> bool {
        if let Some(limit) = self.config.max_record_size_bytes {
            let size = encoded_len(&record);
            if size > limit {
                warn!(size, limit, "Record too large, rejecting");
                self.stats.record_rejected();
                return false;
            }
        }

        if self.queue.enqueue(record) {
            self.stats.record_accepted();
            true
        } else {
            warn!("Queue is full, rejecting record");
            self.stats.record_rejected();
            false
        }
    }

    /// Serializes and enqueues a meter record.
    pub fn meter(&self, record: &MeterRecord) -> bool {
        match serde_json::to_value(record) {
            Ok(value) => self.send(value),
            Err(e) => {
                error!("Failed to serialize meter record: {e}");
                self.stats.record_rejected();
                false
            }
        }
    }

    /// Waits until every accepted record has been delivered or dropped.
    ///
    /// Workers keep running. Returns right away if no worker is left to
    /// drain the queue, and early if the pipeline is joined or the last
    /// worker stops meanwhile.
    pub async fn flush(&self) {
        let all_stopped = self.active_workers.all_stopped.notified();
        tokio::pin!(all_stopped);
        all_stopped.as_mut().enable();

        if self.cancel.is_cancelled() || self.active_workers() == 0 {
            let pending = self.queue.in_flight();
            if pending > 0 {
                warn!(pending, "No running workers, cannot flush queued records");
            }
            return;
        }

        tokio::select! {
            () = self.queue.drain_wait() => debug!("Pipeline flushed"),
            () = self.cancel.cancelled() => {
                warn!(pending = self.queue.in_flight(), "Pipeline stopped during flush");
            }
            () = &mut all_stopped => {
                error!(pending = self.queue.in_flight(), "All workers stopped during flush");
            }
        }
    }

    /// Stops every worker and waits for it to finish. Queued records are
    /// abandoned. Safe to call more than once.
    pub async fn join(&self) {
        self.cancel.cancel();
        let mut workers = self.workers.lock().await;
        for handle in workers.drain(..) {
            if let Err(e) = handle.await {
                error!("Worker task failed: {e}");
            }
        }
    }

    /// [`flush`](Self::flush) followed by [`join`](Self::join).
    pub async fn shutdown(&self) {
        self.flush().await;
        self.join().await;
        let stats = self.stats();
        debug!(
            accepted = stats.accepted,
            rejected = stats.rejected,
            delivered = stats.delivered,
            dropped = stats.dropped,
            "Pipeline shut down"
        );
    }

    /// Records waiting to be dequeued.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Accepted records not yet delivered or dropped.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.queue.in_flight()
    }

    #[must_use]
    pub fn active_workers(&self) -> usize {
        self.active_workers.active.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pipeline")
            .field("queued", &self.len())
            .field("in_flight", &self.in_flight())
            .field("active_workers", &self.active_workers())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Starts a pipeline that posts to the HTTP ingestion API with `api_key`.
pub fn create_ingest_pipeline(
    api_key: impl Into<String>,
    config: PipelineConfig,
) -> Result<Pipeline, PipelineError> {
    Pipeline::from_backend_config(&BackendConfig::Http(HttpBackendConfig::new(api_key)), config)
}

/// Length of the compact JSON encoding, without allocating it.
fn encoded_len(record: &Record) -> usize {
    let mut counter = ByteCounter(0);
    match serde_json::to_writer(&mut counter, record) {
        Ok(()) => counter.0,
        Err(_) => usize::MAX,
    }
}

struct ByteCounter(usize);

impl io::Write for ByteCounter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0 += buf.len();
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_encoded_len_matches_serialization() {
        let record = json!({"meterApiName": "api-calls", "meterValue": 1.5, "tags": ["a", "b"]});
        assert_eq!(encoded_len(&record), serde_json::to_vec(&record).unwrap().len());
    }

    #[test]
    fn test_new_without_runtime() {
        let result = create_ingest_pipeline("key", PipelineConfig::default());
        assert!(matches!(result, Err(PipelineError::NoRuntime)));
    }

    #[tokio::test]
    async fn test_new_rejects_invalid_config() {
        let config = PipelineConfig {
            batch_size: 0,
            ..Default::default()
        };
        let result = create_ingest_pipeline("key", config);
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_backend_factory_failure_spawns_nothing() {
        let mut built = 0;
        let result = Pipeline::new(PipelineConfig::default(), || {
            built += 1;
            if built == 2 {
                return Err(PipelineError::Backend("no credentials".to_string()));
            }
            IngestBackend::from_config(&BackendConfig::Http(HttpBackendConfig::new("key")))
        });
        assert!(matches!(result, Err(PipelineError::Backend(_))));
    }

    struct StuckBackend;

    #[async_trait::async_trait]
    impl Backend for StuckBackend {
        async fn send(&mut self, _batch: &[Record]) -> Result<(), crate::DeliveryError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_flush_returns_when_last_worker_stops() {
        let config = PipelineConfig {
            threads: 1,
            batch_size: 1,
            send_interval: std::time::Duration::ZERO,
            ..Default::default()
        };
        let pipeline = Pipeline::new(config, || Ok(StuckBackend)).unwrap();
        for n in 0..3 {
            assert!(pipeline.send(json!({ "n": n })));
        }

        let abort_workers = async {
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            for handle in pipeline.workers.lock().await.iter() {
                handle.abort();
            }
        };
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            tokio::join!(pipeline.flush(), abort_workers);
        })
        .await
        .unwrap();

        assert_eq!(pipeline.active_workers(), 0);
        assert!(pipeline.in_flight() > 0);
    }

    #[tokio::test]
    async fn test_drop_cancels_workers() {
        let pipeline = create_ingest_pipeline("key", PipelineConfig::default()).unwrap();
        let token = pipeline.cancel.clone();
        assert_eq!(pipeline.active_workers(), 2);
        drop(pipeline);
        assert!(token.is_cancelled());
    }
}
