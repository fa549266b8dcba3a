// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Batch consume loop.
//!
//! ```text
//!          ┌──────────────────────────────────────────────┐
//!          v                                              │
//!   Idle ─> Assembling ─> Delivering ─┬─ ok ─────────────>┤
//!                          ^          ├─ retryable ─> Retrying
//!                          └──────────┘                   │
//!                                     └─ fatal / spent ─> dropped
//!   (cancelled between iterations) ─> Stopped
//! ```
//!
//! A worker owns its backend. Every dequeued batch is acknowledged exactly
//! once, after its outcome has been counted and reported, so `flush` never
//! returns before the error callback for a dropped batch has run. A backend
//! that panics fails the attempt with a status-less error and the worker
//! keeps running.

use crate::backend::Backend;
use crate::config::PipelineConfig;
use crate::error::{classify, DeliveryError, ErrorClass};
use crate::queue::BoundedQueue;
use crate::retry::RetryState;
use crate::stats::PipelineStats;
use crate::Record;
use futures::FutureExt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Assembling,
    Delivering,
    Retrying,
    Stopped,
}

/// Result of one [`Worker::consume`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// Nothing was dequeued before the assembly deadline.
    Empty,
    /// A batch of this many records was accepted by the backend.
    Delivered(usize),
    /// A batch of this many records failed permanently and was discarded.
    Dropped(usize),
}

pub struct Worker {
    name: String,
    queue: Arc<BoundedQueue<Record>>,
    backend: Box<dyn Backend>,
    config: Arc<PipelineConfig>,
    stats: Arc<PipelineStats>,
    state: WorkerState,
}

/// Acknowledges a dequeued batch when dropped, including during a panic
/// unwinding out of the backend.
struct AckGuard {
    queue: Arc<BoundedQueue<Record>>,
    count: usize,
}

impl Drop for AckGuard {
    fn drop(&mut self) {
        self.queue.acknowledge(self.count);
    }
}

fn backend_panicked() -> DeliveryError {
    DeliveryError::transport("Backend panicked while sending batch")
}

impl Worker {
    pub fn new(
        name: impl Into<String>,
        queue: Arc<BoundedQueue<Record>>,
        backend: Box<dyn Backend>,
        config: Arc<PipelineConfig>,
        stats: Arc<PipelineStats>,
    ) -> Self {
        Self {
            name: name.into(),
            queue,
            backend,
            config,
            stats,
            state: WorkerState::Idle,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Assembles and delivers at most one batch.
    pub async fn consume(&mut self) -> ConsumeOutcome {
        self.state = WorkerState::Assembling;
        let batch = self
            .queue
            .dequeue_batch(self.config.batch_size, self.config.send_interval)
            .await;

        if batch.is_empty() {
            self.state = WorkerState::Idle;
            return ConsumeOutcome::Empty;
        }

        let _ack = AckGuard {
            queue: Arc::clone(&self.queue),
            count: batch.len(),
        };

        let outcome = match self.deliver(&batch).await {
            Ok(()) => {
                self.stats.record_delivered(batch.len());
                ConsumeOutcome::Delivered(batch.len())
            }
            Err(err) => {
                self.stats.record_dropped(batch.len());
                self.report(&err, &batch);
                ConsumeOutcome::Dropped(batch.len())
            }
        };
        self.state = WorkerState::Idle;
        outcome
    }

    async fn deliver(&mut self, batch: &[Record]) -> Result<(), DeliveryError> {
        let mut retry = RetryState::new(self.config.retries);
        loop {
            self.state = WorkerState::Delivering;
            let attempt = AssertUnwindSafe(self.backend.send(batch)).catch_unwind().await;
            let err = match attempt.unwrap_or_else(|_| Err(backend_panicked())) {
                Ok(()) => {
                    debug!(
                        worker = %self.name,
                        records = batch.len(),
                        attempts = retry.attempts(),
                        "Delivered batch"
                    );
                    return Ok(());
                }
                Err(err) => err,
            };

            if classify(&err) == ErrorClass::Fatal {
                error!(
                    worker = %self.name,
                    records = batch.len(),
                    "Dropping batch after non-retryable error: {err}"
                );
                return Err(err);
            }

            let Some(delay) = retry.next_delay(&self.config.backoff) else {
                error!(
                    worker = %self.name,
                    records = batch.len(),
                    attempts = retry.attempts(),
                    "Dropping batch, retries exhausted: {err}"
                );
                return Err(err);
            };

            warn!(
                worker = %self.name,
                attempt = retry.attempts(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Retrying batch after error: {err}"
            );
            self.state = WorkerState::Retrying;
            tokio::time::sleep(delay).await;
        }
    }

    fn report(&self, err: &DeliveryError, batch: &[Record]) {
        let Some(callback) = &self.config.on_error else {
            return;
        };
        if panic::catch_unwind(AssertUnwindSafe(|| callback(err, batch))).is_err() {
            error!(worker = %self.name, "Error callback panicked");
        }
    }

    /// Consumes batches until `cancel` fires.
    ///
    /// Cancellation is only observed between iterations and during the idle
    /// pause; a delivery in progress, retries included, runs to completion.
    pub async fn run(mut self, cancel: CancellationToken) {
        debug!(worker = %self.name, "Worker started");
        while !cancel.is_cancelled() {
            if self.consume().await == ConsumeOutcome::Empty {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    () = tokio::time::sleep(self.config.sleep_interval) => {}
                }
            }
        }
        self.state = WorkerState::Stopped;
        debug!(worker = %self.name, "Worker stopped");
    }
}
