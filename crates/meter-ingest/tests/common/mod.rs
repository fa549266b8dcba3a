// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![allow(dead_code)]

use async_trait::async_trait;
use meter_ingest::{Backend, BackoffPolicy, DeliveryError, PipelineConfig, PipelineError, Record};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Pipeline settings with short waits and no back-off delay.
pub fn fast_config(threads: usize) -> PipelineConfig {
    PipelineConfig {
        threads,
        send_interval: Duration::from_millis(10),
        sleep_interval: Duration::from_millis(5),
        backoff: BackoffPolicy::immediate(),
        ..Default::default()
    }
}

/// Shared view of every batch delivered by the backends it hands out.
#[derive(Clone, Default)]
pub struct Recorder {
    batches: Arc<Mutex<Vec<Vec<Record>>>>,
    delay: Duration,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every delivery takes at least `delay`.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn backend(&self) -> Result<RecordingBackend, PipelineError> {
        Ok(RecordingBackend {
            recorder: self.clone(),
        })
    }

    pub fn batches(&self) -> Vec<Vec<Record>> {
        self.batches.lock().unwrap().clone()
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().iter().map(Vec::len).collect()
    }

    pub fn total_records(&self) -> usize {
        self.batch_sizes().iter().sum()
    }
}

pub struct RecordingBackend {
    recorder: Recorder,
}

#[async_trait]
impl Backend for RecordingBackend {
    async fn send(&mut self, batch: &[Record]) -> Result<(), DeliveryError> {
        if !self.recorder.delay.is_zero() {
            tokio::time::sleep(self.recorder.delay).await;
        }
        self.recorder.batches.lock().unwrap().push(batch.to_vec());
        Ok(())
    }
}

/// Fails every call with the same error and counts the calls.
#[derive(Clone)]
pub struct Failure {
    error: DeliveryError,
    calls: Arc<AtomicUsize>,
}

impl Failure {
    pub fn new(error: DeliveryError) -> Self {
        Self {
            error,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn backend(&self) -> Result<FailingBackend, PipelineError> {
        Ok(FailingBackend {
            failure: self.clone(),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

pub struct FailingBackend {
    failure: Failure,
}

#[async_trait]
impl Backend for FailingBackend {
    async fn send(&mut self, _batch: &[Record]) -> Result<(), DeliveryError> {
        self.failure.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.failure.error.clone())
    }
}

/// Panics on every call.
pub struct PanickingBackend;

#[async_trait]
impl Backend for PanickingBackend {
    async fn send(&mut self, _batch: &[Record]) -> Result<(), DeliveryError> {
        panic!("backend failed unexpectedly");
    }
}

pub fn panicking_backend() -> Result<PanickingBackend, PipelineError> {
    Ok(PanickingBackend)
}
