// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! # Meter Ingest
//!
//! Asynchronous, batching delivery of usage-metering records.
//!
//! ## Overview
//!
//! Producers hand records to a [`Pipeline`] without ever blocking. A fixed
//! pool of workers drains the shared queue in batches and delivers each batch
//! through a [`Backend`], retrying transient failures with jittered back-off.
//!
//! ```text
//!  send() ──> BoundedQueue ──> worker 1 ── Backend (HTTP ingest / S3)
//!                         └──> worker N ── Backend
//! ```
//!
//! ## Modules
//!
//! - [`pipeline`]: producer handle, worker lifecycle, flush and shutdown
//! - [`worker`]: the consume loop, batching and retry driver
//! - [`queue`]: bounded FIFO with in-flight accounting
//! - [`backend`]: delivery targets (HTTP ingestion API, object storage)
//! - [`retry`]: back-off schedules
//! - [`meter`]: typed, validated meter records
//!
//! ## Example
//!
//! ```rust,ignore
//! use meter_ingest::{create_ingest_pipeline, MeterRecord, PipelineConfig};
//!
//! let pipeline = create_ingest_pipeline("my-api-key", PipelineConfig::default())?;
//! let record = MeterRecord::new("api-calls", 1.0, meter_ingest::now_in_millis(), "customer-1")?;
//! pipeline.meter(&record);
//! pipeline.shutdown().await;
//! ```

#![deny(clippy::all)]
#![deny(clippy::pedantic)]
#![deny(clippy::unwrap_used)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_precision_loss)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

/// Delivery targets
pub mod backend;

/// Pipeline and backend configuration, defaults and environment loading
pub mod config;

/// Error types and retry classification
pub mod error;

/// Log line formatting
pub mod logger;

/// Typed meter records
pub mod meter;

/// Producer handle and worker lifecycle
pub mod pipeline;

/// Bounded FIFO shared by producer and workers
pub mod queue;

/// Back-off schedules
pub mod retry;

/// Record counters
pub mod stats;

/// Batch consume loop
pub mod worker;

/// A single opaque record. Workers never look inside; backends serialize it.
pub type Record = serde_json::Value;

/// `User-Agent` sent by the HTTP backend.
pub const USER_AGENT: &str = concat!("meter-ingest/", env!("CARGO_PKG_VERSION"));

pub use backend::{Backend, IngestBackend};
pub use config::{BackendConfig, HttpBackendConfig, ObjectStoreBackendConfig, PipelineConfig};
pub use error::{classify, DeliveryError, ErrorClass, PipelineError, RecordError};
pub use meter::{now_in_millis, MeterRecord};
pub use pipeline::{create_ingest_pipeline, Pipeline};
pub use retry::{BackoffPolicy, Jitter};
pub use stats::StatsSnapshot;
