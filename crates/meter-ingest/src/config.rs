// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Pipeline and backend settings, with defaults and `METER_INGEST_*`
//! environment overrides.

use crate::error::{DeliveryError, PipelineError};
use crate::retry::BackoffPolicy;
use crate::Record;
use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Default ingestion endpoint for [`HttpBackendConfig`].
pub const DEFAULT_INGEST_URL: &str = "https://ingest.amberflo.io";

const DEFAULT_MAX_QUEUE_SIZE: usize = 100_000;
const DEFAULT_THREADS: usize = 2;
const DEFAULT_BATCH_SIZE: usize = 100;
const DEFAULT_SEND_INTERVAL: Duration = Duration::from_millis(500);
const DEFAULT_SLEEP_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_RETRIES: usize = 6;
const DEFAULT_MAX_RECORD_SIZE_BYTES: usize = 1_024 * 1_024;
const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_COMPRESSION_LEVEL: u32 = 6;

/// Invoked with the error and the records of every dropped batch.
///
/// Several workers may call it at the same time.
pub type ErrorCallback = Arc<dyn Fn(&DeliveryError, &[Record]) + Send + Sync>;

/// Pipeline tuning. Immutable once the pipeline is built.
#[derive(Clone)]
pub struct PipelineConfig {
    /// Maximum number of records waiting in the queue.
    pub max_queue_size: usize,
    /// Number of workers (each with its own backend).
    pub threads: usize,
    /// Maximum number of records per batch.
    pub batch_size: usize,
    /// How long a worker waits for more records before sending a partial batch.
    pub send_interval: Duration,
    /// Pause after an empty batch.
    pub sleep_interval: Duration,
    /// Additional attempts after the first failed send of a batch.
    pub retries: usize,
    pub backoff: BackoffPolicy,
    /// Records whose JSON encoding is larger than this are rejected by `send`.
    pub max_record_size_bytes: Option<usize>,
    pub on_error: Option<ErrorCallback>,
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("max_queue_size", &self.max_queue_size)
            .field("threads", &self.threads)
            .field("batch_size", &self.batch_size)
            .field("send_interval", &self.send_interval)
            .field("sleep_interval", &self.sleep_interval)
            .field("retries", &self.retries)
            .field("backoff", &self.backoff)
            .field("max_record_size_bytes", &self.max_record_size_bytes)
            .field("on_error", &self.on_error.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_queue_size: DEFAULT_MAX_QUEUE_SIZE,
            threads: DEFAULT_THREADS,
            batch_size: DEFAULT_BATCH_SIZE,
            send_interval: DEFAULT_SEND_INTERVAL,
            sleep_interval: DEFAULT_SLEEP_INTERVAL,
            retries: DEFAULT_RETRIES,
            backoff: BackoffPolicy::default(),
            max_record_size_bytes: Some(DEFAULT_MAX_RECORD_SIZE_BYTES),
            on_error: None,
        }
    }
}

impl PipelineConfig {
    /// Create configuration from environment variables.
    ///
    /// Unset or unparsable values keep their defaults.
    pub fn from_env() -> Result<Self, PipelineError> {
        let defaults = Self::default();
        let max_record_size_bytes = match env_parse::<usize>("METER_INGEST_MAX_RECORD_BYTES") {
            Some(0) => None,
            Some(limit) => Some(limit),
            None => defaults.max_record_size_bytes,
        };

        let config = Self {
            max_queue_size: env_parse("METER_INGEST_QUEUE_SIZE").unwrap_or(defaults.max_queue_size),
            threads: env_parse("METER_INGEST_THREADS").unwrap_or(defaults.threads),
            batch_size: env_parse("METER_INGEST_BATCH_SIZE").unwrap_or(defaults.batch_size),
            send_interval: env_parse("METER_INGEST_SEND_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.send_interval),
            sleep_interval: env_parse("METER_INGEST_SLEEP_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.sleep_interval),
            retries: env_parse("METER_INGEST_RETRIES").unwrap_or(defaults.retries),
            max_record_size_bytes,
            ..defaults
        };

        config.validate()?;
        Ok(config)
    }

    #[must_use]
    pub fn with_on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&DeliveryError, &[Record]) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_queue_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "max_queue_size must be greater than 0".to_string(),
            ));
        }

        if self.batch_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "batch_size must be greater than 0".to_string(),
            ));
        }

        if self.max_record_size_bytes == Some(0) {
            return Err(PipelineError::InvalidConfig(
                "max_record_size_bytes must be greater than 0 when set".to_string(),
            ));
        }

        Ok(())
    }
}

/// Where batches go. Chosen explicitly, never inferred from which
/// credentials happen to be present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendConfig {
    Http(HttpBackendConfig),
    ObjectStore(ObjectStoreBackendConfig),
}

impl BackendConfig {
    /// Create configuration from environment variables.
    ///
    /// `METER_INGEST_BACKEND` selects `http` (default) or `s3`.
    pub fn from_env() -> Result<Self, PipelineError> {
        let kind = env::var("METER_INGEST_BACKEND")
            .map(|val| val.to_lowercase())
            .unwrap_or_else(|_| "http".to_string());

        let config = match kind.as_str() {
            "http" => {
                let api_key = env::var("METER_INGEST_API_KEY").map_err(|_| {
                    PipelineError::InvalidConfig("METER_INGEST_API_KEY is not set".to_string())
                })?;
                let mut http = HttpBackendConfig::new(api_key);
                if let Ok(endpoint) = env::var("METER_INGEST_ENDPOINT") {
                    http.endpoint = endpoint;
                }
                if let Some(secs) = env_parse::<u64>("METER_INGEST_TIMEOUT_SECS") {
                    http.timeout = Duration::from_secs(secs);
                }
                http.https_proxy = env::var("METER_INGEST_PROXY_HTTPS")
                    .or_else(|_| env::var("HTTPS_PROXY"))
                    .ok();
                Self::Http(http)
            }
            "s3" => {
                let bucket = env::var("METER_INGEST_BUCKET").map_err(|_| {
                    PipelineError::InvalidConfig("METER_INGEST_BUCKET is not set".to_string())
                })?;
                Self::ObjectStore(ObjectStoreBackendConfig {
                    bucket,
                    access_key: env::var("METER_INGEST_ACCESS_KEY").ok(),
                    secret_key: env::var("METER_INGEST_SECRET_KEY").ok(),
                    region: env::var("METER_INGEST_REGION").ok(),
                    endpoint: env::var("METER_INGEST_S3_ENDPOINT").ok(),
                    prefix: env::var("METER_INGEST_PREFIX").ok(),
                })
            }
            other => {
                return Err(PipelineError::InvalidConfig(format!(
                    "Invalid backend '{other}'. Must be one of: http, s3"
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        match self {
            Self::Http(http) => {
                if http.api_key.trim().is_empty() {
                    return Err(PipelineError::InvalidConfig(
                        "api_key may not be empty".to_string(),
                    ));
                }
                if http.endpoint.trim().is_empty() {
                    return Err(PipelineError::InvalidConfig(
                        "endpoint may not be empty".to_string(),
                    ));
                }
                if http.compression_level > 9 {
                    return Err(PipelineError::InvalidConfig(format!(
                        "compression_level {} is out of range 0-9",
                        http.compression_level
                    )));
                }
            }
            Self::ObjectStore(store) => {
                if store.bucket.trim().is_empty() {
                    return Err(PipelineError::InvalidConfig(
                        "bucket may not be empty".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Settings for [`HttpBackend`](crate::backend::http::HttpBackend).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpBackendConfig {
    pub api_key: String,
    /// Base URL; batches are posted to `{endpoint}/ingest/`.
    pub endpoint: String,
    pub timeout: Duration,
    pub https_proxy: Option<String>,
    /// gzip level, 0-9.
    pub compression_level: u32,
}

impl HttpBackendConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            endpoint: DEFAULT_INGEST_URL.to_string(),
            timeout: DEFAULT_HTTP_TIMEOUT,
            https_proxy: None,
            compression_level: DEFAULT_COMPRESSION_LEVEL,
        }
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

/// Settings for [`ObjectStoreBackend`](crate::backend::object_store::ObjectStoreBackend).
///
/// Credentials left as `None` are picked up from the usual AWS environment.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ObjectStoreBackendConfig {
    pub bucket: String,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub region: Option<String>,
    /// Custom S3-compatible endpoint (MinIO, LocalStack).
    pub endpoint: Option<String>,
    /// Key prefix for every object written.
    pub prefix: Option<String>,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    env::var(key).ok().and_then(|val| val.trim().parse::<T>().ok())
}
