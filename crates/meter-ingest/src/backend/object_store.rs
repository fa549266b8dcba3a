// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery to an S3 bucket (or any other [`ObjectStore`]).
//!
//! Every batch becomes one uncompressed JSON array object named
//! `{uuid}-{dd-Mon-YYYY-HH-MM-SS-ffffff}.json`, optionally under a key prefix.

use crate::backend::Backend;
use crate::config::{BackendConfig, ObjectStoreBackendConfig};
use crate::error::{DeliveryError, PipelineError};
use crate::Record;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use object_store::aws::AmazonS3Builder;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload, RetryConfig};
use std::error::Error;
use std::fmt;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

pub struct ObjectStoreBackend {
    store: Arc<dyn ObjectStore>,
    prefix: Option<Path>,
}

impl fmt::Debug for ObjectStoreBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectStoreBackend")
            .field("store", &self.store.to_string())
            .field("prefix", &self.prefix)
            .finish()
    }
}

impl ObjectStoreBackend {
    /// Builds an S3 client. Credentials and region not set in `config` are
    /// read from the standard `AWS_*` environment variables.
    pub fn new(config: &ObjectStoreBackendConfig) -> Result<Self, PipelineError> {
        BackendConfig::ObjectStore(config.clone()).validate()?;

        // Retries are driven by the worker, not by the store client.
        let retry = RetryConfig {
            max_retries: 0,
            ..RetryConfig::default()
        };
        let mut builder = AmazonS3Builder::from_env()
            .with_bucket_name(&config.bucket)
            .with_retry(retry);

        if let Some(access_key) = &config.access_key {
            builder = builder.with_access_key_id(access_key);
        }
        if let Some(secret_key) = &config.secret_key {
            builder = builder.with_secret_access_key(secret_key);
        }
        if let Some(region) = &config.region {
            builder = builder.with_region(region);
        }
        if let Some(endpoint) = &config.endpoint {
            builder = builder
                .with_endpoint(endpoint)
                .with_virtual_hosted_style_request(false)
                .with_allow_http(true);
        }

        let store = builder
            .build()
            .map_err(|e| PipelineError::Backend(e.to_string()))?;

        Ok(Self::with_store(Arc::new(store), config.prefix.clone()))
    }

    /// Writes into an existing store, e.g. `object_store::memory::InMemory`.
    pub fn with_store(store: Arc<dyn ObjectStore>, prefix: Option<String>) -> Self {
        Self {
            store,
            prefix: prefix
                .filter(|p| !p.trim_matches('/').is_empty())
                .map(Path::from),
        }
    }

    fn object_path(&self, now: DateTime<Utc>) -> Path {
        let name = object_name(Uuid::new_v4(), now);
        match &self.prefix {
            Some(prefix) => prefix.child(name),
            None => Path::from(name),
        }
    }
}

fn object_name(id: Uuid, now: DateTime<Utc>) -> String {
    format!("{id}-{}.json", now.format("%d-%b-%Y-%H-%M-%S-%6f"))
}

#[async_trait]
impl Backend for ObjectStoreBackend {
    async fn send(&mut self, batch: &[Record]) -> Result<(), DeliveryError> {
        let body = serde_json::to_vec(batch)
            .map_err(|e| DeliveryError::transport(format!("Failed to serialize batch: {e}")))?;
        let path = self.object_path(Utc::now());
        debug!("Writing {} records to {}", batch.len(), path);

        self.store
            .put(&path, PutPayload::from(body))
            .await
            .map(|_| ())
            .map_err(into_delivery_error)
    }
}

/// Maps store failures onto the HTTP-like status space used for retry
/// classification.
fn into_delivery_error(err: object_store::Error) -> DeliveryError {
    let status = match &err {
        object_store::Error::NotFound { .. } => Some(404),
        object_store::Error::PermissionDenied { .. } => Some(403),
        object_store::Error::Unauthenticated { .. } => Some(401),
        object_store::Error::AlreadyExists { .. } => Some(409),
        object_store::Error::Precondition { .. } => Some(412),
        object_store::Error::NotModified { .. } => Some(304),
        other => status_from_source(other),
    };
    match status {
        Some(status) => DeliveryError::with_status(status, err.to_string()),
        None => DeliveryError::transport(err.to_string()),
    }
}

/// Recovers the response status from the client error wrapped by
/// `object_store::Error::Generic`, whose message reads
/// `"Client error with status 400 Bad Request: ..."`.
fn status_from_source(err: &(dyn Error + 'static)) -> Option<u16> {
    let mut current = Some(err);
    while let Some(e) = current {
        if let Some(status) = parse_status(&e.to_string()) {
            return Some(status);
        }
        current = e.source();
    }
    None
}

fn parse_status(message: &str) -> Option<u16> {
    let (_, rest) = message.split_once("with status ")?;
    let digits: String = rest.chars().take_while(char::is_ascii_digit).collect();
    match digits.parse::<u16>() {
        Ok(status) if (100..600).contains(&status) => Some(status),
        _ => None,
    }
}
