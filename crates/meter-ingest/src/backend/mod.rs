// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::config::BackendConfig;
use crate::error::{DeliveryError, PipelineError};
use crate::Record;
use async_trait::async_trait;

pub mod http;
pub mod object_store;

pub use self::http::HttpBackend;
pub use self::object_store::ObjectStoreBackend;

/// Delivers one batch of records to a destination.
///
/// Each worker owns its backend exclusively, so implementations may keep
/// per-connection state without locking. A backend must not retry on its own;
/// the worker drives retries based on the returned error.
#[async_trait]
pub trait Backend: Send {
    async fn send(&mut self, batch: &[Record]) -> Result<(), DeliveryError>;
}

#[async_trait]
impl Backend for Box<dyn Backend> {
    async fn send(&mut self, batch: &[Record]) -> Result<(), DeliveryError> {
        (**self).send(batch).await
    }
}

/// The built-in backends, selected by [`BackendConfig`].
#[derive(Debug)]
pub enum IngestBackend {
    Http(HttpBackend),
    ObjectStore(ObjectStoreBackend),
}

impl IngestBackend {
    pub fn from_config(config: &BackendConfig) -> Result<Self, PipelineError> {
        match config {
            BackendConfig::Http(http) => Ok(Self::Http(HttpBackend::new(http)?)),
            BackendConfig::ObjectStore(store) => {
                Ok(Self::ObjectStore(ObjectStoreBackend::new(store)?))
            }
        }
    }
}

#[async_trait]
impl Backend for IngestBackend {
    async fn send(&mut self, batch: &[Record]) -> Result<(), DeliveryError> {
        match self {
            Self::Http(backend) => backend.send(batch).await,
            Self::ObjectStore(backend) => backend.send(batch).await,
        }
    }
}
