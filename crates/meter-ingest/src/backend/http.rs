// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Delivery to the HTTP ingestion API.
//!
//! Each batch is serialized as a JSON array, gzip-compressed and posted to
//! `{endpoint}/ingest/`. Any `2xx` response counts as accepted; everything
//! else becomes a [`DeliveryError`] carrying the status and response body.

use crate::backend::Backend;
use crate::config::{BackendConfig, HttpBackendConfig};
use crate::error::{DeliveryError, PipelineError};
use crate::{Record, USER_AGENT};
use async_trait::async_trait;
use flate2::{write::GzEncoder, Compression};
use reqwest::header::{self, HeaderMap, HeaderValue};
use std::error::Error;
use std::io::Write;
use std::time::Duration;
use tracing::{debug, error};

const API_KEY_HEADER: &str = "x-api-key";

#[derive(Debug)]
pub struct HttpBackend {
    client: reqwest::Client,
    url: String,
    headers: HeaderMap,
    compression: Compression,
}

impl HttpBackend {
    pub fn new(config: &HttpBackendConfig) -> Result<Self, PipelineError> {
        BackendConfig::Http(config.clone()).validate()?;

        Ok(Self {
            client: get_client(config),
            url: ingest_url(&config.endpoint),
            headers: build_headers(&config.api_key)?,
            compression: Compression::new(config.compression_level),
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    fn encode(&self, batch: &[Record]) -> Result<Vec<u8>, DeliveryError> {
        let json = serde_json::to_vec(batch)
            .map_err(|e| DeliveryError::transport(format!("Failed to serialize batch: {e}")))?;

        let mut encoder = GzEncoder::new(Vec::new(), self.compression);
        encoder
            .write_all(&json)
            .and_then(|()| encoder.finish())
            .map_err(|e| DeliveryError::transport(format!("Failed to compress batch: {e}")))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn send(&mut self, batch: &[Record]) -> Result<(), DeliveryError> {
        let body = self.encode(batch)?;
        debug!(
            "Posting {} records ({} bytes compressed) to {}",
            batch.len(),
            body.len(),
            self.url
        );

        let response = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .body(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        Err(DeliveryError::with_status(status.as_u16(), text))
    }
}

fn ingest_url(endpoint: &str) -> String {
    format!("{}/ingest/", endpoint.trim_end_matches('/'))
}

fn build_headers(api_key: &str) -> Result<HeaderMap, PipelineError> {
    let mut api_key = HeaderValue::from_str(api_key).map_err(|_| {
        PipelineError::InvalidConfig("api_key is not a valid header value".to_string())
    })?;
    api_key.set_sensitive(true);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    headers.insert(header::ACCEPT, HeaderValue::from_static("application/json"));
    headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static("gzip"));
    headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));
    headers.insert(API_KEY_HEADER, api_key);
    Ok(headers)
}

/// Builds the client, falling back to a direct connection when the proxy
/// settings are unusable.
fn get_client(config: &HttpBackendConfig) -> reqwest::Client {
    match build_client_inner(config, true) {
        Ok(client) => client,
        Err(e) => {
            error!(
                "Unable to parse proxy configuration: {}, falling back to direct connection",
                e
            );
            match build_client_inner(config, false) {
                Ok(client) => client,
                Err(inner) => {
                    error!(
                        "Failed to build HTTP client without proxy: {}, using reqwest defaults",
                        inner
                    );
                    reqwest::Client::new()
                }
            }
        }
    }
}

fn build_client_inner(
    config: &HttpBackendConfig,
    allow_proxy: bool,
) -> Result<reqwest::Client, Box<dyn Error>> {
    let mut client = reqwest::Client::builder()
        .timeout(config.timeout)
        .pool_idle_timeout(Some(Duration::from_secs(270)))
        .tcp_keepalive(Some(Duration::from_secs(120)));

    if allow_proxy {
        if let Some(https_uri) = &config.https_proxy {
            // Proxies are far more likely to speak HTTP/1 than h2.
            client = client.http1_only().proxy(reqwest::Proxy::https(https_uri.clone())?);
        }
    }

    Ok(client.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use serde_json::json;
    use std::io::Read;

    #[test]
    fn test_ingest_url_trims_trailing_slash() {
        assert_eq!(
            ingest_url("https://ingest.example.com/"),
            "https://ingest.example.com/ingest/"
        );
        assert_eq!(
            ingest_url("http://127.0.0.1:1234"),
            "http://127.0.0.1:1234/ingest/"
        );
    }

    #[test]
    fn test_headers() {
        let headers = build_headers("secret-key").unwrap();
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
        assert_eq!(headers[header::ACCEPT], "application/json");
        assert_eq!(headers[header::CONTENT_ENCODING], "gzip");
        assert_eq!(headers[API_KEY_HEADER], "secret-key");
        assert!(headers[API_KEY_HEADER].is_sensitive());
        assert!(headers[header::USER_AGENT]
            .to_str()
            .unwrap()
            .starts_with("meter-ingest/"));
    }

    #[test]
    fn test_debug_does_not_leak_api_key() {
        let backend = HttpBackend::new(&HttpBackendConfig::new("secret-key")).unwrap();
        assert!(!format!("{backend:?}").contains("secret-key"));
    }

    #[test]
    fn test_invalid_api_key_header() {
        let result = HttpBackend::new(&HttpBackendConfig::new("bad\nkey"));
        assert!(matches!(result, Err(PipelineError::InvalidConfig(_))));
    }

    #[test]
    fn test_encode_is_gzipped_json_array() {
        let backend = HttpBackend::new(&HttpBackendConfig::new("key")).unwrap();
        let batch = vec![json!({"a": 1}), json!({"b": "two"})];

        let body = backend.encode(&batch).unwrap();
        let mut decoded = String::new();
        GzDecoder::new(body.as_slice())
            .read_to_string(&mut decoded)
            .unwrap();

        let value: serde_json::Value = serde_json::from_str(&decoded).unwrap();
        assert_eq!(value, json!([{"a": 1}, {"b": "two"}]));
    }

    #[test]
    fn test_invalid_proxy_falls_back() {
        let mut config = HttpBackendConfig::new("key");
        config.https_proxy = Some("::not a url::".to_string());
        assert!(build_client_inner(&config, false).is_ok());
        let _client = get_client(&config);
    }
}
