// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Error types and the retry classification policy.
//!
//! Delivery failures are plain data ([`DeliveryError`]: an optional HTTP-like
//! status plus a message) so that every backend is classified by the same
//! pure function, [`classify`]. Construction-time problems are reported as
//! [`PipelineError`]; they are the only errors a caller ever sees as a
//! `Result`.

use std::fmt;

/// Failure reported by a [`Backend`](crate::backend::Backend) for one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryError {
    status: Option<u16>,
    message: String,
}

impl DeliveryError {
    /// Error carrying an HTTP (or HTTP-like) status code.
    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    /// Error without a status code: connection failures, timeouts, encoding.
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn status(&self) -> Option<u16> {
        self.status
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    #[must_use]
    pub fn is_retryable(&self) -> bool {
        classify(self) == ErrorClass::Retryable
    }
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "{status}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for DeliveryError {}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// Outcome of [`classify`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient; the batch is sent again after a back-off delay.
    Retryable,
    /// Permanent; the batch is dropped immediately.
    Fatal,
}

/// Decides whether a failed delivery is worth retrying.
///
/// Client errors (`4xx`) are fatal except `429 Too Many Requests`. Server
/// errors, any other status and errors without a status are retryable.
#[must_use]
pub fn classify(err: &DeliveryError) -> ErrorClass {
    match err.status {
        Some(429) => ErrorClass::Retryable,
        Some(400..=499) => ErrorClass::Fatal,
        _ => ErrorClass::Retryable,
    }
}

/// Errors raised while building a pipeline or one of its backends.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No tokio runtime available to spawn workers")]
    NoRuntime,

    #[error("Failed to build backend: {0}")]
    Backend(String),
}

/// Validation errors for [`MeterRecord`](crate::meter::MeterRecord).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordError {
    #[error("'{0}' may not be an empty string")]
    Blank(String),

    #[error("'meter_time_in_millis' must be 1 or greater")]
    NonPositiveTime,

    #[error("'meter_value' must be a finite number")]
    NonFiniteValue,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_errors_are_retryable() {
        for status in [500, 502, 503, 504, 599] {
            let err = DeliveryError::with_status(status, "server error");
            assert_eq!(classify(&err), ErrorClass::Retryable, "status {status}");
        }
    }

    #[test]
    fn test_rate_limit_is_retryable() {
        let err = DeliveryError::with_status(429, "slow down");
        assert_eq!(classify(&err), ErrorClass::Retryable);
        assert!(err.is_retryable());
    }

    #[test]
    fn test_client_errors_are_fatal() {
        for status in [400, 401, 403, 404, 413, 499] {
            let err = DeliveryError::with_status(status, "client error");
            assert_eq!(classify(&err), ErrorClass::Fatal, "status {status}");
        }
    }

    #[test]
    fn test_errors_without_status_are_retryable() {
        let err = DeliveryError::transport("connection refused");
        assert_eq!(err.status(), None);
        assert_eq!(classify(&err), ErrorClass::Retryable);
    }

    #[test]
    fn test_unexpected_redirect_is_retryable() {
        let err = DeliveryError::with_status(302, "moved");
        assert_eq!(classify(&err), ErrorClass::Retryable);
    }

    #[test]
    fn test_delivery_error_display() {
        let err = DeliveryError::with_status(400, "bad request");
        assert_eq!(err.to_string(), "400: bad request");

        let err = DeliveryError::transport("timed out");
        assert_eq!(err.to_string(), "timed out");
    }

    #[test]
    fn test_pipeline_error_display() {
        let error = PipelineError::InvalidConfig("batch_size must be greater than 0".to_string());
        assert_eq!(
            error.to_string(),
            "Invalid configuration: batch_size must be greater than 0"
        );
    }
}
