// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Typed meter events.
//!
//! The pipeline itself accepts any JSON value; [`MeterRecord`] is the shape
//! the ingestion endpoint expects, validated up front so malformed events
//! fail at the call site instead of as a dropped batch later.
//!
//! ```json
//! {
//!   "uniqueId": "6c3a...",
//!   "meterApiName": "api-calls",
//!   "meterValue": 1.0,
//!   "customerId": "customer-123",
//!   "meterTimeInMillis": 1700000000000,
//!   "dimensions": { "region": "us-east-1" }
//! }
//! ```

use crate::error::RecordError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeterRecord {
    /// Lets the server tell real duplicates from two events that share a
    /// meter name and timestamp.
    unique_id: String,
    meter_api_name: String,
    meter_value: f64,
    customer_id: String,
    meter_time_in_millis: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dimensions: Option<BTreeMap<String, String>>,
}

impl MeterRecord {
    pub fn new(
        meter_api_name: impl Into<String>,
        meter_value: f64,
        meter_time_in_millis: i64,
        customer_id: impl Into<String>,
    ) -> Result<Self, RecordError> {
        let meter_api_name = require_non_blank("meter_api_name", meter_api_name.into())?;
        let customer_id = require_non_blank("customer_id", customer_id.into())?;
        if !meter_value.is_finite() {
            return Err(RecordError::NonFiniteValue);
        }
        if meter_time_in_millis <= 0 {
            return Err(RecordError::NonPositiveTime);
        }

        Ok(Self {
            unique_id: Uuid::new_v4().to_string(),
            meter_api_name,
            meter_value,
            customer_id,
            meter_time_in_millis,
            dimensions: None,
        })
    }

    pub fn with_unique_id(mut self, unique_id: impl Into<String>) -> Result<Self, RecordError> {
        self.unique_id = require_non_blank("unique_id", unique_id.into())?;
        Ok(self)
    }

    pub fn with_dimensions<I, K, V>(mut self, dimensions: I) -> Result<Self, RecordError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut validated = BTreeMap::new();
        for (key, value) in dimensions {
            let key = require_non_blank("dimensions.<key>", key.into())?;
            let value = require_non_blank(&format!("dimensions.{key}"), value.into())?;
            validated.insert(key, value);
        }
        self.dimensions = Some(validated);
        Ok(self)
    }

    #[must_use]
    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    #[must_use]
    pub fn meter_api_name(&self) -> &str {
        &self.meter_api_name
    }

    #[must_use]
    pub fn meter_value(&self) -> f64 {
        self.meter_value
    }

    #[must_use]
    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    #[must_use]
    pub fn meter_time_in_millis(&self) -> i64 {
        self.meter_time_in_millis
    }

    #[must_use]
    pub fn dimensions(&self) -> Option<&BTreeMap<String, String>> {
        self.dimensions.as_ref()
    }
}

/// Current wall-clock time as milliseconds since the Unix epoch.
#[must_use]
pub fn now_in_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn require_non_blank(name: &str, value: String) -> Result<String, RecordError> {
    if value.trim().is_empty() {
        return Err(RecordError::Blank(name.to_string()));
    }
    Ok(value)
}
