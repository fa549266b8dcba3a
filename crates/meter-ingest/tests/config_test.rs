// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use meter_ingest::{BackendConfig, PipelineConfig, PipelineError};
use std::env;
use std::time::Duration;

const PIPELINE_VARS: [&str; 7] = [
    "METER_INGEST_QUEUE_SIZE",
    "METER_INGEST_THREADS",
    "METER_INGEST_BATCH_SIZE",
    "METER_INGEST_SEND_INTERVAL_MS",
    "METER_INGEST_SLEEP_INTERVAL_MS",
    "METER_INGEST_RETRIES",
    "METER_INGEST_MAX_RECORD_BYTES",
];

const BACKEND_VARS: [&str; 9] = [
    "METER_INGEST_BACKEND",
    "METER_INGEST_API_KEY",
    "METER_INGEST_ENDPOINT",
    "METER_INGEST_TIMEOUT_SECS",
    "METER_INGEST_PROXY_HTTPS",
    "METER_INGEST_BUCKET",
    "METER_INGEST_REGION",
    "METER_INGEST_S3_ENDPOINT",
    "METER_INGEST_PREFIX",
];

fn clear(vars: &[&str]) {
    for var in vars {
        env::remove_var(var);
    }
}

// Environment variables are process-wide, so every case runs in one test.
#[test]
fn test_config_from_env() {
    clear(&PIPELINE_VARS);
    clear(&BACKEND_VARS);

    // Defaults
    let config = PipelineConfig::from_env().unwrap();
    assert_eq!(config.max_queue_size, 100_000);
    assert_eq!(config.threads, 2);

    // Overrides, with an unparsable value falling back to its default
    env::set_var("METER_INGEST_QUEUE_SIZE", "50");
    env::set_var("METER_INGEST_THREADS", "4");
    env::set_var("METER_INGEST_BATCH_SIZE", "not-a-number");
    env::set_var("METER_INGEST_SEND_INTERVAL_MS", "250");
    env::set_var("METER_INGEST_RETRIES", "0");
    env::set_var("METER_INGEST_MAX_RECORD_BYTES", "0");
    let config = PipelineConfig::from_env().unwrap();
    assert_eq!(config.max_queue_size, 50);
    assert_eq!(config.threads, 4);
    assert_eq!(config.batch_size, 100);
    assert_eq!(config.send_interval, Duration::from_millis(250));
    assert_eq!(config.retries, 0);
    assert_eq!(config.max_record_size_bytes, None);

    env::set_var("METER_INGEST_QUEUE_SIZE", "0");
    assert!(matches!(
        PipelineConfig::from_env(),
        Err(PipelineError::InvalidConfig(_))
    ));
    clear(&PIPELINE_VARS);

    // HTTP backend needs an API key
    assert!(BackendConfig::from_env().is_err());
    env::set_var("METER_INGEST_API_KEY", "env-key");
    env::set_var("METER_INGEST_ENDPOINT", "http://localhost:8080");
    env::set_var("METER_INGEST_PROXY_HTTPS", "http://proxy:3128");
    match BackendConfig::from_env().unwrap() {
        BackendConfig::Http(http) => {
            assert_eq!(http.api_key, "env-key");
            assert_eq!(http.endpoint, "http://localhost:8080");
            assert_eq!(http.https_proxy.as_deref(), Some("http://proxy:3128"));
        }
        other => panic!("unexpected backend {other:?}"),
    }

    // Object store backend is chosen explicitly, not from which keys are set
    env::set_var("METER_INGEST_BACKEND", "S3");
    assert!(BackendConfig::from_env().is_err());
    env::set_var("METER_INGEST_BUCKET", "meters");
    env::set_var("METER_INGEST_PREFIX", "ingest");
    match BackendConfig::from_env().unwrap() {
        BackendConfig::ObjectStore(store) => {
            assert_eq!(store.bucket, "meters");
            assert_eq!(store.prefix.as_deref(), Some("ingest"));
        }
        other => panic!("unexpected backend {other:?}"),
    }

    env::set_var("METER_INGEST_BACKEND", "ftp");
    assert!(BackendConfig::from_env().is_err());

    clear(&BACKEND_VARS);
}
