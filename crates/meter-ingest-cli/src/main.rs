// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

use std::env;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use meter_ingest::{logger::Formatter, BackendConfig, Pipeline, PipelineConfig, Record};

#[tokio::main]
pub async fn main() {
    let log_level = env::var("METER_INGEST_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or("info".to_string());

    let env_filter = format!("h2=off,hyper=off,rustls=off,reqwest=off,{log_level}");

    #[allow(clippy::expect_used)]
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_new(env_filter).expect("could not parse log level in configuration"),
        )
        .event_format(Formatter)
        .finish();

    #[allow(clippy::expect_used)]
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    debug!("Logging subsystem enabled");

    let config = match PipelineConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("{e}. Shutting down.");
            return;
        }
    };

    let backend = match BackendConfig::from_env() {
        Ok(backend) => backend,
        Err(e) => {
            error!("{e}. Shutting down.");
            return;
        }
    };

    let pipeline = match Pipeline::from_backend_config(&backend, config) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            error!("Failed to start pipeline: {e}");
            return;
        }
    };

    info!(
        threads = pipeline.config().threads,
        "Reading newline-delimited JSON records from stdin"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut line_number = 0_usize;

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    line_number += 1;
                    ingest_line(&pipeline, line_number, &line);
                }
                Ok(None) => break,
                Err(e) => {
                    error!("Failed to read stdin: {e}");
                    break;
                }
            },
            _ = &mut ctrl_c => {
                info!("Interrupted, flushing queued records");
                break;
            }
        }
    }

    tokio::select! {
        () = pipeline.shutdown() => {}
        _ = tokio::signal::ctrl_c() => {
            warn!(pending = pipeline.in_flight(), "Interrupted again, abandoning queued records");
            pipeline.join().await;
        }
    }

    let stats = pipeline.stats();
    info!(
        accepted = stats.accepted,
        rejected = stats.rejected,
        delivered = stats.delivered,
        dropped = stats.dropped,
        "Done"
    );
}

fn ingest_line(pipeline: &Pipeline, line_number: usize, line: &str) {
    let line = line.trim();
    if line.is_empty() {
        return;
    }
    match serde_json::from_str::<Record>(line) {
        Ok(record) => {
            if !pipeline.send(record) {
                debug!(line_number, "Record not accepted");
            }
        }
        Err(e) => warn!(line_number, "Skipping malformed record: {e}"),
    }
}
