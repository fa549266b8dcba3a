// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Back-off schedule for retrying a failed batch.
//!
//! A [`BackoffPolicy`] is a sequence of nominal delays, one per retry, whose
//! last entry repeats for as long as retries remain. With [`Jitter::Full`]
//! the actual wait is drawn uniformly from `[0, nominal]`, so on average a
//! worker waits half the nominal delay and competing workers spread out.
//!
//! ```text
//! attempt:   1      2        3        4         5         6         7
//!            send ─ ~2s ─ send ─ ~6s ─ send ─ ~12s ─ send ─ ~20s ─ ...
//! ```

use rand::Rng;
use std::time::Duration;

/// Nominal delays (seconds) used by [`BackoffPolicy::default`].
const DEFAULT_DELAYS_SECS: [u64; 6] = [2, 6, 12, 20, 40, 80];

/// How the nominal delay is randomised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Jitter {
    /// Uniform in `[0, nominal]`.
    #[default]
    Full,
    /// Exactly the nominal delay.
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffPolicy {
    delays: Vec<Duration>,
    jitter: Jitter,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            delays: DEFAULT_DELAYS_SECS
                .iter()
                .map(|secs| Duration::from_secs(*secs))
                .collect(),
            jitter: Jitter::Full,
        }
    }
}

impl BackoffPolicy {
    #[must_use]
    pub fn new(delays: Vec<Duration>, jitter: Jitter) -> Self {
        Self { delays, jitter }
    }

    /// Retries happen back to back.
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            delays: Vec::new(),
            jitter: Jitter::None,
        }
    }

    #[must_use]
    pub fn jitter(&self) -> Jitter {
        self.jitter
    }

    /// Delay before retry number `retry` (0-based), before jitter.
    #[must_use]
    pub fn nominal_delay(&self, retry: usize) -> Duration {
        self.delays
            .get(retry)
            .or_else(|| self.delays.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }

    /// Delay before retry number `retry` (0-based), jitter applied.
    #[must_use]
    pub fn delay(&self, retry: usize) -> Duration {
        let nominal = self.nominal_delay(retry);
        match self.jitter {
            Jitter::None => nominal,
            Jitter::Full => nominal.mul_f64(rand::thread_rng().gen::<f64>()),
        }
    }
}

/// Per-batch retry bookkeeping. Dropped once the batch resolves.
#[derive(Debug)]
pub(crate) struct RetryState {
    retries_made: usize,
    max_retries: usize,
}

impl RetryState {
    pub(crate) fn new(max_retries: usize) -> Self {
        Self {
            retries_made: 0,
            max_retries,
        }
    }

    /// Attempts made so far, counting the first send.
    pub(crate) fn attempts(&self) -> usize {
        self.retries_made + 1
    }

    /// Claims the next retry, returning how long to wait before it, or `None`
    /// when the retry budget is spent.
    pub(crate) fn next_delay(&mut self, policy: &BackoffPolicy) -> Option<Duration> {
        if self.retries_made >= self.max_retries {
            return None;
        }
        let delay = policy.delay(self.retries_made);
        self.retries_made += 1;
        Some(delay)
    }
}
