// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicU64, Ordering};

/// Record counters shared by the producer side and the workers.
#[derive(Debug, Default)]
pub struct PipelineStats {
    accepted: AtomicU64,
    rejected: AtomicU64,
    delivered: AtomicU64,
    dropped: AtomicU64,
}

/// Point-in-time copy of [`PipelineStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Records taken into the queue by `send`.
    pub accepted: u64,
    /// Records refused by `send` (queue full or oversized).
    pub rejected: u64,
    /// Records in batches the backend accepted.
    pub delivered: u64,
    /// Records in batches given up on.
    pub dropped: u64,
}

impl PipelineStats {
    pub(crate) fn record_accepted(&self) {
        self.accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_delivered(&self, n: usize) {
        self.delivered.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self, n: usize) {
        self.dropped.fetch_add(n as u64, Ordering::Relaxed);
    }

    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            delivered: self.delivered.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let stats = PipelineStats::default();
        stats.record_accepted();
        stats.record_accepted();
        stats.record_rejected();
        stats.record_delivered(10);
        stats.record_dropped(3);
        stats.record_delivered(5);

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                accepted: 2,
                rejected: 1,
                delivered: 15,
                dropped: 3,
            }
        );
    }
}
