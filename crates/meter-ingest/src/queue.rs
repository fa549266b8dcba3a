// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Fixed-capacity FIFO shared by the producer and the workers.
//!
//! ```text
//!   send() ─enqueue─> [ items ... ] ─dequeue_batch─> worker ─acknowledge(n)
//!                      in_flight += 1                        in_flight -= n
//! ```
//!
//! `in_flight` counts every record accepted and not yet resolved, whether it
//! is still queued or held by a worker. `flush` waits for it to reach zero.
//! A single mutex guards both the items and the counter; [`Notify`] handles
//! are only used for wake-ups, never to carry state.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{timeout_at, Instant};

#[derive(Debug)]
struct State<T> {
    items: VecDeque<T>,
    in_flight: usize,
}

#[derive(Debug)]
pub struct BoundedQueue<T> {
    capacity: usize,
    state: Mutex<State<T>>,
    /// Signalled once per enqueued item.
    available: Notify,
    /// Signalled when `in_flight` drops to zero.
    drained: Notify,
}

impl<T> BoundedQueue<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            state: Mutex::new(State {
                items: VecDeque::new(),
                in_flight: 0,
            }),
            available: Notify::new(),
            drained: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<T>> {
        // Every critical section leaves the state consistent, so a panic in
        // another holder does not invalidate it.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds one item. Returns `false` right away when the queue is full.
    pub fn enqueue(&self, item: T) -> bool {
        {
            let mut state = self.lock();
            if state.items.len() >= self.capacity {
                return false;
            }
            state.items.push_back(item);
            state.in_flight += 1;
        }
        self.available.notify_one();
        true
    }

    /// Collects up to `max_count` items, waiting at most `max_wait` overall.
    ///
    /// Returns as soon as the batch is full or the deadline passes, with
    /// whatever was collected by then (possibly nothing). Items already queued
    /// are always taken, even with a zero wait.
    pub async fn dequeue_batch(&self, max_count: usize, max_wait: Duration) -> Vec<T> {
        let deadline = deadline_after(max_wait);
        let mut batch = Vec::new();
        if max_count == 0 {
            return batch;
        }

        loop {
            self.take_into(&mut batch, max_count);
            if batch.len() >= max_count || Instant::now() >= deadline {
                return batch;
            }
            if timeout_at(deadline, self.available.notified()).await.is_err() {
                self.take_into(&mut batch, max_count);
                return batch;
            }
        }
    }

    fn take_into(&self, batch: &mut Vec<T>, max_count: usize) {
        let leftover = {
            let mut state = self.lock();
            let take = (max_count - batch.len()).min(state.items.len());
            batch.extend(state.items.drain(..take));
            !state.items.is_empty()
        };
        // Hand the wake-up on to another waiting worker.
        if leftover {
            self.available.notify_one();
        }
    }

    /// Marks `n` dequeued items as resolved (delivered or dropped).
    pub fn acknowledge(&self, n: usize) {
        let drained = {
            let mut state = self.lock();
            debug_assert!(n <= state.in_flight, "acknowledged more than in flight");
            state.in_flight = state.in_flight.saturating_sub(n);
            state.in_flight == 0
        };
        if drained {
            self.drained.notify_waiters();
        }
    }

    /// Resolves once every accepted item has been acknowledged.
    pub async fn drain_wait(&self) {
        loop {
            let drained = self.drained.notified();
            tokio::pin!(drained);
            // Register before checking so an acknowledge in between is not lost.
            drained.as_mut().enable();
            if self.in_flight() == 0 {
                return;
            }
            drained.await;
        }
    }

    /// Number of items waiting to be dequeued.
    pub fn len(&self) -> usize {
        self.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Accepted items not yet acknowledged, queued ones included.
    pub fn in_flight(&self) -> usize {
        self.lock().in_flight
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// `max_wait` from now, saturating at roughly 30 years for waits that
/// would overflow `Instant`.
fn deadline_after(max_wait: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(max_wait)
        .unwrap_or_else(|| now + Duration::from_secs(86_400 * 365 * 30))
}
