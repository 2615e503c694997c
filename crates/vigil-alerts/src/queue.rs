//! A bounded FIFO between rule evaluation and dispatch.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::warn;

use crate::types::Alert;

/// A bounded, lock-protected alert queue.
///
/// Pushing never blocks: when the queue is full the oldest alert is
/// dropped, logged, and counted.
#[derive(Debug)]
pub struct AlertQueue {
    items: Mutex<VecDeque<Alert>>,
    capacity: usize,
    dropped: AtomicU64,
}

impl AlertQueue {
    /// Default capacity.
    pub const DEFAULT_CAPACITY: usize = 256;

    /// Creates a queue holding at most `capacity` alerts (at least one).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueues an alert, evicting the oldest one if full.
    ///
    /// Returns the evicted alert, if any.
    pub fn push(&self, alert: Alert) -> Option<Alert> {
        let mut items = self.items.lock();
        let evicted = if items.len() >= self.capacity {
            items.pop_front()
        } else {
            None
        };
        items.push_back(alert);
        drop(items);

        if let Some(old) = &evicted {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                alert_id = %old.id,
                rule_name = %old.rule_name,
                capacity = self.capacity,
                "alert queue full, dropped oldest alert"
            );
        }
        evicted
    }

    /// Enqueues several alerts in order.
    pub fn extend(&self, alerts: impl IntoIterator<Item = Alert>) {
        for alert in alerts {
            self.push(alert);
        }
    }

    /// Removes and returns everything currently queued, oldest first.
    #[must_use]
    pub fn drain(&self) -> Vec<Alert> {
        self.items.lock().drain(..).collect()
    }

    /// Returns the number of queued alerts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    /// Returns the capacity.
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns how many alerts were dropped on overflow.
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for AlertQueue {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}
