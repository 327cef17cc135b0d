// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Inbound frame observers.
//!
//! An observer is keyed either by bare event name (`"user:status"`) or by
//! the compound `kind:event` key (`"auth:success"`). A frame reaches every
//! observer whose key matches either form, in registration order.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use pulse::protocol::Frame;

type Callback = Arc<dyn Fn(&Frame) + Send + Sync>;

/// Handle returned by [`Observers::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(u64);

#[derive(Default)]
pub struct Observers {
    entries: RwLock<Vec<(ObserverId, String, Callback)>>,
    next_id: AtomicU64,
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, key: impl Into<String>, callback: F) -> ObserverId
    where
        F: Fn(&Frame) + Send + Sync + 'static,
    {
        let id = ObserverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.entries.write().push((id, key.into(), Arc::new(callback)));
        id
    }

    /// Remove one observer. Returns false if it was already gone.
    pub fn off(&self, id: ObserverId) -> bool {
        let mut entries = self.entries.write();
        let before = entries.len();
        entries.retain(|(entry_id, _, _)| *entry_id != id);
        entries.len() != before
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Invoke every matching observer. Returns how many ran.
    ///
    /// Callbacks run outside the lock, so an observer may register or
    /// remove observers; such changes apply from the next frame.
    pub fn notify(&self, frame: &Frame) -> usize {
        let compound = frame.compound_key();
        let matched: Vec<Callback> = self
            .entries
            .read()
            .iter()
            .filter(|(_, key, _)| key == frame.event.as_str() || *key == compound)
            .map(|(_, _, cb)| Arc::clone(cb))
            .collect();
        for callback in &matched {
            callback(frame);
        }
        matched.len()
    }
}

#[cfg(test)]
#[path = "observers_tests.rs"]
mod tests;
