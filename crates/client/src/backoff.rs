// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

/// Exponential reconnect schedule with a hard attempt limit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub base_delay: Duration,
    pub max_attempts: u32,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self { base_delay: Duration::from_millis(1000), max_attempts: 5 }
    }
}

impl ReconnectPolicy {
    /// Delay before reconnect `attempt` (1-based): `base * 2^(attempt-1)`.
    ///
    /// Returns `None` once `attempt` exceeds `max_attempts`, and for attempt 0.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt > self.max_attempts {
            return None;
        }
        let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
        Some(self.base_delay.saturating_mul(factor))
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
