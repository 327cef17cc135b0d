// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::ReconnectPolicy;

#[yare::parameterized(
    first = { 1, 1000 },
    second = { 2, 2000 },
    third = { 3, 4000 },
    fourth = { 4, 8000 },
    fifth = { 5, 16000 },
)]
fn default_schedule_doubles(attempt: u32, expected_ms: u64) {
    let policy = ReconnectPolicy::default();
    assert_eq!(policy.delay(attempt), Some(Duration::from_millis(expected_ms)));
}

#[test]
fn stops_after_max_attempts() {
    let policy = ReconnectPolicy::default();
    assert_eq!(policy.max_attempts, 5);
    assert_eq!(policy.delay(6), None);
    assert_eq!(policy.delay(u32::MAX), None);
}

#[test]
fn attempt_zero_has_no_delay() {
    assert_eq!(ReconnectPolicy::default().delay(0), None);
}

#[test]
fn large_attempt_limits_saturate() {
    let policy = ReconnectPolicy { base_delay: Duration::from_secs(1), max_attempts: 64 };
    assert_eq!(policy.delay(40), Some(Duration::from_secs(u64::from(u32::MAX))));
}
