// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Junction Global Configuration - Single Source of Truth
//!
//! This module centralizes ALL subscription QoS bounds and messaging
//! constants. **NEVER hardcode elsewhere!**
//!
//! Every interval is a `u64` millisecond count. Absolute points in time
//! (expiry dates, publication timestamps) are wall-clock milliseconds since
//! the Unix epoch; relative intervals (heartbeats, alert windows, TTLs) are
//! plain durations. Both fit comfortably in 64 bits, so intervals beyond the
//! 32-bit millisecond window (~49 days) never overflow.

use std::time::{SystemTime, UNIX_EPOCH};

// =======================================================================
// Keep-alive heartbeat (max interval) bounds
// =======================================================================

/// Smallest accepted keep-alive interval. Values below are raised to this.
pub const MIN_MAX_INTERVAL_MS: u64 = 50;

/// Largest accepted keep-alive interval: 30 days. Values above are clamped.
pub const MAX_MAX_INTERVAL_MS: u64 = 2_592_000_000;

/// Keep-alive interval used when the caller does not choose one: 1 minute.
pub const DEFAULT_MAX_INTERVAL_MS: u64 = 60_000;

// =======================================================================
// Missed-publication alert bounds
// =======================================================================

/// Sentinel: no missed-publication alert is ever raised.
pub const NO_ALERT_AFTER_INTERVAL_MS: u64 = 0;

/// Largest accepted alert window: 30 days. Values above are clamped.
pub const MAX_ALERT_AFTER_INTERVAL_MS: u64 = 2_592_000_000;

// =======================================================================
// Periodic publication bounds
// =======================================================================

/// Smallest accepted publication period. Values below are raised to this.
pub const MIN_PERIOD_MS: u64 = 50;

/// Largest accepted publication period: 30 days. Values above are clamped.
pub const MAX_PERIOD_MS: u64 = 2_592_000_000;

/// Publication period used when the caller does not choose one: 1 minute.
pub const DEFAULT_PERIOD_MS: u64 = 60_000;

// =======================================================================
// On-change rate limiting bounds
// =======================================================================

/// Default lower bound on publication spacing for on-change subscriptions.
pub const DEFAULT_MIN_INTERVAL_MS: u64 = 1_000;

/// Largest accepted minimum interval: 30 days. Values above are clamped.
pub const MAX_MIN_INTERVAL_MS: u64 = 2_592_000_000;

// =======================================================================
// Publication message TTL bounds
// =======================================================================

/// Smallest accepted per-publication TTL. Values below are raised to this.
pub const MIN_PUBLICATION_TTL_MS: u64 = 100;

/// Largest accepted per-publication TTL: 30 days. Values above are clamped.
pub const MAX_PUBLICATION_TTL_MS: u64 = 2_592_000_000;

/// Per-publication TTL used when the caller does not choose one: 10 seconds.
pub const DEFAULT_PUBLICATION_TTL_MS: u64 = 10_000;

// =======================================================================
// Messaging envelope
// =======================================================================

/// Upper bound on any outgoing message TTL: 30 days.
///
/// Subscription requests are sent with
/// `min(expiry_date - now, MAX_MESSAGING_TTL_MS)`.
pub const MAX_MESSAGING_TTL_MS: u64 = 2_592_000_000;

/// Message TTL used when the caller does not choose one: 1 minute.
pub const DEFAULT_MESSAGING_TTL_MS: u64 = 60_000;

// =======================================================================
// Subscription identity and expiry
// =======================================================================

/// Sentinel expiry date: the subscription never expires.
pub const NO_EXPIRY_DATE_MS: u64 = 0;

/// Length of generated subscription ids (URL-safe alphabet).
pub const SUBSCRIPTION_ID_LEN: usize = 20;

/// Current wall-clock time in milliseconds since the Unix epoch.
///
/// Saturates to 0 if the system clock reports a time before the epoch.
#[must_use]
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_bounds_are_consistent() {
        assert!(MIN_MAX_INTERVAL_MS < DEFAULT_MAX_INTERVAL_MS);
        assert!(DEFAULT_MAX_INTERVAL_MS < MAX_MAX_INTERVAL_MS);
        assert!(MIN_PERIOD_MS < DEFAULT_PERIOD_MS);
        assert!(DEFAULT_PERIOD_MS < MAX_PERIOD_MS);
        assert!(MIN_PUBLICATION_TTL_MS < DEFAULT_PUBLICATION_TTL_MS);
        assert_eq!(MAX_ALERT_AFTER_INTERVAL_MS, MAX_MAX_INTERVAL_MS);
    }

    #[test]
    fn test_now_ms_is_nonzero_and_monotonic_enough() {
        let a = now_ms();
        let b = now_ms();
        assert!(a > 0);
        assert!(b >= a);
    }
}
