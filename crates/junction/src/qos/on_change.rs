// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! On-change subscription QoS, with and without keep-alive heartbeat.

use super::clamp_publication_ttl;
use crate::config::{
    DEFAULT_MAX_INTERVAL_MS, DEFAULT_MIN_INTERVAL_MS, DEFAULT_PUBLICATION_TTL_MS,
    MAX_ALERT_AFTER_INTERVAL_MS, MAX_MAX_INTERVAL_MS, MAX_MIN_INTERVAL_MS, MIN_MAX_INTERVAL_MS,
    NO_ALERT_AFTER_INTERVAL_MS, NO_EXPIRY_DATE_MS,
};
use serde::{Deserialize, Serialize};

/// QoS policy for an on-change attribute subscription.
///
/// The provider publishes whenever the attribute value changes, but never
/// more often than once per `min_interval_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnChangeQos {
    /// Absolute expiry in epoch milliseconds (0 = never).
    pub expiry_date_ms: u64,
    /// Per-publication message TTL.
    pub publication_ttl_ms: u64,
    /// Lower bound on publication spacing.
    pub min_interval_ms: u64,
}

impl Default for OnChangeQos {
    fn default() -> Self {
        Self {
            expiry_date_ms: NO_EXPIRY_DATE_MS,
            publication_ttl_ms: DEFAULT_PUBLICATION_TTL_MS,
            min_interval_ms: DEFAULT_MIN_INTERVAL_MS,
        }
    }
}

impl OnChangeQos {
    /// Create an on-change QoS with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the absolute expiry date (epoch milliseconds).
    #[must_use]
    pub fn with_expiry_date_ms(mut self, expiry_date_ms: u64) -> Self {
        self.expiry_date_ms = expiry_date_ms;
        self
    }

    /// Set the expiry relative to now.
    #[must_use]
    pub fn with_validity_ms(self, validity_ms: u64) -> Self {
        let now = crate::config::now_ms();
        self.with_expiry_date_ms(now.saturating_add(validity_ms))
    }

    /// Set the per-publication TTL, clamped to the accepted range.
    #[must_use]
    pub fn with_publication_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.publication_ttl_ms = clamp_publication_ttl(ttl_ms);
        self
    }

    /// Set the minimum publication spacing, clamped to the accepted range.
    #[must_use]
    pub fn with_min_interval_ms(mut self, min_interval_ms: u64) -> Self {
        self.min_interval_ms = clamp_min_interval(min_interval_ms);
        self
    }
}

fn clamp_min_interval(min_interval_ms: u64) -> u64 {
    if min_interval_ms > MAX_MIN_INTERVAL_MS {
        log::warn!(
            "[qos] min interval {}ms above maximum, using {}ms",
            min_interval_ms,
            MAX_MIN_INTERVAL_MS
        );
        MAX_MIN_INTERVAL_MS
    } else {
        min_interval_ms
    }
}

/// QoS policy for an on-change subscription with keep-alive heartbeat.
///
/// On top of [`OnChangeQos`] semantics, the provider republishes the current
/// value at least every `max_interval_ms` even when it did not change. When
/// `alert_after_interval_ms` is nonzero, the consumer raises a
/// missed-publication alert after that long without any publication.
///
/// Invariants maintained by the setters:
///
/// - `max_interval_ms` is clamped to
///   `[MIN_MAX_INTERVAL_MS, MAX_MAX_INTERVAL_MS]` and never below
///   `min_interval_ms`.
/// - `alert_after_interval_ms` is either 0 (never alert) or at least
///   `max_interval_ms`, and never above `MAX_ALERT_AFTER_INTERVAL_MS`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OnChangeWithKeepAliveQos {
    /// Absolute expiry in epoch milliseconds (0 = never).
    pub expiry_date_ms: u64,
    /// Per-publication message TTL.
    pub publication_ttl_ms: u64,
    /// Lower bound on publication spacing.
    pub min_interval_ms: u64,
    /// Heartbeat upper bound: a publication arrives at least this often.
    pub max_interval_ms: u64,
    /// Quiet window before a missed-publication alert; 0 = never alert.
    pub alert_after_interval_ms: u64,
}

impl Default for OnChangeWithKeepAliveQos {
    fn default() -> Self {
        Self {
            expiry_date_ms: NO_EXPIRY_DATE_MS,
            publication_ttl_ms: DEFAULT_PUBLICATION_TTL_MS,
            min_interval_ms: DEFAULT_MIN_INTERVAL_MS,
            max_interval_ms: DEFAULT_MAX_INTERVAL_MS,
            alert_after_interval_ms: NO_ALERT_AFTER_INTERVAL_MS,
        }
    }
}

impl OnChangeWithKeepAliveQos {
    /// Create a keep-alive QoS with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the absolute expiry date (epoch milliseconds).
    #[must_use]
    pub fn with_expiry_date_ms(mut self, expiry_date_ms: u64) -> Self {
        self.expiry_date_ms = expiry_date_ms;
        self
    }

    /// Set the expiry relative to now.
    #[must_use]
    pub fn with_validity_ms(self, validity_ms: u64) -> Self {
        let now = crate::config::now_ms();
        self.with_expiry_date_ms(now.saturating_add(validity_ms))
    }

    /// Set the per-publication TTL, clamped to the accepted range.
    #[must_use]
    pub fn with_publication_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.publication_ttl_ms = clamp_publication_ttl(ttl_ms);
        self
    }

    /// Set the minimum publication spacing.
    ///
    /// Re-applies the `max_interval_ms` adjustment so the heartbeat never
    /// undercuts the new spacing.
    #[must_use]
    pub fn with_min_interval_ms(mut self, min_interval_ms: u64) -> Self {
        self.min_interval_ms = clamp_min_interval(min_interval_ms);
        let max_interval_ms = self.max_interval_ms;
        self.with_max_interval_ms(max_interval_ms)
    }

    /// Set the heartbeat interval, clamped to
    /// `[MIN_MAX_INTERVAL_MS, MAX_MAX_INTERVAL_MS]` and raised to
    /// `min_interval_ms` when smaller.
    ///
    /// Re-applies the alert adjustment: a nonzero alert window is raised to
    /// the new heartbeat when it fell below it.
    #[must_use]
    pub fn with_max_interval_ms(mut self, max_interval_ms: u64) -> Self {
        self.max_interval_ms = if max_interval_ms < MIN_MAX_INTERVAL_MS {
            MIN_MAX_INTERVAL_MS
        } else if max_interval_ms > MAX_MAX_INTERVAL_MS {
            MAX_MAX_INTERVAL_MS
        } else {
            max_interval_ms
        };

        if self.max_interval_ms < self.min_interval_ms {
            self.max_interval_ms = self.min_interval_ms;
        }

        if self.alert_after_interval_ms != NO_ALERT_AFTER_INTERVAL_MS
            && self.alert_after_interval_ms < self.max_interval_ms
        {
            self.alert_after_interval_ms = self.max_interval_ms;
        }
        self
    }

    /// Set the missed-publication alert window.
    ///
    /// 0 disables alerting. A nonzero value is raised to `max_interval_ms`
    /// when smaller (an alert window shorter than the heartbeat would fire
    /// on every healthy cycle) and clamped to `MAX_ALERT_AFTER_INTERVAL_MS`.
    #[must_use]
    pub fn with_alert_after_interval_ms(mut self, alert_after_interval_ms: u64) -> Self {
        self.alert_after_interval_ms = if alert_after_interval_ms > MAX_ALERT_AFTER_INTERVAL_MS {
            log::warn!(
                "[qos] alert window {}ms above maximum, using {}ms",
                alert_after_interval_ms,
                MAX_ALERT_AFTER_INTERVAL_MS
            );
            MAX_ALERT_AFTER_INTERVAL_MS
        } else {
            alert_after_interval_ms
        };

        if self.alert_after_interval_ms != NO_ALERT_AFTER_INTERVAL_MS
            && self.alert_after_interval_ms < self.max_interval_ms
        {
            log::warn!(
                "[qos] alert window {}ms below heartbeat, using {}ms",
                self.alert_after_interval_ms,
                self.max_interval_ms
            );
            self.alert_after_interval_ms = self.max_interval_ms;
        }
        self
    }

    /// Disable the missed-publication alert.
    #[must_use]
    pub fn clear_alert_after_interval(mut self) -> Self {
        self.alert_after_interval_ms = NO_ALERT_AFTER_INTERVAL_MS;
        self
    }
}
