// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fixed-period subscription QoS.

use super::clamp_publication_ttl;
use crate::config::{
    DEFAULT_PERIOD_MS, DEFAULT_PUBLICATION_TTL_MS, MAX_ALERT_AFTER_INTERVAL_MS, MAX_PERIOD_MS,
    MIN_PERIOD_MS, NO_ALERT_AFTER_INTERVAL_MS, NO_EXPIRY_DATE_MS,
};
use serde::{Deserialize, Serialize};

/// QoS policy for a fixed-period attribute subscription.
///
/// The provider publishes the current value every `period_ms`, independent of
/// value changes. A nonzero `alert_after_interval_ms` arms the consumer-side
/// missed-publication watchdog; it is kept at or above `period_ms` so a
/// healthy provider never trips it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodicQos {
    /// Absolute expiry in epoch milliseconds (0 = never).
    pub expiry_date_ms: u64,
    /// Per-publication message TTL.
    pub publication_ttl_ms: u64,
    /// Fixed publication period.
    pub period_ms: u64,
    /// Quiet window before a missed-publication alert; 0 = never alert.
    pub alert_after_interval_ms: u64,
}

impl Default for PeriodicQos {
    fn default() -> Self {
        Self {
            expiry_date_ms: NO_EXPIRY_DATE_MS,
            publication_ttl_ms: DEFAULT_PUBLICATION_TTL_MS,
            period_ms: DEFAULT_PERIOD_MS,
            alert_after_interval_ms: NO_ALERT_AFTER_INTERVAL_MS,
        }
    }
}

impl PeriodicQos {
    /// Create a periodic QoS with default settings.
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

    /// Set the publication period, clamped to
    /// `[MIN_PERIOD_MS, MAX_PERIOD_MS]`. A nonzero alert window is raised to
    /// the new period when it fell below it.
    #[must_use]
    pub fn with_period_ms(mut self, period_ms: u64) -> Self {
        self.period_ms = if period_ms < MIN_PERIOD_MS {
            log::warn!(
                "[qos] period {}ms below minimum, using {}ms",
                period_ms,
                MIN_PERIOD_MS
            );
            MIN_PERIOD_MS
        } else if period_ms > MAX_PERIOD_MS {
            log::warn!(
                "[qos] period {}ms above maximum, using {}ms",
                period_ms,
                MAX_PERIOD_MS
            );
            MAX_PERIOD_MS
        } else {
            period_ms
        };

        if self.alert_after_interval_ms != NO_ALERT_AFTER_INTERVAL_MS
            && self.alert_after_interval_ms < self.period_ms
        {
            self.alert_after_interval_ms = self.period_ms;
        }
        self
    }

    /// Set the missed-publication alert window.
    ///
    /// 0 disables alerting. A nonzero value is raised to `period_ms` when
    /// smaller and clamped to `MAX_ALERT_AFTER_INTERVAL_MS`.
    #[must_use]
    pub fn with_alert_after_interval_ms(mut self, alert_after_interval_ms: u64) -> Self {
        self.alert_after_interval_ms = if alert_after_interval_ms > MAX_ALERT_AFTER_INTERVAL_MS {
            MAX_ALERT_AFTER_INTERVAL_MS
        } else {
            alert_after_interval_ms
        };

        if self.alert_after_interval_ms != NO_ALERT_AFTER_INTERVAL_MS
            && self.alert_after_interval_ms < self.period_ms
        {
            log::warn!(
                "[qos] alert window {}ms below period, using {}ms",
                self.alert_after_interval_ms,
                self.period_ms
            );
            self.alert_after_interval_ms = self.period_ms;
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
