// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscription quality-of-service policies.
//!
//! Four subscription kinds exist, each with its own policy type:
//!
//! - [`OnChangeQos`] - publish when the attribute changes, rate-limited by a
//!   minimum interval.
//! - [`OnChangeWithKeepAliveQos`] - on-change plus a heartbeat: the provider
//!   republishes at least every maximum interval, and the consumer may raise
//!   a missed-publication alert when a quiet window exceeds
//!   `alert_after_interval_ms`.
//! - [`PeriodicQos`] - fixed-period publications, with the same optional
//!   alert window.
//! - [`MulticastQos`] - non-selective broadcast fan-out; carries only expiry
//!   and publication TTL.
//!
//! All setters clamp instead of failing: out-of-range values are pulled to
//! the nearest bound and a warning is logged. Bounds live in [`crate::config`].

mod on_change;
mod periodic;

pub use on_change::{OnChangeQos, OnChangeWithKeepAliveQos};
pub use periodic::PeriodicQos;

use crate::config::{
    self, DEFAULT_PUBLICATION_TTL_MS, MAX_PUBLICATION_TTL_MS, MIN_PUBLICATION_TTL_MS,
    NO_EXPIRY_DATE_MS,
};
use serde::{Deserialize, Serialize};

/// Clamp a publication TTL to its accepted range.
pub(crate) fn clamp_publication_ttl(ttl_ms: u64) -> u64 {
    if ttl_ms < MIN_PUBLICATION_TTL_MS {
        log::warn!(
            "[qos] publication ttl {}ms below minimum, using {}ms",
            ttl_ms,
            MIN_PUBLICATION_TTL_MS
        );
        MIN_PUBLICATION_TTL_MS
    } else if ttl_ms > MAX_PUBLICATION_TTL_MS {
        log::warn!(
            "[qos] publication ttl {}ms above maximum, using {}ms",
            ttl_ms,
            MAX_PUBLICATION_TTL_MS
        );
        MAX_PUBLICATION_TTL_MS
    } else {
        ttl_ms
    }
}

/// QoS policy for a non-selective (multicast) broadcast subscription.
///
/// Multicast deliveries never feed a heartbeat watchdog, so this kind has no
/// interval or alert settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MulticastQos {
    /// Absolute expiry in wall-clock epoch milliseconds.
    /// [`NO_EXPIRY_DATE_MS`] means the subscription never expires.
    pub expiry_date_ms: u64,
    /// Per-publication message TTL.
    pub publication_ttl_ms: u64,
}

impl Default for MulticastQos {
    fn default() -> Self {
        Self {
            expiry_date_ms: NO_EXPIRY_DATE_MS,
            publication_ttl_ms: DEFAULT_PUBLICATION_TTL_MS,
        }
    }
}

impl MulticastQos {
    /// Create a multicast QoS with default expiry (never) and TTL.
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
        let now = config::now_ms();
        self.with_expiry_date_ms(now.saturating_add(validity_ms))
    }

    /// Set the per-publication TTL, clamped to the accepted range.
    #[must_use]
    pub fn with_publication_ttl_ms(mut self, ttl_ms: u64) -> Self {
        self.publication_ttl_ms = clamp_publication_ttl(ttl_ms);
        self
    }
}

/// Subscription QoS, tagged by subscription kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SubscriptionQos {
    /// On-change attribute subscription.
    OnChange(OnChangeQos),
    /// On-change attribute subscription with keep-alive heartbeat.
    OnChangeWithKeepAlive(OnChangeWithKeepAliveQos),
    /// Fixed-period attribute subscription.
    Periodic(PeriodicQos),
    /// Non-selective broadcast subscription.
    Multicast(MulticastQos),
}

impl SubscriptionQos {
    /// Absolute expiry date in epoch milliseconds
    /// ([`NO_EXPIRY_DATE_MS`] = never).
    #[must_use]
    pub fn expiry_date_ms(&self) -> u64 {
        match self {
            SubscriptionQos::OnChange(q) => q.expiry_date_ms,
            SubscriptionQos::OnChangeWithKeepAlive(q) => q.expiry_date_ms,
            SubscriptionQos::Periodic(q) => q.expiry_date_ms,
            SubscriptionQos::Multicast(q) => q.expiry_date_ms,
        }
    }

    /// Per-publication message TTL in milliseconds.
    #[must_use]
    pub fn publication_ttl_ms(&self) -> u64 {
        match self {
            SubscriptionQos::OnChange(q) => q.publication_ttl_ms,
            SubscriptionQos::OnChangeWithKeepAlive(q) => q.publication_ttl_ms,
            SubscriptionQos::Periodic(q) => q.publication_ttl_ms,
            SubscriptionQos::Multicast(q) => q.publication_ttl_ms,
        }
    }

    /// Alert window for the missed-publication watchdog.
    ///
    /// Returns [`config::NO_ALERT_AFTER_INTERVAL_MS`] for kinds that never
    /// alert (plain on-change, multicast).
    #[must_use]
    pub fn alert_after_interval_ms(&self) -> u64 {
        match self {
            SubscriptionQos::OnChangeWithKeepAlive(q) => q.alert_after_interval_ms,
            SubscriptionQos::Periodic(q) => q.alert_after_interval_ms,
            SubscriptionQos::OnChange(_) | SubscriptionQos::Multicast(_) => {
                config::NO_ALERT_AFTER_INTERVAL_MS
            }
        }
    }

    /// Expected publication heartbeat: the keep-alive maximum interval or
    /// the period. `None` for kinds without a heartbeat.
    #[must_use]
    pub fn heartbeat_ms(&self) -> Option<u64> {
        match self {
            SubscriptionQos::OnChangeWithKeepAlive(q) => Some(q.max_interval_ms),
            SubscriptionQos::Periodic(q) => Some(q.period_ms),
            SubscriptionQos::OnChange(_) | SubscriptionQos::Multicast(_) => None,
        }
    }

    /// Whether the expiry date has passed at `now_ms`.
    #[must_use]
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        let expiry = self.expiry_date_ms();
        expiry != NO_EXPIRY_DATE_MS && expiry <= now_ms
    }

    /// Whether the subscription ends within `delay_ms` of `now_ms`.
    #[must_use]
    pub fn ends_within(&self, now_ms: u64, delay_ms: u64) -> bool {
        let expiry = self.expiry_date_ms();
        expiry != NO_EXPIRY_DATE_MS && expiry <= now_ms.saturating_add(delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DEFAULT_MAX_INTERVAL_MS, NO_ALERT_AFTER_INTERVAL_MS};

    #[test]
    fn test_multicast_defaults() {
        let qos = MulticastQos::default();
        assert_eq!(qos.expiry_date_ms, NO_EXPIRY_DATE_MS);
        assert_eq!(qos.publication_ttl_ms, DEFAULT_PUBLICATION_TTL_MS);
    }

    #[test]
    fn test_multicast_ttl_clamped() {
        let qos = MulticastQos::new().with_publication_ttl_ms(1);
        assert_eq!(qos.publication_ttl_ms, MIN_PUBLICATION_TTL_MS);

        let qos = MulticastQos::new().with_publication_ttl_ms(u64::MAX);
        assert_eq!(qos.publication_ttl_ms, MAX_PUBLICATION_TTL_MS);
    }

    #[test]
    fn test_validity_sets_future_expiry() {
        let qos = MulticastQos::new().with_validity_ms(5_000);
        assert!(qos.expiry_date_ms > config::now_ms());
    }

    #[test]
    fn test_accessors_per_kind() {
        let keep_alive = SubscriptionQos::OnChangeWithKeepAlive(
            OnChangeWithKeepAliveQos::default().with_alert_after_interval_ms(90_000),
        );
        assert_eq!(keep_alive.alert_after_interval_ms(), 90_000);
        assert_eq!(keep_alive.heartbeat_ms(), Some(DEFAULT_MAX_INTERVAL_MS));

        let on_change = SubscriptionQos::OnChange(OnChangeQos::default());
        assert_eq!(
            on_change.alert_after_interval_ms(),
            NO_ALERT_AFTER_INTERVAL_MS
        );
        assert_eq!(on_change.heartbeat_ms(), None);

        let multicast = SubscriptionQos::Multicast(MulticastQos::default());
        assert_eq!(multicast.heartbeat_ms(), None);
    }

    #[test]
    fn test_expiry_checks() {
        let qos = SubscriptionQos::Multicast(MulticastQos::new().with_expiry_date_ms(10_000));
        assert!(!qos.is_expired_at(9_999));
        assert!(qos.is_expired_at(10_000));
        assert!(qos.ends_within(9_000, 1_000));
        assert!(!qos.ends_within(8_000, 1_000));

        let never = SubscriptionQos::Multicast(MulticastQos::default());
        assert!(!never.is_expired_at(u64::MAX));
        assert!(!never.ends_within(u64::MAX - 1, 1));
    }
}
