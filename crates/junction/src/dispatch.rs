// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Dispatcher seam.
//!
//! The subscription engine never touches the wire. It hands typed requests
//! to a [`Dispatch`] implementation together with a [`MessagingQos`] TTL
//! envelope, and the routing layer feeds replies and publications back
//! through the manager's `handle_*` operations. The engine holds the
//! dispatcher behind an `Arc<dyn Dispatch>`; the dispatcher never holds the
//! engine, which keeps the callback graph acyclic.

use crate::config::{DEFAULT_MESSAGING_TTL_MS, MAX_MESSAGING_TTL_MS, NO_EXPIRY_DATE_MS};
use crate::error::Result;
use crate::messages::{BroadcastRequest, DiscoveryEntry, SubscriptionRequest, SubscriptionStop};
use serde::{Deserialize, Serialize};

/// Messaging TTL envelope attached to every outgoing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagingQos {
    /// Round-trip TTL for the message in milliseconds.
    pub ttl_ms: u64,
}

impl Default for MessagingQos {
    fn default() -> Self {
        Self {
            ttl_ms: DEFAULT_MESSAGING_TTL_MS,
        }
    }
}

impl MessagingQos {
    /// Create an envelope with an explicit TTL, capped at
    /// [`MAX_MESSAGING_TTL_MS`].
    #[must_use]
    pub fn from_ttl_ms(ttl_ms: u64) -> Self {
        Self {
            ttl_ms: ttl_ms.min(MAX_MESSAGING_TTL_MS),
        }
    }

    /// Envelope for a subscription request against the given expiry date:
    /// `min(expiry - now, MAX_MESSAGING_TTL_MS)`, or the cap when the
    /// subscription never expires. An already-passed expiry yields zero.
    #[must_use]
    pub fn until_expiry(expiry_date_ms: u64, now_ms: u64) -> Self {
        let ttl_ms = if expiry_date_ms == NO_EXPIRY_DATE_MS {
            MAX_MESSAGING_TTL_MS
        } else {
            expiry_date_ms
                .saturating_sub(now_ms)
                .min(MAX_MESSAGING_TTL_MS)
        };
        Self { ttl_ms }
    }
}

/// Sink for outgoing subscription traffic.
///
/// Implementations serialize the request onto the wire and return as soon as
/// the message is enqueued; the engine never reads dispatcher state back.
/// Implementations must be safe for concurrent sends.
pub trait Dispatch: Send + Sync {
    /// Send an attribute subscription request to the provider.
    fn send_subscription_request(
        &self,
        provider: &DiscoveryEntry,
        proxy_id: &str,
        request: &SubscriptionRequest,
        messaging_qos: &MessagingQos,
    ) -> Result<()>;

    /// Send a broadcast subscription request (selective or multicast).
    fn send_broadcast_subscription_request(
        &self,
        provider: &DiscoveryEntry,
        proxy_id: &str,
        request: &BroadcastRequest,
        messaging_qos: &MessagingQos,
    ) -> Result<()>;

    /// Send a subscription stop for a unicast subscription.
    fn send_subscription_stop(
        &self,
        provider: &DiscoveryEntry,
        proxy_id: &str,
        stop: &SubscriptionStop,
        messaging_qos: &MessagingQos,
    ) -> Result<()>;

    /// Send a subscription stop for a multicast subscription. The multicast
    /// id travels as a side channel so routing entries can be torn down.
    fn send_multicast_subscription_stop(
        &self,
        provider: &DiscoveryEntry,
        proxy_id: &str,
        multicast_id: &str,
        stop: &SubscriptionStop,
        messaging_qos: &MessagingQos,
    ) -> Result<()>;
}
