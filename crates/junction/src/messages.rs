// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Wire-facing subscription messages.
//!
//! Outbound requests flow to the dispatcher; inbound replies and
//! publications flow back from it. Field names follow the JSON wire
//! convention (camelCase); the serialization layer owns the outer envelope
//! and has already validated payload discriminators, so publication values
//! arrive here as typed [`serde_json::Value`]s.

use crate::error::Error;
use crate::qos::SubscriptionQos;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Discovery data for the provider a subscription is addressed to.
///
/// Produced by the discovery/arbitration layer; the subscription engine
/// treats it as opaque addressing except for the participant id, which also
/// prefixes multicast ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoveryEntry {
    /// Routable participant id of the provider.
    pub participant_id: String,
    /// Domain the provider was discovered in.
    pub domain: String,
    /// Fully qualified interface name the provider implements.
    pub interface_name: String,
}

impl DiscoveryEntry {
    /// Create a discovery entry.
    #[must_use]
    pub fn new(
        participant_id: impl Into<String>,
        domain: impl Into<String>,
        interface_name: impl Into<String>,
    ) -> Self {
        Self {
            participant_id: participant_id.into(),
            domain: domain.into(),
            interface_name: interface_name.into(),
        }
    }
}

// ============================================================================
// Outbound requests
// ============================================================================

/// Request to subscribe to a provider attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionRequest {
    /// Consumer-chosen subscription id, echoed in every reply/publication.
    pub subscription_id: String,
    /// Attribute name on the provider interface.
    pub subscribed_to_name: String,
    /// Subscription QoS.
    pub qos: SubscriptionQos,
}

/// Request to subscribe to a selective (filterable) broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BroadcastSubscriptionRequest {
    /// Consumer-chosen subscription id.
    pub subscription_id: String,
    /// Broadcast name on the provider interface.
    pub subscribed_to_name: String,
    /// Subscription QoS.
    pub qos: SubscriptionQos,
    /// Provider-side filter parameters.
    pub filter_parameters: BTreeMap<String, String>,
}

/// Request to join a non-selective multicast broadcast.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MulticastSubscriptionRequest {
    /// Consumer-chosen subscription id.
    pub subscription_id: String,
    /// Multicast id the consumer wants to receive, wildcards allowed.
    pub multicast_id: String,
    /// Broadcast name on the provider interface.
    pub subscribed_to_name: String,
    /// Subscription QoS.
    pub qos: SubscriptionQos,
}

/// Broadcast subscription request, selective or multicast.
///
/// The dispatcher sends both shapes through the same operation; the wire
/// shapes are distinguishable by their fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BroadcastRequest {
    /// Per-consumer filtered broadcast.
    Filtered(BroadcastSubscriptionRequest),
    /// Non-selective multicast.
    Multicast(MulticastSubscriptionRequest),
}

impl BroadcastRequest {
    /// Subscription id carried by either shape.
    #[must_use]
    pub fn subscription_id(&self) -> &str {
        match self {
            BroadcastRequest::Filtered(r) => &r.subscription_id,
            BroadcastRequest::Multicast(r) => &r.subscription_id,
        }
    }
}

/// Request to end a subscription, unicast or multicast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionStop {
    /// Id of the subscription to stop.
    pub subscription_id: String,
}

// ============================================================================
// Inbound events
// ============================================================================

/// Error reported by the provider side, preserved with its original kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteError {
    /// Error kind as named by the remote runtime.
    pub kind: String,
    /// Human-readable detail.
    pub message: String,
}

impl From<RemoteError> for Error {
    fn from(remote: RemoteError) -> Self {
        Error::Provider {
            kind: remote.kind,
            message: remote.message,
        }
    }
}

/// Provider acknowledgement (or rejection) of a subscription request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionReply {
    /// Id the reply correlates to.
    pub subscription_id: String,
    /// Present when the provider rejected the subscription.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

/// A single unicast value delivery or error for a subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionPublication {
    /// Id the publication belongs to.
    pub subscription_id: String,
    /// Delivered value; absent for error publications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    /// Provider-side error; does not terminate the subscription.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

/// A multicast value delivery or error, addressed by multicast id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MulticastPublication {
    /// Concrete (wildcard-free) multicast id this publication was sent on.
    pub multicast_id: String,
    /// Delivered value; absent for error publications.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
    /// Provider-side error.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RemoteError>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qos::MulticastQos;

    #[test]
    fn test_requests_serialize_camel_case() {
        let request = SubscriptionRequest {
            subscription_id: "sub-1".into(),
            subscribed_to_name: "temperature".into(),
            qos: SubscriptionQos::Multicast(MulticastQos::default()),
        };
        let json = serde_json::to_string(&request).expect("serializes");
        assert!(json.contains("\"subscriptionId\""));
        assert!(json.contains("\"subscribedToName\""));
    }

    #[test]
    fn test_reply_error_is_optional() {
        let reply: SubscriptionReply =
            serde_json::from_str(r#"{"subscriptionId":"sub-1"}"#).expect("deserializes");
        assert!(reply.error.is_none());

        let reply: SubscriptionReply = serde_json::from_str(
            r#"{"subscriptionId":"sub-1","error":{"kind":"ProviderRuntimeException","message":"no such attribute"}}"#,
        )
        .expect("deserializes");
        let remote = reply.error.expect("error present");
        assert_eq!(remote.kind, "ProviderRuntimeException");
    }

    #[test]
    fn test_broadcast_request_shapes_are_distinguishable() {
        let multicast = BroadcastRequest::Multicast(MulticastSubscriptionRequest {
            subscription_id: "sub-2".into(),
            multicast_id: "p1/stationFound".into(),
            subscribed_to_name: "stationFound".into(),
            qos: SubscriptionQos::Multicast(MulticastQos::default()),
        });
        let json = serde_json::to_string(&multicast).expect("serializes");
        let back: BroadcastRequest = serde_json::from_str(&json).expect("deserializes");
        assert_eq!(back.subscription_id(), "sub-2");
        assert!(matches!(back, BroadcastRequest::Multicast(_)));
    }

    #[test]
    fn test_remote_error_converts_to_provider_error() {
        let remote = RemoteError {
            kind: "MethodInvocationException".into(),
            message: "boom".into(),
        };
        match Error::from(remote) {
            Error::Provider { kind, .. } => assert_eq!(kind, "MethodInvocationException"),
            other => panic!("unexpected conversion: {:?}", other),
        }
    }
}
