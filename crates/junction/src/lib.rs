// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # Junction - Consumer-Side Subscription Engine
//!
//! The client half of Junction's publish/subscribe machinery: a consumer
//! proxy subscribes to a provider's attributes and broadcasts through a
//! location-transparent dispatcher, and this crate owns everything that
//! happens to that subscription afterwards - reply correlation, publication
//! routing, missed-publication alerting, and teardown.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use junction::{
//!     AttributeSubscribeOptions, ClosureListener, DiscoveryEntry, OnChangeWithKeepAliveQos,
//!     SubscriptionManager, SubscriptionQos,
//! };
//! use std::sync::Arc;
//!
//! # fn run(dispatch: Arc<dyn junction::Dispatch>) -> junction::Result<()> {
//! let manager = SubscriptionManager::new(dispatch);
//!
//! let qos = SubscriptionQos::OnChangeWithKeepAlive(
//!     OnChangeWithKeepAliveQos::new()
//!         .with_max_interval_ms(1_000)
//!         .with_alert_after_interval_ms(1_500)
//!         .with_validity_ms(60_000),
//! );
//! let registration = manager.subscribe_to_attribute(
//!     AttributeSubscribeOptions {
//!         proxy_id: "proxy-1".into(),
//!         provider: DiscoveryEntry::new("provider-1", "radio", "vehicle/Radio"),
//!         attribute_name: "currentStation".into(),
//!         attribute_type: "RadioStation".into(),
//!         qos,
//!         subscription_id: None,
//!     },
//!     Arc::new(ClosureListener::new().with_on_receive(|station| {
//!         println!("now playing: {station}");
//!     })),
//! )?;
//!
//! let subscription_id = registration.wait()?;
//! println!("subscribed as {subscription_id}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                        Consumer Application                        |
//! |        SubscriptionListener callbacks / Registration handle       |
//! +--------------------------------------------------------------------+
//! |                       SubscriptionManager                          |
//! |  registry | reply correlator | publication router | watchdog      |
//! +--------------------------------------------------------------------+
//! |                        Dispatch (trait)                            |
//! |        serialization, routing tables, transports (external)       |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`SubscriptionManager`] | Owns every outgoing subscription's lifecycle |
//! | [`SubscriptionListener`] | Callback surface for values, errors, acks |
//! | [`SubscriptionQos`] | Per-subscription quality of service |
//! | [`Dispatch`] | Outbound seam to the messaging layer |
//! | [`Registration`] | Settles once the provider acknowledges |
//!
//! ## Modules Overview
//!
//! - [`manager`] - the subscription manager (start here)
//! - [`qos`] - subscription QoS policies and clamping rules
//! - [`multicast`] - multicast ids, wildcard patterns, receiver directory
//! - [`dispatch`] - the dispatcher seam and messaging TTL envelope
//! - [`messages`] - wire-facing request/reply/publication types
//! - [`scheduler`] - cancellable one-shot timers on a monotonic clock
//! - [`config`] - every constant in one place

/// Protocol constants and QoS bounds - single source of truth.
pub mod config;
/// Dispatcher seam and messaging TTL envelope.
pub mod dispatch;
/// Crate error type.
pub mod error;
/// Listener traits for callback-based delivery.
pub mod listener;
/// Subscription lifecycle management.
pub mod manager;
/// Wire-facing subscription messages.
pub mod messages;
/// Multicast ids, wildcard patterns, and the receiver directory.
pub mod multicast;
/// Subscription QoS policies.
pub mod qos;
/// Cancellable one-shot timer scheduler.
pub mod scheduler;

pub use dispatch::{Dispatch, MessagingQos};
pub use error::{Error, Result};
pub use listener::{ClosureListener, ProvidedCallbacks, SubscriptionListener};
pub use manager::{
    AttributeSubscribeOptions, BroadcastSubscribeOptions, Registration, SubscriptionInfo,
    SubscriptionKind, SubscriptionManager,
};
pub use messages::{
    BroadcastRequest, BroadcastSubscriptionRequest, DiscoveryEntry, MulticastPublication,
    MulticastSubscriptionRequest, RemoteError, SubscriptionPublication, SubscriptionReply,
    SubscriptionRequest, SubscriptionStop,
};
pub use qos::{
    MulticastQos, OnChangeQos, OnChangeWithKeepAliveQos, PeriodicQos, SubscriptionQos,
};

/// Junction version string.
pub const VERSION: &str = "0.3.0";
