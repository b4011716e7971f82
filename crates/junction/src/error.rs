// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Errors returned by the Junction subscription engine.

use std::fmt;

/// Errors returned by subscription operations.
///
/// Variants are grouped by origin: caller mistakes, lifecycle state,
/// protocol-level faults raised to the routing layer, and errors that
/// originate on the provider side and are passed through unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ========================================================================
    // Caller errors
    // ========================================================================
    /// A required registration field is missing or malformed.
    BadInput(String),
    /// Unsubscribe was called for a subscription id that is not registered.
    NotFound(String),

    // ========================================================================
    // Lifecycle errors
    // ========================================================================
    /// The operation was issued after `shutdown()`.
    Shutdown,
    /// A deadline elapsed: no subscription reply before the request TTL, or
    /// `terminate_subscriptions` ran out of time.
    Timeout(String),
    /// No publication arrived within the subscription's alert window.
    /// Carries the subscription id.
    PublicationMissed(String),

    // ========================================================================
    // Protocol faults (upstream bug, not a user error)
    // ========================================================================
    /// A unicast publication arrived for an unknown subscription id.
    UnknownSubscription(String),
    /// A multicast publication matched no registered pattern.
    UnknownMulticast(String),

    // ========================================================================
    // Transport and provider errors
    // ========================================================================
    /// The dispatcher failed to hand the message to the transport.
    Send(String),
    /// An error produced by the provider, delivered in a reply or
    /// publication. The original kind is preserved verbatim.
    Provider {
        /// Error kind as reported by the remote side.
        kind: String,
        /// Human-readable detail.
        message: String,
    },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Caller
            Error::BadInput(msg) => write!(f, "Bad input: {}", msg),
            Error::NotFound(id) => write!(f, "No subscription registered for id '{}'", id),
            // Lifecycle
            Error::Shutdown => write!(f, "Subscription engine is shut down"),
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Error::PublicationMissed(id) => {
                write!(f, "Missed publication for subscription '{}'", id)
            }
            // Protocol
            Error::UnknownSubscription(id) => {
                write!(f, "Publication for unknown subscription id '{}'", id)
            }
            Error::UnknownMulticast(id) => {
                write!(f, "Multicast publication '{}' matched no registration", id)
            }
            // Transport / provider
            Error::Send(msg) => write!(f, "Send failed: {}", msg),
            Error::Provider { kind, message } => write!(f, "{}: {}", kind, message),
        }
    }
}

impl std::error::Error for Error {}

/// Convenient alias for API results using the crate `Error` type.
pub type Result<T> = core::result::Result<T, Error>;
