// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscription listener callbacks.
//!
//! Listeners provide callback-based notification for subscription events:
//! publication values, errors, and registration acknowledgements. This is
//! the only consumer-facing delivery surface; there is no polling API.
//!
//! # Thread Safety
//!
//! Callbacks are invoked from engine background threads (the routing thread
//! for publications, the timer thread for missed-publication alerts). They
//! must be `Send + Sync`, should return quickly, and should not block.
//! A panicking callback is caught and logged; it never takes down the
//! delivery thread.

use crate::error::Error;
use serde_json::Value;

/// Which of the three optional callbacks a listener actually provides.
///
/// Used at registration time to warn about listeners that will silently
/// discard values or errors. Custom trait implementations report all three
/// as present by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProvidedCallbacks {
    /// `on_receive` does something with delivered values.
    pub on_receive: bool,
    /// `on_error` does something with delivered errors.
    pub on_error: bool,
    /// `on_subscribed` does something with the acknowledgement.
    pub on_subscribed: bool,
}

impl ProvidedCallbacks {
    /// All three callbacks present.
    #[must_use]
    pub fn all() -> Self {
        Self {
            on_receive: true,
            on_error: true,
            on_subscribed: true,
        }
    }
}

/// Listener for events on a single subscription.
///
/// All methods have default no-op implementations, so implementations only
/// override the events they care about.
///
/// # Example
///
/// ```ignore
/// struct TemperatureListener;
///
/// impl SubscriptionListener for TemperatureListener {
///     fn on_receive(&self, value: &Value) {
///         println!("temperature update: {}", value);
///     }
///
///     fn on_error(&self, error: &Error) {
///         eprintln!("subscription trouble: {}", error);
///     }
/// }
/// ```
pub trait SubscriptionListener: Send + Sync {
    /// Called for every delivered publication value.
    ///
    /// The value is already typed by the serialization layer; the engine
    /// performs no coercion.
    fn on_receive(&self, value: &Value) {
        let _ = value;
    }

    /// Called for error publications, subscription-reply errors, and
    /// missed-publication alerts.
    fn on_error(&self, error: &Error) {
        let _ = error;
    }

    /// Called once when the provider acknowledges the subscription.
    fn on_subscribed(&self, subscription_id: &str) {
        let _ = subscription_id;
    }

    /// Which callbacks this listener meaningfully implements.
    ///
    /// Only used for non-fatal registration warnings; the default claims all
    /// three so custom implementations never warn spuriously.
    fn provided_callbacks(&self) -> ProvidedCallbacks {
        ProvidedCallbacks::all()
    }
}

type ReceiveFn = Box<dyn Fn(&Value) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&Error) + Send + Sync>;
type SubscribedFn = Box<dyn Fn(&str) + Send + Sync>;

/// Closure-based listener for simple callbacks.
///
/// Use this when implementing the trait is overkill and closures are enough.
/// Callbacks that were not supplied are reported through
/// [`SubscriptionListener::provided_callbacks`] so registration can warn.
///
/// # Example
///
/// ```ignore
/// let listener = ClosureListener::new()
///     .with_on_receive(|value| println!("got {}", value))
///     .with_on_error(|error| eprintln!("lost: {}", error));
/// ```
#[derive(Default)]
pub struct ClosureListener {
    on_receive: Option<ReceiveFn>,
    on_error: Option<ErrorFn>,
    on_subscribed: Option<SubscribedFn>,
}

impl ClosureListener {
    /// Create a listener with no callbacks attached.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a value callback.
    #[must_use]
    pub fn with_on_receive<F: Fn(&Value) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_receive = Some(Box::new(f));
        self
    }

    /// Attach an error callback.
    #[must_use]
    pub fn with_on_error<F: Fn(&Error) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }

    /// Attach a subscription-acknowledged callback.
    #[must_use]
    pub fn with_on_subscribed<F: Fn(&str) + Send + Sync + 'static>(mut self, f: F) -> Self {
        self.on_subscribed = Some(Box::new(f));
        self
    }
}

impl SubscriptionListener for ClosureListener {
    fn on_receive(&self, value: &Value) {
        if let Some(f) = &self.on_receive {
            f(value);
        }
    }

    fn on_error(&self, error: &Error) {
        if let Some(f) = &self.on_error {
            f(error);
        }
    }

    fn on_subscribed(&self, subscription_id: &str) {
        if let Some(f) = &self.on_subscribed {
            f(subscription_id);
        }
    }

    fn provided_callbacks(&self) -> ProvidedCallbacks {
        ProvidedCallbacks {
            on_receive: self.on_receive.is_some(),
            on_error: self.on_error.is_some(),
            on_subscribed: self.on_subscribed.is_some(),
        }
    }
}
