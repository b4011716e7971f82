// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Subscription lifecycle management.
//!
//! [`SubscriptionManager`] owns every outgoing subscription on the consumer
//! side: it builds and dispatches subscription requests, correlates the
//! provider's replies back to pending registrations, routes incoming
//! publications (unicast by subscription id, multicast by wildcard pattern)
//! to the right listener, raises missed-publication alerts when a heartbeat
//! goes quiet, and tears everything down on unsubscribe, expiry, or
//! shutdown.
//!
//! # Locking
//!
//! One mutex guards the whole registry; every map mutation happens under it.
//! User callbacks never run under the registry lock: delivery clones the
//! listener handle out, releases the registry, and invokes the callback
//! under a separate delivery lock that serializes all callbacks (and thus
//! all callbacks per subscription). Callbacks may therefore call back into
//! the manager (e.g. unsubscribe from inside `on_receive`) without
//! deadlocking. A timer task re-validates its subscription under the
//! registry lock before touching anything, so a task racing a concurrent
//! teardown sees the state gone and exits.

mod registration;

pub use registration::Registration;

use crate::config::{self, SUBSCRIPTION_ID_LEN};
use crate::dispatch::{Dispatch, MessagingQos};
use crate::error::{Error, Result};
use crate::listener::SubscriptionListener;
use crate::messages::{
    BroadcastRequest, BroadcastSubscriptionRequest, DiscoveryEntry, MulticastPublication,
    MulticastSubscriptionRequest, RemoteError, SubscriptionPublication, SubscriptionReply,
    SubscriptionRequest, SubscriptionStop,
};
use crate::multicast::{self, MulticastDirectory};
use crate::qos::SubscriptionQos;
use crate::scheduler::{TimerHandle, TimerScheduler};
use rand::Rng;
use registration::{registration_pair, Completion};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread;
use std::time::{Duration, Instant};

/// URL-safe alphabet for generated subscription ids.
const ID_ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

fn new_subscription_id() -> String {
    let mut rng = rand::thread_rng();
    (0..SUBSCRIPTION_ID_LEN)
        .map(|_| ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char)
        .collect()
}

/// What a subscription is attached to on the provider side.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionKind {
    /// A named provider attribute.
    Attribute,
    /// A per-consumer filtered broadcast, delivered as unicast publications.
    SelectiveBroadcast,
    /// A non-selective broadcast, delivered as multicast publications.
    Multicast,
}

/// Registry entry for one active subscription.
#[derive(Debug, Clone)]
pub struct SubscriptionInfo {
    /// Participant id of the consuming proxy.
    pub proxy_id: String,
    /// Discovery data of the provider.
    pub provider: DiscoveryEntry,
    /// Subscription QoS.
    pub qos: SubscriptionQos,
    /// Attribute or broadcast name subscribed to.
    pub subscribed_to_name: String,
    /// Subscription kind.
    pub kind: SubscriptionKind,
    /// Registered multicast id, for multicast subscriptions only.
    pub multicast_id: Option<String>,
    /// Wall-clock time of the last unicast publication; 0 = never.
    pub last_publication_time_ms: u64,
}

/// Parameters for [`SubscriptionManager::subscribe_to_attribute`].
#[derive(Debug, Clone)]
pub struct AttributeSubscribeOptions {
    /// Participant id of the consuming proxy.
    pub proxy_id: String,
    /// Discovery data of the provider.
    pub provider: DiscoveryEntry,
    /// Attribute name on the provider interface.
    pub attribute_name: String,
    /// Attribute type name, used by the serialization layer.
    pub attribute_type: String,
    /// Subscription QoS.
    pub qos: SubscriptionQos,
    /// Reuse an existing id (resubscribe) instead of generating one.
    pub subscription_id: Option<String>,
}

/// Parameters for [`SubscriptionManager::subscribe_to_broadcast`].
#[derive(Debug, Clone)]
pub struct BroadcastSubscribeOptions {
    /// Participant id of the consuming proxy.
    pub proxy_id: String,
    /// Discovery data of the provider.
    pub provider: DiscoveryEntry,
    /// Broadcast name on the provider interface.
    pub broadcast_name: String,
    /// Selective (filtered unicast) or non-selective (multicast).
    pub selective: bool,
    /// Multicast partitions; ignored for selective broadcasts.
    pub partitions: Vec<String>,
    /// Provider-side filter parameters; selective broadcasts only.
    pub filter_parameters: BTreeMap<String, String>,
    /// Subscription QoS.
    pub qos: SubscriptionQos,
    /// Reuse an existing id (resubscribe) instead of generating one.
    pub subscription_id: Option<String>,
}

struct ReplyWaiter {
    completion: Completion,
    ttl_timer: TimerHandle,
    token: u64,
}

struct PublicationCheck {
    handle: TimerHandle,
    token: u64,
}

struct ManagerState {
    started: bool,
    infos: HashMap<String, SubscriptionInfo>,
    listeners: HashMap<String, Arc<dyn SubscriptionListener>>,
    publication_timers: HashMap<String, PublicationCheck>,
    waiters: HashMap<String, ReplyWaiter>,
    multicast: MulticastDirectory,
    /// Generation counter distinguishing a timer chain from the chains of
    /// earlier registrations under the same subscription id.
    next_token: u64,
}

impl ManagerState {
    fn allocate_token(&mut self) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        token
    }
}

struct Inner {
    dispatch: Arc<dyn Dispatch>,
    scheduler: TimerScheduler,
    state: Mutex<ManagerState>,
    delivery: Mutex<()>,
}

#[inline]
fn recover_state(lock: &Mutex<ManagerState>) -> MutexGuard<'_, ManagerState> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::debug!("[subscriptions] WARNING: registry mutex poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

impl Inner {
    /// Run a user callback with panic isolation, serialized with every other
    /// callback.
    fn deliver(&self, f: impl FnOnce()) {
        let _guard = match self.delivery.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if std::panic::catch_unwind(std::panic::AssertUnwindSafe(f)).is_err() {
            log::warn!("[subscriptions] listener callback panicked");
        }
    }
}

/// Remove every trace of a subscription from the registry. Idempotent.
///
/// The pending reply waiter, if any, is dropped without being settled here;
/// its TTL timer stays armed and settles the registration as timed out.
fn cleanup_locked(state: &mut ManagerState, scheduler: &TimerScheduler, subscription_id: &str) {
    if let Some(check) = state.publication_timers.remove(subscription_id) {
        scheduler.cancel(&check.handle);
    }
    if let Some(info) = state.infos.remove(subscription_id) {
        if let Some(multicast_id) = &info.multicast_id {
            state.multicast.unregister(multicast_id, subscription_id);
        }
    }
    state.listeners.remove(subscription_id);
    state.waiters.remove(subscription_id);
}

/// Client-side subscription manager.
///
/// Cheap to clone; clones share the same registry. Every instance is
/// independent of every other instance - there is no process-wide state.
#[derive(Clone)]
pub struct SubscriptionManager {
    inner: Arc<Inner>,
}

impl SubscriptionManager {
    /// Create a manager sending through `dispatch`.
    #[must_use]
    pub fn new(dispatch: Arc<dyn Dispatch>) -> Self {
        Self {
            inner: Arc::new(Inner {
                dispatch,
                scheduler: TimerScheduler::new(),
                state: Mutex::new(ManagerState {
                    started: true,
                    infos: HashMap::new(),
                    listeners: HashMap::new(),
                    publication_timers: HashMap::new(),
                    waiters: HashMap::new(),
                    multicast: MulticastDirectory::new(),
                    next_token: 0,
                }),
                delivery: Mutex::new(()),
            }),
        }
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Subscribe to a provider attribute.
    ///
    /// Returns synchronously once the request is handed to the dispatcher;
    /// the returned [`Registration`] settles when the provider replies, when
    /// the request TTL elapses, or on shutdown. A dispatcher send failure is
    /// reported through the registration; the registry entry is reclaimed by
    /// the reply TTL.
    ///
    /// # Errors
    ///
    /// `BadInput` when the attribute name or type is empty; `Shutdown` after
    /// [`shutdown`](Self::shutdown).
    pub fn subscribe_to_attribute(
        &self,
        options: AttributeSubscribeOptions,
        listener: Arc<dyn SubscriptionListener>,
    ) -> Result<Registration> {
        if options.attribute_name.is_empty() {
            return Err(Error::BadInput("attribute name is empty".into()));
        }
        if options.attribute_type.is_empty() {
            return Err(Error::BadInput("attribute type is empty".into()));
        }
        warn_about_missing_callbacks(listener.as_ref());

        let messaging_qos =
            MessagingQos::until_expiry(options.qos.expiry_date_ms(), config::now_ms());
        let (registration, completion) = self.install_subscription(
            options.subscription_id,
            SubscriptionInfo {
                proxy_id: options.proxy_id.clone(),
                provider: options.provider.clone(),
                qos: options.qos.clone(),
                subscribed_to_name: options.attribute_name.clone(),
                kind: SubscriptionKind::Attribute,
                multicast_id: None,
                last_publication_time_ms: 0,
            },
            listener,
            &messaging_qos,
        )?;

        let request = SubscriptionRequest {
            subscription_id: registration.subscription_id().to_string(),
            subscribed_to_name: options.attribute_name,
            qos: options.qos,
        };
        if let Err(error) = self.inner.dispatch.send_subscription_request(
            &options.provider,
            &options.proxy_id,
            &request,
            &messaging_qos,
        ) {
            log::warn!(
                "[subscriptions] attribute subscription request '{}' failed to send: {}",
                request.subscription_id,
                error
            );
            completion.fail(error);
        }
        Ok(registration)
    }

    /// Subscribe to a provider broadcast, selective or multicast.
    ///
    /// Selective broadcasts send a filtered request; a dispatcher send
    /// failure fails the registration, notifies `on_error`, and reclaims the
    /// registry entry immediately. Non-selective broadcasts build a
    /// multicast id from the provider participant id, broadcast name, and
    /// partitions, register it in the multicast directory, and follow the
    /// attribute failure policy.
    ///
    /// # Errors
    ///
    /// `BadInput` when the broadcast name is empty or a partition is
    /// invalid; `Shutdown` after [`shutdown`](Self::shutdown).
    pub fn subscribe_to_broadcast(
        &self,
        options: BroadcastSubscribeOptions,
        listener: Arc<dyn SubscriptionListener>,
    ) -> Result<Registration> {
        if options.broadcast_name.is_empty() {
            return Err(Error::BadInput("broadcast name is empty".into()));
        }
        warn_about_missing_callbacks(listener.as_ref());

        let multicast_id = if options.selective {
            None
        } else {
            Some(multicast::build_multicast_id(
                &options.provider.participant_id,
                &options.broadcast_name,
                &options.partitions,
            )?)
        };

        let messaging_qos =
            MessagingQos::until_expiry(options.qos.expiry_date_ms(), config::now_ms());
        let (registration, completion) = self.install_subscription(
            options.subscription_id,
            SubscriptionInfo {
                proxy_id: options.proxy_id.clone(),
                provider: options.provider.clone(),
                qos: options.qos.clone(),
                subscribed_to_name: options.broadcast_name.clone(),
                kind: if options.selective {
                    SubscriptionKind::SelectiveBroadcast
                } else {
                    SubscriptionKind::Multicast
                },
                multicast_id: multicast_id.clone(),
                last_publication_time_ms: 0,
            },
            Arc::clone(&listener),
            &messaging_qos,
        )?;
        let subscription_id = registration.subscription_id().to_string();

        let request = match multicast_id {
            None => BroadcastRequest::Filtered(BroadcastSubscriptionRequest {
                subscription_id: subscription_id.clone(),
                subscribed_to_name: options.broadcast_name,
                qos: options.qos,
                filter_parameters: options.filter_parameters,
            }),
            Some(multicast_id) => BroadcastRequest::Multicast(MulticastSubscriptionRequest {
                subscription_id: subscription_id.clone(),
                multicast_id,
                subscribed_to_name: options.broadcast_name,
                qos: options.qos,
            }),
        };

        if let Err(error) = self.inner.dispatch.send_broadcast_subscription_request(
            &options.provider,
            &options.proxy_id,
            &request,
            &messaging_qos,
        ) {
            log::warn!(
                "[subscriptions] broadcast subscription request '{}' failed to send: {}",
                subscription_id,
                error
            );
            match request {
                BroadcastRequest::Filtered(_) => {
                    // Selective broadcasts fail hard: notify, settle, reclaim.
                    self.inner.deliver(|| listener.on_error(&error));
                    completion.fail(error);
                    let mut state = recover_state(&self.inner.state);
                    if let Some(waiter) = state.waiters.remove(&subscription_id) {
                        self.inner.scheduler.cancel(&waiter.ttl_timer);
                    }
                    cleanup_locked(&mut state, &self.inner.scheduler, &subscription_id);
                }
                BroadcastRequest::Multicast(_) => {
                    // Reclaimed by the reply TTL, like attribute requests.
                    completion.fail(error);
                }
            }
        }
        Ok(registration)
    }

    /// Insert registry state for a new registration and arm its timers.
    fn install_subscription(
        &self,
        requested_id: Option<String>,
        info: SubscriptionInfo,
        listener: Arc<dyn SubscriptionListener>,
        messaging_qos: &MessagingQos,
    ) -> Result<(Registration, Completion)> {
        let mut state = recover_state(&self.inner.state);
        if !state.started {
            return Err(Error::Shutdown);
        }

        let subscription_id = requested_id.unwrap_or_else(new_subscription_id);
        if state.infos.contains_key(&subscription_id) || state.waiters.contains_key(&subscription_id)
        {
            // Resubscribe with the same id: last writer wins.
            log::debug!(
                "[subscriptions] '{}' re-registered, replacing previous state",
                subscription_id
            );
            self.supersede_locked(&mut state, &subscription_id);
        }

        if let Some(multicast_id) = &info.multicast_id {
            state.multicast.register(multicast_id, &subscription_id)?;
        }

        let (registration, completion) = registration_pair(subscription_id.clone());
        let waiter_token = state.allocate_token();
        let ttl_timer = self.arm_reply_ttl(
            &subscription_id,
            completion.clone(),
            waiter_token,
            messaging_qos.ttl_ms,
        );
        state.waiters.insert(
            subscription_id.clone(),
            ReplyWaiter {
                completion: completion.clone(),
                ttl_timer,
                token: waiter_token,
            },
        );

        let now = config::now_ms();
        let alert_ms = info.qos.alert_after_interval_ms();
        if alert_ms > 0 && !info.qos.is_expired_at(now) {
            let check_token = state.allocate_token();
            let handle = self.arm_publication_check(&subscription_id, check_token, alert_ms);
            state.publication_timers.insert(
                subscription_id.clone(),
                PublicationCheck {
                    handle,
                    token: check_token,
                },
            );
        }

        state.infos.insert(subscription_id.clone(), info);
        state.listeners.insert(subscription_id, listener);
        Ok((registration, completion))
    }

    /// Replace an existing registration under the same id: cancel its
    /// timers, settle its pending waiter, drop its registry entries.
    fn supersede_locked(&self, state: &mut ManagerState, subscription_id: &str) {
        if let Some(waiter) = state.waiters.remove(subscription_id) {
            self.inner.scheduler.cancel(&waiter.ttl_timer);
            waiter.completion.fail(Error::Timeout(
                "superseded by a new registration with the same id".into(),
            ));
        }
        cleanup_locked(state, &self.inner.scheduler, subscription_id);
    }

    fn arm_reply_ttl(
        &self,
        subscription_id: &str,
        completion: Completion,
        token: u64,
        ttl_ms: u64,
    ) -> TimerHandle {
        let weak = Arc::downgrade(&self.inner);
        let subscription_id = subscription_id.to_string();
        self.inner
            .scheduler
            .schedule(Duration::from_millis(ttl_ms), move || {
                on_reply_ttl(&weak, &subscription_id, &completion, token, ttl_ms);
            })
    }

    fn arm_publication_check(
        &self,
        subscription_id: &str,
        token: u64,
        delay_ms: u64,
    ) -> TimerHandle {
        arm_publication_check(&self.inner, subscription_id, token, delay_ms)
    }

    // ========================================================================
    // Teardown
    // ========================================================================

    /// End a subscription: emit the matching stop message and reclaim every
    /// registry entry.
    ///
    /// # Errors
    ///
    /// `NotFound` when the id is not registered; otherwise the dispatcher's
    /// send outcome (the registry entry is reclaimed either way).
    pub fn unsubscribe(&self, subscription_id: &str, messaging_qos: &MessagingQos) -> Result<()> {
        let (provider, proxy_id, multicast_id) = {
            let state = recover_state(&self.inner.state);
            let Some(info) = state.infos.get(subscription_id) else {
                return Err(Error::NotFound(subscription_id.to_string()));
            };
            (
                info.provider.clone(),
                info.proxy_id.clone(),
                info.multicast_id.clone(),
            )
        };

        let stop = SubscriptionStop {
            subscription_id: subscription_id.to_string(),
        };
        let send_result = match &multicast_id {
            Some(multicast_id) => self.inner.dispatch.send_multicast_subscription_stop(
                &provider,
                &proxy_id,
                multicast_id,
                &stop,
                messaging_qos,
            ),
            None => self.inner.dispatch.send_subscription_stop(
                &provider,
                &proxy_id,
                &stop,
                messaging_qos,
            ),
        };

        let mut state = recover_state(&self.inner.state);
        cleanup_locked(&mut state, &self.inner.scheduler, subscription_id);
        drop(state);

        log::debug!("[subscriptions] '{}' unsubscribed", subscription_id);
        send_result
    }

    /// Concurrently unsubscribe every active subscription.
    ///
    /// `timeout_ms = 0` disables the deadline and waits for all stops.
    ///
    /// # Errors
    ///
    /// `Timeout` when a nonzero deadline elapses first; otherwise the first
    /// stop failure, if any.
    pub fn terminate_subscriptions(&self, timeout_ms: u64) -> Result<()> {
        let ids: Vec<String> = {
            let state = recover_state(&self.inner.state);
            state.infos.keys().cloned().collect()
        };
        if ids.is_empty() {
            return Ok(());
        }
        log::debug!(
            "[subscriptions] terminating {} subscription(s), timeout {}ms",
            ids.len(),
            timeout_ms
        );

        let total = ids.len();
        let (tx, rx) = crossbeam::channel::bounded::<Result<()>>(total);
        for subscription_id in ids {
            let manager = self.clone();
            let tx = tx.clone();
            thread::Builder::new()
                .name("junction-stop".to_string())
                .spawn(move || {
                    let result = manager.unsubscribe(&subscription_id, &MessagingQos::default());
                    let _ = tx.send(result);
                })
                .expect("failed to spawn subscription stop thread");
        }
        drop(tx);

        let deadline =
            (timeout_ms > 0).then(|| Instant::now() + Duration::from_millis(timeout_ms));
        let mut first_error = None;
        for _ in 0..total {
            let outcome = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(Error::Timeout(format!(
                            "terminate did not finish within {}ms",
                            timeout_ms
                        )));
                    }
                    rx.recv_timeout(deadline - now).map_err(|_| ())
                }
                None => rx.recv().map_err(|_| ()),
            };
            match outcome {
                // A subscription torn down concurrently counts as stopped.
                Ok(Err(Error::NotFound(_))) | Ok(Ok(())) => {}
                Ok(Err(error)) => {
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
                Err(()) => {
                    return Err(Error::Timeout(format!(
                        "terminate did not finish within {}ms",
                        timeout_ms
                    )));
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Stop the manager: cancel every publication-check timer, fail every
    /// pending registration with `Shutdown`, and clear the registry. Any
    /// later registration attempt returns `Shutdown` synchronously.
    pub fn shutdown(&self) {
        let waiters = {
            let mut state = recover_state(&self.inner.state);
            if !state.started {
                return;
            }
            state.started = false;
            for (_, check) in state.publication_timers.drain() {
                self.inner.scheduler.cancel(&check.handle);
            }
            state.infos.clear();
            state.listeners.clear();
            state.multicast.clear();
            state.waiters.drain().map(|(_, w)| w).collect::<Vec<_>>()
        };
        for waiter in waiters {
            self.inner.scheduler.cancel(&waiter.ttl_timer);
            waiter.completion.fail(Error::Shutdown);
        }
        log::debug!("[subscriptions] shut down");
    }

    // ========================================================================
    // Inbound events
    // ========================================================================

    /// Correlate a subscription reply to its pending registration.
    ///
    /// A reply for an unknown id is logged and dropped - late replies after
    /// unsubscribe are expected, not a fault.
    pub fn handle_subscription_reply(&self, reply: SubscriptionReply) {
        let subscription_id = reply.subscription_id;
        let (waiter, listener) = {
            let mut state = recover_state(&self.inner.state);
            let waiter = state.waiters.remove(&subscription_id);
            let listener = state.listeners.get(&subscription_id).cloned();
            if waiter.is_none() && listener.is_none() {
                log::debug!(
                    "[subscriptions] dropping reply for unknown subscription '{}'",
                    subscription_id
                );
                return;
            }
            if let Some(waiter) = &waiter {
                self.inner.scheduler.cancel(&waiter.ttl_timer);
            }
            if reply.error.is_some() {
                cleanup_locked(&mut state, &self.inner.scheduler, &subscription_id);
            }
            (waiter, listener)
        };

        match reply.error {
            Some(remote) => {
                let error = Error::from(remote);
                log::debug!(
                    "[subscriptions] '{}' rejected by provider: {}",
                    subscription_id,
                    error
                );
                if let Some(waiter) = waiter {
                    waiter.completion.fail(error.clone());
                }
                if let Some(listener) = listener {
                    self.inner.deliver(|| listener.on_error(&error));
                }
            }
            None => {
                if let Some(waiter) = waiter {
                    waiter.completion.resolve(Ok(subscription_id.clone()));
                }
                if let Some(listener) = listener {
                    self.inner
                        .deliver(|| listener.on_subscribed(&subscription_id));
                }
            }
        }
    }

    /// Route a unicast publication to its subscription's listener.
    ///
    /// Error publications go to `on_error` and do not terminate the
    /// subscription. The publication timestamp feeds the missed-publication
    /// watchdog.
    ///
    /// # Errors
    ///
    /// `UnknownSubscription` when no subscription has this id; no state is
    /// created for unexpected publications.
    pub fn handle_publication(&self, publication: SubscriptionPublication) -> Result<()> {
        let listener = {
            let mut state = recover_state(&self.inner.state);
            let Some(info) = state.infos.get_mut(&publication.subscription_id) else {
                return Err(Error::UnknownSubscription(publication.subscription_id));
            };
            let now = config::now_ms();
            if now > info.last_publication_time_ms {
                info.last_publication_time_ms = now;
            }
            state.listeners.get(&publication.subscription_id).cloned()
        };

        self.route_payload(
            listener,
            &publication.subscription_id,
            publication.error,
            publication.response,
        );
        Ok(())
    }

    /// Route a multicast publication to every subscriber whose registered
    /// pattern matches its multicast id.
    ///
    /// Multicast deliveries do not feed the missed-publication watchdog.
    ///
    /// # Errors
    ///
    /// `UnknownMulticast` when no registered pattern matches.
    pub fn handle_multicast_publication(&self, publication: MulticastPublication) -> Result<()> {
        let targets: Vec<(String, Option<Arc<dyn SubscriptionListener>>)> = {
            let state = recover_state(&self.inner.state);
            let receivers = state.multicast.receivers_matching(&publication.multicast_id);
            if receivers.is_empty() {
                return Err(Error::UnknownMulticast(publication.multicast_id));
            }
            receivers
                .into_iter()
                .map(|id| {
                    let listener = state.listeners.get(&id).cloned();
                    (id, listener)
                })
                .collect()
        };

        for (subscription_id, listener) in targets {
            self.route_payload(
                listener,
                &subscription_id,
                publication.error.clone(),
                publication.response.clone(),
            );
        }
        Ok(())
    }

    /// Deliver a publication payload or error to one listener.
    fn route_payload(
        &self,
        listener: Option<Arc<dyn SubscriptionListener>>,
        subscription_id: &str,
        error: Option<RemoteError>,
        response: Option<Value>,
    ) {
        let Some(listener) = listener else {
            log::debug!(
                "[subscriptions] no listener for '{}', publication skipped",
                subscription_id
            );
            return;
        };
        match (error, response) {
            (Some(remote), _) => {
                let error = Error::from(remote);
                self.inner.deliver(|| listener.on_error(&error));
            }
            (None, Some(value)) => {
                self.inner.deliver(|| listener.on_receive(&value));
            }
            (None, None) => {
                log::debug!(
                    "[subscriptions] empty publication for '{}' skipped",
                    subscription_id
                );
            }
        }
    }

    // ========================================================================
    // Introspection
    // ========================================================================

    /// Whether any subscription state is live: infos, listeners, timers,
    /// pending waiters, or multicast patterns.
    #[must_use]
    pub fn has_open_subscriptions(&self) -> bool {
        let state = recover_state(&self.inner.state);
        !state.infos.is_empty()
            || !state.listeners.is_empty()
            || !state.publication_timers.is_empty()
            || !state.waiters.is_empty()
            || !state.multicast.is_empty()
    }

    /// Whether any multicast pattern has subscribers.
    #[must_use]
    pub fn has_multicast_subscriptions(&self) -> bool {
        let state = recover_state(&self.inner.state);
        !state.multicast.is_empty()
    }

    /// Snapshot of one subscription's registry entry, mainly for tests and
    /// diagnostics.
    #[must_use]
    pub fn subscription_info(&self, subscription_id: &str) -> Option<SubscriptionInfo> {
        let state = recover_state(&self.inner.state);
        state.infos.get(subscription_id).cloned()
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        // Settle anything still pending so no Registration waits forever.
        let mut state = recover_state(&self.state);
        for (_, waiter) in state.waiters.drain() {
            waiter.completion.fail(Error::Shutdown);
        }
    }
}

fn warn_about_missing_callbacks(listener: &dyn SubscriptionListener) {
    let provided = listener.provided_callbacks();
    if !provided.on_receive {
        log::warn!("[subscriptions] listener has no on_receive callback, values will be dropped");
    }
    if !provided.on_error {
        log::warn!("[subscriptions] listener has no on_error callback, errors will be dropped");
    }
}

fn on_reply_ttl(
    weak: &Weak<Inner>,
    subscription_id: &str,
    completion: &Completion,
    token: u64,
    ttl_ms: u64,
) {
    completion.fail(Error::Timeout(format!(
        "no subscription reply for '{}' within {}ms",
        subscription_id, ttl_ms
    )));

    let Some(inner) = weak.upgrade() else {
        return;
    };
    let mut state = recover_state(&inner.state);
    // Only reclaim state that still belongs to this registration attempt; a
    // resubscribe under the same id carries a fresh token.
    let owns_waiter = state
        .waiters
        .get(subscription_id)
        .is_some_and(|w| w.token == token);
    if owns_waiter {
        log::warn!(
            "[subscriptions] '{}' timed out waiting for subscription reply",
            subscription_id
        );
        cleanup_locked(&mut state, &inner.scheduler, subscription_id);
    }
}

fn arm_publication_check(
    inner: &Arc<Inner>,
    subscription_id: &str,
    token: u64,
    delay_ms: u64,
) -> TimerHandle {
    let weak = Arc::downgrade(inner);
    let subscription_id = subscription_id.to_string();
    inner
        .scheduler
        .schedule(Duration::from_millis(delay_ms), move || {
            if let Some(inner) = weak.upgrade() {
                on_publication_check(&inner, &subscription_id, token);
            }
        })
}

/// Missed-publication watchdog tick.
///
/// Raises an alert when the quiet window since the last unicast publication
/// reached `alert_after_interval_ms`, then re-arms itself to the next
/// expected heartbeat unless the subscription expires first. At most one
/// check timer exists per subscription at any instant; the token guards
/// against a stale chain surviving a resubscribe.
fn on_publication_check(inner: &Arc<Inner>, subscription_id: &str, token: u64) {
    let mut alert_listener = None;
    {
        let mut state = recover_state(&inner.state);
        let current_token = state
            .publication_timers
            .get(subscription_id)
            .map(|check| check.token);
        if current_token != Some(token) {
            return; // cancelled or superseded while this tick was in flight
        }
        let Some(info) = state.infos.get(subscription_id) else {
            state.publication_timers.remove(subscription_id);
            return;
        };

        let alert_ms = info.qos.alert_after_interval_ms();
        if alert_ms == 0 {
            state.publication_timers.remove(subscription_id);
            return;
        }

        let now = config::now_ms();
        if info.qos.is_expired_at(now) {
            // A delayed tick must never alert past the expiry date.
            state.publication_timers.remove(subscription_id);
            return;
        }
        let since_ms = now.saturating_sub(info.last_publication_time_ms);
        let missed = since_ms >= alert_ms;
        let delay_ms = if since_ms > alert_ms {
            alert_ms
        } else {
            alert_ms - since_ms
        };

        if info.qos.ends_within(now, delay_ms) {
            log::debug!(
                "[subscriptions] '{}' reaches expiry, watchdog retired",
                subscription_id
            );
            state.publication_timers.remove(subscription_id);
        } else {
            let handle = arm_publication_check(inner, subscription_id, token, delay_ms);
            state.publication_timers.insert(
                subscription_id.to_string(),
                PublicationCheck { handle, token },
            );
        }

        if missed {
            alert_listener = state.listeners.get(subscription_id).cloned();
        }
    }

    if let Some(listener) = alert_listener {
        log::debug!(
            "[subscriptions] missed publication on '{}', alerting",
            subscription_id
        );
        let error = Error::PublicationMissed(subscription_id.to_string());
        inner.deliver(|| listener.on_error(&error));
    }
}
