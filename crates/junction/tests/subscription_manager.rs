// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

#![allow(clippy::uninlined_format_args)] // Test code readability over pedantic
#![allow(clippy::cast_possible_truncation)] // Test parameters
#![allow(clippy::missing_panics_doc)] // Tests panic on failure
#![allow(clippy::too_many_lines)] // Scenario tests
#![allow(clippy::unreadable_literal)] // Millisecond constants

//! End-to-end subscription lifecycle tests
//!
//! Drives a full `SubscriptionManager` against a recording mock dispatcher:
//! heartbeat watchdog timing, alert suppression by live publications, reply
//! correlation, multicast pattern fan-out, unsubscribe, and shutdown.

use junction::{
    AttributeSubscribeOptions, BroadcastSubscribeOptions, ClosureListener, Dispatch,
    DiscoveryEntry, Error, MessagingQos, MulticastPublication, MulticastQos,
    OnChangeWithKeepAliveQos, RemoteError, Result, SubscriptionManager, SubscriptionPublication,
    SubscriptionQos, SubscriptionReply, SubscriptionStop,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// What the mock dispatcher saw going out.
#[derive(Debug, Clone, PartialEq)]
enum Sent {
    AttributeRequest { subscription_id: String, ttl_ms: u64 },
    BroadcastRequest { subscription_id: String },
    Stop { subscription_id: String, multicast_id: Option<String> },
}

#[derive(Default)]
struct RecordingDispatch {
    sent: Mutex<Vec<Sent>>,
}

impl RecordingDispatch {
    fn sent(&self) -> Vec<Sent> {
        self.sent.lock().expect("sent mutex").clone()
    }

    fn stops(&self) -> Vec<Sent> {
        self.sent()
            .into_iter()
            .filter(|s| matches!(s, Sent::Stop { .. }))
            .collect()
    }
}

impl Dispatch for RecordingDispatch {
    fn send_subscription_request(
        &self,
        _provider: &DiscoveryEntry,
        _proxy_id: &str,
        request: &junction::SubscriptionRequest,
        messaging_qos: &MessagingQos,
    ) -> Result<()> {
        self.sent.lock().expect("sent mutex").push(Sent::AttributeRequest {
            subscription_id: request.subscription_id.clone(),
            ttl_ms: messaging_qos.ttl_ms,
        });
        Ok(())
    }

    fn send_broadcast_subscription_request(
        &self,
        _provider: &DiscoveryEntry,
        _proxy_id: &str,
        request: &junction::BroadcastRequest,
        _messaging_qos: &MessagingQos,
    ) -> Result<()> {
        self.sent.lock().expect("sent mutex").push(Sent::BroadcastRequest {
            subscription_id: request.subscription_id().to_string(),
        });
        Ok(())
    }

    fn send_subscription_stop(
        &self,
        _provider: &DiscoveryEntry,
        _proxy_id: &str,
        stop: &SubscriptionStop,
        _messaging_qos: &MessagingQos,
    ) -> Result<()> {
        self.sent.lock().expect("sent mutex").push(Sent::Stop {
            subscription_id: stop.subscription_id.clone(),
            multicast_id: None,
        });
        Ok(())
    }

    fn send_multicast_subscription_stop(
        &self,
        _provider: &DiscoveryEntry,
        _proxy_id: &str,
        multicast_id: &str,
        stop: &SubscriptionStop,
        _messaging_qos: &MessagingQos,
    ) -> Result<()> {
        self.sent.lock().expect("sent mutex").push(Sent::Stop {
            subscription_id: stop.subscription_id.clone(),
            multicast_id: Some(multicast_id.to_string()),
        });
        Ok(())
    }
}

fn provider() -> DiscoveryEntry {
    DiscoveryEntry::new("provider-1", "radio", "vehicle/Radio")
}

/// Keep-alive QoS used by the watchdog scenarios:
/// min 100ms, heartbeat 1000ms, alert window 1500ms, expiry now+5000ms.
fn watchdog_qos() -> SubscriptionQos {
    SubscriptionQos::OnChangeWithKeepAlive(
        OnChangeWithKeepAliveQos::new()
            .with_min_interval_ms(100)
            .with_max_interval_ms(1_000)
            .with_alert_after_interval_ms(1_500)
            .with_validity_ms(5_000),
    )
}

fn attribute_options(qos: SubscriptionQos) -> AttributeSubscribeOptions {
    AttributeSubscribeOptions {
        proxy_id: "proxy-1".into(),
        provider: provider(),
        attribute_name: "currentStation".into(),
        attribute_type: "RadioStation".into(),
        qos,
        subscription_id: None,
    }
}

fn multicast_options(partitions: &[&str]) -> BroadcastSubscribeOptions {
    BroadcastSubscribeOptions {
        proxy_id: "proxy-1".into(),
        provider: provider(),
        broadcast_name: "stationFound".into(),
        selective: false,
        partitions: partitions.iter().map(|p| (*p).to_string()).collect(),
        filter_parameters: BTreeMap::new(),
        qos: SubscriptionQos::Multicast(MulticastQos::default()),
        subscription_id: None,
    }
}

/// Listener recording the instant of every `on_error` call.
fn error_clock_listener(started: Instant) -> (Arc<ClosureListener>, Arc<Mutex<Vec<Duration>>>) {
    let alerts = Arc::new(Mutex::new(Vec::new()));
    let alerts_clone = Arc::clone(&alerts);
    let listener = Arc::new(ClosureListener::new().with_on_error(move |error| {
        assert!(
            matches!(error, Error::PublicationMissed(_)),
            "unexpected error kind: {error}"
        );
        alerts_clone
            .lock()
            .expect("alerts mutex")
            .push(started.elapsed());
    }));
    (listener, alerts)
}

/// Watchdog fires once per quiet alert window and stops at expiry: three
/// alerts near t=1500/3000/4500ms, nothing after t=5000ms.
#[test]
fn watchdog_alerts_every_quiet_window_until_expiry() {
    let manager = SubscriptionManager::new(Arc::new(RecordingDispatch::default()));
    let started = Instant::now();
    let (listener, alerts) = error_clock_listener(started);

    manager
        .subscribe_to_attribute(attribute_options(watchdog_qos()), listener)
        .expect("registers");

    // Past expiry plus one extra window to catch any stray timer.
    thread::sleep(Duration::from_millis(6_800));

    let alerts = alerts.lock().expect("alerts mutex").clone();
    assert_eq!(
        alerts.len(),
        3,
        "expected exactly three alerts, got {:?}",
        alerts
    );
    let windows = [(1_400u64, 2_000u64), (2_900, 3_500), (4_400, 5_000)];
    for (alert, (low, high)) in alerts.iter().zip(windows) {
        let at = alert.as_millis() as u64;
        assert!(
            at >= low && at <= high,
            "alert at {}ms outside [{}, {}]ms window; all: {:?}",
            at,
            low,
            high,
            alerts
        );
    }
}

/// Publications inside the alert window keep the watchdog quiet.
#[test]
fn watchdog_suppressed_by_flowing_publications() {
    let manager = SubscriptionManager::new(Arc::new(RecordingDispatch::default()));
    let started = Instant::now();
    let (listener, alerts) = error_clock_listener(started);

    let registration = manager
        .subscribe_to_attribute(attribute_options(watchdog_qos()), listener)
        .expect("registers");
    let subscription_id = registration.subscription_id().to_string();

    // Publications at t=500, 1400, 2300ms.
    for publish_at in [500u64, 1_400, 2_300] {
        let elapsed = started.elapsed().as_millis() as u64;
        thread::sleep(Duration::from_millis(publish_at.saturating_sub(elapsed)));
        manager
            .handle_publication(SubscriptionPublication {
                subscription_id: subscription_id.clone(),
                response: Some(Value::from("fm4")),
                error: None,
            })
            .expect("routes");
    }

    // Quiet until shortly before the first window after t=2300 can close.
    let elapsed = started.elapsed().as_millis() as u64;
    thread::sleep(Duration::from_millis(3_700u64.saturating_sub(elapsed)));
    assert!(
        alerts.lock().expect("alerts mutex").is_empty(),
        "no alert may fire while publications are flowing: {:?}",
        alerts.lock().expect("alerts mutex")
    );

    manager.shutdown();
}

/// A provider rejection fails the registration, reaches `on_error` once,
/// and removes every registry trace.
#[test]
fn reply_error_tears_the_subscription_down() {
    let manager = SubscriptionManager::new(Arc::new(RecordingDispatch::default()));
    let errors = Arc::new(AtomicUsize::new(0));
    let errors_clone = Arc::clone(&errors);

    let registration = manager
        .subscribe_to_attribute(
            attribute_options(watchdog_qos()),
            Arc::new(ClosureListener::new().with_on_error(move |error| {
                assert!(matches!(error, Error::Provider { .. }));
                errors_clone.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .expect("registers");
    let subscription_id = registration.subscription_id().to_string();

    manager.handle_subscription_reply(SubscriptionReply {
        subscription_id: subscription_id.clone(),
        error: Some(RemoteError {
            kind: "ProviderRuntimeException".into(),
            message: "no such attribute".into(),
        }),
    });

    match registration.wait() {
        Err(Error::Provider { kind, message }) => {
            assert_eq!(kind, "ProviderRuntimeException");
            assert_eq!(message, "no such attribute");
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(errors.load(Ordering::SeqCst), 1);
    assert!(!manager.has_open_subscriptions());

    // No watchdog may survive the teardown.
    thread::sleep(Duration::from_millis(1_800));
    assert_eq!(errors.load(Ordering::SeqCst), 1);
}

/// Multicast publications fan out by pattern: `+` takes exactly one
/// partition level, trailing `*` takes the rest.
#[test]
fn multicast_publications_route_by_pattern() {
    let manager = SubscriptionManager::new(Arc::new(RecordingDispatch::default()));
    let single_level = Arc::new(AtomicUsize::new(0));
    let multi_level = Arc::new(AtomicUsize::new(0));
    let single_clone = Arc::clone(&single_level);
    let multi_clone = Arc::clone(&multi_level);

    manager
        .subscribe_to_broadcast(
            multicast_options(&["+"]),
            Arc::new(ClosureListener::new().with_on_receive(move |_| {
                single_clone.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .expect("registers provider-1/stationFound/+");
    manager
        .subscribe_to_broadcast(
            multicast_options(&["fm", "*"]),
            Arc::new(ClosureListener::new().with_on_receive(move |_| {
                multi_clone.fetch_add(1, Ordering::SeqCst);
            })),
        )
        .expect("registers provider-1/stationFound/fm/*");

    manager
        .handle_multicast_publication(MulticastPublication {
            multicast_id: "provider-1/stationFound/fm/classic".into(),
            response: Some(Value::from("Radio Classic")),
            error: None,
        })
        .expect("routes");
    assert_eq!(single_level.load(Ordering::SeqCst), 0);
    assert_eq!(multi_level.load(Ordering::SeqCst), 1);

    manager
        .handle_multicast_publication(MulticastPublication {
            multicast_id: "provider-1/stationFound/dab".into(),
            response: Some(Value::from("DAB One")),
            error: None,
        })
        .expect("routes");
    assert_eq!(single_level.load(Ordering::SeqCst), 1);
    assert_eq!(multi_level.load(Ordering::SeqCst), 1);

    // A completely unmatched id is a protocol fault.
    let result = manager.handle_multicast_publication(MulticastPublication {
        multicast_id: "provider-2/somethingElse".into(),
        response: None,
        error: None,
    });
    assert!(matches!(result, Err(Error::UnknownMulticast(_))));
}

/// Unsubscribing an acknowledged subscription emits a stop and leaves the
/// registry empty.
#[test]
fn unsubscribe_emits_stop_and_empties_registry() {
    let dispatch = Arc::new(RecordingDispatch::default());
    let manager = SubscriptionManager::new(dispatch.clone());

    let registration = manager
        .subscribe_to_attribute(
            attribute_options(watchdog_qos()),
            Arc::new(ClosureListener::new().with_on_receive(|_| {})),
        )
        .expect("registers");
    let subscription_id = registration.subscription_id().to_string();

    manager.handle_subscription_reply(SubscriptionReply {
        subscription_id: subscription_id.clone(),
        error: None,
    });
    assert_eq!(registration.wait(), Ok(subscription_id.clone()));

    manager
        .unsubscribe(&subscription_id, &MessagingQos::default())
        .expect("unsubscribes");

    assert_eq!(
        dispatch.stops(),
        vec![Sent::Stop {
            subscription_id,
            multicast_id: None,
        }]
    );
    assert!(!manager.has_open_subscriptions());
}

/// Shutdown fails the pending registration and rejects new ones.
#[test]
fn shutdown_drains_pending_registrations() {
    let manager = SubscriptionManager::new(Arc::new(RecordingDispatch::default()));

    let registration = manager
        .subscribe_to_attribute(
            attribute_options(watchdog_qos()),
            Arc::new(ClosureListener::new()),
        )
        .expect("registers");

    manager.shutdown();

    assert_eq!(registration.wait(), Err(Error::Shutdown));
    assert!(!manager.has_open_subscriptions());

    let result = manager.subscribe_to_attribute(
        attribute_options(watchdog_qos()),
        Arc::new(ClosureListener::new()),
    );
    assert!(matches!(result, Err(Error::Shutdown)));
}

/// The subscription request travels with `min(expiry - now, cap)` as its
/// TTL, and a missing reply settles the registration as timed out.
#[test]
fn missing_reply_times_out_after_the_request_ttl() {
    let dispatch = Arc::new(RecordingDispatch::default());
    let manager = SubscriptionManager::new(dispatch.clone());

    let qos = SubscriptionQos::OnChangeWithKeepAlive(
        OnChangeWithKeepAliveQos::new().with_validity_ms(300),
    );
    let registration = manager
        .subscribe_to_attribute(attribute_options(qos), Arc::new(ClosureListener::new()))
        .expect("registers");

    match dispatch.sent().first() {
        Some(Sent::AttributeRequest { ttl_ms, .. }) => {
            assert!(*ttl_ms <= 300, "ttl {}ms not derived from expiry", ttl_ms);
        }
        other => panic!("unexpected first message: {:?}", other),
    }

    match registration.wait_timeout(Duration::from_millis(2_000)) {
        Some(Err(Error::Timeout(_))) => {}
        other => panic!("unexpected outcome: {:?}", other),
    }
    // The TTL also reclaims the registry entry.
    thread::sleep(Duration::from_millis(100));
    assert!(!manager.has_open_subscriptions());
}

/// Stops for every live subscription go out on terminate, multicast stops
/// included.
#[test]
fn terminate_emits_a_stop_per_subscription() {
    let dispatch = Arc::new(RecordingDispatch::default());
    let manager = SubscriptionManager::new(dispatch.clone());

    let attribute = manager
        .subscribe_to_attribute(
            attribute_options(watchdog_qos()),
            Arc::new(ClosureListener::new()),
        )
        .expect("registers");
    let multicast = manager
        .subscribe_to_broadcast(multicast_options(&["fm"]), Arc::new(ClosureListener::new()))
        .expect("registers");

    manager
        .terminate_subscriptions(5_000)
        .expect("terminates in time");

    let stops = dispatch.stops();
    assert_eq!(stops.len(), 2);
    assert!(stops.contains(&Sent::Stop {
        subscription_id: attribute.subscription_id().to_string(),
        multicast_id: None,
    }));
    assert!(stops.contains(&Sent::Stop {
        subscription_id: multicast.subscription_id().to_string(),
        multicast_id: Some("provider-1/stationFound/fm".into()),
    }));
    assert!(!manager.has_open_subscriptions());
    assert!(!manager.has_multicast_subscriptions());
}
