// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Registration completion handles.
//!
//! Registering a subscription is asynchronous: the request goes out, and the
//! provider's reply (or a TTL, or shutdown) settles the outcome later. The
//! caller keeps a [`Registration`]; the engine keeps the matching
//! [`Completion`] inside the pending-reply waiter. The outcome is settled
//! exactly once - the first resolution wins, later ones are ignored.

use crate::error::{Error, Result};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

struct CompletionState {
    slot: Mutex<Option<Result<String>>>,
    settled: Condvar,
}

#[inline]
fn recover_slot<'a>(
    lock: &'a Mutex<Option<Result<String>>>,
) -> MutexGuard<'a, Option<Result<String>>> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            log::debug!("[registration] WARNING: completion slot poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

/// Caller-facing handle for a subscription registration.
///
/// Settles exactly once with `Ok(subscription_id)` when the provider
/// acknowledges, or with the error that ended the attempt (reply error,
/// request TTL, shutdown).
pub struct Registration {
    subscription_id: String,
    state: Arc<CompletionState>,
}

impl Registration {
    /// The subscription id this registration was issued under.
    #[must_use]
    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    /// The outcome, if already settled. Never blocks.
    #[must_use]
    pub fn try_result(&self) -> Option<Result<String>> {
        recover_slot(&self.state.slot).clone()
    }

    /// Block until the registration settles.
    pub fn wait(&self) -> Result<String> {
        let mut slot = recover_slot(&self.state.slot);
        loop {
            if let Some(outcome) = slot.as_ref() {
                return outcome.clone();
            }
            slot = match self.state.settled.wait(slot) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }

    /// Block until the registration settles or `timeout` elapses.
    /// Returns `None` on timeout.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<String>> {
        let deadline = std::time::Instant::now() + timeout;
        let mut slot = recover_slot(&self.state.slot);
        loop {
            if let Some(outcome) = slot.as_ref() {
                return Some(outcome.clone());
            }
            let now = std::time::Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _timed_out) = match self.state.settled.wait_timeout(slot, deadline - now) {
                Ok(res) => res,
                Err(poisoned) => poisoned.into_inner(),
            };
            slot = guard;
        }
    }
}

/// Engine-side resolver for a [`Registration`].
#[derive(Clone)]
pub(crate) struct Completion {
    state: Arc<CompletionState>,
}

impl Completion {
    /// Settle the registration. Returns `false` when it was already settled
    /// (the earlier outcome stands).
    pub(crate) fn resolve(&self, outcome: Result<String>) -> bool {
        let mut slot = recover_slot(&self.state.slot);
        if slot.is_some() {
            return false;
        }
        *slot = Some(outcome);
        drop(slot);
        self.state.settled.notify_all();
        true
    }

    /// Settle with an error; shorthand for failure paths.
    pub(crate) fn fail(&self, error: Error) -> bool {
        self.resolve(Err(error))
    }
}

/// Create a linked registration/completion pair for `subscription_id`.
pub(crate) fn registration_pair(subscription_id: String) -> (Registration, Completion) {
    let state = Arc::new(CompletionState {
        slot: Mutex::new(None),
        settled: Condvar::new(),
    });
    (
        Registration {
            subscription_id,
            state: Arc::clone(&state),
        },
        Completion { state },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_unsettled_registration_has_no_result() {
        let (registration, _completion) = registration_pair("sub-1".into());
        assert_eq!(registration.subscription_id(), "sub-1");
        assert!(registration.try_result().is_none());
        assert!(registration
            .wait_timeout(Duration::from_millis(10))
            .is_none());
    }

    #[test]
    fn test_first_resolution_wins() {
        let (registration, completion) = registration_pair("sub-1".into());
        assert!(completion.resolve(Ok("sub-1".into())));
        assert!(!completion.fail(Error::Shutdown));

        assert_eq!(registration.wait(), Ok("sub-1".into()));
        assert_eq!(registration.try_result(), Some(Ok("sub-1".into())));
    }

    #[test]
    fn test_wait_unblocks_on_resolution() {
        let (registration, completion) = registration_pair("sub-2".into());

        let resolver = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            completion.fail(Error::Timeout("no reply".into()));
        });

        match registration.wait() {
            Err(Error::Timeout(_)) => {}
            other => panic!("unexpected outcome: {:?}", other),
        }
        resolver.join().expect("resolver thread");
    }

    #[test]
    fn test_clone_shares_settlement() {
        let (registration, completion) = registration_pair("sub-3".into());
        let second = completion.clone();
        assert!(completion.resolve(Ok("sub-3".into())));
        assert!(!second.fail(Error::Shutdown));
        assert_eq!(registration.wait(), Ok("sub-3".into()));
    }
}
