// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Multicast id construction, wildcard patterns, and the receiver directory.
//!
//! A multicast id is `<providerParticipantId>/<broadcastName>[/<partition>]*`.
//! Partitions are `[A-Za-z0-9_]+`, the single-level wildcard `+`, or the
//! multi-level wildcard `*`, which is only valid as the last partition.
//!
//! Registered ids may contain wildcards; published ids are concrete. A
//! registered id is compiled once into an anchored regex (`+` -> `[^/]+`,
//! trailing `*` -> `.+`, literals escaped) and matched against every
//! incoming multicast publication.

use crate::error::{Error, Result};
use regex::Regex;
use std::collections::HashMap;

/// Single-level partition wildcard.
pub const SINGLE_LEVEL_WILDCARD: &str = "+";

/// Trailing multi-level partition wildcard.
pub const MULTI_LEVEL_WILDCARD: &str = "*";

fn is_literal_partition(partition: &str) -> bool {
    !partition.is_empty()
        && partition
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Validate a partition list for a broadcast subscription.
///
/// # Errors
///
/// `BadInput` when a partition is empty, contains characters outside
/// `[A-Za-z0-9_]`, or uses `*` anywhere but the last position.
pub fn validate_partitions(partitions: &[String]) -> Result<()> {
    for (index, partition) in partitions.iter().enumerate() {
        let last = index == partitions.len() - 1;
        match partition.as_str() {
            SINGLE_LEVEL_WILDCARD => {}
            MULTI_LEVEL_WILDCARD if last => {}
            MULTI_LEVEL_WILDCARD => {
                return Err(Error::BadInput(
                    "multi-level wildcard '*' is only valid as the last partition".into(),
                ));
            }
            other if is_literal_partition(other) => {}
            other => {
                return Err(Error::BadInput(format!(
                    "invalid partition '{}': expected [A-Za-z0-9_]+, '+' or '*'",
                    other
                )));
            }
        }
    }
    Ok(())
}

/// Build a multicast id from its components, validating the partitions.
///
/// # Errors
///
/// `BadInput` when the participant id or broadcast name is empty, or a
/// partition is invalid (see [`validate_partitions`]).
pub fn build_multicast_id(
    provider_participant_id: &str,
    broadcast_name: &str,
    partitions: &[String],
) -> Result<String> {
    if provider_participant_id.is_empty() {
        return Err(Error::BadInput("provider participant id is empty".into()));
    }
    if broadcast_name.is_empty() {
        return Err(Error::BadInput("broadcast name is empty".into()));
    }
    validate_partitions(partitions)?;

    let mut id = String::with_capacity(
        provider_participant_id.len()
            + broadcast_name.len()
            + partitions.iter().map(|p| p.len() + 1).sum::<usize>()
            + 1,
    );
    id.push_str(provider_participant_id);
    id.push('/');
    id.push_str(broadcast_name);
    for partition in partitions {
        id.push('/');
        id.push_str(partition);
    }
    Ok(id)
}

/// Compile a registered multicast id into its anchored matching regex.
fn compile_pattern(multicast_id: &str) -> Result<Regex> {
    let mut pattern = String::with_capacity(multicast_id.len() + 8);
    pattern.push('^');

    let segments: Vec<&str> = multicast_id.split('/').collect();
    for (index, segment) in segments.iter().enumerate() {
        if index > 0 {
            pattern.push('/');
        }
        let last = index == segments.len() - 1;
        match *segment {
            SINGLE_LEVEL_WILDCARD => pattern.push_str("[^/]+"),
            MULTI_LEVEL_WILDCARD if last => pattern.push_str(".+"),
            literal => pattern.push_str(&regex::escape(literal)),
        }
    }
    pattern.push('$');

    Regex::new(&pattern)
        .map_err(|e| Error::BadInput(format!("multicast id '{}': {}", multicast_id, e)))
}

struct PatternEntry {
    regex: Regex,
    receivers: Vec<String>,
}

/// Directory of multicast receivers, keyed by registered (possibly
/// wildcarded) multicast id.
///
/// Each receiver id appears under exactly one pattern; patterns with no
/// remaining receivers are dropped. The directory has no interior locking;
/// the registry that owns it provides mutual exclusion.
#[derive(Default)]
pub struct MulticastDirectory {
    entries: HashMap<String, PatternEntry>,
}

impl MulticastDirectory {
    /// Create an empty directory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `receiver_id` under `multicast_id`, compiling the pattern on
    /// first use. Re-registering the same pair is a no-op.
    ///
    /// # Errors
    ///
    /// `BadInput` when the multicast id does not compile.
    pub fn register(&mut self, multicast_id: &str, receiver_id: &str) -> Result<()> {
        if !self.entries.contains_key(multicast_id) {
            let regex = compile_pattern(multicast_id)?;
            self.entries.insert(
                multicast_id.to_string(),
                PatternEntry {
                    regex,
                    receivers: Vec::new(),
                },
            );
        }
        // contains_key check above guarantees presence
        if let Some(entry) = self.entries.get_mut(multicast_id) {
            if !entry.receivers.iter().any(|r| r == receiver_id) {
                entry.receivers.push(receiver_id.to_string());
                log::debug!(
                    "[multicast] registered receiver '{}' for '{}' ({} total)",
                    receiver_id,
                    multicast_id,
                    entry.receivers.len()
                );
            }
        }
        Ok(())
    }

    /// Remove `receiver_id` from `multicast_id`, dropping the pattern when
    /// its receiver list becomes empty. Returns whether anything changed.
    pub fn unregister(&mut self, multicast_id: &str, receiver_id: &str) -> bool {
        let Some(entry) = self.entries.get_mut(multicast_id) else {
            return false;
        };
        let Some(index) = entry.receivers.iter().position(|r| r == receiver_id) else {
            return false;
        };
        entry.receivers.remove(index);
        if entry.receivers.is_empty() {
            self.entries.remove(multicast_id);
            log::debug!("[multicast] dropped empty pattern '{}'", multicast_id);
        }
        true
    }

    /// Receivers of every registered pattern matching the concrete
    /// `multicast_id`, in registration order within each pattern.
    #[must_use]
    pub fn receivers_matching(&self, multicast_id: &str) -> Vec<String> {
        let mut matched = Vec::new();
        for entry in self.entries.values() {
            if entry.regex.is_match(multicast_id) {
                matched.extend(entry.receivers.iter().cloned());
            }
        }
        matched
    }

    /// Whether the exact pattern is registered.
    #[must_use]
    pub fn contains(&self, multicast_id: &str) -> bool {
        self.entries.contains_key(multicast_id)
    }

    /// Whether `receiver_id` is registered under the exact pattern.
    #[must_use]
    pub fn contains_receiver(&self, multicast_id: &str, receiver_id: &str) -> bool {
        self.entries
            .get(multicast_id)
            .is_some_and(|e| e.receivers.iter().any(|r| r == receiver_id))
    }

    /// Whether no pattern is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop every pattern and receiver.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| (*s).to_string()).collect()
    }

    #[test]
    fn test_build_plain_id() {
        let id = build_multicast_id("p1", "stationFound", &[]).expect("builds");
        assert_eq!(id, "p1/stationFound");
    }

    #[test]
    fn test_build_with_partitions() {
        let id = build_multicast_id("p1", "stationFound", &strings(&["fm", "classic"]))
            .expect("builds");
        assert_eq!(id, "p1/stationFound/fm/classic");
    }

    #[test]
    fn test_build_rejects_empty_components() {
        assert!(build_multicast_id("", "b", &[]).is_err());
        assert!(build_multicast_id("p", "", &[]).is_err());
        assert!(build_multicast_id("p", "b", &strings(&[""])).is_err());
    }

    #[test]
    fn test_build_rejects_bad_partition_characters() {
        assert!(build_multicast_id("p", "b", &strings(&["f.m"])).is_err());
        assert!(build_multicast_id("p", "b", &strings(&["f/m"])).is_err());
        assert!(build_multicast_id("p", "b", &strings(&["f m"])).is_err());
    }

    #[test]
    fn test_build_rejects_interior_multi_level_wildcard() {
        assert!(build_multicast_id("p", "b", &strings(&["*", "fm"])).is_err());
        assert!(build_multicast_id("p", "b", &strings(&["fm", "*"])).is_ok());
    }

    #[test]
    fn test_single_level_wildcard_matches_one_segment() {
        let mut dir = MulticastDirectory::new();
        dir.register("p1/stationFound/+", "sub-a").expect("registers");

        assert_eq!(
            dir.receivers_matching("p1/stationFound/dab"),
            vec!["sub-a".to_string()]
        );
        assert!(dir.receivers_matching("p1/stationFound").is_empty());
        assert!(dir.receivers_matching("p1/stationFound/fm/classic").is_empty());
    }

    #[test]
    fn test_multi_level_wildcard_matches_remaining_segments() {
        let mut dir = MulticastDirectory::new();
        dir.register("p1/stationFound/fm/*", "sub-b").expect("registers");

        assert_eq!(
            dir.receivers_matching("p1/stationFound/fm/classic"),
            vec!["sub-b".to_string()]
        );
        assert_eq!(
            dir.receivers_matching("p1/stationFound/fm/classic/eighties"),
            vec!["sub-b".to_string()]
        );
        assert!(dir.receivers_matching("p1/stationFound/fm").is_empty());
        assert!(dir.receivers_matching("p1/stationFound/dab").is_empty());
    }

    #[test]
    fn test_literal_ids_do_not_glob() {
        let mut dir = MulticastDirectory::new();
        dir.register("p1/stationFound", "sub-c").expect("registers");

        assert_eq!(
            dir.receivers_matching("p1/stationFound"),
            vec!["sub-c".to_string()]
        );
        assert!(dir.receivers_matching("p1/stationFoundX").is_empty());
        assert!(dir.receivers_matching("p1/stationFound/fm").is_empty());
    }

    #[test]
    fn test_multiple_patterns_fan_out() {
        let mut dir = MulticastDirectory::new();
        dir.register("p1/e/+", "sub-a").expect("registers");
        dir.register("p1/e/*", "sub-b").expect("registers");

        let mut receivers = dir.receivers_matching("p1/e/one");
        receivers.sort();
        assert_eq!(receivers, vec!["sub-a".to_string(), "sub-b".to_string()]);

        // Two levels: only the multi-level wildcard still matches.
        assert_eq!(
            dir.receivers_matching("p1/e/one/two"),
            vec!["sub-b".to_string()]
        );
    }

    #[test]
    fn test_unregister_drops_empty_pattern() {
        let mut dir = MulticastDirectory::new();
        dir.register("p1/e/+", "sub-a").expect("registers");
        dir.register("p1/e/+", "sub-b").expect("registers");

        assert!(dir.unregister("p1/e/+", "sub-a"));
        assert!(dir.contains("p1/e/+"));
        assert!(dir.unregister("p1/e/+", "sub-b"));
        assert!(!dir.contains("p1/e/+"));
        assert!(dir.is_empty());

        assert!(!dir.unregister("p1/e/+", "sub-b"));
    }

    #[test]
    fn test_duplicate_registration_is_noop() {
        let mut dir = MulticastDirectory::new();
        dir.register("p1/e", "sub-a").expect("registers");
        dir.register("p1/e", "sub-a").expect("registers");
        assert_eq!(dir.receivers_matching("p1/e").len(), 1);
    }

    #[test]
    fn test_regex_metacharacters_in_ids_are_literal() {
        let mut dir = MulticastDirectory::new();
        // Participant ids are opaque and may contain regex metacharacters.
        dir.register("p.1/station(Found)", "sub-a").expect("registers");
        assert_eq!(dir.receivers_matching("p.1/station(Found)").len(), 1);
        assert!(dir.receivers_matching("pX1/station(Found)").is_empty());
    }
}
