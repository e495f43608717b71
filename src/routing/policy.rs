//! Group policy registry.
//!
//! Records every active action group and the policy each installed path was
//! installed under, so the traffic guard can resolve a path's frequency.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use serde::Serialize;

/// Frequency applied when a group sets none (requests per second).
pub const DEFAULT_FREQ: f64 = 30.0;

/// Policy snapshot of one action group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupPolicy {
    pub path: String,
    pub freq: f64,
    pub deprecated: bool,
    pub substitute: String,
}

#[derive(Debug, Default)]
struct PolicyMaps {
    /// group path -> latest policy, for introspection
    groups: HashMap<String, GroupPolicy>,
    /// full route path -> policy the route was installed under
    paths: HashMap<String, GroupPolicy>,
}

/// Shared registry of active groups, written at install time and read by
/// every request through the traffic guard.
#[derive(Debug)]
pub struct GroupPolicies {
    default_freq: f64,
    maps: RwLock<PolicyMaps>,
}

impl GroupPolicies {
    pub fn new(default_freq: f64) -> Self {
        Self {
            default_freq: normalize_freq(default_freq, DEFAULT_FREQ),
            maps: RwLock::new(PolicyMaps::default()),
        }
    }

    pub fn default_freq(&self) -> f64 {
        self.default_freq
    }

    /// Mark `group` active and bind `full_path` to that policy. Sibling
    /// routes of the same group keep the policy they were installed with.
    pub fn activate(&self, group: GroupPolicy, full_path: &str) {
        let mut maps = self.maps.write().unwrap_or_else(PoisonError::into_inner);
        maps.paths.insert(full_path.to_string(), group.clone());
        maps.groups.insert(group.path.clone(), group);
    }

    /// Effective frequency for a request path. Unknown paths and
    /// non-positive group frequencies resolve to the default.
    pub fn frequency_for(&self, path: &str) -> f64 {
        let maps = self.maps.read().unwrap_or_else(PoisonError::into_inner);
        let group = maps.paths.get(path).or_else(|| maps.groups.get(path));
        match group {
            Some(g) => normalize_freq(g.freq, self.default_freq),
            None => self.default_freq,
        }
    }

    pub fn group(&self, path: &str) -> Option<GroupPolicy> {
        self.maps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .groups
            .get(path)
            .cloned()
    }

    /// All active groups, sorted by path.
    pub fn groups(&self) -> Vec<GroupPolicy> {
        let mut groups: Vec<_> = self
            .maps
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .groups
            .values()
            .cloned()
            .collect();
        groups.sort_by(|a, b| a.path.cmp(&b.path));
        groups
    }
}

impl Default for GroupPolicies {
    fn default() -> Self {
        Self::new(DEFAULT_FREQ)
    }
}

/// `freq` when it is a usable positive rate, `default` otherwise.
pub fn normalize_freq(freq: f64, default: f64) -> f64 {
    if freq.is_finite() && freq > 0.0 {
        freq
    } else {
        default
    }
}
