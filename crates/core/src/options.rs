//! Option lists keyed by the selection they depend on.
//!
//! The editor fetches option lists (workflows for an entity type, fields of
//! a step) while the user keeps editing. A response is only applied if the
//! key it was requested for is still the current key; responses for a
//! superseded selection are dropped.

use std::fmt::Debug;

/// Handle for one in-flight fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingRequest<K> {
    pub key: K,
}

/// The options for the currently selected key.
#[derive(Debug, Clone)]
pub struct OptionSlot<K, T> {
    current_key: Option<K>,
    options: Vec<T>,
    loading: bool,
}

impl<K, T> Default for OptionSlot<K, T> {
    fn default() -> Self {
        Self {
            current_key: None,
            options: Vec::new(),
            loading: false,
        }
    }
}

impl<K: Clone + PartialEq + Debug, T> OptionSlot<K, T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that options for `key` are now wanted.
    ///
    /// Options loaded for a different key are cleared immediately so stale
    /// choices are never offered.
    pub fn request(&mut self, key: K) -> PendingRequest<K> {
        if self.current_key.as_ref() != Some(&key) {
            self.options.clear();
        }
        self.current_key = Some(key.clone());
        self.loading = true;
        PendingRequest { key }
    }

    /// Clear the selection, e.g. when the dependency is unset.
    pub fn reset(&mut self) {
        self.current_key = None;
        self.options.clear();
        self.loading = false;
    }

    /// Apply a response. Returns `false` and drops the options when the
    /// request's key no longer matches the current key.
    pub fn resolve(&mut self, pending: PendingRequest<K>, options: Vec<T>) -> bool {
        if self.current_key.as_ref() != Some(&pending.key) {
            tracing::debug!(key = ?pending.key, current = ?self.current_key, "Discarding stale option response");
            return false;
        }
        self.options = options;
        self.loading = false;
        true
    }

    pub fn current_key(&self) -> Option<&K> {
        self.current_key.as_ref()
    }

    pub fn options(&self) -> &[T] {
        &self.options
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }
}
