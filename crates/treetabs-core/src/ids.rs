//! Identifier registry.
//!
//! Maps host tab identifiers onto the identifiers the tree store uses.
//! The two diverge while a locally created tab waits for the host to
//! confirm it, and when the host reports a tab under a different id than
//! the one it handed out earlier.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::tab::{HostTabId, TabId};

/// First value handed out for provisional tab identifiers.
///
/// Host identifiers are expected to stay below this value.
pub const PROVISIONAL_BASE: TabId = 1 << 31;

/// Number of released host ids remembered as gone. Older ones fall back to
/// resolving to themselves, which the store no longer holds.
pub const RELEASED_CAPACITY: usize = 1024;

/// Resolves host identifiers to internal tab identifiers.
///
/// Identifiers without an explicit mapping resolve to themselves.
#[derive(Debug, Clone)]
pub struct IdRegistry {
    host_to_internal: HashMap<HostTabId, TabId>,
    internal_to_host: HashMap<TabId, HostTabId>,
    released: HashSet<HostTabId>,
    /// Release order, oldest first.
    release_order: VecDeque<HostTabId>,
    next_provisional: TabId,
}

impl IdRegistry {
    #[must_use]
    pub fn new() -> Self {
        IdRegistry {
            host_to_internal: HashMap::new(),
            internal_to_host: HashMap::new(),
            released: HashSet::new(),
            release_order: VecDeque::new(),
            next_provisional: PROVISIONAL_BASE,
        }
    }

    /// Builds a registry from a host-supplied table of wrong-to-correct ids.
    ///
    /// Each entry maps the id the host reports to the id the tree knows
    /// the tab by.
    #[must_use]
    pub fn from_table(wrong_to_correct: &HashMap<HostTabId, TabId>) -> Self {
        let mut registry = Self::new();
        for (&host, &internal) in wrong_to_correct {
            registry.register_mapping(internal, host);
        }
        registry
    }

    /// Allocates a provisional id for a tab created locally.
    pub fn allocate_provisional(&mut self) -> TabId {
        let id = self.next_provisional;
        self.next_provisional = self.next_provisional.wrapping_add(1).max(PROVISIONAL_BASE);
        id
    }

    /// Returns true if `id` was handed out by [`Self::allocate_provisional`]
    /// and has not been confirmed by the host yet.
    #[must_use]
    pub fn is_provisional(&self, id: TabId) -> bool {
        id >= PROVISIONAL_BASE && !self.internal_to_host.contains_key(&id)
    }

    /// Resolves a host id to the internal id.
    ///
    /// Returns `None` when the id was released; callers treat that as
    /// "tab gone".
    #[must_use]
    pub fn resolve(&self, host: HostTabId) -> Option<TabId> {
        if self.released.contains(&host) {
            return None;
        }
        Some(self.host_to_internal.get(&host).copied().unwrap_or(host))
    }

    /// Returns the id to use when addressing `internal` in host commands.
    #[must_use]
    pub fn host_id(&self, internal: TabId) -> HostTabId {
        self.internal_to_host
            .get(&internal)
            .copied()
            .unwrap_or(internal)
    }

    /// Records that `host` refers to the tab known internally as `internal`.
    pub fn register_mapping(&mut self, internal: TabId, host: HostTabId) {
        if self.released.remove(&host) {
            self.release_order.retain(|&h| h != host);
        }
        if let Some(previous) = self.internal_to_host.insert(internal, host) {
            self.host_to_internal.remove(&previous);
        }
        if internal != host {
            self.host_to_internal.insert(host, internal);
        }
    }

    /// Forgets every mapping of `internal`.
    ///
    /// Releasing an unknown id is a no-op. Only the most recent
    /// [`RELEASED_CAPACITY`] releases are remembered.
    pub fn release(&mut self, internal: TabId) {
        let host = self.internal_to_host.remove(&internal).unwrap_or(internal);
        self.host_to_internal.remove(&host);
        if self.released.insert(host) {
            self.release_order.push_back(host);
        }
        while self.release_order.len() > RELEASED_CAPACITY {
            if let Some(oldest) = self.release_order.pop_front() {
                self.released.remove(&oldest);
            }
        }
    }

    /// Forgets every mapping and release marker.
    pub fn clear(&mut self) {
        self.host_to_internal.clear();
        self.internal_to_host.clear();
        self.released.clear();
        self.release_order.clear();
    }
}

impl Default for IdRegistry {
    fn default() -> Self {
        Self::new()
    }
}
