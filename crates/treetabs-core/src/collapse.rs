//! Subtree collapse and visibility.
//!
//! A tab is visible iff none of its strict ancestors has its subtree
//! collapsed. Flags change here; visibility is re-derived from them.

use crate::event::DerivedEvent;
use crate::store::TreeStore;
use crate::tab::TabId;

impl TreeStore {
    /// Collapses or expands the subtree below `id`.
    ///
    /// Returns true if the flag changed. Unknown tabs and tabs without
    /// children are left alone.
    pub fn set_subtree_collapsed(&mut self, id: TabId, collapsed: bool) -> bool {
        let Some(node) = self.get(id) else {
            tracing::debug!(tab = id, "collapse on unknown tab ignored");
            return false;
        };
        if !node.has_children() || node.is_subtree_collapsed() == collapsed {
            return false;
        }

        if let Some(node) = self.tab_mut(id) {
            node.subtree_collapsed = collapsed;
        }
        self.push_change(DerivedEvent::CollapseChanged { id, collapsed });
        self.refresh_visibility_below(id);
        true
    }

    /// Flips the collapse flag of `id`. Returns true if it changed.
    pub fn toggle_subtree_collapsed(&mut self, id: TabId) -> bool {
        let collapsed = self.get(id).is_some_and(|t| t.is_subtree_collapsed());
        self.set_subtree_collapsed(id, !collapsed)
    }

    /// Collapses or expands every subtree in the window.
    ///
    /// All flags are written first; visibility is recomputed once
    /// afterwards, so the result does not depend on traversal order.
    /// Returns the number of tabs whose flag changed.
    pub fn collapse_expand_all(&mut self, collapsed: bool) -> usize {
        let targets: Vec<TabId> = self
            .iter()
            .filter(|t| t.has_children() && t.is_subtree_collapsed() != collapsed)
            .map(|t| t.id())
            .collect();

        for &id in &targets {
            if let Some(node) = self.tab_mut(id) {
                node.subtree_collapsed = collapsed;
            }
            self.push_change(DerivedEvent::CollapseChanged { id, collapsed });
        }
        if !targets.is_empty() {
            self.refresh_visibility();
        }
        targets.len()
    }

    /// Recomputes visibility for every descendant of `id`.
    fn refresh_visibility_below(&mut self, id: TabId) {
        let below: Vec<TabId> = self.descendants(id).collect();
        for tab in below {
            self.refresh_visibility_of(tab);
        }
    }

    /// Recomputes visibility for the whole window.
    pub(crate) fn refresh_visibility(&mut self) {
        let all: Vec<TabId> = self.order().to_vec();
        for tab in all {
            self.refresh_visibility_of(tab);
        }
    }

    /// Parents come before children in both callers, so the parent's
    /// visibility is already current.
    fn refresh_visibility_of(&mut self, id: TabId) {
        let visible = match self.parent_of(id).and_then(|p| self.get(p)) {
            Some(parent) => parent.is_visible() && !parent.is_subtree_collapsed(),
            None => true,
        };
        let Some(node) = self.tab_mut(id) else {
            return;
        };
        if node.visible != visible {
            node.visible = visible;
            self.push_change(DerivedEvent::VisibilityChanged { id, visible });
        }
    }
}
