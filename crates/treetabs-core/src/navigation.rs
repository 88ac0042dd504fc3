//! Structural queries over a [`TreeStore`].
//!
//! Nothing here mutates the store. Absence is always `None` or an empty
//! iterator, never an error.

use crate::store::TreeStore;
use crate::tab::TabId;

/// Options for [`TreeStore::max_level`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LevelFilter {
    /// Ignore tabs hidden by a collapsed ancestor.
    pub only_visible: bool,
}

impl LevelFilter {
    #[must_use]
    pub fn visible() -> Self {
        LevelFilter { only_visible: true }
    }
}

/// Iterator from a tab's parent up to its root.
#[derive(Debug, Clone)]
pub struct Ancestors<'a> {
    store: &'a TreeStore,
    next: Option<TabId>,
}

impl Iterator for Ancestors<'_> {
    type Item = TabId;

    fn next(&mut self) -> Option<TabId> {
        let current = self.next?;
        self.next = self.store.get(current).and_then(|t| t.parent());
        Some(current)
    }
}

/// Pre-order iterator over a tab's descendants.
#[derive(Debug, Clone)]
pub struct Descendants<'a> {
    store: &'a TreeStore,
    stack: Vec<&'a [TabId]>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = TabId;

    fn next(&mut self) -> Option<TabId> {
        let store: &'a TreeStore = self.store;
        loop {
            let top = self.stack.last_mut()?;
            let slice: &'a [TabId] = *top;
            let Some((&first, rest)) = slice.split_first() else {
                self.stack.pop();
                continue;
            };
            *top = rest;
            if let Some(node) = store.get(first) {
                self.stack.push(node.children());
            }
            return Some(first);
        }
    }
}

impl TreeStore {
    /// Parent of `id`, or `None` for roots and unknown tabs.
    #[must_use]
    pub fn parent_of(&self, id: TabId) -> Option<TabId> {
        self.get(id).and_then(|t| t.parent())
    }

    #[must_use]
    pub fn first_child(&self, id: TabId) -> Option<TabId> {
        self.get(id).and_then(|t| t.children().first().copied())
    }

    #[must_use]
    pub fn last_child(&self, id: TabId) -> Option<TabId> {
        self.get(id).and_then(|t| t.children().last().copied())
    }

    /// Sibling directly before `id` among its parent's children, or among
    /// the roots.
    #[must_use]
    pub fn previous_sibling(&self, id: TabId) -> Option<TabId> {
        let node = self.get(id)?;
        match node.parent() {
            Some(p) => {
                let siblings = self.get(p)?.children();
                let at = siblings.iter().position(|&s| s == id)?;
                at.checked_sub(1).map(|i| siblings[i])
            }
            None => self.order()[..node.position()]
                .iter()
                .rev()
                .copied()
                .find(|&t| self.get(t).is_some_and(|n| n.is_root())),
        }
    }

    /// Sibling directly after `id` among its parent's children, or among
    /// the roots.
    #[must_use]
    pub fn next_sibling(&self, id: TabId) -> Option<TabId> {
        let node = self.get(id)?;
        match node.parent() {
            Some(p) => {
                let siblings = self.get(p)?.children();
                let at = siblings.iter().position(|&s| s == id)?;
                siblings.get(at + 1).copied()
            }
            None => self
                .order()
                .get(node.position() + 1..)?
                .iter()
                .copied()
                .find(|&t| self.get(t).is_some_and(|n| n.is_root())),
        }
    }

    /// Ancestors of `id`, nearest first. Empty for roots and unknown tabs.
    #[must_use]
    pub fn ancestors(&self, id: TabId) -> Ancestors<'_> {
        Ancestors {
            store: self,
            next: self.parent_of(id),
        }
    }

    /// Descendants of `id` in pre-order, which is also flat order.
    #[must_use]
    pub fn descendants(&self, id: TabId) -> Descendants<'_> {
        let stack = self.get(id).map(|t| vec![t.children()]).unwrap_or_default();
        Descendants { store: self, stack }
    }

    /// Last tab of the subtree below `id`, or `None` for leaves.
    ///
    /// Moving a tab after another tab's whole subtree inserts it after this
    /// tab.
    #[must_use]
    pub fn last_descendant(&self, id: TabId) -> Option<TabId> {
        let mut current = self.last_child(id)?;
        while let Some(last) = self.last_child(current) {
            current = last;
        }
        Some(current)
    }

    /// `id` followed by its descendants, the unit moved by tree commands.
    #[must_use]
    pub fn subtree(&self, id: TabId) -> Vec<TabId> {
        if !self.contains(id) {
            return Vec::new();
        }
        std::iter::once(id).chain(self.descendants(id)).collect()
    }

    /// Returns true if `id` lies strictly below `ancestor`.
    #[must_use]
    pub fn is_descendant_of(&self, id: TabId, ancestor: TabId) -> bool {
        self.ancestors(id).any(|a| a == ancestor)
    }

    #[must_use]
    pub fn descendant_count(&self, id: TabId) -> usize {
        self.descendants(id).count()
    }

    /// Root of the tree containing `id`.
    #[must_use]
    pub fn root_of(&self, id: TabId) -> Option<TabId> {
        if !self.contains(id) {
            return None;
        }
        Some(self.ancestors(id).last().unwrap_or(id))
    }

    /// Deepest level in the window, 0 for flat and for empty windows.
    #[must_use]
    pub fn max_level(&self, filter: LevelFilter) -> u32 {
        self.iter()
            .filter(|t| !filter.only_visible || t.is_visible())
            .map(|t| t.level())
            .max()
            .unwrap_or(0)
    }
}
