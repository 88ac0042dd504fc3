//! Tree store for one host window.
//!
//! The [`TreeStore`] mirrors the host's flat tab order and layers the
//! parent/child hierarchy on top of it. Every structural entry point ends
//! with a normalization pass that re-derives child lists, levels, positions
//! and visibility from the flat order, so the store is tree-sorted whenever
//! control returns to the caller.
//!
//! # Example
//!
//! ```
//! use treetabs_core::TreeStore;
//!
//! let mut store = TreeStore::new(1);
//! store.insert(10, 0, None).unwrap();
//! store.insert(11, 1, Some(10)).unwrap();
//!
//! assert_eq!(store.get(11).unwrap().parent(), Some(10));
//! assert_eq!(store.get(11).unwrap().level(), 1);
//! ```

use std::collections::{HashMap, HashSet};

use crate::error::{TreeError, TreeResult};
use crate::event::DerivedEvent;
use crate::tab::{TabId, TabNode, WindowId};

/// Parent, level and visibility per tab, taken before a mutation.
pub(crate) type Snapshot = HashMap<TabId, (Option<TabId>, u32, bool)>;

/// Hierarchy and flat order of every tab in one window.
///
/// # Thread Safety
///
/// TreeStore is not thread-safe. It is owned by the window's event loop and
/// only mutated from there.
#[derive(Debug, Clone)]
pub struct TreeStore {
    window: WindowId,
    tabs: HashMap<TabId, TabNode>,
    order: Vec<TabId>,
    changes: Vec<DerivedEvent>,
}

impl TreeStore {
    /// Creates an empty store for `window`.
    #[must_use]
    pub fn new(window: WindowId) -> Self {
        TreeStore {
            window,
            tabs: HashMap::new(),
            order: Vec::new(),
            changes: Vec::new(),
        }
    }

    /// Creates a store holding `order` as flat root tabs.
    ///
    /// # Errors
    ///
    /// Returns `TreeError::HostDesync` if `order` contains duplicates.
    pub fn from_order(window: WindowId, order: Vec<TabId>) -> TreeResult<Self> {
        let mut store = Self::new(window);
        store.rebuild(order)?;
        store.changes.clear();
        Ok(store)
    }

    #[must_use]
    pub fn window(&self) -> WindowId {
        self.window
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    #[must_use]
    pub fn contains(&self, id: TabId) -> bool {
        self.tabs.contains_key(&id)
    }

    #[must_use]
    pub fn get(&self, id: TabId) -> Option<&TabNode> {
        self.tabs.get(&id)
    }

    /// Flat order as last reported by (or sent to) the host.
    #[must_use]
    pub fn order(&self) -> &[TabId] {
        &self.order
    }

    #[must_use]
    pub fn position(&self, id: TabId) -> Option<usize> {
        self.tabs.get(&id).map(|t| t.position)
    }

    #[must_use]
    pub fn tab_at(&self, index: usize) -> Option<TabId> {
        self.order.get(index).copied()
    }

    /// Iterates tabs in flat order.
    pub fn iter(&self) -> impl Iterator<Item = &TabNode> + '_ {
        self.order.iter().filter_map(move |id| self.tabs.get(id))
    }

    /// Iterates root tabs in flat order.
    pub fn roots(&self) -> impl Iterator<Item = TabId> + '_ {
        self.iter().filter(|t| t.is_root()).map(|t| t.id)
    }

    /// Drains the derived-state changes recorded since the last call.
    pub fn take_changes(&mut self) -> Vec<DerivedEvent> {
        std::mem::take(&mut self.changes)
    }

    pub(crate) fn push_change(&mut self, change: DerivedEvent) {
        self.changes.push(change);
    }

    pub(crate) fn tab_mut(&mut self, id: TabId) -> Option<&mut TabNode> {
        self.tabs.get_mut(&id)
    }

    /// Inserts a new tab at `index` of the flat order.
    ///
    /// An unknown `parent` is ignored. The final parent may differ from the
    /// requested one when `index` lies outside the parent's subtree.
    ///
    /// # Errors
    ///
    /// Returns `TreeError::HostDesync` if the tab already exists or `index`
    /// is past the end of the flat order.
    pub fn insert(&mut self, id: TabId, index: usize, parent: Option<TabId>) -> TreeResult<()> {
        if self.tabs.contains_key(&id) {
            return Err(TreeError::desync(
                self.window,
                format!("tab {id} created twice"),
            ));
        }
        if index > self.order.len() {
            return Err(TreeError::desync(
                self.window,
                format!("insert index {index} past end ({})", self.order.len()),
            ));
        }

        let parent = parent.filter(|p| {
            let known = self.tabs.contains_key(p);
            if !known {
                tracing::debug!(tab = id, parent = *p, "ignoring unknown opener");
            }
            known
        });

        let mut node = TabNode::new(id, index);
        node.parent = parent;
        self.tabs.insert(id, node);
        self.order.insert(index, id);
        self.normalize();
        Ok(())
    }

    /// Removes a tab, re-parenting its children to its former parent.
    ///
    /// # Errors
    ///
    /// Returns `TreeError::UnknownTab` if the tab is not in the store.
    pub fn remove(&mut self, id: TabId) -> TreeResult<()> {
        if !self.tabs.contains_key(&id) {
            return Err(TreeError::UnknownTab(id));
        }
        let before = self.snapshot();
        let removed = self.tabs.remove(&id).ok_or(TreeError::UnknownTab(id))?;
        for child in &removed.children {
            if let Some(node) = self.tabs.get_mut(child) {
                node.parent = removed.parent;
            }
        }
        self.order.retain(|&t| t != id);
        self.changes.push(DerivedEvent::TabRemoved { id });
        self.normalize_since(&before);
        Ok(())
    }

    /// Mirrors a single-tab move the host already performed.
    ///
    /// # Errors
    ///
    /// Returns `TreeError::UnknownTab` for an unknown tab and
    /// `TreeError::HostDesync` if `from` does not hold `id` or `to` is out
    /// of range.
    pub fn mirror_move(&mut self, id: TabId, from: usize, to: usize) -> TreeResult<()> {
        if !self.tabs.contains_key(&id) {
            return Err(TreeError::UnknownTab(id));
        }
        if self.order.get(from) != Some(&id) {
            return Err(TreeError::desync(
                self.window,
                format!(
                    "tab {id} reported at {from} but mirrored at {:?}",
                    self.position(id)
                ),
            ));
        }
        if to >= self.order.len() {
            return Err(TreeError::desync(
                self.window,
                format!("move target {to} past end ({})", self.order.len()),
            ));
        }
        self.order.remove(from);
        self.order.insert(to, id);
        self.normalize();
        Ok(())
    }

    /// Replaces the flat order with a permutation of the current tabs.
    ///
    /// # Errors
    ///
    /// Returns `TreeError::HostDesync` if `order` is not a permutation of
    /// the tabs in the store.
    pub fn apply_order(&mut self, order: Vec<TabId>) -> TreeResult<()> {
        self.check_permutation(&order)?;
        self.order = order;
        self.normalize();
        Ok(())
    }

    /// Sets the parent links in `relinks` and the flat order in one step.
    ///
    /// Callers validate cycles beforehand; this only checks that every tab
    /// involved exists.
    ///
    /// # Errors
    ///
    /// Returns `TreeError::UnknownTab` or `TreeError::HostDesync` without
    /// touching the store.
    pub fn commit(
        &mut self,
        relinks: &[(TabId, Option<TabId>)],
        order: Option<Vec<TabId>>,
    ) -> TreeResult<()> {
        for &(tab, parent) in relinks {
            if !self.tabs.contains_key(&tab) {
                return Err(TreeError::UnknownTab(tab));
            }
            if let Some(p) = parent {
                if !self.tabs.contains_key(&p) {
                    return Err(TreeError::UnknownTab(p));
                }
            }
        }
        if let Some(order) = &order {
            self.check_permutation(order)?;
        }

        let before = self.snapshot();
        for &(tab, parent) in relinks {
            if let Some(node) = self.tabs.get_mut(&tab) {
                node.parent = parent;
            }
        }
        if let Some(order) = order {
            self.order = order;
        }
        self.normalize_since(&before);
        Ok(())
    }

    /// Replaces the whole window with an authoritative host order.
    ///
    /// Tabs missing from `order` are removed, new ones are added as roots,
    /// and surviving parent links are kept where the order still allows it.
    ///
    /// # Errors
    ///
    /// Returns `TreeError::HostDesync` if `order` contains duplicates.
    pub fn rebuild(&mut self, order: Vec<TabId>) -> TreeResult<()> {
        let incoming: HashSet<TabId> = order.iter().copied().collect();
        if incoming.len() != order.len() {
            return Err(TreeError::desync(self.window, "snapshot contains duplicates"));
        }

        let before = self.snapshot();
        let gone: Vec<TabId> = self
            .order
            .iter()
            .copied()
            .filter(|id| !incoming.contains(id))
            .collect();
        for id in gone {
            if let Some(removed) = self.tabs.remove(&id) {
                for child in &removed.children {
                    if let Some(node) = self.tabs.get_mut(child) {
                        node.parent = removed.parent;
                    }
                }
                self.changes.push(DerivedEvent::TabRemoved { id });
            }
        }

        for (index, &id) in order.iter().enumerate() {
            self.tabs
                .entry(id)
                .or_insert_with(|| TabNode::new(id, index));
        }
        self.order = order;
        self.normalize_since(&before);
        Ok(())
    }

    fn check_permutation(&self, order: &[TabId]) -> TreeResult<()> {
        let unique: HashSet<TabId> = order.iter().copied().collect();
        if order.len() != self.order.len()
            || unique.len() != order.len()
            || !order.iter().all(|id| self.tabs.contains_key(id))
        {
            return Err(TreeError::desync(
                self.window,
                "new order is not a permutation of the window's tabs",
            ));
        }
        Ok(())
    }

    /// Returns true if every tab's descendants form the contiguous run
    /// directly after it, child lists agree with the flat order, and
    /// levels match the parent chain.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let mut stack: Vec<TabId> = Vec::new();
        for (index, &id) in self.order.iter().enumerate() {
            let Some(node) = self.tabs.get(&id) else {
                return false;
            };
            if node.position != index {
                return false;
            }
            match node.parent {
                Some(p) => match stack.iter().position(|&s| s == p) {
                    Some(at) => stack.truncate(at + 1),
                    None => return false,
                },
                None => stack.clear(),
            }
            if node.level as usize != stack.len() {
                return false;
            }
            stack.push(id);
        }
        self.tabs.len() == self.order.len()
            && self.tabs.values().all(|node| {
                let mut expected: Vec<TabId> = node.children.clone();
                expected.sort_by_key(|c| self.tabs.get(c).map_or(usize::MAX, |t| t.position));
                expected == node.children
                    && node
                        .children
                        .iter()
                        .all(|c| self.tabs.get(c).and_then(|t| t.parent) == Some(node.id))
            })
    }

    /// Captures parent, level and visibility for change detection.
    pub(crate) fn snapshot(&self) -> Snapshot {
        self.tabs
            .iter()
            .map(|(&id, t)| (id, (t.parent, t.level, t.visible)))
            .collect()
    }

    /// Re-derives the hierarchy from the flat order.
    pub(crate) fn normalize(&mut self) {
        let before = self.snapshot();
        self.normalize_since(&before);
    }

    /// Re-derives the hierarchy and records changes relative to `before`.
    ///
    /// Walks the flat order keeping the chain of open ancestors. A tab whose
    /// parent is on that chain keeps it. Any other tab joins the sibling
    /// group of the next tab outside its own subtree, or becomes a root.
    /// The result is always a tree-sorted forest.
    pub(crate) fn normalize_since(&mut self, before: &Snapshot) {
        let links: HashMap<TabId, Option<TabId>> =
            self.tabs.iter().map(|(&id, t)| (id, t.parent)).collect();

        let mut stack: Vec<TabId> = Vec::with_capacity(8);
        let mut parents: Vec<Option<TabId>> = Vec::with_capacity(self.order.len());
        for (index, &id) in self.order.iter().enumerate() {
            let parent = match links.get(&id).copied().flatten() {
                Some(p) if stack.contains(&p) => Some(p),
                _ => self.adopt_parent(index, &stack, &links),
            };
            match parent.and_then(|p| stack.iter().position(|&s| s == p)) {
                Some(at) => stack.truncate(at + 1),
                None => stack.clear(),
            }
            parents.push(parent);
            stack.push(id);
        }

        for node in self.tabs.values_mut() {
            node.children.clear();
        }
        for (index, &id) in self.order.iter().enumerate() {
            let parent = parents[index];
            let (level, visible) = match parent.and_then(|p| self.tabs.get(&p)) {
                Some(p) => (p.level + 1, p.visible && !p.subtree_collapsed),
                None => (0, true),
            };
            if let Some(pnode) = parent.and_then(|p| self.tabs.get_mut(&p)) {
                pnode.children.push(id);
            }
            if let Some(node) = self.tabs.get_mut(&id) {
                node.parent = parent;
                node.level = level;
                node.visible = visible;
                node.position = index;
            }
        }

        for &id in &self.order {
            let (Some(node), Some(&(old_parent, old_level, old_visible))) =
                (self.tabs.get(&id), before.get(&id))
            else {
                continue;
            };
            if node.parent != old_parent {
                self.changes.push(DerivedEvent::ParentChanged {
                    id,
                    parent: node.parent,
                });
            }
            if node.level != old_level {
                self.changes.push(DerivedEvent::LevelChanged {
                    id,
                    level: node.level,
                });
            }
            if node.visible != old_visible {
                self.changes.push(DerivedEvent::VisibilityChanged {
                    id,
                    visible: node.visible,
                });
            }
        }
    }

    /// Picks a parent for the tab at `index` whose own parent link is not
    /// usable at that position.
    fn adopt_parent(
        &self,
        index: usize,
        stack: &[TabId],
        links: &HashMap<TabId, Option<TabId>>,
    ) -> Option<TabId> {
        let id = self.order[index];
        let parent_of = |t: TabId| links.get(&t).copied().flatten();
        let inside = |mut t: TabId| {
            // bounded walk: relinks are not validated for cycles here
            for _ in 0..=links.len() {
                match parent_of(t) {
                    Some(p) if p == id => return true,
                    Some(p) => t = p,
                    None => return false,
                }
            }
            false
        };

        let next = self.order[index + 1..].iter().copied().find(|&n| !inside(n))?;
        parent_of(next).filter(|q| stack.contains(q))
    }
}
