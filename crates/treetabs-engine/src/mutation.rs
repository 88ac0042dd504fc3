//! Structural mutations and move reconciliation.
//!
//! The [`MutationEngine`] applies attach, detach and group moves to a
//! [`TreeStore`] and tells the host how to reorder its flat list. Moves it
//! issues carry a [`MoveMarker`]; when the host reports them back, the
//! engine recognises them as already applied. Every other host move is
//! external and gets mirrored by the caller.
//!
//! All validation runs before the store is touched, so a rejected request
//! leaves the tree exactly as it was.

use std::collections::{HashSet, VecDeque};
use std::time::Duration;

use tokio::time::Instant;
use treetabs_core::{
    HostCommand, IdRegistry, MoveMarker, TabId, TreeError, TreeResult, TreeStore, WindowId,
};

/// Outcome of matching a host `Moved` event against issued moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOrigin {
    /// Confirmation of a move this engine issued; already applied.
    Internal(MoveMarker),
    /// A move made by someone else; must be mirrored.
    External,
}

/// An issued move waiting for its confirmations.
#[derive(Debug, Clone)]
struct PendingMove {
    marker: MoveMarker,
    /// Tabs of the group with the index each should end up at.
    expected: Vec<(TabId, usize)>,
    issued: Instant,
}

/// Applies structural mutations for one window.
#[derive(Debug)]
pub struct MutationEngine {
    window: WindowId,
    pending: VecDeque<PendingMove>,
    next_marker: u64,
    ttl: Duration,
    outbox: Vec<HostCommand>,
}

impl MutationEngine {
    /// Creates an engine whose markers expire after `ttl`.
    #[must_use]
    pub fn new(window: WindowId, ttl: Duration) -> Self {
        MutationEngine {
            window,
            pending: VecDeque::new(),
            next_marker: 1,
            ttl,
            outbox: Vec::new(),
        }
    }

    /// Makes `tab` the last child of `parent`, or a root when `parent` is
    /// `None`.
    ///
    /// The subtree of `tab` moves as one block: after `parent`'s existing
    /// subtree, or for a detach, after the subtree of the tree it leaves.
    ///
    /// # Errors
    ///
    /// - `TreeError::UnknownTab` if either tab is missing
    /// - `TreeError::CycleViolation` if `parent` is `tab` or below it
    pub fn attach_to(
        &mut self,
        store: &mut TreeStore,
        registry: &IdRegistry,
        tab: TabId,
        parent: Option<TabId>,
    ) -> TreeResult<()> {
        let current = store.get(tab).ok_or(TreeError::UnknownTab(tab))?.parent();
        if let Some(p) = parent {
            if !store.contains(p) {
                return Err(TreeError::UnknownTab(p));
            }
            if p == tab || store.is_descendant_of(p, tab) {
                return Err(TreeError::CycleViolation { tab, parent: p });
            }
        }

        let anchor = match parent {
            Some(p) => p,
            None => match (current, store.root_of(tab)) {
                (Some(_), Some(root)) => root,
                _ => {
                    tracing::debug!(tab, "detach of a root tab ignored");
                    return Ok(());
                }
            },
        };

        let group = store.subtree(tab);
        let order = place_after_subtree(store, &group, anchor);
        let before = store.order().to_vec();
        store.commit(&[(tab, parent)], Some(order))?;
        tracing::debug!(window = self.window, tab, ?parent, "attached");

        self.issue_move(store, registry, &group, &before);
        self.outbox.push(HostCommand::ParentHint {
            window: self.window,
            id: registry.host_id(tab),
            parent: parent.map(|p| registry.host_id(p)),
        });
        Ok(())
    }

    /// Promotes `tab` to a root.
    ///
    /// # Errors
    ///
    /// Returns `TreeError::UnknownTab` if the tab is missing.
    pub fn detach(
        &mut self,
        store: &mut TreeStore,
        registry: &IdRegistry,
        tab: TabId,
    ) -> TreeResult<()> {
        self.attach_to(store, registry, tab, None)
    }

    /// Moves `tabs`, in the given order, directly before `anchor`.
    ///
    /// Parent links are not touched; the hierarchy is re-derived from the
    /// new flat order.
    ///
    /// # Errors
    ///
    /// - `TreeError::InvalidMove` for an empty or duplicated group, or an
    ///   anchor inside the group
    /// - `TreeError::UnknownTab` if any tab is missing
    pub fn move_before(
        &mut self,
        store: &mut TreeStore,
        registry: &IdRegistry,
        tabs: &[TabId],
        anchor: TabId,
    ) -> TreeResult<()> {
        self.move_relative(store, registry, tabs, anchor, false)
    }

    /// Moves `tabs`, in the given order, directly after `anchor`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::move_before`].
    pub fn move_after(
        &mut self,
        store: &mut TreeStore,
        registry: &IdRegistry,
        tabs: &[TabId],
        anchor: TabId,
    ) -> TreeResult<()> {
        self.move_relative(store, registry, tabs, anchor, true)
    }

    fn move_relative(
        &mut self,
        store: &mut TreeStore,
        registry: &IdRegistry,
        tabs: &[TabId],
        anchor: TabId,
        after: bool,
    ) -> TreeResult<()> {
        validate_group(store, tabs, anchor)?;

        let moving: HashSet<TabId> = tabs.iter().copied().collect();
        let mut order: Vec<TabId> = store
            .order()
            .iter()
            .copied()
            .filter(|id| !moving.contains(id))
            .collect();
        let at = order
            .iter()
            .position(|&id| id == anchor)
            .map_or(order.len(), |i| if after { i + 1 } else { i });
        order.splice(at..at, tabs.iter().copied());

        let before = store.order().to_vec();
        store.commit(&[], Some(order))?;
        self.issue_move(store, registry, tabs, &before);
        Ok(())
    }

    /// Sends `MoveTabs` for `group` if the flat order changed.
    fn issue_move(
        &mut self,
        store: &TreeStore,
        registry: &IdRegistry,
        group: &[TabId],
        before: &[TabId],
    ) {
        if store.order() == before {
            return;
        }
        let expected: Vec<(TabId, usize)> = group
            .iter()
            .filter_map(|&id| store.position(id).map(|at| (id, at)))
            .collect();
        let Some(&(_, to_index)) = expected.first() else {
            return;
        };

        let marker = MoveMarker(self.next_marker);
        self.next_marker += 1;
        self.pending.push_back(PendingMove {
            marker,
            expected,
            issued: Instant::now(),
        });
        self.outbox.push(HostCommand::MoveTabs {
            window: self.window,
            marker,
            ids: group.iter().map(|&id| registry.host_id(id)).collect(),
            to_index,
        });
    }

    /// Classifies a host `Moved` event for `id` landing at `to_index`.
    ///
    /// A confirmation matches when it names a pending move (by marker, or
    /// by tab if the host does not echo markers) and lands where that move
    /// put the tab. A match, or a mismatch for a tab of a pending move,
    /// consumes that tab's entry.
    pub fn observe_moved(
        &mut self,
        id: TabId,
        to_index: usize,
        marker: Option<MoveMarker>,
    ) -> MoveOrigin {
        self.prune_expired();

        let slot = match marker {
            Some(m) => self.pending.iter().position(|p| p.marker == m),
            None => self
                .pending
                .iter()
                .position(|p| p.expected.iter().any(|&(t, _)| t == id)),
        };
        let Some(slot) = slot else {
            return MoveOrigin::External;
        };
        let pending = &mut self.pending[slot];
        let Some(at) = pending.expected.iter().position(|&(t, _)| t == id) else {
            return MoveOrigin::External;
        };

        let (_, expected) = pending.expected.remove(at);
        let marker = pending.marker;
        if pending.expected.is_empty() {
            self.pending.remove(slot);
        }

        if expected == to_index {
            MoveOrigin::Internal(marker)
        } else {
            tracing::debug!(
                window = self.window,
                tab = id,
                expected,
                to_index,
                "confirmation does not match local order"
            );
            MoveOrigin::External
        }
    }

    /// Drops issued moves whose confirmations never arrived.
    fn prune_expired(&mut self) {
        let ttl = self.ttl;
        let before = self.pending.len();
        self.pending.retain(|p| p.issued.elapsed() <= ttl);
        let dropped = before - self.pending.len();
        if dropped > 0 {
            tracing::debug!(window = self.window, dropped, "expired move markers");
        }
    }

    /// Forgets pending confirmations for a tab that is gone.
    pub fn forget_tab(&mut self, id: TabId) {
        for pending in &mut self.pending {
            pending.expected.retain(|&(t, _)| t != id);
        }
        self.pending.retain(|p| !p.expected.is_empty());
    }

    /// Forgets every pending confirmation, as after a full resync.
    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Number of issued moves still waiting for confirmation.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Drains the commands produced since the last call.
    pub fn take_commands(&mut self) -> Vec<HostCommand> {
        std::mem::take(&mut self.outbox)
    }
}

/// Flat order with `group` moved to just after `anchor`'s subtree.
fn place_after_subtree(store: &TreeStore, group: &[TabId], anchor: TabId) -> Vec<TabId> {
    let moving: HashSet<TabId> = group.iter().copied().collect();
    let mut order: Vec<TabId> = store
        .order()
        .iter()
        .copied()
        .filter(|id| !moving.contains(id))
        .collect();
    let last = store
        .subtree(anchor)
        .into_iter()
        .filter(|id| !moving.contains(id))
        .last()
        .unwrap_or(anchor);
    let at = order
        .iter()
        .position(|&id| id == last)
        .map_or(order.len(), |i| i + 1);
    order.splice(at..at, group.iter().copied());
    order
}

fn validate_group(store: &TreeStore, tabs: &[TabId], anchor: TabId) -> TreeResult<()> {
    if tabs.is_empty() {
        return Err(TreeError::InvalidMove("empty tab group".into()));
    }
    let mut seen = HashSet::with_capacity(tabs.len());
    for &id in tabs {
        if !store.contains(id) {
            return Err(TreeError::UnknownTab(id));
        }
        if !seen.insert(id) {
            return Err(TreeError::InvalidMove(format!("tab {id} listed twice")));
        }
    }
    if !store.contains(anchor) {
        return Err(TreeError::UnknownTab(anchor));
    }
    if seen.contains(&anchor) {
        return Err(TreeError::InvalidMove(format!(
            "anchor {anchor} is part of the moved group"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// A(1) -> [B(2) -> [D(4)], C(3)], E(5)
    fn sample() -> TreeStore {
        let mut store = TreeStore::new(1);
        store.insert(1, 0, None).unwrap();
        store.insert(2, 1, Some(1)).unwrap();
        store.insert(4, 2, Some(2)).unwrap();
        store.insert(3, 3, Some(1)).unwrap();
        store.insert(5, 4, None).unwrap();
        store.take_changes();
        store
    }

    fn engine() -> MutationEngine {
        MutationEngine::new(1, Duration::from_secs(2))
    }

    fn parents(store: &TreeStore) -> Vec<Option<TabId>> {
        store.iter().map(|t| t.parent()).collect()
    }

    // ==================== Attach Tests ====================

    #[test]
    fn test_attach_moves_subtree_after_new_parent() {
        let mut store = sample();
        let mut engine = engine();
        let registry = IdRegistry::new();

        // B (with D) under E
        engine.attach_to(&mut store, &registry, 2, Some(5)).unwrap();
        assert_eq!(store.order(), &[1, 3, 5, 2, 4]);
        assert_eq!(store.parent_of(2), Some(5));
        assert_eq!(store.get(2).unwrap().level(), 1);
        assert_eq!(store.get(4).unwrap().level(), 2);
        assert!(store.is_consistent());

        let commands = engine.take_commands();
        assert_eq!(
            commands[0],
            HostCommand::MoveTabs {
                window: 1,
                marker: MoveMarker(1),
                ids: vec![2, 4],
                to_index: 3,
            }
        );
        assert_eq!(
            commands[1],
            HostCommand::ParentHint {
                window: 1,
                id: 2,
                parent: Some(5)
            }
        );
    }

    #[test]
    fn test_attach_becomes_last_child() {
        let mut store = sample();
        let mut engine = engine();
        let registry = IdRegistry::new();

        // E under A lands after C
        engine.attach_to(&mut store, &registry, 5, Some(1)).unwrap();
        assert_eq!(store.get(1).unwrap().children(), &[2, 3, 5]);
        assert!(store.is_consistent());
    }

    #[test]
    fn test_attach_in_place_sends_only_hint() {
        let mut store = sample();
        let mut engine = engine();
        let registry = IdRegistry::new();

        // C under B: already right after B's subtree
        engine.attach_to(&mut store, &registry, 3, Some(2)).unwrap();
        assert_eq!(store.order(), &[1, 2, 4, 3, 5]);
        assert_eq!(store.parent_of(3), Some(2));
        assert_eq!(store.get(3).unwrap().level(), 2);

        let commands = engine.take_commands();
        assert_eq!(commands.len(), 1);
        assert!(matches!(commands[0], HostCommand::ParentHint { .. }));
        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn test_attach_under_descendant_is_rejected() {
        let mut store = sample();
        let mut engine = engine();
        let registry = IdRegistry::new();
        let order = store.order().to_vec();
        let links = parents(&store);

        let result = engine.attach_to(&mut store, &registry, 1, Some(4));
        assert!(matches!(
            result,
            Err(TreeError::CycleViolation { tab: 1, parent: 4 })
        ));
        let result = engine.attach_to(&mut store, &registry, 2, Some(2));
        assert!(matches!(result, Err(TreeError::CycleViolation { .. })));

        assert_eq!(store.order(), &order[..]);
        assert_eq!(parents(&store), links);
        assert!(engine.take_commands().is_empty());
    }

    #[test]
    fn test_attach_unknown() {
        let mut store = sample();
        let mut engine = engine();
        let registry = IdRegistry::new();
        assert!(matches!(
            engine.attach_to(&mut store, &registry, 9, Some(1)),
            Err(TreeError::UnknownTab(9))
        ));
        assert!(matches!(
            engine.attach_to(&mut store, &registry, 1, Some(9)),
            Err(TreeError::UnknownTab(9))
        ));
    }

    // ==================== Detach Tests ====================

    #[test]
    fn test_detach_stays_next_to_old_tree() {
        let mut store = sample();
        let mut engine = engine();
        let registry = IdRegistry::new();

        engine.detach(&mut store, &registry, 2).unwrap();
        // B and D leave A's tree but stay before E
        assert_eq!(store.order(), &[1, 3, 2, 4, 5]);
        assert!(store.get(2).unwrap().is_root());
        assert_eq!(store.parent_of(4), Some(2));
        assert_eq!(store.get(4).unwrap().level(), 1);
        assert!(store.is_consistent());
    }

    #[test]
    fn test_detach_root_is_noop() {
        let mut store = sample();
        let mut engine = engine();
        let registry = IdRegistry::new();
        engine.detach(&mut store, &registry, 5).unwrap();
        assert_eq!(store.order(), &[1, 2, 4, 3, 5]);
        assert!(engine.take_commands().is_empty());
    }

    // ==================== Group Move Tests ====================

    #[test]
    fn test_move_before() {
        let mut store = sample();
        let mut engine = engine();
        let registry = IdRegistry::new();

        engine.move_before(&mut store, &registry, &[5], 1).unwrap();
        assert_eq!(store.order(), &[5, 1, 2, 4, 3]);
        assert!(store.get(5).unwrap().is_root());
        assert!(store.is_consistent());
    }

    #[test]
    fn test_move_after_keeps_group_order() {
        let mut store = sample();
        let mut engine = engine();
        let registry = IdRegistry::new();

        engine.move_after(&mut store, &registry, &[3, 1], 5).unwrap();
        assert_eq!(store.order(), &[2, 4, 5, 3, 1]);
        assert!(store.is_consistent());
    }

    #[test]
    fn test_move_rejects_bad_groups() {
        let mut store = sample();
        let mut engine = engine();
        let registry = IdRegistry::new();

        assert!(matches!(
            engine.move_before(&mut store, &registry, &[], 1),
            Err(TreeError::InvalidMove(_))
        ));
        assert!(matches!(
            engine.move_before(&mut store, &registry, &[2, 2], 1),
            Err(TreeError::InvalidMove(_))
        ));
        assert!(matches!(
            engine.move_after(&mut store, &registry, &[2, 4], 4),
            Err(TreeError::InvalidMove(_))
        ));
        assert!(matches!(
            engine.move_after(&mut store, &registry, &[2], 42),
            Err(TreeError::UnknownTab(42))
        ));
        assert_eq!(store.order(), &[1, 2, 4, 3, 5]);
    }

    #[test]
    fn test_move_uses_host_ids() {
        let mut store = sample();
        let mut engine = engine();
        let mut registry = IdRegistry::new();
        registry.register_mapping(5, 50);

        engine.move_before(&mut store, &registry, &[5], 1).unwrap();
        let commands = engine.take_commands();
        assert!(matches!(
            &commands[0],
            HostCommand::MoveTabs { ids, to_index: 0, .. } if ids == &vec![50]
        ));
    }

    // ==================== Confirmation Tests ====================

    #[test]
    fn test_confirmation_is_internal_once() {
        let mut store = sample();
        let mut engine = engine();
        let registry = IdRegistry::new();
        engine.move_before(&mut store, &registry, &[5], 1).unwrap();

        let marker = MoveMarker(1);
        assert_eq!(
            engine.observe_moved(5, 0, Some(marker)),
            MoveOrigin::Internal(marker)
        );
        assert_eq!(engine.pending_count(), 0);
        // a second report of the same move is someone else's
        assert_eq!(
            engine.observe_moved(5, 0, Some(marker)),
            MoveOrigin::External
        );
    }

    #[test]
    fn test_confirmation_without_marker_matches_by_tab() {
        let mut store = sample();
        let mut engine = engine();
        let registry = IdRegistry::new();
        engine.attach_to(&mut store, &registry, 2, Some(5)).unwrap();

        assert!(matches!(
            engine.observe_moved(2, 3, None),
            MoveOrigin::Internal(_)
        ));
        assert_eq!(engine.pending_count(), 1);
        assert!(matches!(
            engine.observe_moved(4, 4, None),
            MoveOrigin::Internal(_)
        ));
        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn test_mismatched_confirmation_is_external() {
        let mut store = sample();
        let mut engine = engine();
        let registry = IdRegistry::new();
        engine.move_before(&mut store, &registry, &[5], 1).unwrap();

        assert_eq!(
            engine.observe_moved(5, 2, Some(MoveMarker(1))),
            MoveOrigin::External
        );
        assert_eq!(engine.pending_count(), 0);
    }

    #[test]
    fn test_unrelated_move_is_external() {
        let store = sample();
        let mut engine = engine();
        assert_eq!(
            engine.observe_moved(3, 0, None),
            MoveOrigin::External
        );
    }

    #[test]
    fn test_forget_tab_drops_empty_moves() {
        let mut store = sample();
        let mut engine = engine();
        let registry = IdRegistry::new();
        engine.move_before(&mut store, &registry, &[5], 1).unwrap();
        engine.forget_tab(5);
        assert_eq!(engine.pending_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_markers_expire() {
        let mut store = sample();
        let mut engine = MutationEngine::new(1, Duration::from_millis(100));
        let registry = IdRegistry::new();
        engine.move_before(&mut store, &registry, &[5], 1).unwrap();

        tokio::time::advance(Duration::from_millis(150)).await;
        assert_eq!(
            engine.observe_moved(5, 0, Some(MoveMarker(1))),
            MoveOrigin::External
        );
        assert_eq!(engine.pending_count(), 0);
    }

    // ==================== Invariant Tests ====================

    #[derive(Debug, Clone)]
    enum Op {
        Attach(usize, usize),
        Detach(usize),
        Before(usize, usize),
        After(usize, usize),
        Remove(usize),
        Insert(usize, Option<usize>),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0..16usize, 0..16usize).prop_map(|(a, b)| Op::Attach(a, b)),
            (0..16usize).prop_map(Op::Detach),
            (0..16usize, 0..16usize).prop_map(|(a, b)| Op::Before(a, b)),
            (0..16usize, 0..16usize).prop_map(|(a, b)| Op::After(a, b)),
            (0..16usize).prop_map(Op::Remove),
            (0..16usize, proptest::option::of(0..16usize)).prop_map(|(i, p)| Op::Insert(i, p)),
        ]
    }

    proptest! {
        #[test]
        fn prop_mutations_keep_tree_sorted(ops in proptest::collection::vec(op(), 1..40)) {
            let mut store = TreeStore::from_order(1, (0..8).collect()).unwrap();
            let mut engine = engine();
            let registry = IdRegistry::new();
            let mut next_id: TabId = 100;

            for op in ops {
                let order = store.order().to_vec();
                if order.is_empty() {
                    store.insert(next_id, 0, None).unwrap();
                    next_id += 1;
                    continue;
                }
                let pick = |i: usize| order[i % order.len()];
                match op {
                    Op::Attach(a, b) => {
                        let (tab, parent) = (pick(a), pick(b));
                        let cyclic = tab == parent || store.is_descendant_of(parent, tab);
                        let links = parents(&store);
                        let result = engine.attach_to(&mut store, &registry, tab, Some(parent));
                        if cyclic {
                            let rejected = matches!(result, Err(TreeError::CycleViolation { .. }));
                            prop_assert!(rejected);
                            prop_assert_eq!(store.order(), &order[..]);
                            prop_assert_eq!(parents(&store), links);
                        } else {
                            prop_assert!(result.is_ok());
                            prop_assert_eq!(store.parent_of(tab), Some(parent));
                        }
                    }
                    Op::Detach(a) => {
                        let tab = pick(a);
                        engine.detach(&mut store, &registry, tab).unwrap();
                        prop_assert!(store.get(tab).unwrap().is_root());
                    }
                    Op::Before(a, b) => {
                        let _ = engine.move_before(&mut store, &registry, &[pick(a)], pick(b));
                    }
                    Op::After(a, b) => {
                        let _ = engine.move_after(&mut store, &registry, &[pick(a)], pick(b));
                    }
                    Op::Remove(a) => {
                        store.remove(pick(a)).unwrap();
                    }
                    Op::Insert(i, p) => {
                        let index = i % (order.len() + 1);
                        store.insert(next_id, index, p.map(pick)).unwrap();
                        next_id += 1;
                    }
                }
                prop_assert!(store.is_consistent());
            }
        }
    }
}
