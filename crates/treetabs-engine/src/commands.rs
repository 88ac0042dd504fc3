//! Keyboard and menu commands.
//!
//! Every command acts on the active tab. Navigation commands only pick a
//! new tab to select; move commands go through the [`MutationEngine`] and
//! always carry the tab's whole subtree.

use treetabs_core::{IdRegistry, TabId, TreeCommand, TreeResult, TreeStore};

use crate::mutation::MutationEngine;

/// Result of running a [`TreeCommand`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    /// Nothing to do at this position.
    Unchanged,
    /// The given tab should be selected.
    Select(TabId),
    /// The tree structure changed.
    Restructured,
    /// Collapse flags changed on this many tabs.
    Collapsed(usize),
}

/// Runs `command` against `active`.
///
/// # Errors
///
/// Propagates mutation errors; the store is unchanged in that case.
pub fn execute(
    command: TreeCommand,
    active: TabId,
    store: &mut TreeStore,
    registry: &IdRegistry,
    engine: &mut MutationEngine,
) -> TreeResult<CommandOutcome> {
    let select = |target: Option<TabId>| -> TreeResult<CommandOutcome> {
        Ok(target.map_or(CommandOutcome::Unchanged, CommandOutcome::Select))
    };

    match command {
        TreeCommand::GoPrev => select(store.previous_sibling(active)),
        TreeCommand::GoNext => select(store.next_sibling(active)),
        TreeCommand::GoParent => select(store.parent_of(active)),
        TreeCommand::GoChild => select(store.first_child(active)),
        TreeCommand::MovePrev => {
            let Some(previous) = store.previous_sibling(active) else {
                return Ok(CommandOutcome::Unchanged);
            };
            let group = store.subtree(active);
            engine.move_before(store, registry, &group, previous)?;
            Ok(CommandOutcome::Restructured)
        }
        TreeCommand::MoveNext => {
            let Some(next) = store.next_sibling(active) else {
                return Ok(CommandOutcome::Unchanged);
            };
            let anchor = store.last_descendant(next).unwrap_or(next);
            let group = store.subtree(active);
            engine.move_after(store, registry, &group, anchor)?;
            Ok(CommandOutcome::Restructured)
        }
        TreeCommand::MoveToParent => {
            let Some(parent) = store.parent_of(active) else {
                return Ok(CommandOutcome::Unchanged);
            };
            match store.parent_of(parent) {
                Some(grandparent) => engine.attach_to(store, registry, active, Some(grandparent))?,
                None => engine.detach(store, registry, active)?,
            }
            Ok(CommandOutcome::Restructured)
        }
        TreeCommand::MoveToChild => {
            let Some(previous) = store.previous_sibling(active) else {
                return Ok(CommandOutcome::Unchanged);
            };
            engine.attach_to(store, registry, active, Some(previous))?;
            Ok(CommandOutcome::Restructured)
        }
        TreeCommand::ToggleCollapse => {
            let changed = store.toggle_subtree_collapsed(active);
            Ok(CommandOutcome::Collapsed(usize::from(changed)))
        }
        TreeCommand::CollapseAll => Ok(CommandOutcome::Collapsed(store.collapse_expand_all(true))),
        TreeCommand::ExpandAll => Ok(CommandOutcome::Collapsed(store.collapse_expand_all(false))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// A(1) -> [B(2) -> [D(4)], C(3)], E(5)
    fn sample() -> TreeStore {
        let mut store = TreeStore::new(1);
        store.insert(1, 0, None).unwrap();
        store.insert(2, 1, Some(1)).unwrap();
        store.insert(4, 2, Some(2)).unwrap();
        store.insert(3, 3, Some(1)).unwrap();
        store.insert(5, 4, None).unwrap();
        store
    }

    fn run(store: &mut TreeStore, command: TreeCommand, active: TabId) -> CommandOutcome {
        let registry = IdRegistry::new();
        let mut engine = MutationEngine::new(1, Duration::from_secs(2));
        execute(command, active, store, &registry, &mut engine).expect("command should succeed")
    }

    // ==================== Navigation Tests ====================

    #[test]
    fn test_go_commands() {
        let mut store = sample();
        assert_eq!(run(&mut store, TreeCommand::GoNext, 2), CommandOutcome::Select(3));
        assert_eq!(run(&mut store, TreeCommand::GoPrev, 3), CommandOutcome::Select(2));
        assert_eq!(run(&mut store, TreeCommand::GoParent, 4), CommandOutcome::Select(2));
        assert_eq!(run(&mut store, TreeCommand::GoChild, 1), CommandOutcome::Select(2));
        assert_eq!(run(&mut store, TreeCommand::GoNext, 1), CommandOutcome::Select(5));
    }

    #[test]
    fn test_go_at_edges_is_unchanged() {
        let mut store = sample();
        assert_eq!(run(&mut store, TreeCommand::GoPrev, 1), CommandOutcome::Unchanged);
        assert_eq!(run(&mut store, TreeCommand::GoParent, 5), CommandOutcome::Unchanged);
        assert_eq!(run(&mut store, TreeCommand::GoChild, 4), CommandOutcome::Unchanged);
    }

    // ==================== Move Tests ====================

    #[test]
    fn test_move_to_child_of_previous_sibling() {
        let mut store = TreeStore::new(1);
        store.insert(1, 0, None).unwrap();
        store.insert(2, 1, Some(1)).unwrap();
        store.insert(3, 2, Some(1)).unwrap();

        let outcome = run(&mut store, TreeCommand::MoveToChild, 3);
        assert_eq!(outcome, CommandOutcome::Restructured);
        assert_eq!(store.parent_of(3), Some(2));
        assert_eq!(store.get(3).unwrap().level(), 2);
        assert_eq!(store.order(), &[1, 2, 3]);
    }

    #[test]
    fn test_move_to_child_without_previous_sibling() {
        let mut store = sample();
        assert_eq!(run(&mut store, TreeCommand::MoveToChild, 2), CommandOutcome::Unchanged);
    }

    #[test]
    fn test_move_to_parent() {
        let mut store = sample();
        // D goes to A, after C
        run(&mut store, TreeCommand::MoveToParent, 4);
        assert_eq!(store.parent_of(4), Some(1));
        assert_eq!(store.order(), &[1, 2, 3, 4, 5]);

        // C's parent is a root: detach
        run(&mut store, TreeCommand::MoveToParent, 3);
        assert!(store.get(3).unwrap().is_root());
        assert!(store.is_consistent());

        assert_eq!(run(&mut store, TreeCommand::MoveToParent, 5), CommandOutcome::Unchanged);
    }

    #[test]
    fn test_move_prev_carries_subtree() {
        let mut store = sample();
        run(&mut store, TreeCommand::MovePrev, 3);
        assert_eq!(store.order(), &[1, 3, 2, 4, 5]);
        assert_eq!(store.get(1).unwrap().children(), &[3, 2]);
        assert_eq!(store.parent_of(4), Some(2));
    }

    #[test]
    fn test_move_next_skips_sibling_subtree() {
        let mut store = sample();
        run(&mut store, TreeCommand::MoveNext, 2);
        assert_eq!(store.order(), &[1, 3, 2, 4, 5]);

        // roots: A's whole tree moves after E
        run(&mut store, TreeCommand::MoveNext, 1);
        assert_eq!(store.order(), &[5, 1, 3, 2, 4]);
        assert!(store.is_consistent());
    }

    #[test]
    fn test_move_next_at_end_is_unchanged() {
        let mut store = sample();
        assert_eq!(run(&mut store, TreeCommand::MoveNext, 3), CommandOutcome::Unchanged);
    }

    // ==================== Collapse Tests ====================

    #[test]
    fn test_collapse_commands() {
        let mut store = sample();
        assert_eq!(run(&mut store, TreeCommand::ToggleCollapse, 2), CommandOutcome::Collapsed(1));
        assert_eq!(run(&mut store, TreeCommand::ToggleCollapse, 4), CommandOutcome::Collapsed(0));
        assert_eq!(run(&mut store, TreeCommand::CollapseAll, 5), CommandOutcome::Collapsed(1));
        assert_eq!(run(&mut store, TreeCommand::ExpandAll, 5), CommandOutcome::Collapsed(2));
    }
}
