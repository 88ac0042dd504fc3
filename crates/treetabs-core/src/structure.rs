//! Tree structure export and import.
//!
//! A structure is one entry per tab in flat order, naming the parent by its
//! index. It carries a tree across a window that was enumerated afresh,
//! where host ids are new but the order is the same.

use serde::{Deserialize, Serialize};

use crate::error::TreeResult;
use crate::event::DerivedEvent;
use crate::store::TreeStore;
use crate::tab::TabId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StructureEntry {
    /// Index of the parent entry; always before this entry.
    #[serde(default)]
    pub parent: Option<usize>,
    #[serde(default)]
    pub collapsed: bool,
}

/// Parses a JSON array of structure entries.
///
/// # Errors
///
/// Returns `TreeError::Structure` if the input is not valid JSON.
pub fn parse_structure(json: &str) -> TreeResult<Vec<StructureEntry>> {
    Ok(serde_json::from_str(json)?)
}

impl TreeStore {
    /// Describes the current tree by flat index.
    #[must_use]
    pub fn export_structure(&self) -> Vec<StructureEntry> {
        self.iter()
            .map(|tab| StructureEntry {
                parent: tab.parent().and_then(|p| self.position(p)),
                collapsed: tab.is_subtree_collapsed(),
            })
            .collect()
    }

    /// Applies `entries` to the tabs at the same flat indices.
    ///
    /// Entries past the end of the window are ignored, as are parents that
    /// do not precede their entry. Tabs without an entry become roots.
    ///
    /// # Errors
    ///
    /// Propagates errors from the underlying commit; the store is untouched
    /// in that case.
    pub fn apply_structure(&mut self, entries: &[StructureEntry]) -> TreeResult<()> {
        let order: Vec<TabId> = self.order().to_vec();
        let relinks: Vec<(TabId, Option<TabId>)> = order
            .iter()
            .enumerate()
            .map(|(index, &id)| {
                let parent = entries
                    .get(index)
                    .and_then(|e| e.parent)
                    .filter(|&p| {
                        let valid = p < index;
                        if !valid {
                            tracing::debug!(index, parent = p, "ignoring forward parent reference");
                        }
                        valid
                    })
                    .map(|p| order[p]);
                (id, parent)
            })
            .collect();
        self.commit(&relinks, None)?;

        let mut changed = false;
        for (index, &id) in order.iter().enumerate() {
            let collapsed = entries.get(index).is_some_and(|e| e.collapsed);
            let Some(node) = self.tab_mut(id) else {
                continue;
            };
            let collapsed = collapsed && node.has_children();
            if node.subtree_collapsed != collapsed {
                node.subtree_collapsed = collapsed;
                self.push_change(DerivedEvent::CollapseChanged { id, collapsed });
                changed = true;
            }
        }
        if changed {
            self.refresh_visibility();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TreeError;

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

    #[test]
    fn test_export() {
        let mut store = sample();
        store.set_subtree_collapsed(2, true);
        let entries = store.export_structure();
        let parents: Vec<Option<usize>> = entries.iter().map(|e| e.parent).collect();
        assert_eq!(parents, vec![None, Some(0), Some(1), Some(0), None]);
        assert!(entries[1].collapsed);
        assert!(!entries[0].collapsed);
    }

    #[test]
    fn test_apply_to_fresh_window() {
        let mut source = sample();
        source.set_subtree_collapsed(2, true);
        let entries = source.export_structure();

        let mut fresh = TreeStore::from_order(2, vec![10, 20, 40, 30, 50]).unwrap();
        fresh.apply_structure(&entries).unwrap();

        assert_eq!(fresh.get(10).unwrap().children(), &[20, 30]);
        assert_eq!(fresh.parent_of(40), Some(20));
        assert!(fresh.get(20).unwrap().is_subtree_collapsed());
        assert!(!fresh.get(40).unwrap().is_visible());
        assert!(fresh.get(50).unwrap().is_root());
        assert!(fresh.is_consistent());
    }

    #[test]
    fn test_apply_ignores_forward_reference_and_short_input() {
        let mut store = TreeStore::from_order(1, vec![1, 2, 3]).unwrap();
        let entries = [
            StructureEntry {
                parent: Some(2),
                collapsed: true,
            },
            StructureEntry {
                parent: Some(0),
                collapsed: false,
            },
        ];
        store.apply_structure(&entries).unwrap();

        assert!(store.get(1).unwrap().is_root());
        assert_eq!(store.parent_of(2), Some(1));
        assert!(store.get(3).unwrap().is_root());
        // collapsed flag lands because tab 1 now has a child
        assert!(store.get(1).unwrap().is_subtree_collapsed());
        assert!(!store.get(2).unwrap().is_visible());
    }

    #[test]
    fn test_collapsed_leaf_is_dropped() {
        let mut store = TreeStore::from_order(1, vec![1, 2]).unwrap();
        let entries = [StructureEntry::default(), StructureEntry {
            parent: None,
            collapsed: true,
        }];
        store.apply_structure(&entries).unwrap();
        assert!(!store.get(2).unwrap().is_subtree_collapsed());
    }

    #[test]
    fn test_parse_structure() {
        let entries =
            parse_structure(r#"[{"parent":null,"collapsed":true},{"parent":0}]"#).expect("parse");
        assert_eq!(entries.len(), 2);
        assert!(entries[0].collapsed);
        assert_eq!(entries[1].parent, Some(0));

        let bad = parse_structure("[{");
        assert!(matches!(bad, Err(TreeError::Structure(_))));
    }
}
