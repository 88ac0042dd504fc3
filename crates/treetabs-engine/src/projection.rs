//! Typed projection of a window for the rendering layer.

use serde::Serialize;
use treetabs_core::{CounterRole, IndentCalculator, TabId, TreeStore};

/// What the close button of a tab closes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseTarget {
    /// Only the tab itself.
    Tab,
    /// The tab and every descendant, hidden behind a collapsed subtree.
    Tree,
}

/// One tab row, in flat order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TabRow {
    pub id: TabId,
    pub parent: Option<TabId>,
    pub level: u32,
    /// Level after the configured depth cap.
    pub display_level: u32,
    pub indent_px: u32,
    pub visible: bool,
    pub collapsed: bool,
    pub has_children: bool,
    pub counter: usize,
    pub close_target: CloseTarget,
    pub active: bool,
}

/// Close target of `id`, or `None` for unknown tabs.
#[must_use]
pub fn close_target(store: &TreeStore, id: TabId) -> Option<CloseTarget> {
    let node = store.get(id)?;
    if node.is_subtree_collapsed() && node.has_children() {
        Some(CloseTarget::Tree)
    } else {
        Some(CloseTarget::Tab)
    }
}

/// Value of the per-tab counter.
#[must_use]
pub fn counter(store: &TreeStore, id: TabId, role: CounterRole) -> usize {
    let descendants = store.descendant_count(id);
    match role {
        CounterRole::ContainedTabs => descendants,
        CounterRole::AllTabs => descendants + 1,
    }
}

/// Builds one row per tab in flat order.
#[must_use]
pub fn project(
    store: &TreeStore,
    indent: &IndentCalculator,
    role: CounterRole,
    active: Option<TabId>,
) -> Vec<TabRow> {
    let base = indent.config().base_indent;
    store
        .iter()
        .map(|node| {
            let id = node.id();
            let display_level = indent.display_level(node.level());
            let indent_px = match indent.map() {
                Some(map) => map.indent_for(display_level),
                None => display_level * base,
            };
            TabRow {
                id,
                parent: node.parent(),
                level: node.level(),
                display_level,
                indent_px,
                visible: node.is_visible(),
                collapsed: node.is_subtree_collapsed(),
                has_children: node.has_children(),
                counter: counter(store, id, role),
                close_target: close_target(store, id).unwrap_or(CloseTarget::Tab),
                active: active == Some(id),
            }
        })
        .collect()
}
