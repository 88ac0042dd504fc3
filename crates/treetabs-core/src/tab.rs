//! Tab entity and identifier types.
//!
//! A [`TabNode`] is one entry in both the host's flat tab order and the
//! tree hierarchy layered on top of it. Hierarchy fields are only written by
//! the tree store; everything else reads them through the accessors.

/// Unique identifier for a tab inside a tree store.
///
/// For tabs reported by the host this is the host identifier itself;
/// locally created tabs get a provisional value until the host confirms
/// a real one (see [`crate::ids::IdRegistry`]).
pub type TabId = u32;

/// Identifier assigned to a tab by the tab host.
pub type HostTabId = u32;

/// Identifier of a host window. One tree store exists per window.
pub type WindowId = u32;

/// One tab in the tree.
///
/// `level` and `visible` are derived data: the store recomputes them after
/// every structural change, they are never set by hand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabNode {
    pub(crate) id: TabId,
    pub(crate) parent: Option<TabId>,
    pub(crate) children: Vec<TabId>,
    pub(crate) level: u32,
    pub(crate) subtree_collapsed: bool,
    pub(crate) visible: bool,
    pub(crate) position: usize,
}

impl TabNode {
    pub(crate) fn new(id: TabId, position: usize) -> Self {
        TabNode {
            id,
            parent: None,
            children: Vec::new(),
            level: 0,
            subtree_collapsed: false,
            visible: true,
            position,
        }
    }

    /// Returns the tab identifier.
    #[must_use]
    pub fn id(&self) -> TabId {
        self.id
    }

    /// Returns the parent tab, or `None` for a root tab.
    #[must_use]
    pub fn parent(&self) -> Option<TabId> {
        self.parent
    }

    /// Returns the children in display order.
    #[must_use]
    pub fn children(&self) -> &[TabId] {
        &self.children
    }

    /// Returns true if the tab has at least one child.
    #[must_use]
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Nesting level, 0 for roots.
    #[must_use]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Returns true if the tab hides its descendants.
    #[must_use]
    pub fn is_subtree_collapsed(&self) -> bool {
        self.subtree_collapsed
    }

    /// Returns false when some ancestor has its subtree collapsed.
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Index of the tab in the host's flat order.
    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    /// Returns true for tabs without a parent.
    #[must_use]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}
