//! Event and message types for the tree engine
//!
//! Four kinds of traffic cross the engine boundary:
//!
//! - [`HostEvent`]: lifecycle notifications from the tab host
//! - [`HostCommand`]: requests the engine sends back to the host
//! - [`TreeCommand`]: keyboard/menu commands acting on the active tab
//! - [`DerivedEvent`]: derived-state changes for the rendering layer,
//!   distributed through a [`DerivedBus`]

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::error::TreeError;
use crate::indent::IndentMap;
use crate::tab::{HostTabId, TabId, WindowId};

/// Tag attached to an internally issued move so its confirmation can be
/// recognised as already applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MoveMarker(pub u64);

/// Lifecycle notifications from the tab host.
///
/// Indices are positions in the host's flat order for `window`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostEvent {
    /// A tab was opened.
    Created {
        window: WindowId,
        id: HostTabId,
        index: usize,
        /// Tab that opened this one, if the host knows it.
        #[serde(default)]
        parent: Option<HostTabId>,
    },
    /// The host assigned a real id to a tab created locally.
    CreationConfirmed {
        window: WindowId,
        provisional: TabId,
        id: HostTabId,
    },
    /// A tab moved within the window.
    Moved {
        window: WindowId,
        id: HostTabId,
        from_index: usize,
        to_index: usize,
        /// Echo of the marker when the move answers a `MoveTabs` command.
        #[serde(default)]
        marker: Option<MoveMarker>,
    },
    /// A tab arrived from another window.
    Attached {
        window: WindowId,
        id: HostTabId,
        index: usize,
        #[serde(default)]
        parent: Option<HostTabId>,
    },
    /// A tab left for another window.
    Detached { window: WindowId, id: HostTabId },
    /// A tab was closed.
    Removed { window: WindowId, id: HostTabId },
    /// A tab became the selected tab.
    Activated { window: WindowId, id: HostTabId },
    /// Authoritative flat order of the whole window.
    Snapshot {
        window: WindowId,
        tabs: Vec<HostTabId>,
    },
}

impl HostEvent {
    /// Window the event belongs to.
    #[must_use]
    pub fn window(&self) -> WindowId {
        match self {
            HostEvent::Created { window, .. }
            | HostEvent::CreationConfirmed { window, .. }
            | HostEvent::Moved { window, .. }
            | HostEvent::Attached { window, .. }
            | HostEvent::Detached { window, .. }
            | HostEvent::Removed { window, .. }
            | HostEvent::Activated { window, .. }
            | HostEvent::Snapshot { window, .. } => *window,
        }
    }
}

/// Requests sent to the tab host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HostCommand {
    /// Move `ids` as one contiguous group so the first lands at `to_index`.
    ///
    /// The host answers with one `Moved` event per tab carrying its final
    /// index.
    MoveTabs {
        window: WindowId,
        marker: MoveMarker,
        ids: Vec<HostTabId>,
        to_index: usize,
    },
    /// Open a tab the engine already inserted under a provisional id.
    CreateTab {
        window: WindowId,
        provisional: TabId,
        index: usize,
        parent: Option<HostTabId>,
    },
    /// Select a tab.
    Activate { window: WindowId, id: HostTabId },
    /// Hint that the tree parent of `id` changed.
    ParentHint {
        window: WindowId,
        id: HostTabId,
        parent: Option<HostTabId>,
    },
    /// Ask for a [`HostEvent::Snapshot`] of the window.
    QueryWindow { window: WindowId },
}

/// Keyboard and menu commands. All act on the active tab.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreeCommand {
    GoPrev,
    GoNext,
    GoParent,
    GoChild,
    MovePrev,
    MoveNext,
    MoveToParent,
    MoveToChild,
    ToggleCollapse,
    CollapseAll,
    ExpandAll,
}

impl TreeCommand {
    /// Maps a shortcut name such as `tab_move_child` to its command.
    #[must_use]
    pub fn from_shortcut(name: &str) -> Option<Self> {
        let command = match name {
            "tab_go_prev" => TreeCommand::GoPrev,
            "tab_go_next" => TreeCommand::GoNext,
            "tab_go_parent" => TreeCommand::GoParent,
            "tab_go_child" => TreeCommand::GoChild,
            "tab_move_prev" => TreeCommand::MovePrev,
            "tab_move_next" => TreeCommand::MoveNext,
            "tab_move_parent" => TreeCommand::MoveToParent,
            "tab_move_child" => TreeCommand::MoveToChild,
            "tab_toggle_collapse" => TreeCommand::ToggleCollapse,
            "tab_collapse_all" => TreeCommand::CollapseAll,
            "tab_expand_all" => TreeCommand::ExpandAll,
            _ => return None,
        };
        Some(command)
    }

    /// Returns true for commands that only change the selection.
    #[must_use]
    pub fn is_navigation(&self) -> bool {
        matches!(
            self,
            TreeCommand::GoPrev | TreeCommand::GoNext | TreeCommand::GoParent | TreeCommand::GoChild
        )
    }
}

/// Derived-state changes consumed by the rendering layer.
#[derive(Debug, Clone, PartialEq)]
pub enum DerivedEvent {
    LevelChanged { id: TabId, level: u32 },
    VisibilityChanged { id: TabId, visible: bool },
    CollapseChanged { id: TabId, collapsed: bool },
    ParentChanged { id: TabId, parent: Option<TabId> },
    TabRemoved { id: TabId },
    IndentMapChanged(IndentMap),
    OverflowChanged(bool),
}

/// Broadcasts derived-state events to every subscriber.
///
/// Built on tokio's broadcast channel; slow receivers lose the oldest
/// events once `capacity` is exceeded.
#[derive(Debug)]
pub struct DerivedBus {
    sender: broadcast::Sender<DerivedEvent>,
}

impl DerivedBus {
    /// Creates a new bus buffering at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        DerivedBus { sender }
    }

    /// Subscribe to events sent after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<DerivedEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all subscribers.
    ///
    /// # Errors
    ///
    /// Returns `TreeError::EventError` if there are no active subscribers.
    pub fn send(&self, event: DerivedEvent) -> Result<usize, TreeError> {
        self.sender
            .send(event)
            .map_err(|e| TreeError::EventError(format!("failed to send event: {}", e)))
    }

    /// Sends every event, ignoring the case where nobody listens.
    pub fn publish(&self, events: impl IntoIterator<Item = DerivedEvent>) {
        if self.sender.receiver_count() == 0 {
            return;
        }
        for event in events {
            let _ = self.sender.send(event);
        }
    }

    /// Returns the number of active subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for DerivedBus {
    fn default() -> Self {
        DerivedBus::new(256)
    }
}

impl Clone for DerivedBus {
    fn clone(&self) -> Self {
        DerivedBus {
            sender: self.sender.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_event_window() {
        let moved = HostEvent::Moved {
            window: 3,
            id: 1,
            from_index: 0,
            to_index: 2,
            marker: None,
        };
        assert_eq!(moved.window(), 3);
        assert_eq!(HostEvent::Snapshot { window: 9, tabs: vec![] }.window(), 9);
    }

    #[test]
    fn test_host_event_from_json() {
        let event: HostEvent =
            serde_json::from_str(r#"{"type":"created","window":1,"id":4,"index":0}"#)
                .expect("should parse");
        assert_eq!(
            event,
            HostEvent::Created {
                window: 1,
                id: 4,
                index: 0,
                parent: None
            }
        );
    }

    #[test]
    fn test_host_command_to_json() {
        let cmd = HostCommand::QueryWindow { window: 2 };
        let json = serde_json::to_value(&cmd).expect("should serialize");
        assert_eq!(json["type"], "query_window");
        assert_eq!(json["window"], 2);
    }

    #[test]
    fn test_tree_command_from_shortcut() {
        assert_eq!(
            TreeCommand::from_shortcut("tab_move_child"),
            Some(TreeCommand::MoveToChild)
        );
        assert_eq!(
            TreeCommand::from_shortcut("tab_go_parent"),
            Some(TreeCommand::GoParent)
        );
        assert_eq!(TreeCommand::from_shortcut("tab_fly_away"), None);
    }

    #[test]
    fn test_tree_command_serde_name() {
        let cmd: TreeCommand = serde_json::from_str(r#""move_to_parent""#).expect("should parse");
        assert_eq!(cmd, TreeCommand::MoveToParent);
    }

    #[test]
    fn test_is_navigation() {
        assert!(TreeCommand::GoChild.is_navigation());
        assert!(!TreeCommand::MoveNext.is_navigation());
    }

    #[test]
    fn test_bus_send_no_subscribers() {
        let bus = DerivedBus::new(16);
        assert!(bus.send(DerivedEvent::OverflowChanged(true)).is_err());
        // publish swallows the missing receiver
        bus.publish([DerivedEvent::OverflowChanged(true)]);
    }

    #[tokio::test]
    async fn test_bus_publish_receive() {
        let bus = DerivedBus::new(16);
        let mut rx = bus.subscribe();
        bus.publish([
            DerivedEvent::LevelChanged { id: 1, level: 2 },
            DerivedEvent::TabRemoved { id: 3 },
        ]);

        let first = rx.recv().await.expect("should receive");
        let second = rx.recv().await.expect("should receive");
        assert_eq!(first, DerivedEvent::LevelChanged { id: 1, level: 2 });
        assert_eq!(second, DerivedEvent::TabRemoved { id: 3 });
    }

    #[test]
    fn test_bus_clone_shares_channel() {
        let bus1 = DerivedBus::new(16);
        let _rx = bus1.subscribe();
        let bus2 = bus1.clone();
        assert_eq!(bus2.subscriber_count(), 1);
    }
}
