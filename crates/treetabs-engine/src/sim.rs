//! In-process tab host.
//!
//! [`SimulatedHost`] keeps the authoritative flat order of each window the
//! way a browser would. It answers engine commands with the events a real
//! host sends, and can act on its own (open, close, drag, transfer) to
//! produce external events.

use std::collections::BTreeMap;

use treetabs_core::{HostCommand, HostEvent, HostTabId, WindowId};

#[derive(Debug, Clone, Default)]
pub struct SimulatedHost {
    windows: BTreeMap<WindowId, Vec<HostTabId>>,
    next_id: HostTabId,
    /// Whether `Moved` answers echo the command's marker.
    echo_markers: bool,
    /// Whether `CreateTab` is answered with `Created` before the
    /// confirmation.
    announce_creations: bool,
}

impl SimulatedHost {
    #[must_use]
    pub fn new() -> Self {
        SimulatedHost {
            windows: BTreeMap::new(),
            next_id: 1,
            echo_markers: true,
            announce_creations: false,
        }
    }

    /// A host that does not echo move markers.
    #[must_use]
    pub fn without_marker_echo() -> Self {
        SimulatedHost {
            echo_markers: false,
            ..Self::new()
        }
    }

    /// Also reports locally created tabs as `Created` before confirming them.
    #[must_use]
    pub fn announcing_creations(mut self) -> Self {
        self.announce_creations = true;
        self
    }

    /// Flat order of `window`.
    #[must_use]
    pub fn order(&self, window: WindowId) -> &[HostTabId] {
        self.windows.get(&window).map_or(&[], Vec::as_slice)
    }

    pub fn windows(&self) -> impl Iterator<Item = WindowId> + '_ {
        self.windows.keys().copied()
    }

    /// Answers a command from the engine.
    pub fn apply(&mut self, command: &HostCommand) -> Vec<HostEvent> {
        match command {
            HostCommand::MoveTabs {
                window,
                marker,
                ids,
                to_index,
            } => {
                let order = self.windows.entry(*window).or_default();
                let from: Vec<(HostTabId, usize)> = ids
                    .iter()
                    .filter_map(|&id| order.iter().position(|&t| t == id).map(|at| (id, at)))
                    .collect();
                order.retain(|t| !ids.contains(t));
                let at = (*to_index).min(order.len());
                order.splice(at..at, from.iter().map(|&(id, _)| id));

                let marker = self.echo_markers.then_some(*marker);
                from.into_iter()
                    .enumerate()
                    .map(|(offset, (id, from_index))| HostEvent::Moved {
                        window: *window,
                        id,
                        from_index,
                        to_index: at + offset,
                        marker,
                    })
                    .collect()
            }
            HostCommand::CreateTab {
                window,
                provisional,
                index,
                parent,
            } => {
                let id = self.allocate();
                let order = self.windows.entry(*window).or_default();
                let at = (*index).min(order.len());
                order.insert(at, id);
                let mut events = Vec::new();
                if self.announce_creations {
                    events.push(HostEvent::Created {
                        window: *window,
                        id,
                        index: at,
                        parent: *parent,
                    });
                }
                events.push(HostEvent::CreationConfirmed {
                    window: *window,
                    provisional: *provisional,
                    id,
                });
                events
            }
            HostCommand::Activate { window, id } => {
                if self.order(*window).contains(id) {
                    vec![HostEvent::Activated {
                        window: *window,
                        id: *id,
                    }]
                } else {
                    Vec::new()
                }
            }
            HostCommand::ParentHint { .. } => Vec::new(),
            HostCommand::QueryWindow { window } => vec![HostEvent::Snapshot {
                window: *window,
                tabs: self.order(*window).to_vec(),
            }],
        }
    }

    /// Opens a tab; `index` defaults to the end of the window.
    pub fn open(
        &mut self,
        window: WindowId,
        index: Option<usize>,
        opener: Option<HostTabId>,
    ) -> (HostTabId, HostEvent) {
        let id = self.allocate();
        let order = self.windows.entry(window).or_default();
        let index = index.unwrap_or(order.len()).min(order.len());
        order.insert(index, id);
        let event = HostEvent::Created {
            window,
            id,
            index,
            parent: opener,
        };
        (id, event)
    }

    /// Closes a tab. Returns `None` if the window does not hold it.
    pub fn close(&mut self, window: WindowId, id: HostTabId) -> Option<HostEvent> {
        let order = self.windows.get_mut(&window)?;
        let at = order.iter().position(|&t| t == id)?;
        order.remove(at);
        Some(HostEvent::Removed { window, id })
    }

    /// Moves a single tab as a user drag would.
    pub fn drag(&mut self, window: WindowId, id: HostTabId, to_index: usize) -> Option<HostEvent> {
        let order = self.windows.get_mut(&window)?;
        let from_index = order.iter().position(|&t| t == id)?;
        order.remove(from_index);
        let to_index = to_index.min(order.len());
        order.insert(to_index, id);
        Some(HostEvent::Moved {
            window,
            id,
            from_index,
            to_index,
            marker: None,
        })
    }

    /// Moves a tab to another window.
    pub fn transfer(
        &mut self,
        from: WindowId,
        id: HostTabId,
        to: WindowId,
        index: Option<usize>,
    ) -> Vec<HostEvent> {
        let Some(order) = self.windows.get_mut(&from) else {
            return Vec::new();
        };
        let Some(at) = order.iter().position(|&t| t == id) else {
            return Vec::new();
        };
        order.remove(at);

        let target = self.windows.entry(to).or_default();
        let index = index.unwrap_or(target.len()).min(target.len());
        target.insert(index, id);
        vec![
            HostEvent::Detached { window: from, id },
            HostEvent::Attached {
                window: to,
                id,
                index,
                parent: None,
            },
        ]
    }

    /// Selects a tab.
    pub fn activate(&self, window: WindowId, id: HostTabId) -> Option<HostEvent> {
        self.order(window)
            .contains(&id)
            .then_some(HostEvent::Activated { window, id })
    }

    fn allocate(&mut self) -> HostTabId {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}
