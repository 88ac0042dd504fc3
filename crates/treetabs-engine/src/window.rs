//! Per-window tree state and event loop.
//!
//! A [`WindowTree`] owns everything for one host window: the store, the id
//! registry, the mutation engine and the indent calculator. Inputs arrive
//! one at a time through [`WindowTree::handle_input`]; [`WindowTree::run`]
//! drives that from a FIFO channel and fires debounced recomputations.
//!
//! # Example
//!
//! ```
//! use treetabs_core::{DerivedBus, HostEvent, TreeConfig};
//! use treetabs_engine::WindowTree;
//!
//! let mut tree = WindowTree::new(1, TreeConfig::default(), DerivedBus::default());
//! tree.handle_host_event(HostEvent::Created { window: 1, id: 10, index: 0, parent: None });
//! tree.handle_host_event(HostEvent::Created { window: 1, id: 11, index: 1, parent: Some(10) });
//!
//! assert_eq!(tree.store().parent_of(11), Some(10));
//! ```

use tokio::sync::{mpsc, oneshot};
use treetabs_core::{
    DerivedBus, DerivedEvent, HostCommand, HostEvent, HostTabId, IdRegistry, IndentCalculator,
    StructureEntry, TabId, TreeCommand, TreeConfig, TreeError, TreeResult, TreeStore, WindowId,
};

use crate::commands::{self, CommandOutcome};
use crate::mutation::{MoveOrigin, MutationEngine};
use crate::projection::{self, TabRow};
use crate::scheduler::{CoalescingScheduler, RecomputeKind};

/// Input to a window's event loop.
#[derive(Debug)]
pub enum WindowInput {
    Host(HostEvent),
    Command(TreeCommand),
    OpenTab {
        parent: Option<TabId>,
        index: Option<usize>,
        reply: oneshot::Sender<TreeResult<TabId>>,
    },
    Resize {
        width: u32,
        height: u32,
    },
    ApplyStructure(Vec<StructureEntry>),
    ExportStructure(oneshot::Sender<Vec<StructureEntry>>),
    Inspect(oneshot::Sender<Vec<TabRow>>),
}

/// Tree state of one host window.
///
/// # Thread Safety
///
/// WindowTree is not thread-safe. [`WindowTree::run`] takes ownership of it
/// and is the only place it is mutated once the loop starts.
#[derive(Debug)]
pub struct WindowTree {
    store: TreeStore,
    registry: IdRegistry,
    mutations: MutationEngine,
    indent: IndentCalculator,
    config: TreeConfig,
    bus: DerivedBus,
    active: Option<TabId>,
    width: u32,
    height: u32,
    overflow: bool,
    force_indent: bool,
    /// Locally opened tabs the host has not confirmed yet.
    creations: Vec<TabId>,
    outbox: Vec<HostCommand>,
    requests: Vec<RecomputeKind>,
}

impl WindowTree {
    /// Creates an empty window tree.
    #[must_use]
    pub fn new(window: WindowId, config: TreeConfig, bus: DerivedBus) -> Self {
        WindowTree {
            store: TreeStore::new(window),
            registry: IdRegistry::new(),
            mutations: MutationEngine::new(window, config.timing.internal_move_ttl()),
            indent: IndentCalculator::new(config.indent.clone()),
            width: config.layout.initial_width,
            height: config.layout.initial_height,
            config,
            bus,
            active: None,
            overflow: false,
            force_indent: true,
            creations: Vec::new(),
            outbox: Vec::new(),
            requests: Vec::new(),
        }
    }

    #[must_use]
    pub fn window(&self) -> WindowId {
        self.store.window()
    }

    #[must_use]
    pub fn store(&self) -> &TreeStore {
        &self.store
    }

    #[must_use]
    pub fn registry(&self) -> &IdRegistry {
        &self.registry
    }

    /// Tab that keyboard commands act on.
    #[must_use]
    pub fn active(&self) -> Option<TabId> {
        self.active
    }

    #[must_use]
    pub fn is_overflowing(&self) -> bool {
        self.overflow
    }

    /// Handles one input.
    pub fn handle_input(&mut self, input: WindowInput) {
        match input {
            WindowInput::Host(event) => self.handle_host_event(event),
            WindowInput::Command(command) => {
                if let Err(err) = self.handle_command(command) {
                    tracing::warn!(window = self.window(), ?command, %err, "command rejected");
                }
            }
            WindowInput::OpenTab {
                parent,
                index,
                reply,
            } => {
                let _ = reply.send(self.open_tab(parent, index));
            }
            WindowInput::Resize { width, height } => self.resize(width, height),
            WindowInput::ApplyStructure(entries) => {
                if let Err(err) = self.apply_structure(&entries) {
                    tracing::warn!(window = self.window(), %err, "structure rejected");
                }
            }
            WindowInput::ExportStructure(reply) => {
                let _ = reply.send(self.store.export_structure());
            }
            WindowInput::Inspect(reply) => {
                let _ = reply.send(self.rows());
            }
        }
    }

    /// Applies a host lifecycle event.
    ///
    /// Stale events are dropped. A desync queues a `QueryWindow` command;
    /// the host's `Snapshot` answer rebuilds the window.
    pub fn handle_host_event(&mut self, event: HostEvent) {
        let window = self.window();
        if event.window() != window {
            tracing::warn!(window, other = event.window(), "event for another window");
            return;
        }

        match self.apply_host_event(event) {
            Ok(true) => self.request_all(),
            Ok(false) => {}
            Err(err) if err.is_stale() => {
                tracing::debug!(window, %err, "dropping stale event");
            }
            Err(err) if err.is_desync() => {
                tracing::warn!(window, %err, "resyncing window");
                self.request_resync();
            }
            Err(err) => tracing::warn!(window, %err, "host event rejected"),
        }
        self.flush();
    }

    /// Returns true if the tree structure changed.
    fn apply_host_event(&mut self, event: HostEvent) -> TreeResult<bool> {
        match event {
            HostEvent::Created {
                id, index, parent, ..
            } => {
                if let Some(provisional) = self.claim_creation(id, index, parent) {
                    self.registry.register_mapping(provisional, id);
                    tracing::debug!(
                        window = self.window(),
                        provisional,
                        host = id,
                        "local tab announced before confirmation"
                    );
                    return Ok(false);
                }
                self.insert_announced(id, index, parent)
            }
            HostEvent::Attached {
                id, index, parent, ..
            } => self.insert_announced(id, index, parent),
            HostEvent::CreationConfirmed {
                provisional, id, ..
            } => {
                self.creations.retain(|&c| c != provisional);
                if !self.store.contains(provisional) {
                    return Err(TreeError::UnknownTab(provisional));
                }
                // announced under its host id without matching; fold it in
                let duplicate = self
                    .registry
                    .resolve(id)
                    .filter(|&d| d != provisional && self.store.contains(d));
                if let Some(duplicate) = duplicate {
                    tracing::debug!(
                        window = self.window(),
                        provisional,
                        duplicate,
                        "merging duplicate tab"
                    );
                    let was_active = self.active == Some(duplicate);
                    self.store.remove(duplicate)?;
                    self.forget(duplicate);
                    if was_active {
                        self.active = Some(provisional);
                    }
                }
                self.registry.register_mapping(provisional, id);
                tracing::debug!(window = self.window(), provisional, host = id, "creation confirmed");
                Ok(duplicate.is_some())
            }
            HostEvent::Moved {
                id,
                from_index,
                to_index,
                marker,
                ..
            } => {
                let id = self.known_tab(id)?;
                match self.mutations.observe_moved(id, to_index, marker) {
                    MoveOrigin::Internal(marker) => {
                        tracing::debug!(window = self.window(), tab = id, ?marker, "move confirmed");
                        Ok(false)
                    }
                    MoveOrigin::External if self.store.position(id) == Some(to_index) => Ok(false),
                    MoveOrigin::External => {
                        self.store.mirror_move(id, from_index, to_index)?;
                        Ok(true)
                    }
                }
            }
            HostEvent::Detached { id, .. } | HostEvent::Removed { id, .. } => {
                let id = self.known_tab(id)?;
                self.store.remove(id)?;
                self.forget(id);
                Ok(true)
            }
            HostEvent::Activated { id, .. } => {
                self.active = Some(self.known_tab(id)?);
                Ok(false)
            }
            HostEvent::Snapshot { tabs, .. } => {
                self.resync(tabs)?;
                Ok(true)
            }
        }
    }

    /// Runs a keyboard or menu command on the active tab.
    ///
    /// # Errors
    ///
    /// Returns the mutation error; the tree is unchanged in that case.
    pub fn handle_command(&mut self, command: TreeCommand) -> TreeResult<CommandOutcome> {
        let Some(active) = self.active.filter(|&a| self.store.contains(a)) else {
            tracing::debug!(window = self.window(), ?command, "no active tab");
            return Ok(CommandOutcome::Unchanged);
        };

        let result = commands::execute(
            command,
            active,
            &mut self.store,
            &self.registry,
            &mut self.mutations,
        );
        match result {
            Ok(CommandOutcome::Select(tab)) => {
                self.active = Some(tab);
                self.outbox.push(HostCommand::Activate {
                    window: self.window(),
                    id: self.registry.host_id(tab),
                });
            }
            Ok(CommandOutcome::Restructured) => self.request_all(),
            Ok(CommandOutcome::Collapsed(changed)) if changed > 0 => self.request_all(),
            _ => {}
        }
        self.flush();
        result
    }

    /// Opens a tab locally before the host knows it.
    ///
    /// Without an index the tab goes after `parent`'s subtree, or to the
    /// end of the window. The provisional id stays valid after the host
    /// confirms the creation.
    ///
    /// # Errors
    ///
    /// - `TreeError::UnknownTab` if `parent` is missing
    /// - `TreeError::InvalidMove` if `index` is past the end
    pub fn open_tab(&mut self, parent: Option<TabId>, index: Option<usize>) -> TreeResult<TabId> {
        if let Some(p) = parent {
            if !self.store.contains(p) {
                return Err(TreeError::UnknownTab(p));
            }
        }
        let len = self.store.len();
        let index = match (index, parent) {
            (Some(index), _) if index > len => {
                return Err(TreeError::InvalidMove(format!(
                    "open index {index} past end ({len})"
                )));
            }
            (Some(index), _) => index,
            (None, Some(p)) => {
                let last = self.store.last_descendant(p).unwrap_or(p);
                self.store.position(last).map_or(len, |at| at + 1)
            }
            (None, None) => len,
        };

        let id = self.registry.allocate_provisional();
        self.store.insert(id, index, parent)?;
        self.creations.push(id);
        self.outbox.push(HostCommand::CreateTab {
            window: self.window(),
            provisional: id,
            index,
            parent: parent.map(|p| self.registry.host_id(p)),
        });
        self.request_all();
        self.flush();
        Ok(id)
    }

    /// Records the new sidebar size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        self.request_all();
    }

    /// Restores a tree onto the current tabs.
    ///
    /// # Errors
    ///
    /// Propagates store errors; the tree is unchanged in that case.
    pub fn apply_structure(&mut self, entries: &[StructureEntry]) -> TreeResult<()> {
        self.store.apply_structure(entries)?;
        self.request_all();
        self.flush();
        Ok(())
    }

    /// Runs a debounced recomputation.
    pub fn recompute(&mut self, kind: RecomputeKind) {
        match kind {
            RecomputeKind::Indent => {
                let force = std::mem::take(&mut self.force_indent);
                if let Some(map) = self.indent.update(&self.store, self.width, force) {
                    self.bus.publish([DerivedEvent::IndentMapChanged(map)]);
                }
            }
            RecomputeKind::Layout => {
                let rows = self.store.iter().filter(|t| t.is_visible()).count() as u64;
                let overflow = rows * u64::from(self.config.layout.tab_height) > u64::from(self.height);
                if overflow != self.overflow {
                    self.overflow = overflow;
                    tracing::debug!(window = self.window(), overflow, "overflow changed");
                    self.bus.publish([DerivedEvent::OverflowChanged(overflow)]);
                }
            }
        }
    }

    /// Projection of every tab in flat order.
    #[must_use]
    pub fn rows(&self) -> Vec<TabRow> {
        projection::project(
            &self.store,
            &self.indent,
            self.config.counter.role,
            self.active,
        )
    }

    /// Drains commands for the host.
    pub fn take_commands(&mut self) -> Vec<HostCommand> {
        std::mem::take(&mut self.outbox)
    }

    /// Drains pending recomputation requests.
    pub fn take_requests(&mut self) -> Vec<RecomputeKind> {
        std::mem::take(&mut self.requests)
    }

    /// Processes inputs until the channel closes.
    ///
    /// Commands for the host are forwarded after every input, before the
    /// next one is read.
    ///
    /// # Errors
    ///
    /// Returns `TreeError::EventError` if the host channel closes.
    pub async fn run(
        mut self,
        mut inbox: mpsc::UnboundedReceiver<WindowInput>,
        host: mpsc::UnboundedSender<HostCommand>,
    ) -> TreeResult<()> {
        let (mut scheduler, mut timers) = CoalescingScheduler::new();
        let window = self.window();
        tracing::debug!(window, "window loop started");

        loop {
            for kind in self.take_requests() {
                scheduler.request(kind, self.delay(kind));
            }
            for command in self.take_commands() {
                host.send(command)
                    .map_err(|_| TreeError::EventError(format!("host channel closed for window {window}")))?;
            }

            tokio::select! {
                input = inbox.recv() => match input {
                    Some(input) => self.handle_input(input),
                    None => break,
                },
                Some(fired) = timers.recv() => {
                    if scheduler.accept(&fired) {
                        self.recompute(fired.kind);
                    }
                }
            }
        }

        scheduler.cancel_all();
        tracing::debug!(window, "window loop finished");
        Ok(())
    }

    fn delay(&self, kind: RecomputeKind) -> std::time::Duration {
        match kind {
            RecomputeKind::Indent => self.config.timing.indent_delay(),
            RecomputeKind::Layout => self.config.timing.layout_delay(),
        }
    }

    fn request_all(&mut self) {
        for kind in [RecomputeKind::Indent, RecomputeKind::Layout] {
            if !self.requests.contains(&kind) {
                self.requests.push(kind);
            }
        }
    }

    fn request_resync(&mut self) {
        self.mutations.clear();
        self.outbox.push(HostCommand::QueryWindow {
            window: self.window(),
        });
    }

    /// Rebuilds the window from the host's authoritative order.
    fn resync(&mut self, tabs: Vec<HostTabId>) -> TreeResult<()> {
        let order: Vec<TabId> = tabs.into_iter().map(|h| self.adopt_host_id(h)).collect();
        let previous = self.store.order().to_vec();
        self.store.rebuild(order)?;
        for id in previous {
            if !self.store.contains(id) {
                self.forget(id);
            }
        }
        self.mutations.clear();
        self.force_indent = true;
        tracing::info!(window = self.window(), tabs = self.store.len(), "window resynced");
        Ok(())
    }

    /// Publishes recorded changes and collects mutation commands.
    fn flush(&mut self) {
        let changes = self.store.take_changes();
        if !changes.is_empty() {
            tracing::trace!(window = self.window(), count = changes.len(), "derived changes");
            self.bus.publish(changes);
        }
        self.outbox.extend(self.mutations.take_commands());
    }

    /// Inserts a tab the host announced, unless it is already known.
    fn insert_announced(
        &mut self,
        host: HostTabId,
        index: usize,
        parent: Option<HostTabId>,
    ) -> TreeResult<bool> {
        let id = self.adopt_host_id(host);
        if self.store.contains(id) {
            tracing::debug!(window = self.window(), tab = id, "tab already known");
            return Ok(false);
        }
        let parent = parent.and_then(|p| self.registry.resolve(p));
        self.store.insert(id, index, parent)?;
        Ok(true)
    }

    /// Finds the unconfirmed local tab a `Created` event describes: same
    /// position, same parent.
    fn claim_creation(
        &mut self,
        host: HostTabId,
        index: usize,
        parent: Option<HostTabId>,
    ) -> Option<TabId> {
        if self
            .registry
            .resolve(host)
            .is_some_and(|id| self.store.contains(id))
        {
            return None;
        }
        let parent = parent.and_then(|p| self.registry.resolve(p));
        let at = self.creations.iter().position(|&c| {
            self.store.position(c) == Some(index) && self.store.parent_of(c) == parent
        })?;
        Some(self.creations.remove(at))
    }

    /// Resolves a host id of a tab that must be in the store.
    fn known_tab(&self, host: HostTabId) -> TreeResult<TabId> {
        self.registry
            .resolve(host)
            .filter(|&id| self.store.contains(id))
            .ok_or(TreeError::UnknownTab(host))
    }

    /// Resolves a host id announced by the host, reviving released ids.
    fn adopt_host_id(&mut self, host: HostTabId) -> TabId {
        match self.registry.resolve(host) {
            Some(id) => id,
            None => {
                self.registry.register_mapping(host, host);
                host
            }
        }
    }

    fn forget(&mut self, id: TabId) {
        self.creations.retain(|&c| c != id);
        self.mutations.forget_tab(id);
        self.registry.release(id);
        if self.active == Some(id) {
            self.active = None;
        }
    }
}
