//! Multi-window routing.
//!
//! The [`TreeHub`] owns one event loop task per host window. Host events are
//! routed by window id; the first event for an unseen window spawns its
//! loop. All windows share one outbound command channel and one
//! [`DerivedBus`].

use std::collections::HashMap;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use treetabs_core::{
    DerivedBus, HostCommand, HostEvent, StructureEntry, TabId, TreeCommand, TreeConfig, TreeError,
    TreeResult, WindowId,
};

use crate::projection::TabRow;
use crate::window::{WindowInput, WindowTree};

#[derive(Debug)]
struct WindowHandle {
    inbox: mpsc::UnboundedSender<WindowInput>,
    task: JoinHandle<TreeResult<()>>,
}

/// Routes inputs to per-window event loops.
///
/// Must be used inside a tokio runtime.
#[derive(Debug)]
pub struct TreeHub {
    config: TreeConfig,
    bus: DerivedBus,
    host: mpsc::UnboundedSender<HostCommand>,
    windows: HashMap<WindowId, WindowHandle>,
}

impl TreeHub {
    /// Creates a hub and the receiver for commands addressed to the host.
    #[must_use]
    pub fn new(config: TreeConfig, bus: DerivedBus) -> (Self, mpsc::UnboundedReceiver<HostCommand>) {
        let (host, host_rx) = mpsc::unbounded_channel();
        let hub = TreeHub {
            config,
            bus,
            host,
            windows: HashMap::new(),
        };
        (hub, host_rx)
    }

    #[must_use]
    pub fn bus(&self) -> &DerivedBus {
        &self.bus
    }

    /// Window ids with a running loop, in ascending order.
    #[must_use]
    pub fn windows(&self) -> Vec<WindowId> {
        let mut ids: Vec<WindowId> = self.windows.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Starts the loop for `window` if it is not running yet.
    pub fn open_window(&mut self, window: WindowId) {
        if self.windows.contains_key(&window) {
            return;
        }
        let (inbox, rx) = mpsc::unbounded_channel();
        let tree = WindowTree::new(window, self.config.clone(), self.bus.clone());
        let task = tokio::spawn(tree.run(rx, self.host.clone()));
        tracing::debug!(window, "window opened");
        self.windows.insert(window, WindowHandle { inbox, task });
    }

    /// Routes a host event to its window, opening the window if needed.
    ///
    /// # Errors
    ///
    /// Returns `TreeError::EventError` if the window's loop has stopped.
    pub fn dispatch(&mut self, event: HostEvent) -> TreeResult<()> {
        let window = event.window();
        self.open_window(window);
        self.send(window, WindowInput::Host(event))
    }

    /// Sends a keyboard or menu command to `window`.
    ///
    /// # Errors
    ///
    /// Returns `TreeError::UnknownWindow` if no loop runs for `window`.
    pub fn command(&self, window: WindowId, command: TreeCommand) -> TreeResult<()> {
        self.send(window, WindowInput::Command(command))
    }

    /// # Errors
    ///
    /// Returns `TreeError::UnknownWindow` if no loop runs for `window`.
    pub fn resize(&self, window: WindowId, width: u32, height: u32) -> TreeResult<()> {
        self.send(window, WindowInput::Resize { width, height })
    }

    /// # Errors
    ///
    /// Returns `TreeError::UnknownWindow` if no loop runs for `window`.
    pub fn apply_structure(&self, window: WindowId, entries: Vec<StructureEntry>) -> TreeResult<()> {
        self.send(window, WindowInput::ApplyStructure(entries))
    }

    /// Opens a tab locally and returns its provisional id.
    ///
    /// # Errors
    ///
    /// Returns the window's validation error, or `TreeError::UnknownWindow`.
    pub async fn open_tab(
        &self,
        window: WindowId,
        parent: Option<TabId>,
        index: Option<usize>,
    ) -> TreeResult<TabId> {
        let (reply, rx) = oneshot::channel();
        self.send(
            window,
            WindowInput::OpenTab {
                parent,
                index,
                reply,
            },
        )?;
        rx.await.map_err(|_| closed(window))?
    }

    /// Rows of `window` once every earlier input was processed.
    ///
    /// # Errors
    ///
    /// Returns `TreeError::UnknownWindow` or `TreeError::EventError`.
    pub async fn rows(&self, window: WindowId) -> TreeResult<Vec<TabRow>> {
        let (reply, rx) = oneshot::channel();
        self.send(window, WindowInput::Inspect(reply))?;
        rx.await.map_err(|_| closed(window))
    }

    /// # Errors
    ///
    /// Returns `TreeError::UnknownWindow` or `TreeError::EventError`.
    pub async fn export_structure(&self, window: WindowId) -> TreeResult<Vec<StructureEntry>> {
        let (reply, rx) = oneshot::channel();
        self.send(window, WindowInput::ExportStructure(reply))?;
        rx.await.map_err(|_| closed(window))
    }

    /// Stops the loop of `window` after it drains its queue.
    ///
    /// # Errors
    ///
    /// Returns `TreeError::UnknownWindow`, or the loop's own error.
    pub async fn close_window(&mut self, window: WindowId) -> TreeResult<()> {
        let handle = self
            .windows
            .remove(&window)
            .ok_or(TreeError::UnknownWindow(window))?;
        join(window, handle).await
    }

    /// Stops every window loop.
    ///
    /// # Errors
    ///
    /// Returns the first loop error; every loop is stopped regardless.
    pub async fn shutdown(mut self) -> TreeResult<()> {
        let mut result = Ok(());
        for (window, handle) in self.windows.drain() {
            if let Err(err) = join(window, handle).await {
                tracing::warn!(window, %err, "window loop failed");
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }
        result
    }

    fn send(&self, window: WindowId, input: WindowInput) -> TreeResult<()> {
        let handle = self
            .windows
            .get(&window)
            .ok_or(TreeError::UnknownWindow(window))?;
        handle.inbox.send(input).map_err(|_| closed(window))
    }
}

async fn join(window: WindowId, handle: WindowHandle) -> TreeResult<()> {
    drop(handle.inbox);
    handle
        .task
        .await
        .map_err(|e| TreeError::EventError(format!("window {window} task failed: {e}")))?
}

fn closed(window: WindowId) -> TreeError {
    TreeError::EventError(format!("window {window} loop stopped"))
}
