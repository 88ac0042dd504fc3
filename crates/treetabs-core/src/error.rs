//! Core error types for treetabs-core
//!
//! This module provides the error taxonomy shared by the tree store, the
//! mutation engine and the per-window event loop. None of these errors is
//! fatal: callers either reject the operation with a reason or resync.

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use toml::de::Error as ConfigParseError;

use crate::tab::{TabId, WindowId};

/// Errors that can occur while maintaining a tab tree.
#[derive(Debug, Error)]
pub enum TreeError {
    /// Attaching `tab` under `parent` would create a cycle.
    ///
    /// Raised when `parent` is `tab` itself or one of its descendants.
    /// The operation is aborted before any state is touched.
    #[error("cannot attach tab {tab} under {parent}: parent is inside its subtree")]
    CycleViolation { tab: TabId, parent: TabId },

    /// Tab with the specified ID is not present in the tree store.
    ///
    /// Usually a stale event for a tab that was already closed; callers
    /// drop it after logging.
    #[error("tab not found: {0}")]
    UnknownTab(TabId),

    /// No tree store is registered for the specified window.
    #[error("window not found: {0}")]
    UnknownWindow(WindowId),

    /// A host event implies a flat order the store cannot reach
    /// incrementally.
    ///
    /// The affected window is rebuilt from a fresh authoritative query.
    #[error("window {window} out of sync with host: {reason}")]
    HostDesync { window: WindowId, reason: String },

    /// A move request is malformed (empty group, anchor inside the group).
    #[error("invalid move: {0}")]
    InvalidMove(String),

    /// Event system error, such as a closed channel.
    #[error("event error: {0}")]
    EventError(String),

    /// Underlying IO error bubbled up from config operations.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// Configuration file could not be parsed.
    #[error("invalid config at {path:?}: {source}")]
    Config {
        path: PathBuf,
        source: ConfigParseError,
    },

    /// Tree structure could not be encoded or decoded.
    #[error("invalid tree structure: {0}")]
    Structure(#[from] serde_json::Error),
}

impl TreeError {
    /// Returns true for errors caused by events about tabs that are gone.
    #[must_use]
    pub fn is_stale(&self) -> bool {
        matches!(self, TreeError::UnknownTab(_) | TreeError::UnknownWindow(_))
    }

    /// Returns true when the window must be resynced from the host.
    #[must_use]
    pub fn is_desync(&self) -> bool {
        matches!(self, TreeError::HostDesync { .. })
    }

    pub(crate) fn desync(window: WindowId, reason: impl Into<String>) -> Self {
        TreeError::HostDesync {
            window,
            reason: reason.into(),
        }
    }
}

/// Result type alias using [`TreeError`].
pub type TreeResult<T> = Result<T, TreeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cycle_violation_display() {
        let err = TreeError::CycleViolation { tab: 1, parent: 3 };
        assert_eq!(
            err.to_string(),
            "cannot attach tab 1 under 3: parent is inside its subtree"
        );
    }

    #[test]
    fn test_unknown_tab_display() {
        let err = TreeError::UnknownTab(42);
        assert_eq!(err.to_string(), "tab not found: 42");
    }

    #[test]
    fn test_host_desync_display() {
        let err = TreeError::desync(7, "index 9 out of range");
        assert_eq!(
            err.to_string(),
            "window 7 out of sync with host: index 9 out of range"
        );
    }

    #[test]
    fn test_event_error_display() {
        let err = TreeError::EventError("channel closed".to_string());
        assert_eq!(err.to_string(), "event error: channel closed");
    }

    #[test]
    fn test_classification() {
        assert!(TreeError::UnknownTab(1).is_stale());
        assert!(TreeError::UnknownWindow(1).is_stale());
        assert!(!TreeError::UnknownTab(1).is_desync());
        assert!(TreeError::desync(1, "x").is_desync());
        assert!(!TreeError::CycleViolation { tab: 1, parent: 2 }.is_stale());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TreeError>();
    }
}
