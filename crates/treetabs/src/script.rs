//! Replay scripts.
//!
//! A script is a JSON-lines file, one step per line. Blank lines and lines
//! starting with `#` are skipped. Each step names its operation in `op`:
//!
//! ```text
//! {"op": "open", "window": 1}
//! {"op": "open", "window": 1, "opener": 1}
//! {"op": "activate", "window": 1, "id": 2}
//! {"op": "shortcut", "window": 1, "name": "tab_move_child"}
//! {"op": "drag", "window": 1, "id": 2, "to": 0}
//! ```

use std::fs;
use std::path::Path;

use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use serde::Deserialize;
use treetabs_core::{HostTabId, TabId, TreeCommand, WindowId};

/// One scripted action.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// The host opens a tab, optionally from an opener tab.
    Open {
        window: WindowId,
        #[serde(default)]
        index: Option<usize>,
        #[serde(default)]
        opener: Option<HostTabId>,
    },
    /// The host closes a tab.
    Close { window: WindowId, id: HostTabId },
    /// The user drags a tab in the host's own tab strip.
    Drag {
        window: WindowId,
        id: HostTabId,
        to: usize,
    },
    /// The host selects a tab.
    Activate { window: WindowId, id: HostTabId },
    /// The host moves a tab to another window.
    Transfer {
        from: WindowId,
        id: HostTabId,
        to: WindowId,
        #[serde(default)]
        index: Option<usize>,
    },
    /// A tree command on the active tab.
    Command {
        window: WindowId,
        command: TreeCommand,
    },
    /// A tree command given by its shortcut name.
    Shortcut { window: WindowId, name: String },
    /// The sidebar is resized.
    Resize {
        window: WindowId,
        width: u32,
        #[serde(default)]
        height: Option<u32>,
    },
    /// The sidebar opens a tab itself.
    OpenLocal {
        window: WindowId,
        #[serde(default)]
        parent: Option<TabId>,
        #[serde(default)]
        index: Option<usize>,
    },
    /// Waits, letting debounced work run.
    Settle { ms: u64 },
}

impl Step {
    /// Window the step acts on first.
    #[must_use]
    pub fn window(&self) -> Option<WindowId> {
        match self {
            Step::Open { window, .. }
            | Step::Close { window, .. }
            | Step::Drag { window, .. }
            | Step::Activate { window, .. }
            | Step::Command { window, .. }
            | Step::Shortcut { window, .. }
            | Step::Resize { window, .. }
            | Step::OpenLocal { window, .. } => Some(*window),
            Step::Transfer { from, .. } => Some(*from),
            Step::Settle { .. } => None,
        }
    }

    /// Resolves a shortcut step into its command.
    ///
    /// # Errors
    ///
    /// Returns an error if the shortcut name is unknown.
    pub fn command(&self) -> Result<Option<TreeCommand>> {
        match self {
            Step::Command { command, .. } => Ok(Some(*command)),
            Step::Shortcut { name, .. } => TreeCommand::from_shortcut(name)
                .map(Some)
                .ok_or_else(|| eyre!("unknown shortcut `{name}`")),
            _ => Ok(None),
        }
    }
}

/// Parses script text.
///
/// # Errors
///
/// Returns an error naming the first line that is not a valid step.
pub fn parse(text: &str) -> Result<Vec<Step>> {
    let mut steps = Vec::new();
    for (number, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let step: Step = serde_json::from_str(line)
            .wrap_err_with(|| format!("invalid step on line {}", number + 1))?;
        step.command()
            .wrap_err_with(|| format!("invalid step on line {}", number + 1))?;
        steps.push(step);
    }
    Ok(steps)
}

/// Reads and parses a script file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load(path: &Path) -> Result<Vec<Step>> {
    let text = fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read script {}", path.display()))?;
    parse(&text)
}
