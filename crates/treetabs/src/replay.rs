//! Drives a [`TreeHub`] against a [`SimulatedHost`] one script step at a
//! time.

use std::time::Duration;

use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use serde::Serialize;
use tokio::sync::mpsc;
use treetabs_core::{DerivedBus, HostCommand, HostEvent, StructureEntry, TreeConfig, WindowId};
use treetabs_engine::{SimulatedHost, TabRow, TreeHub};

use crate::script::Step;

/// Upper bound on host round trips per step.
const MAX_ROUNDS: usize = 64;

/// Extra wait on top of the longest debounce delay.
const TIMER_SLACK: Duration = Duration::from_millis(20);

/// Final state of one window.
#[derive(Debug, Clone, Serialize)]
pub struct WindowReport {
    pub window: WindowId,
    pub rows: Vec<TabRow>,
}

pub struct Replay {
    hub: TreeHub,
    host: SimulatedHost,
    commands: mpsc::UnboundedReceiver<HostCommand>,
    height: u32,
    quiet_after: Duration,
}

impl Replay {
    /// Must be called inside a tokio runtime.
    #[must_use]
    pub fn new(config: TreeConfig, host: SimulatedHost) -> Self {
        let height = config.layout.initial_height;
        let quiet_after = config
            .timing
            .indent_delay()
            .max(config.timing.layout_delay())
            + TIMER_SLACK;
        let (hub, commands) = TreeHub::new(config, DerivedBus::default());
        Replay {
            hub,
            host,
            commands,
            height,
            quiet_after,
        }
    }

    #[must_use]
    pub fn host(&self) -> &SimulatedHost {
        &self.host
    }

    /// Runs every step, letting the host answer after each one.
    ///
    /// # Errors
    ///
    /// Returns an error naming the step that failed.
    pub async fn run(&mut self, steps: &[Step]) -> Result<()> {
        for (number, step) in steps.iter().enumerate() {
            self.step(step)
                .await
                .wrap_err_with(|| format!("step {} failed: {step:?}", number + 1))?;
        }
        Ok(())
    }

    /// Runs one step and waits until host and trees agree again.
    ///
    /// # Errors
    ///
    /// Returns an error if a window loop stopped or the step addresses a
    /// window that was never opened.
    pub async fn step(&mut self, step: &Step) -> Result<()> {
        tracing::debug!(?step, "step");
        match step {
            Step::Open {
                window,
                index,
                opener,
            } => {
                let (_, event) = self.host.open(*window, *index, *opener);
                self.hub.dispatch(event)?;
            }
            Step::Close { window, id } => {
                let event = self.host.close(*window, *id);
                self.dispatch_some(event, step)?;
            }
            Step::Drag { window, id, to } => {
                let event = self.host.drag(*window, *id, *to);
                self.dispatch_some(event, step)?;
            }
            Step::Activate { window, id } => {
                let event = self.host.activate(*window, *id);
                self.dispatch_some(event, step)?;
            }
            Step::Transfer {
                from,
                id,
                to,
                index,
            } => {
                let events = self.host.transfer(*from, *id, *to, *index);
                if events.is_empty() {
                    tracing::warn!(?step, "host ignored step");
                }
                for event in events {
                    self.hub.dispatch(event)?;
                }
            }
            Step::Command { window, .. } | Step::Shortcut { window, .. } => {
                if let Some(command) = step.command()? {
                    self.hub.command(*window, command)?;
                }
            }
            Step::Resize {
                window,
                width,
                height,
            } => {
                self.hub
                    .resize(*window, *width, height.unwrap_or(self.height))?;
            }
            Step::OpenLocal {
                window,
                parent,
                index,
            } => {
                let id = self.hub.open_tab(*window, *parent, *index).await?;
                tracing::debug!(window, id, "opened local tab");
            }
            Step::Settle { ms } => tokio::time::sleep(Duration::from_millis(*ms)).await,
        }
        self.settle().await
    }

    /// Lets pending debounce timers fire, then reports every window.
    ///
    /// # Errors
    ///
    /// Returns an error if a window loop stopped.
    pub async fn finish(&mut self) -> Result<Vec<WindowReport>> {
        tokio::time::sleep(self.quiet_after).await;
        self.settle().await?;

        let mut reports = Vec::new();
        for window in self.hub.windows() {
            let rows = self.hub.rows(window).await?;
            let host_len = self.host.order(window).len();
            if rows.len() != host_len {
                tracing::warn!(window, tree = rows.len(), host = host_len, "tree and host disagree");
            }
            reports.push(WindowReport { window, rows });
        }
        Ok(reports)
    }

    /// Exports the tree structure of every window.
    ///
    /// # Errors
    ///
    /// Returns an error if a window loop stopped.
    pub async fn structures(&self) -> Result<Vec<(WindowId, Vec<StructureEntry>)>> {
        let mut out = Vec::new();
        for window in self.hub.windows() {
            out.push((window, self.hub.export_structure(window).await?));
        }
        Ok(out)
    }

    /// Stops every window loop.
    ///
    /// # Errors
    ///
    /// Returns the first window loop error.
    pub async fn shutdown(self) -> Result<()> {
        self.hub.shutdown().await?;
        Ok(())
    }

    fn dispatch_some(&mut self, event: Option<HostEvent>, step: &Step) -> Result<()> {
        match event {
            Some(event) => self.hub.dispatch(event)?,
            None => tracing::warn!(?step, "host ignored step"),
        }
        Ok(())
    }

    /// Feeds host answers back until no window has anything left to say.
    async fn settle(&mut self) -> Result<()> {
        for _ in 0..MAX_ROUNDS {
            // A rows reply means the window forwarded every earlier command.
            for window in self.hub.windows() {
                self.hub.rows(window).await?;
            }

            let mut quiet = true;
            while let Ok(command) = self.commands.try_recv() {
                quiet = false;
                tracing::trace!(?command, "host command");
                for event in self.host.apply(&command) {
                    self.hub.dispatch(event)?;
                }
            }
            if quiet {
                return Ok(());
            }
        }
        Err(eyre!("host and trees did not settle after {MAX_ROUNDS} rounds"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script;
    use treetabs_core::TreeCommand;

    fn fast_config() -> TreeConfig {
        let mut config = TreeConfig::default();
        config.timing.indent_delay_ms = 5;
        config.timing.layout_delay_ms = 1;
        config
    }

    fn parents(report: &WindowReport) -> Vec<Option<u32>> {
        report.rows.iter().map(|row| row.parent).collect()
    }

    // ===== Replay Tests =====

    #[tokio::test]
    async fn test_replay_nests_and_moves() {
        let steps = script::parse(
            r#"
            {"op": "open", "window": 1}
            {"op": "open", "window": 1}
            {"op": "open", "window": 1}
            {"op": "activate", "window": 1, "id": 2}
            {"op": "shortcut", "window": 1, "name": "tab_move_child"}
            {"op": "activate", "window": 1, "id": 3}
            {"op": "shortcut", "window": 1, "name": "tab_move_child"}
            "#,
        )
        .unwrap();

        let mut replay = Replay::new(fast_config(), SimulatedHost::new());
        replay.run(&steps).await.unwrap();
        let reports = replay.finish().await.unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(parents(&reports[0]), vec![None, Some(1), Some(1)]);
        assert_eq!(replay.host().order(1), &[1, 2, 3]);
        replay.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_external_drag_normalizes() {
        let steps = script::parse(
            r#"
            {"op": "open", "window": 1}
            {"op": "open", "window": 1, "opener": 1}
            {"op": "open", "window": 1}
            {"op": "drag", "window": 1, "id": 1, "to": 2}
            "#,
        )
        .unwrap();

        let mut replay = Replay::new(fast_config(), SimulatedHost::new());
        replay.run(&steps).await.unwrap();
        let reports = replay.finish().await.unwrap();

        let ids: Vec<u32> = reports[0].rows.iter().map(|row| row.id).collect();
        assert_eq!(ids, replay.host().order(1));
        assert!(reports[0].rows.iter().all(|row| row.parent.is_none()));
    }

    #[tokio::test]
    async fn test_transfer_opens_window() {
        let mut replay = Replay::new(fast_config(), SimulatedHost::new());
        replay
            .step(&Step::Open {
                window: 1,
                index: None,
                opener: None,
            })
            .await
            .unwrap();
        replay
            .step(&Step::Transfer {
                from: 1,
                id: 1,
                to: 2,
                index: None,
            })
            .await
            .unwrap();

        let reports = replay.finish().await.unwrap();
        assert_eq!(reports.len(), 2);
        assert!(reports[0].rows.is_empty());
        assert_eq!(reports[1].rows[0].id, 1);
    }

    #[tokio::test]
    async fn test_local_open_confirmed() {
        let mut replay = Replay::new(fast_config(), SimulatedHost::new());
        replay
            .step(&Step::Open {
                window: 1,
                index: None,
                opener: None,
            })
            .await
            .unwrap();
        replay
            .step(&Step::OpenLocal {
                window: 1,
                parent: Some(1),
                index: None,
            })
            .await
            .unwrap();

        let reports = replay.finish().await.unwrap();
        assert_eq!(replay.host().order(1).len(), 2);
        assert_eq!(reports[0].rows[1].parent, Some(1));
        let structures = replay.structures().await.unwrap();
        assert_eq!(structures[0].1[1].parent, Some(0));
    }

    #[tokio::test]
    async fn test_announced_local_open_is_one_tab() {
        let steps = script::parse(
            r#"
            {"op": "open", "window": 1}
            {"op": "open_local", "window": 1, "parent": 1}
            {"op": "close", "window": 1, "id": 2}
            "#,
        )
        .unwrap();

        let mut replay = Replay::new(fast_config(), SimulatedHost::new().announcing_creations());
        replay.run(&steps).await.unwrap();
        let reports = replay.finish().await.unwrap();

        assert_eq!(replay.host().order(1), &[1]);
        assert_eq!(reports[0].rows.len(), 1);
    }

    #[tokio::test]
    async fn test_command_on_unknown_window_fails() {
        let mut replay = Replay::new(fast_config(), SimulatedHost::new());
        let err = replay
            .step(&Step::Command {
                window: 9,
                command: TreeCommand::GoNext,
            })
            .await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn test_ignored_host_steps_are_not_errors() {
        let mut replay = Replay::new(fast_config(), SimulatedHost::new());
        replay.step(&Step::Close { window: 1, id: 4 }).await.unwrap();
        replay
            .step(&Step::Drag {
                window: 1,
                id: 4,
                to: 0,
            })
            .await
            .unwrap();
        assert!(replay.finish().await.unwrap().is_empty());
    }
}
