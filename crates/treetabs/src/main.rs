//! treetabs - replay tab host events against the tree engine
//!
//! Reads a JSON-lines script of host actions and sidebar commands, plays it
//! against an in-process host, and prints the resulting tab trees.

mod render;
mod replay;
mod script;

use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use serde::Serialize;
use tracing_subscriber::EnvFilter;
use treetabs_core::{StructureEntry, TreeConfig, WindowId};
use treetabs_engine::SimulatedHost;

use crate::replay::{Replay, WindowReport};

/// Replay tab host events against the treetabs tree engine
#[derive(Parser, Debug)]
#[command(name = "treetabs")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Script to replay, one JSON step per line
    script: PathBuf,

    /// Config file (defaults to the user config, then built-in defaults)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sidebar width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Sidebar height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Print rows as JSON
    #[arg(long)]
    json: bool,

    /// Print the exported tree structure instead of rows
    #[arg(long)]
    structure: bool,

    /// Host does not echo move markers in its move events
    #[arg(long)]
    no_marker_echo: bool,

    /// Host reports locally created tabs as opened before confirming them
    #[arg(long)]
    announce_creations: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Serialize)]
struct WindowStructure {
    window: WindowId,
    entries: Vec<StructureEntry>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::from_default_env()
            .add_directive("treetabs=debug".parse()?)
            .add_directive("treetabs_engine=debug".parse()?)
    } else {
        EnvFilter::from_default_env().add_directive("treetabs=info".parse()?)
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let config = load_config(&cli)?;
    let steps = script::load(&cli.script)?;
    tracing::info!(steps = steps.len(), script = %cli.script.display(), "replaying");

    let mut host = if cli.no_marker_echo {
        SimulatedHost::without_marker_echo()
    } else {
        SimulatedHost::new()
    };
    if cli.announce_creations {
        host = host.announcing_creations();
    }
    let mut replay = Replay::new(config, host);
    replay.run(&steps).await?;
    let reports = replay.finish().await?;

    let mut stdout = io::stdout().lock();
    if cli.structure {
        let structures: Vec<WindowStructure> = replay
            .structures()
            .await?
            .into_iter()
            .map(|(window, entries)| WindowStructure { window, entries })
            .collect();
        writeln!(stdout, "{}", serde_json::to_string_pretty(&structures)?)?;
    } else if cli.json {
        writeln!(stdout, "{}", serde_json::to_string_pretty(&reports)?)?;
    } else {
        print_text(&mut stdout, &reports)?;
    }

    replay.shutdown().await
}

fn load_config(cli: &Cli) -> Result<TreeConfig> {
    let mut config = match &cli.config {
        Some(path) => TreeConfig::load_from(path)
            .wrap_err_with(|| format!("failed to load config {}", path.display()))?,
        None => TreeConfig::load().unwrap_or_else(|e| {
            tracing::warn!(%e, "failed to load config, using defaults");
            TreeConfig::default()
        }),
    };
    if let Some(width) = cli.width {
        config.layout.initial_width = width;
    }
    if let Some(height) = cli.height {
        config.layout.initial_height = height;
    }
    Ok(config)
}

fn print_text(out: &mut impl Write, reports: &[WindowReport]) -> io::Result<()> {
    for (i, report) in reports.iter().enumerate() {
        if i > 0 {
            writeln!(out)?;
        }
        write!(out, "{}", render::window_text(report))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn cli(args: &[&str]) -> Cli {
        Cli::parse_from(std::iter::once("treetabs").chain(args.iter().copied()))
    }

    // ===== Cli Tests =====

    #[test]
    fn test_cli_parses_flags() {
        let cli = cli(&["run.jsonl", "--width", "900", "--json", "-v"]);
        assert_eq!(cli.script, PathBuf::from("run.jsonl"));
        assert_eq!(cli.width, Some(900));
        assert!(cli.json);
        assert!(cli.verbose);
        assert!(!cli.structure);
        assert!(!cli.announce_creations);
    }

    #[test]
    fn test_config_overrides() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("treetabs.toml");
        let mut config = TreeConfig::default();
        config.indent.base_indent = 20;
        config.save_to(&path).unwrap();

        let path = path.to_string_lossy().into_owned();
        let loaded = load_config(&cli(&["s.jsonl", "--config", &path, "--height", "48"])).unwrap();
        assert_eq!(loaded.indent.base_indent, 20);
        assert_eq!(loaded.layout.initial_height, 48);
        assert_eq!(loaded.layout.initial_width, config.layout.initial_width);
    }

    #[test]
    fn test_missing_config_file_is_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.toml").to_string_lossy().into_owned();
        assert!(load_config(&cli(&["s.jsonl", "--config", &path])).is_err());
    }

    #[test]
    fn test_print_text_separates_windows() {
        let reports = vec![
            WindowReport {
                window: 1,
                rows: Vec::new(),
            },
            WindowReport {
                window: 2,
                rows: Vec::new(),
            },
        ];
        let mut out = Vec::new();
        print_text(&mut out, &reports).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "window 1\n\nwindow 2\n");
    }
}
