//! # treetabs-core
//!
//! Core types for the treetabs tab-tree engine.
//!
//! This crate holds the hierarchy of one host window and everything derived
//! from it. The host owns the flat tab order; the tree is an overlay on top
//! of that order and is re-derived from it after every change.
//!
//! ## Core Abstractions
//!
//! - [`TreeStore`] - Parent links, child lists and the mirrored flat order
//! - [`TabNode`] - One tab with its derived level and visibility
//! - [`IdRegistry`] - Host id to internal id resolution
//! - [`IndentCalculator`] - Indent unit and level to pixel mapping
//! - [`HostEvent`] / [`HostCommand`] - Traffic to and from the tab host
//! - [`DerivedBus`] - Publish-subscribe distribution of derived changes
//! - [`TreeConfig`] - Settings loaded from `config.toml`
//! - [`TreeError`] - Error types for tree operations
//!
//! ## Example
//!
//! ```
//! use treetabs_core::{LevelFilter, TreeStore};
//!
//! let mut store = TreeStore::new(1);
//! store.insert(1, 0, None).unwrap();
//! store.insert(2, 1, Some(1)).unwrap();
//! store.insert(3, 2, Some(2)).unwrap();
//!
//! assert_eq!(store.max_level(LevelFilter::default()), 2);
//! assert_eq!(store.descendants(1).collect::<Vec<_>>(), vec![2, 3]);
//!
//! store.set_subtree_collapsed(1, true);
//! assert!(!store.get(3).unwrap().is_visible());
//! ```

pub mod collapse;
pub mod config;
pub mod error;
pub mod event;
pub mod ids;
pub mod indent;
pub mod navigation;
pub mod store;
pub mod structure;
pub mod tab;

pub use config::{
    CounterConfig, CounterRole, IndentConfig, LayoutConfig, TimingConfig, TreeConfig,
    HARD_MIN_INDENT,
};
pub use error::{TreeError, TreeResult};
pub use event::{DerivedBus, DerivedEvent, HostCommand, HostEvent, MoveMarker, TreeCommand};
pub use ids::{IdRegistry, PROVISIONAL_BASE, RELEASED_CAPACITY};
pub use indent::{IndentCalculator, IndentMap, IndentUnit};
pub use navigation::{Ancestors, Descendants, LevelFilter};
pub use store::TreeStore;
pub use structure::{parse_structure, StructureEntry};
pub use tab::{HostTabId, TabId, TabNode, WindowId};
