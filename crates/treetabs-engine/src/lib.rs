//! # treetabs-engine
//!
//! Mutation engine and per-window event loops for treetabs.
//!
//! This crate drives the [`treetabs_core`] tree store from host events and
//! user commands:
//!
//! - [`MutationEngine`] - Attach, detach and group moves, with internal move
//!   confirmations told apart from external moves
//! - [`WindowTree`] - Everything one window needs, fed one input at a time
//! - [`CoalescingScheduler`] - Debounced indent and layout recomputation
//! - [`TreeHub`] - One event loop task per host window
//! - [`TabRow`] - The projection the rendering layer reads
//! - [`SimulatedHost`] - An in-process tab host for tests and replays
//!
//! ## Example
//!
//! ```
//! use treetabs_core::{DerivedBus, HostEvent, TreeCommand, TreeConfig};
//! use treetabs_engine::{SimulatedHost, WindowTree};
//!
//! let mut host = SimulatedHost::new();
//! let mut tree = WindowTree::new(1, TreeConfig::default(), DerivedBus::default());
//!
//! let (parent, event) = host.open(1, None, None);
//! tree.handle_host_event(event);
//! let (child, event) = host.open(1, None, None);
//! tree.handle_host_event(event);
//!
//! tree.handle_host_event(host.activate(1, child).unwrap());
//! tree.handle_command(TreeCommand::MoveToChild).unwrap();
//! assert_eq!(tree.store().parent_of(child), Some(parent));
//!
//! for command in tree.take_commands() {
//!     for event in host.apply(&command) {
//!         tree.handle_host_event(event);
//!     }
//! }
//! assert_eq!(tree.store().order(), host.order(1));
//! ```

pub mod commands;
pub mod hub;
pub mod mutation;
pub mod projection;
pub mod scheduler;
pub mod sim;
pub mod window;

pub use commands::CommandOutcome;
pub use hub::TreeHub;
pub use mutation::{MoveOrigin, MutationEngine};
pub use projection::{CloseTarget, TabRow};
pub use scheduler::{CoalescingScheduler, Fired, RecomputeKind};
pub use sim::SimulatedHost;
pub use window::{WindowInput, WindowTree};
