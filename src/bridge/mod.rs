//! # Bridge Module
//!
//! Fans events from many physical remotes out to their own virtual gamepads.
//!
//! This module handles:
//! - Building the association table at startup
//! - Waiting on all associated remotes at once
//! - Draining and translating each ready remote
//! - Releasing every association exactly once on shutdown

pub mod association;
pub mod lifecycle;
pub mod multiplexer;

pub use association::{Association, AssociationTable};
pub use lifecycle::{build_table, Binder, DeviceSpec, SystemBinder};
pub use multiplexer::{run, LoopStats};
