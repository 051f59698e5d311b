//! # Controller Module
//!
//! Wii Remote input handling.
//!
//! This module handles:
//! - Confirming a device node belongs to the kernel Wii Remote driver
//! - Enumerating candidate nodes when none are named
//! - Reading key and accelerometer events from the remote's input nodes
//! - Translating those events into gamepad reports

pub mod discovery;
pub mod events;
pub mod identity;
pub mod source_trait;
pub mod translator;
pub mod wiimote;
