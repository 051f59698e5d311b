//! # Wiimote Pad Library
//!
//! Use Nintendo Wii Remotes as ordinary Linux gamepads.
//!
//! This library pairs every Wii Remote handled by the kernel's `hid-wiimote`
//! driver with a uinput gamepad of its own, and translates button presses
//! and accelerometer samples from the first to reports on the second.

pub mod bridge;
pub mod cli;
pub mod config;
pub mod controller;
pub mod error;
pub mod uinput;
