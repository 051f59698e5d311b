//! # Error Types
//!
//! Custom error types for Wiimote Pad using `thiserror`.

use std::io;
use std::path::PathBuf;

use nix::errno::Errno;
use thiserror::Error;

/// Main error type for Wiimote Pad
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The device node is not backed by the Wii Remote driver
    #[error("{path} is not a Wii Remote: {reason}")]
    NotEligible { path: PathBuf, reason: String },

    /// The association table has no free slot left
    #[error("association table full ({capacity} devices)")]
    TableFull { capacity: usize },

    /// A physical sub-interface could not be opened
    #[error("could not open interfaces of {root}: {reason}")]
    InterfaceOpen { root: PathBuf, reason: String },

    /// Creating or configuring the uinput device failed
    #[error("could not create virtual device {name}: {source}")]
    VirtualDevice {
        name: String,
        #[source]
        source: io::Error,
    },

    /// Writing a report to a virtual device failed
    #[error("could not report to virtual device for {device}: {source}")]
    ReportWrite {
        device: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Nothing could be associated
    #[error("no Wii Remote found: {0}")]
    NoEligibleDevice(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl BridgeError {
    /// Unix errno reported as the process exit status for this error.
    pub fn errno(&self) -> i32 {
        match self {
            BridgeError::NotEligible { .. } | BridgeError::NoEligibleDevice(_) => {
                Errno::ENODEV as i32
            }
            BridgeError::TableFull { .. } => Errno::ENOSPC as i32,
            BridgeError::Config(_) => Errno::EINVAL as i32,
            BridgeError::InterfaceOpen { .. } => Errno::EIO as i32,
            BridgeError::VirtualDevice { source, .. }
            | BridgeError::ReportWrite { source, .. }
            | BridgeError::Io(source) => source.raw_os_error().unwrap_or(Errno::EIO as i32),
        }
    }

    /// True for the "not our hardware" outcome used to skip candidates.
    pub fn is_not_eligible(&self) -> bool {
        matches!(self, BridgeError::NotEligible { .. })
    }
}

/// Result type alias for Wiimote Pad
pub type Result<T> = std::result::Result<T, BridgeError>;
