//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.
//!
//! Every section is optional; missing keys fall back to the defaults below,
//! which reproduce the behaviour of running without any configuration file.

use serde::de::Error;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{BridgeError, Result};
use crate::uinput::layout::Orientation;

/// Upper bound on associations, the `FD_SETSIZE` of a `select(2)` loop.
pub const MAX_MULTIPLEXED_DEVICES: usize = 1024;

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub gamepad: GamepadConfig,
    #[serde(default)]
    pub controller: ControllerConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Candidate discovery configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,

    #[serde(default = "default_node_prefix")]
    pub node_prefix: String,

    #[serde(default = "default_max_devices")]
    pub max_devices: usize,
}

/// Virtual gamepad configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GamepadConfig {
    #[serde(default)]
    pub orientation: Orientation,

    #[serde(default = "default_axis_max")]
    pub axis_max: i32,

    #[serde(default = "default_axis_fuzz")]
    pub axis_fuzz: i32,

    #[serde(default = "default_axis_flat")]
    pub axis_flat: i32,

    #[serde(default)]
    pub invert_horizontal: bool,

    #[serde(default = "default_vendor_id")]
    pub vendor_id: u16,

    #[serde(default = "default_product_id")]
    pub product_id: u16,
}

/// Physical controller configuration
#[derive(Debug, Deserialize, Clone)]
pub struct ControllerConfig {
    #[serde(default = "default_watch")]
    pub watch: bool,
}

/// What to do when a single device misbehaves
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Drop the offending device and keep serving the others.
    #[default]
    Isolate,
    /// Tear everything down and exit.
    Abort,
}

/// Failure isolation configuration
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PolicyConfig {
    #[serde(default)]
    pub on_setup_failure: FailurePolicy,

    #[serde(default)]
    pub on_write_failure: FailurePolicy,
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub log_dir: String,
}

// Default value functions
fn default_input_dir() -> PathBuf { PathBuf::from("/dev/input") }
fn default_node_prefix() -> String { "js".to_string() }
fn default_max_devices() -> usize { 16 }

fn default_axis_max() -> i32 { 100 }
fn default_axis_fuzz() -> i32 { 2 }
fn default_axis_flat() -> i32 { 4 }
fn default_vendor_id() -> u16 { 0x6181 }
fn default_product_id() -> u16 { 0x3169 }

fn default_watch() -> bool { true }

fn default_log_level() -> String { "info".to_string() }

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            node_prefix: default_node_prefix(),
            max_devices: default_max_devices(),
        }
    }
}

impl Default for GamepadConfig {
    fn default() -> Self {
        Self {
            orientation: Orientation::default(),
            axis_max: default_axis_max(),
            axis_fuzz: default_axis_fuzz(),
            axis_flat: default_axis_flat(),
            invert_horizontal: false,
            vendor_id: default_vendor_id(),
            product_id: default_product_id(),
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self { watch: default_watch() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            log_dir: String::new(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use wiimote_pad::config::Config;
    ///
    /// let config = Config::load("/etc/wiimote-pad.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from TOML text.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Log directory, if file logging is enabled.
    pub fn log_dir(&self) -> Option<&Path> {
        if self.logging.log_dir.is_empty() {
            None
        } else {
            Some(Path::new(&self.logging.log_dir))
        }
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if self.discovery.input_dir.as_os_str().is_empty() {
            return Err(invalid("discovery input_dir cannot be empty"));
        }

        if self.discovery.node_prefix.is_empty() {
            return Err(invalid("discovery node_prefix cannot be empty"));
        }

        if self.discovery.max_devices == 0 || self.discovery.max_devices > MAX_MULTIPLEXED_DEVICES {
            return Err(invalid(format!(
                "max_devices must be between 1 and {}",
                MAX_MULTIPLEXED_DEVICES
            )));
        }

        if self.gamepad.axis_max <= 0 || self.gamepad.axis_max > i32::from(i16::MAX) {
            return Err(invalid("axis_max must be between 1 and 32767"));
        }

        for (name, value) in [
            ("axis_fuzz", self.gamepad.axis_fuzz),
            ("axis_flat", self.gamepad.axis_flat),
        ] {
            if value < 0 || value > self.gamepad.axis_max {
                return Err(invalid(format!("{} must be between 0 and axis_max", name)));
            }
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid(
                "log level must be one of: trace, debug, info, warn, error",
            ));
        }

        Ok(())
    }
}

fn invalid(message: impl std::fmt::Display) -> BridgeError {
    BridgeError::Config(toml::de::Error::custom(message))
}
