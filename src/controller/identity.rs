//! # Device Identity Resolver
//!
//! Confirms that a device node is backed by the kernel's Wii Remote driver
//! and resolves it to the HID device that owns all of the remote's
//! interfaces.
//!
//! ## Resolution Steps
//!
//! 1. Stat the node and take its device number
//! 2. Look up the character device with that number in udev
//! 3. Walk up to the nearest ancestor in the `hid` subsystem
//! 4. Require the ancestor's driver to be `wiimote`
//! 5. Parse the hexadecimal index after the last `.` of its sysname
//!    (`0005:057E:0306.000A` → 10)
//!
//! A node failing any step is [`BridgeError::NotEligible`]: a normal outcome
//! while probing candidates, not a fault.

use std::ffi::OsStr;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use udev::DeviceType;

use crate::error::{BridgeError, Result};

/// Kernel driver bound to Wii Remote HID devices.
pub const WIIMOTE_DRIVER: &str = "wiimote";

/// Subsystem of the ancestor that identifies the remote.
pub const HID_SUBSYSTEM: &str = "hid";

/// Stable identity of one physical remote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    /// Sysfs path of the owning HID device.
    pub root: PathBuf,
    /// Index parsed from the HID device's sysname.
    pub id: u32,
    /// Device node the user (or discovery) named.
    pub source: PathBuf,
}

/// Resolve a device node to the Wii Remote behind it
///
/// Every udev handle opened here is dropped before returning.
///
/// # Arguments
///
/// * `path` - Device node, e.g. `/dev/input/js0`
///
/// # Errors
///
/// Returns `NotEligible` if the node does not belong to a Wii Remote.
///
/// # Examples
///
/// ```no_run
/// use wiimote_pad::controller::identity::resolve;
///
/// let handle = resolve("/dev/input/js0")?;
/// println!("device {} at {}", handle.id, handle.root.display());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn resolve<P: AsRef<Path>>(path: P) -> Result<DeviceHandle> {
    let path = path.as_ref();
    let not_eligible = |reason: String| BridgeError::NotEligible {
        path: path.to_path_buf(),
        reason,
    };

    let rdev = fs::metadata(path)
        .map_err(|e| not_eligible(format!("stat failed: {}", e)))?
        .rdev();

    let device = udev::Device::from_devnum(DeviceType::Character, rdev)
        .map_err(|e| not_eligible(format!("not a character device: {}", e)))?;

    let parent = device
        .parent_with_subsystem(HID_SUBSYSTEM)
        .map_err(|e| not_eligible(format!("udev lookup failed: {}", e)))?
        .ok_or_else(|| not_eligible("no HID parent".to_string()))?;

    check_driver(parent.driver(), parent.subsystem()).map_err(not_eligible)?;

    let sysname = parent.sysname().to_string_lossy();
    let id = parse_device_index(&sysname)
        .ok_or_else(|| not_eligible(format!("no device index in {}", sysname)))?;

    Ok(DeviceHandle {
        root: parent.syspath().to_path_buf(),
        id,
        source: path.to_path_buf(),
    })
}

/// Parses the hexadecimal index after the last `.` of a HID sysname.
#[must_use]
pub fn parse_device_index(sysname: &str) -> Option<u32> {
    let (_, index) = sysname.rsplit_once('.')?;
    if index.is_empty() {
        return None;
    }
    u32::from_str_radix(index, 16).ok()
}

/// Checks the driver and subsystem of a candidate HID ancestor.
pub fn check_driver(
    driver: Option<&OsStr>,
    subsystem: Option<&OsStr>,
) -> std::result::Result<(), String> {
    if subsystem != Some(OsStr::new(HID_SUBSYSTEM)) {
        return Err(format!("parent subsystem is {:?}", subsystem));
    }
    match driver {
        Some(driver) if driver == WIIMOTE_DRIVER => Ok(()),
        Some(driver) => Err(format!("driven by {}", driver.to_string_lossy())),
        None => Err("no driver bound".to_string()),
    }
}
