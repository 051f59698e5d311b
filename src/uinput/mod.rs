//! # Virtual Gamepad Module
//!
//! Creates the uinput devices that gamepad consumers see.
//!
//! This module handles:
//! - Declaring the button set and the two absolute axes of a [`GamepadLayout`]
//! - Writing the device descriptor (name, virtual bus, ids) and creating the device
//! - Writing individual reports in order
//! - Removing the device exactly once, when its handle is dropped

pub mod layout;
pub mod sink_trait;

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{AbsInfo, AttributeSet, BusType, InputEvent, InputId, Key, UinputAbsSetup};
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::error::{BridgeError, Result};
use layout::GamepadLayout;
use sink_trait::ReportSink;

nix::ioctl_none!(ui_dev_destroy, b'U', 2);

/// Handle to one created uinput gamepad.
///
/// Dropping the handle removes the device from the system.
pub struct VirtualGamepad {
    device: VirtualDevice,
    name: String,
    syspath: Option<PathBuf>,
}

impl std::fmt::Debug for VirtualGamepad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualGamepad")
            .field("name", &self.name)
            .field("syspath", &self.syspath)
            .finish_non_exhaustive()
    }
}

impl VirtualGamepad {
    /// Create a virtual gamepad for a layout
    ///
    /// Any failure while declaring capabilities or creating the device drops
    /// the half-configured uinput handle before the error is returned, so no
    /// partial device is left behind.
    ///
    /// # Errors
    ///
    /// Returns `VirtualDevice` if `/dev/uinput` cannot be opened or any
    /// setup step is rejected by the kernel.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use wiimote_pad::config::GamepadConfig;
    /// use wiimote_pad::uinput::VirtualGamepad;
    /// use wiimote_pad::uinput::layout::{GamepadLayout, Orientation};
    ///
    /// let layout = GamepadLayout::new(&GamepadConfig::default(), Orientation::Portrait);
    /// let pad = VirtualGamepad::create(&layout)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn create(layout: &GamepadLayout) -> Result<Self> {
        let mut device = Self::build(layout).map_err(|source| BridgeError::VirtualDevice {
            name: layout.name.clone(),
            source,
        })?;

        let syspath = match device.get_syspath() {
            Ok(path) => Some(path),
            Err(e) => {
                debug!("Could not query syspath of {}: {}", layout.name, e);
                None
            }
        };
        debug!(
            "Created virtual device {} ({} d-pad) at {:?}",
            layout.name, layout.orientation, syspath
        );

        Ok(Self {
            device,
            name: layout.name.clone(),
            syspath,
        })
    }

    fn build(layout: &GamepadLayout) -> io::Result<VirtualDevice> {
        let mut keys = AttributeSet::<Key>::new();
        for key in layout.buttons {
            keys.insert(key);
        }

        let id = InputId::new(BusType::BUS_VIRTUAL, layout.vendor_id, layout.product_id, 0);
        let mut builder = VirtualDeviceBuilder::new()?
            .name(&layout.name)
            .input_id(id)
            .with_keys(&keys)?;

        for axis in &layout.axes {
            let info = AbsInfo::new(0, axis.min, axis.max, axis.fuzz, axis.flat, 0);
            builder = builder.with_absolute_axis(&UinputAbsSetup::new(axis.axis, info))?;
        }

        builder.build()
    }

    /// Name the device was created with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sysfs path of the created device, when the kernel reported one.
    pub fn syspath(&self) -> Option<&PathBuf> {
        self.syspath.as_ref()
    }
}

impl ReportSink for VirtualGamepad {
    fn write_report(&mut self, report: &InputEvent) -> io::Result<()> {
        let bytes = report_bytes(report);
        let size = bytes.len();
        // SAFETY: the descriptor is owned by `self.device` and outlives this call.
        let fd = unsafe { BorrowedFd::borrow_raw(self.device.as_raw_fd()) };

        let written = nix::unistd::write(fd, bytes)?;
        if written != size {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                format!("short report write ({} of {} bytes)", written, size),
            ));
        }
        Ok(())
    }
}

/// Wire form of a report: the kernel `input_event` it wraps.
fn report_bytes(report: &InputEvent) -> &[u8] {
    let raw: &libc::input_event = report.as_ref();
    // SAFETY: input_event is a plain C struct borrowed for the returned lifetime.
    unsafe {
        std::slice::from_raw_parts(
            (raw as *const libc::input_event).cast::<u8>(),
            mem::size_of::<libc::input_event>(),
        )
    }
}

impl Drop for VirtualGamepad {
    fn drop(&mut self) {
        // SAFETY: UI_DEV_DESTROY takes no argument and the descriptor is still open.
        if let Err(e) = unsafe { ui_dev_destroy(self.device.as_raw_fd()) } {
            warn!("Could not destroy virtual device {}: {}", self.name, e);
        } else {
            debug!("Destroyed virtual device {}", self.name);
        }
    }
}
