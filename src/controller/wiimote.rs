//! # Wii Remote Device Module
//!
//! Reads a physical Wii Remote through the input nodes the kernel's
//! `hid-wiimote` driver creates below the remote's HID device.
//!
//! ## Sub-interfaces
//!
//! | Interface | Input node name | Events |
//! |-----------|-----------------|--------|
//! | Core | `Nintendo Wii Remote` | EV_KEY |
//! | Accelerometer | `Nintendo Wii Remote Accelerometer` | ABS_RX, ABS_RY, ABS_RZ |
//!
//! Accelerometer axes are accumulated and emitted as one sample per
//! `SYN_REPORT`.
//!
//! ## Readiness
//!
//! Each device owns an epoll instance holding its open sub-interfaces and,
//! when watching is enabled, a udev monitor on the `input` subsystem. The
//! epoll descriptor is what the multiplexing loop waits on. A udev event
//! below the remote's HID device, or a sub-interface reporting `ENODEV`,
//! yields [`WiiEvent::Watch`].

use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::ops::BitOr;
use std::os::unix::io::{AsRawFd, BorrowedFd, RawFd};
use std::path::{Path, PathBuf};

use evdev::{AbsoluteAxisType, Device, EventType, InputEvent, Key, Synchronization};
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use tracing::{debug, trace, warn};

use crate::controller::events::{WiiEvent, WiiKey};
use crate::controller::identity::DeviceHandle;
use crate::controller::source_trait::EventSource;
use crate::error::{BridgeError, Result};
use crate::uinput::layout::WIIMOTE_CORE_NAME;

/// Name of the accelerometer input node.
pub const WIIMOTE_ACCEL_NAME: &str = "Nintendo Wii Remote Accelerometer";

const CORE_TOKEN: u64 = 1;
const ACCEL_TOKEN: u64 = 2;
const WATCH_TOKEN: u64 = 3;

/// Set of sub-interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Interfaces(u8);

impl Interfaces {
    /// Button reporting.
    pub const CORE: Interfaces = Interfaces(1);
    /// Accelerometer.
    pub const ACCEL: Interfaces = Interfaces(2);

    pub const fn empty() -> Self {
        Interfaces(0)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn contains(self, other: Interfaces) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Members of `self` missing from `other`.
    pub const fn difference(self, other: Interfaces) -> Interfaces {
        Interfaces(self.0 & !other.0)
    }

    fn insert(&mut self, other: Interfaces) {
        self.0 |= other.0;
    }
}

impl BitOr for Interfaces {
    type Output = Interfaces;

    fn bitor(self, rhs: Interfaces) -> Interfaces {
        Interfaces(self.0 | rhs.0)
    }
}

impl fmt::Display for Interfaces {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.contains(Interfaces::CORE) {
            names.push("core");
        }
        if self.contains(Interfaces::ACCEL) {
            names.push("accel");
        }
        if names.is_empty() {
            write!(f, "none")
        } else {
            write!(f, "{}", names.join("+"))
        }
    }
}

/// Maps one event from the core node.
///
/// Synchronization reports carry no information for the translator and are
/// dropped here.
#[must_use]
pub fn core_event(event: &InputEvent) -> Option<WiiEvent> {
    match event.event_type() {
        EventType::KEY => match WiiKey::from_kernel(Key::new(event.code())) {
            Some(key) => Some(WiiEvent::Key {
                code: key.code(),
                state: event.value() as u32,
            }),
            None => Some(WiiEvent::Other(EventType::KEY.0)),
        },
        EventType::SYNCHRONIZATION => None,
        other => Some(WiiEvent::Other(other.0)),
    }
}

/// Collects accelerometer axes into samples.
#[derive(Debug, Default, Clone)]
pub struct AccelAccumulator {
    sample: [i32; 3],
    dirty: bool,
}

impl AccelAccumulator {
    /// Feeds one event from the accelerometer node; returns a sample on
    /// `SYN_REPORT` if any axis changed since the previous one.
    pub fn feed(&mut self, event: &InputEvent) -> Option<WiiEvent> {
        match event.event_type() {
            EventType::ABSOLUTE => {
                let axis = AbsoluteAxisType(event.code());
                let slot = match axis {
                    AbsoluteAxisType::ABS_RX => 0,
                    AbsoluteAxisType::ABS_RY => 1,
                    AbsoluteAxisType::ABS_RZ => 2,
                    _ => return Some(WiiEvent::Other(EventType::ABSOLUTE.0)),
                };
                self.sample[slot] = event.value();
                self.dirty = true;
                None
            }
            EventType::SYNCHRONIZATION if event.code() == Synchronization::SYN_REPORT.0 => {
                if !self.dirty {
                    return None;
                }
                self.dirty = false;
                let [x, y, z] = self.sample;
                Some(WiiEvent::Accel { x, y, z })
            }
            EventType::SYNCHRONIZATION => None,
            other => Some(WiiEvent::Other(other.0)),
        }
    }
}

/// Open connection to one Wii Remote
pub struct WiimoteDevice {
    root: PathBuf,
    wanted: Interfaces,
    poller: Epoll,
    core: Option<Device>,
    accel: Option<Device>,
    monitor: Option<udev::MonitorSocket>,
    accumulator: AccelAccumulator,
    pending: VecDeque<WiiEvent>,
}

impl fmt::Debug for WiimoteDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WiimoteDevice")
            .field("root", &self.root)
            .field("wanted", &self.wanted)
            .field("open", &self.opened())
            .field("watching", &self.monitor.is_some())
            .finish()
    }
}

impl WiimoteDevice {
    /// Open the requested sub-interfaces of a remote
    ///
    /// # Arguments
    ///
    /// * `handle` - Resolved identity of the remote
    /// * `wanted` - Sub-interfaces to open; every one of them must open
    /// * `watch` - Subscribe to reconnect notifications
    ///
    /// # Errors
    ///
    /// Returns `InterfaceOpen` if any requested sub-interface is missing or
    /// cannot be opened, or if the readiness descriptor cannot be set up.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use wiimote_pad::controller::identity::resolve;
    /// use wiimote_pad::controller::wiimote::{Interfaces, WiimoteDevice};
    ///
    /// let handle = resolve("/dev/input/js0")?;
    /// let remote = WiimoteDevice::open(&handle, Interfaces::CORE | Interfaces::ACCEL, true)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(handle: &DeviceHandle, wanted: Interfaces, watch: bool) -> Result<Self> {
        let root = handle.root.clone();
        let poller = Epoll::new(EpollCreateFlags::EPOLL_CLOEXEC)
            .map_err(|e| interface_error(&root, format!("epoll: {}", e)))?;

        let mut device = Self {
            root,
            wanted,
            poller,
            core: None,
            accel: None,
            monitor: None,
            accumulator: AccelAccumulator::default(),
            pending: VecDeque::new(),
        };

        if watch {
            device.watch()?;
        }

        let opened = device.attach()?;
        if opened != wanted {
            return Err(interface_error(
                &device.root,
                format!(
                    "some interfaces failed to open (wanted {}, got {})",
                    wanted, opened
                ),
            ));
        }

        debug!("Opened {} of {}", opened, device.root.display());
        Ok(device)
    }

    /// Sysfs path of the remote's HID device.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Sub-interfaces currently open.
    pub fn opened(&self) -> Interfaces {
        let mut open = Interfaces::empty();
        if self.core.is_some() {
            open.insert(Interfaces::CORE);
        }
        if self.accel.is_some() {
            open.insert(Interfaces::ACCEL);
        }
        open
    }

    fn watch(&mut self) -> Result<()> {
        let monitor = udev::MonitorBuilder::new()
            .and_then(|builder| builder.match_subsystem("input"))
            .and_then(|builder| builder.listen())
            .map_err(|e| interface_error(&self.root, format!("udev monitor: {}", e)))?;
        self.register(monitor.as_raw_fd(), WATCH_TOKEN)?;
        self.monitor = Some(monitor);
        Ok(())
    }

    /// Opens every wanted sub-interface that is not open yet.
    fn attach(&mut self) -> Result<Interfaces> {
        let missing = self.wanted.difference(self.opened());
        if missing.is_empty() {
            return Ok(self.opened());
        }

        for node in self.input_nodes()? {
            let device = match Device::open(&node) {
                Ok(device) => device,
                Err(e) => {
                    debug!("Could not open {}: {}", node.display(), e);
                    continue;
                }
            };
            let (iface, token) = match device.name() {
                Some(WIIMOTE_CORE_NAME) => (Interfaces::CORE, CORE_TOKEN),
                Some(WIIMOTE_ACCEL_NAME) => (Interfaces::ACCEL, ACCEL_TOKEN),
                _ => continue,
            };
            if !missing.contains(iface) {
                continue;
            }

            set_nonblocking(device.as_raw_fd())
                .map_err(|e| interface_error(&self.root, format!("{}: {}", node.display(), e)))?;
            self.register(device.as_raw_fd(), token)?;
            trace!("Attached {} node {}", iface, node.display());
            if iface == Interfaces::CORE {
                self.core = Some(device);
            } else {
                self.accel = Some(device);
            }
        }

        Ok(self.opened())
    }

    /// Event nodes of the `input` subsystem below the HID device.
    fn input_nodes(&self) -> Result<Vec<PathBuf>> {
        let scan = || -> io::Result<Vec<PathBuf>> {
            let parent = udev::Device::from_syspath(&self.root)?;
            let mut enumerator = udev::Enumerator::new()?;
            enumerator.match_parent(&parent)?;
            enumerator.match_subsystem("input")?;

            let mut nodes: Vec<PathBuf> = enumerator
                .scan_devices()?
                .filter(|device| device.sysname().to_string_lossy().starts_with("event"))
                .filter_map(|device| device.devnode().map(Path::to_path_buf))
                .collect();
            nodes.sort();
            Ok(nodes)
        };
        scan().map_err(|e| interface_error(&self.root, format!("udev scan: {}", e)))
    }

    fn register(&self, fd: RawFd, token: u64) -> Result<()> {
        // SAFETY: the descriptor belongs to a handle stored in `self` right after.
        let fd = unsafe { BorrowedFd::borrow_raw(fd) };
        self.poller
            .add(fd, EpollEvent::new(EpollFlags::EPOLLIN, token))
            .map_err(|e| interface_error(&self.root, format!("epoll add: {}", e)))
    }

    fn detach(&mut self, iface: Interfaces) {
        let slot = if iface == Interfaces::CORE {
            &mut self.core
        } else {
            &mut self.accel
        };
        if let Some(device) = slot.take() {
            // SAFETY: `device` is still open until the end of this block.
            let fd = unsafe { BorrowedFd::borrow_raw(device.as_raw_fd()) };
            if let Err(e) = self.poller.delete(fd) {
                debug!("epoll delete failed for {}: {}", iface, e);
            }
            warn!("Lost {} interface of {}", iface, self.root.display());
        }
    }

    /// Reads everything buffered on one sub-interface into the queue.
    fn pump(&mut self, iface: Interfaces) -> Result<()> {
        let slot = if iface == Interfaces::CORE {
            &mut self.core
        } else {
            &mut self.accel
        };
        let read: io::Result<Vec<InputEvent>> = match slot.as_mut() {
            Some(device) => device.fetch_events().map(|events| events.collect()),
            None => return Ok(()),
        };

        match read {
            Ok(events) => {
                for event in &events {
                    let translated = if iface == Interfaces::CORE {
                        core_event(event)
                    } else {
                        self.accumulator.feed(event)
                    };
                    if let Some(translated) = translated {
                        self.pending.push_back(translated);
                    }
                }
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(()),
            Err(e) if e.raw_os_error() == Some(libc::ENODEV) => {
                self.detach(iface);
                self.pending.push_back(WiiEvent::Watch);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn pump_monitor(&mut self) {
        let Some(monitor) = self.monitor.as_ref() else {
            return;
        };
        let ours = monitor
            .iter()
            .filter(|event| event.device().syspath().starts_with(&self.root))
            .count();
        if ours > 0 {
            trace!("{} udev event(s) for {}", ours, self.root.display());
            self.pending.push_back(WiiEvent::Watch);
        }
    }
}

impl AsRawFd for WiimoteDevice {
    fn as_raw_fd(&self) -> RawFd {
        self.poller.0.as_raw_fd()
    }
}

impl Rounds for WiimoteDevice {
    fn queue(&mut self) -> &mut VecDeque<WiiEvent> {
        &mut self.pending
    }

    fn round(&mut self) -> Result<usize> {
        let mut ready = [EpollEvent::empty(); 4];
        let count = self
            .poller
            .wait(&mut ready, EpollTimeout::ZERO)
            .map_err(io::Error::from)?;

        for event in &ready[..count] {
            match event.data() {
                CORE_TOKEN => self.pump(Interfaces::CORE)?,
                ACCEL_TOKEN => self.pump(Interfaces::ACCEL)?,
                WATCH_TOKEN => self.pump_monitor(),
                other => debug!("Unexpected epoll token {}", other),
            }
        }
        Ok(count)
    }
}

impl EventSource for WiimoteDevice {
    fn dispatch(&mut self) -> Result<Option<WiiEvent>> {
        next_event(self)
    }

    fn reopen(&mut self) -> Result<()> {
        let opened = self.attach()?;
        if opened != self.wanted {
            return Err(interface_error(
                &self.root,
                format!("missing {}", self.wanted.difference(opened)),
            ));
        }
        debug!("Reopened {} of {}", opened, self.root.display());
        Ok(())
    }
}

/// Non-blocking readiness rounds over a device's descriptors.
trait Rounds {
    fn queue(&mut self) -> &mut VecDeque<WiiEvent>;

    /// Services every ready descriptor and returns how many were ready.
    fn round(&mut self) -> Result<usize>;
}

/// Next queued event, running rounds until one is queued or nothing is ready.
///
/// A round can be ready without queuing anything (a udev event for another
/// device, a read batch ending on a partial frame), so only an empty round
/// means the descriptors are drained.
fn next_event(device: &mut impl Rounds) -> Result<Option<WiiEvent>> {
    loop {
        if let Some(event) = device.queue().pop_front() {
            return Ok(Some(event));
        }
        if device.round()? == 0 {
            return Ok(None);
        }
    }
}

fn interface_error(root: &Path, reason: String) -> BridgeError {
    BridgeError::InterfaceOpen {
        root: root.to_path_buf(),
        reason,
    }
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: the caller owns `fd` for the duration of the call.
    let fd = unsafe { BorrowedFd::borrow_raw(fd) };
    let current = OFlag::from_bits_retain(fcntl(fd, FcntlArg::F_GETFL)?);
    fcntl(fd, FcntlArg::F_SETFL(current | OFlag::O_NONBLOCK))?;
    Ok(())
}
