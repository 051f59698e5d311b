//! # Lifecycle Manager
//!
//! Builds the association table at startup.
//!
//! For every candidate, in order:
//!
//! 1. Resolve the node to a Wii Remote, skipping nodes that are not one
//! 2. Open the remote's core and accelerometer interfaces
//! 3. Create a virtual gamepad in the orientation captured for that node
//! 4. Append the association, unless the table is already full
//!
//! Teardown is handled by the table itself: whatever was built is released
//! exactly once when it is dropped, including when startup is cut short.

use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::bridge::association::{Association, AssociationTable};
use crate::config::{Config, FailurePolicy};
use crate::controller::identity::{self, DeviceHandle};
use crate::controller::source_trait::EventSource;
use crate::controller::wiimote::{Interfaces, WiimoteDevice};
use crate::error::{BridgeError, Result};
use crate::uinput::layout::{GamepadLayout, Orientation};
use crate::uinput::sink_trait::ReportSink;
use crate::uinput::VirtualGamepad;

/// A candidate node and the orientation in effect when it was named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceSpec {
    pub path: PathBuf,
    pub orientation: Orientation,
}

impl DeviceSpec {
    pub fn new<P: Into<PathBuf>>(path: P, orientation: Orientation) -> Self {
        Self {
            path: path.into(),
            orientation,
        }
    }
}

/// Trait for the three setup steps of one association
pub trait Binder {
    type Source: EventSource;
    type Sink: ReportSink;

    /// Confirm the node is a Wii Remote.
    fn resolve(&self, path: &Path) -> Result<DeviceHandle>;

    /// Open the physical side.
    fn open_source(&self, handle: &DeviceHandle) -> Result<Self::Source>;

    /// Create the virtual side.
    fn create_sink(&self, layout: &GamepadLayout) -> Result<Self::Sink>;
}

/// Binds real remotes to real uinput devices.
#[derive(Debug, Clone, Copy)]
pub struct SystemBinder {
    pub watch: bool,
}

impl Binder for SystemBinder {
    type Source = WiimoteDevice;
    type Sink = VirtualGamepad;

    fn resolve(&self, path: &Path) -> Result<DeviceHandle> {
        identity::resolve(path)
    }

    fn open_source(&self, handle: &DeviceHandle) -> Result<WiimoteDevice> {
        WiimoteDevice::open(handle, Interfaces::CORE | Interfaces::ACCEL, self.watch)
    }

    fn create_sink(&self, layout: &GamepadLayout) -> Result<VirtualGamepad> {
        VirtualGamepad::create(layout)
    }
}

/// Associate every eligible candidate
///
/// Must be called from within a Tokio runtime.
///
/// # Arguments
///
/// * `binder` - Performs resolution, opening and virtual device creation
/// * `specs` - Candidates in association order
/// * `config` - Table capacity, gamepad layout and setup failure policy
///
/// # Errors
///
/// - `NoEligibleDevice`: no candidate could be associated
/// - `VirtualDevice`: creation failed and the setup policy is `Abort`;
///   associations built so far are released before returning
pub fn build_table<B: Binder>(
    binder: &B,
    specs: &[DeviceSpec],
    config: &Config,
) -> Result<AssociationTable<B::Source, B::Sink>> {
    let mut table = AssociationTable::new(config.discovery.max_devices);

    for (position, spec) in specs.iter().enumerate() {
        if table.is_full() {
            warn!(
                "Association table full ({} devices), skipping {} remaining candidate(s)",
                table.capacity(),
                specs.len() - position
            );
            break;
        }

        match associate(binder, spec, config) {
            Ok(association) => {
                let handle = association.handle();
                info!(
                    "using device {} from root {} for {} ({} d-pad)",
                    handle.id,
                    handle.root.display(),
                    handle.source.display(),
                    spec.orientation
                );
                table.push(association)?;
            }
            Err(e) if e.is_not_eligible() => {
                debug!("Skipping {}", e);
            }
            Err(e @ BridgeError::VirtualDevice { .. }) => match config.policy.on_setup_failure {
                FailurePolicy::Abort => {
                    error!("{}", e);
                    return Err(e);
                }
                FailurePolicy::Isolate => {
                    warn!("Skipping {}: {}", spec.path.display(), e);
                }
            },
            Err(e) => {
                warn!("Skipping {}: {}", spec.path.display(), e);
            }
        }
    }

    if table.is_empty() {
        return Err(BridgeError::NoEligibleDevice(format!(
            "none of {} candidate(s) could be associated",
            specs.len()
        )));
    }
    Ok(table)
}

fn associate<B: Binder>(
    binder: &B,
    spec: &DeviceSpec,
    config: &Config,
) -> Result<Association<B::Source, B::Sink>> {
    let handle = binder.resolve(&spec.path)?;
    let source = binder.open_source(&handle)?;
    let layout = GamepadLayout::new(&config.gamepad, spec.orientation);
    let sink = binder.create_sink(&layout)?;
    Association::new(handle, source, sink, &layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::source_trait::mocks::MockSource;
    use crate::uinput::sink_trait::mocks::{CountedSink, MockSink};
    use std::collections::HashSet;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Binder over mocks; nodes named `eligible*` resolve.
    struct MockBinder {
        destroyed: Arc<AtomicUsize>,
        fail_sink_for: HashSet<PathBuf>,
        fail_open_for: HashSet<PathBuf>,
        created: Mutex<Vec<Orientation>>,
    }

    impl MockBinder {
        fn new() -> Self {
            Self {
                destroyed: Arc::new(AtomicUsize::new(0)),
                fail_sink_for: HashSet::new(),
                fail_open_for: HashSet::new(),
                created: Mutex::new(Vec::new()),
            }
        }

        fn destroyed(&self) -> usize {
            self.destroyed.load(Ordering::SeqCst)
        }
    }

    impl Binder for MockBinder {
        type Source = MockSource;
        type Sink = CountedSink;

        fn resolve(&self, path: &Path) -> Result<DeviceHandle> {
            let name = path.file_name().unwrap().to_string_lossy().to_string();
            if !name.starts_with("eligible") {
                return Err(BridgeError::NotEligible {
                    path: path.to_path_buf(),
                    reason: "driven by hid-generic".to_string(),
                });
            }
            Ok(DeviceHandle {
                root: PathBuf::from("/sys/devices/mock").join(&name),
                id: name.len() as u32,
                source: path.to_path_buf(),
            })
        }

        fn open_source(&self, handle: &DeviceHandle) -> Result<MockSource> {
            if self.fail_open_for.contains(&handle.source) {
                return Err(BridgeError::InterfaceOpen {
                    root: handle.root.clone(),
                    reason: "some interfaces failed to open".to_string(),
                });
            }
            Ok(MockSource::new())
        }

        fn create_sink(&self, layout: &GamepadLayout) -> Result<CountedSink> {
            let created = self.created.lock().unwrap().len();
            let path = PathBuf::from(format!("/dev/input/eligible{}", created));
            self.created.lock().unwrap().push(layout.orientation);
            if self.fail_sink_for.contains(&path) {
                return Err(BridgeError::VirtualDevice {
                    name: layout.name.clone(),
                    source: io::Error::from_raw_os_error(libc::EACCES),
                });
            }
            Ok(CountedSink(MockSink::with_counter(self.destroyed.clone())))
        }
    }

    fn specs(names: &[&str]) -> Vec<DeviceSpec> {
        names
            .iter()
            .map(|name| DeviceSpec::new(format!("/dev/input/{}", name), Orientation::Landscape))
            .collect()
    }

    // ==================== Discovery Tests ====================

    #[tokio::test]
    async fn test_ineligible_candidate_skipped() {
        let binder = MockBinder::new();
        let candidates = specs(&["eligible0", "js1", "eligible1"]);

        let table = build_table(&binder, &candidates, &Config::default()).unwrap();

        assert_eq!(table.len(), 2);
        let sources: Vec<_> = table.slots().iter().map(|s| s.handle().source.clone()).collect();
        assert_eq!(
            sources,
            vec![
                PathBuf::from("/dev/input/eligible0"),
                PathBuf::from("/dev/input/eligible1")
            ]
        );
    }

    #[tokio::test]
    async fn test_no_eligible_device() {
        let binder = MockBinder::new();
        let candidates = specs(&["js0", "js1"]);

        let err = build_table(&binder, &candidates, &Config::default()).unwrap_err();

        assert!(matches!(err, BridgeError::NoEligibleDevice(_)));
        assert_eq!(err.errno(), libc::ENODEV);
    }

    #[tokio::test]
    async fn test_empty_candidate_list() {
        let binder = MockBinder::new();
        let err = build_table(&binder, &[], &Config::default()).unwrap_err();
        assert!(matches!(err, BridgeError::NoEligibleDevice(_)));
    }

    #[tokio::test]
    async fn test_capacity_skips_rest() {
        let binder = MockBinder::new();
        let mut config = Config::default();
        config.discovery.max_devices = 2;
        let candidates = specs(&["eligible0", "eligible1", "eligible2", "eligible3"]);

        let table = build_table(&binder, &candidates, &config).unwrap();

        assert_eq!(table.len(), 2);
        assert_eq!(binder.created.lock().unwrap().len(), 2, "no device created past capacity");
    }

    #[tokio::test]
    async fn test_open_failure_skipped() {
        let mut binder = MockBinder::new();
        binder
            .fail_open_for
            .insert(PathBuf::from("/dev/input/eligible0"));
        let candidates = specs(&["eligible0", "eligible1"]);

        let table = build_table(&binder, &candidates, &Config::default()).unwrap();

        assert_eq!(table.len(), 1);
    }

    // ==================== Orientation Tests ====================

    #[tokio::test]
    async fn test_orientation_captured_per_device() {
        let binder = MockBinder::new();
        let candidates = vec![
            DeviceSpec::new("/dev/input/eligible0", Orientation::Landscape),
            DeviceSpec::new("/dev/input/eligible1", Orientation::Portrait),
            DeviceSpec::new("/dev/input/eligible2", Orientation::Portrait),
        ];

        let table = build_table(&binder, &candidates, &Config::default()).unwrap();

        let orientations: Vec<_> = table.slots().iter().map(|s| s.orientation()).collect();
        assert_eq!(
            orientations,
            vec![Orientation::Landscape, Orientation::Portrait, Orientation::Portrait]
        );
    }

    // ==================== Setup Failure Tests ====================

    #[tokio::test]
    async fn test_setup_failure_isolated() {
        let mut binder = MockBinder::new();
        binder
            .fail_sink_for
            .insert(PathBuf::from("/dev/input/eligible1"));
        let candidates = specs(&["eligible0", "eligible1", "eligible2"]);

        let table = build_table(&binder, &candidates, &Config::default()).unwrap();

        assert_eq!(table.len(), 2);
        drop(table);
        assert_eq!(binder.destroyed(), 2);
    }

    #[tokio::test]
    async fn test_setup_failure_abort_releases_built() {
        let mut binder = MockBinder::new();
        binder
            .fail_sink_for
            .insert(PathBuf::from("/dev/input/eligible2"));
        let mut config = Config::default();
        config.policy.on_setup_failure = FailurePolicy::Abort;
        let candidates = specs(&["eligible0", "eligible1", "eligible2", "eligible3"]);

        let err = build_table(&binder, &candidates, &config).unwrap_err();

        assert!(matches!(err, BridgeError::VirtualDevice { .. }));
        assert_eq!(err.errno(), libc::EACCES);
        assert_eq!(
            binder.destroyed(),
            2,
            "the two devices built before the failure are destroyed exactly once"
        );
    }
}
