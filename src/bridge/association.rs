//! # Association Table
//!
//! Live pairings of one physical remote with one virtual gamepad and its
//! translation state.
//!
//! Each [`Association`] exclusively owns its physical source (registered
//! with the runtime for readiness), its virtual device and its translator.
//! The [`AssociationTable`] owns every association and releases them in
//! reverse order of creation, exactly once, whichever way the process exits.

use std::io;
use tokio::io::unix::AsyncFd;
use tracing::{debug, info, warn};

use crate::controller::events::WiiEvent;
use crate::controller::identity::DeviceHandle;
use crate::controller::source_trait::EventSource;
use crate::controller::translator::{Translation, Translator};
use crate::error::{BridgeError, Result};
use crate::uinput::layout::{GamepadLayout, Orientation};
use crate::uinput::sink_trait::ReportSink;

/// What a single event turned into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    /// Key or accelerometer event went through the translator.
    Translated(Translation),
    /// The device asked for its interfaces to be reopened.
    Reopen,
    /// Event kind the gamepad has no use for.
    Ignored,
}

/// Counters for one drain burst.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub written: u64,
    pub discarded: u64,
    pub omitted: u64,
    pub reopened: u64,
    pub ignored: u64,
}

impl DrainReport {
    fn record(&mut self, handled: Handled) {
        match handled {
            Handled::Translated(Translation::Written) => self.written += 1,
            Handled::Translated(Translation::Discarded) => self.discarded += 1,
            Handled::Translated(Translation::Omitted) => self.omitted += 1,
            Handled::Reopen => self.reopened += 1,
            Handled::Ignored => self.ignored += 1,
        }
    }
}

/// Write side of an association: the virtual device and its templates.
#[derive(Debug)]
pub struct Pad<K: ReportSink> {
    sink: Option<K>,
    translator: Translator,
}

impl<K: ReportSink> Pad<K> {
    pub fn new(sink: K, layout: &GamepadLayout) -> Self {
        Self {
            sink: Some(sink),
            translator: Translator::new(layout),
        }
    }

    /// Routes one physical event
    ///
    /// # Errors
    ///
    /// Returns the virtual device's error when a report cannot be written.
    pub fn on_event(&mut self, event: WiiEvent) -> io::Result<Handled> {
        match event {
            WiiEvent::Key { code, state } => self
                .translator
                .on_key(self.sink.as_mut(), code, state)
                .map(Handled::Translated),
            WiiEvent::Accel { x, y, .. } => self
                .translator
                .on_accel(self.sink.as_mut(), x, y)
                .map(Handled::Translated),
            WiiEvent::Watch => Ok(Handled::Reopen),
            WiiEvent::Other(kind) => {
                debug!("Ignoring event of type {}", kind);
                Ok(Handled::Ignored)
            }
        }
    }

    /// Whether a virtual device is attached.
    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// Destroys the virtual device now. Later events only report the omission.
    pub fn release(&mut self) {
        self.sink = None;
    }

    pub fn translator(&self) -> &Translator {
        &self.translator
    }
}

/// One live (physical device, virtual device, translator) triple
pub struct Association<S: EventSource, K: ReportSink> {
    handle: DeviceHandle,
    orientation: Orientation,
    source: AsyncFd<S>,
    pad: Pad<K>,
    live: bool,
}

impl<S: EventSource, K: ReportSink> std::fmt::Debug for Association<S, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Association")
            .field("handle", &self.handle)
            .field("orientation", &self.orientation)
            .field("live", &self.live)
            .finish_non_exhaustive()
    }
}

impl<S: EventSource, K: ReportSink> Association<S, K> {
    /// Pair a physical source with a virtual device
    ///
    /// Must be called from within a Tokio runtime: the source's readiness
    /// descriptor is registered with the reactor here.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the readiness descriptor cannot be registered.
    pub fn new(handle: DeviceHandle, source: S, sink: K, layout: &GamepadLayout) -> Result<Self> {
        let source = AsyncFd::new(source)?;
        Ok(Self {
            handle,
            orientation: layout.orientation,
            source,
            pad: Pad::new(sink, layout),
            live: true,
        })
    }

    pub fn handle(&self) -> &DeviceHandle {
        &self.handle
    }

    pub fn orientation(&self) -> Orientation {
        self.orientation
    }

    /// False once the association has been tombstoned.
    pub fn is_live(&self) -> bool {
        self.live
    }

    pub fn pad(&self) -> &Pad<K> {
        &self.pad
    }

    pub(crate) fn source(&self) -> &AsyncFd<S> {
        &self.source
    }

    /// Takes the association out of service: its virtual device is destroyed
    /// and the loop stops waiting on it.
    pub fn tombstone(&mut self) {
        if self.live {
            self.live = false;
            self.pad.release();
            warn!(
                "Device {} ({}) taken out of service",
                self.handle.id,
                self.handle.source.display()
            );
        }
    }

    /// Drain every event currently buffered on the physical device
    ///
    /// Readiness is only cleared once the device reports that nothing more
    /// is available, so a burst is never left half-read.
    ///
    /// # Errors
    ///
    /// - `ReportWrite`: a report could not be written to the virtual device
    /// - anything the physical device returns from `dispatch`
    ///
    /// Either ends the drain for this cycle; failed reopen attempts do not.
    pub async fn drain(&mut self) -> Result<DrainReport> {
        let mut report = DrainReport::default();
        let mut guard = self.source.readable_mut().await?;

        loop {
            let event = match guard.get_inner_mut().dispatch() {
                Ok(Some(event)) => event,
                Ok(None) => {
                    guard.clear_ready();
                    return Ok(report);
                }
                Err(e) => {
                    guard.clear_ready();
                    return Err(e);
                }
            };

            let handled = self
                .pad
                .on_event(event)
                .map_err(|source| BridgeError::ReportWrite {
                    device: self.handle.source.clone(),
                    source,
                })?;

            if handled == Handled::Reopen {
                match guard.get_inner_mut().reopen() {
                    Ok(()) => info!("Reopened interfaces of device {}", self.handle.id),
                    Err(e) => warn!("Cannot reopen device {}: {}", self.handle.id, e),
                }
            }
            report.record(handled);
        }
    }
}

/// Ordered, bounded collection of associations
pub struct AssociationTable<S: EventSource, K: ReportSink> {
    slots: Vec<Association<S, K>>,
    capacity: usize,
}

impl<S: EventSource, K: ReportSink> std::fmt::Debug for AssociationTable<S, K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssociationTable")
            .field("len", &self.slots.len())
            .field("capacity", &self.capacity)
            .finish_non_exhaustive()
    }
}

impl<S: EventSource, K: ReportSink> AssociationTable<S, K> {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends an association
    ///
    /// # Errors
    ///
    /// Returns `TableFull` (dropping `association`) when every slot is taken.
    pub fn push(&mut self, association: Association<S, K>) -> Result<()> {
        if self.is_full() {
            return Err(BridgeError::TableFull {
                capacity: self.capacity,
            });
        }
        self.slots.push(association);
        Ok(())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.slots.len() >= self.capacity
    }

    /// Associations still being served.
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_live()).count()
    }

    pub fn slots(&self) -> &[Association<S, K>] {
        &self.slots
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Association<S, K>> {
        self.slots.get_mut(index)
    }

    /// Releases every association, newest first, and returns how many there were.
    pub fn teardown(mut self) -> usize {
        self.release_all()
    }

    fn release_all(&mut self) -> usize {
        let count = self.slots.len();
        while let Some(slot) = self.slots.pop() {
            info!(
                "deassociated from device {} ({})",
                slot.handle.id,
                slot.handle.source.display()
            );
            drop(slot);
        }
        count
    }
}

impl<S: EventSource, K: ReportSink> Drop for AssociationTable<S, K> {
    fn drop(&mut self) {
        self.release_all();
    }
}
