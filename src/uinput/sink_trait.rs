//! Trait abstraction for virtual device reports to enable testing

use evdev::InputEvent;
use std::io;

/// Trait for the write side of a virtual input device
pub trait ReportSink {
    /// Write one report. Reports are written individually and in call order;
    /// nothing is batched and no synchronization report is added implicitly.
    fn write_report(&mut self, report: &InputEvent) -> io::Result<()>;
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use evdev::EventType;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    /// Mock virtual device for testing
    #[derive(Clone)]
    pub struct MockSink {
        pub written: Arc<Mutex<Vec<(EventType, u16, i32)>>>,
        pub write_error: Arc<Mutex<Option<io::ErrorKind>>>,
        pub destroyed: Arc<AtomicUsize>,
    }

    impl MockSink {
        pub fn new() -> Self {
            Self {
                written: Arc::new(Mutex::new(Vec::new())),
                write_error: Arc::new(Mutex::new(None)),
                destroyed: Arc::new(AtomicUsize::new(0)),
            }
        }

        /// Mock whose drops are counted on a shared counter.
        pub fn with_counter(destroyed: Arc<AtomicUsize>) -> Self {
            Self {
                destroyed,
                ..Self::new()
            }
        }

        pub fn get_written(&self) -> Vec<(EventType, u16, i32)> {
            self.written.lock().unwrap().clone()
        }

        pub fn set_write_error(&self, error: io::ErrorKind) {
            *self.write_error.lock().unwrap() = Some(error);
        }

        pub fn destroyed(&self) -> usize {
            self.destroyed.load(Ordering::SeqCst)
        }
    }

    impl ReportSink for MockSink {
        fn write_report(&mut self, report: &InputEvent) -> io::Result<()> {
            if let Some(error) = *self.write_error.lock().unwrap() {
                return Err(io::Error::new(error, "Mock write error"));
            }
            self.written
                .lock()
                .unwrap()
                .push((report.event_type(), report.code(), report.value()));
            Ok(())
        }
    }

    /// A destroyed virtual device is one whose handle was dropped.
    pub struct CountedSink(pub MockSink);

    impl ReportSink for CountedSink {
        fn write_report(&mut self, report: &InputEvent) -> io::Result<()> {
            self.0.write_report(report)
        }
    }

    impl Drop for CountedSink {
        fn drop(&mut self) {
            self.0.destroyed.fetch_add(1, Ordering::SeqCst);
        }
    }
}
