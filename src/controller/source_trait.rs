//! Trait abstraction for physical event sources to enable testing

use std::os::unix::io::AsRawFd;

use crate::controller::events::WiiEvent;
use crate::error::Result;

/// Trait for a physical device the multiplexing loop can wait on
///
/// The raw descriptor is the readiness descriptor: it becomes readable
/// whenever [`dispatch`](EventSource::dispatch) may have something to return.
pub trait EventSource: AsRawFd {
    /// Return the next buffered event, or `Ok(None)` when nothing is
    /// available right now.
    fn dispatch(&mut self) -> Result<Option<WiiEvent>>;

    /// Reopen the sub-interfaces that were requested at open time.
    fn reopen(&mut self) -> Result<()>;
}
