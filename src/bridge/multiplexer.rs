//! # Multiplexing Loop
//!
//! Waits on every live association at once and drains whichever are ready.
//!
//! ## Cycle
//!
//! 1. Stop if cancellation was requested
//! 2. Wait until at least one live device is readable, or cancellation
//! 3. For each ready device, in table order, drain all buffered events
//!
//! Cancellation is never observed in the middle of a drain.

use std::future::poll_fn;
use std::task::Poll;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::bridge::association::AssociationTable;
use crate::config::FailurePolicy;
use crate::controller::source_trait::EventSource;
use crate::error::{BridgeError, Result};
use crate::uinput::sink_trait::ReportSink;

/// Counters reported at shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Completed wait cycles.
    pub cycles: u64,
    /// Key and accelerometer events written to virtual devices.
    pub events: u64,
    /// Key events dropped for an out-of-range code or state.
    pub discarded: u64,
    /// Associations taken out of service after a write failure.
    pub isolated: u64,
}

/// Run the loop until `cancel` fires
///
/// # Arguments
///
/// * `table` - Associations to serve
/// * `cancel` - Stops the loop before the next wait
/// * `on_write_failure` - Whether a failed report write takes out only
///   that association or the whole loop
///
/// # Errors
///
/// - `ReportWrite`: a write failed and the policy is `Abort`, or every
///   association was isolated (the last failure is returned)
/// - `Io`: the runtime could not poll a readiness descriptor
pub async fn run<S, K>(
    table: &mut AssociationTable<S, K>,
    cancel: &CancellationToken,
    on_write_failure: FailurePolicy,
) -> Result<LoopStats>
where
    S: EventSource,
    K: ReportSink,
{
    let mut stats = LoopStats::default();
    let mut last_failure = None;
    info!("Serving {} device(s)", table.live_count());

    loop {
        if cancel.is_cancelled() {
            break;
        }
        if table.live_count() == 0 {
            warn!("No device left to serve");
            return match last_failure {
                Some(e) => Err(e),
                None => Ok(stats),
            };
        }

        let ready = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            ready = wait_ready(table) => ready?,
        };
        stats.cycles += 1;

        for index in ready {
            let Some(slot) = table.get_mut(index) else {
                continue;
            };

            match slot.drain().await {
                Ok(report) => {
                    stats.events += report.written;
                    stats.discarded += report.discarded;
                    if report.omitted > 0 {
                        debug!(
                            "Device {}: {} event(s) had no virtual device",
                            slot.handle().id,
                            report.omitted
                        );
                    }
                }
                Err(e @ BridgeError::ReportWrite { .. }) => match on_write_failure {
                    FailurePolicy::Abort => {
                        error!("{}", e);
                        return Err(e);
                    }
                    FailurePolicy::Isolate => {
                        error!("{}", e);
                        slot.tombstone();
                        stats.isolated += 1;
                        last_failure = Some(e);
                    }
                },
                Err(e) => {
                    warn!("Device {}: drain aborted: {}", slot.handle().id, e);
                }
            }
        }
    }

    Ok(stats)
}

/// Indices of live associations whose readiness descriptor is readable.
async fn wait_ready<S, K>(table: &AssociationTable<S, K>) -> std::io::Result<Vec<usize>>
where
    S: EventSource,
    K: ReportSink,
{
    poll_fn(|cx| {
        let mut ready = Vec::new();
        for (index, slot) in table.slots().iter().enumerate() {
            if !slot.is_live() {
                continue;
            }
            // Dropping the guard without clearing it keeps the readiness for the drain.
            match slot.source().poll_read_ready(cx) {
                Poll::Ready(Ok(_guard)) => ready.push(index),
                Poll::Ready(Err(e)) => return Poll::Ready(Err(e)),
                Poll::Pending => {}
            }
        }
        if ready.is_empty() {
            Poll::Pending
        } else {
            Poll::Ready(Ok(ready))
        }
    })
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridge::association::Association;
    use crate::config::GamepadConfig;
    use crate::controller::events::{WiiEvent, WiiKey};
    use crate::controller::identity::DeviceHandle;
    use crate::controller::source_trait::mocks::MockSource;
    use crate::uinput::layout::{GamepadLayout, Orientation};
    use crate::uinput::sink_trait::mocks::{CountedSink, MockSink};
    use evdev::{EventType, Key};
    use std::io;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    const SYN: (EventType, u16, i32) = (EventType::SYNCHRONIZATION, 0, 0);

    fn handle(id: u32) -> DeviceHandle {
        DeviceHandle {
            root: PathBuf::from(format!("/sys/devices/hid/0005:057E:0306.{:04X}", id)),
            id,
            source: PathBuf::from(format!("/dev/input/js{}", id)),
        }
    }

    fn associate<K: ReportSink>(
        table: &mut AssociationTable<MockSource, K>,
        id: u32,
        source: MockSource,
        sink: K,
        orientation: Orientation,
    ) {
        let layout = GamepadLayout::new(&GamepadConfig::default(), orientation);
        table
            .push(Association::new(handle(id), source, sink, &layout).unwrap())
            .unwrap();
    }

    fn up_pressed() -> WiiEvent {
        WiiEvent::Key {
            code: WiiKey::Up.code(),
            state: 1,
        }
    }

    fn cancel_after(token: &CancellationToken, millis: u64) {
        let token = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            token.cancel();
        });
    }

    // ==================== Cancellation Tests ====================

    #[tokio::test]
    async fn test_cancelled_before_wait() {
        let mut table = AssociationTable::new(1);
        associate(&mut table, 0, MockSource::new(), MockSink::new(), Orientation::Portrait);
        let token = CancellationToken::new();
        token.cancel();

        let stats = run(&mut table, &token, FailurePolicy::Isolate).await.unwrap();

        assert_eq!(stats.cycles, 0, "no wait after cancellation");
    }

    #[tokio::test]
    async fn test_cancel_interrupts_idle_wait() {
        let mut table = AssociationTable::new(1);
        associate(&mut table, 0, MockSource::new(), MockSink::new(), Orientation::Portrait);
        let token = CancellationToken::new();
        cancel_after(&token, 20);

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            run(&mut table, &token, FailurePolicy::Isolate),
        )
        .await;

        let stats = result.expect("blocked wait must observe cancellation").unwrap();
        assert_eq!(stats.cycles, 0);
    }

    #[tokio::test]
    async fn test_cancelled_loop_tears_down_once() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut table = AssociationTable::new(2);
        for id in 0..2 {
            let sink = CountedSink(MockSink::with_counter(counter.clone()));
            let source = MockSource::with_events(&[up_pressed()]);
            associate(&mut table, id, source, sink, Orientation::Landscape);
        }
        let token = CancellationToken::new();
        cancel_after(&token, 50);

        run(&mut table, &token, FailurePolicy::Isolate).await.unwrap();
        table.teardown();

        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    // ==================== Routing Tests ====================

    #[tokio::test]
    async fn test_portrait_and_landscape_up() {
        let portrait = MockSink::new();
        let landscape = MockSink::new();
        let mut table = AssociationTable::new(2);
        let first = MockSource::with_events(&[up_pressed()]);
        associate(&mut table, 0, first, portrait.clone(), Orientation::Portrait);
        let second = MockSource::with_events(&[up_pressed()]);
        associate(&mut table, 1, second, landscape.clone(), Orientation::Landscape);
        let token = CancellationToken::new();
        cancel_after(&token, 50);

        let stats = run(&mut table, &token, FailurePolicy::Isolate).await.unwrap();

        assert_eq!(
            portrait.get_written(),
            vec![(EventType::KEY, Key::BTN_DPAD_UP.code(), 1), SYN]
        );
        assert_eq!(
            landscape.get_written(),
            vec![(EventType::KEY, Key::BTN_DPAD_LEFT.code(), 1), SYN]
        );
        assert_eq!(stats.events, 2);
        assert!(stats.cycles >= 1);
    }

    #[tokio::test]
    async fn test_burst_is_drained_in_one_cycle() {
        let events: Vec<WiiEvent> = (0..20)
            .map(|i| WiiEvent::Accel { x: i, y: -i, z: 0 })
            .collect();
        let source = MockSource::with_events(&events);
        let pending = source.events.clone();
        let sink = MockSink::new();
        let mut table = AssociationTable::new(1);
        associate(&mut table, 0, source, sink.clone(), Orientation::Portrait);
        let token = CancellationToken::new();
        cancel_after(&token, 50);

        let stats = run(&mut table, &token, FailurePolicy::Isolate).await.unwrap();

        assert!(pending.lock().unwrap().is_empty());
        assert_eq!(stats.events, 20);
        assert_eq!(stats.cycles, 1, "one readiness notification, one drain");
        assert_eq!(sink.get_written().len(), 60);
    }

    #[tokio::test]
    async fn test_discarded_events_counted() {
        let source = MockSource::with_events(&[
            WiiEvent::Key { code: 11, state: 1 },
            up_pressed(),
        ]);
        let mut table = AssociationTable::new(1);
        associate(&mut table, 0, source, MockSink::new(), Orientation::Portrait);
        let token = CancellationToken::new();
        cancel_after(&token, 50);

        let stats = run(&mut table, &token, FailurePolicy::Isolate).await.unwrap();

        assert_eq!(stats.discarded, 1);
        assert_eq!(stats.events, 1);
    }

    // ==================== Failure Policy Tests ====================

    #[tokio::test]
    async fn test_write_failure_isolated() {
        let counter = Arc::new(AtomicUsize::new(0));
        let broken = MockSink::with_counter(counter.clone());
        broken.set_write_error(io::ErrorKind::BrokenPipe);
        let healthy = MockSink::new();

        let mut table = AssociationTable::new(2);
        let first = MockSource::with_events(&[up_pressed()]);
        associate(&mut table, 0, first, CountedSink(broken), Orientation::Portrait);
        let second = MockSource::with_events(&[up_pressed()]);
        associate(&mut table, 1, second, CountedSink(healthy.clone()), Orientation::Portrait);
        let token = CancellationToken::new();
        cancel_after(&token, 50);

        let stats = run(&mut table, &token, FailurePolicy::Isolate).await.unwrap();

        assert_eq!(stats.isolated, 1);
        assert_eq!(table.live_count(), 1);
        assert_eq!(counter.load(Ordering::SeqCst), 1, "broken device destroyed immediately");
        assert_eq!(healthy.get_written().len(), 2, "other device still served");
    }

    #[tokio::test]
    async fn test_write_failure_aborts() {
        let broken = MockSink::new();
        broken.set_write_error(io::ErrorKind::BrokenPipe);
        let mut table = AssociationTable::new(1);
        let source = MockSource::with_events(&[up_pressed()]);
        associate(&mut table, 0, source, broken, Orientation::Portrait);
        let token = CancellationToken::new();

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            run(&mut table, &token, FailurePolicy::Abort),
        )
        .await
        .expect("abort must end the loop")
        .unwrap_err();

        assert!(matches!(err, BridgeError::ReportWrite { .. }));
    }

    #[tokio::test]
    async fn test_loop_fails_when_all_isolated() {
        let mut table = AssociationTable::new(2);
        for id in 0..2 {
            let broken = MockSink::new();
            broken.set_write_error(io::ErrorKind::BrokenPipe);
            let source = MockSource::with_events(&[up_pressed()]);
            associate(&mut table, id, source, broken, Orientation::Portrait);
        }
        let token = CancellationToken::new();

        let err = tokio::time::timeout(
            Duration::from_secs(5),
            run(&mut table, &token, FailurePolicy::Isolate),
        )
        .await
        .expect("loop must end without live devices")
        .unwrap_err();

        assert!(matches!(err, BridgeError::ReportWrite { .. }));
        assert_eq!(err.errno(), libc::EIO, "mock errors carry no os code");
        assert_eq!(table.live_count(), 0);
    }

    #[tokio::test]
    async fn test_dispatch_error_keeps_device() {
        let source = MockSource::with_events(&[up_pressed()]);
        source.set_dispatch_error(io::ErrorKind::Other);
        let mut table = AssociationTable::new(1);
        associate(&mut table, 0, source, MockSink::new(), Orientation::Portrait);
        let token = CancellationToken::new();
        cancel_after(&token, 50);

        let stats = run(&mut table, &token, FailurePolicy::Abort).await.unwrap();

        assert_eq!(stats.isolated, 0);
        assert_eq!(table.live_count(), 1, "read faults are not write faults");
    }
}
