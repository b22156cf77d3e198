//! Telemetry intake: background receive loop feeding the latest-reading cache
//!
//! ## Lifecycle
//!
//! ```text
//!  new() ──▶ Ready ──start()──▶ Running ──stop()──▶ Stopped
//!                                                     (terminal; build a new channel to restart)
//! ```
//!
//! ## Cancellation
//!
//! The loop never blocks longer than the poll interval, so raising the stop flag is
//! noticed promptly. `stop()` then waits a bounded time for the loop to confirm; a loop
//! stuck inside a misbehaving source is detached with a warning instead of hanging the
//! caller. The source is owned by the loop and released when it exits.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, warn};

use kneeguard_core::telemetry::into_readings;
use kneeguard_core::{decode_telemetry, LatestReadingCache, SensorReading, SensorSlot, TelemetryConfig};

use crate::ConnectorError;

/// Blocking-with-timeout source of raw telemetry messages
///
/// `Err(nb::Error::WouldBlock)` means nothing arrived within `timeout`.
/// `Err(nb::Error::Other(ConnectorError::Closed))` ends the receive loop; any other
/// error is logged and the loop keeps polling.
pub trait MessageSource: Send + 'static {
    fn poll_message(&mut self, timeout: Duration) -> nb::Result<Vec<u8>, ConnectorError>;
}

/// In-process source fed through a channel (replays, tests)
#[derive(Debug)]
pub struct ChannelSource {
    rx: Receiver<Vec<u8>>,
}

impl ChannelSource {
    /// Source plus the sender that feeds it; dropping every sender closes the source
    pub fn pair() -> (Self, Sender<Vec<u8>>) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (Self { rx }, tx)
    }
}

impl MessageSource for ChannelSource {
    fn poll_message(&mut self, timeout: Duration) -> nb::Result<Vec<u8>, ConnectorError> {
        match self.rx.recv_timeout(timeout) {
            Ok(payload) => Ok(payload),
            Err(RecvTimeoutError::Timeout) => Err(nb::Error::WouldBlock),
            Err(RecvTimeoutError::Disconnected) => Err(nb::Error::Other(ConnectorError::Closed)),
        }
    }
}

/// Receive-loop counters
#[derive(Debug, Default)]
struct Counters {
    messages: AtomicU64,
    decode_failures: AtomicU64,
    receive_errors: AtomicU64,
    readings_published: AtomicU64,
}

/// Snapshot of the receive-loop counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TelemetryStats {
    /// Messages taken off the source
    pub messages: u64,
    /// Messages dropped because they did not decode
    pub decode_failures: u64,
    /// Source errors other than timeouts
    pub receive_errors: u64,
    /// Readings written into the cache
    pub readings_published: u64,
}

enum ChannelState<S> {
    Ready(S),
    Running {
        stop: Arc<AtomicBool>,
        done: Receiver<()>,
        handle: JoinHandle<()>,
    },
    Stopped,
}

/// Background receive loop publishing into a [`LatestReadingCache`]
pub struct TelemetryChannel<S: MessageSource> {
    state: ChannelState<S>,
    cache: Arc<LatestReadingCache>,
    counters: Arc<Counters>,
    poll_interval: Duration,
    join_timeout: Duration,
}

impl<S: MessageSource> TelemetryChannel<S> {
    pub fn new(source: S, config: &TelemetryConfig) -> Self {
        Self {
            state: ChannelState::Ready(source),
            cache: Arc::new(LatestReadingCache::new()),
            counters: Arc::new(Counters::default()),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            join_timeout: Duration::from_millis(config.join_timeout_ms),
        }
    }

    /// Spawn the receive loop
    pub fn start(&mut self) -> Result<(), ConnectorError> {
        self.start_with(|_| {})
    }

    /// Spawn the receive loop, calling `on_message` with each message's readings after
    /// they are published
    pub fn start_with<F>(&mut self, on_message: F) -> Result<(), ConnectorError>
    where
        F: FnMut(&[(SensorSlot, SensorReading)]) + Send + 'static,
    {
        let source = match std::mem::replace(&mut self.state, ChannelState::Stopped) {
            ChannelState::Ready(source) => source,
            other => {
                self.state = other;
                return Err(ConnectorError::ConfigError("telemetry channel cannot be restarted".into()));
            }
        };

        let stop = Arc::new(AtomicBool::new(false));
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let receive_loop = ReceiveLoop {
            source,
            cache: Arc::clone(&self.cache),
            counters: Arc::clone(&self.counters),
            stop: Arc::clone(&stop),
            poll_interval: self.poll_interval,
            on_message,
        };

        let handle = thread::Builder::new()
            .name("kneeguard-telemetry".into())
            .spawn(move || {
                receive_loop.run();
                let _ = done_tx.send(());
            })
            .map_err(|e| ConnectorError::Transport(format!("cannot spawn receive loop: {e}")))?;

        info!("Telemetry receive loop started");
        self.state = ChannelState::Running { stop, done: done_rx, handle };
        Ok(())
    }

    /// Signal the loop to exit and wait a bounded time for it
    ///
    /// Returns `true` if the loop confirmed its exit. The channel is `Stopped`
    /// afterwards either way.
    pub fn stop(&mut self) -> bool {
        let ChannelState::Running { stop, done, handle } = std::mem::replace(&mut self.state, ChannelState::Stopped)
        else {
            return true;
        };

        stop.store(true, Ordering::Release);
        match done.recv_timeout(self.join_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    error!("Telemetry receive loop panicked");
                }
                info!("Telemetry receive loop stopped");
                true
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Telemetry receive loop did not exit within {} ms, detaching it",
                    self.join_timeout.as_millis()
                );
                false
            }
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, ChannelState::Running { .. })
    }

    /// Most recent reading for `slot`
    pub fn latest(&self, slot: SensorSlot) -> Option<Arc<SensorReading>> {
        self.cache.get_latest(slot)
    }

    /// Shared handle to the cache, for the tick loop
    pub fn cache(&self) -> Arc<LatestReadingCache> {
        Arc::clone(&self.cache)
    }

    pub fn stats(&self) -> TelemetryStats {
        TelemetryStats {
            messages: self.counters.messages.load(Ordering::Relaxed),
            decode_failures: self.counters.decode_failures.load(Ordering::Relaxed),
            receive_errors: self.counters.receive_errors.load(Ordering::Relaxed),
            readings_published: self.counters.readings_published.load(Ordering::Relaxed),
        }
    }
}

impl<S: MessageSource> Drop for TelemetryChannel<S> {
    fn drop(&mut self) {
        self.stop();
    }
}

struct ReceiveLoop<S, F> {
    source: S,
    cache: Arc<LatestReadingCache>,
    counters: Arc<Counters>,
    stop: Arc<AtomicBool>,
    poll_interval: Duration,
    on_message: F,
}

impl<S, F> ReceiveLoop<S, F>
where
    S: MessageSource,
    F: FnMut(&[(SensorSlot, SensorReading)]),
{
    fn run(mut self) {
        let mut sequence = 0u64;

        while !self.stop.load(Ordering::Acquire) {
            match self.source.poll_message(self.poll_interval) {
                Ok(payload) => {
                    sequence += 1;
                    self.handle_message(&payload, sequence);
                }
                Err(nb::Error::WouldBlock) => {}
                Err(nb::Error::Other(ConnectorError::Closed)) => {
                    info!("Telemetry source closed");
                    break;
                }
                Err(nb::Error::Other(err)) => {
                    self.counters.receive_errors.fetch_add(1, Ordering::Relaxed);
                    warn!("Telemetry receive failed: {}", err);
                    thread::sleep(self.poll_interval);
                }
            }
        }

        debug!("Telemetry receive loop exiting after {} messages", sequence);
    }

    fn handle_message(&mut self, payload: &[u8], sequence: u64) {
        self.counters.messages.fetch_add(1, Ordering::Relaxed);

        let sensors = match decode_telemetry(payload) {
            Ok(sensors) => sensors,
            Err(err) => {
                self.counters.decode_failures.fetch_add(1, Ordering::Relaxed);
                warn!("Dropping telemetry message {}: {}", sequence, err);
                return;
            }
        };

        let readings: Vec<(SensorSlot, SensorReading)> = into_readings(sensors, sequence).collect();
        for (slot, reading) in &readings {
            self.cache.publish(*slot, reading.clone());
        }
        self.counters.readings_published.fetch_add(readings.len() as u64, Ordering::Relaxed);
        (self.on_message)(&readings);
    }
}
