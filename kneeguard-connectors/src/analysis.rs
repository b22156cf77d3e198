//! Smoothness-analysis link
//!
//! ## Blocking client
//!
//! ```text
//! connect() ──ok──▶ enabled ──exchange()──▶ write request ─▶ read one response ─▶ metrics
//!     │                 │                         │                 │
//!     └──fail──▶ disabled ◀─── transport error ───┴─────────────────┘
//!                    (windows dropped, no reconnect)      decode error: window dropped, stays enabled
//! ```
//!
//! The connection is made once. Socket read/write timeouts bound how long an exchange can
//! hold the caller.
//!
//! ## Worker
//!
//! [`AnalysisWorker`] runs the same client on its own thread. Windows go in through a
//! one-slot channel (a window arriving while the previous one is still in flight is
//! dropped), results come back through a second channel and are picked up on a later
//! tick. Shutdown abandons the in-flight exchange instead of waiting for it.

use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use log::{debug, error, info, warn};

use kneeguard_core::framing::{read_json, write_json};
use kneeguard_core::{
    AnalysisConfig, AnalysisRequest, KneeGuardError, KneeGuardResult, SmoothnessAnalyzer, SmoothnessMetrics,
};

use crate::ConnectorError;

/// Exchange counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalysisStats {
    pub exchanges: u64,
    pub failures: u64,
}

/// Blocking request/response client for the analysis service
#[derive(Debug)]
pub struct AnalysisClient {
    config: AnalysisConfig,
    stream: Option<TcpStream>,
    pending: Option<SmoothnessMetrics>,
    stats: AnalysisStats,
}

impl AnalysisClient {
    /// Connect to `config.addr` with the configured timeouts
    pub fn connect(config: &AnalysisConfig) -> Result<Self, ConnectorError> {
        if !config.enabled {
            return Err(ConnectorError::NotConnected);
        }

        let addr = resolve(&config.addr)?;
        let stream = TcpStream::connect_timeout(&addr, Duration::from_millis(config.connect_timeout_ms))
            .map_err(|e| ConnectorError::Transport(format!("cannot connect to {addr}: {e}")))?;

        let io_timeout = Some(Duration::from_millis(config.io_timeout_ms));
        stream
            .set_read_timeout(io_timeout)
            .and_then(|_| stream.set_write_timeout(io_timeout))
            .and_then(|_| stream.set_nodelay(true))
            .map_err(|e| ConnectorError::Transport(e.to_string()))?;

        info!("Connected to analysis service at {} ({:?} framing)", addr, config.framing);
        Ok(Self { config: config.clone(), stream: Some(stream), pending: None, stats: AnalysisStats::default() })
    }

    /// Connect, or fall back to a disabled client that drops every window
    pub fn connect_or_disable(config: &AnalysisConfig) -> Self {
        match Self::connect(config) {
            Ok(client) => client,
            Err(err) => {
                if config.enabled {
                    warn!("Smoothness analysis disabled: {}", err);
                }
                Self::disabled(config)
            }
        }
    }

    /// Client with no connection
    pub fn disabled(config: &AnalysisConfig) -> Self {
        Self { config: config.clone(), stream: None, pending: None, stats: AnalysisStats::default() }
    }

    /// Send one window and block for its metrics
    ///
    /// A transport failure disables the client for the rest of the session.
    pub fn exchange(&mut self, request: &AnalysisRequest) -> KneeGuardResult<SmoothnessMetrics> {
        let framing = self.config.framing;
        let limit = self.config.response_limit();
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| KneeGuardError::Transport("analysis link is disabled".into()))?;

        self.stats.exchanges += 1;
        let result = write_json(stream, framing, request)
            .and_then(|_| read_json::<SmoothnessMetrics, _>(stream, framing, limit))
            .and_then(SmoothnessMetrics::validated);

        match &result {
            Ok(metrics) => debug!("Analysis returned SPARC={} LDLJ={}", metrics.sparc, metrics.ldlj),
            Err(err) if err.is_transport() => {
                self.stats.failures += 1;
                error!("Analysis link failed, disabling smoothness analysis: {}", err);
                self.close();
            }
            Err(err) => {
                self.stats.failures += 1;
                warn!("Analysis response rejected: {}", err);
            }
        }
        result
    }

    pub fn stats(&self) -> AnalysisStats {
        self.stats
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

impl SmoothnessAnalyzer for AnalysisClient {
    fn submit(&mut self, request: AnalysisRequest) -> KneeGuardResult<()> {
        let metrics = self.exchange(&request)?;
        self.pending = Some(metrics);
        Ok(())
    }

    fn poll_metrics(&mut self) -> Option<SmoothnessMetrics> {
        self.pending.take()
    }

    fn is_enabled(&self) -> bool {
        self.stream.is_some()
    }

    fn shutdown(&mut self) {
        self.close();
    }
}

fn resolve(addr: &str) -> Result<SocketAddr, ConnectorError> {
    addr.to_socket_addrs()
        .map_err(|e| ConnectorError::ConfigError(format!("bad analysis address {addr}: {e}")))?
        .next()
        .ok_or_else(|| ConnectorError::ConfigError(format!("analysis address {addr} resolves to nothing")))
}

/// Runs an [`AnalysisClient`] on a dedicated thread
#[derive(Debug)]
pub struct AnalysisWorker {
    requests: Option<Sender<AnalysisRequest>>,
    results: Receiver<SmoothnessMetrics>,
    enabled: Arc<AtomicBool>,
}

impl AnalysisWorker {
    /// Move `client` onto a worker thread
    pub fn spawn(mut client: AnalysisClient) -> Result<Self, ConnectorError> {
        let (request_tx, request_rx) = crossbeam_channel::bounded::<AnalysisRequest>(1);
        let (result_tx, result_rx) = crossbeam_channel::unbounded();
        let enabled = Arc::new(AtomicBool::new(client.is_enabled()));
        let worker_enabled = Arc::clone(&enabled);

        thread::Builder::new()
            .name("kneeguard-analysis".into())
            .spawn(move || {
                for request in request_rx {
                    if let Ok(metrics) = client.exchange(&request) {
                        if result_tx.send(metrics).is_err() {
                            break;
                        }
                    }
                    if !client.is_enabled() {
                        worker_enabled.store(false, Ordering::Release);
                        break;
                    }
                }
                debug!("Analysis worker exiting");
            })
            .map_err(|e| ConnectorError::Transport(format!("cannot spawn analysis worker: {e}")))?;

        Ok(Self { requests: Some(request_tx), results: result_rx, enabled })
    }

    /// Queue a window; returns immediately
    pub fn submit(&mut self, request: AnalysisRequest) -> KneeGuardResult<()> {
        let Some(requests) = &self.requests else {
            return Err(KneeGuardError::Transport("analysis worker is shut down".into()));
        };
        if !self.enabled.load(Ordering::Acquire) {
            return Err(KneeGuardError::Transport("analysis link is disabled".into()));
        }

        match requests.try_send(request) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                Err(KneeGuardError::Transport("previous window still in flight, window dropped".into()))
            }
            Err(TrySendError::Disconnected(_)) => {
                self.enabled.store(false, Ordering::Release);
                Err(KneeGuardError::Transport("analysis worker exited".into()))
            }
        }
    }

    /// Newest finished result, if any
    pub fn poll_metrics(&mut self) -> Option<SmoothnessMetrics> {
        self.results.try_iter().last()
    }

    /// Stop accepting windows; any in-flight exchange is abandoned
    pub fn shutdown(&mut self) {
        if self.requests.take().is_some() {
            debug!("Analysis worker detached");
        }
        self.enabled.store(false, Ordering::Release);
    }
}

impl SmoothnessAnalyzer for AnalysisWorker {
    fn submit(&mut self, request: AnalysisRequest) -> KneeGuardResult<()> {
        AnalysisWorker::submit(self, request)
    }

    fn poll_metrics(&mut self) -> Option<SmoothnessMetrics> {
        AnalysisWorker::poll_metrics(self)
    }

    fn is_enabled(&self) -> bool {
        self.requests.is_some() && self.enabled.load(Ordering::Acquire)
    }

    fn shutdown(&mut self) {
        AnalysisWorker::shutdown(self)
    }
}

impl Drop for AnalysisWorker {
    fn drop(&mut self) {
        self.shutdown();
    }
}
