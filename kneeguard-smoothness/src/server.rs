//! TCP analysis service
//!
//! Speaks the same request/response protocol the session's analysis client uses:
//! one [`AnalysisRequest`] in, one metrics document out, repeated for as long as the
//! peer keeps the connection open.
//!
//! ```text
//! client ──request──▶ decode ──▶ analyze ──▶ {"message","sparc","ldlj"}
//!                                   │
//!                                   └── unscorable window ──▶ {"error": "..."}
//! ```
//!
//! An error document has no metric keys, so the client treats it as a decode failure
//! and drops that window while keeping the link.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread;

use log::{debug, info, warn};
use serde_json::json;

use kneeguard_core::constants::network::MAX_FRAME_BYTES;
use kneeguard_core::framing::{read_json, write_json, Framing};
use kneeguard_core::{AnalysisRequest, KneeGuardError, KneeGuardResult};

use crate::analyze;

/// Per-connection settings
#[derive(Debug, Clone, Copy, PartialEq)]
struct Handler {
    framing: Framing,
    sample_rate: Option<f64>,
}

/// Listening analysis service
#[derive(Debug)]
pub struct AnalysisServer {
    listener: TcpListener,
    handler: Handler,
}

impl AnalysisServer {
    /// Bind `addr`; port 0 picks a free port
    pub fn bind(addr: &str, framing: Framing) -> KneeGuardResult<Self> {
        let listener = TcpListener::bind(addr)
            .map_err(|e| KneeGuardError::Transport(format!("cannot bind {addr}: {e}")))?;
        Ok(Self { listener, handler: Handler { framing, sample_rate: None } })
    }

    /// Fix the sampling rate instead of deriving it from the sample deltas
    pub fn with_sample_rate(mut self, sample_rate: Option<f64>) -> Self {
        self.handler.sample_rate = sample_rate;
        self
    }

    pub fn local_addr(&self) -> KneeGuardResult<SocketAddr> {
        self.listener.local_addr().map_err(|e| KneeGuardError::Transport(e.to_string()))
    }

    /// Accept connections forever, one thread each
    pub fn serve(&self) -> KneeGuardResult<()> {
        info!("Analysis server listening on {} ({:?} framing)", self.local_addr()?, self.handler.framing);
        for conn in self.listener.incoming() {
            let stream = conn.map_err(|e| KneeGuardError::Transport(e.to_string()))?;
            let handler = self.handler;
            thread::Builder::new()
                .name("kneeguard-analysis-conn".into())
                .spawn(move || handler.handle(stream))
                .map_err(|e| KneeGuardError::Transport(format!("cannot spawn connection thread: {e}")))?;
        }
        Ok(())
    }

    /// Serve a single connection on the calling thread; returns windows answered
    pub fn serve_one(&self) -> KneeGuardResult<usize> {
        let (stream, _) = self.listener.accept().map_err(|e| KneeGuardError::Transport(e.to_string()))?;
        Ok(self.handler.handle(stream))
    }
}

impl Handler {
    fn handle(self, mut stream: TcpStream) -> usize {
        let peer = stream.peer_addr().map(|a| a.to_string()).unwrap_or_else(|_| "unknown".into());
        info!("Analysis client connected: {}", peer);

        let mut answered = 0;
        loop {
            let request: AnalysisRequest = match read_json(&mut stream, self.framing, MAX_FRAME_BYTES) {
                Ok(request) => request,
                Err(KneeGuardError::Transport(_)) => break,
                Err(err) => {
                    // Stream position is unknown after a bad document
                    warn!("Dropping connection from {} after bad request: {}", peer, err);
                    let _ = write_json(&mut stream, self.framing, &json!({ "error": err.to_string() }));
                    break;
                }
            };

            let response = match analyze(&request, self.sample_rate) {
                Ok(metrics) => {
                    debug!(
                        "Window of {} samples at t={:.2}s: SPARC={} LDLJ={}",
                        request.quaternions.len(),
                        request.time,
                        metrics.sparc,
                        metrics.ldlj
                    );
                    json!({ "message": "Data received successfully", "sparc": metrics.sparc, "ldlj": metrics.ldlj })
                }
                Err(err) => {
                    warn!("Window from {} not scored: {}", peer, err);
                    json!({ "error": err.to_string() })
                }
            };

            if let Err(err) = write_json(&mut stream, self.framing, &response) {
                warn!("Cannot reply to {}: {}", peer, err);
                break;
            }
            answered += 1;
        }

        info!("Analysis client {} disconnected after {} windows", peer, answered);
        answered
    }
}
