//! ZeroMQ PULL source for the sensor feeder
//!
//! The feeder PUSHes one JSON document per frame to a locally bound PULL socket. The
//! socket lives on a single-worker tokio runtime owned by the source; each poll blocks
//! the receive-loop thread on one `recv` bounded by the poll timeout.

use std::time::Duration;

use log::info;
use tokio::runtime::{Builder, Runtime};
use zeromq::{PullSocket, Socket, SocketRecv};

use crate::telemetry::MessageSource;
use crate::ConnectorError;

/// Bound PULL socket plus the runtime that drives it
pub struct ZmqPullSource {
    runtime: Runtime,
    socket: PullSocket,
    endpoint: String,
}

impl ZmqPullSource {
    /// Bind a PULL socket on `endpoint` (e.g. `tcp://127.0.0.1:5555`)
    pub fn bind(endpoint: &str) -> Result<Self, ConnectorError> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("kneeguard-zmq")
            .enable_all()
            .build()
            .map_err(|e| ConnectorError::Transport(format!("cannot start socket runtime: {e}")))?;

        let mut socket = PullSocket::new();
        let bound = runtime
            .block_on(socket.bind(endpoint))
            .map_err(|e| ConnectorError::Transport(format!("cannot bind {endpoint}: {e}")))?;

        info!("Telemetry PULL socket bound on {}", bound);
        Ok(Self { runtime, socket, endpoint: bound.to_string() })
    }

    /// Endpoint actually bound (resolves wildcard ports)
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl MessageSource for ZmqPullSource {
    fn poll_message(&mut self, timeout: Duration) -> nb::Result<Vec<u8>, ConnectorError> {
        let socket = &mut self.socket;
        let received = self.runtime.block_on(async { tokio::time::timeout(timeout, socket.recv()).await });

        match received {
            Err(_elapsed) => Err(nb::Error::WouldBlock),
            Ok(Ok(message)) => {
                let payload = message.into_vec().iter().flat_map(|frame| frame.iter().copied()).collect();
                Ok(payload)
            }
            Ok(Err(err)) => Err(nb::Error::Other(ConnectorError::Transport(err.to_string()))),
        }
    }
}
