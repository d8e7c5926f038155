//! Connection ownership and lifecycle for the probe loop.
//!
//! A [`ConnectionManager`] owns the single persistent connection used by
//! command-latency probes. The connection is established eagerly at startup
//! and re-established lazily inside a probe after a failure invalidates it.
//! Connect-latency probes dial fresh through [`dial`] and keep nothing.

use crate::cli::MonitorConfig;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, error};

/// Errors produced by the network layer of a probe.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("no connection to server")]
    NotConnected,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Open a TCP connection to `addr`, bounded by `connect_timeout`.
pub async fn dial(addr: &str, connect_timeout: Duration) -> Result<TcpStream, ProbeError> {
    match timeout(connect_timeout, TcpStream::connect(addr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(ProbeError::Io(e)),
        Err(_) => Err(ProbeError::ConnectTimeout(connect_timeout)),
    }
}

/// Suppresses repeated error-log entries during a run of consecutive
/// failures. The first failure after a success is logged; later ones are
/// not, until a success re-arms the gate.
#[derive(Debug)]
pub struct ErrorGate {
    enabled: bool,
    logged: bool,
}

impl ErrorGate {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            logged: false,
        }
    }

    /// Report a failure; logs only the first of a consecutive run.
    pub fn failure(&mut self, err: &ProbeError) {
        if self.enabled && !self.logged {
            error!("Probe failed: {}", err);
            self.logged = true;
        }
    }

    /// Report a success, re-arming the gate.
    pub fn success(&mut self) {
        self.logged = false;
    }
}

/// Exclusive owner of the persistent server connection.
///
/// The stream is wrapped in a [`BufReader`] so reply lines can be consumed
/// up to the terminator without extra syscalls per byte. `None` means
/// disconnected; the next probe reconnects.
pub struct ConnectionManager {
    addr: String,
    connect_timeout: Duration,
    auth_secret: Option<String>,
    stream: Option<BufReader<TcpStream>>,
    pub gate: ErrorGate,
}

impl ConnectionManager {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            addr: config.addr(),
            connect_timeout: config.connect_timeout,
            auth_secret: config.auth_secret.clone(),
            stream: None,
            gate: ErrorGate::new(config.error_log.is_some()),
        }
    }

    /// Dial the server and, when a secret is configured, send the AUTH
    /// command over the new connection. The AUTH reply is not awaited;
    /// replies are only ever scanned for line terminators.
    pub async fn connect(&mut self) -> Result<(), ProbeError> {
        let mut stream = dial(&self.addr, self.connect_timeout).await?;

        if let Some(secret) = &self.auth_secret {
            let auth = format!("AUTH {}\r\n", secret);
            stream.write_all(auth.as_bytes()).await?;
        }

        debug!("Connected to {}", self.addr);
        self.stream = Some(BufReader::new(stream));
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Drop the connection so the next probe reconnects.
    pub fn invalidate(&mut self) {
        self.stream = None;
    }

    /// Mutable access to the live connection for a probe round-trip.
    pub fn stream(&mut self) -> Result<&mut BufReader<TcpStream>, ProbeError> {
        self.stream.as_mut().ok_or(ProbeError::NotConnected)
    }

    /// Close the connection, releasing the socket.
    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            debug!("Closed connection to {}", self.addr);
        }
    }
}
