//! Probe strategies: one timed operation per tick.
//!
//! A probe either round-trips a `PING` over the persistent connection
//! (command mode) or opens and closes a fresh TCP connection (connect
//! mode). Either way it yields one elapsed-time sample in microseconds or
//! a [`ProbeError`].

use crate::cli::MonitorConfig;
use crate::connection::{dial, ConnectionManager, ErrorGate, ProbeError};
use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

/// PING command wire data.
const PING_COMMAND: &[u8] = b"PING\r\n";

/// A probe strategy. One call produces one latency sample or one failure;
/// the caller tallies failures into the interval's error count.
#[async_trait]
pub trait Prober: Send {
    /// One-time setup before the sampling loop starts. Failure here is
    /// fatal for the run.
    async fn prepare(&mut self) -> Result<(), ProbeError>;

    /// Execute one probe, returning elapsed microseconds.
    async fn probe(&mut self) -> Result<u64, ProbeError>;
}

/// Build the prober selected by the configuration.
pub fn build_prober(config: &MonitorConfig) -> Box<dyn Prober> {
    match config.probe_mode {
        crate::cli::ProbeMode::CommandLatency => Box::new(CommandProbe::new(config)),
        crate::cli::ProbeMode::ConnectLatency => Box::new(ConnectProbe::new(config)),
    }
}

/// Times a PING round-trip over the persistent connection.
pub struct CommandProbe {
    conn: ConnectionManager,
    reply: Vec<u8>,
}

impl CommandProbe {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            conn: ConnectionManager::new(config),
            reply: Vec::with_capacity(64),
        }
    }

    async fn exchange(&mut self) -> Result<u64, ProbeError> {
        let stream = self.conn.stream()?;
        let start = Instant::now();

        stream.write_all(PING_COMMAND).await?;

        // Read up to the reply terminator. A clean end-of-stream (zero
        // bytes) is tolerated; the reply content is never validated.
        self.reply.clear();
        stream.read_until(b'\n', &mut self.reply).await?;

        Ok(start.elapsed().as_micros() as u64)
    }
}

#[async_trait]
impl Prober for CommandProbe {
    /// Establish the initial connection. Command mode cannot start without
    /// one.
    async fn prepare(&mut self) -> Result<(), ProbeError> {
        self.conn.connect().await
    }

    async fn probe(&mut self) -> Result<u64, ProbeError> {
        // Lazy reconnect after a prior failure; reconnect time is not part
        // of the measured round-trip.
        if !self.conn.is_connected() {
            if let Err(e) = self.conn.connect().await {
                self.conn.gate.failure(&e);
                return Err(e);
            }
        }

        match self.exchange().await {
            Ok(elapsed) => {
                self.conn.gate.success();
                Ok(elapsed)
            }
            Err(e) => {
                self.conn.gate.failure(&e);
                self.conn.invalidate();
                Err(e)
            }
        }
    }
}

impl Drop for CommandProbe {
    fn drop(&mut self) {
        self.conn.close();
    }
}

/// Times TCP connection establishment: dial, then immediately close.
pub struct ConnectProbe {
    addr: String,
    connect_timeout: Duration,
    gate: ErrorGate,
}

impl ConnectProbe {
    pub fn new(config: &MonitorConfig) -> Self {
        Self {
            addr: config.addr(),
            connect_timeout: config.connect_timeout,
            gate: ErrorGate::new(config.error_log.is_some()),
        }
    }
}

#[async_trait]
impl Prober for ConnectProbe {
    /// Connect mode keeps no persistent state, so there is nothing to set
    /// up.
    async fn prepare(&mut self) -> Result<(), ProbeError> {
        Ok(())
    }

    async fn probe(&mut self) -> Result<u64, ProbeError> {
        let start = Instant::now();

        match dial(&self.addr, self.connect_timeout).await {
            Ok(stream) => {
                drop(stream);
                let elapsed = start.elapsed().as_micros() as u64;
                self.gate.success();
                Ok(elapsed)
            }
            Err(e) => {
                self.gate.failure(&e);
                Err(e)
            }
        }
    }
}
