//! Run configuration.
//!
//! The CLI (or a test harness) builds one immutable [`RunConfig`] per run;
//! sessions consume it at creation time and never mutate it.

use super::constants;
use super::error::NetmarkError;
use crate::transport::wire::{sizes, Framing};

/// Which side of the benchmark this process runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Receives packets, tracks loss, reports per-interval statistics.
    Server,
    /// Generates packets at the configured rate.
    Client,
}

/// Transport flavor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Proto {
    /// Length-prefixed frames over a TCP connection.
    Tcp,
    /// One frame per datagram.
    Udp,
}

impl Proto {
    /// Wire framing used by this transport.
    pub fn framing(self) -> Framing {
        match self {
            Proto::Tcp => Framing::Stream,
            Proto::Udp => Framing::Datagram,
        }
    }
}

/// Immutable configuration for one benchmark run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Server or client.
    pub role: Role,
    /// TCP or UDP.
    pub proto: Proto,
    /// Server host (ignored in server mode).
    pub host: String,
    /// Server port.
    pub port: u16,
    /// Target rate in packets per second.
    pub rate: u32,
    /// Wire size of each packet in bytes, including framing overhead.
    pub payload: u32,
    /// Outstanding sends allowed before waiting for completions.
    pub bundle: u32,
    /// Stop the client after this many packets; `None` runs until
    /// interrupted.
    pub limit: Option<u64>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            role: Role::Client,
            proto: Proto::Udp,
            host: constants::DEFAULT_HOST.to_string(),
            port: constants::DEFAULT_PORT,
            rate: constants::DEFAULT_RATE,
            payload: constants::DEFAULT_PAYLOAD,
            bundle: constants::DEFAULT_BUNDLE,
            limit: None,
        }
    }
}

impl RunConfig {
    /// Validate the configuration before any session is created.
    ///
    /// A payload smaller than the per-packet framing overhead cannot be
    /// encoded; the process reports it and exits rather than running
    /// degenerate.
    pub fn validate(&self) -> Result<(), NetmarkError> {
        let overhead = self.proto.framing().overhead();
        if (self.payload as usize) < overhead {
            return Err(NetmarkError::Config(format!(
                "payload needs to be at least {} bytes (framing overhead)",
                overhead
            )));
        }
        // The stream length prefix is a u16; an oversized frame would
        // silently announce a truncated body.
        if self.payload as usize > sizes::MAX_FRAME_SIZE {
            return Err(NetmarkError::Config(format!(
                "payload must not exceed {} bytes",
                sizes::MAX_FRAME_SIZE
            )));
        }
        if self.rate == 0 {
            return Err(NetmarkError::Config("rate must be at least 1".into()));
        }
        if self.bundle == 0 {
            return Err(NetmarkError::Config("bundle must be at least 1".into()));
        }
        Ok(())
    }

    /// Number of generated payload bytes per packet, excluding overhead.
    pub fn payload_len(&self) -> usize {
        self.payload as usize - self.proto.framing().overhead()
    }
}
