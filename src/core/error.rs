//! Error types for netmark.

use std::net::SocketAddr;

use thiserror::Error;

/// Top-level netmark errors.
#[derive(Debug, Error)]
pub enum NetmarkError {
    /// Invalid run configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Server could not open its port. Fatal at startup.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// Address the server tried to bind.
        addr: SocketAddr,
        /// Underlying socket error.
        source: std::io::Error,
    },

    /// Client could not reach the server. Fatal for that session, no retry.
    #[error("cannot reach server on {addr}: {source}")]
    Connect {
        /// Address the client tried to reach.
        addr: SocketAddr,
        /// Underlying socket error.
        source: std::io::Error,
    },

    /// Host name did not resolve to any address.
    #[error("cannot resolve '{0}'")]
    Resolve(String),

    /// I/O error.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
