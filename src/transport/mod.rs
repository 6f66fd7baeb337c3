//! Transport collaborators.
//!
//! The session core never touches sockets. Each transport flavor runs
//! driver tasks that decode arriving bytes into [`wire::Frame`]s and push
//! them, together with connection and send-completion notifications,
//! into the owning session's single ordered event queue. Outbound frames
//! go through a [`TransportHandle`].
//!
//! ```text
//! ┌───────────────────────────────┐
//! │         Session               │   one task, one event queue
//! ├───────────────────────────────┤
//! │  TransportHandle │ events     │
//! ├───────────────────────────────┤
//! │  udp / tcp / sim driver tasks │
//! └───────────────────────────────┘
//! ```

pub mod sim;
pub mod tcp;
pub mod udp;
pub mod wire;

use std::net::SocketAddr;

use thiserror::Error;
use tokio::sync::mpsc;

pub use wire::{Frame, Framing, WireError};

/// Depth of the outbound frame queue between a session and its driver.
const SEND_QUEUE_DEPTH: usize = 64;

/// Transport-level failures surfaced to sessions.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The driver task is gone; the link is unusable.
    #[error("transport closed")]
    Closed,
}

/// One outbound frame queued to a driver task.
#[derive(Debug)]
pub struct Outgoing {
    /// Encoded frame bytes.
    pub frame: Vec<u8>,
    /// Destination for unconnected (datagram server) sockets.
    pub to: Option<SocketAddr>,
    /// Whether the driver should report completion back to the session.
    /// Enabled for data sends so the credit window gets its buffers back;
    /// control frames go unacknowledged.
    pub ack: bool,
}

/// Outbound half of a transport link.
///
/// Cloneable; sends apply back-pressure through a bounded queue.
#[derive(Debug, Clone)]
pub struct TransportHandle {
    tx: mpsc::Sender<Outgoing>,
}

impl TransportHandle {
    /// Create a handle and the driver-side receiver for it.
    pub fn channel() -> (Self, mpsc::Receiver<Outgoing>) {
        let (tx, rx) = mpsc::channel(SEND_QUEUE_DEPTH);
        (Self { tx }, rx)
    }

    /// Queue a data frame; its buffer comes back as a send completion.
    pub async fn send(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.push(Outgoing {
            frame,
            to: None,
            ack: true,
        })
        .await
    }

    /// Queue a control frame, no completion wanted.
    pub async fn send_control(&self, frame: Vec<u8>) -> Result<(), TransportError> {
        self.push(Outgoing {
            frame,
            to: None,
            ack: false,
        })
        .await
    }

    /// Queue a control frame to an explicit destination (datagram servers).
    pub async fn send_control_to(
        &self,
        frame: Vec<u8>,
        to: SocketAddr,
    ) -> Result<(), TransportError> {
        self.push(Outgoing {
            frame,
            to: Some(to),
            ack: false,
        })
        .await
    }

    async fn push(&self, out: Outgoing) -> Result<(), TransportError> {
        self.tx.send(out).await.map_err(|_| TransportError::Closed)
    }
}
