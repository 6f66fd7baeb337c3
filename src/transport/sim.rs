//! Deterministic in-memory transport.
//!
//! Links a client session and a server session directly through their
//! event queues, with a configurable set of data sequences silently
//! dropped on the client-to-server direction. Drives the simulated-clock
//! end-to-end tests without sockets or real time.

use std::collections::HashSet;
use std::net::SocketAddr;

use tokio::sync::mpsc;

use super::{wire, Framing, Outgoing, TransportHandle};
use crate::session::{EventSender, SessionEvent};

/// Synthetic address for the simulated client endpoint.
pub fn client_addr() -> SocketAddr {
    "127.0.0.1:1".parse().expect("valid address")
}

/// Synthetic address for the simulated server endpoint.
pub fn server_addr() -> SocketAddr {
    "127.0.0.1:2".parse().expect("valid address")
}

/// Loss pattern applied to the client-to-server direction.
#[derive(Debug, Clone, Default)]
pub struct LossPattern {
    drop: HashSet<u64>,
}

impl LossPattern {
    /// Lossless link.
    pub fn none() -> Self {
        Self::default()
    }

    /// Drop exactly the given data sequences.
    pub fn drop_seqs(seqs: impl IntoIterator<Item = u64>) -> Self {
        Self {
            drop: seqs.into_iter().collect(),
        }
    }

    fn should_drop(&self, frame: &wire::Frame) -> bool {
        matches!(frame, wire::Frame::Data { seq, .. } if self.drop.contains(seq))
    }
}

/// Spawn a simulated link pair.
///
/// Returns the client-side and server-side handles. Frames sent through
/// either handle are decoded and delivered to the opposite queue; data
/// sends still complete (the buffer returns to the sender) even when the
/// frame itself is dropped, mirroring a lossy network where the local
/// send always succeeds.
pub fn spawn_pair(
    framing: Framing,
    client_events: EventSender,
    server_events: EventSender,
    loss: LossPattern,
) -> (TransportHandle, TransportHandle) {
    let (client_handle, client_rx) = TransportHandle::channel();
    let (server_handle, server_rx) = TransportHandle::channel();

    tokio::spawn(forward(
        framing,
        client_rx,
        client_events.clone(),
        server_events.clone(),
        client_addr(),
        loss,
    ));
    tokio::spawn(forward(
        framing,
        server_rx,
        server_events,
        client_events,
        server_addr(),
        LossPattern::none(),
    ));

    (client_handle, server_handle)
}

async fn forward(
    framing: Framing,
    mut rx: mpsc::Receiver<Outgoing>,
    own_events: EventSender,
    peer_events: EventSender,
    own_addr: SocketAddr,
    loss: LossPattern,
) {
    while let Some(out) = rx.recv().await {
        if let Ok(frame) = wire::decode_frame(framing, &out.frame) {
            if !loss.should_drop(&frame) {
                let _ = peer_events.send(SessionEvent::Frame {
                    frame,
                    from: own_addr,
                });
            }
        }
        if out.ack && own_events.send(SessionEvent::SendComplete(out.frame)).is_err() {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::event_queue;
    use crate::transport::Frame;

    #[tokio::test]
    async fn test_frames_cross_the_link() {
        let (client_tx, mut client_rx) = event_queue();
        let (server_tx, mut server_rx) = event_queue();
        let (client, server) = spawn_pair(
            Framing::Datagram,
            client_tx,
            server_tx,
            LossPattern::none(),
        );

        client
            .send_control(wire::encode_start(Framing::Datagram, 10))
            .await
            .unwrap();
        assert!(matches!(
            server_rx.recv().await.unwrap(),
            SessionEvent::Frame {
                frame: Frame::Start {
                    packets_per_interval: 10
                },
                ..
            }
        ));

        server
            .send_control(wire::encode_start_ack(Framing::Datagram))
            .await
            .unwrap();
        assert!(matches!(
            client_rx.recv().await.unwrap(),
            SessionEvent::Frame {
                frame: Frame::StartAck,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_dropped_sequence_still_completes() {
        let (client_tx, mut client_rx) = event_queue();
        let (server_tx, mut server_rx) = event_queue();
        let (client, _server) = spawn_pair(
            Framing::Datagram,
            client_tx,
            server_tx,
            LossPattern::drop_seqs([1]),
        );

        for seq in 0..3u64 {
            let mut buf = Vec::new();
            wire::encode_data(Framing::Datagram, &mut buf, 8, seq, 0);
            client.send(buf).await.unwrap();
        }

        // Every send completes locally.
        for _ in 0..3 {
            assert!(matches!(
                client_rx.recv().await.unwrap(),
                SessionEvent::SendComplete(_)
            ));
        }

        // Only sequences 0 and 2 arrive.
        let mut seen = Vec::new();
        for _ in 0..2 {
            if let SessionEvent::Frame {
                frame: Frame::Data { seq, .. },
                ..
            } = server_rx.recv().await.unwrap()
            {
                seen.push(seq);
            }
        }
        assert_eq!(seen, vec![0, 2]);
        assert!(server_rx.try_recv().is_err());
    }
}
