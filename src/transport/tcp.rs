//! TCP transport drivers.
//!
//! Frames are length-prefixed on the stream. The server accepts any number
//! of connections at the socket level and reports each as a `PeerJoined`
//! event carrying a per-connection link; the session enforces the
//! single-measuring-peer policy and simply drops the link of a rejected
//! connection, which tears its writer down.

use std::net::SocketAddr;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{wire, Outgoing, TransportHandle};
use crate::core::NetmarkError;
use crate::session::{EventSender, SessionEvent};

/// Connect to `server` and spawn the client driver tasks.
pub async fn spawn_client(
    server: SocketAddr,
    events: EventSender,
) -> Result<TransportHandle, NetmarkError> {
    let stream = TcpStream::connect(server)
        .await
        .map_err(|source| NetmarkError::Connect {
            addr: server,
            source,
        })?;
    stream.set_nodelay(true)?;
    let peer = stream.peer_addr()?;
    let (read_half, write_half) = stream.into_split();

    let (handle, rx) = TransportHandle::channel();
    tokio::spawn(write_loop(write_half, rx, events.clone(), peer));
    tokio::spawn(read_loop(read_half, events, peer));
    Ok(handle)
}

/// Bind the listener and spawn the accept loop.
///
/// Each accepted connection gets its own reader and writer tasks and is
/// announced to the session as `PeerJoined`.
pub async fn spawn_server(bind: SocketAddr, events: EventSender) -> Result<SocketAddr, NetmarkError> {
    let listener = TcpListener::bind(bind)
        .await
        .map_err(|source| NetmarkError::Bind { addr: bind, source })?;
    let local = listener.local_addr()?;

    tokio::spawn(async move {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(%err, "accept failed");
                    continue;
                }
            };
            if let Err(err) = stream.set_nodelay(true) {
                debug!(%peer, %err, "set_nodelay failed");
            }
            let (read_half, write_half) = stream.into_split();
            let (handle, rx) = TransportHandle::channel();
            tokio::spawn(write_loop(write_half, rx, events.clone(), peer));
            tokio::spawn(read_loop(read_half, events.clone(), peer));
            if events
                .send(SessionEvent::PeerJoined { addr: peer, link: handle })
                .is_err()
            {
                break;
            }
        }
    });

    Ok(local)
}

async fn write_loop(
    mut half: OwnedWriteHalf,
    mut rx: mpsc::Receiver<Outgoing>,
    events: EventSender,
    peer: SocketAddr,
) {
    while let Some(out) = rx.recv().await {
        if let Err(err) = half.write_all(&out.frame).await {
            debug!(%peer, %err, "tcp write failed");
            let _ = events.send(SessionEvent::PeerClosed(peer));
            return;
        }
        if out.ack && events.send(SessionEvent::SendComplete(out.frame)).is_err() {
            return;
        }
    }
    // Link dropped by the session; close our direction.
    let _ = half.shutdown().await;
}

async fn read_loop(mut half: OwnedReadHalf, events: EventSender, peer: SocketAddr) {
    loop {
        match read_frame(&mut half).await {
            Ok(Some(frame)) => {
                if events.send(SessionEvent::Frame { frame, from: peer }).is_err() {
                    return;
                }
            }
            Ok(None) => {
                let _ = events.send(SessionEvent::PeerClosed(peer));
                return;
            }
            Err(err) => {
                debug!(%peer, %err, "tcp read failed");
                let _ = events.send(SessionEvent::PeerClosed(peer));
                return;
            }
        }
    }
}

/// Read one length-prefixed frame; `None` on clean end-of-stream.
async fn read_frame(half: &mut OwnedReadHalf) -> std::io::Result<Option<wire::Frame>> {
    let mut prefix = [0u8; wire::sizes::LEN_PREFIX_SIZE];
    match half.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(err) if err.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(err) => return Err(err),
    }
    let len = u16::from_be_bytes(prefix) as usize;
    let mut body = vec![0u8; len];
    half.read_exact(&mut body).await?;
    wire::decode_stream_body(&body)
        .map(Some)
        .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::event_queue;
    use crate::transport::{Frame, Framing};

    #[tokio::test]
    async fn test_connect_refused_is_fatal() {
        let (tx, _rx) = event_queue();
        // Grab a port and close it again so nothing listens there.
        let probe = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = probe.local_addr().unwrap();
        drop(probe);

        let err = spawn_client(addr, tx).await;
        assert!(matches!(err, Err(NetmarkError::Connect { .. })));
    }

    #[tokio::test]
    async fn test_accept_announces_peer_and_frames_flow() {
        let (server_tx, mut server_rx) = event_queue();
        let local = spawn_server("127.0.0.1:0".parse().unwrap(), server_tx)
            .await
            .unwrap();

        let (client_tx, mut client_rx) = event_queue();
        let client_handle = spawn_client(local, client_tx).await.unwrap();

        let (peer, server_link) = match server_rx.recv().await.unwrap() {
            SessionEvent::PeerJoined { addr, link } => (addr, link),
            other => panic!("unexpected event {:?}", other),
        };

        // Handshake request travels client -> server.
        client_handle
            .send_control(wire::encode_start(Framing::Stream, 800))
            .await
            .unwrap();
        match server_rx.recv().await.unwrap() {
            SessionEvent::Frame {
                frame:
                    Frame::Start {
                        packets_per_interval,
                    },
                from,
            } => {
                assert_eq!(packets_per_interval, 800);
                assert_eq!(from, peer);
            }
            other => panic!("unexpected event {:?}", other),
        }

        // Acknowledgment travels server -> client.
        server_link
            .send_control(wire::encode_start_ack(Framing::Stream))
            .await
            .unwrap();
        assert!(matches!(
            client_rx.recv().await.unwrap(),
            SessionEvent::Frame {
                frame: Frame::StartAck,
                ..
            }
        ));

        // Data frame with completion back to the client.
        let mut data = Vec::new();
        wire::encode_data(Framing::Stream, &mut data, 64, 3, 1);
        client_handle.send(data).await.unwrap();
        match server_rx.recv().await.unwrap() {
            SessionEvent::Frame {
                frame: Frame::Data { seq, wire_len, .. },
                ..
            } => {
                assert_eq!(seq, 3);
                assert_eq!(wire_len, 64 + wire::sizes::STREAM_OVERHEAD);
            }
            other => panic!("unexpected event {:?}", other),
        }
        assert!(matches!(
            client_rx.recv().await.unwrap(),
            SessionEvent::SendComplete(_)
        ));
    }

    #[tokio::test]
    async fn test_client_disconnect_reports_peer_closed() {
        let (server_tx, mut server_rx) = event_queue();
        let local = spawn_server("127.0.0.1:0".parse().unwrap(), server_tx)
            .await
            .unwrap();

        let (client_tx, _client_rx) = event_queue();
        let client_handle = spawn_client(local, client_tx).await.unwrap();

        let peer = match server_rx.recv().await.unwrap() {
            SessionEvent::PeerJoined { addr, .. } => addr,
            other => panic!("unexpected event {:?}", other),
        };

        // Dropping the client handle ends its writer, which shuts the
        // stream down; the server side observes end-of-stream.
        drop(client_handle);
        assert!(matches!(
            server_rx.recv().await.unwrap(),
            SessionEvent::PeerClosed(addr) if addr == peer
        ));
    }
}
