//! UDP transport drivers.
//!
//! One datagram per frame. The server socket is unconnected and serves
//! every peer; datagrams from any sender interleave into the one session
//! feeding off the event queue, with no per-peer tracking.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::{wire, Outgoing, TransportHandle};
use crate::core::NetmarkError;
use crate::session::{EventSender, SessionEvent};

/// Receive buffer size; covers the largest encodable frame.
const RECV_BUFFER_SIZE: usize = 65535;

/// Connect to `server` and spawn the client driver tasks.
///
/// Decoded frames, send completions, and a close notification are pushed
/// into `events`. Failure to bind or connect is fatal for the client
/// session and reported immediately.
pub async fn spawn_client(
    server: SocketAddr,
    events: EventSender,
) -> Result<TransportHandle, NetmarkError> {
    let bind: SocketAddr = if server.is_ipv4() {
        "0.0.0.0:0".parse().expect("valid wildcard address")
    } else {
        "[::]:0".parse().expect("valid wildcard address")
    };
    let socket = UdpSocket::bind(bind)
        .await
        .map_err(|source| NetmarkError::Connect {
            addr: server,
            source,
        })?;
    socket
        .connect(server)
        .await
        .map_err(|source| NetmarkError::Connect {
            addr: server,
            source,
        })?;
    let socket = Arc::new(socket);

    let (handle, rx) = TransportHandle::channel();
    tokio::spawn(send_loop(socket.clone(), rx, events.clone(), server));
    tokio::spawn(recv_loop(socket, events, server));
    Ok(handle)
}

/// Bind the server socket and spawn its driver tasks.
///
/// Returns the outbound handle (control replies go through `send_control_to`)
/// and the bound address. A bind failure is fatal at startup.
pub async fn spawn_server(
    bind: SocketAddr,
    events: EventSender,
) -> Result<(TransportHandle, SocketAddr), NetmarkError> {
    let socket = UdpSocket::bind(bind)
        .await
        .map_err(|source| NetmarkError::Bind { addr: bind, source })?;
    let local = socket.local_addr()?;
    let socket = Arc::new(socket);

    let (handle, mut rx) = TransportHandle::channel();
    {
        let socket = socket.clone();
        tokio::spawn(async move {
            while let Some(out) = rx.recv().await {
                let Some(to) = out.to else {
                    warn!("dropping outbound frame without destination");
                    continue;
                };
                if let Err(err) = socket.send_to(&out.frame, to).await {
                    warn!(%to, %err, "udp send failed");
                }
            }
        });
    }

    {
        let socket = socket.clone();
        tokio::spawn(async move {
            let mut buf = vec![0u8; RECV_BUFFER_SIZE];
            loop {
                match socket.recv_from(&mut buf).await {
                    Ok((len, from)) => match wire::decode_datagram(&buf[..len]) {
                        Ok(frame) => {
                            if events.send(SessionEvent::Frame { frame, from }).is_err() {
                                break;
                            }
                        }
                        Err(err) => debug!(%from, %err, "ignoring malformed datagram"),
                    },
                    Err(err) => {
                        warn!(%err, "udp receive failed");
                        break;
                    }
                }
            }
        });
    }

    Ok((handle, local))
}

async fn send_loop(
    socket: Arc<UdpSocket>,
    mut rx: mpsc::Receiver<Outgoing>,
    events: EventSender,
    peer: SocketAddr,
) {
    while let Some(out) = rx.recv().await {
        match socket.send(&out.frame).await {
            Ok(_) => {
                if out.ack && events.send(SessionEvent::SendComplete(out.frame)).is_err() {
                    break;
                }
            }
            Err(err) => {
                warn!(%err, "udp send failed");
                let _ = events.send(SessionEvent::PeerClosed(peer));
                break;
            }
        }
    }
}

async fn recv_loop(socket: Arc<UdpSocket>, events: EventSender, peer: SocketAddr) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];
    loop {
        match socket.recv(&mut buf).await {
            Ok(len) => match wire::decode_datagram(&buf[..len]) {
                Ok(frame) => {
                    if events.send(SessionEvent::Frame { frame, from: peer }).is_err() {
                        break;
                    }
                }
                Err(err) => debug!(%err, "ignoring malformed datagram"),
            },
            Err(err) => {
                debug!(%err, "udp receive failed");
                let _ = events.send(SessionEvent::PeerClosed(peer));
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::event_queue;
    use crate::transport::{Frame, Framing};

    #[tokio::test]
    async fn test_server_bind_reports_local_addr() {
        let (tx, _rx) = event_queue();
        let (_handle, local) = spawn_server("127.0.0.1:0".parse().unwrap(), tx)
            .await
            .unwrap();
        assert_ne!(local.port(), 0);
    }

    #[tokio::test]
    async fn test_bind_conflict_is_fatal() {
        let (tx, _rx) = event_queue();
        let (_handle, local) = spawn_server("127.0.0.1:0".parse().unwrap(), tx)
            .await
            .unwrap();

        let (tx2, _rx2) = event_queue();
        let err = spawn_server(local, tx2).await;
        assert!(matches!(err, Err(NetmarkError::Bind { .. })));
    }

    #[tokio::test]
    async fn test_client_data_reaches_server_queue() {
        let (server_tx, mut server_rx) = event_queue();
        let (_server_handle, local) = spawn_server("127.0.0.1:0".parse().unwrap(), server_tx)
            .await
            .unwrap();

        let (client_tx, mut client_rx) = event_queue();
        let handle = spawn_client(local, client_tx).await.unwrap();

        let mut frame = Vec::new();
        wire::encode_data(Framing::Datagram, &mut frame, 32, 5, 0);
        handle.send(frame).await.unwrap();

        // Server decodes the datagram into a frame event.
        match server_rx.recv().await.unwrap() {
            SessionEvent::Frame {
                frame: Frame::Data { seq, wire_len, .. },
                ..
            } => {
                assert_eq!(seq, 5);
                assert_eq!(wire_len, 32 + wire::sizes::DATAGRAM_OVERHEAD);
            }
            other => panic!("unexpected event {:?}", other),
        }

        // Client gets its buffer back as a completion.
        match client_rx.recv().await.unwrap() {
            SessionEvent::SendComplete(buf) => {
                assert_eq!(buf.len(), 32 + wire::sizes::DATAGRAM_OVERHEAD)
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_server_replies_reach_client_queue() {
        let (server_tx, mut server_rx) = event_queue();
        let (server_handle, local) = spawn_server("127.0.0.1:0".parse().unwrap(), server_tx)
            .await
            .unwrap();

        let (client_tx, mut client_rx) = event_queue();
        let client_handle = spawn_client(local, client_tx).await.unwrap();

        client_handle
            .send_control(wire::encode_start(Framing::Datagram, 500))
            .await
            .unwrap();

        let from = match server_rx.recv().await.unwrap() {
            SessionEvent::Frame {
                frame:
                    Frame::Start {
                        packets_per_interval,
                    },
                from,
            } => {
                assert_eq!(packets_per_interval, 500);
                from
            }
            other => panic!("unexpected event {:?}", other),
        };

        server_handle
            .send_control_to(wire::encode_start_ack(Framing::Datagram), from)
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
}
