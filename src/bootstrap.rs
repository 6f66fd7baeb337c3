//! Process wiring.
//!
//! Turns a validated [`RunConfig`] into a running session: resolves the
//! peer address, spawns the transport drivers for the chosen flavor, and
//! drives the session task until it stops or the process is interrupted.

use std::net::SocketAddr;

use tokio::net::lookup_host;
use tracing::{debug, info};

use crate::core::{NetmarkError, Proto, Role, RunConfig};
use crate::pacing::{CreditWindow, RateScheduler};
use crate::session::{event_queue, ClientSession, ServerSession, SessionEvent};
use crate::transport::{tcp, udp};

/// Run the process in the configured role until completion.
pub async fn run(config: RunConfig) -> Result<(), NetmarkError> {
    config.validate()?;
    match config.role {
        Role::Server => run_server(config).await,
        Role::Client => run_client(config).await,
    }
}

/// Bind, then measure arrivals until interrupted.
pub async fn run_server(config: RunConfig) -> Result<(), NetmarkError> {
    let bind: SocketAddr = format!("0.0.0.0:{}", config.port)
        .parse()
        .map_err(|_| NetmarkError::Config(format!("invalid port {}", config.port)))?;

    let (events_tx, events_rx) = event_queue();
    let session = match config.proto {
        Proto::Udp => {
            let (link, local) = udp::spawn_server(bind, events_tx.clone()).await?;
            info!(%local, "udp server listening");
            ServerSession::datagram(link, events_rx, events_tx.clone())
        }
        Proto::Tcp => {
            let local = tcp::spawn_server(bind, events_tx.clone()).await?;
            info!(%local, "tcp server listening");
            ServerSession::stream(events_rx, events_tx.clone())
        }
    };

    spawn_interrupt_watch(events_tx);
    session.run().await;
    Ok(())
}

/// Connect, handshake, and generate traffic until the run completes or
/// the process is interrupted.
pub async fn run_client(config: RunConfig) -> Result<(), NetmarkError> {
    let server = resolve(&config.host, config.port).await?;
    debug!(%server, "resolved server address");

    let (events_tx, events_rx) = event_queue();
    let link = match config.proto {
        Proto::Udp => udp::spawn_client(server, events_tx.clone()).await?,
        Proto::Tcp => tcp::spawn_client(server, events_tx.clone()).await?,
    };

    let mut rate = RateScheduler::new(config.rate, config.bundle);
    if let Some(limit) = config.limit {
        rate = rate.with_run_limit(limit);
    }
    let session = ClientSession::new(
        config.proto.framing(),
        rate,
        CreditWindow::new(config.bundle),
        config.payload_len(),
        link,
        events_rx,
        events_tx.clone(),
    );

    spawn_interrupt_watch(events_tx);
    session.run().await;
    Ok(())
}

/// Resolve `host:port` to the first usable socket address.
async fn resolve(host: &str, port: u16) -> Result<SocketAddr, NetmarkError> {
    let target = format!("{host}:{port}");
    // Owned lookup argument: the returned iterator must not borrow the
    // string that also names the failure.
    lookup_host(target.clone())
        .await
        .map_err(|_| NetmarkError::Resolve(target.clone()))?
        .next()
        .ok_or(NetmarkError::Resolve(target))
}

/// Translate Ctrl-C into an orderly shutdown event.
fn spawn_interrupt_watch(events: crate::session::EventSender) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received");
            let _ = events.send(SessionEvent::Shutdown);
        }
    });
}
