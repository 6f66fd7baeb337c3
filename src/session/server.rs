//! Server session state machine.
//!
//! One session per server process. Arrivals, timer firings, and control
//! messages are handled strictly in order by a single task; dispatch is
//! keyed on `(state, event)`.

use std::net::SocketAddr;

use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::event::{schedule, EventReceiver, EventSender, SessionEvent};
use crate::core::constants::{IDLE_TIMEOUT, REPORT_INTERVAL};
use crate::metrics::{IntervalReport, IntervalStats, SequenceTracker};
use crate::transport::{wire, Frame, Framing, TransportHandle};

/// Server lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for a client to start a run.
    Idle,
    /// Counting arrivals and reporting once per interval.
    Measuring,
    /// Terminal; the session task has ended.
    Stopped,
}

/// The peer whose traffic is currently being measured.
#[derive(Debug)]
struct ActivePeer {
    addr: SocketAddr,
    link: TransportHandle,
    /// Destination for unconnected (datagram) links.
    to: Option<SocketAddr>,
}

impl ActivePeer {
    async fn reply(&self, frame: Vec<u8>) {
        let result = match self.to {
            Some(to) => self.link.send_control_to(frame, to).await,
            None => self.link.send_control(frame).await,
        };
        if result.is_err() {
            debug!(addr = %self.addr, "reply failed, link gone");
        }
    }
}

/// Receiving side of the benchmark.
///
/// Composes the sequence tracker and interval statistics, owns the
/// 1-second report timer and the 5-second idle watchdog. Exactly one
/// measuring peer is supported on connection-oriented transports; the
/// datagram flavor is connectionless and interleaves traffic from any
/// sender into the one statistics stream.
pub struct ServerSession {
    state: ServerState,
    framing: Framing,
    /// Enforce the single-peer policy (connection-oriented transports).
    exclusive: bool,
    /// Outbound link of a datagram server; replies go through here.
    shared_link: Option<TransportHandle>,
    /// Connection waiting for (or owning) a measuring run.
    peer: Option<ActivePeer>,
    tracker: SequenceTracker,
    stats: IntervalStats,
    packets_per_interval: u32,
    last_activity: Instant,
    /// Bumped on every state transition; stale timer firings carry an
    /// older value and are dropped.
    timer_epoch: u64,
    events: EventReceiver,
    tx: EventSender,
    reports: Option<mpsc::UnboundedSender<IntervalReport>>,
}

impl ServerSession {
    /// Create a session for a connection-oriented transport. Links arrive
    /// via `PeerJoined` events.
    pub fn stream(events: EventReceiver, tx: EventSender) -> Self {
        Self::new(Framing::Stream, true, None, events, tx)
    }

    /// Create a session for a datagram transport replying through `link`.
    pub fn datagram(link: TransportHandle, events: EventReceiver, tx: EventSender) -> Self {
        Self::new(Framing::Datagram, false, Some(link), events, tx)
    }

    fn new(
        framing: Framing,
        exclusive: bool,
        shared_link: Option<TransportHandle>,
        events: EventReceiver,
        tx: EventSender,
    ) -> Self {
        Self {
            state: ServerState::Idle,
            framing,
            exclusive,
            shared_link,
            peer: None,
            tracker: SequenceTracker::new(),
            stats: IntervalStats::new(),
            packets_per_interval: 0,
            last_activity: Instant::now(),
            timer_epoch: 0,
            events,
            tx,
            reports: None,
        }
    }

    /// Also deliver every interval report through `tx` (tests, harnesses).
    pub fn with_reports(mut self, tx: mpsc::UnboundedSender<IntervalReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    /// Current state.
    pub fn state(&self) -> ServerState {
        self.state
    }

    /// Run the session until shutdown.
    pub async fn run(mut self) {
        info!("server session waiting for clients");
        while let Some(event) = self.events.recv().await {
            self.handle(event).await;
            if self.state == ServerState::Stopped {
                break;
            }
        }
    }

    /// Dispatch one event. Public for state-machine tests.
    pub async fn handle(&mut self, event: SessionEvent) {
        match (self.state, event) {
            (_, SessionEvent::Shutdown)
            | (
                _,
                SessionEvent::Frame {
                    frame: Frame::Shutdown,
                    ..
                },
            ) => {
                info!("server session shutting down");
                self.stop();
            }

            (ServerState::Stopped, _) => {}

            (state, SessionEvent::PeerJoined { addr, link }) => {
                if state == ServerState::Measuring || self.peer.is_some() {
                    warn!(%addr, "no support for multiple endpoints, rejecting");
                    // Dropping the link tears the connection's writer down.
                    drop(link);
                } else {
                    debug!(%addr, "client connected");
                    self.peer = Some(ActivePeer {
                        addr,
                        link,
                        to: None,
                    });
                }
            }

            (
                state,
                SessionEvent::Frame {
                    frame:
                        Frame::Start {
                            packets_per_interval,
                        },
                    from,
                },
            ) => {
                self.on_start(state, packets_per_interval, from).await;
            }

            (
                ServerState::Measuring,
                SessionEvent::Frame {
                    frame: Frame::Data { seq, wire_len, .. },
                    from,
                },
            ) => {
                if self.exclusive
                    && self.peer.as_ref().map(|p| p.addr) != Some(from)
                {
                    debug!(%from, "ignoring data from non-active peer");
                    return;
                }
                self.stats.accumulate(wire_len);
                self.tracker.observe(seq);
                self.last_activity = Instant::now();
            }

            (ServerState::Idle, SessionEvent::Frame { frame: Frame::Data { .. }, from }) => {
                debug!(%from, "data while idle, not measuring");
            }

            (_, SessionEvent::Frame { frame: Frame::StartAck, from }) => {
                debug!(%from, "unexpected start ack");
            }

            (ServerState::Measuring, SessionEvent::ReportTick(generation)) => {
                if generation != self.timer_epoch {
                    return;
                }
                schedule(
                    &self.tx,
                    REPORT_INTERVAL,
                    SessionEvent::ReportTick(generation),
                );
                let report = self.stats.report(self.tracker.reset_interval());
                info!(
                    received = report.received,
                    target = self.packets_per_interval,
                    loss = report.loss_ratio(),
                    mb_per_s = report.megabytes(),
                    "{report}"
                );
                if let Some(reports) = &self.reports {
                    let _ = reports.send(report);
                }
            }
            (_, SessionEvent::ReportTick(_)) => {}

            (ServerState::Measuring, SessionEvent::IdleCheck(generation)) => {
                if generation != self.timer_epoch {
                    return;
                }
                let quiet = self.last_activity.elapsed();
                if quiet >= IDLE_TIMEOUT {
                    info!("no activity for {:?}, back to idle", IDLE_TIMEOUT);
                    self.become_idle();
                } else {
                    schedule(
                        &self.tx,
                        IDLE_TIMEOUT - quiet,
                        SessionEvent::IdleCheck(generation),
                    );
                }
            }
            (_, SessionEvent::IdleCheck(_)) => {}

            (state, SessionEvent::PeerClosed(addr)) => {
                if self.peer.as_ref().map(|p| p.addr) == Some(addr) {
                    self.peer = None;
                    if state == ServerState::Measuring {
                        info!(%addr, "client lost");
                        self.become_idle();
                    }
                }
            }

            // The server's own control replies complete through the shared
            // link driver; nothing to recycle.
            (_, SessionEvent::SendComplete(_)) => {}

            (_, SessionEvent::SendTick(_)) => {}
        }
    }

    async fn on_start(&mut self, state: ServerState, packets_per_interval: u32, from: SocketAddr) {
        match state {
            ServerState::Idle => {
                let reply_peer = if self.exclusive {
                    match self.peer.take() {
                        Some(peer) if peer.addr == from => peer,
                        Some(peer) => {
                            warn!(%from, "start from unknown connection, ignoring");
                            self.peer = Some(peer);
                            return;
                        }
                        None => {
                            warn!(%from, "start without a connection, ignoring");
                            return;
                        }
                    }
                } else {
                    let Some(link) = self.shared_link.clone() else {
                        warn!("datagram session without a link");
                        return;
                    };
                    ActivePeer {
                        addr: from,
                        link,
                        to: Some(from),
                    }
                };

                info!(%from, packets_per_interval, "new client, starting to measure");
                self.packets_per_interval = packets_per_interval;
                self.tracker = SequenceTracker::new();
                self.stats = IntervalStats::new();
                self.last_activity = Instant::now();
                self.state = ServerState::Measuring;
                self.timer_epoch += 1;
                schedule(
                    &self.tx,
                    REPORT_INTERVAL,
                    SessionEvent::ReportTick(self.timer_epoch),
                );
                schedule(
                    &self.tx,
                    IDLE_TIMEOUT,
                    SessionEvent::IdleCheck(self.timer_epoch),
                );
                reply_peer
                    .reply(wire::encode_start_ack(self.framing))
                    .await;
                self.peer = Some(reply_peer);
            }
            ServerState::Measuring => {
                if self.exclusive {
                    warn!(%from, "no support for multiple endpoints, start rejected");
                } else {
                    // Connectionless flavor: acknowledge and let the new
                    // sender interleave into the running measurement.
                    debug!(%from, "additional datagram sender joins the stream");
                    if let Some(link) = &self.shared_link {
                        let _ = link
                            .send_control_to(wire::encode_start_ack(self.framing), from)
                            .await;
                    }
                }
            }
            ServerState::Stopped => {}
        }
    }

    fn become_idle(&mut self) {
        // Bumping the epoch silences the report and watchdog timers.
        self.timer_epoch += 1;
        self.state = ServerState::Idle;
        self.peer = None;
    }

    fn stop(&mut self) {
        self.timer_epoch += 1;
        self.state = ServerState::Stopped;
        self.peer = None;
    }
}
