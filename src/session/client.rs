//! Client session state machine.
//!
//! The client handshakes, then generates paced traffic: each send trigger
//! re-arms itself and emits at most one packet, while send completions
//! recycle buffers into the credit window and drain it in batches.

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::event::{schedule, EventReceiver, EventSender, SessionEvent};
use crate::core::constants::REPORT_INTERVAL;
use crate::pacing::{CreditWindow, RateScheduler};
use crate::transport::{wire, Frame, Framing, TransportHandle};

/// Client lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientState {
    /// Start sent, waiting for the acknowledgment.
    Handshaking,
    /// Generating paced traffic.
    Sending,
    /// Terminal; the session task has ended.
    Stopped,
}

/// Sending side of the benchmark.
pub struct ClientSession {
    state: ClientState,
    framing: Framing,
    rate: RateScheduler,
    credits: CreditWindow,
    seq: u64,
    payload_len: usize,
    link: TransportHandle,
    events: EventReceiver,
    tx: EventSender,
    timer_epoch: u64,
    /// Zero point for stream timestamps.
    epoch_start: Instant,
}

impl ClientSession {
    /// Create a session driving `link` with the given pacing.
    pub fn new(
        framing: Framing,
        rate: RateScheduler,
        credits: CreditWindow,
        payload_len: usize,
        link: TransportHandle,
        events: EventReceiver,
        tx: EventSender,
    ) -> Self {
        Self {
            state: ClientState::Handshaking,
            framing,
            rate,
            credits,
            seq: 0,
            payload_len,
            link,
            events,
            tx,
            timer_epoch: 0,
            epoch_start: Instant::now(),
        }
    }

    /// Current state.
    pub fn state(&self) -> ClientState {
        self.state
    }

    /// Sequence number of the next packet to emit.
    pub fn next_seq(&self) -> u64 {
        self.seq
    }

    /// Handshake, then run the session until shutdown or link loss.
    pub async fn run(mut self) {
        if self
            .link
            .send_control(wire::encode_start(
                self.framing,
                self.rate.packets_per_interval(),
            ))
            .await
            .is_err()
        {
            warn!("link closed before handshake");
            return;
        }
        debug!("start sent, awaiting acknowledgment");
        while let Some(event) = self.events.recv().await {
            self.handle(event).await;
            if self.state == ClientState::Stopped {
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
                info!(sent = self.rate.total_sent(), "client session shutting down");
                self.stop();
            }

            (ClientState::Stopped, _) => {}

            (
                ClientState::Handshaking,
                SessionEvent::Frame {
                    frame: Frame::StartAck,
                    ..
                },
            ) => {
                self.begin_sending().await;
            }

            (_, SessionEvent::Frame { frame, from }) => {
                debug!(%from, ?frame, "unexpected frame");
            }

            (ClientState::Sending, SessionEvent::SendTick(generation)) => {
                if generation != self.timer_epoch {
                    return;
                }
                schedule(
                    &self.tx,
                    self.rate.delay(),
                    SessionEvent::SendTick(generation),
                );
                self.emit_one().await;
            }
            (_, SessionEvent::SendTick(_)) => {}

            (ClientState::Sending, SessionEvent::ReportTick(generation)) => {
                if generation != self.timer_epoch {
                    return;
                }
                schedule(
                    &self.tx,
                    REPORT_INTERVAL,
                    SessionEvent::ReportTick(generation),
                );
                let sent = self.rate.reset_interval();
                debug!(sent, total = self.rate.total_sent(), "interval closed");
                if self.rate.exhausted() && self.credits.outstanding() == 0 {
                    info!(total = self.rate.total_sent(), "run complete");
                    self.stop();
                    return;
                }
                self.drain().await;
            }
            (_, SessionEvent::ReportTick(_)) => {}

            (ClientState::Sending, SessionEvent::SendComplete(buf)) => {
                self.credits.release(buf);
                if self.credits.should_drain() {
                    self.drain().await;
                }
            }
            (_, SessionEvent::SendComplete(_)) => {}

            (_, SessionEvent::PeerClosed(addr)) => {
                // Losing the server is fatal for a client.
                warn!(%addr, "server lost, stopping");
                self.stop();
            }

            (_, SessionEvent::PeerJoined { .. }) => {}

            (_, SessionEvent::IdleCheck(_)) => {}
        }
    }

    async fn begin_sending(&mut self) {
        info!(
            payload = self.payload_len,
            "acknowledged, targeting {} packets/s",
            self.rate.packets_per_interval()
        );
        self.state = ClientState::Sending;
        self.timer_epoch += 1;
        schedule(
            &self.tx,
            self.rate.delay(),
            SessionEvent::SendTick(self.timer_epoch),
        );
        schedule(
            &self.tx,
            REPORT_INTERVAL,
            SessionEvent::ReportTick(self.timer_epoch),
        );
        self.drain().await;
    }

    /// Emit packets while both the rate budget and the credit window allow.
    async fn drain(&mut self) {
        while self.rate.has_budget() {
            if !self.emit_one().await {
                break;
            }
        }
    }

    /// Emit at most one packet; false when no credit, no budget, or the
    /// link is gone.
    async fn emit_one(&mut self) -> bool {
        if !self.rate.has_budget() {
            return false;
        }
        let Some(mut buf) = self.credits.try_acquire() else {
            return false;
        };
        let timestamp = self.epoch_start.elapsed().as_micros() as u64;
        wire::encode_data(self.framing, &mut buf, self.payload_len, self.seq, timestamp);
        if self.link.send(buf).await.is_err() {
            warn!("link closed mid-run, stopping");
            self.stop();
            return false;
        }
        self.seq += 1;
        self.rate.record_send();
        true
    }

    fn stop(&mut self) {
        self.timer_epoch += 1;
        self.state = ClientState::Stopped;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::event_queue;
    use std::net::SocketAddr;

    fn server_addr() -> SocketAddr {
        "127.0.0.1:1337".parse().unwrap()
    }

    fn ack_event() -> SessionEvent {
        SessionEvent::Frame {
            frame: Frame::StartAck,
            from: server_addr(),
        }
    }

    fn session(rate: u32, bundle: u32) -> (ClientSession, tokio::sync::mpsc::Receiver<crate::transport::Outgoing>) {
        let (events_tx, events_rx) = event_queue();
        let (link, link_rx) = TransportHandle::channel();
        let session = ClientSession::new(
            Framing::Datagram,
            RateScheduler::new(rate, bundle),
            CreditWindow::new(bundle),
            64,
            link,
            events_rx,
            events_tx,
        );
        (session, link_rx)
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_data_before_acknowledgment() {
        let (mut session, mut link_rx) = session(100, 4);
        assert_eq!(session.state(), ClientState::Handshaking);

        // A stray tick in the handshake phase emits nothing.
        session.handle(SessionEvent::SendTick(0)).await;
        assert!(link_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ack_opens_the_window() {
        let (mut session, mut link_rx) = session(100, 4);
        session.handle(ack_event()).await;
        assert_eq!(session.state(), ClientState::Sending);

        // The initial drain fills the whole credit window.
        for expected_seq in 0u64..4 {
            let out = link_rx.try_recv().unwrap();
            assert!(out.ack);
            let frame = wire::decode_frame(Framing::Datagram, &out.frame).unwrap();
            match frame {
                Frame::Data { seq, .. } => assert_eq!(seq, expected_seq),
                other => panic!("expected data, got {other:?}"),
            }
        }
        assert!(link_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_completions_recycle_in_batches() {
        let (mut session, mut link_rx) = session(100, 4);
        session.handle(ack_event()).await;
        let mut sent = Vec::new();
        while let Ok(out) = link_rx.try_recv() {
            sent.push(out.frame);
        }
        assert_eq!(sent.len(), 4);

        // Three completions keep the pool below the drain mark.
        for buf in sent.drain(..3) {
            session.handle(SessionEvent::SendComplete(buf)).await;
        }
        assert!(link_rx.try_recv().is_err());

        // The fourth fills the pool and triggers a full batch.
        session
            .handle(SessionEvent::SendComplete(sent.pop().unwrap()))
            .await;
        let mut batch = 0;
        while link_rx.try_recv().is_ok() {
            batch += 1;
        }
        assert_eq!(batch, 4);
        assert_eq!(session.next_seq(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_budget_limits_generation() {
        // rate 2 with bundle 4: the window is larger than the budget, so
        // only two packets leave in the first interval.
        let (mut session, mut link_rx) = session(2, 4);
        session.handle(ack_event()).await;
        let mut count = 0;
        while link_rx.try_recv().is_ok() {
            count += 1;
        }
        assert_eq!(count, 2);

        // Ticks cannot exceed the budget either.
        session.handle(SessionEvent::SendTick(session.timer_epoch)).await;
        assert!(link_rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_server_loss_is_fatal() {
        let (mut session, _link_rx) = session(100, 4);
        session.handle(ack_event()).await;
        session
            .handle(SessionEvent::PeerClosed(server_addr()))
            .await;
        assert_eq!(session.state(), ClientState::Stopped);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_limit_stops_after_final_interval() {
        let (events_tx, events_rx) = event_queue();
        let (link, mut link_rx) = TransportHandle::channel();
        let mut session = ClientSession::new(
            Framing::Datagram,
            RateScheduler::new(100, 4).with_run_limit(3),
            CreditWindow::new(4),
            64,
            link,
            events_rx,
            events_tx,
        );
        session.handle(ack_event()).await;

        let mut sent = Vec::new();
        while let Ok(out) = link_rx.try_recv() {
            sent.push(out.frame);
        }
        assert_eq!(sent.len(), 3);

        for buf in sent {
            session.handle(SessionEvent::SendComplete(buf)).await;
        }
        session
            .handle(SessionEvent::ReportTick(session.timer_epoch))
            .await;
        assert_eq!(session.state(), ClientState::Stopped);
    }
}
