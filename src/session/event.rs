//! Session event queue and self-addressed timers.
//!
//! Every input to a session (decoded frames, connection notifications,
//! send completions, timer firings, control messages) lands in one
//! unbounded queue and is handled strictly in order by the session task.
//! Timers are one-shot delayed events scheduled from within the session;
//! a session that does not re-arm stops ticking.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::transport::{Frame, TransportHandle};

/// Sender half of a session's inbound queue.
pub type EventSender = mpsc::UnboundedSender<SessionEvent>;

/// Receiver half of a session's inbound queue.
pub type EventReceiver = mpsc::UnboundedReceiver<SessionEvent>;

/// Create a session event queue.
pub fn event_queue() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// One queued input to a session.
#[derive(Debug)]
pub enum SessionEvent {
    /// A connection-oriented transport accepted a new peer.
    PeerJoined {
        /// Remote address of the peer.
        addr: SocketAddr,
        /// Outbound link to that peer.
        link: TransportHandle,
    },

    /// A decoded frame arrived.
    Frame {
        /// The frame.
        frame: Frame,
        /// Who sent it.
        from: SocketAddr,
    },

    /// The transport finished a data send; the buffer comes back for reuse.
    SendComplete(Vec<u8>),

    /// The peer's connection went away.
    PeerClosed(SocketAddr),

    /// Send trigger fired. Carries the timer generation it was armed in.
    SendTick(u64),

    /// Interval report timer fired.
    ReportTick(u64),

    /// Watchdog probe for an idle measuring session.
    IdleCheck(u64),

    /// Terminate the session from any state.
    Shutdown,
}

/// Schedule `event` onto the queue after `delay`.
///
/// Timer events carry the session's generation counter at arming time;
/// the dispatch loop drops firings whose generation no longer matches, so
/// a late timer after a state transition or shutdown is a no-op.
pub fn schedule(tx: &EventSender, delay: Duration, event: SessionEvent) {
    let tx = tx.clone();
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let _ = tx.send(event);
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_event_fires_after_delay() {
        let (tx, mut rx) = event_queue();
        schedule(&tx, Duration::from_secs(2), SessionEvent::ReportTick(1));
        // Let the timer task register its sleep before moving the clock.
        tokio::task::yield_now().await;

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::advance(Duration::from_secs(1)).await;
        tokio::task::yield_now().await;
        assert!(matches!(rx.try_recv(), Ok(SessionEvent::ReportTick(1))));
    }

    #[tokio::test]
    async fn test_schedule_survives_dropped_receiver() {
        let (tx, rx) = event_queue();
        drop(rx);
        // The timer task must not panic when the queue is gone.
        schedule(&tx, Duration::from_millis(1), SessionEvent::Shutdown);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
