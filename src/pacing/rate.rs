//! Open-loop send rate scheduling.
//!
//! The scheduler converts a target rate and batch size into a fixed
//! inter-send delay and budgets sends per interval. It is pacing, not
//! congestion control: nothing here reacts to loss.

use std::time::Duration;

use crate::core::constants::REPORT_INTERVAL;

/// Budgets and paces the client's packet generation.
///
/// Each send trigger is a self-addressed delayed event re-armed every
/// [`delay`](RateScheduler::delay); a trigger may emit at most one packet,
/// and the per-interval budget caps emission at `packets_per_interval`.
/// An optional whole-run limit stops generation entirely while leaving the
/// session's bookkeeping timers alive.
#[derive(Debug, Clone)]
pub struct RateScheduler {
    delay: Duration,
    packets_per_interval: u32,
    sent_this_interval: u32,
    total_sent: u64,
    run_limit: Option<u64>,
}

impl RateScheduler {
    /// Create a scheduler targeting `rate` packets per second with `bundle`
    /// sends per trigger window.
    ///
    /// The inter-send delay is `interval / rate / bundle`, computed in
    /// nanoseconds. Both parameters are validated non-zero by the run
    /// configuration.
    pub fn new(rate: u32, bundle: u32) -> Self {
        let nanos = REPORT_INTERVAL.as_nanos() as u64 / rate.max(1) as u64 / bundle.max(1) as u64;
        Self {
            delay: Duration::from_nanos(nanos.max(1)),
            packets_per_interval: rate,
            sent_this_interval: 0,
            total_sent: 0,
            run_limit: None,
        }
    }

    /// Cap the total number of packets generated over the whole run.
    pub fn with_run_limit(mut self, limit: u64) -> Self {
        self.run_limit = Some(limit);
        self
    }

    /// Delay between send triggers.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Target packets per interval, as advertised in the handshake.
    pub fn packets_per_interval(&self) -> u32 {
        self.packets_per_interval
    }

    /// Whether another packet may be emitted right now.
    pub fn has_budget(&self) -> bool {
        if self.sent_this_interval >= self.packets_per_interval {
            return false;
        }
        match self.run_limit {
            Some(limit) => self.total_sent < limit,
            None => true,
        }
    }

    /// Record one emitted packet.
    pub fn record_send(&mut self) {
        self.sent_this_interval += 1;
        self.total_sent += 1;
    }

    /// Close the interval: return the number of packets emitted in it and
    /// reopen the budget for the next one.
    pub fn reset_interval(&mut self) -> u32 {
        std::mem::take(&mut self.sent_this_interval)
    }

    /// Packets emitted over the whole run.
    pub fn total_sent(&self) -> u64 {
        self.total_sent
    }

    /// Whether the whole-run limit has been reached.
    pub fn exhausted(&self) -> bool {
        matches!(self.run_limit, Some(limit) if self.total_sent >= limit)
    }
}
