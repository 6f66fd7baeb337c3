//! Loss accounting and per-interval statistics.
//!
//! [`SequenceTracker`] classifies arriving sequence numbers against a single
//! next-expected cursor; [`IntervalStats`] accumulates received packets and
//! bytes between report timer firings. Both are pure state machines with no
//! I/O, owned exclusively by one session.

mod interval;
mod tracker;

pub use interval::{IntervalReport, IntervalStats};
pub use tracker::{Arrival, SequenceTracker};
