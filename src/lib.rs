//! netmark: a network throughput and packet-loss benchmark.
//!
//! A client generates fixed-size packets at a configured rate over TCP or
//! UDP; a server counts arrivals, infers loss from sequence-number gaps,
//! and reports throughput and loss once per second. Both sides are
//! single-task state machines fed by one ordered event queue, so all
//! accounting runs without locks.
//!
//! The [`bootstrap`] module wires a [`core::RunConfig`] into a running
//! process; [`session`] holds the state machines, [`transport`] the
//! socket drivers and wire format, [`metrics`] the loss and interval
//! accounting, and [`pacing`] the rate and in-flight budgeting.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod bootstrap;
pub mod core;
pub mod metrics;
pub mod pacing;
pub mod session;
pub mod transport;

pub use crate::core::{NetmarkError, Proto, Role, RunConfig};
pub use crate::metrics::{IntervalReport, IntervalStats, SequenceTracker};
pub use crate::session::{ClientSession, ServerSession};
