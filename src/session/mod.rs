//! Session state machines.
//!
//! A session is a single task owning all mutable benchmark state. It
//! drains one ordered event queue fed by transport driver tasks and by
//! its own delayed timer events; handling never blocks on I/O beyond
//! queueing outbound frames. This keeps loss accounting, pacing, and
//! timers free of locks.

mod client;
mod event;
mod server;

pub use client::{ClientSession, ClientState};
pub use event::{event_queue, schedule, EventReceiver, EventSender, SessionEvent};
pub use server::{ServerSession, ServerState};
