//! Rate control for the sending side.
//!
//! [`RateScheduler`] paces send triggers from a target rate and batch size;
//! [`CreditWindow`] bounds outstanding sends to the configured bundle and
//! recycles send buffers as the transport acknowledges completions.

mod credit;
mod rate;

pub use credit::CreditWindow;
pub use rate::RateScheduler;
