//! Core types: configuration, constants, and errors.

pub mod constants;
mod config;
mod error;

pub use config::{Proto, Role, RunConfig};
pub use error::NetmarkError;
