//! Timing constants and configuration defaults.

use std::time::Duration;

/// Statistics aggregation window. Both sides report once per interval.
pub const REPORT_INTERVAL: Duration = Duration::from_secs(1);

/// A measuring server with no renewing activity for this long reverts to idle.
pub const IDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default server port.
pub const DEFAULT_PORT: u16 = 1337;

/// Default server host for clients.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default target rate in packets per second.
pub const DEFAULT_RATE: u32 = 1000;

/// Default wire size of each packet in bytes.
pub const DEFAULT_PAYLOAD: u32 = 1024;

/// Default number of outstanding sends before the client waits for completions.
pub const DEFAULT_BUNDLE: u32 = 10;

/// Byte used to fill generated payloads.
pub const FILL_BYTE: u8 = b'a';
