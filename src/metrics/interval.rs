//! Per-interval statistics accumulation.

use std::fmt;

/// Received-packet and byte counters for the current interval.
///
/// Owned by a single session and mutated only from its event handler.
/// The session's 1-second report timer snapshots and zeroes the counters;
/// the sequence cursor lives in the tracker and survives the reset.
#[derive(Debug, Clone, Default)]
pub struct IntervalStats {
    received: u64,
    bytes: u64,
}

impl IntervalStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one arrived packet of the given wire size.
    pub fn accumulate(&mut self, wire_len: usize) {
        self.received += 1;
        self.bytes += wire_len as u64;
    }

    /// Packets received this interval.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// Bytes received this interval.
    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Close the interval: snapshot the counters together with the loss
    /// count and zero them.
    pub fn report(&mut self, lost: i64) -> IntervalReport {
        let report = IntervalReport {
            received: self.received,
            bytes: self.bytes,
            lost,
        };
        self.received = 0;
        self.bytes = 0;
        report
    }
}

/// One interval's worth of server-side statistics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntervalReport {
    /// Packets received during the interval.
    pub received: u64,
    /// Bytes received during the interval, wire sizes included.
    pub bytes: u64,
    /// Packets counted lost during the interval. May be negative when late
    /// arrivals outnumber the losses counted in this window.
    pub lost: i64,
}

impl IntervalReport {
    /// Lost packets relative to received ones; 0.0 when nothing arrived.
    pub fn loss_ratio(&self) -> f64 {
        if self.received == 0 {
            0.0
        } else {
            self.lost as f64 / self.received as f64
        }
    }

    /// Received volume in mebibytes.
    pub fn megabytes(&self) -> f64 {
        self.bytes as f64 / (1024.0 * 1024.0)
    }

    /// Received volume in mebibits.
    pub fn megabits(&self) -> f64 {
        self.bytes as f64 * 8.0 / (1024.0 * 1024.0)
    }
}

impl fmt::Display for IntervalReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "received {}, lost {:.6} --> {:.3} MB/s",
            self.received,
            self.loss_ratio(),
            self.megabytes()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_counts_packets_and_bytes() {
        let mut stats = IntervalStats::new();
        stats.accumulate(1024);
        stats.accumulate(1024);
        assert_eq!(stats.received(), 2);
        assert_eq!(stats.bytes(), 2048);
    }

    #[test]
    fn test_report_zeroes_counters() {
        let mut stats = IntervalStats::new();
        stats.accumulate(512);
        let report = stats.report(3);
        assert_eq!(report.received, 1);
        assert_eq!(report.bytes, 512);
        assert_eq!(report.lost, 3);
        assert_eq!(stats.received(), 0);
        assert_eq!(stats.bytes(), 0);
    }

    #[test]
    fn test_loss_ratio_guards_empty_interval() {
        let report = IntervalReport {
            received: 0,
            bytes: 0,
            lost: 0,
        };
        assert_eq!(report.loss_ratio(), 0.0);
    }

    #[test]
    fn test_throughput_for_one_thousand_kibibyte_packets() {
        let report = IntervalReport {
            received: 1000,
            bytes: 1000 * 1024,
            lost: 0,
        };
        assert!((report.megabytes() - 0.9765625).abs() < 1e-9);
        assert!((report.megabits() - 7.8125).abs() < 1e-9);
    }

    #[test]
    fn test_negative_loss_passes_through() {
        let report = IntervalReport {
            received: 10,
            bytes: 100,
            lost: -2,
        };
        assert!(report.loss_ratio() < 0.0);
    }
}
