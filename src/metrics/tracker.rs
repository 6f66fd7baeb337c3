//! Sequence-based loss detection.

/// How an arriving sequence number relates to the expected cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arrival {
    /// The sequence we were waiting for.
    Expected,
    /// A gap: this many sequences were skipped and counted lost.
    Skipped(u64),
    /// A sequence below the cursor, treated as recovery of a lost packet.
    Late,
}

/// Classifies arriving sequence numbers and accumulates a loss count.
///
/// The tracker is memoryless beyond a single `next`-expected cursor: a gap
/// adds its width to `lost`, and any arrival below the cursor subtracts one.
/// The late-arrival path does not verify that the sequence was actually
/// counted lost, so duplicates or very late arrivals can drive `lost`
/// negative between report windows. This approximation is the measured
/// statistic; do not "fix" it.
///
/// A first packet with `seq != 0` registers as a startup gap and inflates
/// the first interval's loss count.
#[derive(Debug, Clone, Default)]
pub struct SequenceTracker {
    /// Next expected sequence number. Never decremented.
    next: u64,
    /// Packets counted lost since the last interval reset. Signed.
    lost: i64,
}

impl SequenceTracker {
    /// Create a tracker expecting sequence 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Observe an arriving sequence number, updating cursor and loss count.
    pub fn observe(&mut self, seq: u64) -> Arrival {
        if seq == self.next {
            self.next += 1;
            Arrival::Expected
        } else if seq > self.next {
            let skipped = seq - self.next;
            self.lost += skipped as i64;
            self.next = seq + 1;
            Arrival::Skipped(skipped)
        } else {
            self.lost -= 1;
            Arrival::Late
        }
    }

    /// Next expected sequence number.
    pub fn next_expected(&self) -> u64 {
        self.next
    }

    /// Loss count accumulated since the last interval reset.
    pub fn interval_lost(&self) -> i64 {
        self.lost
    }

    /// Close the current interval: return and zero the loss count.
    ///
    /// The cursor persists across resets.
    pub fn reset_interval(&mut self) -> i64 {
        std::mem::take(&mut self.lost)
    }
}
