//! Send-credit window with buffer reuse.

/// Bounds outstanding sends to `bundle` and recycles their buffers.
///
/// A credit (with a reusable buffer) is consumed when a send is issued and
/// returned when the transport signals completion for it. Returned buffers
/// accumulate in a pool; once a full bundle has come back, the owner drains
/// queued sends up to the available credits. Reuse is in stack order, which
/// is fine because every send carries its own sequence number.
#[derive(Debug)]
pub struct CreditWindow {
    capacity: usize,
    pool: Vec<Vec<u8>>,
    outstanding: usize,
}

impl CreditWindow {
    /// Create a window with `bundle` credits.
    pub fn new(bundle: u32) -> Self {
        Self {
            capacity: bundle.max(1) as usize,
            pool: Vec::new(),
            outstanding: 0,
        }
    }

    /// Take a credit and its buffer, or `None` when the window is full.
    ///
    /// An empty buffer is allocated while fewer than `bundle` buffers exist.
    pub fn try_acquire(&mut self) -> Option<Vec<u8>> {
        if self.outstanding >= self.capacity {
            return None;
        }
        self.outstanding += 1;
        Some(self.pool.pop().unwrap_or_default())
    }

    /// Return a completed send's buffer, freeing one credit.
    pub fn release(&mut self, mut buf: Vec<u8>) {
        buf.clear();
        self.outstanding = self.outstanding.saturating_sub(1);
        if self.pool.len() < self.capacity {
            self.pool.push(buf);
        }
    }

    /// Sends currently in flight.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Whether enough slack built up to drain queued sends: a full bundle
    /// of buffers has been returned.
    pub fn should_drain(&self) -> bool {
        self.pool.len() >= self.capacity
    }

    /// Window capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
