use bytes::{Buf, BytesMut};

use crate::error::LoopbackError;

/// FIFO store of bytes written but not yet read.
#[derive(Debug, Default)]
pub(crate) struct Backlog {
    bytes: BytesMut,
}

impl Backlog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn push(&mut self, data: &[u8]) {
        self.bytes.extend_from_slice(data);
    }

    /// Move up to `buf.len()` bytes from the front of the backlog into `buf`.
    /// Returns `EndOfData` when the backlog is empty, regardless of `buf`.
    pub fn drain_into(&mut self, buf: &mut [u8]) -> Result<usize, LoopbackError> {
        if self.bytes.is_empty() {
            return Err(LoopbackError::EndOfData);
        }
        let n = std::cmp::min(buf.len(), self.bytes.len());
        buf[..n].copy_from_slice(&self.bytes[..n]);
        self.bytes.advance(n);
        Ok(n)
    }
}

/// Quota bookkeeping shared by the bounded variants.
///
/// A write that pushes the backlog past `quota` parks and receives a ticket
/// (the current epoch). A drain that brings the backlog back under `quota`
/// while stalled bumps the epoch, which releases every ticket issued before it.
#[derive(Debug)]
pub(crate) struct Backpressure {
    quota: usize,
    stalled: bool,
    epoch: u64,
    stalls: u64,
}

impl Backpressure {
    pub fn new(quota: usize) -> Self {
        Self {
            quota,
            stalled: false,
            epoch: 0,
            stalls: 0,
        }
    }

    pub fn quota(&self) -> usize {
        self.quota
    }

    pub fn is_stalled(&self) -> bool {
        self.stalled
    }

    /// Number of writes that had to park so far.
    pub fn stalls(&self) -> u64 {
        self.stalls
    }

    /// Called after an append. Returns a ticket when the writer must park.
    pub fn after_write(&mut self, buffered: usize) -> Option<u64> {
        if buffered > self.quota {
            self.stalled = true;
            self.stalls += 1;
            Some(self.epoch)
        } else {
            None
        }
    }

    /// Called after a drain. Returns true when parked writers must be woken.
    pub fn after_drain(&mut self, buffered: usize) -> bool {
        if self.stalled && buffered < self.quota {
            self.stalled = false;
            self.epoch = self.epoch.wrapping_add(1);
            true
        } else {
            false
        }
    }

    pub fn is_released(&self, ticket: u64) -> bool {
        self.epoch != ticket
    }
}
