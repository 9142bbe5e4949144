use std::io::{Read, Write};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use tracing::trace;

use super::backlog::{Backlog, Backpressure};
use super::{ByteChannel, DEFAULT_QUOTA};
use crate::config::LoopbackConfig;
use crate::error::{LoopbackError, read_result_to_io};

#[derive(Debug)]
struct State {
    backlog: Backlog,
    pressure: Backpressure,
}

/// Bounded, thread-safe loopback channel.
///
/// Bytes written become readable in order. A write that pushes the backlog
/// past the quota blocks the calling thread until a read drains the backlog
/// back under the quota. Reads never block: an empty backlog yields
/// [`LoopbackError::EndOfData`], which only means "nothing buffered now".
///
/// Share it between threads with `Arc`; both `read` and `write` take `&self`.
///
/// A blocked writer has no timeout. If no reader ever drains the backlog it
/// stays blocked.
#[derive(Debug)]
pub struct LoopbackChannel {
    state: Mutex<State>,
    drained: Condvar,
}

impl Default for LoopbackChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackChannel {
    pub fn new() -> Self {
        Self::with_quota(DEFAULT_QUOTA)
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            state: Mutex::new(State {
                backlog: Backlog::new(),
                pressure: Backpressure::new(quota),
            }),
            drained: Condvar::new(),
        }
    }

    /// Build a channel from configuration. Only the `block` overflow policy
    /// and a non-zero quota are supported.
    pub fn from_config(config: &LoopbackConfig) -> Result<Self, LoopbackError> {
        config.ensure_supported()?;
        Ok(Self::with_quota(config.quota))
    }

    // Backlog mutations never panic halfway, so a poisoned lock still guards
    // consistent state.
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append `data` to the backlog, blocking while the write leaves the
    /// backlog over quota. Always returns `data.len()`.
    pub fn write(&self, data: &[u8]) -> usize {
        let mut state = self.lock();
        state.backlog.push(data);
        let buffered = state.backlog.len();
        if let Some(ticket) = state.pressure.after_write(buffered) {
            trace!(buffered, quota = state.pressure.quota(), "loopback writer stalled");
            let state = self
                .drained
                .wait_while(state, |s| !s.pressure.is_released(ticket))
                .unwrap_or_else(PoisonError::into_inner);
            trace!(buffered = state.backlog.len(), "loopback writer resumed");
        }
        data.len()
    }

    /// Copy up to `buf.len()` buffered bytes into `buf`. Returns
    /// `EndOfData` without blocking when nothing is buffered.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize, LoopbackError> {
        let mut state = self.lock();
        let n = state.backlog.drain_into(buf)?;
        let buffered = state.backlog.len();
        if state.pressure.after_drain(buffered) {
            trace!(buffered, "loopback backlog drained below quota");
            self.drained.notify_all();
        }
        Ok(n)
    }

    pub fn quota(&self) -> usize {
        self.lock().pressure.quota()
    }

    /// Number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.lock().backlog.len()
    }

    /// True while at least one writer is blocked on the quota.
    pub fn is_stalled(&self) -> bool {
        self.lock().pressure.is_stalled()
    }

    /// Number of writes that have blocked on the quota since creation.
    pub fn stalls(&self) -> u64 {
        self.lock().pressure.stalls()
    }
}

impl ByteChannel for LoopbackChannel {
    fn write_bytes(&mut self, data: &[u8]) -> usize {
        LoopbackChannel::write(self, data)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, LoopbackError> {
        LoopbackChannel::read(self, buf)
    }

    fn buffered(&self) -> usize {
        LoopbackChannel::buffered(self)
    }
}

impl ByteChannel for &LoopbackChannel {
    fn write_bytes(&mut self, data: &[u8]) -> usize {
        LoopbackChannel::write(self, data)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, LoopbackError> {
        LoopbackChannel::read(self, buf)
    }

    fn buffered(&self) -> usize {
        LoopbackChannel::buffered(self)
    }
}

impl Read for LoopbackChannel {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        read_result_to_io(LoopbackChannel::read(self, buf))
    }
}

impl Write for LoopbackChannel {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Ok(LoopbackChannel::write(self, buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl Read for &LoopbackChannel {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        read_result_to_io(LoopbackChannel::read(self, buf))
    }
}

impl Write for &LoopbackChannel {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Ok(LoopbackChannel::write(self, buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
