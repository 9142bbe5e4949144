use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tracing::trace;

use super::DEFAULT_QUOTA;
use super::backlog::{Backlog, Backpressure};
use crate::config::LoopbackConfig;
use crate::error::LoopbackError;

#[derive(Debug)]
struct Shared {
    backlog: Backlog,
    pressure: Backpressure,
    wakers: Vec<Waker>,
}

// Identifies the call that parked: the buffer address and length it was
// polled with. Stored as an address so the handle stays `Send`.
#[derive(Debug, Clone, Copy)]
struct ParkedWrite {
    ticket: u64,
    addr: usize,
    len: usize,
}

impl ParkedWrite {
    fn is_same_call(&self, buf: &[u8]) -> bool {
        self.addr == buf.as_ptr() as usize && self.len == buf.len()
    }
}

/// Bounded loopback for tokio tasks.
///
/// Same contract as [`super::LoopbackChannel`], with the blocking write
/// replaced by `Poll::Pending`: a write that leaves the backlog over quota is
/// appended once, then stays pending until a read drains the backlog under
/// the quota. Reads never wait; an empty backlog is a zero-byte read.
///
/// Clone the handle to give each task its own end. Each handle tracks its own
/// pending write. If a pending write is dropped, its bytes stay in the
/// backlog and the next write on the handle starts afresh.
#[derive(Debug)]
pub struct AsyncLoopback {
    shared: Arc<Mutex<Shared>>,
    parked: Option<ParkedWrite>,
}

impl Clone for AsyncLoopback {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            parked: None,
        }
    }
}

impl Default for AsyncLoopback {
    fn default() -> Self {
        Self::new()
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

fn register(wakers: &mut Vec<Waker>, waker: &Waker) {
    if !wakers.iter().any(|w| w.will_wake(waker)) {
        wakers.push(waker.clone());
    }
}

impl AsyncLoopback {
    pub fn new() -> Self {
        Self::with_quota(DEFAULT_QUOTA)
    }

    pub fn with_quota(quota: usize) -> Self {
        Self {
            shared: Arc::new(Mutex::new(Shared {
                backlog: Backlog::new(),
                pressure: Backpressure::new(quota),
                wakers: Vec::new(),
            })),
            parked: None,
        }
    }

    pub fn from_config(config: &LoopbackConfig) -> Result<Self, LoopbackError> {
        config.ensure_supported()?;
        Ok(Self::with_quota(config.quota))
    }

    pub fn quota(&self) -> usize {
        lock(&self.shared).pressure.quota()
    }

    pub fn buffered(&self) -> usize {
        lock(&self.shared).backlog.len()
    }

    pub fn is_stalled(&self) -> bool {
        lock(&self.shared).pressure.is_stalled()
    }

    pub fn stalls(&self) -> u64 {
        lock(&self.shared).pressure.stalls()
    }

    /// Non-blocking read with the loopback status, for callers that want to
    /// tell "nothing buffered" apart from a zero-capacity buffer.
    pub fn try_read(&self, buf: &mut [u8]) -> Result<usize, LoopbackError> {
        let mut shared = lock(&self.shared);
        let n = shared.backlog.drain_into(buf)?;
        let wakers = release_if_drained(&mut shared);
        drop(shared);
        wakers.into_iter().for_each(Waker::wake);
        Ok(n)
    }
}

fn release_if_drained(shared: &mut Shared) -> Vec<Waker> {
    let buffered = shared.backlog.len();
    if shared.pressure.after_drain(buffered) {
        trace!(buffered, "async loopback drained below quota");
        std::mem::take(&mut shared.wakers)
    } else {
        Vec::new()
    }
}

impl AsyncRead for AsyncLoopback {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<std::io::Result<()>> {
        match self.try_read(buf.initialize_unfilled()) {
            Ok(n) => {
                buf.advance(n);
                Poll::Ready(Ok(()))
            }
            Err(LoopbackError::EndOfData) => Poll::Ready(Ok(())),
            Err(e) => Poll::Ready(Err(e.into())),
        }
    }
}

impl AsyncWrite for AsyncLoopback {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<std::io::Result<usize>> {
        let this = self.get_mut();
        let mut shared = lock(&this.shared);

        // The bytes of a parked write are already in the backlog.
        if let Some(parked) = this.parked.take() {
            if parked.is_same_call(buf) {
                if shared.pressure.is_released(parked.ticket) {
                    trace!(len = parked.len, "async loopback writer resumed");
                    return Poll::Ready(Ok(parked.len));
                }
                this.parked = Some(parked);
                register(&mut shared.wakers, cx.waker());
                return Poll::Pending;
            }
            trace!(len = parked.len, "async loopback parked write abandoned");
        }

        shared.backlog.push(buf);
        let buffered = shared.backlog.len();
        match shared.pressure.after_write(buffered) {
            Some(ticket) => {
                trace!(
                    buffered,
                    quota = shared.pressure.quota(),
                    "async loopback writer stalled"
                );
                this.parked = Some(ParkedWrite {
                    ticket,
                    addr: buf.as_ptr() as usize,
                    len: buf.len(),
                });
                register(&mut shared.wakers, cx.waker());
                Poll::Pending
            }
            None => Poll::Ready(Ok(buf.len())),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    // There is no end of stream; shutdown leaves the channel usable.
    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<std::io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}
