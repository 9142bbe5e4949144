//! Loopback channels
//!
//! This module provides:
//! - `LoopbackChannel`, the bounded thread-safe channel with writer backpressure
//! - `UnboundedLoopback`, the same read/write contract without locking or quota
//! - `AsyncLoopback`, a bounded channel for tokio tasks
//! - `ByteChannel` trait shared by the synchronous variants

mod async_loopback;
mod backlog;
mod bounded;
mod unbounded;

pub use async_loopback::AsyncLoopback;
pub use bounded::LoopbackChannel;
pub use unbounded::UnboundedLoopback;

use crate::error::LoopbackError;

/// Backlog size above which writers are held back.
pub const DEFAULT_QUOTA: usize = 1024 * 1024;

/// A byte stream whose writes come back out of its reads.
pub trait ByteChannel {
    /// Append `data`; returns the number of bytes accepted, always `data.len()`.
    fn write_bytes(&mut self, data: &[u8]) -> usize;

    /// Move buffered bytes into `buf`. `EndOfData` means nothing is buffered
    /// right now.
    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, LoopbackError>;

    /// Number of bytes written but not yet read.
    fn buffered(&self) -> usize;
}

/// Read everything currently buffered in `channel`.
pub fn drain_to_vec<C: ByteChannel + ?Sized>(channel: &mut C) -> Vec<u8> {
    let mut out = Vec::with_capacity(channel.buffered());
    let mut chunk = [0u8; 8192];
    while let Ok(n) = channel.read_bytes(&mut chunk) {
        out.extend_from_slice(&chunk[..n]);
    }
    out
}
