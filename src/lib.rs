//! Loopback byte channels
//!
//! In-process stand-ins for an I/O endpoint: bytes written to a channel come
//! back out of its reads, in order, with no transport underneath.

pub mod cli;
pub mod config;
pub mod error;
pub mod io;
pub mod pump;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use config::{LoopbackConfig, OverflowPolicy};
pub use error::LoopbackError;
pub use io::{AsyncLoopback, ByteChannel, DEFAULT_QUOTA, LoopbackChannel, UnboundedLoopback};
