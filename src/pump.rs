use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use anyhow::{Context, Result};
use tracing::{debug, warn};

use crate::error::LoopbackError;
use crate::io::LoopbackChannel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Drain {
    Data(usize),
    Idle,
    Done,
}

// Only `EndOfData` means the backlog is empty; any other status is a failure.
fn next_drain(
    result: Result<usize, LoopbackError>,
    finished: bool,
) -> Result<Drain, LoopbackError> {
    match result {
        Ok(n) => Ok(Drain::Data(n)),
        Err(LoopbackError::EndOfData) if finished => Ok(Drain::Done),
        Err(LoopbackError::EndOfData) => Ok(Drain::Idle),
        Err(e) => Err(e),
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PumpStats {
    pub bytes_written: u64,
    pub bytes_read: u64,
    pub stalls: u64,
}

/// Move everything from `input` to `output` through `channel`.
///
/// A writer thread feeds `input` into the channel in `chunk_size` pieces while
/// the calling thread drains the channel into `output`. An empty read only
/// ends the pump once the writer has finished.
pub fn pump<R, W>(
    channel: &LoopbackChannel,
    mut input: R,
    mut output: W,
    chunk_size: usize,
) -> Result<PumpStats>
where
    R: Read + Send,
    W: Write,
{
    let done = AtomicBool::new(false);

    thread::scope(|s| {
        let writer = s.spawn(|| {
            let result = feed(channel, &mut input, chunk_size);
            done.store(true, Ordering::Release);
            result
        });

        let mut bytes_read = 0u64;
        let mut output_err = None;
        let mut buf = vec![0u8; chunk_size.max(1)];
        loop {
            // Sampled before the read: once the writer is done, an empty
            // backlog stays empty.
            let finished = done.load(Ordering::Acquire);
            match next_drain(channel.read(&mut buf), finished) {
                Ok(Drain::Data(n)) => {
                    bytes_read += n as u64;
                    // Keep draining after an output error so the writer is
                    // never left parked on the quota.
                    if output_err.is_none() {
                        if let Err(e) = output.write_all(&buf[..n]) {
                            warn!("pump output failed: {}", e);
                            output_err = Some(e);
                        }
                    }
                }
                Ok(Drain::Done) => break,
                Ok(Drain::Idle) => thread::yield_now(),
                Err(e) => return Err(anyhow::Error::new(e).context("read channel")),
            }
        }

        let bytes_written = writer
            .join()
            .map_err(|_| anyhow::anyhow!("pump writer thread panicked"))?
            .context("read input")?;
        if let Some(e) = output_err {
            return Err(anyhow::Error::new(e).context("write output"));
        }
        output.flush().context("flush output")?;

        let stats = PumpStats {
            bytes_written,
            bytes_read,
            stalls: channel.stalls(),
        };
        debug!(?stats, "pump finished");
        Ok(stats)
    })
}

fn feed<R: Read>(channel: &LoopbackChannel, input: &mut R, chunk_size: usize) -> std::io::Result<u64> {
    let mut buf = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;
    loop {
        let n = match input.read(&mut buf) {
            Ok(0) => return Ok(total),
            Ok(n) => n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        total += channel.write(&buf[..n]) as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use test_log::test;

    struct FailingWriter;

    impl Write for FailingWriter {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::other("disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    #[test]
    fn test_pump_copies_everything() {
        let data = sample(100_000);
        let channel = LoopbackChannel::with_quota(4096);
        let mut out = Vec::new();

        let stats = pump(&channel, Cursor::new(data.clone()), &mut out, 1000).unwrap();
        assert_eq!(out, data);
        assert_eq!(stats.bytes_written, data.len() as u64);
        assert_eq!(stats.bytes_read, data.len() as u64);
        assert_eq!(channel.buffered(), 0);
    }

    #[test]
    fn test_pump_chunk_larger_than_quota() {
        let data = sample(10_000);
        let channel = LoopbackChannel::with_quota(64);
        let mut out = Vec::new();

        let stats = pump(&channel, Cursor::new(data.clone()), &mut out, 512).unwrap();
        assert_eq!(out, data);
        // every chunk alone exceeds the quota
        assert!(stats.stalls > 0);
    }

    #[test]
    fn test_pump_empty_input() {
        let channel = LoopbackChannel::new();
        let mut out = Vec::new();
        let stats = pump(&channel, Cursor::new(Vec::new()), &mut out, 16).unwrap();
        assert!(out.is_empty());
        assert_eq!(stats, PumpStats::default());
    }

    #[test]
    fn test_next_drain() {
        assert_eq!(next_drain(Ok(5), false), Ok(Drain::Data(5)));
        assert_eq!(next_drain(Ok(0), true), Ok(Drain::Data(0)));
        assert_eq!(next_drain(Err(LoopbackError::EndOfData), false), Ok(Drain::Idle));
        assert_eq!(next_drain(Err(LoopbackError::EndOfData), true), Ok(Drain::Done));

        // a failure is not mistaken for an empty backlog
        let err = LoopbackError::NotImplemented("overflow policy Drop".into());
        assert_eq!(next_drain(Err(err.clone()), true), Err(err.clone()));
        assert_eq!(next_drain(Err(err.clone()), false), Err(err));
    }

    #[test]
    fn test_pump_output_error_does_not_hang() {
        let data = sample(50_000);
        let channel = LoopbackChannel::with_quota(128);
        let err = pump(&channel, Cursor::new(data), FailingWriter, 256).unwrap_err();
        assert!(err.to_string().contains("write output"));
        assert_eq!(channel.buffered(), 0);
    }
}
