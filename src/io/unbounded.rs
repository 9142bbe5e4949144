use std::io::{Read, Write};

use super::ByteChannel;
use super::backlog::Backlog;
use crate::error::{LoopbackError, read_result_to_io};

/// Single-owner loopback without locking or quota. Writes never block.
#[derive(Debug, Default)]
pub struct UnboundedLoopback {
    backlog: Backlog,
}

impl UnboundedLoopback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write(&mut self, data: &[u8]) -> usize {
        self.backlog.push(data);
        data.len()
    }

    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, LoopbackError> {
        self.backlog.drain_into(buf)
    }

    pub fn buffered(&self) -> usize {
        self.backlog.len()
    }
}

impl ByteChannel for UnboundedLoopback {
    fn write_bytes(&mut self, data: &[u8]) -> usize {
        UnboundedLoopback::write(self, data)
    }

    fn read_bytes(&mut self, buf: &mut [u8]) -> Result<usize, LoopbackError> {
        UnboundedLoopback::read(self, buf)
    }

    fn buffered(&self) -> usize {
        UnboundedLoopback::buffered(self)
    }
}

impl Read for UnboundedLoopback {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        read_result_to_io(UnboundedLoopback::read(self, buf))
    }
}

impl Write for UnboundedLoopback {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Ok(UnboundedLoopback::write(self, buf))
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
