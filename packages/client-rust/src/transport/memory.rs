//! In-process transport with scripted input and captured output.
//!
//! Reads are served from a fixed byte buffer (what a peer would have sent);
//! writes land in a [`CapturedOutput`] shared with the caller, so the bytes a
//! client put on the wire can be inspected after the transport has been moved
//! into it.

use std::io::{self, Read, Write};
use std::sync::Arc;

use bytes::{Buf, Bytes};
use parking_lot::Mutex;

#[derive(Debug, Default)]
struct Captured {
    written: Vec<u8>,
    flushes: usize,
}

/// Shared handle onto everything written to a [`MemoryTransport`].
#[derive(Debug, Clone, Default)]
pub struct CapturedOutput {
    inner: Arc<Mutex<Captured>>,
}

impl CapturedOutput {
    /// Copy of all bytes written so far.
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.inner.lock().written.clone()
    }

    /// Removes and returns all bytes written so far.
    #[must_use]
    pub fn take(&self) -> Vec<u8> {
        std::mem::take(&mut self.inner.lock().written)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().written.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of times the transport was flushed.
    #[must_use]
    pub fn flushes(&self) -> usize {
        self.inner.lock().flushes
    }
}

#[derive(Debug)]
pub struct MemoryTransport {
    input: Bytes,
    output: CapturedOutput,
}

impl MemoryTransport {
    /// Creates a transport that will yield `input` to readers, and a handle
    /// onto its output.
    pub fn new(input: impl Into<Bytes>) -> (Self, CapturedOutput) {
        let output = CapturedOutput::default();
        let transport = Self {
            input: input.into(),
            output: output.clone(),
        };
        (transport, output)
    }

    /// Bytes not yet consumed by readers.
    #[must_use]
    pub fn remaining_input(&self) -> usize {
        self.input.remaining()
    }
}

impl Read for MemoryTransport {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = buf.len().min(self.input.remaining());
        self.input.copy_to_slice(&mut buf[..n]);
        Ok(n)
    }
}

impl Write for MemoryTransport {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.output.inner.lock().written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.inner.lock().flushes += 1;
        Ok(())
    }
}
