//! Read and write buffering without framing.

use std::io::{self, Read, Write};

use bytes::{Buf, BytesMut};

pub const DEFAULT_CAPACITY: usize = 4096;

#[derive(Debug)]
pub struct BufferedTransport<T> {
    inner: T,
    read_buf: BytesMut,
    write_buf: BytesMut,
    capacity: usize,
}

impl<T> BufferedTransport<T> {
    pub fn new(inner: T) -> Self {
        Self::with_capacity(inner, DEFAULT_CAPACITY)
    }

    pub fn with_capacity(inner: T, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner,
            read_buf: BytesMut::with_capacity(capacity),
            write_buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read> Read for BufferedTransport<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.read_buf.is_empty() {
            if buf.len() >= self.capacity {
                return self.inner.read(buf);
            }
            self.read_buf.resize(self.capacity, 0);
            match self.inner.read(&mut self.read_buf) {
                Ok(n) => self.read_buf.truncate(n),
                Err(err) => {
                    self.read_buf.clear();
                    return Err(err);
                }
            }
        }
        let n = buf.len().min(self.read_buf.len());
        buf[..n].copy_from_slice(&self.read_buf[..n]);
        self.read_buf.advance(n);
        Ok(n)
    }
}

impl<T: Write> BufferedTransport<T> {
    fn drain_write_buf(&mut self) -> io::Result<()> {
        if !self.write_buf.is_empty() {
            self.inner.write_all(&self.write_buf)?;
            self.write_buf.clear();
        }
        Ok(())
    }
}

impl<T: Write> Write for BufferedTransport<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_buf.extend_from_slice(buf);
        if self.write_buf.len() >= self.capacity {
            self.drain_write_buf()?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.drain_write_buf()?;
        self.inner.flush()
    }
}
