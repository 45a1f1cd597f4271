//! Length-prefixed framing.
//!
//! Writes accumulate until `flush`, which emits one frame: a 4-byte
//! big-endian length followed by the payload. Reads pull whole frames and
//! serve bytes from them.

use std::io::{self, Read, Write};

use bytes::{Buf, BufMut, BytesMut};

pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

#[derive(Debug)]
pub struct FramedTransport<T> {
    inner: T,
    read_buf: BytesMut,
    write_buf: BytesMut,
    max_frame_size: usize,
}

impl<T> FramedTransport<T> {
    pub fn new(inner: T) -> Self {
        Self::with_max_frame_size(inner, DEFAULT_MAX_FRAME_SIZE)
    }

    pub fn with_max_frame_size(inner: T, max_frame_size: usize) -> Self {
        Self {
            inner,
            read_buf: BytesMut::new(),
            write_buf: BytesMut::new(),
            max_frame_size,
        }
    }

    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T: Read> FramedTransport<T> {
    fn read_frame(&mut self) -> io::Result<()> {
        let mut prefix = [0u8; 4];
        self.inner.read_exact(&mut prefix)?;
        let size = i32::from_be_bytes(prefix);
        let size = usize::try_from(size).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidData, format!("negative frame size {size}"))
        })?;
        if size > self.max_frame_size {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "frame of {size} bytes exceeds the {} byte limit",
                    self.max_frame_size
                ),
            ));
        }
        self.read_buf.clear();
        self.read_buf.resize(size, 0);
        if let Err(err) = self.inner.read_exact(&mut self.read_buf) {
            self.read_buf.clear();
            return Err(err);
        }
        Ok(())
    }
}

impl<T: Read> Read for FramedTransport<T> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while self.read_buf.is_empty() {
            self.read_frame()?;
        }
        let n = buf.len().min(self.read_buf.len());
        buf[..n].copy_from_slice(&self.read_buf[..n]);
        self.read_buf.advance(n);
        Ok(n)
    }
}

impl<T: Write> Write for FramedTransport<T> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_buf.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.write_buf.is_empty() {
            let len = self.write_buf.len();
            let Some(size) = i32::try_from(len)
                .ok()
                .filter(|_| len <= self.max_frame_size)
            else {
                // Drop the rejected payload so it cannot prefix the next frame.
                self.write_buf.clear();
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!(
                        "frame of {len} bytes exceeds the {} byte limit",
                        self.max_frame_size
                    ),
                ));
            };
            let mut frame = BytesMut::with_capacity(4 + self.write_buf.len());
            frame.put_i32(size);
            frame.put_slice(&self.write_buf);
            self.write_buf.clear();
            self.inner.write_all(&frame)?;
        }
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use proptest::prelude::*;

    use super::*;

    #[test]
    fn flush_emits_one_length_prefixed_frame() {
        let mut transport = FramedTransport::new(Vec::new());
        transport.write_all(b"hello ").unwrap();
        transport.write_all(b"world").unwrap();
        assert!(transport.get_ref().is_empty());

        transport.flush().unwrap();
        let bytes = transport.into_inner();
        assert_eq!(&bytes[..4], &11i32.to_be_bytes());
        assert_eq!(&bytes[4..], b"hello world");
    }

    #[test]
    fn empty_flush_writes_nothing() {
        let mut transport = FramedTransport::new(Vec::new());
        transport.flush().unwrap();
        assert!(transport.into_inner().is_empty());
    }

    #[test]
    fn reads_span_consecutive_frames() {
        let mut wire = Vec::new();
        for payload in [&b"ab"[..], &b""[..], &b"cde"[..]] {
            wire.extend_from_slice(&i32::try_from(payload.len()).unwrap().to_be_bytes());
            wire.extend_from_slice(payload);
        }
        let mut transport = FramedTransport::new(Cursor::new(wire));
        let mut out = [0u8; 5];
        transport.read_exact(&mut out).unwrap();
        assert_eq!(&out, b"abcde");
    }

    #[test]
    fn oversized_frame_rejected() {
        let wire = 1024i32.to_be_bytes().to_vec();
        let mut transport = FramedTransport::with_max_frame_size(Cursor::new(wire), 16);
        let err = transport.read(&mut [0u8; 1]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn negative_frame_rejected() {
        let wire = (-1i32).to_be_bytes().to_vec();
        let mut transport = FramedTransport::new(Cursor::new(wire));
        let err = transport.read(&mut [0u8; 1]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn oversized_write_rejected_on_flush() {
        let mut transport = FramedTransport::with_max_frame_size(Vec::new(), 4);
        transport.write_all(b"too long").unwrap();
        let err = transport.flush().unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn rejected_frame_does_not_leak_into_next_flush() {
        let mut transport = FramedTransport::with_max_frame_size(Vec::new(), 4);
        transport.write_all(b"too long").unwrap();
        transport.flush().unwrap_err();

        transport.write_all(b"ok").unwrap();
        transport.flush().unwrap();
        let bytes = transport.into_inner();
        assert_eq!(&bytes[..4], &2i32.to_be_bytes());
        assert_eq!(&bytes[4..], b"ok");
    }

    #[test]
    fn truncated_frame_is_eof() {
        let mut wire = 8i32.to_be_bytes().to_vec();
        wire.extend_from_slice(b"abc");
        let mut transport = FramedTransport::new(Cursor::new(wire));
        let err = transport.read(&mut [0u8; 1]).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    proptest! {
        // However a message is split across writes and reads, the peer sees
        // one frame per flush with the bytes in order.
        #[test]
        fn frames_preserve_bytes_across_chunking(
            messages in proptest::collection::vec(
                proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..16), 0..6),
                1..5,
            ),
            read_size in 1usize..32,
        ) {
            let mut writer = FramedTransport::new(Vec::new());
            let mut expected = Vec::new();
            let mut frames = 0;
            for chunks in &messages {
                for chunk in chunks {
                    writer.write_all(chunk).unwrap();
                    expected.extend_from_slice(chunk);
                }
                if chunks.iter().any(|c| !c.is_empty()) {
                    frames += 1;
                }
                writer.flush().unwrap();
            }
            let wire = writer.into_inner();
            prop_assert_eq!(wire.len(), expected.len() + 4 * frames);

            let mut reader = FramedTransport::new(Cursor::new(wire));
            let mut actual = Vec::new();
            let mut buf = vec![0u8; read_size];
            while actual.len() < expected.len() {
                let n = reader.read(&mut buf).unwrap();
                actual.extend_from_slice(&buf[..n]);
            }
            prop_assert_eq!(actual, expected);
        }
    }
}
