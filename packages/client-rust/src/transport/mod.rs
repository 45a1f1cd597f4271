//! Byte-stream transports underneath the protocol.
//!
//! # Data Flow
//! ```text
//! Endpoint
//!     → socket.rs (TCP / Unix socket, timeouts)
//!     → tls.rs (optional rustls handshake, TCP only)
//!     → TransportFactory (framed by default, or buffered)
//!     → ProtocolFactory (binary)
//! ```

pub mod buffered;
pub mod framed;
pub mod memory;
pub mod socket;
pub mod tls;

use std::io::{Read, Write};

pub use buffered::BufferedTransport;
pub use framed::FramedTransport;
pub use memory::{CapturedOutput, MemoryTransport};
pub use socket::Stream;

/// A duplex byte stream a protocol can run over.
pub trait Transport: Read + Write + Send {}

impl<T: Read + Write + Send + ?Sized> Transport for T {}

impl std::fmt::Debug for dyn Transport + '_ {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("dyn Transport")
    }
}

/// Wraps a freshly opened stream in a framing or buffering layer.
pub trait TransportFactory {
    fn transport(&self, stream: Box<dyn Transport>) -> Box<dyn Transport>;
}

/// Produces [`FramedTransport`]s. This is what Finagle servers expect.
#[derive(Debug, Clone, Copy)]
pub struct FramedTransportFactory {
    pub max_frame_size: usize,
}

impl Default for FramedTransportFactory {
    fn default() -> Self {
        Self {
            max_frame_size: framed::DEFAULT_MAX_FRAME_SIZE,
        }
    }
}

impl TransportFactory for FramedTransportFactory {
    fn transport(&self, stream: Box<dyn Transport>) -> Box<dyn Transport> {
        Box::new(FramedTransport::with_max_frame_size(stream, self.max_frame_size))
    }
}

/// Produces [`BufferedTransport`]s for servers speaking unframed Thrift.
#[derive(Debug, Clone, Copy)]
pub struct BufferedTransportFactory {
    pub capacity: usize,
}

impl Default for BufferedTransportFactory {
    fn default() -> Self {
        Self {
            capacity: buffered::DEFAULT_CAPACITY,
        }
    }
}

impl TransportFactory for BufferedTransportFactory {
    fn transport(&self, stream: Box<dyn Transport>) -> Box<dyn Transport> {
        Box::new(BufferedTransport::with_capacity(stream, self.capacity))
    }
}
