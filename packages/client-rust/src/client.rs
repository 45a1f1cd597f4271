//! The plain Thrift call pipeline.
//!
//! [`RpcClient`] is the seam the tracing layer wraps: it exposes the
//! protocol (so a header can be written into the same frame as the call) and
//! the current sequence id (so negotiation can reuse it).

use finagle_thrift_core::{
    ApplicationException, BinaryProtocol, MessageHeader, MessageType, Protocol, ThriftStruct,
};

use crate::error::ClientError;
use crate::transport::Transport;

/// A client able to send Thrift calls and receive their replies.
pub trait RpcClient {
    type Protocol: Protocol;

    /// The protocol the client writes calls to and reads replies from.
    fn protocol_mut(&mut self) -> &mut Self::Protocol;

    /// Sequence id of the most recently sent call.
    fn seq_id(&self) -> i32;

    /// Writes one `CALL` message for `method` and flushes it.
    ///
    /// # Errors
    ///
    /// Transport or encoding failures.
    fn send<A: ThriftStruct>(&mut self, method: &str, args: &A) -> Result<(), ClientError>;

    /// Reads the reply to the last call to `method`.
    ///
    /// # Errors
    ///
    /// `ClientError::Application` when the server answered with an
    /// exception; typed envelope errors when the reply does not match the
    /// call; transport or decode failures otherwise.
    fn recv<R: ThriftStruct>(&mut self, method: &str) -> Result<R, ClientError>;

    /// Sends a call and waits for its reply.
    ///
    /// # Errors
    ///
    /// As for [`send`](Self::send) and [`recv`](Self::recv).
    fn call<A: ThriftStruct, R: ThriftStruct>(
        &mut self,
        method: &str,
        args: &A,
    ) -> Result<R, ClientError> {
        self.send(method, args)?;
        self.recv(method)
    }
}

/// Wraps a freshly built transport in a protocol.
pub trait ProtocolFactory {
    type Protocol: Protocol;

    fn protocol(&self, transport: Box<dyn Transport>) -> Self::Protocol;
}

/// Produces [`BinaryProtocol`]s. Defaults to lenient reads and strict writes.
#[derive(Debug, Clone, Copy)]
pub struct BinaryProtocolFactory {
    pub strict_read: bool,
    pub strict_write: bool,
}

impl Default for BinaryProtocolFactory {
    fn default() -> Self {
        Self {
            strict_read: false,
            strict_write: true,
        }
    }
}

impl ProtocolFactory for BinaryProtocolFactory {
    type Protocol = BinaryProtocol<Box<dyn Transport>>;

    fn protocol(&self, transport: Box<dyn Transport>) -> Self::Protocol {
        BinaryProtocol::with_strictness(transport, self.strict_read, self.strict_write)
    }
}

/// Sequential Thrift client over a single protocol.
///
/// One call is in flight at a time: `send` then `recv`. The sequence id is
/// advanced before every call and checked against every reply.
#[derive(Debug)]
pub struct ThriftClient<P> {
    protocol: P,
    seq_id: i32,
}

impl<P: Protocol> ThriftClient<P> {
    pub fn new(protocol: P) -> Self {
        Self { protocol, seq_id: 0 }
    }

    pub fn protocol(&self) -> &P {
        &self.protocol
    }

    pub fn into_protocol(self) -> P {
        self.protocol
    }
}

impl<P: Protocol> RpcClient for ThriftClient<P> {
    type Protocol = P;

    fn protocol_mut(&mut self) -> &mut P {
        &mut self.protocol
    }

    fn seq_id(&self) -> i32 {
        self.seq_id
    }

    fn send<A: ThriftStruct>(&mut self, method: &str, args: &A) -> Result<(), ClientError> {
        self.seq_id = self.seq_id.wrapping_add(1);
        tracing::trace!(method, seq_id = self.seq_id, "sending call");
        self.protocol
            .write_message_begin(&MessageHeader::new(method, MessageType::Call, self.seq_id))?;
        args.write(&mut self.protocol)?;
        self.protocol.write_message_end()?;
        self.protocol.flush()?;
        Ok(())
    }

    fn recv<R: ThriftStruct>(&mut self, method: &str) -> Result<R, ClientError> {
        let header = self.protocol.read_message_begin()?;
        if header.message_type == MessageType::Exception {
            let exception = ApplicationException::read(&mut self.protocol)?;
            self.protocol.read_message_end()?;
            tracing::debug!(method, seq_id = header.seq_id, error = %exception, "call raised");
            return Err(ClientError::Application(exception));
        }
        if header.message_type != MessageType::Reply {
            return Err(ClientError::UnexpectedMessageType {
                method: method.to_string(),
                actual: header.message_type,
            });
        }
        if header.name != method {
            return Err(ClientError::WrongMethodName {
                expected: method.to_string(),
                actual: header.name,
            });
        }
        if header.seq_id != self.seq_id {
            return Err(ClientError::BadSequenceId {
                expected: self.seq_id,
                actual: header.seq_id,
            });
        }
        let result = R::read(&mut self.protocol)?;
        self.protocol.read_message_end()?;
        tracing::trace!(method, seq_id = header.seq_id, "received reply");
        Ok(result)
    }
}
