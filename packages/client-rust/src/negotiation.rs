//! Finagle's tracing upgrade handshake.
//!
//! Before its first call a client sends the reserved method
//! [`TRACE_METHOD`] with empty `ConnectionOptions`. A Finagle server answers
//! with an `UpgradeReply` and from then on expects a `RequestHeader` before
//! every call and sends a `ResponseHeader` before every reply. Any other
//! server answers with an "unknown method" exception and the connection
//! stays on plain Thrift.

use finagle_thrift_core::{
    ApplicationException, ConnectionOptions, MessageHeader, MessageType, ProtocolRead,
    ProtocolWrite, ThriftStruct,
    UpgradeReply,
};

use crate::client::RpcClient;
use crate::error::ClientError;

/// Reserved method name of the upgrade handshake.
pub const TRACE_METHOD: &str = "__can__finagle__trace__v3__";

/// Dialect spoken on a connection.
///
/// A session leaves `Unnegotiated` exactly once, during construction, and
/// never changes state afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NegotiationState {
    #[default]
    Unnegotiated,
    /// Headers wrap every call and reply.
    Upgraded,
    /// Plain Thrift; the server did not recognise the handshake.
    Legacy,
}

impl NegotiationState {
    #[must_use]
    pub fn is_upgraded(self) -> bool {
        self == Self::Upgraded
    }
}

/// Runs the handshake over `client`'s protocol.
///
/// The handshake call reuses the client's current sequence id without advancing it.
/// An exception reply is the expected answer from a non-Finagle server and
/// yields [`NegotiationState::Legacy`], not an error.
///
/// # Errors
///
/// Transport failures and malformed replies. There is no retry.
pub fn negotiate<C: RpcClient>(client: &mut C) -> Result<NegotiationState, ClientError> {
    let seq_id = client.seq_id();
    let protocol = client.protocol_mut();

    protocol.write_message_begin(&MessageHeader::new(TRACE_METHOD, MessageType::Call, seq_id))?;
    ConnectionOptions.write(protocol)?;
    protocol.write_message_end()?;
    protocol.flush()?;

    let reply = protocol.read_message_begin()?;
    let state = if reply.message_type == MessageType::Exception {
        let exception = ApplicationException::read(protocol)?;
        tracing::debug!(error = %exception, "server declined tracing upgrade");
        NegotiationState::Legacy
    } else {
        UpgradeReply::read(protocol)?;
        NegotiationState::Upgraded
    };
    protocol.read_message_end()?;
    Ok(state)
}
