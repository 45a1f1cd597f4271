//! Finagle Thrift core: the Thrift binary protocol, the wire structures of
//! Finagle's tracing upgrade, and the broadcast context stack.

pub mod context;
pub mod messages;
pub mod protocol;
pub mod traits;

pub use context::{
    authorize, authorized, current_contexts, current_stack, depth, enter_context, isolated, scope,
    Context, ContextScope, ContextStack, AUTH_TOKEN_KEY,
};
pub use messages::{
    ApplicationException, ApplicationExceptionKind, ClientId, ConnectionOptions, Delegation,
    RequestContext, RequestHeader, ResponseHeader, UpgradeReply,
};
pub use protocol::{
    BinaryProtocol, MessageHeader, MessageType, Protocol, ProtocolError, ProtocolRead,
    ProtocolWrite, TType,
};
pub use traits::{ThriftStruct, Unit};
