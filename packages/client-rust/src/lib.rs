//! Finagle Thrift client: upgrade negotiation, per-call tracing headers and
//! the socket, TLS and framing layers underneath.
//!
//! [`connect`] builds a session from a [`ClientConfig`]. Embedders that own
//! their byte stream can skip it and stack the pieces by hand:
//! [`TracingClient::new`] over a [`ThriftClient`] over a
//! [`BinaryProtocol`](finagle_thrift_core::BinaryProtocol) over any
//! [`Transport`]. [`MemoryTransport`] is one such stream, serving scripted
//! server bytes and capturing what the client writes, for exercising
//! generated service code without a server.

pub mod client;
pub mod config;
pub mod connect;
pub mod error;
pub mod negotiation;
pub mod tracing_client;
pub mod transport;

pub use client::{BinaryProtocolFactory, ProtocolFactory, RpcClient, ThriftClient};
pub use config::{ClientConfig, Endpoint, TlsConfig};
pub use connect::{connect, connect_with, Connection};
pub use error::{ClientError, ConfigError};
pub use negotiation::{NegotiationState, TRACE_METHOD};
pub use tracing_client::{TracingClient, CLIENT_ID_CONTEXT_KEY};
pub use transport::{
    BufferedTransportFactory, CapturedOutput, FramedTransportFactory, MemoryTransport, Transport,
    TransportFactory,
};

pub use finagle_thrift_core::{
    authorize, authorized, current_contexts, depth, enter_context, isolated, scope, Context,
    ContextScope, AUTH_TOKEN_KEY,
};
