//! Building a negotiated session from a [`ClientConfig`].

use finagle_thrift_core::BinaryProtocol;

use crate::client::{BinaryProtocolFactory, ProtocolFactory, ThriftClient};
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::tracing_client::TracingClient;
use crate::transport::{socket, FramedTransportFactory, Transport, TransportFactory};

/// Session type returned by [`connect`].
pub type Connection = TracingClient<ThriftClient<BinaryProtocol<Box<dyn Transport>>>>;

/// Opens a framed binary connection and negotiates the tracing upgrade.
///
/// # Errors
///
/// `ClientError::Config` before any I/O when the configuration is invalid;
/// socket, TLS and handshake failures otherwise.
pub fn connect(config: &ClientConfig) -> Result<Connection, ClientError> {
    connect_with(
        config,
        &BinaryProtocolFactory::default(),
        &FramedTransportFactory::default(),
    )
}

/// Like [`connect`] with caller-chosen protocol and transport layers.
///
/// # Errors
///
/// As for [`connect`].
pub fn connect_with<PF, TF>(
    config: &ClientConfig,
    protocol_factory: &PF,
    transport_factory: &TF,
) -> Result<TracingClient<ThriftClient<PF::Protocol>>, ClientError>
where
    PF: ProtocolFactory + ?Sized,
    TF: TransportFactory + ?Sized,
{
    let endpoint = config.validate()?;
    tracing::debug!(client_id = %config.client_id, ?endpoint, "opening connection");

    let stream = socket::open(&endpoint, config.timeout)?;
    let transport = transport_factory.transport(Box::new(stream));
    let protocol = protocol_factory.protocol(transport);
    TracingClient::new(config.client_id.clone(), ThriftClient::new(protocol))
}
