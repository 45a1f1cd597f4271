//! Client wrapper that speaks Finagle's upgraded dialect when the server
//! supports it.

use finagle_thrift_core::{
    current_stack, RequestContext, RequestHeader, ResponseHeader, ThriftStruct,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::client::RpcClient;
use crate::error::ClientError;
use crate::negotiation::{negotiate, NegotiationState};

/// Broadcast context key carrying the caller's identity.
pub const CLIENT_ID_CONTEXT_KEY: &str = "com.twitter.finagle.thrift.ClientIdContext";

/// A negotiated session over an inner [`RpcClient`].
///
/// Construction runs the upgrade handshake. On an upgraded connection every
/// call is preceded by a `RequestHeader` carrying fresh trace ids, the client
/// id and the caller's broadcast contexts, and every reply is preceded by a
/// `ResponseHeader` that is consumed and discarded. On a legacy connection
/// calls pass through unchanged.
#[derive(Debug)]
pub struct TracingClient<C> {
    client_id: String,
    state: NegotiationState,
    inner: C,
    rng: StdRng,
}

impl<C: RpcClient> TracingClient<C> {
    /// Negotiates over `inner` and returns the session.
    ///
    /// # Errors
    ///
    /// Transport and decode failures during the handshake.
    pub fn new(client_id: impl Into<String>, inner: C) -> Result<Self, ClientError> {
        Self::with_rng(client_id, inner, StdRng::from_os_rng())
    }

    /// Like [`new`](Self::new) with a caller-supplied id generator.
    ///
    /// # Errors
    ///
    /// Transport and decode failures during the handshake.
    pub fn with_rng(
        client_id: impl Into<String>,
        mut inner: C,
        rng: StdRng,
    ) -> Result<Self, ClientError> {
        let client_id = client_id.into();
        let state = negotiate(&mut inner)?;
        tracing::debug!(client_id = %client_id, ?state, "negotiated connection");
        Ok(Self {
            client_id,
            state,
            inner,
            rng,
        })
    }

    fn next_request_header(&mut self) -> RequestHeader {
        let id = i64::from(self.rng.random::<u32>());
        let stack = current_stack();
        let mut contexts = Vec::with_capacity(1 + stack.depth());
        contexts.push(RequestContext::new(
            CLIENT_ID_CONTEXT_KEY,
            self.client_id.as_bytes(),
        ));
        contexts.extend(stack.to_wire());
        RequestHeader {
            trace_id: id,
            span_id: id,
            parent_span_id: Some(id),
            sampled: Some(false),
            flags: Some(0),
            contexts,
            delegations: Some(Vec::new()),
            ..RequestHeader::default()
        }
    }
}

impl<C> TracingClient<C> {
    #[must_use]
    pub fn negotiation_state(&self) -> NegotiationState {
        self.state
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn inner(&self) -> &C {
        &self.inner
    }

    pub fn into_inner(self) -> C {
        self.inner
    }
}

impl<C: RpcClient> RpcClient for TracingClient<C> {
    type Protocol = C::Protocol;

    fn protocol_mut(&mut self) -> &mut Self::Protocol {
        self.inner.protocol_mut()
    }

    fn seq_id(&self) -> i32 {
        self.inner.seq_id()
    }

    fn send<A: ThriftStruct>(&mut self, method: &str, args: &A) -> Result<(), ClientError> {
        if self.state.is_upgraded() {
            let header = self.next_request_header();
            tracing::trace!(
                method,
                trace_id = header.trace_id,
                contexts = header.contexts.len(),
                "writing request header"
            );
            header.write(self.inner.protocol_mut())?;
        }
        self.inner.send(method, args)
    }

    fn recv<R: ThriftStruct>(&mut self, method: &str) -> Result<R, ClientError> {
        if self.state.is_upgraded() {
            let header = ResponseHeader::read(self.inner.protocol_mut())?;
            tracing::trace!(method, contexts = header.contexts.len(), "read response header");
        }
        self.inner.recv(method)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use finagle_thrift_core::{
        enter_context, ApplicationException, ApplicationExceptionKind, BinaryProtocol,
        MessageHeader, MessageType, ProtocolRead, UpgradeReply,
    };

    use super::*;
    use crate::client::tests::{server_bytes, write_reply, Echo};
    use crate::client::ThriftClient;
    use crate::negotiation::TRACE_METHOD;
    use crate::transport::{CapturedOutput, FramedTransport, MemoryTransport};

    type MemoryClient = ThriftClient<BinaryProtocol<MemoryTransport>>;

    fn upgraded_input(replies: &[(i32, &str)]) -> Vec<u8> {
        server_bytes(|p| {
            write_reply(p, MessageHeader::new(TRACE_METHOD, MessageType::Reply, 0), &UpgradeReply);
            for (seq_id, value) in replies {
                ResponseHeader::default().write(p).unwrap();
                write_reply(
                    p,
                    MessageHeader::new("echo", MessageType::Reply, *seq_id),
                    &Echo::new(value),
                );
            }
        })
    }

    fn legacy_input(replies: &[(i32, &str)]) -> Vec<u8> {
        server_bytes(|p| {
            write_reply(
                p,
                MessageHeader::new(TRACE_METHOD, MessageType::Exception, 0),
                &ApplicationException::new(ApplicationExceptionKind::UnknownMethod, "no"),
            );
            for (seq_id, value) in replies {
                write_reply(
                    p,
                    MessageHeader::new("echo", MessageType::Reply, *seq_id),
                    &Echo::new(value),
                );
            }
        })
    }

    fn session(input: Vec<u8>, seed: u64) -> (TracingClient<MemoryClient>, CapturedOutput) {
        let (transport, output) = MemoryTransport::new(input);
        let client = TracingClient::with_rng(
            "svc-a",
            ThriftClient::new(BinaryProtocol::new(transport)),
            StdRng::seed_from_u64(seed),
        )
        .unwrap();
        // Drop the negotiation handshake.
        let _ = output.take();
        (client, output)
    }

    fn decode_call(bytes: Vec<u8>) -> (RequestHeader, MessageHeader, Echo) {
        let mut protocol = BinaryProtocol::new(Cursor::new(bytes));
        let header = RequestHeader::read(&mut protocol).unwrap();
        let envelope = protocol.read_message_begin().unwrap();
        let args = Echo::read(&mut protocol).unwrap();
        protocol.read_message_end().unwrap();
        let consumed = usize::try_from(protocol.transport().position()).unwrap();
        assert_eq!(consumed, protocol.transport().get_ref().len());
        (header, envelope, args)
    }

    #[test]
    fn upgraded_call_carries_client_id_then_stack() {
        let (mut client, output) = session(upgraded_input(&[(1, "pong")]), 7);
        assert_eq!(client.negotiation_state(), NegotiationState::Upgraded);

        let reply: Echo = {
            let _k1 = enter_context("k1", "v1");
            client.call("echo", &Echo::new("ping")).unwrap()
        };
        assert_eq!(reply, Echo::new("pong"));

        let (header, envelope, args) = decode_call(output.take());
        let expected_id = i64::from(StdRng::seed_from_u64(7).random::<u32>());
        assert_eq!(header.trace_id, expected_id);
        assert_eq!(header.span_id, expected_id);
        assert_eq!(header.parent_span_id, Some(expected_id));
        assert_eq!(header.sampled, Some(false));
        assert_eq!(header.flags, Some(0));
        assert_eq!(header.delegations, Some(Vec::new()));
        assert_eq!(
            header.contexts,
            vec![
                RequestContext::new(CLIENT_ID_CONTEXT_KEY, "svc-a"),
                RequestContext::new("k1", "v1"),
            ]
        );
        assert_eq!(envelope, MessageHeader::new("echo", MessageType::Call, 1));
        assert_eq!(args, Echo::new("ping"));
    }

    #[test]
    fn ids_are_fresh_per_call() {
        let (mut client, output) = session(upgraded_input(&[(1, "a"), (2, "b")]), 11);
        let _: Echo = client.call("echo", &Echo::new("a")).unwrap();
        let (first, _, _) = decode_call(output.take());
        let _: Echo = client.call("echo", &Echo::new("b")).unwrap();
        let (second, envelope, _) = decode_call(output.take());

        assert_eq!(envelope.seq_id, 2);
        assert_ne!(first.trace_id, second.trace_id);
        for header in [&first, &second] {
            assert!((0..=i64::from(u32::MAX)).contains(&header.trace_id));
            assert_eq!(header.span_id, header.trace_id);
        }
        // Only the client id context outside any scope.
        assert_eq!(first.contexts.len(), 1);
    }

    #[test]
    fn legacy_calls_match_plain_client_bytes() {
        let (mut traced, traced_output) = session(legacy_input(&[(1, "pong")]), 3);
        assert_eq!(traced.negotiation_state(), NegotiationState::Legacy);

        let plain_input = server_bytes(|p| {
            write_reply(p, MessageHeader::new("echo", MessageType::Reply, 1), &Echo::new("pong"));
        });
        let (transport, plain_output) = MemoryTransport::new(plain_input);
        let mut plain = ThriftClient::new(BinaryProtocol::new(transport));

        let _scope = enter_context("k1", "v1");
        let traced_reply: Echo = traced.call("echo", &Echo::new("ping")).unwrap();
        let plain_reply: Echo = plain.call("echo", &Echo::new("ping")).unwrap();
        assert_eq!(traced_reply, plain_reply);
        assert_eq!(traced_output.bytes(), plain_output.bytes());
    }

    #[test]
    fn header_and_call_share_one_frame() {
        let input = server_bytes(|p| {
            write_reply(p, MessageHeader::new(TRACE_METHOD, MessageType::Reply, 0), &UpgradeReply);
        });
        let mut framed_input = Vec::new();
        framed_input.extend_from_slice(&i32::try_from(input.len()).unwrap().to_be_bytes());
        framed_input.extend_from_slice(&input);

        let (transport, output) = MemoryTransport::new(framed_input);
        let mut client = TracingClient::new(
            "svc-a",
            ThriftClient::new(BinaryProtocol::new(FramedTransport::new(transport))),
        )
        .unwrap();
        let _ = output.take();

        client.send("echo", &Echo::new("ping")).unwrap();
        let frame = output.take();
        let size = usize::try_from(i32::from_be_bytes([frame[0], frame[1], frame[2], frame[3]]))
            .unwrap();
        assert_eq!(size, frame.len() - 4);
        let (header, envelope, _) = decode_call(frame[4..].to_vec());
        assert_eq!(header.contexts.len(), 1);
        assert_eq!(envelope.name, "echo");
    }

    #[test]
    fn response_header_with_unknown_fields_is_skipped() {
        let input = server_bytes(|p| {
            use finagle_thrift_core::{ProtocolWrite, TType};
            write_reply(p, MessageHeader::new(TRACE_METHOD, MessageType::Reply, 0), &UpgradeReply);
            p.write_struct_begin("ResponseHeader").unwrap();
            p.write_field_begin("extra", TType::I64, 9).unwrap();
            p.write_i64(42).unwrap();
            p.write_field_end().unwrap();
            p.write_field_stop().unwrap();
            p.write_struct_end().unwrap();
            write_reply(p, MessageHeader::new("echo", MessageType::Reply, 1), &Echo::new("pong"));
        });
        let (mut client, _output) = session(input, 1);
        let reply: Echo = client.call("echo", &Echo::new("ping")).unwrap();
        assert_eq!(reply.value, "pong");
    }

    #[test]
    fn truncated_response_header_fails_the_call() {
        let mut input = upgraded_input(&[]);
        // ResponseHeader cut off inside its contexts list header.
        input.extend_from_slice(&[15, 0, 1, 12]);
        let (mut client, _output) = session(input, 1);
        let err = client.call::<_, Echo>("echo", &Echo::new("ping")).unwrap_err();
        assert!(matches!(err, ClientError::Transport(_)));
    }

    #[test]
    fn accessors_reflect_the_session() {
        let (client, _output) = session(legacy_input(&[]), 1);
        assert_eq!(client.client_id(), "svc-a");
        assert_eq!(client.seq_id(), 0);
    }
}
