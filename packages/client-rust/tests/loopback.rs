//! End-to-end sessions against an in-process server speaking framed binary
//! Thrift, with and without Finagle's tracing upgrade.

use std::io::{Cursor, Read, Write};
use std::net::TcpListener;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use finagle_thrift_client::{
    authorize, connect, enter_context, ClientConfig, ClientError, ConfigError, NegotiationState,
    RpcClient, AUTH_TOKEN_KEY, CLIENT_ID_CONTEXT_KEY, TRACE_METHOD,
};
use finagle_thrift_core::{
    ApplicationException, ApplicationExceptionKind, BinaryProtocol, ConnectionOptions,
    MessageHeader, MessageType, ProtocolError, ProtocolRead, ProtocolWrite, RequestContext,
    RequestHeader, ResponseHeader, TType, ThriftStruct, UpgradeReply,
};

#[derive(Debug, Clone, PartialEq, Eq)]
struct Echo {
    value: String,
}

impl Echo {
    fn new(value: &str) -> Self {
        Self {
            value: value.to_string(),
        }
    }
}

impl ThriftStruct for Echo {
    fn write<W: ProtocolWrite + ?Sized>(&self, protocol: &mut W) -> Result<(), ProtocolError> {
        protocol.write_struct_begin("Echo")?;
        protocol.write_field_begin("value", TType::String, 1)?;
        protocol.write_string(&self.value)?;
        protocol.write_field_end()?;
        protocol.write_field_stop()?;
        protocol.write_struct_end()
    }

    fn read<R: ProtocolRead + ?Sized>(protocol: &mut R) -> Result<Self, ProtocolError> {
        protocol.read_struct_begin()?;
        let mut value = String::new();
        loop {
            let field = protocol.read_field_begin()?;
            match (field.field_type, field.id) {
                (TType::Stop, _) => break,
                (TType::String, 1) => value = protocol.read_string()?,
                (other, _) => protocol.skip(other)?,
            }
            protocol.read_field_end()?;
        }
        protocol.read_struct_end()?;
        Ok(Self { value })
    }
}

fn read_frame(stream: &mut impl Read) -> Vec<u8> {
    let mut prefix = [0u8; 4];
    stream.read_exact(&mut prefix).unwrap();
    let mut payload = vec![0u8; usize::try_from(i32::from_be_bytes(prefix)).unwrap()];
    stream.read_exact(&mut payload).unwrap();
    payload
}

fn write_frame(stream: &mut impl Write, build: impl FnOnce(&mut BinaryProtocol<Vec<u8>>)) {
    let mut protocol = BinaryProtocol::new(Vec::new());
    build(&mut protocol);
    let payload = protocol.into_inner();
    stream
        .write_all(&i32::try_from(payload.len()).unwrap().to_be_bytes())
        .unwrap();
    stream.write_all(&payload).unwrap();
    stream.flush().unwrap();
}

/// Answers the handshake, then serves a single `echo` call by upper-casing
/// its argument. The raw call frame is sent back on `frames`.
fn serve_one(mut stream: impl Read + Write, upgrade: bool, frames: &mpsc::Sender<Vec<u8>>) {
    let handshake = read_frame(&mut stream);
    let mut protocol = BinaryProtocol::new(Cursor::new(handshake));
    let envelope = protocol.read_message_begin().unwrap();
    assert_eq!(envelope.name, TRACE_METHOD);
    assert_eq!(envelope.message_type, MessageType::Call);
    ConnectionOptions::read(&mut protocol).unwrap();

    write_frame(&mut stream, |p| {
        if upgrade {
            p.write_message_begin(&MessageHeader::new(TRACE_METHOD, MessageType::Reply, envelope.seq_id))
                .unwrap();
            UpgradeReply.write(p).unwrap();
        } else {
            p.write_message_begin(&MessageHeader::new(
                TRACE_METHOD,
                MessageType::Exception,
                envelope.seq_id,
            ))
            .unwrap();
            ApplicationException::new(ApplicationExceptionKind::UnknownMethod, "unknown method")
                .write(p)
                .unwrap();
        }
        p.write_message_end().unwrap();
    });

    let call = read_frame(&mut stream);
    frames.send(call.clone()).unwrap();
    let mut protocol = BinaryProtocol::new(Cursor::new(call));
    if upgrade {
        RequestHeader::read(&mut protocol).unwrap();
    }
    let envelope = protocol.read_message_begin().unwrap();
    let args = Echo::read(&mut protocol).unwrap();

    write_frame(&mut stream, |p| {
        if upgrade {
            ResponseHeader {
                contexts: vec![RequestContext::new("server", "ignored")],
            }
            .write(p)
            .unwrap();
        }
        p.write_message_begin(&MessageHeader::new(
            envelope.name.as_str(),
            MessageType::Reply,
            envelope.seq_id,
        ))
        .unwrap();
        Echo::new(&args.value.to_uppercase()).write(p).unwrap();
        p.write_message_end().unwrap();
    });
}

fn tcp_server(upgrade: bool) -> (u16, mpsc::Receiver<Vec<u8>>, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        serve_one(stream, upgrade, &tx);
    });
    (port, rx, handle)
}

/// Decodes a call frame, asserting it holds exactly one optional header and
/// one call.
fn decode_call_frame(frame: Vec<u8>, upgraded: bool) -> (Option<RequestHeader>, MessageHeader) {
    let len = frame.len();
    let mut protocol = BinaryProtocol::new(Cursor::new(frame));
    let header = upgraded.then(|| RequestHeader::read(&mut protocol).unwrap());
    let envelope = protocol.read_message_begin().unwrap();
    Echo::read(&mut protocol).unwrap();
    assert_eq!(usize::try_from(protocol.transport().position()).unwrap(), len);
    (header, envelope)
}

#[test]
fn upgraded_session_over_tcp() {
    let (port, frames, server) = tcp_server(true);
    let config = ClientConfig::new("svc-a")
        .with_tcp("127.0.0.1", port)
        .with_timeout(Duration::from_secs(5));
    let mut client = connect(&config).unwrap();
    assert_eq!(client.negotiation_state(), NegotiationState::Upgraded);

    let reply: Echo = {
        let _scope = enter_context("k1", "v1");
        client.call("echo", &Echo::new("ping")).unwrap()
    };
    assert_eq!(reply, Echo::new("PING"));
    server.join().unwrap();

    let (header, envelope) = decode_call_frame(frames.recv().unwrap(), true);
    let header = header.unwrap();
    assert_eq!(
        header.contexts,
        vec![
            RequestContext::new(CLIENT_ID_CONTEXT_KEY, "svc-a"),
            RequestContext::new("k1", "v1"),
        ]
    );
    assert_eq!(header.trace_id, header.span_id);
    assert_eq!(envelope, MessageHeader::new("echo", MessageType::Call, 1));
}

#[test]
fn legacy_session_over_tcp() {
    let (port, frames, server) = tcp_server(false);
    let config = ClientConfig::new("svc-a")
        .with_tcp("127.0.0.1", port)
        .with_timeout(Duration::from_secs(5));
    let mut client = connect(&config).unwrap();
    assert_eq!(client.negotiation_state(), NegotiationState::Legacy);

    let _scope = enter_context("k1", "v1");
    let reply: Echo = client.call("echo", &Echo::new("ping")).unwrap();
    assert_eq!(reply.value, "PING");
    server.join().unwrap();

    let (header, envelope) = decode_call_frame(frames.recv().unwrap(), false);
    assert!(header.is_none());
    assert_eq!(envelope.seq_id, 1);
}

#[cfg(unix)]
#[test]
fn upgraded_session_over_unix_socket() {
    use std::os::unix::net::UnixListener;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("thrift.sock");
    let listener = UnixListener::bind(&path).unwrap();
    let (tx, frames) = mpsc::channel();
    let server = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        serve_one(stream, true, &tx);
    });

    let config = ClientConfig::new("svc-b")
        .with_unix_socket(&path)
        .with_timeout(Duration::from_secs(5));
    let mut client = connect(&config).unwrap();
    assert!(client.negotiation_state().is_upgraded());

    let reply: Echo = {
        let _auth = authorize("secret-token");
        client.call("echo", &Echo::new("hi")).unwrap()
    };
    assert_eq!(reply.value, "HI");
    server.join().unwrap();

    let (header, _) = decode_call_frame(frames.recv().unwrap(), true);
    assert_eq!(
        header.unwrap().contexts,
        vec![
            RequestContext::new(CLIENT_ID_CONTEXT_KEY, "svc-b"),
            RequestContext::new(AUTH_TOKEN_KEY, "secret-token"),
        ]
    );
}

#[test]
fn server_closing_during_handshake_fails_construction() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    let server = thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        read_frame(&mut stream);
    });

    let config = ClientConfig::new("svc-a")
        .with_tcp("127.0.0.1", port)
        .with_timeout(Duration::from_secs(5));
    let err = connect(&config).unwrap_err();
    assert!(matches!(err, ClientError::Transport(_)), "{err:?}");
    server.join().unwrap();
}

#[test]
fn invalid_config_never_touches_the_network() {
    let config = ClientConfig::new("").with_tcp("127.0.0.1", 1);
    assert!(matches!(
        connect(&config),
        Err(ClientError::Config(ConfigError::MissingClientId))
    ));
}
