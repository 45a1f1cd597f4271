//! Thrift protocol abstraction.
//!
//! [`ProtocolWrite`] and [`ProtocolRead`] mirror the field-by-field encoder and
//! decoder interfaces of the reference Thrift libraries. Wire structures in
//! [`crate::messages`] are written against these traits, so any concrete
//! encoding (only [`BinaryProtocol`] ships here) can carry them.

pub mod binary;

pub use binary::BinaryProtocol;

use std::string::FromUtf8Error;

/// Maximum nesting depth followed by [`ProtocolRead::skip`].
pub const MAX_SKIP_DEPTH: usize = 64;

/// Errors raised while encoding or decoding Thrift data.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
    #[error("bad protocol version in message header: {0:#010x}")]
    BadVersion(u32),
    #[error("invalid message type: {0}")]
    InvalidMessageType(u8),
    #[error("invalid field type: {0}")]
    InvalidFieldType(u8),
    #[error("negative size on the wire: {0}")]
    NegativeSize(i32),
    #[error("size {0} does not fit the wire's i32 length prefix")]
    SizeTooLarge(usize),
    #[error("string is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] FromUtf8Error),
    #[error("required field {structure}.{field} is missing")]
    MissingField {
        structure: &'static str,
        field: &'static str,
    },
    #[error("nesting exceeds the skip depth limit of {MAX_SKIP_DEPTH}")]
    DepthLimitExceeded,
    #[error("{0:?} is not a value type")]
    NotAValueType(TType),
}

impl ProtocolError {
    /// Whether the failure came from the underlying transport rather than
    /// from malformed data.
    #[must_use]
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}

/// Wire type tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TType {
    Stop,
    Void,
    Bool,
    Byte,
    Double,
    I16,
    I32,
    I64,
    String,
    Struct,
    Map,
    Set,
    List,
}

impl TType {
    /// Numeric tag written on the wire.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Stop => 0,
            Self::Void => 1,
            Self::Bool => 2,
            Self::Byte => 3,
            Self::Double => 4,
            Self::I16 => 6,
            Self::I32 => 8,
            Self::I64 => 10,
            Self::String => 11,
            Self::Struct => 12,
            Self::Map => 13,
            Self::Set => 14,
            Self::List => 15,
        }
    }
}

impl TryFrom<u8> for TType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => Self::Stop,
            1 => Self::Void,
            2 => Self::Bool,
            3 => Self::Byte,
            4 => Self::Double,
            6 => Self::I16,
            8 => Self::I32,
            10 => Self::I64,
            11 => Self::String,
            12 => Self::Struct,
            13 => Self::Map,
            14 => Self::Set,
            15 => Self::List,
            other => return Err(ProtocolError::InvalidFieldType(other)),
        })
    }
}

/// Kind of message carried by an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    Call,
    Reply,
    Exception,
    Oneway,
}

impl MessageType {
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Call => 1,
            Self::Reply => 2,
            Self::Exception => 3,
            Self::Oneway => 4,
        }
    }
}

impl TryFrom<u8> for MessageType {
    type Error = ProtocolError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(Self::Call),
            2 => Ok(Self::Reply),
            3 => Ok(Self::Exception),
            4 => Ok(Self::Oneway),
            other => Err(ProtocolError::InvalidMessageType(other)),
        }
    }
}

/// Message envelope: method name, message kind and sequence id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageHeader {
    pub name: String,
    pub message_type: MessageType,
    pub seq_id: i32,
}

impl MessageHeader {
    #[must_use]
    pub fn new(name: impl Into<String>, message_type: MessageType, seq_id: i32) -> Self {
        Self {
            name: name.into(),
            message_type,
            seq_id,
        }
    }
}

/// Field header as decoded from the wire. `id` is meaningless for [`TType::Stop`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldHeader {
    pub field_type: TType,
    pub id: i16,
}

/// Header of a list or set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListHeader {
    pub element_type: TType,
    pub size: usize,
}

/// Header of a map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapHeader {
    pub key_type: TType,
    pub value_type: TType,
    pub size: usize,
}

/// Encoder half of a Thrift protocol.
pub trait ProtocolWrite {
    fn write_message_begin(&mut self, header: &MessageHeader) -> Result<(), ProtocolError>;
    fn write_message_end(&mut self) -> Result<(), ProtocolError>;
    fn write_struct_begin(&mut self, name: &str) -> Result<(), ProtocolError>;
    fn write_struct_end(&mut self) -> Result<(), ProtocolError>;
    fn write_field_begin(&mut self, name: &str, field_type: TType, id: i16)
        -> Result<(), ProtocolError>;
    fn write_field_end(&mut self) -> Result<(), ProtocolError>;
    fn write_field_stop(&mut self) -> Result<(), ProtocolError>;
    fn write_list_begin(&mut self, header: ListHeader) -> Result<(), ProtocolError>;
    fn write_list_end(&mut self) -> Result<(), ProtocolError>;
    fn write_set_begin(&mut self, header: ListHeader) -> Result<(), ProtocolError>;
    fn write_set_end(&mut self) -> Result<(), ProtocolError>;
    fn write_map_begin(&mut self, header: MapHeader) -> Result<(), ProtocolError>;
    fn write_map_end(&mut self) -> Result<(), ProtocolError>;
    fn write_bool(&mut self, value: bool) -> Result<(), ProtocolError>;
    fn write_byte(&mut self, value: i8) -> Result<(), ProtocolError>;
    fn write_i16(&mut self, value: i16) -> Result<(), ProtocolError>;
    fn write_i32(&mut self, value: i32) -> Result<(), ProtocolError>;
    fn write_i64(&mut self, value: i64) -> Result<(), ProtocolError>;
    fn write_double(&mut self, value: f64) -> Result<(), ProtocolError>;
    fn write_string(&mut self, value: &str) -> Result<(), ProtocolError>;
    fn write_binary(&mut self, value: &[u8]) -> Result<(), ProtocolError>;

    /// Pushes buffered output to the transport.
    fn flush(&mut self) -> Result<(), ProtocolError>;
}

/// Decoder half of a Thrift protocol.
pub trait ProtocolRead {
    fn read_message_begin(&mut self) -> Result<MessageHeader, ProtocolError>;
    fn read_message_end(&mut self) -> Result<(), ProtocolError>;
    fn read_struct_begin(&mut self) -> Result<(), ProtocolError>;
    fn read_struct_end(&mut self) -> Result<(), ProtocolError>;
    fn read_field_begin(&mut self) -> Result<FieldHeader, ProtocolError>;
    fn read_field_end(&mut self) -> Result<(), ProtocolError>;
    fn read_list_begin(&mut self) -> Result<ListHeader, ProtocolError>;
    fn read_list_end(&mut self) -> Result<(), ProtocolError>;
    fn read_set_begin(&mut self) -> Result<ListHeader, ProtocolError>;
    fn read_set_end(&mut self) -> Result<(), ProtocolError>;
    fn read_map_begin(&mut self) -> Result<MapHeader, ProtocolError>;
    fn read_map_end(&mut self) -> Result<(), ProtocolError>;
    fn read_bool(&mut self) -> Result<bool, ProtocolError>;
    fn read_byte(&mut self) -> Result<i8, ProtocolError>;
    fn read_i16(&mut self) -> Result<i16, ProtocolError>;
    fn read_i32(&mut self) -> Result<i32, ProtocolError>;
    fn read_i64(&mut self) -> Result<i64, ProtocolError>;
    fn read_double(&mut self) -> Result<f64, ProtocolError>;
    fn read_string(&mut self) -> Result<String, ProtocolError>;
    fn read_binary(&mut self) -> Result<Vec<u8>, ProtocolError>;

    /// Consumes and discards one value of the given type, including any
    /// nested containers and structs.
    ///
    /// # Errors
    ///
    /// Fails on transport errors, unknown type tags, `Stop` or `Void` where a
    /// value is expected, or when nesting exceeds [`MAX_SKIP_DEPTH`].
    fn skip(&mut self, field_type: TType) -> Result<(), ProtocolError> {
        skip_at_depth(self, field_type, MAX_SKIP_DEPTH)
    }
}

fn skip_at_depth<P: ProtocolRead + ?Sized>(
    protocol: &mut P,
    field_type: TType,
    depth: usize,
) -> Result<(), ProtocolError> {
    if depth == 0 {
        return Err(ProtocolError::DepthLimitExceeded);
    }
    match field_type {
        // Neither occupies any bytes, so a container of them would let a
        // size prefix drive an unbounded loop.
        TType::Stop | TType::Void => Err(ProtocolError::NotAValueType(field_type)),
        TType::Bool => protocol.read_bool().map(drop),
        TType::Byte => protocol.read_byte().map(drop),
        TType::Double => protocol.read_double().map(drop),
        TType::I16 => protocol.read_i16().map(drop),
        TType::I32 => protocol.read_i32().map(drop),
        TType::I64 => protocol.read_i64().map(drop),
        TType::String => protocol.read_binary().map(drop),
        TType::Struct => {
            protocol.read_struct_begin()?;
            loop {
                let field = protocol.read_field_begin()?;
                if field.field_type == TType::Stop {
                    break;
                }
                skip_at_depth(protocol, field.field_type, depth - 1)?;
                protocol.read_field_end()?;
            }
            protocol.read_struct_end()
        }
        TType::Map => {
            let header = protocol.read_map_begin()?;
            for _ in 0..header.size {
                skip_at_depth(protocol, header.key_type, depth - 1)?;
                skip_at_depth(protocol, header.value_type, depth - 1)?;
            }
            protocol.read_map_end()
        }
        TType::Set => {
            let header = protocol.read_set_begin()?;
            for _ in 0..header.size {
                skip_at_depth(protocol, header.element_type, depth - 1)?;
            }
            protocol.read_set_end()
        }
        TType::List => {
            let header = protocol.read_list_begin()?;
            for _ in 0..header.size {
                skip_at_depth(protocol, header.element_type, depth - 1)?;
            }
            protocol.read_list_end()
        }
    }
}

/// A full-duplex protocol bound to one transport.
pub trait Protocol: ProtocolRead + ProtocolWrite {}

impl<T: ProtocolRead + ProtocolWrite + ?Sized> Protocol for T {}
