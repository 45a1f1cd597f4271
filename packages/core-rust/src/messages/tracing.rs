//! Structures from Finagle's `tracing.thrift`.
//!
//! Only the structures involved in the upgrade handshake and per-call headers
//! are modelled; span and annotation structs are not.

use crate::protocol::{ProtocolError, ProtocolRead, ProtocolWrite, TType};
use crate::traits::ThriftStruct;

use super::{read_struct_list, skip_fields, write_struct_list};

// ---------------------------------------------------------------------------
// Handshake payloads
// ---------------------------------------------------------------------------

/// Argument of the upgrade control call. Carries no fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionOptions;

impl ThriftStruct for ConnectionOptions {
    fn write<P: ProtocolWrite + ?Sized>(&self, protocol: &mut P) -> Result<(), ProtocolError> {
        protocol.write_struct_begin("ConnectionOptions")?;
        protocol.write_field_stop()?;
        protocol.write_struct_end()
    }

    fn read<P: ProtocolRead + ?Sized>(protocol: &mut P) -> Result<Self, ProtocolError> {
        skip_fields(protocol)?;
        Ok(Self)
    }
}

/// Successful reply to the upgrade control call. Carries no fields.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpgradeReply;

impl ThriftStruct for UpgradeReply {
    fn write<P: ProtocolWrite + ?Sized>(&self, protocol: &mut P) -> Result<(), ProtocolError> {
        protocol.write_struct_begin("UpgradeReply")?;
        protocol.write_field_stop()?;
        protocol.write_struct_end()
    }

    fn read<P: ProtocolRead + ?Sized>(protocol: &mut P) -> Result<Self, ProtocolError> {
        skip_fields(protocol)?;
        Ok(Self)
    }
}

// ---------------------------------------------------------------------------
// Header building blocks
// ---------------------------------------------------------------------------

/// Name a client identifies itself with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientId {
    pub name: String,
}

impl ThriftStruct for ClientId {
    fn write<P: ProtocolWrite + ?Sized>(&self, protocol: &mut P) -> Result<(), ProtocolError> {
        protocol.write_struct_begin("ClientId")?;
        protocol.write_field_begin("name", TType::String, 1)?;
        protocol.write_string(&self.name)?;
        protocol.write_field_end()?;
        protocol.write_field_stop()?;
        protocol.write_struct_end()
    }

    fn read<P: ProtocolRead + ?Sized>(protocol: &mut P) -> Result<Self, ProtocolError> {
        let mut name = None;
        protocol.read_struct_begin()?;
        loop {
            let field = protocol.read_field_begin()?;
            match (field.id, field.field_type) {
                (_, TType::Stop) => break,
                (1, TType::String) => name = Some(protocol.read_string()?),
                (_, other) => protocol.skip(other)?,
            }
            protocol.read_field_end()?;
        }
        protocol.read_struct_end()?;
        Ok(Self {
            name: name.ok_or(ProtocolError::MissingField {
                structure: "ClientId",
                field: "name",
            })?,
        })
    }
}

/// One broadcast context entry as it travels on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl RequestContext {
    pub fn new(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

impl ThriftStruct for RequestContext {
    fn write<P: ProtocolWrite + ?Sized>(&self, protocol: &mut P) -> Result<(), ProtocolError> {
        protocol.write_struct_begin("RequestContext")?;
        protocol.write_field_begin("key", TType::String, 1)?;
        protocol.write_binary(&self.key)?;
        protocol.write_field_end()?;
        protocol.write_field_begin("value", TType::String, 2)?;
        protocol.write_binary(&self.value)?;
        protocol.write_field_end()?;
        protocol.write_field_stop()?;
        protocol.write_struct_end()
    }

    fn read<P: ProtocolRead + ?Sized>(protocol: &mut P) -> Result<Self, ProtocolError> {
        let mut key = None;
        let mut value = None;
        protocol.read_struct_begin()?;
        loop {
            let field = protocol.read_field_begin()?;
            match (field.id, field.field_type) {
                (_, TType::Stop) => break,
                (1, TType::String) => key = Some(protocol.read_binary()?),
                (2, TType::String) => value = Some(protocol.read_binary()?),
                (_, other) => protocol.skip(other)?,
            }
            protocol.read_field_end()?;
        }
        protocol.read_struct_end()?;
        Ok(Self {
            key: key.ok_or(ProtocolError::MissingField {
                structure: "RequestContext",
                field: "key",
            })?,
            value: value.ok_or(ProtocolError::MissingField {
                structure: "RequestContext",
                field: "value",
            })?,
        })
    }
}

/// A `dtab` delegation entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delegation {
    pub src: String,
    pub dst: String,
}

impl ThriftStruct for Delegation {
    fn write<P: ProtocolWrite + ?Sized>(&self, protocol: &mut P) -> Result<(), ProtocolError> {
        protocol.write_struct_begin("Delegation")?;
        protocol.write_field_begin("src", TType::String, 1)?;
        protocol.write_string(&self.src)?;
        protocol.write_field_end()?;
        protocol.write_field_begin("dst", TType::String, 2)?;
        protocol.write_string(&self.dst)?;
        protocol.write_field_end()?;
        protocol.write_field_stop()?;
        protocol.write_struct_end()
    }

    fn read<P: ProtocolRead + ?Sized>(protocol: &mut P) -> Result<Self, ProtocolError> {
        let mut src = None;
        let mut dst = None;
        protocol.read_struct_begin()?;
        loop {
            let field = protocol.read_field_begin()?;
            match (field.id, field.field_type) {
                (_, TType::Stop) => break,
                (1, TType::String) => src = Some(protocol.read_string()?),
                (2, TType::String) => dst = Some(protocol.read_string()?),
                (_, other) => protocol.skip(other)?,
            }
            protocol.read_field_end()?;
        }
        protocol.read_struct_end()?;
        Ok(Self {
            src: src.ok_or(ProtocolError::MissingField {
                structure: "Delegation",
                field: "src",
            })?,
            dst: dst.ok_or(ProtocolError::MissingField {
                structure: "Delegation",
                field: "dst",
            })?,
        })
    }
}

// ---------------------------------------------------------------------------
// Per-call headers
// ---------------------------------------------------------------------------

/// Header written ahead of every call on an upgraded connection.
///
/// Optional fields are written only when `Some`; `contexts` is always written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestHeader {
    pub trace_id: i64,
    pub span_id: i64,
    pub parent_span_id: Option<i64>,
    pub sampled: Option<bool>,
    pub client_id: Option<ClientId>,
    pub flags: Option<i64>,
    pub contexts: Vec<RequestContext>,
    pub dest: Option<String>,
    pub delegations: Option<Vec<Delegation>>,
    pub trace_id_high: Option<i64>,
}

impl ThriftStruct for RequestHeader {
    fn write<P: ProtocolWrite + ?Sized>(&self, protocol: &mut P) -> Result<(), ProtocolError> {
        protocol.write_struct_begin("RequestHeader")?;

        protocol.write_field_begin("trace_id", TType::I64, 1)?;
        protocol.write_i64(self.trace_id)?;
        protocol.write_field_end()?;

        protocol.write_field_begin("span_id", TType::I64, 2)?;
        protocol.write_i64(self.span_id)?;
        protocol.write_field_end()?;

        if let Some(parent_span_id) = self.parent_span_id {
            protocol.write_field_begin("parent_span_id", TType::I64, 3)?;
            protocol.write_i64(parent_span_id)?;
            protocol.write_field_end()?;
        }
        if let Some(sampled) = self.sampled {
            protocol.write_field_begin("sampled", TType::Bool, 5)?;
            protocol.write_bool(sampled)?;
            protocol.write_field_end()?;
        }
        if let Some(client_id) = &self.client_id {
            protocol.write_field_begin("client_id", TType::Struct, 6)?;
            client_id.write(protocol)?;
            protocol.write_field_end()?;
        }
        if let Some(flags) = self.flags {
            protocol.write_field_begin("flags", TType::I64, 7)?;
            protocol.write_i64(flags)?;
            protocol.write_field_end()?;
        }

        protocol.write_field_begin("contexts", TType::List, 8)?;
        write_struct_list(protocol, &self.contexts)?;
        protocol.write_field_end()?;

        if let Some(dest) = &self.dest {
            protocol.write_field_begin("dest", TType::String, 9)?;
            protocol.write_string(dest)?;
            protocol.write_field_end()?;
        }
        if let Some(delegations) = &self.delegations {
            protocol.write_field_begin("delegations", TType::List, 10)?;
            write_struct_list(protocol, delegations)?;
            protocol.write_field_end()?;
        }
        if let Some(trace_id_high) = self.trace_id_high {
            protocol.write_field_begin("trace_id_high", TType::I64, 11)?;
            protocol.write_i64(trace_id_high)?;
            protocol.write_field_end()?;
        }

        protocol.write_field_stop()?;
        protocol.write_struct_end()
    }

    fn read<P: ProtocolRead + ?Sized>(protocol: &mut P) -> Result<Self, ProtocolError> {
        let mut trace_id = None;
        let mut span_id = None;
        let mut header = Self::default();

        protocol.read_struct_begin()?;
        loop {
            let field = protocol.read_field_begin()?;
            match (field.id, field.field_type) {
                (_, TType::Stop) => break,
                (1, TType::I64) => trace_id = Some(protocol.read_i64()?),
                (2, TType::I64) => span_id = Some(protocol.read_i64()?),
                (3, TType::I64) => header.parent_span_id = Some(protocol.read_i64()?),
                (5, TType::Bool) => header.sampled = Some(protocol.read_bool()?),
                (6, TType::Struct) => header.client_id = Some(ClientId::read(protocol)?),
                (7, TType::I64) => header.flags = Some(protocol.read_i64()?),
                (8, TType::List) => header.contexts = read_struct_list(protocol)?,
                (9, TType::String) => header.dest = Some(protocol.read_string()?),
                (10, TType::List) => header.delegations = Some(read_struct_list(protocol)?),
                (11, TType::I64) => header.trace_id_high = Some(protocol.read_i64()?),
                (_, other) => protocol.skip(other)?,
            }
            protocol.read_field_end()?;
        }
        protocol.read_struct_end()?;

        header.trace_id = trace_id.ok_or(ProtocolError::MissingField {
            structure: "RequestHeader",
            field: "trace_id",
        })?;
        header.span_id = span_id.ok_or(ProtocolError::MissingField {
            structure: "RequestHeader",
            field: "span_id",
        })?;
        Ok(header)
    }
}

/// Header preceding every reply on an upgraded connection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseHeader {
    pub contexts: Vec<RequestContext>,
}

impl ThriftStruct for ResponseHeader {
    fn write<P: ProtocolWrite + ?Sized>(&self, protocol: &mut P) -> Result<(), ProtocolError> {
        protocol.write_struct_begin("ResponseHeader")?;
        protocol.write_field_begin("contexts", TType::List, 1)?;
        write_struct_list(protocol, &self.contexts)?;
        protocol.write_field_end()?;
        protocol.write_field_stop()?;
        protocol.write_struct_end()
    }

    fn read<P: ProtocolRead + ?Sized>(protocol: &mut P) -> Result<Self, ProtocolError> {
        let mut header = Self::default();
        protocol.read_struct_begin()?;
        loop {
            let field = protocol.read_field_begin()?;
            match (field.id, field.field_type) {
                (_, TType::Stop) => break,
                (1, TType::List) => header.contexts = read_struct_list(protocol)?,
                (_, other) => protocol.skip(other)?,
            }
            protocol.read_field_end()?;
        }
        protocol.read_struct_end()?;
        Ok(header)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
