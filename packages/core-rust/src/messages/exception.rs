//! The standard `TApplicationException` payload.

use std::fmt;

use crate::protocol::{ProtocolError, ProtocolRead, ProtocolWrite, TType};
use crate::traits::ThriftStruct;

/// Reason code carried in field 2 of an application exception.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApplicationExceptionKind {
    Unknown,
    UnknownMethod,
    InvalidMessageType,
    WrongMethodName,
    BadSequenceId,
    MissingResult,
    InternalError,
    ProtocolError,
    InvalidTransform,
    InvalidProtocol,
    UnsupportedClientType,
}

impl ApplicationExceptionKind {
    #[must_use]
    pub fn as_i32(self) -> i32 {
        match self {
            Self::Unknown => 0,
            Self::UnknownMethod => 1,
            Self::InvalidMessageType => 2,
            Self::WrongMethodName => 3,
            Self::BadSequenceId => 4,
            Self::MissingResult => 5,
            Self::InternalError => 6,
            Self::ProtocolError => 7,
            Self::InvalidTransform => 8,
            Self::InvalidProtocol => 9,
            Self::UnsupportedClientType => 10,
        }
    }
}

impl From<i32> for ApplicationExceptionKind {
    /// Codes outside the standard range map to `Unknown`.
    fn from(code: i32) -> Self {
        match code {
            1 => Self::UnknownMethod,
            2 => Self::InvalidMessageType,
            3 => Self::WrongMethodName,
            4 => Self::BadSequenceId,
            5 => Self::MissingResult,
            6 => Self::InternalError,
            7 => Self::ProtocolError,
            8 => Self::InvalidTransform,
            9 => Self::InvalidProtocol,
            10 => Self::UnsupportedClientType,
            _ => Self::Unknown,
        }
    }
}

/// Exception raised by the server framework rather than by a service method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplicationException {
    pub message: Option<String>,
    pub kind: ApplicationExceptionKind,
}

impl ApplicationException {
    pub fn new(kind: ApplicationExceptionKind, message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            kind,
        }
    }
}

impl fmt::Display for ApplicationException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{:?}: {message}", self.kind),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl std::error::Error for ApplicationException {}

impl ThriftStruct for ApplicationException {
    fn write<P: ProtocolWrite + ?Sized>(&self, protocol: &mut P) -> Result<(), ProtocolError> {
        protocol.write_struct_begin("TApplicationException")?;
        if let Some(message) = &self.message {
            protocol.write_field_begin("message", TType::String, 1)?;
            protocol.write_string(message)?;
            protocol.write_field_end()?;
        }
        protocol.write_field_begin("type", TType::I32, 2)?;
        protocol.write_i32(self.kind.as_i32())?;
        protocol.write_field_end()?;
        protocol.write_field_stop()?;
        protocol.write_struct_end()
    }

    fn read<P: ProtocolRead + ?Sized>(protocol: &mut P) -> Result<Self, ProtocolError> {
        let mut exception = Self {
            message: None,
            kind: ApplicationExceptionKind::Unknown,
        };
        protocol.read_struct_begin()?;
        loop {
            let field = protocol.read_field_begin()?;
            match (field.id, field.field_type) {
                (_, TType::Stop) => break,
                (1, TType::String) => exception.message = Some(protocol.read_string()?),
                (2, TType::I32) => exception.kind = protocol.read_i32()?.into(),
                (_, other) => protocol.skip(other)?,
            }
            protocol.read_field_end()?;
        }
        protocol.read_struct_end()?;
        Ok(exception)
    }
}
