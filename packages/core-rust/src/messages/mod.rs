//! Wire structures for Finagle's Thrift tracing upgrade.
//!
//! Field ids and types follow Finagle's `tracing.thrift` IDL so an upgraded
//! Finagle server decodes the headers this crate writes. Each struct
//! implements [`ThriftStruct`](crate::ThriftStruct) by hand.

pub mod exception;
pub mod tracing;

pub use exception::{ApplicationException, ApplicationExceptionKind};
pub use tracing::{
    ClientId, ConnectionOptions, Delegation, RequestContext, RequestHeader, ResponseHeader,
    UpgradeReply,
};

use crate::protocol::{ListHeader, ProtocolError, ProtocolRead, ProtocolWrite, TType};
use crate::traits::ThriftStruct;

/// Consumes a struct body without interpreting any field.
pub(crate) fn skip_fields<P: ProtocolRead + ?Sized>(protocol: &mut P) -> Result<(), ProtocolError> {
    protocol.read_struct_begin()?;
    loop {
        let field = protocol.read_field_begin()?;
        if field.field_type == TType::Stop {
            break;
        }
        protocol.skip(field.field_type)?;
        protocol.read_field_end()?;
    }
    protocol.read_struct_end()
}

pub(crate) fn write_struct_list<T: ThriftStruct, P: ProtocolWrite + ?Sized>(
    protocol: &mut P,
    items: &[T],
) -> Result<(), ProtocolError> {
    protocol.write_list_begin(ListHeader {
        element_type: TType::Struct,
        size: items.len(),
    })?;
    for item in items {
        item.write(protocol)?;
    }
    protocol.write_list_end()
}

/// Reads a `list<struct>`; a list of any other element type is skipped and
/// yields an empty vector.
pub(crate) fn read_struct_list<T: ThriftStruct, P: ProtocolRead + ?Sized>(
    protocol: &mut P,
) -> Result<Vec<T>, ProtocolError> {
    let header = protocol.read_list_begin()?;
    if header.element_type != TType::Struct {
        for _ in 0..header.size {
            protocol.skip(header.element_type)?;
        }
        protocol.read_list_end()?;
        return Ok(Vec::new());
    }
    // Cap the pre-allocation; the size prefix is untrusted.
    let mut items = Vec::with_capacity(header.size.min(64));
    for _ in 0..header.size {
        items.push(T::read(protocol)?);
    }
    protocol.read_list_end()?;
    Ok(items)
}
