use crate::protocol::{ProtocolError, ProtocolRead, ProtocolWrite};

/// A structure that can be written to and read from a Thrift protocol.
///
/// Implementations must write fields in ascending id order followed by a
/// field stop, and must skip unknown fields on read so older clients keep
/// working against newer servers.
pub trait ThriftStruct: Sized {
    /// Encodes this struct, including the trailing field stop.
    ///
    /// # Errors
    ///
    /// Returns the first protocol or transport error encountered.
    fn write<P: ProtocolWrite + ?Sized>(&self, protocol: &mut P) -> Result<(), ProtocolError>;

    /// Decodes one struct, consuming up to and including its field stop.
    ///
    /// # Errors
    ///
    /// Returns `ProtocolError::MissingField` when a required field is absent,
    /// or the first protocol or transport error encountered.
    fn read<P: ProtocolRead + ?Sized>(protocol: &mut P) -> Result<Self, ProtocolError>;
}

/// Empty argument or result struct, used for methods without parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Unit;

impl ThriftStruct for Unit {
    fn write<P: ProtocolWrite + ?Sized>(&self, protocol: &mut P) -> Result<(), ProtocolError> {
        protocol.write_struct_begin("Unit")?;
        protocol.write_field_stop()?;
        protocol.write_struct_end()
    }

    fn read<P: ProtocolRead + ?Sized>(protocol: &mut P) -> Result<Self, ProtocolError> {
        crate::messages::skip_fields(protocol)?;
        Ok(Self)
    }
}
