//! Thrift binary protocol.
//!
//! Integers are big-endian, strings and binaries carry an i32 length prefix,
//! and structs are a sequence of `(type: u8, id: i16, value)` fields closed by
//! a stop byte. Message envelopes are written in the strict (versioned) form;
//! reading accepts both the strict and the legacy unversioned form unless
//! `strict_read` is set.

use std::io::{self, Read, Write};

use super::{
    FieldHeader, ListHeader, MapHeader, MessageHeader, MessageType, ProtocolError, ProtocolRead,
    ProtocolWrite, TType,
};

/// Version word OR-ed with the message type in strict envelopes.
pub const VERSION_1: u32 = 0x8001_0000;
const VERSION_MASK: u32 = 0xffff_0000;
const TYPE_MASK: u32 = 0x0000_00ff;

/// Binary protocol over any byte stream.
#[derive(Debug)]
pub struct BinaryProtocol<T> {
    transport: T,
    strict_read: bool,
    strict_write: bool,
}

impl<T> BinaryProtocol<T> {
    /// Strict writes, lenient reads.
    pub fn new(transport: T) -> Self {
        Self::with_strictness(transport, false, true)
    }

    pub fn with_strictness(transport: T, strict_read: bool, strict_write: bool) -> Self {
        Self {
            transport,
            strict_read,
            strict_write,
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_inner(self) -> T {
        self.transport
    }
}

fn wire_size(size: usize) -> Result<i32, ProtocolError> {
    i32::try_from(size).map_err(|_| ProtocolError::SizeTooLarge(size))
}

fn host_size(size: i32) -> Result<usize, ProtocolError> {
    usize::try_from(size).map_err(|_| ProtocolError::NegativeSize(size))
}

impl<T: Read> BinaryProtocol<T> {
    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], ProtocolError> {
        let mut buf = [0u8; N];
        self.transport.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        let [b] = self.read_array::<1>()?;
        Ok(b)
    }

    fn read_ttype(&mut self) -> Result<TType, ProtocolError> {
        TType::try_from(self.read_u8()?)
    }

    fn read_size(&mut self) -> Result<usize, ProtocolError> {
        host_size(self.read_i32()?)
    }

    // Reads through `take` so a hostile length prefix cannot force a huge
    // up-front allocation.
    fn read_exact_vec(&mut self, len: usize) -> Result<Vec<u8>, ProtocolError> {
        let mut buf = Vec::new();
        let limit = u64::try_from(len).map_err(|_| ProtocolError::SizeTooLarge(len))?;
        self.transport.by_ref().take(limit).read_to_end(&mut buf)?;
        if buf.len() != len {
            return Err(io::Error::from(io::ErrorKind::UnexpectedEof).into());
        }
        Ok(buf)
    }
}

impl<T: Write> BinaryProtocol<T> {
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), ProtocolError> {
        self.transport.write_all(bytes)?;
        Ok(())
    }

    fn write_size(&mut self, size: usize) -> Result<(), ProtocolError> {
        let size = wire_size(size)?;
        self.write_i32(size)
    }
}

impl<T: Write> ProtocolWrite for BinaryProtocol<T> {
    fn write_message_begin(&mut self, header: &MessageHeader) -> Result<(), ProtocolError> {
        if self.strict_write {
            let word = VERSION_1 | u32::from(header.message_type.as_u8());
            self.write_bytes(&word.to_be_bytes())?;
            self.write_string(&header.name)?;
        } else {
            self.write_string(&header.name)?;
            self.write_bytes(&[header.message_type.as_u8()])?;
        }
        self.write_i32(header.seq_id)
    }

    fn write_message_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn write_struct_begin(&mut self, _name: &str) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn write_struct_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn write_field_begin(
        &mut self,
        _name: &str,
        field_type: TType,
        id: i16,
    ) -> Result<(), ProtocolError> {
        self.write_bytes(&[field_type.as_u8()])?;
        self.write_i16(id)
    }

    fn write_field_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn write_field_stop(&mut self) -> Result<(), ProtocolError> {
        self.write_bytes(&[TType::Stop.as_u8()])
    }

    fn write_list_begin(&mut self, header: ListHeader) -> Result<(), ProtocolError> {
        self.write_bytes(&[header.element_type.as_u8()])?;
        self.write_size(header.size)
    }

    fn write_list_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn write_set_begin(&mut self, header: ListHeader) -> Result<(), ProtocolError> {
        self.write_list_begin(header)
    }

    fn write_set_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn write_map_begin(&mut self, header: MapHeader) -> Result<(), ProtocolError> {
        self.write_bytes(&[header.key_type.as_u8(), header.value_type.as_u8()])?;
        self.write_size(header.size)
    }

    fn write_map_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn write_bool(&mut self, value: bool) -> Result<(), ProtocolError> {
        self.write_bytes(&[u8::from(value)])
    }

    fn write_byte(&mut self, value: i8) -> Result<(), ProtocolError> {
        self.write_bytes(&value.to_be_bytes())
    }

    fn write_i16(&mut self, value: i16) -> Result<(), ProtocolError> {
        self.write_bytes(&value.to_be_bytes())
    }

    fn write_i32(&mut self, value: i32) -> Result<(), ProtocolError> {
        self.write_bytes(&value.to_be_bytes())
    }

    fn write_i64(&mut self, value: i64) -> Result<(), ProtocolError> {
        self.write_bytes(&value.to_be_bytes())
    }

    fn write_double(&mut self, value: f64) -> Result<(), ProtocolError> {
        self.write_bytes(&value.to_bits().to_be_bytes())
    }

    fn write_string(&mut self, value: &str) -> Result<(), ProtocolError> {
        self.write_binary(value.as_bytes())
    }

    fn write_binary(&mut self, value: &[u8]) -> Result<(), ProtocolError> {
        self.write_size(value.len())?;
        self.write_bytes(value)
    }

    fn flush(&mut self) -> Result<(), ProtocolError> {
        self.transport.flush()?;
        Ok(())
    }
}

impl<T: Read> ProtocolRead for BinaryProtocol<T> {
    fn read_message_begin(&mut self) -> Result<MessageHeader, ProtocolError> {
        let word = self.read_array::<4>()?;
        let versioned = u32::from_be_bytes(word);

        if versioned & 0x8000_0000 != 0 {
            if versioned & VERSION_MASK != VERSION_1 {
                return Err(ProtocolError::BadVersion(versioned));
            }
            let type_byte = u8::try_from(versioned & TYPE_MASK)
                .map_err(|_| ProtocolError::BadVersion(versioned))?;
            let message_type = MessageType::try_from(type_byte)?;
            let name = self.read_string()?;
            let seq_id = self.read_i32()?;
            return Ok(MessageHeader {
                name,
                message_type,
                seq_id,
            });
        }

        if self.strict_read {
            return Err(ProtocolError::BadVersion(versioned));
        }

        // Unversioned envelope: the word is the method-name length.
        let name_len = host_size(i32::from_be_bytes(word))?;
        let name = String::from_utf8(self.read_exact_vec(name_len)?)?;
        let message_type = MessageType::try_from(self.read_u8()?)?;
        let seq_id = self.read_i32()?;
        Ok(MessageHeader {
            name,
            message_type,
            seq_id,
        })
    }

    fn read_message_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_struct_begin(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_struct_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_field_begin(&mut self) -> Result<FieldHeader, ProtocolError> {
        let field_type = self.read_ttype()?;
        if field_type == TType::Stop {
            return Ok(FieldHeader { field_type, id: 0 });
        }
        let id = self.read_i16()?;
        Ok(FieldHeader { field_type, id })
    }

    fn read_field_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_list_begin(&mut self) -> Result<ListHeader, ProtocolError> {
        let element_type = self.read_ttype()?;
        let size = self.read_size()?;
        Ok(ListHeader { element_type, size })
    }

    fn read_list_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_set_begin(&mut self) -> Result<ListHeader, ProtocolError> {
        self.read_list_begin()
    }

    fn read_set_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_map_begin(&mut self) -> Result<MapHeader, ProtocolError> {
        let key_type = self.read_ttype()?;
        let value_type = self.read_ttype()?;
        let size = self.read_size()?;
        Ok(MapHeader {
            key_type,
            value_type,
            size,
        })
    }

    fn read_map_end(&mut self) -> Result<(), ProtocolError> {
        Ok(())
    }

    fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        Ok(self.read_u8()? != 0)
    }

    fn read_byte(&mut self) -> Result<i8, ProtocolError> {
        Ok(i8::from_be_bytes(self.read_array()?))
    }

    fn read_i16(&mut self) -> Result<i16, ProtocolError> {
        Ok(i16::from_be_bytes(self.read_array()?))
    }

    fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        Ok(i32::from_be_bytes(self.read_array()?))
    }

    fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        Ok(i64::from_be_bytes(self.read_array()?))
    }

    fn read_double(&mut self) -> Result<f64, ProtocolError> {
        Ok(f64::from_bits(u64::from_be_bytes(self.read_array()?)))
    }

    fn read_string(&mut self) -> Result<String, ProtocolError> {
        Ok(String::from_utf8(self.read_binary()?)?)
    }

    fn read_binary(&mut self) -> Result<Vec<u8>, ProtocolError> {
        let len = self.read_size()?;
        self.read_exact_vec(len)
    }
}
