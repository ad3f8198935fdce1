//! Context handles
//!
//! A context handle is a 20-byte opaque token a server hands out to represent
//! state held between calls:
//!
//! ```text
//! align(4)
//! attributes: u32
//! uuid: [u8; 16]   # raw, no byte-order conversion
//! ```

use crate::{NdrDecode, NdrEncode, NdrReader, NdrWriter, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ContextHandle {
    pub attributes: u32,
    pub uuid: [u8; 16],
}

impl ContextHandle {
    /// Wire size: always 20 bytes
    pub const SIZE: usize = 20;

    pub fn new(attributes: u32, uuid: [u8; 16]) -> Self {
        Self { attributes, uuid }
    }

    /// The all-zero handle a server returns once the handle is closed
    pub fn is_null(&self) -> bool {
        self.attributes == 0 && self.uuid == [0; 16]
    }
}

impl NdrEncode for ContextHandle {
    fn ndr_write<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        w.write_u32(self.attributes)?;
        w.write_bytes(&self.uuid)
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for ContextHandle {
    fn ndr_read<'a>(&'a mut self, r: &mut NdrReader<'a>) -> Result<()> {
        self.attributes = r.read_u32()?;
        self.uuid.copy_from_slice(&r.read_bytes(16)?);
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_wire_size() -> usize {
        Self::SIZE
    }
}
