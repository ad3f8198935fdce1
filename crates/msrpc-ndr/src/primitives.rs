//! NDR primitive type implementations
//!
//! NDR primitive types and their encodings:
//!
//! | MIDL Type     | Rust Type | Size | Alignment |
//! |---------------|-----------|------|-----------|
//! | boolean       | bool      | 1    | 1         |
//! | byte/char     | u8        | 1    | 1         |
//! | small         | i8        | 1    | 1         |
//! | short         | i16       | 2    | 2         |
//! | long/int      | i32       | 4    | 4         |
//! | hyper         | i64       | 8    | 8         |
//! | unsigned short| u16       | 2    | 2         |
//! | unsigned long | u32       | 4    | 4         |
//! | unsigned hyper| u64       | 8    | 8         |
//! | float         | f32       | 4    | 4         |
//! | double        | f64       | 8    | 8         |
//! | wchar_t       | u16       | 2    | 2         |
//! | error_status_t| u32       | 4    | 4         |
//!
//! Enums travel as 16-bit values (see [`NdrWriter::write_enum16`]) unless the
//! interface marks them `v1_enum`, in which case they are plain `u32`.

use std::fmt;

use crate::{NdrDecode, NdrEncode, NdrReader, NdrWriter, Result};

macro_rules! impl_ndr_primitive {
    ($($ty:ty => $write:ident, $read:ident;)*) => {
        $(
            impl NdrEncode for $ty {
                fn ndr_write<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
                    w.$write(*self)
                }

                fn ndr_align() -> usize {
                    std::mem::size_of::<$ty>()
                }
            }

            impl NdrDecode for $ty {
                fn ndr_read<'a>(&'a mut self, r: &mut NdrReader<'a>) -> Result<()> {
                    *self = r.$read()?;
                    Ok(())
                }

                fn ndr_align() -> usize {
                    std::mem::size_of::<$ty>()
                }

                fn ndr_wire_size() -> usize {
                    std::mem::size_of::<$ty>()
                }
            }
        )*
    };
}

impl_ndr_primitive! {
    u8 => write_u8, read_u8;
    i8 => write_i8, read_i8;
    bool => write_bool, read_bool;
    u16 => write_u16, read_u16;
    i16 => write_i16, read_i16;
    u32 => write_u32, read_u32;
    i32 => write_i32, read_i32;
    u64 => write_u64, read_u64;
    i64 => write_i64, read_i64;
    f32 => write_f32, read_f32;
    f64 => write_f64, read_f64;
}

/// GUID/UUID type for NDR encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct NdrUuid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl NdrUuid {
    /// Nil UUID
    pub const NIL: Self = Self {
        data1: 0,
        data2: 0,
        data3: 0,
        data4: [0; 8],
    };

    /// Wire size: always 16 bytes
    pub const SIZE: usize = 16;

    /// Parse from string "xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx", braces optional
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim().trim_start_matches('{').trim_end_matches('}');
        let groups: Vec<&str> = s.split('-').collect();
        let [d1, d2, d3, clock, node] = groups.as_slice() else {
            return None;
        };
        if d1.len() != 8 || d2.len() != 4 || d3.len() != 4 || clock.len() != 4 || node.len() != 12 {
            return None;
        }

        let mut data4 = [0u8; 8];
        let tail = format!("{clock}{node}");
        for (i, byte) in data4.iter_mut().enumerate() {
            *byte = u8::from_str_radix(tail.get(i * 2..i * 2 + 2)?, 16).ok()?;
        }

        Some(Self {
            data1: u32::from_str_radix(d1, 16).ok()?,
            data2: u16::from_str_radix(d2, 16).ok()?,
            data3: u16::from_str_radix(d3, 16).ok()?,
            data4,
        })
    }

    pub fn is_nil(&self) -> bool {
        *self == Self::NIL
    }
}

impl fmt::Display for NdrUuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-",
            self.data1, self.data2, self.data3, self.data4[0], self.data4[1]
        )?;
        self.data4[2..].iter().try_for_each(|b| write!(f, "{b:02x}"))
    }
}

impl NdrEncode for NdrUuid {
    fn ndr_write<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        w.write_u32(self.data1)?;
        w.write_u16(self.data2)?;
        w.write_u16(self.data3)?;
        w.write_bytes(&self.data4)
    }

    fn ndr_align() -> usize {
        4
    }
}

impl NdrDecode for NdrUuid {
    fn ndr_read<'a>(&'a mut self, r: &mut NdrReader<'a>) -> Result<()> {
        self.data1 = r.read_u32()?;
        self.data2 = r.read_u16()?;
        self.data3 = r.read_u16()?;
        let tail = r.read_bytes(8)?;
        self.data4.copy_from_slice(&tail);
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_wire_size() -> usize {
        Self::SIZE
    }
}

/// NDR error_status_t - HRESULT-like error code
pub type ErrorStatusT = u32;
