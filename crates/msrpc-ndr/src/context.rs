//! NDR session configuration
//!
//! The context carries the negotiated byte order and the resource ceilings a
//! session enforces, and provides the alignment and byte-order helpers the
//! reader and writer are built on.

use bytes::{Buf, BufMut};

use crate::error::{NdrError, Result, MAX_NDR_ALLOCATION_SIZE, MAX_NDR_DEPTH};

/// Integer representation nibble of the DCE RPC data representation label
const DREP_LITTLE_ENDIAN: u8 = 0x10;

/// NDR encoding/decoding configuration
///
/// Copied into every encode or decode session; sessions never share state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NdrContext {
    /// Whether to use little-endian byte order
    pub little_endian: bool,
    /// Largest single container a decode may allocate, in bytes
    pub max_allocation: usize,
    /// Deepest pointer nesting a session will follow
    pub max_depth: usize,
}

impl NdrContext {
    /// Create a new NDR context with little-endian byte order (default)
    pub fn new() -> Self {
        Self {
            little_endian: true,
            max_allocation: MAX_NDR_ALLOCATION_SIZE,
            max_depth: MAX_NDR_DEPTH,
        }
    }

    /// Create a context with big-endian byte order
    pub fn big_endian() -> Self {
        Self::with_byte_order(false)
    }

    /// Create a context with specified byte order
    pub fn with_byte_order(little_endian: bool) -> Self {
        Self {
            little_endian,
            ..Self::new()
        }
    }

    /// Build a context from the 4-byte data representation label of a PDU header
    pub fn from_drep(drep: [u8; 4]) -> Self {
        Self::with_byte_order(drep[0] & 0xF0 == DREP_LITTLE_ENDIAN)
    }

    /// The data representation label matching this context (ASCII, IEEE)
    pub fn drep(&self) -> [u8; 4] {
        let int_rep = if self.little_endian { DREP_LITTLE_ENDIAN } else { 0 };
        [int_rep, 0, 0, 0]
    }

    pub fn with_max_allocation(mut self, max_allocation: usize) -> Self {
        self.max_allocation = max_allocation;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Calculate padding needed to align to the given boundary
    #[inline]
    pub fn align_padding(position: usize, alignment: usize) -> usize {
        if alignment <= 1 {
            return 0;
        }
        (alignment - position % alignment) % alignment
    }

    /// Validate an alignment request; NDR only knows 1, 2, 4 and 8
    #[inline]
    pub fn check_alignment(alignment: usize) -> Result<()> {
        match alignment {
            1 | 2 | 4 | 8 => Ok(()),
            other => Err(NdrError::InvalidAlignment(other)),
        }
    }

    /// Alignment class of an aggregate: its largest member alignment, capped at 8
    pub fn alignment_class(members: &[usize]) -> usize {
        members.iter().copied().fold(1, usize::max).min(8)
    }

    #[inline]
    pub fn put_u8<B: BufMut>(&self, buf: &mut B, value: u8) {
        buf.put_u8(value);
    }

    #[inline]
    pub fn put_i8<B: BufMut>(&self, buf: &mut B, value: i8) {
        buf.put_i8(value);
    }

    #[inline]
    pub fn get_u8<B: Buf>(&self, buf: &mut B) -> u8 {
        buf.get_u8()
    }

    #[inline]
    pub fn get_i8<B: Buf>(&self, buf: &mut B) -> i8 {
        buf.get_i8()
    }
}

// Byte-order dispatching accessors for every multi-byte scalar.
macro_rules! byte_order_accessors {
    ($($ty:ty => $put:ident, $put_le:ident, $put_be:ident, $get:ident, $get_le:ident, $get_be:ident;)*) => {
        impl NdrContext {
            $(
                #[inline]
                pub fn $put<B: BufMut>(&self, buf: &mut B, value: $ty) {
                    if self.little_endian {
                        buf.$put_le(value);
                    } else {
                        buf.$put_be(value);
                    }
                }

                #[inline]
                pub fn $get<B: Buf>(&self, buf: &mut B) -> $ty {
                    if self.little_endian {
                        buf.$get_le()
                    } else {
                        buf.$get_be()
                    }
                }
            )*
        }
    };
}

byte_order_accessors! {
    u16 => put_u16, put_u16_le, put_u16, get_u16, get_u16_le, get_u16;
    i16 => put_i16, put_i16_le, put_i16, get_i16, get_i16_le, get_i16;
    u32 => put_u32, put_u32_le, put_u32, get_u32, get_u32_le, get_u32;
    i32 => put_i32, put_i32_le, put_i32, get_i32, get_i32_le, get_i32;
    u64 => put_u64, put_u64_le, put_u64, get_u64, get_u64_le, get_u64;
    i64 => put_i64, put_i64_le, put_i64, get_i64, get_i64_le, get_i64;
    f32 => put_f32, put_f32_le, put_f32, get_f32, get_f32_le, get_f32;
    f64 => put_f64, put_f64_le, put_f64, get_f64, get_f64_le, get_f64;
}

impl Default for NdrContext {
    fn default() -> Self {
        Self::new()
    }
}
