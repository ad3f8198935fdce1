//! NDR array types
//!
//! NDR supports several array types:
//!
//! - Fixed arrays: size known at compile time, no header
//! - Conformant arrays: size determined at runtime, transmitted as prefix
//! - Conformant varying arrays: a conformant array transmitting a sub-range
//! - Counted arrays: a declared length field plus a unique pointer to a
//!   conformant array sized by it (`[size_is(len)] T *buf`)

use std::iter;

use tracing::debug;

use crate::bounds::wire_count;
use crate::{NdrDecode, NdrEncode, NdrError, NdrReader, NdrWriter, Result};

/// Header of a conformant (varying) array
///
/// Plain conformant arrays carry only `max_count` on the wire; for them
/// `offset` is 0 and `actual_count` equals `max_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ArrayHeader {
    pub max_count: usize,
    pub offset: usize,
    pub actual_count: usize,
}

impl ArrayHeader {
    pub fn conformant(max_count: usize) -> Self {
        Self {
            max_count,
            offset: 0,
            actual_count: max_count,
        }
    }

    pub fn varying(max_count: usize, offset: usize, actual_count: usize) -> Self {
        Self {
            max_count,
            offset,
            actual_count,
        }
    }

    /// `offset + actual_count` must not run past `max_count`
    pub fn validate(&self) -> Result<()> {
        let end = self
            .offset
            .checked_add(self.actual_count)
            .ok_or(NdrError::IntegerOverflow)?;
        if end > self.max_count {
            debug!(
                max_count = self.max_count,
                offset = self.offset,
                actual_count = self.actual_count,
                "varying array overruns its conformance"
            );
            return Err(NdrError::ConformanceMismatch {
                max_count: u32::try_from(self.max_count).unwrap_or(u32::MAX),
                actual_count: u32::try_from(end).unwrap_or(u32::MAX),
            });
        }
        Ok(())
    }

    /// Zero-valued slots that follow the transmitted elements
    pub fn padding(&self) -> usize {
        self.max_count
            .saturating_sub(self.offset)
            .saturating_sub(self.actual_count)
    }

    /// Write `max_count, offset, actual_count`
    pub fn write_varying(&self, w: &mut NdrWriter<'_>) -> Result<()> {
        self.validate()?;
        w.write_conformance(self.max_count)?;
        w.write_variance(self.offset, self.actual_count)
    }

    /// Read and validate `max_count, offset, actual_count`
    pub fn read_varying(r: &mut NdrReader<'_>) -> Result<Self> {
        let max_count = r.read_conformance()?;
        let (offset, actual_count) = r.read_variance()?;
        let header = Self::varying(max_count, offset, actual_count);
        header.validate()?;
        Ok(header)
    }
}

/// Fixed-size array
///
/// Wire format: exactly `N` elements, no size prefix. Shorter contents are
/// padded with default elements and longer contents truncated on encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixedArray<T, const N: usize> {
    pub elements: Vec<T>,
}

impl<T, const N: usize> Default for FixedArray<T, N> {
    fn default() -> Self {
        Self { elements: Vec::new() }
    }
}

impl<T, const N: usize> FixedArray<T, N> {
    pub fn new(elements: impl Into<Vec<T>>) -> Self {
        Self {
            elements: elements.into(),
        }
    }

    pub const fn len(&self) -> usize {
        N
    }

    pub const fn is_empty(&self) -> bool {
        N == 0
    }
}

impl<T: NdrEncode + Default, const N: usize> NdrEncode for FixedArray<T, N> {
    fn ndr_write<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        for elem in self.elements.iter().take(N) {
            w.write_data(elem)?;
        }
        for _ in self.elements.len()..N {
            w.write_isolated(&T::default())?;
        }
        Ok(())
    }

    fn ndr_align() -> usize {
        T::ndr_align()
    }
}

impl<T: NdrDecode + Default, const N: usize> NdrDecode for FixedArray<T, N> {
    fn ndr_read<'a>(&'a mut self, r: &mut NdrReader<'a>) -> Result<()> {
        r.check_available(N, T::ndr_wire_size())?;
        self.elements = iter::repeat_with(T::default).take(N).collect();
        for elem in self.elements.iter_mut() {
            r.read_data(elem)?;
        }
        Ok(())
    }

    fn ndr_align() -> usize {
        T::ndr_align()
    }

    fn ndr_wire_size() -> usize {
        N.saturating_mul(T::ndr_wire_size())
    }
}

/// Conformant array - size determined at runtime
///
/// Wire format:
/// ```text
/// max_count: u32      # Maximum elements
/// elements[max_count] # Element data
/// ```
///
/// In a conformant structure the `max_count` is hoisted to the start of the
/// structure while the elements stay at its end; [`Self::write_elements`] and
/// [`Self::read_elements`] frame the elements alone for that case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConformantArray<T> {
    pub elements: Vec<T>,
}

impl<T> Default for ConformantArray<T> {
    fn default() -> Self {
        Self { elements: Vec::new() }
    }
}

impl<T> ConformantArray<T> {
    pub fn new(elements: Vec<T>) -> Self {
        Self { elements }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl<T> From<Vec<T>> for ConformantArray<T> {
    fn from(elements: Vec<T>) -> Self {
        Self::new(elements)
    }
}

impl<T: NdrEncode> ConformantArray<T> {
    /// Elements only, for a `max_count` written elsewhere
    pub fn write_elements<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        self.elements.iter().try_for_each(|elem| w.write_data(elem))
    }
}

impl<T: NdrDecode + Default> ConformantArray<T> {
    /// Elements only, sized by a `max_count` read elsewhere
    pub fn read_elements<'a>(&'a mut self, r: &mut NdrReader<'a>, max_count: usize) -> Result<()> {
        r.check_available(max_count, T::ndr_wire_size())?;
        self.elements = iter::repeat_with(T::default).take(max_count).collect();
        for elem in self.elements.iter_mut() {
            r.read_data(elem)?;
        }
        Ok(())
    }
}

impl<T: NdrEncode> NdrEncode for ConformantArray<T> {
    fn ndr_write<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        w.write_conformance(self.elements.len())?;
        self.write_elements(w)
    }

    fn ndr_align() -> usize {
        4 // For max_count
    }
}

impl<T: NdrDecode + Default> NdrDecode for ConformantArray<T> {
    fn ndr_read<'a>(&'a mut self, r: &mut NdrReader<'a>) -> Result<()> {
        let max_count = r.read_conformance()?;
        self.read_elements(r, max_count)
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_wire_size() -> usize {
        4
    }
}

/// Conformant varying array - size and subset determined at runtime
///
/// Wire format:
/// ```text
/// max_count: u32    # Maximum elements (conformance)
/// offset: u32       # First transmitted element
/// actual_count: u32 # Number of transmitted elements
/// elements[actual_count]
/// padding[max_count - offset - actual_count]  # default elements
/// ```
///
/// The padding slots are written as default (zero) elements and skipped on
/// decode, so `elements` always holds exactly the transmitted sub-range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConformantVaryingArray<T> {
    pub max_count: usize,
    pub offset: usize,
    pub elements: Vec<T>,
}

impl<T> Default for ConformantVaryingArray<T> {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl<T> ConformantVaryingArray<T> {
    pub fn new(elements: Vec<T>) -> Self {
        Self {
            max_count: elements.len(),
            offset: 0,
            elements,
        }
    }

    pub fn with_max(max_count: usize, elements: Vec<T>) -> Self {
        Self {
            max_count,
            offset: 0,
            elements,
        }
    }

    pub fn header(&self) -> ArrayHeader {
        ArrayHeader::varying(self.max_count, self.offset, self.elements.len())
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

impl<T: NdrEncode + Default> NdrEncode for ConformantVaryingArray<T> {
    fn ndr_write<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        let header = self.header();
        header.write_varying(w)?;
        for elem in &self.elements {
            w.write_data(elem)?;
        }
        for _ in 0..header.padding() {
            w.write_isolated(&T::default())?;
        }
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_prepare(&self) -> Result<()> {
        self.header().validate()
    }
}

impl<T: NdrDecode + Default> NdrDecode for ConformantVaryingArray<T> {
    fn ndr_read<'a>(&'a mut self, r: &mut NdrReader<'a>) -> Result<()> {
        let header = ArrayHeader::read_varying(r)?;
        // transmitted elements and their padding must both be present
        r.check_available(header.max_count - header.offset, T::ndr_wire_size())?;

        self.max_count = header.max_count;
        self.offset = header.offset;
        self.elements = iter::repeat_with(T::default).take(header.actual_count).collect();
        for elem in self.elements.iter_mut() {
            r.read_data(elem)?;
        }
        for _ in 0..header.padding() {
            r.read_isolated::<T>()?;
        }
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_wire_size() -> usize {
        12
    }
}

/// Counted array: `[size_is(count)] T *elements` with its length field
///
/// Wire format:
/// ```text
/// count: u32          # declared length
/// referent: u32       # 0 when there is no payload
/// ...deferred...
/// max_count: u32      # == count
/// elements[count]
/// ```
///
/// A zero `count` is derived from the payload. A nonzero `count` wins over the
/// payload length: a longer payload is truncated and a shorter one padded
/// with default elements.
///
/// Equality compares the declared length, so a derived count equals the same
/// count spelled out.
#[derive(Debug, Clone)]
pub struct CountedArray<T> {
    pub count: u32,
    pub elements: Option<Vec<T>>,
}

impl<T: PartialEq> PartialEq for CountedArray<T> {
    fn eq(&self, other: &Self) -> bool {
        self.declared_len() == other.declared_len() && self.elements == other.elements
    }
}

impl<T: Eq> Eq for CountedArray<T> {}

impl<T> Default for CountedArray<T> {
    fn default() -> Self {
        Self {
            count: 0,
            elements: None,
        }
    }
}

impl<T> CountedArray<T> {
    pub fn new(elements: Vec<T>) -> Self {
        Self {
            count: 0,
            elements: Some(elements),
        }
    }

    /// Declare `count` elements regardless of how many are held
    pub fn with_count(count: u32, elements: Vec<T>) -> Self {
        Self {
            count,
            elements: Some(elements),
        }
    }

    /// Length that goes on the wire
    pub fn declared_len(&self) -> usize {
        match self.count {
            0 => self.elements.as_ref().map_or(0, Vec::len),
            count => count as usize,
        }
    }

    pub fn as_slice(&self) -> &[T] {
        self.elements.as_deref().unwrap_or(&[])
    }
}

impl<T: NdrEncode + Default> NdrEncode for CountedArray<T> {
    fn ndr_write<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        let declared = self.declared_len();
        w.write_u32(wire_count(declared)?)?;

        let elements = self.as_slice();
        let present = self.elements.is_some() || declared > 0;
        w.write_pointer_with(present, move |w| {
            w.write_conformance(declared)?;
            for elem in elements.iter().take(declared) {
                w.write_data(elem)?;
            }
            for _ in elements.len()..declared {
                w.write_isolated(&T::default())?;
            }
            Ok(())
        })
    }

    fn ndr_align() -> usize {
        4
    }
}

impl<T: NdrDecode + Default> NdrDecode for CountedArray<T> {
    fn ndr_read<'a>(&'a mut self, r: &mut NdrReader<'a>) -> Result<()> {
        self.count = r.read_u32()?;
        let declared = self.count as usize;

        let target = &mut self.elements;
        *target = None;
        r.read_pointer_with(move |r| {
            let mut max_count = r.read_conformance()?;
            // opaque payloads may leave the conformance zero
            if max_count == 0 && declared > 0 {
                max_count = declared;
            }
            r.check_available(max_count, T::ndr_wire_size())?;
            let elements = target.insert(iter::repeat_with(T::default).take(max_count).collect());
            for elem in elements.iter_mut() {
                r.read_data(elem)?;
            }
            Ok(())
        })?;
        Ok(())
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_wire_size() -> usize {
        8
    }
}
