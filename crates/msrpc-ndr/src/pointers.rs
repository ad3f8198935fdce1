//! NDR pointer types
//!
//! NDR supports three pointer semantics:
//!
//! - Reference (`[ref]`): Non-null, data follows inline, no wire representation
//! - Unique (`[unique]`): Nullable, 4-byte referent ID, pointee deferred, no aliasing
//! - Full (`[ptr]`): Nullable, 4-byte referent ID, pointee deferred, aliasing allowed

use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use crate::{NdrDecode, NdrEncode, NdrReader, NdrWriter, Result};

/// Trait for NDR pointer types
pub trait NdrPtr {
    type Target;

    /// Check if the pointer is null
    fn is_null(&self) -> bool;

    /// Get the inner value, if any
    fn get(&self) -> Option<&Self::Target>;
}

/// Reference pointer - non-null, data follows inline
///
/// The `[ref]` attribute in MIDL. The pointer itself is not transmitted;
/// the pointee data is always present.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RefPtr<T>(pub T);

impl<T> RefPtr<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Deref for RefPtr<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T> DerefMut for RefPtr<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl<T> NdrPtr for RefPtr<T> {
    type Target = T;

    fn is_null(&self) -> bool {
        false
    }

    fn get(&self) -> Option<&T> {
        Some(&self.0)
    }
}

impl<T: NdrEncode> NdrEncode for RefPtr<T> {
    fn ndr_write<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        w.write_data(&self.0)
    }

    fn ndr_align() -> usize {
        T::ndr_align()
    }
}

impl<T: NdrDecode> NdrDecode for RefPtr<T> {
    fn ndr_read<'a>(&'a mut self, r: &mut NdrReader<'a>) -> Result<()> {
        r.read_data(&mut self.0)
    }

    fn ndr_align() -> usize {
        T::ndr_align()
    }

    fn ndr_wire_size() -> usize {
        T::ndr_wire_size()
    }
}

/// Unique pointer - nullable, no aliasing
///
/// The `[unique]` attribute in MIDL. Encoded as a 4-byte referent ID
/// (0 = null); a non-null pointee is written when the enclosing level is
/// flushed. Every occurrence gets its own ID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniquePtr<T>(pub Option<Box<T>>);

impl<T> UniquePtr<T> {
    pub fn new(value: T) -> Self {
        Self(Some(Box::new(value)))
    }

    pub fn null() -> Self {
        Self(None)
    }

    pub fn into_option(self) -> Option<T> {
        self.0.map(|b| *b)
    }

    pub fn as_ref(&self) -> Option<&T> {
        self.0.as_deref()
    }

    pub fn as_mut(&mut self) -> Option<&mut T> {
        self.0.as_deref_mut()
    }
}

impl<T> Default for UniquePtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> From<Option<T>> for UniquePtr<T> {
    fn from(opt: Option<T>) -> Self {
        Self(opt.map(Box::new))
    }
}

impl<T> NdrPtr for UniquePtr<T> {
    type Target = T;

    fn is_null(&self) -> bool {
        self.0.is_none()
    }

    fn get(&self) -> Option<&T> {
        self.0.as_deref()
    }
}

impl<T: NdrEncode> NdrEncode for UniquePtr<T> {
    fn ndr_write<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        w.write_pointer(self.0.as_deref())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl<T: NdrDecode + Default> NdrDecode for UniquePtr<T> {
    fn ndr_read<'a>(&'a mut self, r: &mut NdrReader<'a>) -> Result<()> {
        r.read_pointer(&mut self.0)
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_wire_size() -> usize {
        4
    }
}

/// Full pointer - nullable, aliasing allowed
///
/// The `[ptr]` attribute in MIDL. Two full pointers holding the same `Rc`
/// allocation share one referent ID and the pointee is written once; on
/// decode every occurrence of that ID receives a clone of the same `Rc`.
///
/// The pointee is framed as a self-contained unit: anything it points to
/// follows it directly, ahead of the remaining pointees of its level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullPtr<T>(pub Option<Rc<T>>);

impl<T> FullPtr<T> {
    pub fn new(value: T) -> Self {
        Self(Some(Rc::new(value)))
    }

    pub fn null() -> Self {
        Self(None)
    }

    /// Point at an existing allocation, aliasing every other pointer to it
    pub fn from_rc(value: Rc<T>) -> Self {
        Self(Some(value))
    }

    /// True when both pointers are null or both point at the same allocation
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (&self.0, &other.0) {
            (Some(a), Some(b)) => Rc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl<T> Default for FullPtr<T> {
    fn default() -> Self {
        Self::null()
    }
}

impl<T> NdrPtr for FullPtr<T> {
    type Target = T;

    fn is_null(&self) -> bool {
        self.0.is_none()
    }

    fn get(&self) -> Option<&T> {
        self.0.as_deref()
    }
}

impl<T: NdrEncode> NdrEncode for FullPtr<T> {
    fn ndr_write<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        w.write_full_pointer(self.0.as_ref())
    }

    fn ndr_align() -> usize {
        4
    }
}

impl<T: NdrDecode + Default + 'static> NdrDecode for FullPtr<T> {
    fn ndr_read<'a>(&'a mut self, r: &mut NdrReader<'a>) -> Result<()> {
        r.read_full_pointer(&mut self.0)
    }

    fn ndr_align() -> usize {
        4
    }

    fn ndr_wire_size() -> usize {
        4
    }
}
