//! NDR discriminated unions
//!
//! A union travels as
//!
//! ```text
//! align(union_align)
//! discriminant: u32
//! align(union_align)
//! arm bytes
//! ```
//!
//! Rust unions of this kind are enums with one variant per documented
//! discriminant. Self-tagged unions supply their own discriminant; externally
//! tagged ones are given it by the enclosing structure, which has already
//! written it as an ordinary field.

use tracing::debug;

use crate::{NdrError, NdrReader, NdrWriter, Result};

/// A discriminated union with a closed set of arms
pub trait NdrUnion: Sized {
    /// Alignment class of the envelope: the widest of the discriminant and
    /// every arm, capped at 8
    fn union_align() -> usize;

    /// Discriminant of the arm currently held
    fn discriminant(&self) -> u32;

    /// Write the held arm's payload
    fn write_arm<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()>;

    /// A default-valued instance of the arm for `discriminant`.
    ///
    /// Unknown discriminants must fail with [`NdrError::InvalidDiscriminant`].
    fn with_discriminant(discriminant: u32) -> Result<Self>;

    /// Fill the arm selected by [`NdrUnion::with_discriminant`]
    fn read_arm<'a>(&'a mut self, r: &mut NdrReader<'a>) -> Result<()>;
}

impl<'a> NdrWriter<'a> {
    /// Self-tagged union: the discriminant comes from the value
    pub fn write_union<U: NdrUnion>(&mut self, value: &'a U) -> Result<()> {
        self.write_union_with(value, value.discriminant())
    }

    /// Externally tagged union: `switch` is the discriminant field the
    /// enclosing structure carries, which must select the arm held.
    pub fn write_union_with<U: NdrUnion>(&mut self, value: &'a U, switch: u32) -> Result<()> {
        let held = value.discriminant();
        if held != switch {
            return Err(NdrError::DiscriminantMismatch {
                expected: switch,
                got: held,
            });
        }
        self.write_align(U::union_align())?;
        self.write_u32(switch)?;
        self.write_align(U::union_align())?;
        value.write_arm(self)
    }
}

impl<'a> NdrReader<'a> {
    /// Self-tagged union: the wire discriminant selects the arm
    pub fn read_union<U: NdrUnion>(&mut self, target: &'a mut U) -> Result<()> {
        self.read_align(U::union_align())?;
        let discriminant = self.read_u32()?;
        self.read_union_arm(target, discriminant)
    }

    /// Externally tagged union: the wire discriminant must repeat `switch`,
    /// the value already read from the enclosing structure.
    pub fn read_union_with<U: NdrUnion>(&mut self, target: &'a mut U, switch: u32) -> Result<()> {
        self.read_align(U::union_align())?;
        let discriminant = self.read_u32()?;
        if discriminant != switch {
            debug!(switch, discriminant, "union discriminant disagrees with its switch field");
            return Err(NdrError::DiscriminantMismatch {
                expected: switch,
                got: discriminant,
            });
        }
        self.read_union_arm(target, discriminant)
    }

    fn read_union_arm<U: NdrUnion>(&mut self, target: &'a mut U, discriminant: u32) -> Result<()> {
        self.read_align(U::union_align())?;
        *target = U::with_discriminant(discriminant).map_err(|err| {
            debug!(discriminant, position = self.position(), "no union arm for discriminant");
            err
        })?;
        target.read_arm(self)
    }
}
