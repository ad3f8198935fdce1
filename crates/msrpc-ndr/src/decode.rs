//! NDR decoding trait and decode session

use std::rc::Rc;

use bytes::{Buf, Bytes};
use tracing::{debug, trace};

use crate::bounds::check_available;
use crate::referents::{DecodeReferents, DeferredQueue};
use crate::{NdrContext, NdrError, Result};

/// Trait for types that can be decoded from NDR format
///
/// Decoding fills a value in place. Pointer fields queue their pointee reads
/// on the reader, holding on to the field they will fill until the enclosing
/// level is flushed.
pub trait NdrDecode: Sized {
    /// Read this value from the reader's current position.
    fn ndr_read<'a>(&'a mut self, r: &mut NdrReader<'a>) -> Result<()>;

    /// Get the NDR alignment requirement for this type
    fn ndr_align() -> usize {
        1
    }

    /// Fewest bytes one value of this type can occupy on the wire.
    ///
    /// Used to reject declared element counts the remaining input cannot hold.
    fn ndr_wire_size() -> usize {
        1
    }
}

type DeferredRead<'a> = Box<dyn FnOnce(&mut NdrReader<'a>) -> Result<()> + 'a>;

/// One decode call: input cursor, referent table and deferred queue
pub struct NdrReader<'a> {
    buf: Bytes,
    position: usize,
    ctx: NdrContext,
    referents: DecodeReferents,
    deferred: DeferredQueue<DeferredRead<'a>>,
    depth: usize,
}

impl<'a> NdrReader<'a> {
    pub fn new(buf: Bytes, ctx: NdrContext) -> Self {
        Self {
            buf,
            position: 0,
            ctx,
            referents: DecodeReferents::default(),
            deferred: DeferredQueue::new(),
            depth: 0,
        }
    }

    pub fn context(&self) -> &NdrContext {
        &self.ctx
    }

    /// Byte offset from the start of the stub data
    pub fn position(&self) -> usize {
        self.position
    }

    /// Bytes left in the input
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    /// Fail with a bounds error unless `needed` more bytes are present
    pub fn ensure(&self, needed: usize) -> Result<()> {
        if self.buf.remaining() < needed {
            return Err(NdrError::BufferUnderflow {
                needed,
                have: self.buf.remaining(),
            });
        }
        Ok(())
    }

    fn advance(&mut self, count: usize) -> Result<()> {
        self.ensure(count)?;
        self.buf.advance(count);
        self.position += count;
        Ok(())
    }

    /// Skip padding up to the next multiple of `alignment`; the padding
    /// content is not inspected.
    pub fn read_align(&mut self, alignment: usize) -> Result<()> {
        NdrContext::check_alignment(alignment)?;
        let padding = NdrContext::align_padding(self.position, alignment);
        self.advance(padding)
    }

    /// Skip the end-of-structure gap; a body may end before the gap does.
    pub fn read_trailing_gap(&mut self, alignment: usize) -> Result<()> {
        NdrContext::check_alignment(alignment)?;
        let padding = NdrContext::align_padding(self.position, alignment).min(self.remaining());
        self.advance(padding)
    }

    /// Reject a declared count of `count` elements, each at least
    /// `element_size` bytes, before anything is allocated for it.
    pub fn check_available(&self, count: usize, element_size: usize) -> Result<()> {
        check_available(count, element_size, self.remaining(), self.ctx.max_allocation).map(|_| ())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        self.position += 1;
        Ok(self.ctx.get_u8(&mut self.buf))
    }

    pub fn read_i8(&mut self) -> Result<i8> {
        self.ensure(1)?;
        self.position += 1;
        Ok(self.ctx.get_i8(&mut self.buf))
    }

    /// Any nonzero byte is true
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Read a 16-bit NDR enum
    pub fn read_enum16(&mut self) -> Result<u16> {
        self.read_u16()
    }

    /// Raw bytes with no alignment
    pub fn read_bytes(&mut self, count: usize) -> Result<Bytes> {
        self.ensure(count)?;
        self.position += count;
        Ok(self.buf.split_to(count))
    }

    /// Fill `target` from the wire
    pub fn read_data<T: NdrDecode>(&mut self, target: &'a mut T) -> Result<()> {
        target.ndr_read(self)
    }

    /// Decode a value in a nested scope that owns it: the value and all of its
    /// pointees are read and flushed before this returns.
    pub fn read_isolated<T: NdrDecode + Default>(&mut self) -> Result<T> {
        let depth = self.depth + 1;
        if depth > self.ctx.max_depth {
            return Err(NdrError::DepthLimitExceeded(self.ctx.max_depth));
        }

        let mut value = T::default();
        let (buf, position, referents, result) = {
            let mut scope = NdrReader {
                buf: std::mem::take(&mut self.buf),
                position: self.position,
                ctx: self.ctx,
                referents: std::mem::take(&mut self.referents),
                deferred: DeferredQueue::new(),
                depth,
            };
            let result = scope
                .read_data(&mut value)
                .and_then(|()| scope.flush_deferred());
            (scope.buf, scope.position, scope.referents, result)
        };
        self.buf = buf;
        self.position = position;
        self.referents = referents;
        result.map(|()| value)
    }

    /// Array conformance: aligned `max_count`
    pub fn read_conformance(&mut self) -> Result<usize> {
        Ok(self.read_u32()? as usize)
    }

    /// Array variance: aligned `offset` and `actual_count`
    pub fn read_variance(&mut self) -> Result<(usize, usize)> {
        let offset = self.read_u32()? as usize;
        let actual_count = self.read_u32()? as usize;
        Ok((offset, actual_count))
    }

    /// Queue pointee content for the next flush of this level
    pub fn defer<F>(&mut self, entry: F)
    where
        F: FnOnce(&mut NdrReader<'a>) -> Result<()> + 'a,
    {
        self.deferred.push(Box::new(entry));
    }

    /// Optional-singular pointer: a zero referent ID leaves `target` empty,
    /// anything else queues the pointee read into a fresh allocation.
    pub fn read_pointer<T: NdrDecode + Default>(&mut self, target: &'a mut Option<Box<T>>) -> Result<()> {
        *target = None;
        self.read_pointer_with(move |r| {
            let pointee = target.insert(Box::default());
            r.read_data(&mut **pointee)
        })?;
        Ok(())
    }

    /// Optional-singular pointer whose pointee is consumed by `pointee`.
    ///
    /// Returns false for a zero referent ID, in which case `pointee` is
    /// dropped without running.
    pub fn read_pointer_with<F>(&mut self, pointee: F) -> Result<bool>
    where
        F: FnOnce(&mut NdrReader<'a>) -> Result<()> + 'a,
    {
        if self.read_u32()? == 0 {
            return Ok(false);
        }
        self.defer(pointee);
        Ok(true)
    }

    /// Optional-aliasable pointer: occurrences sharing a referent ID share one
    /// materialized pointee.
    ///
    /// Mirrors the encoder: whichever queued occurrence runs first reads the
    /// pointee in its own scope, the others pick up the shared value.
    pub fn read_full_pointer<T>(&mut self, target: &'a mut Option<Rc<T>>) -> Result<()>
    where
        T: NdrDecode + Default + 'static,
    {
        let id = self.read_u32()?;
        *target = None;
        if id == 0 {
            return Ok(());
        }
        self.referents.register(id);
        self.defer(move |r| {
            let pointee = if r.referents.claim(id) {
                let pointee = Rc::new(r.read_isolated::<T>()?);
                r.referents.resolve(id, Rc::clone(&pointee));
                pointee
            } else {
                r.referents.lookup::<T>(id)?
            };
            *target = Some(pointee);
            Ok(())
        });
        Ok(())
    }

    /// Drain the deferred queue breadth-first, mirroring the encoder
    pub fn flush_deferred(&mut self) -> Result<()> {
        let mut pass = 0;
        while !self.deferred.is_empty() {
            pass += 1;
            if pass > self.ctx.max_depth {
                return Err(NdrError::DepthLimitExceeded(self.ctx.max_depth));
            }
            let batch = self.deferred.take_batch();
            trace!(pass, entries = batch.len(), position = self.position, "reading deferred pointees");
            for entry in batch {
                entry(self)?;
            }
        }
        Ok(())
    }

    /// Flush the last level and confirm every aliasable referent was delivered
    pub fn finish(mut self) -> Result<()> {
        self.flush_deferred()?;
        self.referents.ensure_resolved().map_err(|err| {
            debug!(error = %err, "decode left a referent unresolved");
            err
        })
    }
}

// Aligned, byte-order aware readers for the multi-byte scalars.
macro_rules! aligned_readers {
    ($($name:ident: $ty:ty => $get:ident;)*) => {
        impl<'a> NdrReader<'a> {
            $(
                pub fn $name(&mut self) -> Result<$ty> {
                    const SIZE: usize = std::mem::size_of::<$ty>();
                    self.read_align(SIZE)?;
                    self.ensure(SIZE)?;
                    self.position += SIZE;
                    Ok(self.ctx.$get(&mut self.buf))
                }
            )*
        }
    };
}

aligned_readers! {
    read_u16: u16 => get_u16;
    read_i16: i16 => get_i16;
    read_u32: u32 => get_u32;
    read_i32: i32 => get_i32;
    read_u64: u64 => get_u64;
    read_i64: i64 => get_i64;
    read_f32: f32 => get_f32;
    read_f64: f64 => get_f64;
}

/// Decode one complete stub body into a fresh value
pub fn from_bytes<T: NdrDecode + Default>(buf: Bytes, ctx: NdrContext) -> Result<T> {
    let mut value = T::default();
    {
        let mut r = NdrReader::new(buf, ctx);
        r.read_data(&mut value)?;
        r.finish()?;
    }
    Ok(value)
}
