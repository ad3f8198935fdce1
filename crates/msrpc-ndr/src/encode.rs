//! NDR encoding trait and encode session

use std::rc::Rc;

use bytes::{BufMut, Bytes, BytesMut};
use tracing::trace;

use crate::bounds::wire_count;
use crate::referents::{DeferredQueue, EncodeReferents};
use crate::{NdrContext, NdrError, Result};

/// Trait for types that can be encoded to NDR format
pub trait NdrEncode {
    /// Frame this value at the writer's current position.
    ///
    /// Pointee data of embedded pointers is queued on the writer and lands
    /// after the current level, when the caller flushes.
    fn ndr_write<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()>;

    /// Get the NDR alignment requirement for this type
    fn ndr_align() -> usize
    where
        Self: Sized,
    {
        1
    }

    /// Hook run by [`NdrWriter::write_data`] right before this value is framed.
    ///
    /// Range checks and other pre-encode validation belong here.
    fn ndr_prepare(&self) -> Result<()> {
        Ok(())
    }
}

type DeferredWrite<'a> = Box<dyn FnOnce(&mut NdrWriter<'a>) -> Result<()> + 'a>;

/// One encode call: output buffer, referent table and deferred queue
pub struct NdrWriter<'a> {
    buf: BytesMut,
    ctx: NdrContext,
    referents: EncodeReferents,
    deferred: DeferredQueue<DeferredWrite<'a>>,
    depth: usize,
}

impl<'a> NdrWriter<'a> {
    pub fn new(ctx: NdrContext) -> Self {
        Self {
            buf: BytesMut::new(),
            ctx,
            referents: EncodeReferents::new(),
            deferred: DeferredQueue::new(),
            depth: 0,
        }
    }

    pub fn context(&self) -> &NdrContext {
        &self.ctx
    }

    /// Byte offset from the start of the stub data
    pub fn position(&self) -> usize {
        self.buf.len()
    }

    /// Bytes written so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Write zero padding up to the next multiple of `alignment`
    pub fn write_align(&mut self, alignment: usize) -> Result<()> {
        NdrContext::check_alignment(alignment)?;
        let padding = NdrContext::align_padding(self.position(), alignment);
        self.buf.put_bytes(0, padding);
        Ok(())
    }

    /// Pad the end of a structure out to its alignment class
    pub fn write_trailing_gap(&mut self, alignment: usize) -> Result<()> {
        self.write_align(alignment)
    }

    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        self.ctx.put_u8(&mut self.buf, value);
        Ok(())
    }

    pub fn write_i8(&mut self, value: i8) -> Result<()> {
        self.ctx.put_i8(&mut self.buf, value);
        Ok(())
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_u8(u8::from(value))
    }

    /// Write an NDR enum, which travels as 16 bits
    pub fn write_enum16(&mut self, value: u16) -> Result<()> {
        self.write_u16(value)
    }

    /// Raw bytes with no alignment
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.buf.put_slice(bytes);
        Ok(())
    }

    /// Run the value's prepare hook, then frame it
    pub fn write_data<T: NdrEncode + ?Sized>(&mut self, value: &'a T) -> Result<()> {
        value.ndr_prepare()?;
        value.ndr_write(self)
    }

    /// Array conformance: aligned `max_count`
    pub fn write_conformance(&mut self, max_count: usize) -> Result<()> {
        self.write_u32(wire_count(max_count)?)
    }

    /// Array variance: aligned `offset` and `actual_count`
    pub fn write_variance(&mut self, offset: usize, actual_count: usize) -> Result<()> {
        self.write_u32(wire_count(offset)?)?;
        self.write_u32(wire_count(actual_count)?)
    }

    /// Queue pointee content for the next flush of this level
    pub fn defer<F>(&mut self, entry: F)
    where
        F: FnOnce(&mut NdrWriter<'a>) -> Result<()> + 'a,
    {
        self.deferred.push(Box::new(entry));
    }

    /// Encode a value in a nested scope: the value and all of its pointees are
    /// written and flushed before this returns.
    ///
    /// Used for values that do not outlive the call, such as zero padding
    /// elements, and for the pointees of aliasable pointers.
    pub fn write_isolated<T: NdrEncode + ?Sized>(&mut self, value: &T) -> Result<()> {
        let depth = self.depth + 1;
        if depth > self.ctx.max_depth {
            return Err(NdrError::DepthLimitExceeded(self.ctx.max_depth));
        }

        let (buf, referents, result) = {
            let mut scope = NdrWriter {
                buf: std::mem::take(&mut self.buf),
                ctx: self.ctx,
                referents: std::mem::replace(&mut self.referents, EncodeReferents::new()),
                deferred: DeferredQueue::new(),
                depth,
            };
            let result = scope.write_data(value).and_then(|()| scope.flush_deferred());
            (scope.buf, scope.referents, result)
        };
        self.buf = buf;
        self.referents = referents;
        result
    }

    /// Optional-singular pointer: a fresh referent ID per occurrence, pointee deferred
    pub fn write_pointer<T: NdrEncode + ?Sized>(&mut self, value: Option<&'a T>) -> Result<()> {
        match value {
            None => self.write_pointer_with(false, |_| Ok(())),
            Some(value) => self.write_pointer_with(true, move |w| w.write_data(value)),
        }
    }

    /// Optional-singular pointer whose pointee is produced by `pointee`.
    ///
    /// Writes a zero referent ID when `present` is false, otherwise a fresh ID
    /// followed, at the next flush, by whatever `pointee` writes.
    pub fn write_pointer_with<F>(&mut self, present: bool, pointee: F) -> Result<()>
    where
        F: FnOnce(&mut NdrWriter<'a>) -> Result<()> + 'a,
    {
        if !present {
            return self.write_u32(0);
        }
        let id = self.referents.fresh()?;
        self.write_u32(id)?;
        self.defer(pointee);
        Ok(())
    }

    /// Optional-aliasable pointer: occurrences sharing one allocation share one
    /// referent ID, and the pointee is written once.
    ///
    /// Every occurrence queues a write, and whichever runs first emits the
    /// pointee. The pointee is a self-contained unit: its own pointees follow
    /// it directly instead of joining this level's queue.
    pub fn write_full_pointer<T: NdrEncode>(&mut self, value: Option<&'a Rc<T>>) -> Result<()> {
        match value {
            None => self.write_u32(0),
            Some(value) => {
                let identity = Rc::as_ptr(value) as *const () as usize;
                let id = self.referents.for_identity(identity)?;
                self.write_u32(id)?;
                self.defer(move |w| {
                    if w.referents.claim(id) {
                        w.write_isolated(&**value)?;
                    }
                    Ok(())
                });
                Ok(())
            }
        }
    }

    /// Drain the deferred queue breadth-first: every pointee queued at this
    /// level is written before any pointee those writes queue in turn.
    pub fn flush_deferred(&mut self) -> Result<()> {
        let mut pass = 0;
        while !self.deferred.is_empty() {
            pass += 1;
            if pass > self.ctx.max_depth {
                return Err(NdrError::DepthLimitExceeded(self.ctx.max_depth));
            }
            let batch = self.deferred.take_batch();
            trace!(pass, entries = batch.len(), position = self.position(), "flushing deferred pointees");
            for entry in batch {
                entry(self)?;
            }
        }
        Ok(())
    }

    /// Flush whatever is still deferred and hand the buffer to the transport
    pub fn finish(mut self) -> Result<Bytes> {
        self.flush_deferred()?;
        Ok(self.buf.freeze())
    }
}

// Aligned, byte-order aware writers for the multi-byte scalars.
macro_rules! aligned_writers {
    ($($name:ident: $ty:ty => $put:ident;)*) => {
        impl<'a> NdrWriter<'a> {
            $(
                pub fn $name(&mut self, value: $ty) -> Result<()> {
                    self.write_align(std::mem::size_of::<$ty>())?;
                    self.ctx.$put(&mut self.buf, value);
                    Ok(())
                }
            )*
        }
    };
}

aligned_writers! {
    write_u16: u16 => put_u16;
    write_i16: i16 => put_i16;
    write_u32: u32 => put_u32;
    write_i32: i32 => put_i32;
    write_u64: u64 => put_u64;
    write_i64: i64 => put_i64;
    write_f32: f32 => put_f32;
    write_f64: f64 => put_f64;
}

/// Encode a value as one complete stub body: frame it, flush its deferred
/// pointees, and return the buffer.
pub fn to_bytes<T: NdrEncode + ?Sized>(value: &T, ctx: NdrContext) -> Result<Bytes> {
    let mut w = NdrWriter::new(ctx);
    w.write_data(value)?;
    w.finish()
}
