//! Referent tables and the deferred-content queue
//!
//! A pointer is written as a 4-byte referent ID at the point it occurs; the
//! data it points to is deferred until the enclosing level is flushed. Both
//! tables and the queue live inside a single encode or decode session and are
//! dropped with it.

use std::any::Any;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use tracing::trace;

use crate::error::{NdrError, Result};

/// First referent ID handed out in a session; subsequent IDs step by 4
pub const FIRST_REFERENT_ID: u32 = 0x0002_0000;

/// FIFO of pending pointee closures for one session
pub(crate) struct DeferredQueue<F> {
    entries: VecDeque<F>,
}

impl<F> DeferredQueue<F> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    pub fn push(&mut self, entry: F) {
        self.entries.push_back(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Detach everything queued so far; entries pushed while the batch runs
    /// land in the next batch.
    pub fn take_batch(&mut self) -> VecDeque<F> {
        std::mem::take(&mut self.entries)
    }
}

/// Encode-side table: pointee identity to referent ID
#[derive(Debug)]
pub(crate) struct EncodeReferents {
    next_id: u32,
    by_identity: HashMap<usize, u32>,
    written: HashSet<u32>,
}

impl EncodeReferents {
    pub fn new() -> Self {
        Self {
            next_id: FIRST_REFERENT_ID,
            by_identity: HashMap::new(),
            written: HashSet::new(),
        }
    }

    /// A referent ID that has never been issued in this session
    pub fn fresh(&mut self) -> Result<u32> {
        let id = self.next_id;
        self.next_id = self.next_id.checked_add(4).ok_or(NdrError::IntegerOverflow)?;
        Ok(id)
    }

    /// The referent ID for an aliasable pointee; every occurrence of the same
    /// allocation gets the same ID.
    pub fn for_identity(&mut self, identity: usize) -> Result<u32> {
        if let Some(&id) = self.by_identity.get(&identity) {
            trace!(referent_id = id, "aliased pointee");
            return Ok(id);
        }
        let id = self.fresh()?;
        self.by_identity.insert(identity, id);
        Ok(id)
    }

    /// Take the right to write the pointee behind `id`. Only the first
    /// deferred occurrence to run gets it.
    pub fn claim(&mut self, id: u32) -> bool {
        self.written.insert(id)
    }
}

enum Referent {
    /// Seen, content not reached yet
    Pending,
    /// Content is being read
    Reading,
    Ready(Box<dyn Any>),
}

/// Decode-side table: referent ID to materialized shared pointee
#[derive(Default)]
pub(crate) struct DecodeReferents {
    entries: HashMap<u32, Referent>,
}

impl DecodeReferents {
    /// Note an aliasable referent ID; true on first sighting
    pub fn register(&mut self, id: u32) -> bool {
        if self.entries.contains_key(&id) {
            trace!(referent_id = id, "aliased referent");
            return false;
        }
        self.entries.insert(id, Referent::Pending);
        true
    }

    /// Take the right to read the pointee behind `id`. Only the first deferred
    /// occurrence to run gets it; the others look the result up.
    pub fn claim(&mut self, id: u32) -> bool {
        match self.entries.get_mut(&id) {
            Some(referent) if matches!(referent, Referent::Pending) => {
                *referent = Referent::Reading;
                true
            }
            _ => false,
        }
    }

    pub fn resolve<T: 'static>(&mut self, id: u32, value: Rc<T>) {
        self.entries.insert(id, Referent::Ready(Box::new(value)));
    }

    pub fn lookup<T: 'static>(&self, id: u32) -> Result<Rc<T>> {
        match self.entries.get(&id) {
            Some(Referent::Ready(value)) => value
                .downcast_ref::<Rc<T>>()
                .cloned()
                .ok_or(NdrError::ReferentTypeMismatch(id)),
            Some(Referent::Pending | Referent::Reading) | None => Err(NdrError::UnresolvedReferent(id)),
        }
    }

    /// Every registered referent must have been materialized by the end of a call
    pub fn ensure_resolved(&self) -> Result<()> {
        match self
            .entries
            .iter()
            .find(|(_, referent)| !matches!(referent, Referent::Ready(_)))
        {
            Some((&id, _)) => Err(NdrError::UnresolvedReferent(id)),
            None => Ok(()),
        }
    }
}
