//! NDR (Network Data Representation) encoding engine
//!
//! This crate turns typed values into DCE/RPC NDR stub data and back, for the
//! code that marshals individual MS-RPC operations (DCOM interfaces, the MSMQ
//! queue manager and the like). Transport concerns such as binding,
//! authentication and fragmentation live elsewhere: the engine consumes and
//! produces one defragmented stub body as [`Bytes`].
//!
//! # NDR Wire Format
//!
//! - Primitives align to their natural size (1, 2, 4, or 8 bytes)
//! - Structures align to their largest member, capped at 8
//! - Unique and full pointers are 4-byte referent IDs; their pointees are
//!   deferred until every immediate field of the enclosing level is written,
//!   then flushed breadth-first
//! - Conformant data (arrays with runtime-determined size) carries a `max_count`
//! - Strings are conformant varying arrays with a null terminator
//! - Unions are an aligned `u32` discriminant followed by the aligned arm
//!
//! # Sessions
//!
//! Each call builds its own [`NdrWriter`] or [`NdrReader`], which own the
//! cursor, the referent table and the deferred queue. Nothing is shared
//! between sessions, so independent calls can run on any number of threads.
//!
//! ```
//! use msrpc_ndr::{from_bytes, to_bytes, NdrContext, NdrWString};
//!
//! let ctx = NdrContext::new();
//! let bytes = to_bytes(&NdrWString::with_max("Hi", 4), ctx).unwrap();
//! let text: NdrWString = from_bytes(bytes, ctx).unwrap();
//! assert_eq!(text.as_str(), "Hi");
//! ```

mod arrays;
mod bounds;
mod context;
mod context_handle;
mod decode;
mod encode;
mod error;
mod pointers;
mod primitives;
mod referents;
mod strings;
mod unions;

pub use arrays::{ArrayHeader, ConformantArray, ConformantVaryingArray, CountedArray, FixedArray};
pub use bounds::{check_available, check_range, wire_count};
pub use context::NdrContext;
pub use context_handle::ContextHandle;
pub use decode::{from_bytes, NdrDecode, NdrReader};
pub use encode::{to_bytes, NdrEncode, NdrWriter};
pub use error::{NdrError, Result, MAX_NDR_ALLOCATION_SIZE, MAX_NDR_DEPTH};
pub use pointers::{FullPtr, NdrPtr, RefPtr, UniquePtr};
pub use primitives::{ErrorStatusT, NdrUuid};
pub use referents::FIRST_REFERENT_ID;
pub use strings::{NdrString, NdrWString};
pub use unions::NdrUnion;

/// Re-export bytes for convenience
pub use bytes::{Buf, BufMut, Bytes, BytesMut};
