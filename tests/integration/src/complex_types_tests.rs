//! Complex Types Tests - NDR encoding of DCOM and MSMQ shaped structures
//!
//! These tests exercise complex data type handling end to end:
//! - Nested structures with deferred pointees at several levels
//! - Conformant structures, counted blobs and varying arrays
//! - Pointers (ref, unique, full) including aliasing
//! - Strings (ANSI and Unicode)
//! - Externally tagged unions
//! - Context handles and byte order

use std::rc::Rc;

use bytes::Bytes;
use integration_tests::dcom::{
    ComVersion, InterfaceLookup, InterfacePair, InterfaceRef, LinkedNode, OrpcExtent, OrpcExtentArray, OrpcThis,
    SharedExtensions,
};
use integration_tests::init_logging;
use integration_tests::mqmq::{
    format_type, HandleBatch, MessageBody, MulticastId, ObjectId, OpenQueueResponse, QueueFormat, QueueFormatId,
};
use msrpc_ndr::{
    from_bytes, to_bytes, ConformantVaryingArray, ContextHandle, CountedArray, FixedArray, FullPtr, NdrContext,
    NdrDecode, NdrEncode, NdrError, NdrPtr, NdrReader, NdrString, NdrUnion, NdrUuid, NdrWString, NdrWriter, RefPtr,
    Result,
    UniquePtr, FIRST_REFERENT_ID,
};

fn roundtrip<T>(value: &T, ctx: NdrContext) -> T
where
    T: NdrEncode + NdrDecode + Default,
{
    let bytes = to_bytes(value, ctx).unwrap();
    from_bytes(bytes, ctx).unwrap()
}

fn sample_uuid(seed: u8) -> NdrUuid {
    NdrUuid {
        data1: 0x1000_0000 | u32::from(seed),
        data2: 0x2000 | u16::from(seed),
        data3: 0x3000,
        data4: [seed; 8],
    }
}

fn sample_orpc_this() -> OrpcThis {
    OrpcThis {
        version: ComVersion::V5_7,
        flags: 0,
        reserved1: 0,
        cid: sample_uuid(1),
        extensions: UniquePtr::new(OrpcExtentArray::new(vec![
            OrpcExtent::new(sample_uuid(2), b"causality"),
            OrpcExtent::new(sample_uuid(3), &[0xAB; 16]),
            OrpcExtent::new(sample_uuid(4), b""),
        ])),
    }
}

fn read_u32_at(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]])
}

#[test]
fn test_orpc_this_without_extensions() {
    init_logging();
    let ctx = NdrContext::new();
    let this = OrpcThis {
        version: ComVersion::V5_7,
        cid: sample_uuid(9),
        ..Default::default()
    };

    let bytes = to_bytes(&this, ctx).unwrap();
    assert_eq!(bytes.len(), 32);
    assert_eq!(&bytes[0..4], &[5, 0, 7, 0]);
    assert_eq!(read_u32_at(&bytes, 28), 0); // null extensions

    assert_eq!(from_bytes::<OrpcThis>(bytes, ctx).unwrap(), this);
}

#[test]
fn test_orpc_this_nested_extensions_roundtrip() {
    init_logging();
    let ctx = NdrContext::new();
    let this = sample_orpc_this();

    let bytes = to_bytes(&this, ctx).unwrap();
    // immediate level: version, flags, reserved, cid, extensions referent
    assert_eq!(read_u32_at(&bytes, 28), FIRST_REFERENT_ID);
    // first deferred level: the extent array header and its array referent
    assert_eq!(read_u32_at(&bytes, 32), 3);
    assert_ne!(read_u32_at(&bytes, 40), 0);
    // second level: four slots, the padding slot null
    assert_eq!(read_u32_at(&bytes, 44), 4);
    assert_eq!(read_u32_at(&bytes, 60), 0);

    let decoded: OrpcThis = from_bytes(bytes, ctx).unwrap();
    assert_eq!(decoded, this);

    let extensions = decoded.extensions.get().unwrap();
    let payloads: Vec<&[u8]> = extensions.iter().map(OrpcExtent::payload).collect();
    assert_eq!(payloads, vec![&b"causality"[..], &[0xAB; 16][..], &b""[..]]);
}

#[test]
fn test_conformant_structure_hoists_max_count() {
    let ctx = NdrContext::new();
    let extent = OrpcExtent::new(sample_uuid(7), b"abc");

    let bytes = to_bytes(&extent, ctx).unwrap();
    // max_count, GUID, size, then eight data bytes
    assert_eq!(bytes.len(), 4 + 16 + 4 + 8);
    assert_eq!(read_u32_at(&bytes, 0), 8);
    assert_eq!(read_u32_at(&bytes, 20), 3);
    assert_eq!(&bytes[24..], b"abc\0\0\0\0\0");

    let decoded: OrpcExtent = from_bytes(bytes, ctx).unwrap();
    assert_eq!(decoded.payload(), b"abc");
}

#[test]
fn test_conformant_structure_rejects_inconsistent_size() {
    let ctx = NdrContext::new();
    let mut extent = OrpcExtent::new(sample_uuid(7), b"abc");
    extent.size = 12;
    assert!(matches!(
        to_bytes(&extent, ctx),
        Err(NdrError::ConformanceMismatch { max_count: 8, actual_count: 12 })
    ));
}

#[test]
fn test_big_endian_session() {
    init_logging();
    let ctx = NdrContext::from_drep([0x00, 0x00, 0x00, 0x00]);
    assert!(!ctx.little_endian);

    let this = sample_orpc_this();
    let bytes = to_bytes(&this, ctx).unwrap();
    assert_eq!(&bytes[0..4], &[0, 5, 0, 7]);
    assert_eq!(roundtrip(&this, ctx), this);

    // the same value framed little-endian differs only in byte order
    let le = to_bytes(&this, NdrContext::from_drep([0x10, 0, 0, 0])).unwrap();
    assert_eq!(le.len(), bytes.len());
    assert_ne!(le, bytes);
}

#[test]
fn test_queue_format_union_arms() {
    init_logging();
    let ctx = NdrContext::new();
    let formats = vec![
        QueueFormat::new(QueueFormatId::Unknown),
        QueueFormat::new(QueueFormatId::Public(sample_uuid(1))),
        QueueFormat::new(QueueFormatId::Private(ObjectId {
            lineage: sample_uuid(2),
            uniquifier: 42,
        })),
        QueueFormat::direct("TCP:10.0.0.1\\private$\\orders"),
        QueueFormat::new(QueueFormatId::Machine(sample_uuid(3))),
        QueueFormat::new(QueueFormatId::Multicast(MulticastId {
            address: 0xE000_0001,
            port: 1801,
        })),
    ];

    for format in &formats {
        let decoded = roundtrip(format, ctx);
        assert_eq!(&decoded, format);
        assert_eq!(u32::from(decoded.format_type), format.id.discriminant());
    }
}

#[test]
fn test_queue_format_direct_layout() {
    let ctx = NdrContext::new();
    let bytes = to_bytes(&QueueFormat::direct("Q"), ctx).unwrap();
    assert_eq!(
        &bytes[..],
        &[
            format_type::DIRECT, 0, 0, 0, // m_qft, m_SuffixAndFlags, m_reserved
            3, 0, 0, 0, // union discriminant
            0, 0, 2, 0, // m_pDirectID referent
            2, 0, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0, // string header
            b'Q', 0, 0, 0,
        ]
    );
}

#[test]
fn test_queue_format_tag_disagrees_with_arm() {
    let ctx = NdrContext::new();
    let mut format = QueueFormat::new(QueueFormatId::Machine(sample_uuid(5)));
    format.format_type = format_type::PUBLIC;
    assert!(matches!(
        to_bytes(&format, ctx),
        Err(NdrError::DiscriminantMismatch { expected: 1, got: 4 })
    ));

    // a wire discriminant that disagrees with the m_qft field
    let data = [1, 0, 0, 0, 4, 0, 0, 0];
    let err = from_bytes::<QueueFormat>(Bytes::copy_from_slice(&data), ctx).unwrap_err();
    assert!(matches!(err, NdrError::DiscriminantMismatch { expected: 1, got: 4 }));
}

#[test]
fn test_queue_format_unknown_type() {
    let ctx = NdrContext::new();
    let data = [9, 0, 0, 0, 9, 0, 0, 0, 0, 0, 0, 0];
    let err = from_bytes::<QueueFormat>(Bytes::copy_from_slice(&data), ctx).unwrap_err();
    assert!(matches!(err, NdrError::InvalidDiscriminant(9)));
}

#[test]
fn test_open_queue_response_with_context_handle() {
    let ctx = NdrContext::new();
    let response = OpenQueueResponse {
        handle: ContextHandle::new(0, *b"0123456789abcdef"),
        queue: QueueFormat::direct("OS:host\\private$\\q"),
        status: 0,
    };

    let bytes = to_bytes(&response, ctx).unwrap();
    assert_eq!(&bytes[4..20], b"0123456789abcdef");

    let decoded = roundtrip(&response, ctx);
    assert_eq!(decoded, response);
    assert!(!decoded.handle.is_null());
}

#[test]
fn test_full_pointer_aliasing_in_interface_pair() {
    init_logging();
    let ctx = NdrContext::new();
    let pair = InterfacePair::aliased(InterfaceRef {
        ipid: sample_uuid(8),
        public_refs: 5,
    });

    let bytes = to_bytes(&pair, ctx).unwrap();
    assert_eq!(read_u32_at(&bytes, 0), read_u32_at(&bytes, 4));
    assert_ne!(read_u32_at(&bytes, 0), 0);
    assert_eq!(bytes.len(), 8 + 20); // pointee written once

    let decoded: InterfacePair = from_bytes(bytes, ctx).unwrap();
    assert!(decoded.primary.ptr_eq(&decoded.secondary));
    let (Some(a), Some(b)) = (&decoded.primary.0, &decoded.secondary.0) else {
        panic!("both references should be present");
    };
    assert_eq!(Rc::strong_count(a), 2);
    assert_eq!(b.public_refs, 5);
}

#[test]
fn test_aliased_extensions_keep_their_nested_pointees() {
    init_logging();
    let ctx = NdrContext::new();
    let value = SharedExtensions::aliased(
        OrpcExtentArray::new(vec![
            OrpcExtent::new(sample_uuid(1), b"first"),
            OrpcExtent::new(sample_uuid(2), b"second"),
        ]),
        OrpcExtent::new(sample_uuid(3), b"trailer!"),
    );

    let bytes = to_bytes(&value, ctx).unwrap();
    assert_eq!(read_u32_at(&bytes, 0), FIRST_REFERENT_ID);
    assert_eq!(read_u32_at(&bytes, 8), FIRST_REFERENT_ID);
    // the shared array and everything under it come before the trailer
    assert_eq!(read_u32_at(&bytes, 12), 2);
    assert!(bytes.ends_with(b"trailer!"));

    let decoded: SharedExtensions = from_bytes(bytes, ctx).unwrap();
    assert!(decoded.extensions.ptr_eq(&decoded.repeat));
    let payloads: Vec<&[u8]> = decoded
        .extensions
        .get()
        .unwrap()
        .iter()
        .map(OrpcExtent::payload)
        .collect();
    assert_eq!(payloads, vec![&b"first"[..], &b"second"[..]]);
    assert_eq!(decoded.trailer.get().map(OrpcExtent::payload), Some(&b"trailer!"[..]));
    assert_eq!(decoded, value);
}

fn decode_lookup(bytes: Bytes, direct_first: bool, ctx: NdrContext) -> Result<InterfaceLookup> {
    let mut lookup = InterfaceLookup {
        direct_first,
        ..Default::default()
    };
    {
        let mut r = NdrReader::new(bytes, ctx);
        r.read_data(&mut lookup)?;
        r.finish()?;
    }
    Ok(lookup)
}

#[test]
fn test_alias_reached_through_nested_record_in_both_orders() {
    init_logging();
    for ctx in [NdrContext::new(), NdrContext::big_endian()] {
        for direct_first in [false, true] {
            let iref = InterfaceRef {
                ipid: sample_uuid(4),
                public_refs: 3,
            };
            let lookup = InterfaceLookup::aliased(direct_first, iref, &[10, 20, 30]);

            let bytes = to_bytes(&lookup, ctx).unwrap();
            // two referents, the record, one interface reference, three hops
            assert_eq!(bytes.len(), 8 + 8 + 20 + 3 * 8);

            let decoded = decode_lookup(bytes, direct_first, ctx).unwrap();
            assert!(decoded.is_shared(), "direct_first = {direct_first}");
            assert_eq!(decoded.direct.get().map(|iref| iref.public_refs), Some(3));
            let resolved = decoded.resolved.get().unwrap();
            assert_eq!(LinkedNode::values(&resolved.hops), vec![10, 20, 30]);
            assert_eq!(decoded, lookup);
        }
    }
}

#[test]
fn test_full_pointer_distinct_and_null() {
    let ctx = NdrContext::new();
    let pair = InterfacePair {
        primary: FullPtr::new(InterfaceRef::default()),
        secondary: FullPtr::null(),
    };
    let bytes = to_bytes(&pair, ctx).unwrap();
    assert_eq!(read_u32_at(&bytes, 4), 0);

    let decoded: InterfacePair = from_bytes(bytes, ctx).unwrap();
    assert!(decoded.secondary.is_null());
    assert_eq!(decoded, pair);
}

#[test]
fn test_linked_list_is_flushed_breadth_first() {
    let ctx = NdrContext::new();
    let values: Vec<u32> = (1..=50).collect();
    let head = LinkedNode::chain(&values);

    let bytes = to_bytes(&head, ctx).unwrap();
    // each node is its value then the referent of the next node
    assert_eq!(bytes.len(), 4 + 50 * 8);
    assert_eq!(read_u32_at(&bytes, 4), 1);
    assert_eq!(read_u32_at(&bytes, 12), 2);
    assert_eq!(read_u32_at(&bytes, bytes.len() - 4), 0);

    let decoded: UniquePtr<LinkedNode> = from_bytes(bytes, ctx).unwrap();
    assert_eq!(LinkedNode::values(&decoded), values);
}

#[test]
fn test_message_body_length_derivation() {
    let ctx = NdrContext::new();
    let body = MessageBody {
        body: CountedArray::new(b"hello queue".to_vec()),
    };

    let bytes = to_bytes(&body, ctx).unwrap();
    assert_eq!(read_u32_at(&bytes, 0), 11);
    assert_eq!(read_u32_at(&bytes, 8), 11);

    let decoded = roundtrip(&body, ctx);
    assert_eq!(decoded.body.count, 11);
    assert_eq!(decoded.body.as_slice(), b"hello queue");
}

#[test]
fn test_message_body_declared_length_truncates() {
    // a short declared length reports "buffer too small" with a partial payload
    let ctx = NdrContext::new();
    let body = MessageBody {
        body: CountedArray::with_count(5, b"hello queue".to_vec()),
    };
    let decoded = roundtrip(&body, ctx);
    assert_eq!(decoded.body.as_slice(), b"hello");
}

#[test]
fn test_message_body_absent_payload() {
    let ctx = NdrContext::new();
    let body = MessageBody::default();
    let bytes = to_bytes(&body, ctx).unwrap();
    assert_eq!(&bytes[..], &[0; 8]);
    assert!(roundtrip(&body, ctx).body.elements.is_none());
}

#[test]
fn test_handle_batch_roundtrip() {
    let ctx = NdrContext::new();
    let batch = HandleBatch::new((0..4u8).map(|i| ContextHandle::new(0, [i; 16])).collect());

    let bytes = to_bytes(&batch, ctx).unwrap();
    assert_eq!(bytes.len(), 4 + 4 + 4 + 4 * ContextHandle::SIZE);
    assert_eq!(roundtrip(&batch, ctx), batch);
}

/// Event record with a 1-byte tag followed by an 8-byte timestamp: its
/// alignment class is 8 and it ends with a trailing gap.
#[derive(Debug, Clone, PartialEq, Default)]
struct EventRecord {
    tag: u8,
    timestamp: u64,
    source: u16,
}

impl NdrEncode for EventRecord {
    fn ndr_write<'a>(&'a self, w: &mut NdrWriter<'a>) -> Result<()> {
        w.write_align(Self::class())?;
        w.write_u8(self.tag)?;
        w.write_u64(self.timestamp)?;
        w.write_u16(self.source)?;
        w.write_trailing_gap(Self::class())
    }

    fn ndr_align() -> usize {
        Self::class()
    }
}

impl NdrDecode for EventRecord {
    fn ndr_read<'a>(&'a mut self, r: &mut NdrReader<'a>) -> Result<()> {
        r.read_align(Self::class())?;
        self.tag = r.read_u8()?;
        self.timestamp = r.read_u64()?;
        self.source = r.read_u16()?;
        r.read_trailing_gap(Self::class())
    }

    fn ndr_align() -> usize {
        Self::class()
    }

    fn ndr_wire_size() -> usize {
        24
    }
}

impl EventRecord {
    fn class() -> usize {
        NdrContext::alignment_class(&[1, 8, 2])
    }
}

#[test]
fn test_structure_alignment_class() {
    let ctx = NdrContext::new();
    let records = FixedArray::<EventRecord, 2>::new(vec![
        EventRecord {
            tag: 1,
            timestamp: 0x1111,
            source: 7,
        },
        EventRecord {
            tag: 2,
            timestamp: 0x2222,
            source: 8,
        },
    ]);

    let mut w = NdrWriter::new(ctx);
    w.write_u8(0xFF).unwrap();
    w.write_data(&records).unwrap();
    let bytes = w.finish().unwrap();

    // each record starts on a multiple of 8 and occupies 24 bytes
    assert_eq!(bytes.len(), 8 + 2 * 24);
    assert_eq!(bytes[8], 1);
    assert_eq!(bytes[32], 2);
    assert_eq!(&bytes[16..24], &0x1111u64.to_le_bytes());

    let mut lead = 0u8;
    let mut decoded = FixedArray::<EventRecord, 2>::default();
    {
        let mut r = NdrReader::new(bytes, ctx);
        r.read_data(&mut lead).unwrap();
        r.read_data(&mut decoded).unwrap();
        r.finish().unwrap();
    }
    assert_eq!(decoded, records);
}

#[test]
fn test_varying_array_and_string_scenarios() {
    let ctx = NdrContext::new();

    let array = ConformantVaryingArray::with_max(5, vec![0x01u8, 0x02, 0x03]);
    let bytes = to_bytes(&array, ctx).unwrap();
    assert_eq!(&bytes[12..], &[0x01, 0x02, 0x03, 0x00, 0x00]);
    assert_eq!(roundtrip(&array, ctx).elements, vec![0x01, 0x02, 0x03]);

    let text = NdrWString::with_max("Hi", 4);
    let bytes = to_bytes(&text, ctx).unwrap();
    let units: Vec<u16> = bytes[12..]
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    assert_eq!(units, vec![0x0048, 0x0069, 0x0000, 0x0000]);
    assert_eq!(roundtrip(&text, ctx).as_str(), "Hi");
}

#[test]
fn test_pointer_wrapped_strings_and_ref_pointers() {
    let ctx = NdrContext::new();

    let absent: UniquePtr<NdrString> = UniquePtr::null();
    assert_eq!(&to_bytes(&absent, ctx).unwrap()[..], &[0, 0, 0, 0]);

    let present = UniquePtr::new(NdrString::new("MSMQ"));
    assert_eq!(roundtrip(&present, ctx), present);

    let inline = RefPtr::new(NdrWString::new("inline"));
    let bytes = to_bytes(&inline, ctx).unwrap();
    assert_eq!(read_u32_at(&bytes, 0), 7); // no referent before the header
    assert_eq!(roundtrip(&inline, ctx), inline);
}
