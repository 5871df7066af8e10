use super::local_ids::{entry_offset, rounded_simd_width, thread_stride};
use super::*;
use std::mem::offset_of;

#[test]
fn test_offsets_match_wire_layout() {
    assert_eq!(offsets::STRUCT_SIZE, 0);
    assert_eq!(offsets::VERSION, 1);
    assert_eq!(offsets::NUM_WORK_DIM, 2);
    assert_eq!(offsets::SIMD_WIDTH, 3);
    assert_eq!(offsets::LOCAL_SIZE_X, 4);
    assert_eq!(DispatchField::LocalSizeZ.offset(), 12);
    assert_eq!(offsets::GLOBAL_SIZE_X, 16);
    assert_eq!(DispatchField::GlobalSizeZ.offset(), 32);
    assert_eq!(offsets::PRINTF_BUFFER, 40);
    assert_eq!(offsets::GLOBAL_OFFSET_X, 48);
    assert_eq!(offsets::LOCAL_ID_TABLE, 72);
    assert_eq!(offsets::GROUP_COUNT_X, 80);
    assert_eq!(DispatchField::GroupCountZ.offset(), 88);
    assert_eq!(DISPATCH_BUFFER_SIZE, 92);
}

#[test]
fn test_offsets_are_cumulative_widths() {
    let mut expected = 0;
    for field in DispatchField::ALL {
        assert_eq!(field.offset(), expected, "{}", field.name());
        expected += field.width();
    }
}

#[test]
fn test_fields_are_naturally_aligned() {
    for field in DispatchField::ALL {
        assert_eq!(field.offset() % field.width(), 0, "{}", field.name());
    }
}

#[test]
fn test_struct_matches_field_table() {
    assert_eq!(std::mem::size_of::<ImplicitArgsBuffer>(), DISPATCH_BUFFER_SIZE as usize);
    let table = [
        (offset_of!(ImplicitArgsBuffer, struct_size), DispatchField::StructSize),
        (offset_of!(ImplicitArgsBuffer, version), DispatchField::Version),
        (offset_of!(ImplicitArgsBuffer, num_work_dim), DispatchField::NumWorkDim),
        (offset_of!(ImplicitArgsBuffer, simd_width), DispatchField::SimdWidth),
        (offset_of!(ImplicitArgsBuffer, local_size), DispatchField::LocalSizeX),
        (offset_of!(ImplicitArgsBuffer, global_size), DispatchField::GlobalSizeX),
        (offset_of!(ImplicitArgsBuffer, printf_buffer_ptr), DispatchField::PrintfBuffer),
        (offset_of!(ImplicitArgsBuffer, global_offset), DispatchField::GlobalOffsetX),
        (offset_of!(ImplicitArgsBuffer, local_id_table_ptr), DispatchField::LocalIdTable),
        (offset_of!(ImplicitArgsBuffer, group_count), DispatchField::GroupCountX),
    ];
    for (offset, field) in table {
        assert_eq!(offset as u32, field.offset(), "{}", field.name());
    }
}

#[test]
fn test_buffer_bytes_are_little_endian() {
    let mut buf = ImplicitArgsBuffer::new();
    buf.num_work_dim = 3;
    buf.local_size = [8, 4, 2];
    buf.global_size = [0x1_0000_0000, 2, 3];
    buf.group_count = [5, 6, 7];
    let bytes = buf.to_vec();
    assert_eq!(bytes.len(), 92);
    assert_eq!(bytes[0], 92);
    assert_eq!(bytes[2], 3);
    assert_eq!(&bytes[4..8], &8u32.to_le_bytes());
    assert_eq!(&bytes[16..24], &0x1_0000_0000u64.to_le_bytes());
    assert_eq!(&bytes[84..88], &6u32.to_le_bytes());

    let back = ImplicitArgsBuffer::from_bytes(&bytes).unwrap();
    let group_count = back.group_count;
    assert_eq!(group_count, [5, 6, 7]);
    assert!(ImplicitArgsBuffer::from_bytes(&bytes[..40]).is_none());
}

#[test]
fn test_local_id_strides() {
    assert_eq!(rounded_simd_width(8), 16);
    assert_eq!(rounded_simd_width(32), 32);
    assert_eq!(thread_stride(8), 96);
    assert_eq!(thread_stride(16), 96);
    assert_eq!(thread_stride(32), 192);
    // thread 1, lane 3, y: 96 + 2*16 + 6
    assert_eq!(entry_offset(16, 1, 3, 1), 134);
}

#[test]
fn test_local_id_table_encode_and_lookup() {
    let table = LocalIdTable::for_group(8, [4, 3, 1]);
    // 12 items over SIMD8 -> 2 threads
    assert_eq!(table.threads(), 2);
    assert_eq!(table.as_bytes().len(), 2 * 96);
    // item 9 = (1, 2, 0) runs on thread 1, lane 1
    assert_eq!(table.lookup(1, 1, 0), Some(1));
    assert_eq!(table.lookup(1, 1, 1), Some(2));
    assert_eq!(table.lookup(1, 1, 2), Some(0));
    // lanes 8..16 are padding
    assert_eq!(table.lookup(0, 12, 0), Some(0));
    assert_eq!(table.lookup(0, 16, 0), None);
    assert_eq!(table.lookup(2, 0, 0), None);
}

#[test]
fn test_local_id_table_keeps_full_u16() {
    let table = LocalIdTable::encode(16, &[[0x8001, 0, 0]]);
    assert_eq!(table.lookup(0, 0, 0), Some(0x8001));
    assert_eq!(&table.as_bytes()[..2], &[0x01, 0x80]);
}
