//! Dispatch metadata side buffer: the binary ABI shared with the runtime.
//!
//! In the indirect (stack-call) convention a kernel finds its dispatch
//! parameters in a runtime-owned buffer instead of hidden arguments.
//! Layout (little-endian, every field at its natural alignment):
//!
//! ```text
//!  0  struct_size        u8      40  printf_buffer_ptr   u64
//!  1  version            u8      48  global_offset_x/y/z u64 ×3
//!  2  num_work_dim       u8      72  local_id_table_ptr  u64
//!  3  simd_width         u8      80  group_count_x/y/z   u32 ×3
//!  4  local_size_x/y/z   u32 ×3  92  (end)
//! 16  global_size_x/y/z  u64 ×3
//! ```
//!
//! Offsets are derived from the field widths, never written by hand.

pub mod local_ids;
#[cfg(test)]
mod tests;

use bytemuck::{Pod, Zeroable};

pub use local_ids::LocalIdTable;

/// Layout version this crate reads.
pub const IMPLICIT_ARGS_VERSION: u8 = 0;

/// One field of the side buffer, in layout order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DispatchField {
    StructSize,
    Version,
    NumWorkDim,
    SimdWidth,
    LocalSizeX,
    LocalSizeY,
    LocalSizeZ,
    GlobalSizeX,
    GlobalSizeY,
    GlobalSizeZ,
    PrintfBuffer,
    GlobalOffsetX,
    GlobalOffsetY,
    GlobalOffsetZ,
    LocalIdTable,
    GroupCountX,
    GroupCountY,
    GroupCountZ,
}

impl DispatchField {
    pub const ALL: [DispatchField; 18] = [
        DispatchField::StructSize,
        DispatchField::Version,
        DispatchField::NumWorkDim,
        DispatchField::SimdWidth,
        DispatchField::LocalSizeX,
        DispatchField::LocalSizeY,
        DispatchField::LocalSizeZ,
        DispatchField::GlobalSizeX,
        DispatchField::GlobalSizeY,
        DispatchField::GlobalSizeZ,
        DispatchField::PrintfBuffer,
        DispatchField::GlobalOffsetX,
        DispatchField::GlobalOffsetY,
        DispatchField::GlobalOffsetZ,
        DispatchField::LocalIdTable,
        DispatchField::GroupCountX,
        DispatchField::GroupCountY,
        DispatchField::GroupCountZ,
    ];

    /// Field width in bytes.
    pub const fn width(self) -> u32 {
        match self {
            DispatchField::StructSize
            | DispatchField::Version
            | DispatchField::NumWorkDim
            | DispatchField::SimdWidth => 1,
            DispatchField::LocalSizeX
            | DispatchField::LocalSizeY
            | DispatchField::LocalSizeZ
            | DispatchField::GroupCountX
            | DispatchField::GroupCountY
            | DispatchField::GroupCountZ => 4,
            DispatchField::GlobalSizeX
            | DispatchField::GlobalSizeY
            | DispatchField::GlobalSizeZ
            | DispatchField::PrintfBuffer
            | DispatchField::GlobalOffsetX
            | DispatchField::GlobalOffsetY
            | DispatchField::GlobalOffsetZ
            | DispatchField::LocalIdTable => 8,
        }
    }

    /// Byte offset: the sum of the widths of every preceding field.
    pub const fn offset(self) -> u32 {
        let mut offset = 0;
        let mut i = 0;
        while i < Self::ALL.len() {
            if Self::ALL[i] as u8 == self as u8 {
                return offset;
            }
            offset += Self::ALL[i].width();
            i += 1;
        }
        panic!("field missing from DispatchField::ALL")
    }

    pub const fn name(self) -> &'static str {
        match self {
            DispatchField::StructSize => "struct_size",
            DispatchField::Version => "version",
            DispatchField::NumWorkDim => "num_work_dim",
            DispatchField::SimdWidth => "simd_width",
            DispatchField::LocalSizeX => "local_size_x",
            DispatchField::LocalSizeY => "local_size_y",
            DispatchField::LocalSizeZ => "local_size_z",
            DispatchField::GlobalSizeX => "global_size_x",
            DispatchField::GlobalSizeY => "global_size_y",
            DispatchField::GlobalSizeZ => "global_size_z",
            DispatchField::PrintfBuffer => "printf_buffer_ptr",
            DispatchField::GlobalOffsetX => "global_offset_x",
            DispatchField::GlobalOffsetY => "global_offset_y",
            DispatchField::GlobalOffsetZ => "global_offset_z",
            DispatchField::LocalIdTable => "local_id_table_ptr",
            DispatchField::GroupCountX => "group_count_x",
            DispatchField::GroupCountY => "group_count_y",
            DispatchField::GroupCountZ => "group_count_z",
        }
    }
}

/// Offsets the lowering reads, folded at compile time.
pub mod offsets {
    use super::DispatchField;

    pub const STRUCT_SIZE: u32 = DispatchField::StructSize.offset();
    pub const VERSION: u32 = DispatchField::Version.offset();
    pub const NUM_WORK_DIM: u32 = DispatchField::NumWorkDim.offset();
    pub const SIMD_WIDTH: u32 = DispatchField::SimdWidth.offset();
    pub const LOCAL_SIZE_X: u32 = DispatchField::LocalSizeX.offset();
    pub const GLOBAL_SIZE_X: u32 = DispatchField::GlobalSizeX.offset();
    pub const PRINTF_BUFFER: u32 = DispatchField::PrintfBuffer.offset();
    pub const GLOBAL_OFFSET_X: u32 = DispatchField::GlobalOffsetX.offset();
    pub const LOCAL_ID_TABLE: u32 = DispatchField::LocalIdTable.offset();
    pub const GROUP_COUNT_X: u32 = DispatchField::GroupCountX.offset();
}

/// Total side-buffer size in bytes.
pub const DISPATCH_BUFFER_SIZE: u32 = {
    let last = DispatchField::ALL[DispatchField::ALL.len() - 1];
    last.offset() + last.width()
};

/// The side buffer as the runtime writes it.
///
/// Packed so the struct has no tail padding and `bytemuck` can view it as
/// raw bytes; the field offsets coincide with `DispatchField::offset`.
#[repr(C, packed)]
#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
pub struct ImplicitArgsBuffer {
    pub struct_size: u8,
    pub version: u8,
    pub num_work_dim: u8,
    pub simd_width: u8,
    pub local_size: [u32; 3],
    pub global_size: [u64; 3],
    pub printf_buffer_ptr: u64,
    pub global_offset: [u64; 3],
    pub local_id_table_ptr: u64,
    pub group_count: [u32; 3],
}

impl ImplicitArgsBuffer {
    /// A zeroed buffer with the header filled in.
    pub fn new() -> Self {
        Self {
            struct_size: DISPATCH_BUFFER_SIZE as u8,
            version: IMPLICIT_ARGS_VERSION,
            ..Self::default()
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.as_bytes().to_vec()
    }

    /// Parse a buffer the runtime produced. `None` if it is too short.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let bytes = bytes.get(..DISPATCH_BUFFER_SIZE as usize)?;
        Some(bytemuck::pod_read_unaligned(bytes))
    }
}
