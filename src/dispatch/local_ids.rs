//! Per-thread local-id table.
//!
//! Each hardware thread owns one record of three `u16` arrays (x, y, z),
//! each `rounded_simd_width` lanes long. Lanes past the compiled SIMD width
//! are zero padding.
//!
//! ```text
//! thread t:  [x0 .. x(w-1)] [y0 .. y(w-1)] [z0 .. z(w-1)]    w = max(simd, 16)
//! ```

/// Minimum lane count of one array in the table.
pub const MIN_TABLE_LANES: u32 = 16;

/// Bytes per local-id entry.
pub const ENTRY_BYTES: u32 = 2;

/// Lane count of one table array for a given compiled SIMD width.
pub fn rounded_simd_width(simd_width: u32) -> u32 {
    simd_width.max(MIN_TABLE_LANES)
}

/// Bytes between consecutive thread records.
pub fn thread_stride(simd_width: u32) -> u32 {
    rounded_simd_width(simd_width) * 3 * ENTRY_BYTES
}

/// Offset of dimension `dim`'s array inside a thread record, in units of
/// the rounded SIMD width (0, 2 or 4).
pub fn dim_factor(dim: u32) -> u32 {
    dim * ENTRY_BYTES
}

/// Byte offset of one entry relative to the table base.
pub fn entry_offset(simd_width: u32, thread: u32, lane: u32, dim: u32) -> u64 {
    let rounded = rounded_simd_width(simd_width) as u64;
    thread as u64 * thread_stride(simd_width) as u64
        + dim_factor(dim) as u64 * rounded
        + lane as u64 * ENTRY_BYTES as u64
}

/// An encoded local-id table, as the runtime places it in global memory.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LocalIdTable {
    simd_width: u32,
    bytes: Vec<u8>,
}

impl LocalIdTable {
    /// Encode the local ids of a work-group. Work-item `i` runs on thread
    /// `i / simd_width`, lane `i % simd_width`.
    pub fn encode(simd_width: u32, ids: &[[u16; 3]]) -> Self {
        let simd = simd_width.max(1) as usize;
        let threads = ids.len().div_ceil(simd);
        let mut bytes = vec![0u8; threads * thread_stride(simd_width) as usize];
        for (item, id) in ids.iter().enumerate() {
            let thread = (item / simd) as u32;
            let lane = (item % simd) as u32;
            for (dim, value) in id.iter().enumerate() {
                let at = entry_offset(simd_width, thread, lane, dim as u32) as usize;
                bytes[at..at + 2].copy_from_slice(&value.to_le_bytes());
            }
        }
        Self { simd_width, bytes }
    }

    /// Ids of a row-major `dims` work-group, x fastest.
    pub fn for_group(simd_width: u32, dims: [u16; 3]) -> Self {
        let mut ids = Vec::new();
        for z in 0..dims[2] {
            for y in 0..dims[1] {
                for x in 0..dims[0] {
                    ids.push([x, y, z]);
                }
            }
        }
        Self::encode(simd_width, &ids)
    }

    pub fn simd_width(&self) -> u32 {
        self.simd_width
    }

    pub fn threads(&self) -> u32 {
        (self.bytes.len() / thread_stride(self.simd_width) as usize) as u32
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn lookup(&self, thread: u32, lane: u32, dim: u32) -> Option<u16> {
        if dim > 2 || lane >= rounded_simd_width(self.simd_width) {
            return None;
        }
        let at = entry_offset(self.simd_width, thread, lane, dim) as usize;
        let raw = self.bytes.get(at..at + 2)?;
        Some(u16::from_le_bytes([raw[0], raw[1]]))
    }
}
