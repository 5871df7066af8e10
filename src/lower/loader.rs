//! Side-buffer field loader.
//!
//! Turns `(byte offset, type)` into a value read from the `a32` side
//! buffer using only loads aligned to the type's element width.
//!
//! ```text
//!   aligned:     load T, align E        at O
//!   misaligned:  load <2S/E x iE>       at A = O - O % E
//!                bitcast to <2S x i8>
//!                copy bytes [O-A, O-A+S) into <S x i8>
//!                bitcast to T
//! ```

use crate::config::PlatformConfig;
use crate::ir::{AddressSpace, Builder, Type, Value};

#[derive(Clone, Copy, Debug)]
pub struct FieldLoader {
    pointer_bits: u32,
}

impl FieldLoader {
    pub fn new(platform: &PlatformConfig) -> Self {
        Self {
            pointer_bits: platform.a32_pointer_bits,
        }
    }

    /// Side-buffer pointer to byte `offset`.
    pub fn address(&self, b: &mut Builder<'_>, offset: u32, name: &str) -> Value {
        b.int_to_ptr(
            Value::int(self.pointer_bits, offset as u64),
            AddressSpace::A32,
            name,
        )
    }

    /// Emit a read of the `ty` stored at byte `offset` of the side buffer.
    /// `ty` is an integer or an integer vector.
    pub fn load(&self, b: &mut Builder<'_>, offset: u32, ty: Type, name: &str) -> Value {
        let elem_bytes = ty.elem().map(|e| e.byte_size()).unwrap_or(1).max(1);
        let size = ty.byte_size();
        let aligned = offset / elem_bytes * elem_bytes;

        if aligned == offset {
            let ptr = self.address(b, offset, "");
            return b.load(ptr, ty, elem_bytes, name);
        }

        let shift = offset - aligned;
        let wide = Type::vector(elem_bytes * 8, 2 * size / elem_bytes);
        let ptr = self.address(b, aligned, "");
        let raw = b.load(ptr, wide, elem_bytes, "");
        let raw_bytes = b.bitcast(raw, Type::vector(8, 2 * size), "");

        let mut bytes = Value::undef(Type::vector(8, size));
        for k in 0..size {
            let byte = b.extract_element(raw_bytes.clone(), Value::i32(shift + k), "");
            bytes = b.insert_element(bytes, byte, Value::i32(k), "");
        }
        b.bitcast(bytes, ty, name)
    }
}
