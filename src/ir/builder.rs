//! Instruction builder.
//!
//! Emits instructions at a fixed insertion point, keeping program order:
//! every instruction built before `anchor` lands after the previous one.
//! The anchor is resolved once, when the builder is created.

use super::{
    AddressSpace, BinOp, BlockId, CastOp, CmpPred, Function, Inst, InstId, InstKind, Intrinsic,
    Type, Value,
};

/// Where new instructions go.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertPoint {
    /// At index `pos` of `block`; advances past each inserted instruction.
    At { block: BlockId, pos: usize },
    /// At the end of the given block.
    End(BlockId),
}

pub struct Builder<'f> {
    func: &'f mut Function,
    point: InsertPoint,
}

impl<'f> Builder<'f> {
    fn new(func: &'f mut Function, point: InsertPoint) -> Self {
        Self { func, point }
    }

    /// Build immediately before `anchor`. `None` if `anchor` is not a live
    /// instruction of `func`.
    pub fn before(func: &'f mut Function, anchor: InstId) -> Option<Self> {
        let (block, pos) = func.position(anchor)?;
        Some(Self::new(func, InsertPoint::At { block, pos }))
    }

    pub fn at_end(func: &'f mut Function, block: BlockId) -> Self {
        Self::new(func, InsertPoint::End(block))
    }

    pub fn func(&self) -> &Function {
        self.func
    }

    pub fn type_of(&self, value: &Value) -> Type {
        self.func.value_type(value)
    }

    /// Insert a raw instruction and return its result.
    pub fn insert(&mut self, inst: Inst) -> Value {
        let id = match &mut self.point {
            InsertPoint::At { block, pos } => {
                let id = self.func.insert_at(*block, *pos, inst);
                *pos += 1;
                id
            }
            InsertPoint::End(block) => self.func.append(*block, inst),
        };
        Value::Inst(id)
    }

    fn emit(&mut self, kind: InstKind, ty: Type, name: &str) -> Value {
        self.insert(Inst::new(kind, ty).named(name))
    }

    pub fn call(&mut self, callee: &str, args: Vec<Value>, ty: Type, name: &str) -> Value {
        self.emit(
            InstKind::Call {
                callee: callee.to_string(),
                args,
            },
            ty,
            name,
        )
    }

    pub fn intrinsic(&mut self, intrinsic: Intrinsic, ty: Type, name: &str) -> Value {
        self.emit(InstKind::Intrinsic { intrinsic }, ty, name)
    }

    pub fn binary(&mut self, op: BinOp, lhs: Value, rhs: Value, name: &str) -> Value {
        let ty = self.type_of(&lhs);
        self.emit(InstKind::Binary { op, lhs, rhs }, ty, name)
    }

    pub fn add(&mut self, lhs: Value, rhs: Value, name: &str) -> Value {
        self.binary(BinOp::Add, lhs, rhs, name)
    }

    pub fn mul(&mut self, lhs: Value, rhs: Value, name: &str) -> Value {
        self.binary(BinOp::Mul, lhs, rhs, name)
    }

    pub fn lshr(&mut self, lhs: Value, rhs: Value, name: &str) -> Value {
        self.binary(BinOp::LShr, lhs, rhs, name)
    }

    pub fn icmp(&mut self, pred: CmpPred, lhs: Value, rhs: Value, name: &str) -> Value {
        self.emit(InstKind::ICmp { pred, lhs, rhs }, Type::I1, name)
    }

    pub fn select(&mut self, cond: Value, on_true: Value, on_false: Value, name: &str) -> Value {
        let ty = self.type_of(&on_true);
        self.emit(
            InstKind::Select {
                cond,
                on_true,
                on_false,
            },
            ty,
            name,
        )
    }

    pub fn cast(&mut self, op: CastOp, value: Value, ty: Type, name: &str) -> Value {
        self.emit(InstKind::Cast { op, value }, ty, name)
    }

    /// Zero-extend to `ty`; a value already of type `ty` passes through.
    pub fn zext(&mut self, value: Value, ty: Type, name: &str) -> Value {
        if self.type_of(&value) == ty {
            return value;
        }
        self.cast(CastOp::ZExt, value, ty, name)
    }

    /// Truncate to `ty`; a value already of type `ty` passes through.
    pub fn trunc(&mut self, value: Value, ty: Type, name: &str) -> Value {
        if self.type_of(&value) == ty {
            return value;
        }
        self.cast(CastOp::Trunc, value, ty, name)
    }

    /// Reinterpret the bits of `value` as `ty`; no-op casts are elided.
    pub fn bitcast(&mut self, value: Value, ty: Type, name: &str) -> Value {
        if self.type_of(&value) == ty {
            return value;
        }
        self.cast(CastOp::Bitcast, value, ty, name)
    }

    pub fn int_to_ptr(&mut self, value: Value, space: AddressSpace, name: &str) -> Value {
        self.cast(CastOp::IntToPtr, value, Type::ptr(space), name)
    }

    pub fn extract_element(&mut self, vector: Value, index: Value, name: &str) -> Value {
        let ty = self.type_of(&vector).elem().unwrap_or(Type::Void);
        self.emit(InstKind::ExtractElement { vector, index }, ty, name)
    }

    pub fn insert_element(&mut self, vector: Value, elem: Value, index: Value, name: &str) -> Value {
        let ty = self.type_of(&vector);
        self.emit(
            InstKind::InsertElement {
                vector,
                elem,
                index,
            },
            ty,
            name,
        )
    }

    pub fn load(&mut self, ptr: Value, ty: Type, align: u32, name: &str) -> Value {
        self.emit(InstKind::Load { ptr, align }, ty, name)
    }

    pub fn ret(&mut self, value: Option<Value>) {
        self.emit(InstKind::Ret { value }, Type::Void, "");
    }

    pub fn br(&mut self, target: BlockId) {
        self.emit(InstKind::Br { target }, Type::Void, "");
    }

    pub fn cond_br(&mut self, cond: Value, then_block: BlockId, else_block: BlockId) {
        self.emit(
            InstKind::CondBr {
                cond,
                then_block,
                else_block,
            },
            Type::Void,
            "",
        );
    }
}
