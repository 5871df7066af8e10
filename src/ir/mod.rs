//! Kernel IR: a small SSA form for GPU kernel functions.
//!
//! Functions own their instructions in an arena (`InstId` handles) and
//! order them through basic blocks. Erased instructions leave a tombstone
//! behind so stale handles resolve to `None` instead of a different
//! instruction.
//!
//! ```text
//! Module ─┬─ Function ─┬─ params   (formal parameters, hidden ones trailing)
//!         │            ├─ blocks   (ordered InstId lists)
//!         │            └─ insts    (arena, Option<Inst> per slot)
//!         └─ metadata  (per-function bookkeeping from earlier phases)
//! ```

pub mod builder;
pub mod eval;
mod print;
#[cfg(test)]
mod tests;

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::metadata::MetadataTable;

pub use builder::Builder;
pub use print::Listing;

// ─── Types ────────────────────────────────────────────────────────

/// Address space of a pointer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressSpace {
    Private,
    Global,
    /// 32-bit stateless space the dispatch side buffer lives in.
    A32,
}

impl AddressSpace {
    pub fn pointer_bytes(self) -> u32 {
        match self {
            AddressSpace::A32 => 4,
            AddressSpace::Private | AddressSpace::Global => 8,
        }
    }
}

impl fmt::Display for AddressSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressSpace::Private => write!(f, "private"),
            AddressSpace::Global => write!(f, "global"),
            AddressSpace::A32 => write!(f, "a32"),
        }
    }
}

/// IR value type. Vectors hold integers only.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Type {
    Void,
    Int { bits: u32 },
    Vector { elem_bits: u32, len: u32 },
    Ptr { space: AddressSpace },
}

impl Type {
    pub const I1: Type = Type::Int { bits: 1 };
    pub const I8: Type = Type::Int { bits: 8 };
    pub const I16: Type = Type::Int { bits: 16 };
    pub const I32: Type = Type::Int { bits: 32 };
    pub const I64: Type = Type::Int { bits: 64 };

    pub fn int(bits: u32) -> Self {
        Type::Int { bits }
    }

    pub fn vector(elem_bits: u32, len: u32) -> Self {
        Type::Vector { elem_bits, len }
    }

    pub fn ptr(space: AddressSpace) -> Self {
        Type::Ptr { space }
    }

    pub fn is_int(&self) -> bool {
        matches!(self, Type::Int { .. })
    }

    /// Bit width of an integer or of a vector's element.
    /// `None` for pointers and `void`.
    pub fn scalar_bits(&self) -> Option<u32> {
        match *self {
            Type::Int { bits } => Some(bits),
            Type::Vector { elem_bits, .. } => Some(elem_bits),
            Type::Void | Type::Ptr { .. } => None,
        }
    }

    /// Element type of a vector; integers are their own element.
    pub fn elem(&self) -> Option<Type> {
        match *self {
            Type::Vector { elem_bits, .. } => Some(Type::int(elem_bits)),
            Type::Int { .. } => Some(*self),
            Type::Void | Type::Ptr { .. } => None,
        }
    }

    pub fn lanes(&self) -> u32 {
        match *self {
            Type::Vector { len, .. } => len,
            _ => 1,
        }
    }

    /// Storage size in bytes. Sub-byte integers occupy one byte.
    pub fn byte_size(&self) -> u32 {
        match *self {
            Type::Void => 0,
            Type::Int { bits } => bits.div_ceil(8),
            Type::Vector { elem_bits, len } => elem_bits.div_ceil(8) * len,
            Type::Ptr { space } => space.pointer_bytes(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => write!(f, "void"),
            Type::Int { bits } => write!(f, "i{}", bits),
            Type::Vector { elem_bits, len } => write!(f, "<{} x i{}>", len, elem_bits),
            Type::Ptr { space } => write!(f, "ptr({})", space),
        }
    }
}

/// Mask selecting the low `bits` bits of a `u64`.
pub fn width_mask(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

// ─── Values ───────────────────────────────────────────────────────

/// Handle to an instruction in a function's arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstId(pub u32);

impl fmt::Display for InstId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Index of a basic block within its function.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(pub u32);

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Constant {
    Int { bits: u32, value: u64 },
    Vector { elem_bits: u32, elems: Vec<u64> },
    Undef { ty: Type },
}

impl Constant {
    pub fn ty(&self) -> Type {
        match self {
            Constant::Int { bits, .. } => Type::int(*bits),
            Constant::Vector { elem_bits, elems } => Type::vector(*elem_bits, elems.len() as u32),
            Constant::Undef { ty } => *ty,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Int { bits, value } => write!(f, "i{} {}", bits, value),
            Constant::Vector { elems, .. } => {
                let elems: Vec<String> = elems.iter().map(|e| e.to_string()).collect();
                write!(f, "{} [{}]", self.ty(), elems.join(", "))
            }
            Constant::Undef { ty } => write!(f, "{} undef", ty),
        }
    }
}

/// An SSA operand.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    Param(u32),
    Inst(InstId),
    Const(Constant),
}

impl Value {
    pub fn int(bits: u32, value: u64) -> Self {
        Value::Const(Constant::Int {
            bits,
            value: value & width_mask(bits),
        })
    }

    pub fn i32(value: u32) -> Self {
        Value::int(32, value as u64)
    }

    pub fn vector(elem_bits: u32, elems: &[u64]) -> Self {
        Value::Const(Constant::Vector {
            elem_bits,
            elems: elems.iter().map(|e| e & width_mask(elem_bits)).collect(),
        })
    }

    pub fn undef(ty: Type) -> Self {
        Value::Const(Constant::Undef { ty })
    }

    pub fn as_inst(&self) -> Option<InstId> {
        match self {
            Value::Inst(id) => Some(*id),
            _ => None,
        }
    }
}

// ─── Instructions ─────────────────────────────────────────────────

/// Platform primitives the hardware answers without memory access.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intrinsic {
    /// The thread-state register as a vector of 32-bit lanes.
    GetR0,
    /// SIMD width the kernel was compiled for.
    SimdSize,
    /// Lane index of the executing work-item within its hardware thread.
    SimdLaneId,
}

impl fmt::Display for Intrinsic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intrinsic::GetR0 => write!(f, "get_r0"),
            Intrinsic::SimdSize => write!(f, "simd_size"),
            Intrinsic::SimdLaneId => write!(f, "simd_lane_id"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BinOp {
    Add,
    Mul,
    LShr,
    And,
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BinOp::Add => write!(f, "add"),
            BinOp::Mul => write!(f, "mul"),
            BinOp::LShr => write!(f, "lshr"),
            BinOp::And => write!(f, "and"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpPred {
    Eq,
    Sgt,
}

impl fmt::Display for CmpPred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CmpPred::Eq => write!(f, "eq"),
            CmpPred::Sgt => write!(f, "sgt"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CastOp {
    ZExt,
    Trunc,
    Bitcast,
    IntToPtr,
}

impl fmt::Display for CastOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CastOp::ZExt => write!(f, "zext"),
            CastOp::Trunc => write!(f, "trunc"),
            CastOp::Bitcast => write!(f, "bitcast"),
            CastOp::IntToPtr => write!(f, "inttoptr"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "opcode", rename_all = "snake_case")]
pub enum InstKind {
    Call {
        callee: String,
        args: Vec<Value>,
    },
    Intrinsic {
        intrinsic: Intrinsic,
    },
    Binary {
        op: BinOp,
        lhs: Value,
        rhs: Value,
    },
    ICmp {
        pred: CmpPred,
        lhs: Value,
        rhs: Value,
    },
    Select {
        cond: Value,
        on_true: Value,
        on_false: Value,
    },
    Cast {
        op: CastOp,
        value: Value,
    },
    ExtractElement {
        vector: Value,
        index: Value,
    },
    InsertElement {
        vector: Value,
        elem: Value,
        index: Value,
    },
    Load {
        ptr: Value,
        align: u32,
    },
    Br {
        target: BlockId,
    },
    CondBr {
        cond: Value,
        then_block: BlockId,
        else_block: BlockId,
    },
    Ret {
        value: Option<Value>,
    },
}

impl InstKind {
    pub fn operands(&self) -> Vec<&Value> {
        match self {
            InstKind::Call { args, .. } => args.iter().collect(),
            InstKind::Intrinsic { .. } | InstKind::Br { .. } => Vec::new(),
            InstKind::Binary { lhs, rhs, .. } | InstKind::ICmp { lhs, rhs, .. } => vec![lhs, rhs],
            InstKind::Select {
                cond,
                on_true,
                on_false,
            } => vec![cond, on_true, on_false],
            InstKind::Cast { value, .. } => vec![value],
            InstKind::ExtractElement { vector, index } => vec![vector, index],
            InstKind::InsertElement {
                vector,
                elem,
                index,
            } => vec![vector, elem, index],
            InstKind::Load { ptr, .. } => vec![ptr],
            InstKind::CondBr { cond, .. } => vec![cond],
            InstKind::Ret { value } => value.iter().collect(),
        }
    }

    pub fn operands_mut(&mut self) -> Vec<&mut Value> {
        match self {
            InstKind::Call { args, .. } => args.iter_mut().collect(),
            InstKind::Intrinsic { .. } | InstKind::Br { .. } => Vec::new(),
            InstKind::Binary { lhs, rhs, .. } | InstKind::ICmp { lhs, rhs, .. } => vec![lhs, rhs],
            InstKind::Select {
                cond,
                on_true,
                on_false,
            } => vec![cond, on_true, on_false],
            InstKind::Cast { value, .. } => vec![value],
            InstKind::ExtractElement { vector, index } => vec![vector, index],
            InstKind::InsertElement {
                vector,
                elem,
                index,
            } => vec![vector, elem, index],
            InstKind::Load { ptr, .. } => vec![ptr],
            InstKind::CondBr { cond, .. } => vec![cond],
            InstKind::Ret { value } => value.iter_mut().collect(),
        }
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            InstKind::Br { .. } | InstKind::CondBr { .. } | InstKind::Ret { .. }
        )
    }
}

/// One instruction: what it computes, its result type, and an optional
/// display name.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Inst {
    pub kind: InstKind,
    pub ty: Type,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
}

impl Inst {
    pub fn new(kind: InstKind, ty: Type) -> Self {
        Self {
            kind,
            ty,
            name: String::new(),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn callee(&self) -> Option<&str> {
        match &self.kind {
            InstKind::Call { callee, .. } => Some(callee),
            _ => None,
        }
    }
}

// ─── Functions ────────────────────────────────────────────────────

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    pub ty: Type,
}

impl Param {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub name: String,
    pub insts: Vec<InstId>,
}

/// A kernel or helper function. Exclusively owns its instruction graph.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Function {
    pub name: String,
    pub params: Vec<Param>,
    pub ret: Type,
    #[serde(default)]
    pub attributes: BTreeSet<String>,
    pub blocks: Vec<Block>,
    insts: Vec<Option<Inst>>,
}

impl Function {
    /// Create a function with an empty `entry` block.
    pub fn new(name: impl Into<String>, params: Vec<Param>, ret: Type) -> Self {
        Self {
            name: name.into(),
            params,
            ret,
            attributes: BTreeSet::new(),
            blocks: vec![Block {
                name: "entry".to_string(),
                insts: Vec::new(),
            }],
            insts: Vec::new(),
        }
    }

    pub fn with_attribute(mut self, attr: impl Into<String>) -> Self {
        self.attributes.insert(attr.into());
        self
    }

    pub fn has_attribute(&self, attr: &str) -> bool {
        self.attributes.contains(attr)
    }

    pub fn entry(&self) -> BlockId {
        BlockId(0)
    }

    pub fn add_block(&mut self, name: impl Into<String>) -> BlockId {
        self.blocks.push(Block {
            name: name.into(),
            insts: Vec::new(),
        });
        BlockId(self.blocks.len() as u32 - 1)
    }

    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.0 as usize)
    }

    pub fn add_param(&mut self, param: Param) -> Value {
        self.params.push(param);
        Value::Param(self.params.len() as u32 - 1)
    }

    /// The live instruction behind `id`, or `None` once erased.
    pub fn inst(&self, id: InstId) -> Option<&Inst> {
        self.insts.get(id.0 as usize).and_then(|slot| slot.as_ref())
    }

    pub fn inst_mut(&mut self, id: InstId) -> Option<&mut Inst> {
        self.insts.get_mut(id.0 as usize).and_then(|slot| slot.as_mut())
    }

    /// Arena capacity, including tombstones.
    pub fn arena_len(&self) -> usize {
        self.insts.len()
    }

    /// Number of live instructions.
    pub fn inst_count(&self) -> usize {
        self.blocks.iter().map(|b| b.insts.len()).sum()
    }

    /// Live instructions in program order.
    pub fn instructions(&self) -> impl Iterator<Item = (InstId, &Inst)> + '_ {
        self.blocks
            .iter()
            .flat_map(|b| b.insts.iter())
            .filter_map(move |id| self.inst(*id).map(|inst| (*id, inst)))
    }

    /// Snapshot of every call site, in program order.
    pub fn call_sites(&self) -> Vec<InstId> {
        self.instructions()
            .filter(|(_, inst)| matches!(inst.kind, InstKind::Call { .. }))
            .map(|(id, _)| id)
            .collect()
    }

    /// Block and position of a live instruction.
    pub fn position(&self, id: InstId) -> Option<(BlockId, usize)> {
        self.blocks.iter().enumerate().find_map(|(b, block)| {
            block
                .insts
                .iter()
                .position(|i| *i == id)
                .map(|pos| (BlockId(b as u32), pos))
        })
    }

    pub fn value_type(&self, value: &Value) -> Type {
        match value {
            Value::Param(i) => self
                .params
                .get(*i as usize)
                .map(|p| p.ty)
                .unwrap_or(Type::Void),
            Value::Inst(id) => self.inst(*id).map(|i| i.ty).unwrap_or(Type::Void),
            Value::Const(c) => c.ty(),
        }
    }

    fn alloc(&mut self, inst: Inst) -> InstId {
        self.insts.push(Some(inst));
        InstId(self.insts.len() as u32 - 1)
    }

    /// Append an instruction at the end of `block`.
    pub fn append(&mut self, block: BlockId, inst: Inst) -> InstId {
        let id = self.alloc(inst);
        self.blocks[block.0 as usize].insts.push(id);
        id
    }

    /// Insert an instruction at `pos` within `block`.
    pub fn insert_at(&mut self, block: BlockId, pos: usize, inst: Inst) -> InstId {
        let id = self.alloc(inst);
        self.blocks[block.0 as usize].insts.insert(pos, id);
        id
    }

    /// Insert an instruction immediately before `anchor`.
    /// Returns `None` if `anchor` is not a live instruction.
    pub fn insert_before(&mut self, anchor: InstId, inst: Inst) -> Option<InstId> {
        let (block, pos) = self.position(anchor)?;
        Some(self.insert_at(block, pos, inst))
    }

    /// Count operand slots that reference `value`.
    pub fn count_uses(&self, value: &Value) -> usize {
        self.instructions()
            .map(|(_, inst)| inst.kind.operands().into_iter().filter(|v| *v == value).count())
            .sum()
    }

    /// Point every use of `old` at `new`. Returns the number of operand
    /// slots rewritten.
    pub fn replace_all_uses(&mut self, old: &Value, new: &Value) -> usize {
        let mut replaced = 0;
        let live: Vec<InstId> = self.blocks.iter().flat_map(|b| b.insts.clone()).collect();
        for id in live {
            if let Some(inst) = self.inst_mut(id) {
                for operand in inst.kind.operands_mut() {
                    if operand == old {
                        *operand = new.clone();
                        replaced += 1;
                    }
                }
            }
        }
        replaced
    }

    /// Remove an instruction from its block and tombstone its slot.
    /// The instruction must have no remaining uses.
    pub fn erase(&mut self, id: InstId) -> Option<Inst> {
        debug_assert_eq!(
            self.count_uses(&Value::Inst(id)),
            0,
            "erasing %{} in @{} while it still has uses",
            id,
            self.name
        );
        let (block, pos) = self.position(id)?;
        self.blocks[block.0 as usize].insts.remove(pos);
        self.insts.get_mut(id.0 as usize).and_then(|slot| slot.take())
    }

    /// Replace every use of `id` with `value`, then erase `id`.
    ///
    /// The two steps happen together so a rewrite can never leave an
    /// operand pointing at an erased instruction.
    pub fn replace_and_erase(&mut self, id: InstId, value: &Value) -> usize {
        let replaced = self.replace_all_uses(&Value::Inst(id), value);
        self.erase(id);
        replaced
    }

    /// Textual listing with per-instruction byte spans.
    pub fn listing(&self) -> Listing {
        print::listing(self)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.listing().text)
    }
}

// ─── Modules ──────────────────────────────────────────────────────

/// A compilation unit: functions plus the bookkeeping earlier phases
/// attached to them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub functions: Vec<Function>,
    #[serde(default)]
    pub metadata: MetadataTable,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
            metadata: MetadataTable::default(),
        }
    }

    pub fn function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| f.name == name)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, func) in self.functions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", func)?;
        }
        Ok(())
    }
}
