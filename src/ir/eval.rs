//! Reference interpreter for kernel IR.
//!
//! Executes one work-item of one function against a simulated dispatch:
//! the side buffer (`a32` space), sparse global memory regions, the
//! thread-state vector, and the SIMD size / lane of the executing item.
//! Loads must honor their declared alignment.

use std::collections::HashMap;

use thiserror::Error;

use super::{
    width_mask, AddressSpace, BinOp, CastOp, CmpPred, Constant, Function, InstId, InstKind,
    Intrinsic, Type, Value,
};

/// A runtime value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RtValue {
    Int { bits: u32, value: u64 },
    Vector { elem_bits: u32, elems: Vec<u64> },
    Ptr { space: AddressSpace, addr: u64 },
}

impl RtValue {
    pub fn int(bits: u32, value: u64) -> Self {
        RtValue::Int {
            bits,
            value: value & width_mask(bits),
        }
    }

    pub fn vector(elem_bits: u32, elems: &[u64]) -> Self {
        RtValue::Vector {
            elem_bits,
            elems: elems.iter().map(|e| e & width_mask(elem_bits)).collect(),
        }
    }

    /// The all-zero value of `ty`. Undef evaluates to this.
    pub fn zero(ty: Type) -> Self {
        match ty {
            Type::Int { bits } => RtValue::int(bits, 0),
            Type::Vector { elem_bits, len } => RtValue::Vector {
                elem_bits,
                elems: vec![0; len as usize],
            },
            Type::Ptr { space } => RtValue::Ptr { space, addr: 0 },
            Type::Void => RtValue::int(0, 0),
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            RtValue::Int { value, .. } => Some(*value),
            RtValue::Ptr { addr, .. } => Some(*addr),
            RtValue::Vector { .. } => None,
        }
    }

    /// Little-endian byte image of the value.
    pub fn to_le_bytes(&self) -> Vec<u8> {
        match self {
            RtValue::Int { bits, value } => {
                value.to_le_bytes()[..bits.div_ceil(8) as usize].to_vec()
            }
            RtValue::Vector { elem_bits, elems } => {
                let width = elem_bits.div_ceil(8) as usize;
                elems
                    .iter()
                    .flat_map(|e| e.to_le_bytes()[..width].to_vec())
                    .collect()
            }
            RtValue::Ptr { space, addr } => {
                addr.to_le_bytes()[..space.pointer_bytes() as usize].to_vec()
            }
        }
    }

    /// Decode a little-endian byte image as `ty`.
    pub fn from_le_bytes(ty: Type, bytes: &[u8]) -> Self {
        fn word(bytes: &[u8]) -> u64 {
            let mut buf = [0u8; 8];
            let n = bytes.len().min(8);
            buf[..n].copy_from_slice(&bytes[..n]);
            u64::from_le_bytes(buf)
        }
        match ty {
            Type::Int { bits } => RtValue::int(bits, word(bytes)),
            Type::Vector { elem_bits, len } => {
                let width = elem_bits.div_ceil(8) as usize;
                let elems: Vec<u64> = (0..len as usize)
                    .map(|i| {
                        let end = ((i + 1) * width).min(bytes.len());
                        word(bytes.get(i * width..end).unwrap_or(&[]))
                    })
                    .collect();
                RtValue::vector(elem_bits, &elems)
            }
            Type::Ptr { space } => RtValue::Ptr {
                space,
                addr: word(bytes),
            },
            Type::Void => RtValue::int(0, 0),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EvalError {
    #[error("missing argument {index} for @{function}")]
    MissingArgument { function: String, index: u32 },
    #[error("%{inst} is used before it is defined")]
    UndefinedValue { inst: InstId },
    #[error("%{inst}: operand has the wrong shape for `{opcode}`")]
    TypeMismatch { inst: InstId, opcode: &'static str },
    #[error("%{inst}: lane {index} out of range for a {lanes}-lane vector")]
    LaneOutOfRange { inst: InstId, index: u64, lanes: u32 },
    #[error("%{inst}: load of {size} bytes at {space}:{addr:#x} is not {align}-byte aligned")]
    MisalignedLoad {
        inst: InstId,
        space: AddressSpace,
        addr: u64,
        size: u32,
        align: u32,
    },
    #[error("%{inst}: load of {size} bytes at {space}:{addr:#x} is out of bounds")]
    OutOfBounds {
        inst: InstId,
        space: AddressSpace,
        addr: u64,
        size: u32,
    },
    #[error("%{inst}: no result registered for call to @{callee}")]
    UnresolvedCall { inst: InstId, callee: String },
    #[error("block {block} does not exist")]
    BadBlock { block: u32 },
    #[error("fell off the end of block {block} without a terminator")]
    MissingTerminator { block: u32 },
    #[error("step limit of {limit} exceeded")]
    StepLimit { limit: usize },
}

/// A contiguous region of global memory.
#[derive(Clone, Debug)]
pub struct Region {
    pub base: u64,
    pub bytes: Vec<u8>,
}

/// Result of running a function.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Outcome {
    pub ret: Option<RtValue>,
    /// Void calls to functions the machine knows nothing about, in order.
    pub effects: Vec<(String, Vec<RtValue>)>,
}

/// Simulated execution environment for one work-item.
#[derive(Clone, Debug)]
pub struct Machine {
    pub side_buffer: Vec<u8>,
    pub global: Vec<Region>,
    pub r0: Vec<u32>,
    pub simd_size: u32,
    pub simd_lane: u16,
    pub step_limit: usize,
    call_results: HashMap<String, RtValue>,
}

impl Default for Machine {
    fn default() -> Self {
        Self {
            side_buffer: Vec::new(),
            global: Vec::new(),
            r0: vec![0; 8],
            simd_size: 16,
            simd_lane: 0,
            step_limit: 100_000,
            call_results: HashMap::new(),
        }
    }
}

impl Machine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_side_buffer(mut self, bytes: Vec<u8>) -> Self {
        self.side_buffer = bytes;
        self
    }

    pub fn with_region(mut self, base: u64, bytes: Vec<u8>) -> Self {
        self.global.push(Region { base, bytes });
        self
    }

    pub fn with_r0(mut self, r0: Vec<u32>) -> Self {
        self.r0 = r0;
        self
    }

    pub fn with_simd(mut self, size: u32, lane: u16) -> Self {
        self.simd_size = size;
        self.simd_lane = lane;
        self
    }

    /// Make non-void calls to `callee` return `value`.
    pub fn with_call_result(mut self, callee: impl Into<String>, value: RtValue) -> Self {
        self.call_results.insert(callee.into(), value);
        self
    }

    fn read(
        &self,
        inst: InstId,
        space: AddressSpace,
        addr: u64,
        size: u32,
    ) -> Result<&[u8], EvalError> {
        let oob = || EvalError::OutOfBounds {
            inst,
            space,
            addr,
            size,
        };
        let end = addr.checked_add(size as u64).ok_or_else(oob)?;
        match space {
            AddressSpace::A32 => self
                .side_buffer
                .get(addr as usize..end as usize)
                .ok_or_else(oob),
            AddressSpace::Global => self
                .global
                .iter()
                .find(|r| addr >= r.base && end <= r.base + r.bytes.len() as u64)
                .map(|r| &r.bytes[(addr - r.base) as usize..(end - r.base) as usize])
                .ok_or_else(oob),
            AddressSpace::Private => Err(oob()),
        }
    }

    /// Run `func` with the given arguments.
    pub fn run(&self, func: &Function, args: &[RtValue]) -> Result<Outcome, EvalError> {
        let mut frame = Frame {
            func,
            args,
            values: HashMap::new(),
        };
        let mut outcome = Outcome::default();
        let mut block = 0u32;
        let mut steps = 0usize;

        loop {
            let insts = &func
                .blocks
                .get(block as usize)
                .ok_or(EvalError::BadBlock { block })?
                .insts;
            let mut next = None;
            for id in insts {
                steps += 1;
                if steps > self.step_limit {
                    return Err(EvalError::StepLimit {
                        limit: self.step_limit,
                    });
                }
                let Some(inst) = func.inst(*id) else {
                    continue;
                };
                match &inst.kind {
                    InstKind::Br { target } => {
                        next = Some(target.0);
                        break;
                    }
                    InstKind::CondBr {
                        cond,
                        then_block,
                        else_block,
                    } => {
                        let taken = frame.int(*id, cond)? != 0;
                        next = Some(if taken { then_block.0 } else { else_block.0 });
                        break;
                    }
                    InstKind::Ret { value } => {
                        outcome.ret = match value {
                            Some(v) => Some(frame.get(v)?),
                            None => None,
                        };
                        return Ok(outcome);
                    }
                    _ => {
                        if let Some(result) = self.step(&mut frame, *id, &mut outcome)? {
                            frame.values.insert(*id, result);
                        }
                    }
                }
            }
            block = next.ok_or(EvalError::MissingTerminator { block })?;
        }
    }

    fn step(
        &self,
        frame: &mut Frame<'_>,
        id: InstId,
        outcome: &mut Outcome,
    ) -> Result<Option<RtValue>, EvalError> {
        let Some(inst) = frame.func.inst(id) else {
            return Ok(None);
        };
        let ty = inst.ty;
        let result = match &inst.kind {
            InstKind::Call { callee, args } => {
                if let Some(v) = self.call_results.get(callee) {
                    v.clone()
                } else if ty == Type::Void {
                    let args = args
                        .iter()
                        .map(|a| frame.get(a))
                        .collect::<Result<Vec<_>, _>>()?;
                    outcome.effects.push((callee.clone(), args));
                    return Ok(None);
                } else {
                    return Err(EvalError::UnresolvedCall {
                        inst: id,
                        callee: callee.clone(),
                    });
                }
            }
            InstKind::Intrinsic { intrinsic } => match intrinsic {
                Intrinsic::GetR0 => {
                    let lanes = ty.lanes() as usize;
                    let mut elems: Vec<u64> = self.r0.iter().map(|l| *l as u64).collect();
                    elems.resize(lanes, 0);
                    RtValue::vector(32, &elems)
                }
                Intrinsic::SimdSize => RtValue::int(32, self.simd_size as u64),
                Intrinsic::SimdLaneId => RtValue::int(16, self.simd_lane as u64),
            },
            InstKind::Binary { op, lhs, rhs } => {
                let bits = ty.scalar_bits().unwrap_or(64);
                let a = frame.int(id, lhs)?;
                let b = frame.int(id, rhs)?;
                let v = match op {
                    BinOp::Add => a.wrapping_add(b),
                    BinOp::Mul => a.wrapping_mul(b),
                    BinOp::LShr => a.checked_shr(b as u32).unwrap_or(0),
                    BinOp::And => a & b,
                };
                RtValue::int(bits, v)
            }
            InstKind::ICmp { pred, lhs, rhs } => {
                let bits = frame.func.value_type(lhs).scalar_bits().unwrap_or(64);
                let a = frame.int(id, lhs)?;
                let b = frame.int(id, rhs)?;
                let v = match pred {
                    CmpPred::Eq => a == b,
                    CmpPred::Sgt => sign_extend(a, bits) > sign_extend(b, bits),
                };
                RtValue::int(1, v as u64)
            }
            InstKind::Select {
                cond,
                on_true,
                on_false,
            } => {
                if frame.int(id, cond)? != 0 {
                    frame.get(on_true)?
                } else {
                    frame.get(on_false)?
                }
            }
            InstKind::Cast { op, value } => {
                let v = frame.get(value)?;
                match (op, ty) {
                    (CastOp::ZExt | CastOp::Trunc, Type::Int { bits }) => {
                        let raw = v.as_u64().ok_or(EvalError::TypeMismatch {
                            inst: id,
                            opcode: "cast",
                        })?;
                        RtValue::int(bits, raw)
                    }
                    (CastOp::Bitcast, _) => RtValue::from_le_bytes(ty, &v.to_le_bytes()),
                    (CastOp::IntToPtr, Type::Ptr { space }) => RtValue::Ptr {
                        space,
                        addr: v.as_u64().ok_or(EvalError::TypeMismatch {
                            inst: id,
                            opcode: "inttoptr",
                        })?,
                    },
                    _ => {
                        return Err(EvalError::TypeMismatch {
                            inst: id,
                            opcode: "cast",
                        })
                    }
                }
            }
            InstKind::ExtractElement { vector, index } => {
                let RtValue::Vector { elem_bits, elems } = frame.get(vector)? else {
                    return Err(EvalError::TypeMismatch {
                        inst: id,
                        opcode: "extractelement",
                    });
                };
                let index = frame.int(id, index)?;
                let lane = elems.get(index as usize).ok_or(EvalError::LaneOutOfRange {
                    inst: id,
                    index,
                    lanes: elems.len() as u32,
                })?;
                RtValue::int(elem_bits, *lane)
            }
            InstKind::InsertElement {
                vector,
                elem,
                index,
            } => {
                let RtValue::Vector {
                    elem_bits,
                    mut elems,
                } = frame.get(vector)?
                else {
                    return Err(EvalError::TypeMismatch {
                        inst: id,
                        opcode: "insertelement",
                    });
                };
                let value = frame.int(id, elem)?;
                let index = frame.int(id, index)?;
                let lanes = elems.len() as u32;
                let slot = elems
                    .get_mut(index as usize)
                    .ok_or(EvalError::LaneOutOfRange {
                        inst: id,
                        index,
                        lanes,
                    })?;
                *slot = value & width_mask(elem_bits);
                RtValue::Vector { elem_bits, elems }
            }
            InstKind::Load { ptr, align } => {
                let RtValue::Ptr { space, addr } = frame.get(ptr)? else {
                    return Err(EvalError::TypeMismatch {
                        inst: id,
                        opcode: "load",
                    });
                };
                let size = ty.byte_size();
                if *align > 1 && addr % *align as u64 != 0 {
                    return Err(EvalError::MisalignedLoad {
                        inst: id,
                        space,
                        addr,
                        size,
                        align: *align,
                    });
                }
                let bytes = self.read(id, space, addr, size)?;
                RtValue::from_le_bytes(ty, bytes)
            }
            InstKind::Br { .. } | InstKind::CondBr { .. } | InstKind::Ret { .. } => {
                return Ok(None)
            }
        };
        Ok(Some(result))
    }
}

fn sign_extend(value: u64, bits: u32) -> i64 {
    if bits == 0 || bits >= 64 {
        return value as i64;
    }
    let shift = 64 - bits;
    ((value << shift) as i64) >> shift
}

struct Frame<'a> {
    func: &'a Function,
    args: &'a [RtValue],
    values: HashMap<InstId, RtValue>,
}

impl Frame<'_> {
    fn get(&self, value: &Value) -> Result<RtValue, EvalError> {
        match value {
            Value::Param(i) => {
                self.args
                    .get(*i as usize)
                    .cloned()
                    .ok_or_else(|| EvalError::MissingArgument {
                        function: self.func.name.clone(),
                        index: *i,
                    })
            }
            Value::Inst(id) => self
                .values
                .get(id)
                .cloned()
                .ok_or(EvalError::UndefinedValue { inst: *id }),
            Value::Const(Constant::Int { bits, value }) => Ok(RtValue::int(*bits, *value)),
            Value::Const(Constant::Vector { elem_bits, elems }) => {
                Ok(RtValue::vector(*elem_bits, elems))
            }
            Value::Const(Constant::Undef { ty }) => Ok(RtValue::zero(*ty)),
        }
    }

    fn int(&self, inst: InstId, value: &Value) -> Result<u64, EvalError> {
        self.get(value)?.as_u64().ok_or(EvalError::TypeMismatch {
            inst,
            opcode: "scalar operand",
        })
    }
}
