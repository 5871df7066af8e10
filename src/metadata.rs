//! Per-function bookkeeping produced by earlier compiler phases.
//!
//! An upstream analysis decides which hidden (implicit) arguments a kernel
//! needs and appends them to its parameter list in canonical order. It
//! records that decision here, together with any work-group size that is
//! fixed at compile time. The lowering pass only reads this table.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ir::{AddressSpace, Function, Param, Type};

/// Function attribute marking the indirect (stack-call) convention.
pub const STACK_CALL_ATTR: &str = "stack-call";

/// Hidden argument kinds, declared in canonical order. Hidden parameters
/// always appear in a function's signature in this order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImplicitArgKind {
    R0,
    PayloadHeader,
    WorkDim,
    NumGroups,
    GlobalSize,
    LocalSize,
    EnqueuedLocalWorkSize,
    LocalIdX,
    LocalIdY,
    LocalIdZ,
    StageInGridOrigin,
    StageInGridSize,
    SyncBuffer,
}

impl ImplicitArgKind {
    pub const ALL: [ImplicitArgKind; 13] = [
        ImplicitArgKind::R0,
        ImplicitArgKind::PayloadHeader,
        ImplicitArgKind::WorkDim,
        ImplicitArgKind::NumGroups,
        ImplicitArgKind::GlobalSize,
        ImplicitArgKind::LocalSize,
        ImplicitArgKind::EnqueuedLocalWorkSize,
        ImplicitArgKind::LocalIdX,
        ImplicitArgKind::LocalIdY,
        ImplicitArgKind::LocalIdZ,
        ImplicitArgKind::StageInGridOrigin,
        ImplicitArgKind::StageInGridSize,
        ImplicitArgKind::SyncBuffer,
    ];

    /// IR type of the parameter carrying this argument.
    pub fn ty(self) -> Type {
        match self {
            ImplicitArgKind::R0 | ImplicitArgKind::PayloadHeader => Type::vector(32, 8),
            ImplicitArgKind::WorkDim => Type::I32,
            ImplicitArgKind::NumGroups
            | ImplicitArgKind::GlobalSize
            | ImplicitArgKind::LocalSize
            | ImplicitArgKind::EnqueuedLocalWorkSize
            | ImplicitArgKind::StageInGridOrigin
            | ImplicitArgKind::StageInGridSize => Type::vector(32, 3),
            ImplicitArgKind::LocalIdX | ImplicitArgKind::LocalIdY | ImplicitArgKind::LocalIdZ => {
                Type::I16
            }
            ImplicitArgKind::SyncBuffer => Type::ptr(AddressSpace::Global),
        }
    }

    /// Parameter name used when the argument is appended.
    pub fn param_name(self) -> &'static str {
        match self {
            ImplicitArgKind::R0 => "r0",
            ImplicitArgKind::PayloadHeader => "payloadHeader",
            ImplicitArgKind::WorkDim => "workDim",
            ImplicitArgKind::NumGroups => "numGroups",
            ImplicitArgKind::GlobalSize => "globalSize",
            ImplicitArgKind::LocalSize => "localSize",
            ImplicitArgKind::EnqueuedLocalWorkSize => "enqueuedLocalSize",
            ImplicitArgKind::LocalIdX => "localIdX",
            ImplicitArgKind::LocalIdY => "localIdY",
            ImplicitArgKind::LocalIdZ => "localIdZ",
            ImplicitArgKind::StageInGridOrigin => "stageInGridOrigin",
            ImplicitArgKind::StageInGridSize => "stageInGridSize",
            ImplicitArgKind::SyncBuffer => "syncBuffer",
        }
    }
}

impl fmt::Display for ImplicitArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImplicitArgKind::R0 => "R0",
            ImplicitArgKind::PayloadHeader => "PAYLOAD_HEADER",
            ImplicitArgKind::WorkDim => "WORK_DIM",
            ImplicitArgKind::NumGroups => "NUM_GROUPS",
            ImplicitArgKind::GlobalSize => "GLOBAL_SIZE",
            ImplicitArgKind::LocalSize => "LOCAL_SIZE",
            ImplicitArgKind::EnqueuedLocalWorkSize => "ENQUEUED_LOCAL_WORK_SIZE",
            ImplicitArgKind::LocalIdX => "LOCAL_ID_X",
            ImplicitArgKind::LocalIdY => "LOCAL_ID_Y",
            ImplicitArgKind::LocalIdZ => "LOCAL_ID_Z",
            ImplicitArgKind::StageInGridOrigin => "STAGE_IN_GRID_ORIGIN",
            ImplicitArgKind::StageInGridSize => "STAGE_IN_GRID_SIZE",
            ImplicitArgKind::SyncBuffer => "SYNC_BUFFER",
        };
        f.write_str(name)
    }
}

/// What earlier phases recorded about one function.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionMetadata {
    /// Hidden arguments appended to the function, canonical order.
    #[serde(default)]
    pub implicit_args: Vec<ImplicitArgKind>,
    /// Work-group dimensions fixed at compile time, if any.
    #[serde(default)]
    pub thread_group_size: Option<[u32; 3]>,
}

impl FunctionMetadata {
    pub fn with_thread_group_size(mut self, dims: [u32; 3]) -> Self {
        self.thread_group_size = Some(dims);
        self
    }
}

/// Metadata for every function of a module, keyed by function name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataTable {
    functions: BTreeMap<String, FunctionMetadata>,
}

impl MetadataTable {
    pub fn get(&self, function: &str) -> Option<&FunctionMetadata> {
        self.functions.get(function)
    }

    pub fn entry(&mut self, function: &str) -> &mut FunctionMetadata {
        self.functions.entry(function.to_string()).or_default()
    }

    pub fn insert(&mut self, function: impl Into<String>, meta: FunctionMetadata) {
        self.functions.insert(function.into(), meta);
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

/// Append hidden parameters for `kinds` to `func` in canonical order and
/// record them in `meta`. Kinds already recorded are skipped, and kinds
/// that sort before the last recorded one are dropped so the trailing
/// parameters stay canonical.
///
/// This plays the upstream analysis in tests and fixtures.
pub fn append_implicit_args(
    func: &mut Function,
    meta: &mut FunctionMetadata,
    kinds: &[ImplicitArgKind],
) {
    let mut wanted: Vec<ImplicitArgKind> = kinds.to_vec();
    wanted.sort();
    wanted.dedup();
    wanted.retain(|k| !meta.implicit_args.contains(k));
    if wanted.is_empty() {
        return;
    }
    if let Some(last) = meta.implicit_args.last() {
        wanted.retain(|k| k > last);
    }
    for kind in wanted {
        func.add_param(Param::new(kind.param_name(), kind.ty()));
        meta.implicit_args.push(kind);
    }
}
