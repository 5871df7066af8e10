//! Work-item query recognition.
//!
//! A query is identified by its callee name only. The name table below is
//! the single list of recognized builtins; anything else is left alone.

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use crate::metadata::ImplicitArgKind;

/// Component of a 3-D coordinate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Dim {
    X,
    Y,
    Z,
}

impl Dim {
    pub const ALL: [Dim; 3] = [Dim::X, Dim::Y, Dim::Z];

    pub fn index(self) -> u32 {
        match self {
            Dim::X => 0,
            Dim::Y => 1,
            Dim::Z => 2,
        }
    }
}

impl fmt::Display for Dim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dim::X => write!(f, "x"),
            Dim::Y => write!(f, "y"),
            Dim::Z => write!(f, "z"),
        }
    }
}

/// Execution-coordinate query a kernel can issue.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum WorkItemQuery {
    /// Lane-local id along one fixed dimension.
    LocalId(Dim),
    GroupId,
    /// Index of the hardware thread within its work-group.
    LocalThreadId,
    GlobalSize,
    LocalSize,
    EnqueuedLocalSize,
    GlobalOffset,
    WorkDim,
    NumGroups,
    StageInGridOrigin,
    StageInGridSize,
    SyncBuffer,
}

const QUERY_NAMES: [(&str, WorkItemQuery); 14] = [
    ("__builtin_IB_get_local_id_x", WorkItemQuery::LocalId(Dim::X)),
    ("__builtin_IB_get_local_id_y", WorkItemQuery::LocalId(Dim::Y)),
    ("__builtin_IB_get_local_id_z", WorkItemQuery::LocalId(Dim::Z)),
    ("__builtin_IB_get_group_id", WorkItemQuery::GroupId),
    ("__builtin_IB_get_local_thread_id", WorkItemQuery::LocalThreadId),
    ("__builtin_IB_get_global_size", WorkItemQuery::GlobalSize),
    ("__builtin_IB_get_local_size", WorkItemQuery::LocalSize),
    ("__builtin_IB_get_enqueued_local_size", WorkItemQuery::EnqueuedLocalSize),
    ("__builtin_IB_get_global_offset", WorkItemQuery::GlobalOffset),
    ("__builtin_IB_get_work_dim", WorkItemQuery::WorkDim),
    ("__builtin_IB_get_num_groups", WorkItemQuery::NumGroups),
    ("__builtin_IB_get_grid_origin", WorkItemQuery::StageInGridOrigin),
    ("__builtin_IB_get_grid_size", WorkItemQuery::StageInGridSize),
    ("__builtin_IB_get_sync_buffer", WorkItemQuery::SyncBuffer),
];

static BY_CALLEE: LazyLock<HashMap<&'static str, WorkItemQuery>> =
    LazyLock::new(|| QUERY_NAMES.iter().copied().collect());

impl WorkItemQuery {
    /// Every recognized query, in name-table order.
    pub fn all() -> impl Iterator<Item = WorkItemQuery> {
        QUERY_NAMES.iter().map(|(_, q)| *q)
    }

    /// Recognize a callee name.
    pub fn from_callee(callee: &str) -> Option<Self> {
        BY_CALLEE.get(callee).copied()
    }

    /// The builtin name kernels call.
    pub fn callee(self) -> &'static str {
        QUERY_NAMES
            .iter()
            .find(|(_, q)| *q == self)
            .map(|(name, _)| *name)
            .unwrap_or("")
    }

    /// Whether the call carries a runtime dimension index argument.
    pub fn takes_dim(self) -> bool {
        matches!(
            self,
            WorkItemQuery::GroupId
                | WorkItemQuery::GlobalSize
                | WorkItemQuery::LocalSize
                | WorkItemQuery::EnqueuedLocalSize
                | WorkItemQuery::GlobalOffset
                | WorkItemQuery::NumGroups
                | WorkItemQuery::StageInGridOrigin
                | WorkItemQuery::StageInGridSize
        )
    }

    /// Hidden argument the query reads when the function uses hidden
    /// arguments.
    pub fn implicit_arg(self) -> ImplicitArgKind {
        match self {
            WorkItemQuery::LocalId(Dim::X) => ImplicitArgKind::LocalIdX,
            WorkItemQuery::LocalId(Dim::Y) => ImplicitArgKind::LocalIdY,
            WorkItemQuery::LocalId(Dim::Z) => ImplicitArgKind::LocalIdZ,
            WorkItemQuery::GroupId | WorkItemQuery::LocalThreadId => ImplicitArgKind::R0,
            WorkItemQuery::GlobalSize => ImplicitArgKind::GlobalSize,
            WorkItemQuery::LocalSize => ImplicitArgKind::LocalSize,
            WorkItemQuery::EnqueuedLocalSize => ImplicitArgKind::EnqueuedLocalWorkSize,
            WorkItemQuery::GlobalOffset => ImplicitArgKind::PayloadHeader,
            WorkItemQuery::WorkDim => ImplicitArgKind::WorkDim,
            WorkItemQuery::NumGroups => ImplicitArgKind::NumGroups,
            WorkItemQuery::StageInGridOrigin => ImplicitArgKind::StageInGridOrigin,
            WorkItemQuery::StageInGridSize => ImplicitArgKind::StageInGridSize,
            WorkItemQuery::SyncBuffer => ImplicitArgKind::SyncBuffer,
        }
    }
}

impl fmt::Display for WorkItemQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkItemQuery::LocalId(dim) => write!(f, "local_id_{}", dim),
            WorkItemQuery::GroupId => write!(f, "group_id"),
            WorkItemQuery::LocalThreadId => write!(f, "local_thread_id"),
            WorkItemQuery::GlobalSize => write!(f, "global_size"),
            WorkItemQuery::LocalSize => write!(f, "local_size"),
            WorkItemQuery::EnqueuedLocalSize => write!(f, "enqueued_local_size"),
            WorkItemQuery::GlobalOffset => write!(f, "global_offset"),
            WorkItemQuery::WorkDim => write!(f, "work_dim"),
            WorkItemQuery::NumGroups => write!(f, "num_groups"),
            WorkItemQuery::StageInGridOrigin => write!(f, "grid_origin"),
            WorkItemQuery::StageInGridSize => write!(f, "grid_size"),
            WorkItemQuery::SyncBuffer => write!(f, "sync_buffer"),
        }
    }
}
