//! Calling-convention strategies.
//!
//! Each convention answers the same set of source questions (where is the
//! thread-state vector, where are the global sizes, ...) from a different
//! place. The mode-independent arithmetic on top of those sources lives in
//! `lower_query`, so a query's lowering is written once.
//!
//! - `ImplicitArgLowering`: reads the hidden trailing parameters.
//! - `IndirectLowering`: reads the dispatch side buffer and the
//!   platform's thread-state register.

mod implicit_arg;
mod indirect;

use std::fmt;

use crate::config::PlatformConfig;
use crate::ir::{Builder, CmpPred, Function, InstId, Type, Value};
use crate::metadata::STACK_CALL_ATTR;

use super::implicit::ImplicitArgs;
use super::query::{Dim, WorkItemQuery};
use super::LowerError;

pub use implicit_arg::ImplicitArgLowering;
pub use indirect::IndirectLowering;

/// Lane of the thread-state vector holding the local thread id.
pub const R0_LOCAL_THREAD_LANE: u32 = 2;

/// How a function obtains its dispatch parameters.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallingConvention {
    /// Hidden trailing parameters appended by the compiler.
    ImplicitArgument,
    /// Runtime side buffer plus the thread-state register.
    IndirectStack,
}

impl CallingConvention {
    pub fn of(func: &Function) -> Self {
        if func.has_attribute(STACK_CALL_ATTR) {
            CallingConvention::IndirectStack
        } else {
            CallingConvention::ImplicitArgument
        }
    }
}

impl fmt::Display for CallingConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallingConvention::ImplicitArgument => write!(f, "implicit-argument"),
            CallingConvention::IndirectStack => write!(f, "indirect-stack"),
        }
    }
}

/// One recognized query call being rewritten.
#[derive(Clone, Debug)]
pub struct CallSite {
    pub id: InstId,
    pub query: WorkItemQuery,
    /// Declared result type of the call.
    pub ty: Type,
    /// Runtime dimension argument, for queries that take one.
    pub dim: Option<Value>,
}

impl CallSite {
    /// Scalar width of the call's result.
    pub fn result_bits(&self) -> u32 {
        self.ty.scalar_bits().unwrap_or(32)
    }

    pub fn unsupported(&self, func: &Function, mode: CallingConvention) -> LowerError {
        LowerError::UnsupportedInMode {
            function: func.name.clone(),
            call: self.id,
            query: self.query,
            mode,
        }
    }

    fn dim(&self, func: &Function) -> Result<Value, LowerError> {
        self.dim.clone().ok_or_else(|| LowerError::MalformedQuery {
            function: func.name.clone(),
            call: self.id,
            query: self.query,
            expected: 1,
            found: 0,
        })
    }
}

/// Where a calling convention finds each dispatch quantity. Vector
/// sources are three lanes indexed by dimension.
pub trait QueryLowering {
    fn mode(&self) -> CallingConvention;

    /// The thread-state vector.
    fn thread_state(&self, b: &mut Builder<'_>, site: &CallSite) -> Result<Value, LowerError>;

    /// The lane-local id along `dim`, at most as wide as the call.
    fn local_id(&self, b: &mut Builder<'_>, site: &CallSite, dim: Dim)
        -> Result<Value, LowerError>;

    fn global_sizes(&self, b: &mut Builder<'_>, site: &CallSite) -> Result<Value, LowerError>;

    fn local_sizes(&self, b: &mut Builder<'_>, site: &CallSite) -> Result<Value, LowerError>;

    fn enqueued_local_sizes(
        &self,
        b: &mut Builder<'_>,
        site: &CallSite,
    ) -> Result<Value, LowerError>;

    fn global_offsets(&self, b: &mut Builder<'_>, site: &CallSite) -> Result<Value, LowerError>;

    fn num_groups(&self, b: &mut Builder<'_>, site: &CallSite) -> Result<Value, LowerError>;

    fn grid_origins(&self, b: &mut Builder<'_>, site: &CallSite) -> Result<Value, LowerError>;

    fn grid_sizes(&self, b: &mut Builder<'_>, site: &CallSite) -> Result<Value, LowerError>;

    fn work_dim(&self, b: &mut Builder<'_>, site: &CallSite) -> Result<Value, LowerError>;

    fn sync_buffer(&self, b: &mut Builder<'_>, site: &CallSite) -> Result<Value, LowerError>;
}

/// Select the strategy for a function's calling convention.
pub fn create_query_lowering(
    mode: CallingConvention,
    args: ImplicitArgs,
    platform: &PlatformConfig,
) -> Box<dyn QueryLowering> {
    match mode {
        CallingConvention::ImplicitArgument => Box::new(ImplicitArgLowering::new(args)),
        CallingConvention::IndirectStack => Box::new(IndirectLowering::new(platform)),
    }
}

/// Emit the value of `site`'s query before the call.
pub fn lower_query(
    strategy: &dyn QueryLowering,
    b: &mut Builder<'_>,
    site: &CallSite,
) -> Result<Value, LowerError> {
    match site.query {
        WorkItemQuery::LocalId(dim) => strategy.local_id(b, site, dim),
        WorkItemQuery::GroupId => {
            let dim = site.dim(b.func())?;
            let r0 = strategy.thread_state(b, site)?;
            group_id_lane(b, r0, dim)
        }
        WorkItemQuery::LocalThreadId => {
            let r0 = strategy.thread_state(b, site)?;
            let lane = b.extract_element(r0, Value::i32(R0_LOCAL_THREAD_LANE), "r0.2");
            Ok(b.trunc(lane, Type::I8, "localThreadId"))
        }
        WorkItemQuery::WorkDim => strategy.work_dim(b, site),
        WorkItemQuery::SyncBuffer => strategy.sync_buffer(b, site),
        query => {
            let dim = site.dim(b.func())?;
            let source = match query {
                WorkItemQuery::GlobalSize => strategy.global_sizes(b, site)?,
                WorkItemQuery::LocalSize => strategy.local_sizes(b, site)?,
                WorkItemQuery::EnqueuedLocalSize => strategy.enqueued_local_sizes(b, site)?,
                WorkItemQuery::GlobalOffset => strategy.global_offsets(b, site)?,
                WorkItemQuery::NumGroups => strategy.num_groups(b, site)?,
                WorkItemQuery::StageInGridOrigin => strategy.grid_origins(b, site)?,
                _ => strategy.grid_sizes(b, site)?,
            };
            Ok(b.extract_element(source, dim, &query.to_string()))
        }
    }
}

/// Group id `dim` lives in thread-state lane 1 for x and lanes 6, 7 for
/// y, z: lane = dim + (dim == 0 ? 1 : 5).
fn group_id_lane(b: &mut Builder<'_>, r0: Value, dim: Value) -> Result<Value, LowerError> {
    let bits = b.type_of(&dim).scalar_bits().unwrap_or(32);
    let is_x = b.icmp(CmpPred::Eq, dim.clone(), Value::int(bits, 0), "cmpDim");
    let base = b.select(is_x, Value::int(bits, 1), Value::int(bits, 5), "offset");
    let lane = b.add(base, dim, "lane");
    Ok(b.extract_element(r0, lane, "groupId"))
}

/// Truncate each of the three lanes of `vector` to `bits`.
pub(super) fn truncate_lanes(b: &mut Builder<'_>, vector: Value, bits: u32) -> Value {
    let ty = b.type_of(&vector);
    if ty.scalar_bits().is_some_and(|have| have <= bits) {
        return vector;
    }
    let mut out = Value::undef(Type::vector(bits, ty.lanes()));
    for lane in 0..ty.lanes() {
        let elem = b.extract_element(vector.clone(), Value::i32(lane), "");
        let narrow = b.trunc(elem, Type::int(bits), "");
        out = b.insert_element(out, narrow, Value::i32(lane), "");
    }
    out
}
