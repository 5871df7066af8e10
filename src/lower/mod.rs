//! Work-item query lowering.
//!
//! Rewrites calls to the work-item builtins (`__builtin_IB_get_local_id_x`,
//! `__builtin_IB_get_group_id`, ...) into reads of hidden parameters or of
//! the runtime's dispatch side buffer, depending on the function's calling
//! convention.
//!
//! Per function:
//! 1. read the hidden-argument bookkeeping and check it against the
//!    signature,
//! 2. rewrite every recognized call in a snapshot of the call sites,
//!    zero-extending results narrower than the call,
//! 3. fold the enqueued local size to a constant when the work-group size
//!    is known at compile time.

pub mod implicit;
pub mod loader;
pub mod query;
pub mod strategy;

use std::collections::BTreeMap;

use rayon::prelude::*;
use thiserror::Error;

use crate::config::PlatformConfig;
use crate::ir::{Builder, Function, InstId, InstKind, Module, Type, Value};
use crate::metadata::{ImplicitArgKind, MetadataTable};

pub use implicit::{implicit_arg_position, ImplicitArgs};
pub use loader::FieldLoader;
pub use query::{Dim, WorkItemQuery};
pub use strategy::{create_query_lowering, lower_query, CallSite, CallingConvention, QueryLowering};

/// A failure that aborts compilation of the module.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LowerError {
    #[error(
        "@{function}: {hidden} hidden arguments are recorded but the function has only {params} parameters"
    )]
    ImplicitArgCountMismatch {
        function: String,
        hidden: usize,
        params: usize,
    },
    #[error("@{function}: %{call} needs hidden argument {kind}, which was never appended")]
    MissingImplicitArg {
        function: String,
        call: InstId,
        kind: ImplicitArgKind,
    },
    #[error("@{function}: %{call}: `{query}` cannot be lowered in {mode} mode")]
    UnsupportedInMode {
        function: String,
        call: InstId,
        query: WorkItemQuery,
        mode: CallingConvention,
    },
    #[error("@{function}: %{call}: `{query}` expects {expected} argument(s), found {found}")]
    MalformedQuery {
        function: String,
        call: InstId,
        query: WorkItemQuery,
        expected: usize,
        found: usize,
    },
}

impl LowerError {
    /// The function being lowered when the error occurred.
    pub fn function(&self) -> &str {
        match self {
            LowerError::ImplicitArgCountMismatch { function, .. }
            | LowerError::MissingImplicitArg { function, .. }
            | LowerError::UnsupportedInMode { function, .. }
            | LowerError::MalformedQuery { function, .. } => function,
        }
    }

    /// The offending call, when the error is tied to one.
    pub fn call(&self) -> Option<InstId> {
        match self {
            LowerError::ImplicitArgCountMismatch { .. } => None,
            LowerError::MissingImplicitArg { call, .. }
            | LowerError::UnsupportedInMode { call, .. }
            | LowerError::MalformedQuery { call, .. } => Some(*call),
        }
    }
}

// ─── Pass infrastructure ──────────────────────────────────────────

/// Read-only state shared by every function of a module.
#[derive(Clone, Copy, Debug)]
pub struct PassContext<'a> {
    pub platform: &'a PlatformConfig,
    pub metadata: &'a MetadataTable,
}

/// A transformation applied to one function at a time.
pub trait FunctionPass: Sync {
    fn name(&self) -> &'static str;

    /// Transform `func`. Returns whether anything changed.
    fn run_on_function(&self, func: &mut Function, ctx: &PassContext<'_>)
        -> Result<bool, LowerError>;
}

/// Run `pass` over every function of `module`. Functions are independent
/// and processed in parallel; the error reported is the one from the
/// earliest function in module order.
pub fn run_on_module(
    pass: &dyn FunctionPass,
    module: &mut Module,
    platform: &PlatformConfig,
) -> Result<bool, LowerError> {
    let changed = for_each_function(module, platform, |func, ctx| {
        pass.run_on_function(func, ctx)
    })?;
    Ok(changed.into_iter().any(|c| c))
}

/// Apply `f` to every function in parallel, collecting results in module
/// order. Stops at the first error in that order.
fn for_each_function<T, F>(
    module: &mut Module,
    platform: &PlatformConfig,
    f: F,
) -> Result<Vec<T>, LowerError>
where
    T: Send,
    F: Fn(&mut Function, &PassContext<'_>) -> Result<T, LowerError> + Sync,
{
    let Module {
        functions,
        metadata,
        ..
    } = module;
    let ctx = PassContext {
        platform,
        metadata,
    };
    functions
        .par_iter_mut()
        .map(|func| f(func, &ctx))
        .collect::<Vec<_>>()
        .into_iter()
        .collect()
}

// ─── Work-item resolution ─────────────────────────────────────────

/// What lowering did to one function.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoweringStats {
    pub function: String,
    pub mode: Option<CallingConvention>,
    /// Rewritten calls per query, keyed by query name.
    pub rewritten: BTreeMap<String, usize>,
    /// Whether the enqueued local size was replaced by a constant.
    pub folded_enqueued_size: bool,
}

impl LoweringStats {
    pub fn total(&self) -> usize {
        self.rewritten.values().sum()
    }

    pub fn changed(&self) -> bool {
        self.total() > 0 || self.folded_enqueued_size
    }
}

/// Lowers every work-item query of a function.
#[derive(Clone, Copy, Debug, Default)]
pub struct WorkItemResolution;

impl WorkItemResolution {
    pub fn new() -> Self {
        Self
    }

    /// Lower one function and report what was rewritten.
    pub fn lower_function(
        &self,
        func: &mut Function,
        ctx: &PassContext<'_>,
    ) -> Result<LoweringStats, LowerError> {
        let mode = CallingConvention::of(func);
        let _span =
            tracing::debug_span!("work_item_resolution", function = %func.name, %mode).entered();

        let meta = ctx.metadata.get(&func.name);
        let args = ImplicitArgs::new(func, meta)?;
        let enqueued = args.position(func, ImplicitArgKind::EnqueuedLocalWorkSize);
        let strategy = create_query_lowering(mode, args, ctx.platform);

        let mut stats = LoweringStats {
            function: func.name.clone(),
            mode: Some(mode),
            ..LoweringStats::default()
        };

        for id in func.call_sites() {
            let Some(site) = recognize(func, id)? else {
                continue;
            };
            let value = {
                let Some(mut b) = Builder::before(func, id) else {
                    continue;
                };
                let value = lower_query(strategy.as_ref(), &mut b, &site)?;
                widen(&mut b, value, &site)
            };
            func.replace_and_erase(id, &value);
            tracing::trace!(call = %id, query = %site.query, "rewrote work-item query");
            *stats.rewritten.entry(site.query.to_string()).or_default() += 1;
        }

        if let (Some(dims), Some(param)) = (meta.and_then(|m| m.thread_group_size), enqueued) {
            let constant = Value::vector(32, &dims.map(u64::from));
            let replaced = func.replace_all_uses(&Value::Param(param), &constant);
            stats.folded_enqueued_size = replaced > 0;
        }

        tracing::debug!(
            rewritten = stats.total(),
            folded_enqueued_size = stats.folded_enqueued_size,
            "lowered work-item queries"
        );
        Ok(stats)
    }
}

impl FunctionPass for WorkItemResolution {
    fn name(&self) -> &'static str {
        "work-item-resolution"
    }

    fn run_on_function(
        &self,
        func: &mut Function,
        ctx: &PassContext<'_>,
    ) -> Result<bool, LowerError> {
        self.lower_function(func, ctx).map(|stats| stats.changed())
    }
}

/// Lower every function of `module`, returning per-function statistics in
/// module order.
pub fn lower_module(
    module: &mut Module,
    platform: &PlatformConfig,
) -> Result<Vec<LoweringStats>, LowerError> {
    let pass = WorkItemResolution::new();
    for_each_function(module, platform, |func, ctx| pass.lower_function(func, ctx))
}

/// Classify the call at `id`. `Ok(None)` for calls that are not queries.
fn recognize(func: &Function, id: InstId) -> Result<Option<CallSite>, LowerError> {
    let Some(inst) = func.inst(id) else {
        return Ok(None);
    };
    let InstKind::Call { callee, args } = &inst.kind else {
        return Ok(None);
    };
    let Some(query) = WorkItemQuery::from_callee(callee) else {
        return Ok(None);
    };
    let expected = usize::from(query.takes_dim());
    if args.len() != expected {
        return Err(LowerError::MalformedQuery {
            function: func.name.clone(),
            call: id,
            query,
            expected,
            found: args.len(),
        });
    }
    Ok(Some(CallSite {
        id,
        query,
        ty: inst.ty,
        dim: args.first().cloned(),
    }))
}

/// Zero-extend `value` when it is narrower than the call's result.
fn widen(b: &mut Builder<'_>, value: Value, site: &CallSite) -> Value {
    let from = b.type_of(&value);
    match (from, site.ty) {
        (Type::Int { bits: have }, Type::Int { bits: want }) if have < want => {
            b.zext(value, site.ty, "")
        }
        _ => value,
    }
}
