use crate::ir::{Builder, Value};
use crate::lower::implicit::ImplicitArgs;
use crate::lower::query::{Dim, WorkItemQuery};
use crate::lower::LowerError;
use crate::metadata::ImplicitArgKind;

use super::{CallSite, CallingConvention, QueryLowering};

/// Every quantity is a hidden trailing parameter.
pub struct ImplicitArgLowering {
    args: ImplicitArgs,
}

impl ImplicitArgLowering {
    pub fn new(args: ImplicitArgs) -> Self {
        Self { args }
    }

    fn arg(
        &self,
        b: &Builder<'_>,
        site: &CallSite,
        kind: ImplicitArgKind,
    ) -> Result<Value, LowerError> {
        self.args.param(b.func(), kind, site.id)
    }
}

impl QueryLowering for ImplicitArgLowering {
    fn mode(&self) -> CallingConvention {
        CallingConvention::ImplicitArgument
    }

    fn thread_state(&self, b: &mut Builder<'_>, site: &CallSite) -> Result<Value, LowerError> {
        self.arg(b, site, ImplicitArgKind::R0)
    }

    fn local_id(
        &self,
        b: &mut Builder<'_>,
        site: &CallSite,
        dim: Dim,
    ) -> Result<Value, LowerError> {
        self.arg(b, site, WorkItemQuery::LocalId(dim).implicit_arg())
    }

    fn global_sizes(&self, b: &mut Builder<'_>, site: &CallSite) -> Result<Value, LowerError> {
        self.arg(b, site, ImplicitArgKind::GlobalSize)
    }

    fn local_sizes(&self, b: &mut Builder<'_>, site: &CallSite) -> Result<Value, LowerError> {
        self.arg(b, site, ImplicitArgKind::LocalSize)
    }

    fn enqueued_local_sizes(
        &self,
        b: &mut Builder<'_>,
        site: &CallSite,
    ) -> Result<Value, LowerError> {
        self.arg(b, site, ImplicitArgKind::EnqueuedLocalWorkSize)
    }

    // global offsets ride in the first lanes of the payload header
    fn global_offsets(&self, b: &mut Builder<'_>, site: &CallSite) -> Result<Value, LowerError> {
        self.arg(b, site, ImplicitArgKind::PayloadHeader)
    }

    fn num_groups(&self, b: &mut Builder<'_>, site: &CallSite) -> Result<Value, LowerError> {
        self.arg(b, site, ImplicitArgKind::NumGroups)
    }

    fn grid_origins(&self, b: &mut Builder<'_>, site: &CallSite) -> Result<Value, LowerError> {
        self.arg(b, site, ImplicitArgKind::StageInGridOrigin)
    }

    fn grid_sizes(&self, b: &mut Builder<'_>, site: &CallSite) -> Result<Value, LowerError> {
        self.arg(b, site, ImplicitArgKind::StageInGridSize)
    }

    fn work_dim(&self, b: &mut Builder<'_>, site: &CallSite) -> Result<Value, LowerError> {
        self.arg(b, site, ImplicitArgKind::WorkDim)
    }

    fn sync_buffer(&self, b: &mut Builder<'_>, site: &CallSite) -> Result<Value, LowerError> {
        self.arg(b, site, ImplicitArgKind::SyncBuffer)
    }
}
