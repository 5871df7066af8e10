//! Indirect (stack-call) convention.
//!
//! Dispatch sizes come from the side buffer through the field loader,
//! per-item ids from the local-id table it points at, and group/thread
//! ids from the platform's thread-state register.

use crate::config::PlatformConfig;
use crate::dispatch::local_ids::{dim_factor, ENTRY_BYTES, MIN_TABLE_LANES};
use crate::dispatch::offsets;
use crate::ir::{AddressSpace, Builder, CmpPred, Intrinsic, Type, Value};
use crate::lower::loader::FieldLoader;
use crate::lower::query::Dim;
use crate::lower::LowerError;

use super::{truncate_lanes, CallSite, CallingConvention, QueryLowering, R0_LOCAL_THREAD_LANE};

pub struct IndirectLowering {
    loader: FieldLoader,
    r0_lanes: u32,
}

impl IndirectLowering {
    pub fn new(platform: &PlatformConfig) -> Self {
        Self {
            loader: FieldLoader::new(platform),
            r0_lanes: platform.r0_lanes(),
        }
    }

    fn sizes64(&self, b: &mut Builder<'_>, offset: u32, bits: u32, name: &str) -> Value {
        let wide = self.loader.load(b, offset, Type::vector(64, 3), name);
        truncate_lanes(b, wide, bits)
    }
}

impl QueryLowering for IndirectLowering {
    fn mode(&self) -> CallingConvention {
        CallingConvention::IndirectStack
    }

    fn thread_state(&self, b: &mut Builder<'_>, _site: &CallSite) -> Result<Value, LowerError> {
        Ok(b.intrinsic(Intrinsic::GetR0, Type::vector(32, self.r0_lanes), "r0"))
    }

    // addr = table + tid * (w * 6) + factor(dim) * w + lane * 2,  w = max(simd, 16)
    fn local_id(
        &self,
        b: &mut Builder<'_>,
        site: &CallSite,
        dim: Dim,
    ) -> Result<Value, LowerError> {
        let table = self
            .loader
            .load(b, offsets::LOCAL_ID_TABLE, Type::I64, "localIdBase");

        let simd = b.intrinsic(Intrinsic::SimdSize, Type::I32, "simdSize");
        let min_lanes = Value::i32(MIN_TABLE_LANES);
        let wide = b.icmp(CmpPred::Sgt, simd.clone(), min_lanes.clone(), "isWide");
        let rounded = b.select(wide, simd, min_lanes, "simdRounded");

        let r0 = self.thread_state(b, site)?;
        let tid = b.extract_element(r0, Value::i32(R0_LOCAL_THREAD_LANE), "r0.2");
        let tid = b.trunc(tid, Type::I8, "tid");
        let tid = b.zext(tid, Type::I64, "tid64");

        let stride = b.mul(rounded.clone(), Value::i32(3 * ENTRY_BYTES), "stride");
        let stride = b.zext(stride, Type::I64, "stride64");
        let thread_base = b.mul(stride, tid, "threadOffset");
        let thread_base = b.add(thread_base, table, "threadBase");

        let dim_offset = b.mul(rounded, Value::i32(dim_factor(dim.index())), "dimOffset");
        let dim_offset = b.zext(dim_offset, Type::I64, "dimOffset64");
        let lane = b.intrinsic(Intrinsic::SimdLaneId, Type::I16, "lane");
        let lane = b.zext(lane, Type::I64, "lane64");
        let lane_offset = b.mul(lane, Value::int(64, ENTRY_BYTES as u64), "laneOffset");

        let addr = b.add(dim_offset, lane_offset, "entryOffset");
        let addr = b.add(addr, thread_base, "entryAddr");
        // table pointer is a 64-bit device address, not private stack memory
        let ptr = b.int_to_ptr(addr, AddressSpace::Global, "entryPtr");
        Ok(b.load(ptr, Type::I16, ENTRY_BYTES, &format!("localId{}", dim)))
    }

    fn global_sizes(&self, b: &mut Builder<'_>, site: &CallSite) -> Result<Value, LowerError> {
        Ok(self.sizes64(b, offsets::GLOBAL_SIZE_X, site.result_bits(), "globalSizes"))
    }

    fn local_sizes(&self, b: &mut Builder<'_>, _site: &CallSite) -> Result<Value, LowerError> {
        Ok(self
            .loader
            .load(b, offsets::LOCAL_SIZE_X, Type::vector(32, 3), "localSizes"))
    }

    // the side buffer has no enqueued size; it equals the local size here
    fn enqueued_local_sizes(
        &self,
        b: &mut Builder<'_>,
        site: &CallSite,
    ) -> Result<Value, LowerError> {
        self.local_sizes(b, site)
    }

    fn global_offsets(&self, b: &mut Builder<'_>, site: &CallSite) -> Result<Value, LowerError> {
        Ok(self.sizes64(b, offsets::GLOBAL_OFFSET_X, site.result_bits(), "globalOffsets"))
    }

    fn num_groups(&self, b: &mut Builder<'_>, _site: &CallSite) -> Result<Value, LowerError> {
        Ok(self
            .loader
            .load(b, offsets::GROUP_COUNT_X, Type::vector(32, 3), "groupCounts"))
    }

    fn grid_origins(&self, b: &mut Builder<'_>, site: &CallSite) -> Result<Value, LowerError> {
        Err(site.unsupported(b.func(), self.mode()))
    }

    fn grid_sizes(&self, b: &mut Builder<'_>, _site: &CallSite) -> Result<Value, LowerError> {
        Ok(self.sizes64(b, offsets::GLOBAL_SIZE_X, 32, "gridSizes"))
    }

    // Legacy read: the aligned word holding NUM_WORK_DIM, shifted right by
    // 24. That is byte 3 (simd_width in ImplicitArgsBuffer), not byte 2
    // where the runtime stores num_work_dim. Kept as the runtime expects it.
    fn work_dim(&self, b: &mut Builder<'_>, _site: &CallSite) -> Result<Value, LowerError> {
        let word_offset = offsets::NUM_WORK_DIM / 4 * 4;
        let word = self.loader.load(b, word_offset, Type::I32, "header");
        Ok(b.lshr(word, Value::i32(24), "workDim"))
    }

    fn sync_buffer(&self, b: &mut Builder<'_>, site: &CallSite) -> Result<Value, LowerError> {
        Err(site.unsupported(b.func(), self.mode()))
    }
}
