//! End-to-end lowering through the public API: build a module, ship it
//! through its JSON form, lower it, then execute the result against a
//! simulated dispatch.

use wilower::dispatch::{ImplicitArgsBuffer, LocalIdTable};
use wilower::ir::eval::{Machine, RtValue};
use wilower::ir::{Builder, Function, Param, Type, Value};
use wilower::lower::{CallingConvention, Dim, WorkItemQuery};
use wilower::metadata::{append_implicit_args, FunctionMetadata, ImplicitArgKind, STACK_CALL_ATTR};
use wilower::{lower_and_report, lower_module, parse_module, Module, PlatformConfig};

/// `group_id(d) * local_size(d) + local_id_x + global_offset(d)`, the
/// usual global-id computation, in a function of the given convention.
fn global_id_fn(name: &str, stack_call: bool, meta: &mut FunctionMetadata) -> Function {
    let mut func = Function::new(name, vec![Param::new("d", Type::I32)], Type::I64);
    if stack_call {
        func = func.with_attribute(STACK_CALL_ATTR);
    } else {
        append_implicit_args(
            &mut func,
            meta,
            &[
                ImplicitArgKind::R0,
                ImplicitArgKind::PayloadHeader,
                ImplicitArgKind::LocalSize,
                ImplicitArgKind::LocalIdX,
            ],
        );
    }
    let entry = func.entry();
    let mut b = Builder::at_end(&mut func, entry);
    let d = Value::Param(0);
    let group = b.call(
        WorkItemQuery::GroupId.callee(),
        vec![d.clone()],
        Type::I64,
        "group",
    );
    let size = b.call(
        WorkItemQuery::LocalSize.callee(),
        vec![d.clone()],
        Type::I64,
        "size",
    );
    let lid = b.call(
        WorkItemQuery::LocalId(Dim::X).callee(),
        Vec::new(),
        Type::I64,
        "lid",
    );
    let offset = b.call(
        WorkItemQuery::GlobalOffset.callee(),
        vec![d],
        Type::I64,
        "offset",
    );
    let base = b.mul(group, size, "base");
    let id = b.add(base, lid, "id");
    let id = b.add(id, offset, "gid");
    b.ret(Some(id));
    func
}

fn sample_module() -> Module {
    let mut module = Module::new("sample");
    let mut kernel_meta = FunctionMetadata::default();
    let kernel = global_id_fn("kernel", false, &mut kernel_meta);
    let mut helper_meta = FunctionMetadata::default();
    let helper = global_id_fn("helper", true, &mut helper_meta);
    module.functions.push(kernel);
    module.functions.push(helper);
    module.metadata.insert("kernel", kernel_meta);
    module
}

fn assert_lowered(module: &Module) {
    let listing = module.to_string();
    assert!(
        !listing.contains("__builtin_IB_get_"),
        "queries survived:\n{}",
        listing
    );
}

#[test]
fn test_module_survives_json_and_lowers() {
    let json = serde_json::to_string(&sample_module()).unwrap();
    let mut module = parse_module(&json).unwrap();
    let stats = lower_and_report(&mut module, &PlatformConfig::xe_lp()).unwrap();

    assert_eq!(stats.len(), 2);
    assert_eq!(stats[0].function, "kernel");
    assert_eq!(stats[0].mode, Some(CallingConvention::ImplicitArgument));
    assert_eq!(stats[1].function, "helper");
    assert_eq!(stats[1].mode, Some(CallingConvention::IndirectStack));
    assert!(stats.iter().all(|s| s.total() == 4));
    assert_lowered(&module);
}

#[test]
fn test_both_conventions_agree() {
    let mut module = sample_module();
    lower_module(&mut module, &PlatformConfig::xe_lp()).unwrap();

    // work-item 5 of group (3, 0, 0) on a 16x1x1 group, SIMD 16
    let group = [3u32, 0, 0];
    let local_size = [16u32, 1, 1];
    let global_offset = [100u64, 0, 0];
    let lane = 5u16;
    let r0 = vec![0, group[0], 0, 0, 0, 0, group[1], group[2]];

    let kernel = module.function("kernel").unwrap();
    let mut payload = vec![0u64; 8];
    payload[..3].copy_from_slice(&global_offset);
    let kernel_out = Machine::new()
        .run(
            kernel,
            &[
                RtValue::int(32, 0),
                RtValue::vector(32, &r0.iter().map(|&v| u64::from(v)).collect::<Vec<_>>()),
                RtValue::vector(32, &payload),
                RtValue::vector(32, &local_size.map(u64::from)),
                RtValue::int(16, u64::from(lane)),
            ],
        )
        .unwrap();

    let table_base = 0x1000;
    let table = LocalIdTable::for_group(16, [16, 1, 1]);
    let mut buf = ImplicitArgsBuffer::new();
    buf.num_work_dim = 1;
    buf.simd_width = 16;
    buf.local_size = local_size;
    buf.global_size = [64, 1, 1];
    buf.global_offset = global_offset;
    buf.local_id_table_ptr = table_base;
    buf.group_count = [4, 1, 1];
    let helper = module.function("helper").unwrap();
    let helper_out = Machine::new()
        .with_side_buffer(buf.to_vec())
        .with_region(table_base, table.into_bytes())
        .with_r0(r0)
        .with_simd(16, lane)
        .run(helper, &[RtValue::int(32, 0)])
        .unwrap();

    let want = 3 * 16 + 5 + 100;
    assert_eq!(kernel_out.ret.and_then(|v| v.as_u64()), Some(want));
    assert_eq!(helper_out.ret.and_then(|v| v.as_u64()), Some(want));
}

#[test]
fn test_failure_names_the_function() {
    let mut module = sample_module();
    // bookkeeping claims more hidden arguments than the kernel has
    module
        .metadata
        .entry("helper")
        .implicit_args
        .extend([ImplicitArgKind::R0, ImplicitArgKind::WorkDim]);
    let err = lower_and_report(&mut module, &PlatformConfig::xe_lp()).unwrap_err();
    assert!(err.message.contains("@helper"), "{}", err.message);
    assert!(err.span.is_some());
}
