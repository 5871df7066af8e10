//! Lowering throughput on synthetic modules.
//!
//! Measures:
//! 1. one function with many query call sites, per convention
//! 2. a module of many small functions (parallel driver)

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion};

use wilower::ir::{Builder, Function, Param, Type, Value};
use wilower::lower::{Dim, WorkItemQuery};
use wilower::metadata::{append_implicit_args, FunctionMetadata, ImplicitArgKind, STACK_CALL_ATTR};
use wilower::{lower_module, Module, PlatformConfig};

const QUERIES: [WorkItemQuery; 6] = [
    WorkItemQuery::GroupId,
    WorkItemQuery::LocalSize,
    WorkItemQuery::GlobalSize,
    WorkItemQuery::LocalId(Dim::X),
    WorkItemQuery::LocalId(Dim::Y),
    WorkItemQuery::WorkDim,
];

/// A function that calls `n` queries and sinks each result.
fn synthetic_function(name: &str, n: usize, stack_call: bool, meta: &mut FunctionMetadata) -> Function {
    let mut func = Function::new(name, vec![Param::new("d", Type::I32)], Type::Void);
    if stack_call {
        func = func.with_attribute(STACK_CALL_ATTR);
    } else {
        append_implicit_args(&mut func, meta, &ImplicitArgKind::ALL);
    }
    let entry = func.entry();
    let mut b = Builder::at_end(&mut func, entry);
    for i in 0..n {
        let query = QUERIES[i % QUERIES.len()];
        let args = if query.takes_dim() {
            vec![Value::Param(0)]
        } else {
            Vec::new()
        };
        let v = b.call(query.callee(), args, Type::I64, "");
        b.call("sink", vec![v], Type::Void, "");
    }
    b.ret(None);
    func
}

fn synthetic_module(functions: usize, calls: usize, stack_call: bool) -> Module {
    let mut module = Module::new("bench");
    for i in 0..functions {
        let name = format!("f{}", i);
        let mut meta = FunctionMetadata::default();
        let func = synthetic_function(&name, calls, stack_call, &mut meta);
        module.functions.push(func);
        module.metadata.insert(name, meta);
    }
    module
}

fn bench_single_function(c: &mut Criterion) {
    let platform = PlatformConfig::xe_lp();
    let implicit = synthetic_module(1, 600, false);
    let indirect = synthetic_module(1, 600, true);

    let mut group = c.benchmark_group("single_function");
    group.bench_function("implicit_argument_600", |b| {
        b.iter_batched(
            || implicit.clone(),
            |mut m| lower_module(black_box(&mut m), &platform),
            BatchSize::SmallInput,
        )
    });
    group.bench_function("indirect_stack_600", |b| {
        b.iter_batched(
            || indirect.clone(),
            |mut m| lower_module(black_box(&mut m), &platform),
            BatchSize::SmallInput,
        )
    });
    group.finish();
}

fn bench_module(c: &mut Criterion) {
    let platform = PlatformConfig::xe_hpc();
    let module = synthetic_module(256, 24, false);

    c.bench_function("module_256x24", |b| {
        b.iter_batched(
            || module.clone(),
            |mut m| lower_module(black_box(&mut m), &platform),
            BatchSize::LargeInput,
        )
    });
}

criterion_group!(benches, bench_single_function, bench_module);
criterion_main!(benches);
