use std::path::Path;
use std::process::{Command, Output};

use wilower::ir::{Builder, Function, Type};
use wilower::lower::WorkItemQuery;
use wilower::metadata::STACK_CALL_ATTR;
use wilower::Module;

fn wilower(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_wilower"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn write_module(dir: &Path, query: WorkItemQuery) -> String {
    let mut func = Function::new("helper", Vec::new(), Type::I32).with_attribute(STACK_CALL_ATTR);
    let entry = func.entry();
    let mut b = Builder::at_end(&mut func, entry);
    let v = b.call(query.callee(), Vec::new(), Type::I32, "q");
    b.ret(Some(v));
    let mut module = Module::new("cli");
    module.functions.push(func);

    let path = dir.join("module.json");
    std::fs::write(&path, serde_json::to_string_pretty(&module).unwrap()).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn test_cli_lower_prints_listing() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_module(dir.path(), WorkItemQuery::WorkDim);
    let out = wilower(&["lower", &input]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("define i32 @helper()"), "{}", stdout);
    assert!(stdout.contains("lshr"), "{}", stdout);
    assert!(!stdout.contains("__builtin_IB_get_work_dim"), "{}", stdout);
}

#[test]
fn test_cli_lower_json_output_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_module(dir.path(), WorkItemQuery::LocalThreadId);
    let output = dir.path().join("lowered.json");
    let out = wilower(&[
        "lower",
        &input,
        "--platform",
        "xe-hpc",
        "--emit",
        "json",
        "-o",
        &output.to_string_lossy(),
    ]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Lowered 1 queries"));

    let json = std::fs::read_to_string(&output).unwrap();
    let module = wilower::parse_module(&json).unwrap();
    let listing = module.to_string();
    assert!(listing.contains("get_r0 : <16 x i32>"), "{}", listing);
}

#[test]
fn test_cli_lower_reports_unsupported_query() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_module(dir.path(), WorkItemQuery::SyncBuffer);
    let out = wilower(&["lower", &input]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("indirect-stack"), "{}", stderr);
}

#[test]
fn test_cli_unknown_platform() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_module(dir.path(), WorkItemQuery::WorkDim);
    let out = wilower(&["lower", &input, "--platform", "xe-imaginary"]);
    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("xe-lp, xe-hpc"), "{}", stderr);
}

#[test]
fn test_cli_print_bad_json() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    std::fs::write(&path, "{ \"name\": ").unwrap();
    let out = wilower(&["print", &path.to_string_lossy()]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("invalid module"));
}

#[test]
fn test_cli_layout() {
    let out = wilower(&["layout"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("92 bytes"), "{}", stdout);
    assert!(stdout.contains("local_id_table"), "{}", stdout);
    // SIMD 32 threads step over 32 lanes of 3 dims of 2 bytes
    assert!(stdout.lines().any(|l| l.split_whitespace().eq(["32", "32", "192"])));
}
