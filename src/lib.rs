//! Work-item intrinsic lowering for GPU kernel IR.
//!
//! Kernels discover their execution coordinates through builtin calls
//! (`__builtin_IB_get_local_id_x`, `__builtin_IB_get_group_id`, ...). This
//! crate rewrites those calls into reads of compiler-appended hidden
//! parameters or of the runtime's dispatch side buffer, depending on the
//! calling convention of each function.

pub mod config;
pub mod diagnostic;
pub mod dispatch;
pub mod ir;
pub mod lower;
pub mod metadata;

pub use config::PlatformConfig;
pub use ir::{Function, Module};
pub use lower::{
    lower_module, run_on_module, FunctionPass, LowerError, LoweringStats, WorkItemResolution,
};

use diagnostic::Diagnostic;

/// Parse a module from its JSON form. Errors point at the offending
/// position of `source`.
pub fn parse_module(source: &str) -> Result<Module, Diagnostic> {
    serde_json::from_str(source).map_err(|e| {
        let offset = line_col_offset(source, e.line(), e.column());
        Diagnostic::error(
            format!("invalid module: {}", e),
            Some(offset..(offset + 1).min(source.len()).max(offset)),
        )
    })
}

/// Lower every work-item query in `module`, rendering a failure to stderr
/// against the offending function's listing.
pub fn lower_and_report(
    module: &mut Module,
    platform: &PlatformConfig,
) -> Result<Vec<LoweringStats>, Diagnostic> {
    lower_module(module, platform).map_err(|err| {
        let (diag, listing) = Diagnostic::from_lower_error(&err, module);
        diag.render(&format!("@{}", err.function()), &listing);
        diag
    })
}

/// Byte offset of a 1-based line/column position, clamped to `source`.
fn line_col_offset(source: &str, line: usize, column: usize) -> usize {
    let line_start: usize = source
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    (line_start + column.saturating_sub(1)).min(source.len())
}
