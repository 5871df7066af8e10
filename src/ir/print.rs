//! Textual listing of functions.
//!
//! ```text
//! define i32 @kernel(i32 %dim, <8 x i32> %r0) #[stack-call] {
//! entry:
//!   %cmpDim.1 = icmp eq %dim, i32 0 : i1
//!   ret %groupId.4
//! }
//! ```

use std::collections::BTreeMap;
use std::fmt::Write;
use std::ops::Range;

use super::{Function, InstId, InstKind, Value};

/// A printed function plus the byte range each instruction occupies.
#[derive(Clone, Debug)]
pub struct Listing {
    pub text: String,
    pub spans: BTreeMap<InstId, Range<usize>>,
    /// Range of the `define` line.
    pub header: Range<usize>,
}

impl Listing {
    pub fn span_of(&self, id: InstId) -> Option<Range<usize>> {
        self.spans.get(&id).cloned()
    }
}

fn value_name(func: &Function, value: &Value) -> String {
    match value {
        Value::Param(i) => match func.params.get(*i as usize) {
            Some(p) if !p.name.is_empty() => format!("%{}", p.name),
            _ => format!("%arg{}", i),
        },
        Value::Inst(id) => inst_name(func, *id),
        Value::Const(c) => c.to_string(),
    }
}

fn inst_name(func: &Function, id: InstId) -> String {
    match func.inst(id) {
        Some(inst) if !inst.name.is_empty() => format!("%{}.{}", inst.name, id),
        _ => format!("%{}", id),
    }
}

fn operand_list(func: &Function, values: &[&Value]) -> String {
    values
        .iter()
        .map(|v| value_name(func, v))
        .collect::<Vec<_>>()
        .join(", ")
}

fn block_label(func: &Function, id: super::BlockId) -> String {
    match func.block(id) {
        Some(b) => format!("label %{}", b.name),
        None => format!("label %bb{}", id.0),
    }
}

fn render_inst(func: &Function, id: InstId) -> String {
    let Some(inst) = func.inst(id) else {
        return String::new();
    };
    let body = match &inst.kind {
        InstKind::Call { callee, args } => {
            let args: Vec<&Value> = args.iter().collect();
            format!("call @{}({})", callee, operand_list(func, &args))
        }
        InstKind::Intrinsic { intrinsic } => intrinsic.to_string(),
        InstKind::Binary { op, lhs, rhs } => format!("{} {}", op, operand_list(func, &[lhs, rhs])),
        InstKind::ICmp { pred, lhs, rhs } => {
            format!("icmp {} {}", pred, operand_list(func, &[lhs, rhs]))
        }
        InstKind::Select {
            cond,
            on_true,
            on_false,
        } => format!("select {}", operand_list(func, &[cond, on_true, on_false])),
        InstKind::Cast { op, value } => format!("{} {}", op, value_name(func, value)),
        InstKind::ExtractElement { vector, index } => {
            format!("extractelement {}", operand_list(func, &[vector, index]))
        }
        InstKind::InsertElement {
            vector,
            elem,
            index,
        } => format!("insertelement {}", operand_list(func, &[vector, elem, index])),
        InstKind::Load { ptr, align } => format!("load {}, align {}", value_name(func, ptr), align),
        InstKind::Br { target } => format!("br {}", block_label(func, *target)),
        InstKind::CondBr {
            cond,
            then_block,
            else_block,
        } => format!(
            "br {}, {}, {}",
            value_name(func, cond),
            block_label(func, *then_block),
            block_label(func, *else_block)
        ),
        InstKind::Ret { value: Some(v) } => format!("ret {}", value_name(func, v)),
        InstKind::Ret { value: None } => "ret void".to_string(),
    };
    if inst.kind.is_terminator() || inst.ty == super::Type::Void {
        body
    } else {
        format!("{} = {} : {}", inst_name(func, id), body, inst.ty)
    }
}

pub(super) fn listing(func: &Function) -> Listing {
    let mut text = String::new();
    let mut spans = BTreeMap::new();

    let params: Vec<String> = func
        .params
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{} {}", p.ty, value_name(func, &Value::Param(i as u32))))
        .collect();
    let _ = write!(text, "define {} @{}({})", func.ret, func.name, params.join(", "));
    if !func.attributes.is_empty() {
        let attrs: Vec<&str> = func.attributes.iter().map(|a| a.as_str()).collect();
        let _ = write!(text, " #[{}]", attrs.join(", "));
    }
    let header = 0..text.len();
    text.push_str(" {\n");

    for block in &func.blocks {
        let _ = writeln!(text, "{}:", block.name);
        for id in &block.insts {
            text.push_str("  ");
            let start = text.len();
            text.push_str(&render_inst(func, *id));
            spans.insert(*id, start..text.len());
            text.push('\n');
        }
    }
    text.push_str("}\n");

    Listing {
        text,
        spans,
        header,
    }
}
