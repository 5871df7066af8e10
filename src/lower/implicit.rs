//! Hidden-argument resolver.
//!
//! Hidden parameters are the trailing `N` formals of a function, in
//! canonical order. The `i`-th recorded kind is formal `P - N + i`.

use crate::ir::{Function, InstId, Value};
use crate::metadata::{FunctionMetadata, ImplicitArgKind};

use super::LowerError;

/// Formal-parameter index of the `index`-th of `hidden` trailing
/// parameters, or `None` when the bookkeeping cannot be right.
pub fn implicit_arg_position(params: usize, hidden: usize, index: usize) -> Option<usize> {
    if params < hidden || index >= hidden {
        return None;
    }
    Some(params - hidden + index)
}

/// The hidden arguments recorded for one function.
#[derive(Clone, Debug, Default)]
pub struct ImplicitArgs {
    kinds: Vec<ImplicitArgKind>,
}

impl ImplicitArgs {
    /// Read the function's bookkeeping and check it against the signature.
    pub fn new(func: &Function, meta: Option<&FunctionMetadata>) -> Result<Self, LowerError> {
        let kinds = meta.map(|m| m.implicit_args.clone()).unwrap_or_default();
        if func.params.len() < kinds.len() {
            return Err(LowerError::ImplicitArgCountMismatch {
                function: func.name.clone(),
                hidden: kinds.len(),
                params: func.params.len(),
            });
        }
        Ok(Self { kinds })
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }

    pub fn contains(&self, kind: ImplicitArgKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Formal-parameter index carrying `kind`, if it was appended.
    pub fn position(&self, func: &Function, kind: ImplicitArgKind) -> Option<u32> {
        let index = self.kinds.iter().position(|k| *k == kind)?;
        implicit_arg_position(func.params.len(), self.kinds.len(), index).map(|p| p as u32)
    }

    /// The parameter carrying `kind`, for the query at `call`.
    pub fn param(
        &self,
        func: &Function,
        kind: ImplicitArgKind,
        call: InstId,
    ) -> Result<Value, LowerError> {
        self.position(func, kind)
            .map(Value::Param)
            .ok_or_else(|| LowerError::MissingImplicitArg {
                function: func.name.clone(),
                call,
                kind,
            })
    }
}
