use std::ops::Range;

use crate::ir::Module;
use crate::lower::LowerError;

/// A fatal compiler diagnostic.
///
/// Spans are byte ranges into the printed listing of a function, so a
/// lowering failure can point at the offending instruction.
#[derive(Clone, Debug)]
pub struct Diagnostic {
    pub message: String,
    pub span: Option<Range<usize>>,
    pub notes: Vec<String>,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(message: String, span: Option<Range<usize>>) -> Self {
        Self {
            message,
            span,
            notes: Vec::new(),
            help: None,
        }
    }

    pub fn with_note(mut self, note: String) -> Self {
        self.notes.push(note);
        self
    }

    pub fn with_help(mut self, help: String) -> Self {
        self.help = Some(help);
        self
    }

    /// Build the report for a lowering failure, together with the listing
    /// it points into.
    ///
    /// Returns the diagnostic and the source text its span refers to
    /// (the offending function's listing, or empty if the function is not
    /// in `module`).
    pub fn from_lower_error(err: &LowerError, module: &Module) -> (Self, String) {
        let Some(func) = module.function(err.function()) else {
            return (Self::error(err.to_string(), None), String::new());
        };
        let listing = func.listing();
        let span = err
            .call()
            .and_then(|call| listing.span_of(call))
            .unwrap_or_else(|| listing.header.clone());

        let mut diag = Self::error(err.to_string(), Some(span));
        match err {
            LowerError::ImplicitArgCountMismatch { .. } => {
                diag = diag
                    .with_note("hidden arguments are the trailing parameters".to_string())
                    .with_help(
                        "the hidden-argument bookkeeping and the signature disagree; \
                         re-run the analysis that appends them"
                            .to_string(),
                    );
            }
            LowerError::MissingImplicitArg { kind, .. } => {
                diag = diag.with_help(format!("append {} to @{}", kind, func.name));
            }
            LowerError::UnsupportedInMode { query, .. } => {
                diag = diag.with_note(format!(
                    "`{}` has no side-buffer source in stack-call functions",
                    query
                ));
            }
            LowerError::MalformedQuery { query, .. } => {
                diag = diag.with_note(format!("`{}` is `{}`", query, query.callee()));
            }
        }
        (diag, listing.text)
    }

    fn report<'a>(
        &'a self,
        filename: &'a str,
        color: bool,
    ) -> ariadne::Report<'a, (&'a str, Range<usize>)> {
        use ariadne::{Color, Config, Label, Report, ReportKind};

        let offset = self.span.as_ref().map(|s| s.start).unwrap_or(0);
        let mut report = Report::build(ReportKind::Error, filename, offset)
            .with_config(Config::default().with_color(color))
            .with_message(&self.message);

        if let Some(span) = &self.span {
            report = report.with_label(
                Label::new((filename, span.clone()))
                    .with_message(&self.message)
                    .with_color(Color::Red),
            );
        }

        for note in &self.notes {
            report = report.with_note(note);
        }

        if let Some(help) = &self.help {
            report = report.with_help(help);
        }

        report.finish()
    }

    /// Render the diagnostic to stderr using ariadne.
    pub fn render(&self, filename: &str, source: &str) {
        use ariadne::Source;

        let report = self.report(filename, true);
        if let Err(e) = report.eprint((filename, Source::from(source))) {
            eprintln!("error: {} (could not render diagnostic: {})", self.message, e);
        }
    }

    /// Render without colors, for tests and logs.
    pub fn render_to_string(&self, filename: &str, source: &str) -> String {
        use ariadne::Source;

        let mut out = Vec::new();
        let report = self.report(filename, false);
        if report
            .write((filename, Source::from(source)), &mut out)
            .is_err()
        {
            return self.message.clone();
        }
        String::from_utf8_lossy(&out).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Builder, Function, Type, Value};
    use crate::lower::WorkItemQuery;
    use crate::metadata::STACK_CALL_ATTR;

    fn stack_call_module() -> Module {
        let mut func =
            Function::new("kernel", Vec::new(), Type::I32).with_attribute(STACK_CALL_ATTR);
        let entry = func.entry();
        let mut b = Builder::at_end(&mut func, entry);
        let v = b.call(
            WorkItemQuery::StageInGridOrigin.callee(),
            vec![Value::i32(0)],
            Type::I32,
            "origin",
        );
        b.ret(Some(v));
        let mut module = Module::new("m");
        module.functions.push(func);
        module
    }

    #[test]
    fn test_error_construction() {
        let d = Diagnostic::error("bad call".to_string(), Some(10..15));
        assert_eq!(d.message, "bad call");
        assert_eq!(d.span, Some(10..15));
        assert!(d.notes.is_empty());
        assert!(d.help.is_none());
    }

    #[test]
    fn test_chained_builders() {
        let d = Diagnostic::error("hint".to_string(), None)
            .with_note("note 1".to_string())
            .with_help("help text".to_string())
            .with_note("note 2".to_string());
        assert_eq!(d.notes, vec!["note 1", "note 2"]);
        assert_eq!(d.help.as_deref(), Some("help text"));
    }

    #[test]
    fn test_lower_error_points_at_call() {
        let mut module = stack_call_module();
        let err = crate::lower::lower_module(&mut module, &crate::config::PlatformConfig::xe_lp())
            .unwrap_err();
        let (diag, source) = Diagnostic::from_lower_error(&err, &module);
        let span = diag.span.clone().unwrap();
        assert!(source[span].starts_with("%origin.0 = call @__builtin_IB_get_grid_origin"));
        assert_eq!(diag.notes.len(), 1);

        let text = diag.render_to_string("kernel.ir", &source);
        assert!(text.contains("cannot be lowered in indirect-stack mode"), "{}", text);
        assert!(text.contains("kernel.ir"), "{}", text);
        assert!(text.contains("Error:"), "{}", text);
    }

    #[test]
    fn test_mismatch_points_at_header() {
        let mut module = Module::new("m");
        module
            .functions
            .push(Function::new("short", Vec::new(), Type::Void));
        let err = LowerError::ImplicitArgCountMismatch {
            function: "short".to_string(),
            hidden: 1,
            params: 0,
        };
        let (diag, source) = Diagnostic::from_lower_error(&err, &module);
        assert_eq!(&source[diag.span.clone().unwrap()], "define void @short()");
        assert!(diag.help.is_some());
    }

    #[test]
    fn test_unknown_function_has_no_span() {
        let err = LowerError::ImplicitArgCountMismatch {
            function: "ghost".to_string(),
            hidden: 1,
            params: 0,
        };
        let (diag, source) = Diagnostic::from_lower_error(&err, &Module::new("m"));
        assert!(diag.span.is_none());
        assert!(source.is_empty());
        // rendering a span-less report must not panic
        diag.render_to_string("m.ir", &source);
    }
}
