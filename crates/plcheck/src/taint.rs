//! SQL-injection-shaped taint analysis for dynamic query construction.
//!
//! A value is tainted when it derives from externally supplied string
//! input without passing through a sanitizing operation; assignments carry
//! taint into local variables. Dynamic-SQL construction sites warn when
//! their query text is tainted.

use pl::ast::{Dno, ExprShape, Expression, ParamMode};
use pl::{Category, PlError};

use crate::CheckState;

/// Sanitizing primitives: their results are always safe to splice into a
/// query string.
fn is_sanitizer(name: &str) -> bool {
    matches!(name, "quote_ident" | "quote_literal" | "quote_nullable")
}

impl<'o> CheckState<'o> {
    /// Report on a dynamic-SQL construction site whose query expression is
    /// tainted.
    pub(crate) fn check_dynamic_query(&mut self, expr: &Expression) {
        if !self.enabled(Category::Security) {
            return;
        }
        let tainted = match &expr.shape {
            Some(shape) => self.is_tainted(shape),
            // without a structural form, fall back to the reference list
            None => expr.refs.iter().any(|&dno| self.slot_is_suspect(dno)),
        };
        if tainted {
            PlError::warning(
                Category::Security,
                expr.location,
                "possible SQL injection in dynamic query",
            )
            .with_errortype("sql_injection")
            .with_note(
                expr.location,
                "sanitize inputs with quote_ident, quote_literal, or format with %I and %L",
            )
            .register(self.context);
        }
    }

    /// Update the taint-clean set after an assignment, when constants
    /// tracing is enabled.
    pub(crate) fn trace_assignment(&mut self, target: Dno, expr: &Expression) {
        if !self.opts.constants_tracing {
            return;
        }
        guard!(let Some(shape) = &expr.shape else { return });
        if self.is_tainted(shape) {
            self.tracker.safe.remove(target);
        } else {
            self.tracker.safe.insert(target);
        }
    }

    /// Recursive taint classification of one expression node.
    fn is_tainted(&self, shape: &ExprShape) -> bool {
        match shape {
            ExprShape::Literal(_) => false,
            ExprShape::Slot(dno) => self.slot_is_suspect(*dno),
            ExprShape::Call { name, args } => {
                if is_sanitizer(name) {
                    return false;
                }
                if name == "format" {
                    return self.format_is_tainted(args);
                }
                args.iter().any(|arg| self.is_tainted(arg))
            }
            ExprShape::Op { args, .. } => args.iter().any(|arg| self.is_tainted(arg)),
        }
    }

    /// A string-category slot holding externally supplied input: either a
    /// non-output parameter, or a local that a tainted value was written
    /// into. The `safe` set clears either kind.
    fn slot_is_suspect(&self, dno: Dno) -> bool {
        if self.tracker.safe.contains(dno) {
            return false;
        }
        let is_string = match self.routine.variable(dno).and_then(|var| var.ty.scalar()) {
            Some(scalar) => scalar.is_string(),
            None => false,
        };
        if !is_string {
            return false;
        }
        match self.routine.parameter(dno) {
            Some(param) => param.mode != ParamMode::Out,
            // without constants tracing there is no safe set to consult,
            // so locals are not classified at all
            None => self.opts.constants_tracing && self.tracker.modified.contains(dno),
        }
    }

    /// A `format(...)` call is clean when every `%s`-style conversion
    /// consumes a clean argument; `%I` and `%L` sanitize their argument.
    /// Requires the format string to be a visible literal, which is what
    /// constants tracing provides.
    fn format_is_tainted(&self, args: &[ExprShape]) -> bool {
        let fmt = match args.first() {
            Some(ExprShape::Literal(fmt)) if self.opts.constants_tracing => fmt,
            // unknown format string: conservatively taint-propagating
            _ => return args.iter().any(|arg| self.is_tainted(arg)),
        };
        let rest = &args[1..];
        let mut next_arg = 0usize;
        let mut chars = fmt.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '%' {
                continue;
            }
            // skip positional / width specifiers like %2$s or %-10L
            let mut conversion = None;
            while let Some(&next) = chars.peek() {
                chars.next();
                if next.is_ascii_digit() || next == '$' || next == '-' {
                    continue;
                }
                conversion = Some(next);
                break;
            }
            match conversion {
                Some('%') => {}
                Some('I') | Some('L') => {
                    next_arg += 1;
                }
                Some('s') => {
                    if let Some(arg) = rest.get(next_arg) {
                        if self.is_tainted(arg) {
                            return true;
                        }
                    }
                    next_arg += 1;
                }
                // malformed conversion; the engine will reject it at
                // runtime, nothing to prove here
                _ => {}
            }
        }
        false
    }
}
