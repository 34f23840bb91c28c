//! plcheck, a static analysis and typechecking engine for a PL/SQL-like
//! embedded procedural language.
//!
//! The checker walks a routine's statement tree without executing it,
//! computing per-statement closing guarantees (does every path RETURN or
//! raise?), cross-validating embedded SQL fragments against declared
//! variable types through the host engine, and tracking variable usage for
//! the unused / never-read / unmodified-output reports.

extern crate pltree as pl;
#[macro_use]
extern crate guard;

use std::fmt;

use pl::ast::*;
use pl::config::CheckerOptions;
use pl::hostsql::HostSqlEngine;
use pl::sqlstate::{SqlState, RAISE_EXCEPTION, RERAISE};
use pl::{Category, Context, Location, PlError};

mod closing;
pub use closing::{Closing, SqlStateSet};

mod expr;
mod taint;

mod usage;
pub use usage::{SlotSet, UsageTracker};

#[doc(hidden)] // Intended for the tests only.
pub mod test_helpers;

// ----------------------------------------------------------------------------
// Failures that abort a routine check

/// A failure that escaped the per-expression scope boundary.
#[derive(Debug)]
pub enum CheckError {
    /// An analysis error propagating because `fatal_errors` is configured.
    Fatal(PlError),
    /// The input tree itself is malformed (bad label reference, dangling
    /// slot number). Always aborts, regardless of configuration.
    Structural(PlError),
}

impl CheckError {
    pub fn into_inner(self) -> PlError {
        match self {
            CheckError::Fatal(e) => e,
            CheckError::Structural(e) => e,
        }
    }
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CheckError::Fatal(e) => write!(f, "fatal: {}", e),
            CheckError::Structural(e) => write!(f, "malformed routine tree: {}", e),
        }
    }
}

impl std::error::Error for CheckError {}

// ----------------------------------------------------------------------------
// Entry points

/// Check one routine, registering diagnostics to the context.
///
/// A fresh [`CheckState`] is created per invocation and discarded
/// afterwards; no mutable state survives between checks.
pub fn check_routine(
    context: &Context,
    engine: &dyn HostSqlEngine,
    routine: &Routine,
) -> Result<(), CheckError> {
    let opts = context.config().checker;
    let mut state = CheckState {
        context,
        engine,
        routine,
        opts,
        tracker: UsageTracker::for_routine(routine),
        has_dynamic_return_query: false,
        labels: Vec::new(),
    };
    let closing = state.check_statement(&routine.body)?;
    state.report_missing_return(&closing)?;
    state
        .tracker
        .report(context, routine, &opts, state.has_dynamic_return_query);
    Ok(())
}

/// Run the checker over a set of routines, registering diagnostics to the
/// context.
pub fn run(context: &Context, engine: &dyn HostSqlEngine, routines: &[Routine]) {
    run_inner(context, engine, routines, false)
}

/// Run the checker, registering diagnostics and printing progress to
/// stdout.
pub fn run_cli(context: &Context, engine: &dyn HostSqlEngine, routines: &[Routine]) {
    run_inner(context, engine, routines, true)
}

pub(crate) fn run_inner(
    context: &Context,
    engine: &dyn HostSqlEngine,
    routines: &[Routine],
    cli: bool,
) {
    macro_rules! cli_println {
        ($($rest:tt)*) => {
            if cli { println!($($rest)*) }
        }
    }

    for routine in routines.iter() {
        cli_println!("Checking {}...", routine.name);
        if let Err(aborted) = check_routine(context, engine, routine) {
            aborted.into_inner().register(context);
        }
    }
}

// ----------------------------------------------------------------------------
// The statement walker

struct LabelFrame {
    label: Option<String>,
    is_loop: bool,
}

/// Per-check working state: the usage bitsets, the effective category
/// gates (global config plus any per-block directive overlays), and the
/// label stack for EXIT/CONTINUE resolution.
pub struct CheckState<'o> {
    pub(crate) context: &'o Context,
    pub(crate) engine: &'o dyn HostSqlEngine,
    pub(crate) routine: &'o Routine,
    pub(crate) opts: CheckerOptions,
    pub(crate) tracker: UsageTracker,
    pub(crate) has_dynamic_return_query: bool,
    labels: Vec<LabelFrame>,
}

impl<'o> CheckState<'o> {
    // ------------------------------------------------------------------------
    // Diagnostic plumbing

    pub(crate) fn enabled(&self, category: Category) -> bool {
        self.opts.category_enabled(category)
    }

    pub(crate) fn warn(
        &self,
        category: Category,
        location: Location,
        errortype: &'static str,
        desc: String,
    ) {
        if self.enabled(category) {
            PlError::warning(category, location, desc)
                .with_errortype(errortype)
                .register(self.context);
        }
    }

    /// The scoped failure boundary: convert a recoverable analysis error
    /// into a diagnostic and resume, or propagate it when `fatal_errors`
    /// is configured.
    pub(crate) fn recover(&mut self, err: PlError) -> Result<(), CheckError> {
        if self.opts.fatal_errors {
            Err(CheckError::Fatal(err))
        } else {
            err.register(self.context);
            Ok(())
        }
    }

    fn structural(&self, location: Location, desc: String) -> CheckError {
        CheckError::Structural(PlError::new(location, desc))
    }

    // ------------------------------------------------------------------------
    // Statement lists

    /// Fold a statement list left-to-right.
    ///
    /// Sequential composition is not the branch merge: a statement that
    /// always closes (RETURN, unconditional RAISE) closes the whole list
    /// no matter what came before it, since control that reaches it never
    /// falls past it. States of statements that may fall through are
    /// combined with the lattice merge.
    ///
    /// Once the accumulated state is closed, following statements are
    /// dead: one diagnostic is emitted at the next visible statement, but
    /// all of them are still visited, since diagnostics on dead code are
    /// still informative. Their states no longer contribute to the fold.
    fn check_list(&mut self, stmts: &[Statement]) -> Result<Closing, CheckError> {
        let mut acc = Closing::Unknown;
        let mut dead_reported = false;
        for stmt in stmts.iter() {
            let closed_before = acc.is_closed();
            if closed_before && !dead_reported {
                self.warn(
                    Category::Other,
                    stmt.location,
                    "unreachable_code",
                    "unreachable code".to_owned(),
                );
                dead_reported = true;
            }
            let state = self.check_statement(stmt)?;
            if !closed_before {
                if state.is_closed() {
                    acc = state;
                } else {
                    acc = acc.merge(state);
                }
            }
        }
        Ok(acc)
    }

    fn check_branch_fold(
        &mut self,
        arms: Vec<Closing>,
        else_state: Option<Closing>,
    ) -> Closing {
        let mut acc = Closing::Unknown;
        for state in arms {
            acc = acc.merge(state);
        }
        match else_state {
            Some(state) => acc.merge(state),
            // an implicit empty branch may not return
            None => acc.possibly(),
        }
    }

    // ------------------------------------------------------------------------
    // Statements

    fn check_statement(&mut self, stmt: &Statement) -> Result<Closing, CheckError> {
        let location = stmt.location;
        match &stmt.kind {
            StatementKind::Block {
                body,
                handlers,
                directives,
            } => {
                let saved = self.opts;
                for directive in directives.iter() {
                    self.opts.set_category(directive.category, directive.enable);
                }
                self.labels.push(LabelFrame {
                    label: stmt.label.clone(),
                    is_loop: false,
                });
                let result = self.check_block(body, handlers);
                self.labels.pop();
                self.opts = saved;
                result
            }

            StatementKind::If {
                branches,
                else_body,
            } => {
                let mut arm_states = Vec::with_capacity(branches.len());
                for (condition, body) in branches.iter() {
                    self.check_expr(condition)?;
                    arm_states.push(self.check_list(body)?);
                }
                let else_state = match else_body {
                    Some(body) => Some(self.check_list(body)?),
                    None => None,
                };
                Ok(self.check_branch_fold(arm_states, else_state))
            }

            StatementKind::Case {
                operand,
                arms,
                else_body,
            } => {
                if let Some(operand) = operand {
                    self.check_expr(operand)?;
                }
                let mut arm_states = Vec::with_capacity(arms.len());
                for (when_exprs, body) in arms.iter() {
                    for when_expr in when_exprs.iter() {
                        self.check_expr(when_expr)?;
                    }
                    arm_states.push(self.check_list(body)?);
                }
                let else_state = match else_body {
                    Some(body) => Some(self.check_list(body)?),
                    None => None,
                };
                Ok(self.check_branch_fold(arm_states, else_state))
            }

            StatementKind::Loop { body } => self.check_loop(stmt, body),

            StatementKind::While { condition, body } => {
                self.check_expr(condition)?;
                self.check_loop(stmt, body)
            }

            StatementKind::CountedFor {
                var,
                lower,
                upper,
                step,
                reverse: _,
                body,
            } => {
                self.check_expr(lower)?;
                self.check_expr(upper)?;
                if let Some(step) = step {
                    self.check_expr(step)?;
                }
                // the control variable is assigned by the loop itself
                self.tracker.record(*var, true);
                self.check_loop(stmt, body)
            }

            StatementKind::QueryFor {
                target,
                query,
                body,
            } => {
                let plan = self.check_expr(query)?;
                self.tracker.record(*target, true);
                if let Some(plan) = plan {
                    if let Some(desc) = self.engine.result_descriptor(&plan) {
                        let target_ty = self.slot_type(*target, query.location)?;
                        if target_ty.is_composite() {
                            self.assign_value(query.location, &target_ty, &desc, false)?;
                        }
                    }
                }
                self.check_loop(stmt, body)
            }

            StatementKind::CursorFor {
                target,
                cursor,
                args,
                body,
            } => {
                self.tracker.record(*cursor, false);
                if let Some(args) = args {
                    self.check_expr(args)?;
                }
                self.tracker.record(*target, true);
                self.check_loop(stmt, body)
            }

            StatementKind::DynamicFor {
                target,
                query,
                params,
                body,
            } => {
                self.check_expr(query)?;
                self.check_dynamic_query(query);
                for param in params.iter() {
                    self.check_expr(param)?;
                }
                self.tracker.record(*target, true);
                self.check_loop(stmt, body)
            }

            StatementKind::ForEachArray {
                target,
                array,
                body,
            } => {
                let plan = self.check_expr(array)?;
                self.tracker.record(*target, true);
                if let Some(plan) = plan {
                    if let Some(desc) = self.engine.result_descriptor(&plan) {
                        match desc.value_type() {
                            pl::types::PlType::Array(elem) => {
                                let target_ty = self.slot_type(*target, array.location)?;
                                self.assign_scalar(array.location, &target_ty, &elem, false);
                            }
                            pl::types::PlType::Scalar(pl::types::ScalarType::Unknown) => {}
                            _ => {
                                self.recover(
                                    PlError::new(
                                        array.location,
                                        "FOREACH expression must yield an array",
                                    )
                                    .with_errortype("foreach_array"),
                                )?;
                            }
                        }
                    }
                }
                self.check_loop(stmt, body)
            }

            StatementKind::Assign { target, value } => {
                self.check_assignment(*target, value)?;
                self.trace_assignment(*target, value);
                Ok(Closing::Unclosed)
            }

            StatementKind::Perform { query } => {
                self.check_expr(query)?;
                Ok(Closing::Unclosed)
            }

            StatementKind::Return { value } => {
                self.check_return_value(location, value.as_ref())?;
                Ok(Closing::Closed)
            }

            StatementKind::ReturnNext { value } => {
                self.check_return_value(location, Some(value))?;
                Ok(Closing::Closed)
            }

            StatementKind::ReturnQuery {
                query,
                dynamic,
                params,
            } => {
                if *dynamic {
                    self.has_dynamic_return_query = true;
                    self.check_dynamic_query(query);
                }
                let plan = self.check_expr(query)?;
                for param in params.iter() {
                    self.check_expr(param)?;
                }
                if !*dynamic {
                    if let (Some(plan), Some(expected)) = (plan, self.routine.return_type.clone())
                    {
                        if let Some(desc) = self.engine.result_descriptor(&plan) {
                            if expected.is_composite() {
                                self.assign_value(query.location, &expected, &desc, false)?;
                            }
                        }
                    }
                }
                Ok(Closing::Closed)
            }

            StatementKind::Raise {
                level,
                condition,
                message,
                args,
            } => {
                for arg in args.iter() {
                    self.check_expr(arg)?;
                }
                if *level < RaiseLevel::Exception {
                    return Ok(Closing::Unclosed);
                }
                let code = match condition {
                    Some(name) => match SqlState::resolve(name) {
                        Some(code) => code,
                        None => {
                            self.recover(
                                PlError::new(
                                    location,
                                    format!("unrecognized exception condition \"{}\"", name),
                                )
                                .with_errortype("unknown_condition"),
                            )?;
                            return Ok(Closing::Unclosed);
                        }
                    },
                    // a bare RAISE carries the sentinel until resolved
                    // against an enclosing handler
                    None if message.is_none() && args.is_empty() => RERAISE,
                    None => RAISE_EXCEPTION,
                };
                Ok(Closing::raise(code))
            }

            StatementKind::ExecSql { query, into } => {
                let plan = self.check_expr(query)?;
                if let Some(target) = into {
                    self.tracker.record(*target, true);
                    if let Some(plan) = plan {
                        if let Some(desc) = self.engine.result_descriptor(&plan) {
                            let target_ty = self.slot_type(*target, query.location)?;
                            self.assign_value(query.location, &target_ty, &desc, false)?;
                        }
                    }
                }
                Ok(Closing::Unclosed)
            }

            StatementKind::DynExecute {
                query,
                params,
                into,
            } => {
                self.check_expr(query)?;
                self.check_dynamic_query(query);
                for param in params.iter() {
                    self.check_expr(param)?;
                }
                if let Some(target) = into {
                    self.tracker.record(*target, true);
                }
                Ok(Closing::Unclosed)
            }

            StatementKind::Open {
                cursor,
                query,
                dynamic,
                params,
            } => {
                self.tracker.record(*cursor, true);
                if let Some(query) = query {
                    self.check_expr(query)?;
                }
                if let Some(dynamic) = dynamic {
                    self.check_expr(dynamic)?;
                    self.check_dynamic_query(dynamic);
                }
                for param in params.iter() {
                    self.check_expr(param)?;
                }
                Ok(Closing::Unclosed)
            }

            StatementKind::Fetch { cursor, targets } => {
                self.tracker.record(*cursor, false);
                for &target in targets.iter() {
                    self.tracker.record(target, true);
                }
                Ok(Closing::Unclosed)
            }

            StatementKind::Close { cursor } => {
                self.tracker.record(*cursor, false);
                Ok(Closing::Unclosed)
            }

            StatementKind::GetDiag { targets } => {
                for &target in targets.iter() {
                    self.tracker.record(target, true);
                }
                Ok(Closing::Unclosed)
            }

            StatementKind::Call { expr, target } => {
                self.check_expr(expr)?;
                if let Some(target) = target {
                    self.tracker.record(*target, true);
                }
                Ok(Closing::Unclosed)
            }

            StatementKind::Commit | StatementKind::Rollback => {
                if !self.routine.is_procedure {
                    self.recover(
                        PlError::new(
                            location,
                            format!("{} cannot be used inside a function", stmt.kind.name()),
                        )
                        .with_errortype("transaction_control"),
                    )?;
                }
                Ok(Closing::Unclosed)
            }

            StatementKind::Exit {
                is_exit,
                label,
                condition,
            } => {
                if let Some(condition) = condition {
                    self.check_expr(condition)?;
                }
                self.resolve_exit_label(location, *is_exit, label.as_deref())?;
                // loop-early-exit is folded conservatively: the EXIT
                // itself contributes no closing guarantee
                Ok(Closing::Unclosed)
            }

            StatementKind::Assert { condition, message } => {
                self.check_expr(condition)?;
                if let Some(message) = message {
                    self.check_expr(message)?;
                }
                Ok(Closing::Unclosed)
            }
        }
    }

    /// Loop statements: the body may execute zero times, so the loop's own
    /// result is its body's result degraded to at most possibly-closed.
    fn check_loop(&mut self, stmt: &Statement, body: &[Statement]) -> Result<Closing, CheckError> {
        self.labels.push(LabelFrame {
            label: stmt.label.clone(),
            is_loop: true,
        });
        let result = self.check_list(body);
        self.labels.pop();
        Ok(result?.possibly())
    }

    /// Blocks: fold the body, then resolve any exception section against
    /// the body's closing state.
    fn check_block(
        &mut self,
        body: &[Statement],
        handlers: &[ExceptionHandler],
    ) -> Result<Closing, CheckError> {
        let body_state = self.check_list(body)?;
        if handlers.is_empty() {
            return Ok(body_state);
        }
        self.mark_exception_pseudo_vars();

        match body_state {
            Closing::ClosedByRaise(mut raised) => {
                // Every raised code is dispatched to the first handler
                // matching it; the handler body is checked once, and its
                // re-raise sentinel resolves to the matched code.
                let mut acc = Closing::Unknown;
                for handler in handlers.iter() {
                    let handler_state = self.check_list(&handler.body)?;
                    let matched: Vec<SqlState> = raised
                        .iter()
                        .filter(|&code| handler.conditions.iter().any(|c| c.matches(code)))
                        .collect();
                    for code in matched {
                        raised.remove(code);
                        acc = acc.merge(handler_state.clone().resolve_reraise(code));
                    }
                }
                // unmatched codes keep the block's original contribution
                if !raised.is_empty() {
                    acc = acc.merge(Closing::ClosedByRaise(raised));
                }
                Ok(acc)
            }
            other => {
                // handlers are reachable regardless of how the body closes
                let mut acc = other;
                for handler in handlers.iter() {
                    let handler_state = self.check_list(&handler.body)?;
                    acc = acc.merge(handler_state);
                }
                Ok(acc)
            }
        }
    }

    /// SQLSTATE and SQLERRM exist as soon as an exception section does.
    fn mark_exception_pseudo_vars(&mut self) {
        let pseudo: Vec<Dno> = self
            .routine
            .variables
            .iter()
            .filter(|var| {
                var.flags.contains(SlotFlags::AUTO)
                    && (var.name.eq_ignore_ascii_case("sqlstate")
                        || var.name.eq_ignore_ascii_case("sqlerrm"))
            })
            .map(|var| var.dno)
            .collect();
        for dno in pseudo {
            self.tracker.record(dno, false);
        }
    }

    fn check_return_value(
        &mut self,
        location: Location,
        value: Option<&Expression>,
    ) -> Result<(), CheckError> {
        guard!(let Some(value) = value else { return Ok(()) });
        if self.routine.is_procedure {
            self.recover(
                PlError::new(location, "RETURN cannot have a parameter in a procedure")
                    .with_errortype("return_in_procedure"),
            )?;
            self.check_expr(value)?;
            return Ok(());
        }
        match self.routine.return_type.clone() {
            Some(expected) => self.check_expr_as(value, &expected),
            None => {
                self.recover(
                    PlError::new(location, "function returning void cannot return a value")
                        .with_errortype("void_return_value"),
                )?;
                self.check_expr(value)?;
                Ok(())
            }
        }
    }

    fn resolve_exit_label(
        &self,
        location: Location,
        is_exit: bool,
        label: Option<&str>,
    ) -> Result<(), CheckError> {
        match label {
            Some(label) => {
                let frame = self
                    .labels
                    .iter()
                    .rev()
                    .find(|frame| frame.label.as_deref() == Some(label));
                match frame {
                    Some(_) if is_exit => Ok(()),
                    Some(frame) if frame.is_loop => Ok(()),
                    Some(_) => Err(self.structural(
                        location,
                        format!("block label \"{}\" cannot be used in CONTINUE", label),
                    )),
                    None => Err(self.structural(
                        location,
                        format!(
                            "there is no label \"{}\" attached to any block or loop enclosing this statement",
                            label
                        ),
                    )),
                }
            }
            None => {
                if self.labels.iter().any(|frame| frame.is_loop) {
                    Ok(())
                } else if is_exit {
                    Err(self.structural(
                        location,
                        "EXIT cannot be used outside a loop, unless it has a label".to_owned(),
                    ))
                } else {
                    Err(self.structural(
                        location,
                        "CONTINUE cannot be used outside a loop".to_owned(),
                    ))
                }
            }
        }
    }

    /// The missing-RETURN diagnostic, driven by the root closing state.
    fn report_missing_return(&mut self, closing: &Closing) -> Result<(), CheckError> {
        if self.routine.is_procedure || self.routine.return_type.is_none() {
            return Ok(());
        }
        // routines with output parameters return them implicitly
        if self
            .routine
            .parameters
            .iter()
            .any(|p| p.mode != ParamMode::In)
        {
            return Ok(());
        }
        let location = self.routine.body.location;
        match closing {
            Closing::Unclosed | Closing::Unknown => self.recover(
                PlError::new(location, "control reached end of function without RETURN")
                    .with_errortype("missing_return"),
            ),
            Closing::PossiblyClosed => self.recover(
                PlError::new(location, "control reached end of function without RETURN")
                    .with_note(location, "some execution paths may fall off the end")
                    .with_errortype("missing_return"),
            ),
            Closing::Closed | Closing::ClosedByRaise(_) => Ok(()),
        }
    }
}
