//! The expression checker: plan compilation through the host engine,
//! usage recording, and assignment-compatibility rules.

use std::rc::Rc;

use pl::ast::{Dno, Expression, Volatility};
use pl::hostsql::Plan;
use pl::types::{find_cast, CastContext, PlType, RowDescriptor, ScalarType};
use pl::{Category, Location, PlError};

use crate::{CheckError, CheckState};

impl<'o> CheckState<'o> {
    /// Compile `expr` via the host engine (idempotent; the plan is cached
    /// on the expression), record referenced slots, and run the volatility
    /// cross-checks.
    ///
    /// Returns `None` when compilation failed and the failure was
    /// recovered into a diagnostic at the expression's scope boundary.
    pub(crate) fn check_expr(&mut self, expr: &Expression) -> Result<Option<Rc<Plan>>, CheckError> {
        let plan = match expr.cached_plan() {
            Some(plan) => plan,
            None => match self.engine.prepare(&expr.text) {
                Ok(plan) => {
                    expr.cache_plan(plan.clone());
                    plan
                }
                Err(err) => {
                    let diag = PlError::new(expr.location, err.message)
                        .with_errortype("sql_error")
                        .with_note(expr.location, format!("SQLSTATE {}", err.sqlstate));
                    self.recover(diag)?;
                    return Ok(None);
                }
            },
        };

        for &dno in expr.refs.iter() {
            self.tracker.record(dno, false);
        }
        for &dno in plan.params.iter() {
            self.tracker.record(dno, false);
        }
        if let Some(target) = expr.target {
            self.tracker.record(target, true);
        }

        self.check_volatility(expr, &plan)?;
        Ok(Some(plan))
    }

    fn check_volatility(&mut self, expr: &Expression, plan: &Plan) -> Result<(), CheckError> {
        let volatility = self.routine.volatility;
        if volatility == Volatility::Volatile {
            return Ok(());
        }
        if !self.engine.is_read_only(plan) {
            let declared = if volatility == Volatility::Immutable {
                "IMMUTABLE"
            } else {
                "STABLE"
            };
            self.recover(
                PlError::new(
                    expr.location,
                    format!("{} function cannot execute SQL that modifies data", declared),
                )
                .with_errortype("read_only_violation"),
            )?;
        }
        if volatility == Volatility::Immutable {
            if self.engine.contains_volatile_calls(plan) {
                self.warn(
                    Category::Compatibility,
                    expr.location,
                    "volatile_in_immutable",
                    "volatile function call inside an immutable function".to_owned(),
                );
            }
            if !self.engine.referenced_relations(plan).is_empty() {
                self.warn(
                    Category::Compatibility,
                    expr.location,
                    "relation_in_immutable",
                    "immutable function references a relation".to_owned(),
                );
            }
        }
        Ok(())
    }

    /// Check an assignment of `expr` into slot `target`.
    pub(crate) fn check_assignment(
        &mut self,
        target: Dno,
        expr: &Expression,
    ) -> Result<(), CheckError> {
        let target_ty = self.slot_type(target, expr.location)?;
        // the slot is written even when the right-hand side fails to compile
        self.tracker.record(target, true);
        let plan = match self.check_expr(expr)? {
            Some(plan) => plan,
            None => return Ok(()),
        };
        let desc = match self.engine.result_descriptor(&plan) {
            Some(desc) => desc,
            None => return Ok(()),
        };
        self.assign_value(expr.location, &target_ty, &desc, plan.is_null)
    }

    /// Validate an expression against an expected type (RETURN and
    /// friends).
    pub(crate) fn check_expr_as(
        &mut self,
        expr: &Expression,
        expected: &PlType,
    ) -> Result<(), CheckError> {
        let plan = match self.check_expr(expr)? {
            Some(plan) => plan,
            None => return Ok(()),
        };
        let desc = match self.engine.result_descriptor(&plan) {
            Some(desc) => desc,
            None => return Ok(()),
        };
        self.assign_value(expr.location, expected, &desc, plan.is_null)
    }

    /// Look up a slot's declared type; an unknown `dno` means the input
    /// tree itself is malformed.
    pub(crate) fn slot_type(&self, dno: Dno, location: Location) -> Result<PlType, CheckError> {
        match self.routine.variable(dno) {
            Some(var) => Ok(var.ty.clone()),
            None => Err(CheckError::Structural(PlError::new(
                location,
                format!("reference to nonexistent variable slot {}", dno),
            ))),
        }
    }

    /// Run the assignment-compatibility rules for a query result landing
    /// in a target of the given type.
    pub(crate) fn assign_value(
        &mut self,
        location: Location,
        target: &PlType,
        desc: &RowDescriptor,
        is_null: bool,
    ) -> Result<(), CheckError> {
        match target {
            // an untyped record takes the shape of whatever it is given
            PlType::Record => Ok(()),
            PlType::Row(target_desc) => self.assign_composite(location, target_desc, desc),
            PlType::Scalar(_) | PlType::Array(_) => {
                let value = desc.value_type();
                if value.is_composite() {
                    return self.recover(
                        PlError::new(
                            location,
                            format!("cannot assign composite value to \"{}\"", target.name()),
                        )
                        .with_errortype("composite_to_scalar"),
                    );
                }
                self.assign_scalar(location, target, &value, is_null);
                Ok(())
            }
        }
    }

    /// Scalar assignment compatibility against the cast catalog.
    pub(crate) fn assign_scalar(
        &mut self,
        location: Location,
        target: &PlType,
        value: &PlType,
        is_null: bool,
    ) {
        if target == value {
            return;
        }
        let (t, v) = match (target, value) {
            (PlType::Array(t), PlType::Array(v)) => {
                return self.assign_scalar(location, t, v, is_null);
            }
            (PlType::Scalar(t), PlType::Scalar(v)) => (*t, *v),
            _ => {
                self.no_coercion(location, target, value);
                return;
            }
        };
        match find_cast(v, t) {
            // untyped literals are resolved losslessly against the target
            Some(CastContext::Implicit) if v == ScalarType::Unknown => {}
            Some(CastContext::Implicit) | Some(CastContext::Assignment) => {
                if !is_null && self.enabled(Category::Performance) {
                    PlError::warning(
                        Category::Performance,
                        location,
                        format!("hidden cast from {} to {} can be a performance issue", v, t),
                    )
                    .with_errortype("hidden_cast")
                    .with_note(location, "consider an explicit cast or matching declared types")
                    .register(self.context);
                }
            }
            Some(CastContext::Explicit) => {
                self.warn(
                    Category::Other,
                    location,
                    "assignment_cast",
                    format!("no assignment cast from {} to {}", v, t),
                );
            }
            None => self.no_coercion(location, target, value),
        }
    }

    fn no_coercion(&mut self, location: Location, target: &PlType, value: &PlType) {
        if self.enabled(Category::Other) {
            PlError::warning(
                Category::Other,
                location,
                format!(
                    "no possible coercion from {} to {}, possibly a bug",
                    value.name(),
                    target.name()
                ),
            )
            .with_errortype("no_coercion")
            .register(self.context);
        }
    }

    /// Positional composite assignment, skipping dropped columns on both
    /// sides.
    pub(crate) fn assign_composite(
        &mut self,
        location: Location,
        target: &RowDescriptor,
        value: &RowDescriptor,
    ) -> Result<(), CheckError> {
        let target_cols: Vec<_> = target.live_columns().collect();
        let value_cols: Vec<_> = value.live_columns().collect();
        if value_cols.len() < target_cols.len() {
            self.warn(
                Category::Other,
                location,
                "attribute_count",
                "too few attributes for composite target".to_owned(),
            );
        } else if value_cols.len() > target_cols.len() {
            self.warn(
                Category::Other,
                location,
                "attribute_count",
                "too many attributes for composite target".to_owned(),
            );
        }
        for (tc, vc) in target_cols.iter().zip(value_cols.iter()) {
            match (&tc.ty, &vc.ty) {
                (PlType::Row(t), PlType::Row(v)) => {
                    self.assign_composite(location, t, v)?;
                }
                (PlType::Record, _) | (_, PlType::Record) => {}
                (t, v) if v.is_composite() => {
                    self.recover(
                        PlError::new(
                            location,
                            format!("cannot assign composite value to \"{}\"", t.name()),
                        )
                        .with_errortype("composite_to_scalar"),
                    )?;
                }
                (t, v) => self.assign_scalar(location, t, v, false),
            }
        }
        Ok(())
    }
}
