extern crate plcheck as pc;
extern crate pltree as pl;

use pc::test_helpers::*;
use pl::ast::{ParamMode, StatementKind};
use pl::config::WarningLevel;
use pl::hostsql::{CatalogEngine, Plan};
use pl::types::ScalarType;
use pl::Severity;

pub const UNUSED_VARIABLE_ERRORS: &[(u32, u16, &str)] = &[(2, 0, "unused variable \"x\"")];

#[test]
fn unused_variable() {
    let mut b = RoutineBuilder::void_function("f");
    b.var(2, "x", ScalarType::Int4);
    let routine = b.build(vec![]);

    let engine = CatalogEngine::new();
    let context = check_routine_for_test(&engine, &routine);
    check_errors_match(&context, UNUSED_VARIABLE_ERRORS);
}

#[test]
fn unused_variable_suppressed_by_other_warnings() {
    let mut b = RoutineBuilder::void_function("f");
    b.var(2, "x", ScalarType::Int4);
    let routine = b.build(vec![]);

    let engine = CatalogEngine::new();
    let context = check_configured(&engine, &routine, |config| {
        config.checker.other_warnings = false;
    });
    check_errors_match(&context, NO_ERRORS);
}

#[test]
fn unused_variable_disabled_by_diagnostics_override() {
    let mut b = RoutineBuilder::void_function("f");
    b.var(2, "x", ScalarType::Int4);
    let routine = b.build(vec![]);

    let engine = CatalogEngine::new();
    let context = check_configured(&engine, &routine, |config| {
        config.set_diagnostic("unused_variable", WarningLevel::Disabled);
    });
    check_errors_match(&context, NO_ERRORS);
}

#[test]
fn unused_variable_reseveritied_to_error() {
    let mut b = RoutineBuilder::void_function("f");
    b.var(2, "x", ScalarType::Int4);
    let routine = b.build(vec![]);

    let engine = CatalogEngine::new();
    let context = check_configured(&engine, &routine, |config| {
        config.set_diagnostic("unused_variable", WarningLevel::Error);
    });
    check_errors_match(&context, UNUSED_VARIABLE_ERRORS);
    assert_eq!(context.errors()[0].severity(), Severity::Error);
}

#[test]
fn protected_and_auto_slots_are_exempt() {
    let mut b = RoutineBuilder::void_function("f");
    b.protected_var(2, "found", ScalarType::Bool);
    b.auto_var("sqlstate", ScalarType::Text);
    let routine = b.build(vec![]);

    let engine = CatalogEngine::new();
    let context = check_routine_for_test(&engine, &routine);
    check_errors_match(&context, NO_ERRORS);
}

pub const NEVER_READ_ERRORS: &[(u32, u16, &str)] = &[(2, 0, "never read variable \"x\"")];

#[test]
fn never_read_with_extra_on() {
    let mut b = RoutineBuilder::void_function("f");
    let x = b.var(2, "x", ScalarType::Int4);
    let routine = b.build(vec![assign(3, x, "1")]);

    let engine = CatalogEngine::new();
    let context = check_configured(&engine, &routine, |config| {
        config.checker.extra_warnings = true;
    });
    check_errors_match(&context, NEVER_READ_ERRORS);
}

#[test]
fn never_read_off_by_default() {
    let mut b = RoutineBuilder::void_function("f");
    let x = b.var(2, "x", ScalarType::Int4);
    let routine = b.build(vec![assign(3, x, "1")]);

    let engine = CatalogEngine::new();
    let context = check_routine_for_test(&engine, &routine);
    check_errors_match(&context, NO_ERRORS);
}

#[test]
fn reads_through_expression_refs() {
    let mut b = RoutineBuilder::void_function("f");
    let x = b.var(2, "x", ScalarType::Int4);
    let routine = b.build(vec![stmt(
        3,
        StatementKind::Perform {
            query: expr(3, "true").with_refs(&[x]),
        },
    )]);

    let engine = CatalogEngine::new();
    let context = check_routine_for_test(&engine, &routine);
    check_errors_match(&context, NO_ERRORS);
}

#[test]
fn reads_through_plan_parameters() {
    let mut b = RoutineBuilder::void_function("f");
    let x = b.var(2, "x", ScalarType::Int4);
    let mut plan = Plan::scalar(ScalarType::Bool);
    plan.params = vec![x];
    let routine = b.build(vec![stmt(
        3,
        StatementKind::Perform {
            query: expr(3, "x > 0"),
        },
    )]);

    let mut engine = CatalogEngine::new();
    engine.register("x > 0", plan);
    let context = check_routine_for_test(&engine, &routine);
    check_errors_match(&context, NO_ERRORS);
}

pub const PARAMETER_ERRORS: &[(u32, u16, &str)] = &[
    (1, 0, "parameter \"a\" is never used"),
    (1, 0, "unused parameter \"b\""),
    (1, 0, "unmodified OUT variable \"c\""),
];

#[test]
fn parameter_report_with_extra_on() {
    let mut b = RoutineBuilder::function("f", ScalarType::Int4);
    b.param("a", ParamMode::In, ScalarType::Int4);
    let p_b = b.param("b", ParamMode::In, ScalarType::Int4);
    b.param("c", ParamMode::Out, ScalarType::Int4);
    let routine = b.build(vec![assign(2, p_b, "1")]);

    let engine = CatalogEngine::new();
    let context = check_configured(&engine, &routine, |config| {
        config.checker.extra_warnings = true;
    });
    check_errors_match(&context, PARAMETER_ERRORS);
}

#[test]
fn parameter_report_off_by_default() {
    let mut b = RoutineBuilder::function("f", ScalarType::Int4);
    b.param("a", ParamMode::In, ScalarType::Int4);
    let p_b = b.param("b", ParamMode::In, ScalarType::Int4);
    b.param("c", ParamMode::Out, ScalarType::Int4);
    let routine = b.build(vec![assign(2, p_b, "1")]);

    let engine = CatalogEngine::new();
    let context = check_routine_for_test(&engine, &routine);
    check_errors_match(&context, NO_ERRORS);
}

#[test]
fn dynamic_return_query_downgrades_unmodified_out() {
    let mut b = RoutineBuilder::function("f", ScalarType::Int4);
    b.param("r", ParamMode::Out, ScalarType::Int4);
    let routine = b.build(vec![stmt(
        2,
        StatementKind::ReturnQuery {
            query: expr(2, "q"),
            dynamic: true,
            params: vec![],
        },
    )]);

    let mut engine = CatalogEngine::new();
    engine.register("q", Plan::utility());
    let context = check_configured(&engine, &routine, |config| {
        config.checker.extra_warnings = true;
    });
    check_errors_match(&context, &[(1, 0, "unmodified OUT variable \"r\"")]);
    assert_eq!(context.errors()[0].severity(), Severity::Info);
}
