extern crate plcheck as pc;
extern crate pltree as pl;

use pc::test_helpers::*;
use pl::ast::{ExprShape, ParamMode, StatementKind};
use pl::hostsql::{CatalogEngine, Plan};
use pl::types::ScalarType;

fn slot(dno: pl::ast::Dno) -> ExprShape {
    ExprShape::Slot(dno)
}

fn lit(text: &str) -> ExprShape {
    ExprShape::Literal(text.to_owned())
}

fn call(name: &str, args: Vec<ExprShape>) -> ExprShape {
    ExprShape::Call {
        name: name.to_owned(),
        args,
    }
}

fn concat(args: Vec<ExprShape>) -> ExprShape {
    ExprShape::Op {
        name: "||".to_owned(),
        args,
    }
}

fn dyn_execute(line: u32, shape: ExprShape) -> pl::ast::Statement {
    stmt(
        line,
        StatementKind::DynExecute {
            query: expr(line, "q").with_shape(shape),
            params: vec![],
            into: None,
        },
    )
}

fn engine() -> CatalogEngine {
    let mut engine = CatalogEngine::new();
    engine.register("q", Plan::utility());
    engine
}

pub const INJECTION_ERRORS: &[(u32, u16, &str)] = &[
    (3, 0, "possible SQL injection in dynamic query"),
];

#[test]
fn concatenated_parameter_is_tainted() {
    let mut b = RoutineBuilder::void_function("f");
    let p = b.param("p", ParamMode::In, ScalarType::Text);
    let routine = b.build(vec![dyn_execute(
        3,
        concat(vec![lit("select * from "), slot(p)]),
    )]);

    let context = check_configured(&engine(), &routine, |config| {
        config.checker.security_warnings = true;
    });
    check_errors_match(&context, INJECTION_ERRORS);
}

#[test]
fn security_warnings_off_by_default() {
    let mut b = RoutineBuilder::void_function("f");
    let p = b.param("p", ParamMode::In, ScalarType::Text);
    let routine = b.build(vec![dyn_execute(
        3,
        concat(vec![lit("select * from "), slot(p)]),
    )]);

    let context = check_routine_for_test(&engine(), &routine);
    check_errors_match(&context, NO_ERRORS);
}

#[test]
fn quote_ident_sanitizes() {
    let mut b = RoutineBuilder::void_function("f");
    let p = b.param("p", ParamMode::In, ScalarType::Text);
    let routine = b.build(vec![dyn_execute(
        3,
        concat(vec![lit("select * from "), call("quote_ident", vec![slot(p)])]),
    )]);

    let context = check_configured(&engine(), &routine, |config| {
        config.checker.security_warnings = true;
    });
    check_errors_match(&context, NO_ERRORS);
}

#[test]
fn format_identifier_conversions_sanitize() {
    let mut b = RoutineBuilder::void_function("f");
    let p = b.param("p", ParamMode::In, ScalarType::Text);
    let routine = b.build(vec![dyn_execute(
        3,
        call("format", vec![lit("select * from %I"), slot(p)]),
    )]);

    let context = check_configured(&engine(), &routine, |config| {
        config.checker.security_warnings = true;
    });
    check_errors_match(&context, NO_ERRORS);
}

#[test]
fn format_string_conversion_passes_taint() {
    let mut b = RoutineBuilder::void_function("f");
    let p = b.param("p", ParamMode::In, ScalarType::Text);
    let routine = b.build(vec![dyn_execute(
        3,
        call("format", vec![lit("select '%s'"), slot(p)]),
    )]);

    let context = check_configured(&engine(), &routine, |config| {
        config.checker.security_warnings = true;
    });
    check_errors_match(&context, INJECTION_ERRORS);
}

#[test]
fn sanitizing_assignment_clears_the_slot() {
    let mut b = RoutineBuilder::void_function("f");
    let p = b.param("p", ParamMode::In, ScalarType::Text);
    let routine = b.build(vec![
        stmt(
            2,
            StatementKind::Assign {
                target: p,
                value: expr(2, "quoted")
                    .with_shape(call("quote_literal", vec![slot(p)])),
            },
        ),
        dyn_execute(3, slot(p)),
    ]);

    let mut engine = CatalogEngine::new();
    engine.register("q", Plan::utility());
    engine.register("quoted", Plan::scalar(ScalarType::Text));
    let context = check_configured(&engine, &routine, |config| {
        config.checker.security_warnings = true;
    });
    check_errors_match(&context, NO_ERRORS);
}

#[test]
fn constants_tracing_off_keeps_the_slot_suspect() {
    let mut b = RoutineBuilder::void_function("f");
    let p = b.param("p", ParamMode::In, ScalarType::Text);
    let routine = b.build(vec![
        stmt(
            2,
            StatementKind::Assign {
                target: p,
                value: expr(2, "quoted")
                    .with_shape(call("quote_literal", vec![slot(p)])),
            },
        ),
        dyn_execute(3, slot(p)),
    ]);

    let mut engine = CatalogEngine::new();
    engine.register("q", Plan::utility());
    engine.register("quoted", Plan::scalar(ScalarType::Text));
    let context = check_configured(&engine, &routine, |config| {
        config.checker.security_warnings = true;
        config.checker.constants_tracing = false;
    });
    check_errors_match(&context, INJECTION_ERRORS);
}

#[test]
fn taint_flows_through_a_local_variable() {
    let mut b = RoutineBuilder::void_function("f");
    let p = b.param("p", ParamMode::In, ScalarType::Text);
    let v = b.var(2, "v", ScalarType::Text);
    let routine = b.build(vec![
        stmt(
            3,
            StatementKind::Assign {
                target: v,
                value: expr(3, "built")
                    .with_shape(concat(vec![lit("select * from "), slot(p)])),
            },
        ),
        dyn_execute(4, slot(v)),
    ]);

    let mut engine = CatalogEngine::new();
    engine.register("q", Plan::utility());
    engine.register("built", Plan::scalar(ScalarType::Text));
    let context = check_configured(&engine, &routine, |config| {
        config.checker.security_warnings = true;
    });
    check_errors_match(
        &context,
        &[(4, 0, "possible SQL injection in dynamic query")],
    );
}

#[test]
fn locals_assigned_clean_values_stay_clean() {
    let mut b = RoutineBuilder::void_function("f");
    let v = b.var(2, "v", ScalarType::Text);
    let routine = b.build(vec![
        stmt(
            3,
            StatementKind::Assign {
                target: v,
                value: expr(3, "built").with_shape(lit("select * from t")),
            },
        ),
        dyn_execute(4, slot(v)),
    ]);

    let mut engine = CatalogEngine::new();
    engine.register("q", Plan::utility());
    engine.register("built", Plan::scalar(ScalarType::Text));
    let context = check_configured(&engine, &routine, |config| {
        config.checker.security_warnings = true;
    });
    check_errors_match(&context, NO_ERRORS);
}

#[test]
fn shapeless_queries_fall_back_to_references() {
    let mut b = RoutineBuilder::void_function("f");
    let p = b.param("p", ParamMode::In, ScalarType::Text);
    let routine = b.build(vec![stmt(
        3,
        StatementKind::DynExecute {
            query: expr(3, "q").with_refs(&[p]),
            params: vec![],
            into: None,
        },
    )]);

    let context = check_configured(&engine(), &routine, |config| {
        config.checker.security_warnings = true;
    });
    check_errors_match(&context, INJECTION_ERRORS);
}

#[test]
fn non_string_parameters_are_not_suspect() {
    let mut b = RoutineBuilder::void_function("f");
    let n = b.param("n", ParamMode::In, ScalarType::Int4);
    let routine = b.build(vec![dyn_execute(
        3,
        concat(vec![lit("select * from t limit "), slot(n)]),
    )]);

    let context = check_configured(&engine(), &routine, |config| {
        config.checker.security_warnings = true;
    });
    check_errors_match(&context, NO_ERRORS);
}
