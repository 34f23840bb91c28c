extern crate plcheck as pc;
extern crate pltree as pl;

use pc::test_helpers::*;
use pl::ast::StatementKind;
use pl::hostsql::CatalogEngine;
use pl::types::ScalarType;

fn exit(line: u32, label: Option<&str>) -> pl::ast::Statement {
    stmt(
        line,
        StatementKind::Exit {
            is_exit: true,
            label: label.map(str::to_owned),
            condition: None,
        },
    )
}

fn cont(line: u32, label: Option<&str>) -> pl::ast::Statement {
    stmt(
        line,
        StatementKind::Exit {
            is_exit: false,
            label: label.map(str::to_owned),
            condition: None,
        },
    )
}

#[test]
fn exit_outside_a_loop() {
    let routine = RoutineBuilder::void_function("f").build(vec![exit(2, None)]);

    let engine = CatalogEngine::new();
    let context = check_routine_for_test(&engine, &routine);
    check_errors_match(
        &context,
        &[(2, 0, "EXIT cannot be used outside a loop, unless it has a label")],
    );
}

#[test]
fn continue_outside_a_loop() {
    let routine = RoutineBuilder::void_function("f").build(vec![cont(2, None)]);

    let engine = CatalogEngine::new();
    let context = check_routine_for_test(&engine, &routine);
    check_errors_match(&context, &[(2, 0, "CONTINUE cannot be used outside a loop")]);
}

#[test]
fn exit_with_a_block_label() {
    let routine = RoutineBuilder::void_function("f").build(vec![stmt(
        2,
        StatementKind::Block {
            body: vec![exit(3, Some("b"))],
            handlers: Vec::new(),
            directives: Vec::new(),
        },
    )
    .with_label("b")]);

    let engine = CatalogEngine::new();
    let context = check_routine_for_test(&engine, &routine);
    check_errors_match(&context, NO_ERRORS);
}

#[test]
fn continue_with_a_block_label() {
    let routine = RoutineBuilder::void_function("f").build(vec![stmt(
        2,
        StatementKind::Block {
            body: vec![cont(3, Some("b"))],
            handlers: Vec::new(),
            directives: Vec::new(),
        },
    )
    .with_label("b")]);

    let engine = CatalogEngine::new();
    let context = check_routine_for_test(&engine, &routine);
    check_errors_match(
        &context,
        &[(3, 0, "block label \"b\" cannot be used in CONTINUE")],
    );
}

#[test]
fn unknown_label() {
    let routine = RoutineBuilder::void_function("f").build(vec![stmt(
        2,
        StatementKind::Loop {
            body: vec![exit(3, Some("missing"))],
        },
    )]);

    let engine = CatalogEngine::new();
    let context = check_routine_for_test(&engine, &routine);
    check_errors_match(
        &context,
        &[(
            3,
            0,
            "there is no label \"missing\" attached to any block or loop enclosing this statement",
        )],
    );
}

#[test]
fn exit_and_continue_inside_a_loop() {
    let routine = RoutineBuilder::void_function("f").build(vec![stmt(
        2,
        StatementKind::Loop {
            body: vec![cont(3, None), exit(4, None)],
        },
    )]);

    let engine = CatalogEngine::new();
    let context = check_routine_for_test(&engine, &routine);
    check_errors_match(&context, NO_ERRORS);
}

#[test]
fn continue_with_a_loop_label() {
    let routine = RoutineBuilder::void_function("f").build(vec![stmt(
        2,
        StatementKind::Loop {
            body: vec![cont(3, Some("outer"))],
        },
    )
    .with_label("outer")]);

    let engine = CatalogEngine::new();
    let context = check_routine_for_test(&engine, &routine);
    check_errors_match(&context, NO_ERRORS);
}

#[test]
fn dangling_slot_reference() {
    let routine = RoutineBuilder::void_function("f").build(vec![assign(2, 99, "1")]);

    let engine = CatalogEngine::new();
    let context = check_routine_for_test(&engine, &routine);
    check_errors_match(
        &context,
        &[(2, 0, "reference to nonexistent variable slot 99")],
    );
}

pub const TRANSACTION_CONTROL_ERRORS: &[(u32, u16, &str)] = &[
    (2, 0, "COMMIT cannot be used inside a function"),
];

#[test]
fn commit_in_a_function() {
    let routine = RoutineBuilder::void_function("f").build(vec![stmt(2, StatementKind::Commit)]);

    let engine = CatalogEngine::new();
    let context = check_routine_for_test(&engine, &routine);
    check_errors_match(&context, TRANSACTION_CONTROL_ERRORS);
}

#[test]
fn commit_in_a_procedure() {
    let routine = RoutineBuilder::procedure("p").build(vec![stmt(2, StatementKind::Commit)]);

    let engine = CatalogEngine::new();
    let context = check_routine_for_test(&engine, &routine);
    check_errors_match(&context, NO_ERRORS);
}

#[test]
fn fatal_errors_stops_at_the_first_error() {
    let mut b = RoutineBuilder::void_function("f");
    let x = b.var(2, "x", ScalarType::Int4);
    let routine = b.build(vec![assign(3, x, "bad one"), assign(4, x, "bad two")]);

    let engine = CatalogEngine::new();
    let context = check_configured(&engine, &routine, |config| {
        config.checker.fatal_errors = true;
    });
    check_errors_match(&context, &[(3, 0, "syntax error at or near \"bad one\"")]);
}

#[test]
fn errors_accumulate_by_default() {
    let mut b = RoutineBuilder::void_function("f");
    let x = b.var(2, "x", ScalarType::Int4);
    let routine = b.build(vec![assign(3, x, "bad one"), assign(4, x, "bad two")]);

    let engine = CatalogEngine::new();
    let context = check_routine_for_test(&engine, &routine);
    check_errors_match(
        &context,
        &[
            (3, 0, "syntax error at or near \"bad one\""),
            (4, 0, "syntax error at or near \"bad two\""),
        ],
    );
}
