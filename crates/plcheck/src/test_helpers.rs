//! Builders and assertion helpers shared by the test suites.
//!
//! The routine tree normally arrives from the external compiler; the tests
//! construct it directly through [`RoutineBuilder`] and drive the checker
//! against a [`CatalogEngine`] loaded with whatever fragments the test
//! needs.

use pl::ast::*;
use pl::config::Config;
use pl::hostsql::HostSqlEngine;
use pl::types::{PlType, RowDescriptor, ScalarType};
use pl::{Context, Location};

use crate::run_inner;

pub const NO_ERRORS: &[(u32, u16, &str)] = &[];

pub fn at(line: u32) -> Location {
    Location::line(line)
}

// ----------------------------------------------------------------------------
// Routine construction

pub struct RoutineBuilder {
    name: String,
    parameters: Vec<Parameter>,
    return_type: Option<PlType>,
    is_procedure: bool,
    volatility: Volatility,
    variables: Vec<Variable>,
    next_dno: Dno,
}

impl RoutineBuilder {
    pub fn function<S: Into<String>>(name: S, return_type: ScalarType) -> RoutineBuilder {
        RoutineBuilder::new(name, Some(PlType::Scalar(return_type)), false)
    }

    pub fn function_returning<S: Into<String>>(name: S, return_type: PlType) -> RoutineBuilder {
        RoutineBuilder::new(name, Some(return_type), false)
    }

    pub fn void_function<S: Into<String>>(name: S) -> RoutineBuilder {
        RoutineBuilder::new(name, None, false)
    }

    pub fn procedure<S: Into<String>>(name: S) -> RoutineBuilder {
        RoutineBuilder::new(name, None, true)
    }

    fn new<S: Into<String>>(
        name: S,
        return_type: Option<PlType>,
        is_procedure: bool,
    ) -> RoutineBuilder {
        RoutineBuilder {
            name: name.into(),
            parameters: Vec::new(),
            return_type,
            is_procedure,
            volatility: Volatility::default(),
            variables: Vec::new(),
            next_dno: 1,
        }
    }

    pub fn volatility(mut self, volatility: Volatility) -> RoutineBuilder {
        self.volatility = volatility;
        self
    }

    fn push_var(
        &mut self,
        line: u32,
        name: &str,
        kind: SlotKind,
        ty: PlType,
        flags: SlotFlags,
    ) -> Dno {
        let dno = self.next_dno;
        self.next_dno += 1;
        self.variables.push(Variable {
            dno,
            name: name.to_owned(),
            kind,
            ty,
            flags,
            location: at(line),
        });
        dno
    }

    pub fn param(&mut self, name: &str, mode: ParamMode, ty: ScalarType) -> Dno {
        let dno = self.push_var(
            1,
            name,
            SlotKind::Scalar,
            PlType::Scalar(ty),
            SlotFlags::EXPLICIT,
        );
        self.parameters.push(Parameter { dno, mode });
        dno
    }

    pub fn var(&mut self, line: u32, name: &str, ty: ScalarType) -> Dno {
        self.push_var(
            line,
            name,
            SlotKind::Scalar,
            PlType::Scalar(ty),
            SlotFlags::EXPLICIT,
        )
    }

    pub fn typed_var(&mut self, line: u32, name: &str, ty: PlType) -> Dno {
        let kind = match &ty {
            PlType::Record => SlotKind::Record,
            PlType::Row(_) => SlotKind::Row,
            _ => SlotKind::Scalar,
        };
        self.push_var(line, name, kind, ty, SlotFlags::EXPLICIT)
    }

    pub fn record_var(&mut self, line: u32, name: &str) -> Dno {
        self.push_var(line, name, SlotKind::Record, PlType::Record, SlotFlags::EXPLICIT)
    }

    pub fn row_var(&mut self, line: u32, name: &str, desc: RowDescriptor) -> Dno {
        self.push_var(
            line,
            name,
            SlotKind::Row,
            PlType::Row(desc),
            SlotFlags::EXPLICIT,
        )
    }

    pub fn auto_var(&mut self, name: &str, ty: ScalarType) -> Dno {
        self.push_var(1, name, SlotKind::Scalar, PlType::Scalar(ty), SlotFlags::AUTO)
    }

    pub fn protected_var(&mut self, line: u32, name: &str, ty: ScalarType) -> Dno {
        self.push_var(
            line,
            name,
            SlotKind::Scalar,
            PlType::Scalar(ty),
            SlotFlags::EXPLICIT | SlotFlags::PROTECTED,
        )
    }

    pub fn build(self, body: Vec<Statement>) -> Routine {
        self.build_with_handlers(body, Vec::new())
    }

    pub fn build_with_handlers(
        self,
        body: Vec<Statement>,
        handlers: Vec<ExceptionHandler>,
    ) -> Routine {
        Routine {
            name: self.name,
            parameters: self.parameters,
            return_type: self.return_type,
            is_procedure: self.is_procedure,
            volatility: self.volatility,
            variables: self.variables,
            body: Statement::new(
                0,
                at(1),
                StatementKind::Block {
                    body,
                    handlers,
                    directives: Vec::new(),
                },
            ),
        }
    }
}

// ----------------------------------------------------------------------------
// Statement shorthands

pub fn stmt(line: u32, kind: StatementKind) -> Statement {
    Statement::new(line, at(line), kind)
}

pub fn expr(line: u32, text: &str) -> Expression {
    Expression::new(at(line), text)
}

pub fn assign(line: u32, target: Dno, text: &str) -> Statement {
    stmt(
        line,
        StatementKind::Assign {
            target,
            value: expr(line, text),
        },
    )
}

pub fn ret(line: u32, text: &str) -> Statement {
    stmt(
        line,
        StatementKind::Return {
            value: Some(expr(line, text)),
        },
    )
}

pub fn ret_void(line: u32) -> Statement {
    stmt(line, StatementKind::Return { value: None })
}

pub fn raise_exception(line: u32, condition: &str) -> Statement {
    stmt(
        line,
        StatementKind::Raise {
            level: RaiseLevel::Exception,
            condition: Some(condition.to_owned()),
            message: None,
            args: Vec::new(),
        },
    )
}

pub fn raise_message(line: u32, message: &str) -> Statement {
    stmt(
        line,
        StatementKind::Raise {
            level: RaiseLevel::Exception,
            condition: None,
            message: Some(message.to_owned()),
            args: Vec::new(),
        },
    )
}

pub fn reraise(line: u32) -> Statement {
    stmt(
        line,
        StatementKind::Raise {
            level: RaiseLevel::Exception,
            condition: None,
            message: None,
            args: Vec::new(),
        },
    )
}

pub fn handler(conditions: Vec<HandlerCond>, body: Vec<Statement>) -> ExceptionHandler {
    ExceptionHandler {
        conditions,
        body,
        location: Location::default(),
    }
}

pub fn cond(name: &str) -> HandlerCond {
    HandlerCond::Code(pl::sqlstate::SqlState::resolve(name).expect("known condition"))
}

// ----------------------------------------------------------------------------
// Checking and assertions

pub fn check_routine_for_test(engine: &dyn HostSqlEngine, routine: &Routine) -> Context {
    let context = Context::default();
    run_inner(&context, engine, std::slice::from_ref(routine), false);
    context
}

/// Like [`check_routine_for_test`], but with a configuration hook applied
/// before the run.
pub fn check_configured<F: FnOnce(&mut Config)>(
    engine: &dyn HostSqlEngine,
    routine: &Routine,
    configure: F,
) -> Context {
    let context = Context::default();
    configure(&mut context.config_mut());
    run_inner(&context, engine, std::slice::from_ref(routine), false);
    context
}

pub fn check_errors_match(context: &Context, errorlist: &[(u32, u16, &str)]) {
    let errors = context.errors();
    let mut iter = errors.iter();
    for (line, column, desc) in errorlist {
        let nexterror_option = iter.next();
        match nexterror_option {
            Some(nexterror) => {
                if nexterror.location().line != *line
                    || nexterror.location().column != *column
                    || nexterror.description() != *desc
                {
                    panic!(
                        "possible feature regression in plcheck, expected {}:{}:{}, found {}:{}:{}",
                        *line,
                        *column,
                        *desc,
                        nexterror.location().line,
                        nexterror.location().column,
                        nexterror.description()
                    );
                }
            }
            None => {
                panic!(
                    "possible feature regression in plcheck, expected {}:{}:{}, found no additional errors!",
                    *line, *column, *desc
                );
            }
        }
    }
    if let Some(error) = iter.next() {
        let error_loc = error.location();
        panic!(
            "found more errors than was expected: {}:{}:{}",
            error_loc.line,
            error_loc.column,
            error.description()
        );
    }
}
