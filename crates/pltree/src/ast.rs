//! The routine tree the checker walks.
//!
//! The tree is produced once by an external compiler (or deserialized from
//! its JSON dump) and is read-only for the duration of a check.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::de::{Deserialize, Deserializer};
use serde::{Serialize, Serializer};

use crate::error::{Category, Location};
use crate::hostsql::Plan;
use crate::sqlstate::SqlState;
use crate::types::PlType;

/// The integer index identifying one declared variable or parameter within
/// a routine's flat variable table.
pub type Dno = u32;

bitflags! {
    /// Classification flags for a variable slot.
    pub struct SlotFlags: u8 {
        /// Declared explicitly in a DECLARE section or parameter list.
        const EXPLICIT  = 1 << 0;
        /// Generated by the compiler (loop variables, SQLSTATE/SQLERRM).
        const AUTO      = 1 << 1;
        /// Never flagged unused regardless of usage.
        const PROTECTED = 1 << 2;
    }
}

impl Serialize for SlotFlags {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.bits())
    }
}

impl<'de> Deserialize<'de> for SlotFlags {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<SlotFlags, D::Error> {
        Ok(SlotFlags::from_bits_truncate(u8::deserialize(deserializer)?))
    }
}

/// The kind of storage a slot designates.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotKind {
    Scalar,
    Record,
    Row,
    RecordField,
    ArrayElement,
}

/// One entry in a routine's flat variable table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Variable {
    pub dno: Dno,
    pub name: String,
    pub kind: SlotKind,
    pub ty: PlType,
    pub flags: SlotFlags,
    #[serde(default)]
    pub location: Location,
}

/// Parameter passing modes.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamMode {
    In,
    Out,
    InOut,
}

/// A routine parameter; its name and type live in the variable table under
/// the same `dno`.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct Parameter {
    pub dno: Dno,
    pub mode: ParamMode,
}

/// Declared routine volatility, as recorded in the catalog.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Volatility {
    Volatile,
    Stable,
    Immutable,
}

impl Default for Volatility {
    fn default() -> Volatility {
        Volatility::Volatile
    }
}

/// A routine under analysis. Immutable for the duration of a check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Routine {
    pub name: String,
    pub parameters: Vec<Parameter>,
    /// `None` for routines returning void.
    pub return_type: Option<PlType>,
    #[serde(default)]
    pub is_procedure: bool,
    #[serde(default)]
    pub volatility: Volatility,
    /// The flat variable table, one entry per slot.
    pub variables: Vec<Variable>,
    /// The body; always a `Block`.
    pub body: Statement,
}

impl Routine {
    pub fn variable(&self, dno: Dno) -> Option<&Variable> {
        self.variables.iter().find(|v| v.dno == dno)
    }

    pub fn parameter(&self, dno: Dno) -> Option<&Parameter> {
        self.parameters.iter().find(|p| p.dno == dno)
    }

    pub fn max_dno(&self) -> Dno {
        self.variables.iter().map(|v| v.dno).max().unwrap_or(0)
    }
}

/// An embedded SQL expression.
///
/// The plan handle is owned by the host engine and cached here after the
/// first compilation, making repeated checks idempotent and cheap.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expression {
    pub text: String,
    #[serde(default)]
    pub location: Location,
    /// Variable slots this expression references, from the compiler.
    #[serde(default)]
    pub refs: Vec<Dno>,
    /// The designated target slot when this expression is the right-hand
    /// side of an assignment.
    #[serde(default)]
    pub target: Option<Dno>,
    /// Structural form for the taint classifier, when the compiler can
    /// supply one.
    #[serde(default)]
    pub shape: Option<ExprShape>,
    #[serde(skip)]
    plan: RefCell<Option<Rc<Plan>>>,
}

impl Expression {
    pub fn new<S: Into<String>>(location: Location, text: S) -> Expression {
        Expression {
            text: text.into(),
            location,
            refs: Vec::new(),
            target: None,
            shape: None,
            plan: RefCell::new(None),
        }
    }

    pub fn with_refs(mut self, refs: &[Dno]) -> Expression {
        self.refs = refs.to_vec();
        self
    }

    pub fn with_target(mut self, target: Dno) -> Expression {
        self.target = Some(target);
        self
    }

    pub fn with_shape(mut self, shape: ExprShape) -> Expression {
        self.shape = Some(shape);
        self
    }

    pub fn cached_plan(&self) -> Option<Rc<Plan>> {
        self.plan.borrow().clone()
    }

    pub fn cache_plan(&self, plan: Rc<Plan>) {
        *self.plan.borrow_mut() = Some(plan);
    }
}

/// The structural form of an expression, as far as the taint classifier
/// needs to see it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExprShape {
    /// A reference to a variable slot.
    Slot(Dno),
    /// A literal constant; its value is visible to the format-string check.
    Literal(String),
    /// A function call by name.
    Call { name: String, args: Vec<ExprShape> },
    /// An operator application, e.g. `||`.
    Op { name: String, args: Vec<ExprShape> },
}

/// A per-block toggle of one warning category, produced by the external
/// pragma-comment tokenizer.
#[derive(Debug, Copy, Clone, Serialize, Deserialize)]
pub struct Directive {
    pub category: Category,
    pub enable: bool,
}

/// One condition a handler clause can match.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerCond {
    /// A named condition or literal SQLSTATE; codes ending in `000` match
    /// their whole class.
    Code(SqlState),
    /// The OTHERS wildcard.
    Others,
}

impl HandlerCond {
    pub fn matches(&self, raised: SqlState) -> bool {
        match self {
            HandlerCond::Code(code) => code.matches(raised),
            HandlerCond::Others => raised.caught_by_others(),
        }
    }
}

/// One `WHEN conditions THEN body` arm of a block's EXCEPTION section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExceptionHandler {
    pub conditions: Vec<HandlerCond>,
    pub body: Vec<Statement>,
    #[serde(default)]
    pub location: Location,
}

/// `RAISE` statement severity levels.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaiseLevel {
    Debug,
    Log,
    Info,
    Notice,
    Warning,
    Exception,
}

/// A statement in the routine tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    /// Unique within one routine.
    pub id: u32,
    #[serde(default)]
    pub location: Location,
    #[serde(default)]
    pub label: Option<String>,
    pub kind: StatementKind,
}

impl Statement {
    pub fn new(id: u32, location: Location, kind: StatementKind) -> Statement {
        Statement {
            id,
            location,
            label: None,
            kind,
        }
    }

    pub fn with_label<S: Into<String>>(mut self, label: S) -> Statement {
        self.label = Some(label.into());
        self
    }
}

/// The closed sum of statement kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Block {
        body: Vec<Statement>,
        #[serde(default)]
        handlers: Vec<ExceptionHandler>,
        #[serde(default)]
        directives: Vec<Directive>,
    },
    If {
        /// `(condition, body)` pairs: the IF arm and any ELSIF arms.
        branches: Vec<(Expression, Vec<Statement>)>,
        #[serde(default)]
        else_body: Option<Vec<Statement>>,
    },
    Case {
        #[serde(default)]
        operand: Option<Expression>,
        /// `(when-expressions, body)` pairs.
        arms: Vec<(Vec<Expression>, Vec<Statement>)>,
        #[serde(default)]
        else_body: Option<Vec<Statement>>,
    },
    Loop {
        body: Vec<Statement>,
    },
    While {
        condition: Expression,
        body: Vec<Statement>,
    },
    CountedFor {
        var: Dno,
        lower: Expression,
        upper: Expression,
        #[serde(default)]
        step: Option<Expression>,
        #[serde(default)]
        reverse: bool,
        body: Vec<Statement>,
    },
    QueryFor {
        target: Dno,
        query: Expression,
        body: Vec<Statement>,
    },
    CursorFor {
        target: Dno,
        cursor: Dno,
        #[serde(default)]
        args: Option<Expression>,
        body: Vec<Statement>,
    },
    DynamicFor {
        target: Dno,
        query: Expression,
        #[serde(default)]
        params: Vec<Expression>,
        body: Vec<Statement>,
    },
    ForEachArray {
        target: Dno,
        array: Expression,
        body: Vec<Statement>,
    },
    Assign {
        target: Dno,
        value: Expression,
    },
    Perform {
        query: Expression,
    },
    Return {
        #[serde(default)]
        value: Option<Expression>,
    },
    ReturnNext {
        value: Expression,
    },
    ReturnQuery {
        query: Expression,
        /// True for `RETURN QUERY EXECUTE`.
        #[serde(default)]
        dynamic: bool,
        #[serde(default)]
        params: Vec<Expression>,
    },
    Raise {
        level: RaiseLevel,
        /// A condition name or SQLSTATE literal; `None` for a bare
        /// `RAISE;` or a plain `RAISE EXCEPTION 'msg'`.
        #[serde(default)]
        condition: Option<String>,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        args: Vec<Expression>,
    },
    ExecSql {
        query: Expression,
        #[serde(default)]
        into: Option<Dno>,
    },
    DynExecute {
        query: Expression,
        #[serde(default)]
        params: Vec<Expression>,
        #[serde(default)]
        into: Option<Dno>,
    },
    Open {
        cursor: Dno,
        /// A static bound query.
        #[serde(default)]
        query: Option<Expression>,
        /// A dynamically constructed query string.
        #[serde(default)]
        dynamic: Option<Expression>,
        #[serde(default)]
        params: Vec<Expression>,
    },
    Fetch {
        cursor: Dno,
        targets: Vec<Dno>,
    },
    Close {
        cursor: Dno,
    },
    GetDiag {
        targets: Vec<Dno>,
    },
    Call {
        expr: Expression,
        #[serde(default)]
        target: Option<Dno>,
    },
    Commit,
    Rollback,
    /// Covers both EXIT (`is_exit`) and CONTINUE.
    Exit {
        is_exit: bool,
        #[serde(default)]
        label: Option<String>,
        #[serde(default)]
        condition: Option<Expression>,
    },
    Assert {
        condition: Expression,
        #[serde(default)]
        message: Option<Expression>,
    },
}

impl StatementKind {
    /// A human-readable name for diagnostics.
    pub fn name(&self) -> &'static str {
        use self::StatementKind::*;
        match self {
            Block { .. } => "block",
            If { .. } => "IF",
            Case { .. } => "CASE",
            Loop { .. } => "LOOP",
            While { .. } => "WHILE",
            CountedFor { .. } | QueryFor { .. } | CursorFor { .. } | DynamicFor { .. } => "FOR",
            ForEachArray { .. } => "FOREACH",
            Assign { .. } => "assignment",
            Perform { .. } => "PERFORM",
            Return { .. } => "RETURN",
            ReturnNext { .. } => "RETURN NEXT",
            ReturnQuery { .. } => "RETURN QUERY",
            Raise { .. } => "RAISE",
            ExecSql { .. } => "SQL statement",
            DynExecute { .. } => "EXECUTE",
            Open { .. } => "OPEN",
            Fetch { .. } => "FETCH",
            Close { .. } => "CLOSE",
            GetDiag { .. } => "GET DIAGNOSTICS",
            Call { .. } => "CALL",
            Commit => "COMMIT",
            Rollback => "ROLLBACK",
            Exit { is_exit: true, .. } => "EXIT",
            Exit { is_exit: false, .. } => "CONTINUE",
            Assert { .. } => "ASSERT",
        }
    }

    /// Whether this is one of the loop statements a CONTINUE can target.
    pub fn is_loop(&self) -> bool {
        use self::StatementKind::*;
        matches!(
            self,
            Loop { .. }
                | While { .. }
                | CountedFor { .. }
                | QueryFor { .. }
                | CursorFor { .. }
                | DynamicFor { .. }
                | ForEachArray { .. }
        )
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}
