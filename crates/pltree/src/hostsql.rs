//! The host SQL engine interface.
//!
//! The real engine parses, plans, and type-checks embedded SQL fragments;
//! the checker only consumes the results through [`HostSqlEngine`].
//! [`CatalogEngine`] is a table-driven stand-in used by the CLI (fed from a
//! compiler dump) and by the tests.

use std::fmt;
use std::rc::Rc;

use ahash::RandomState;
use indexmap::IndexMap;

use crate::ast::Dno;
use crate::sqlstate::SqlState;
use crate::types::{RowDescriptor, ScalarType};

/// A table or view referenced by a compiled plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationRef {
    #[serde(default)]
    pub schema: Option<String>,
    pub name: String,
}

impl fmt::Display for RelationRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.schema {
            Some(schema) => write!(f, "{}.{}", schema, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// The outcome of compiling one SQL fragment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// The result-row descriptor; `None` for utility statements that
    /// return no rows.
    #[serde(default)]
    pub descriptor: Option<RowDescriptor>,
    /// Whether the plan only reads data.
    #[serde(default = "default_true")]
    pub read_only: bool,
    /// Whether the plan calls any volatile functions.
    #[serde(default)]
    pub volatile_calls: bool,
    /// Relations the plan touches.
    #[serde(default)]
    pub relations: Vec<RelationRef>,
    /// Routine variable slots the fragment references as parameters.
    #[serde(default)]
    pub params: Vec<Dno>,
    /// Whether the fragment is the literal NULL.
    #[serde(default)]
    pub is_null: bool,
}

fn default_true() -> bool {
    true
}

impl Default for Plan {
    fn default() -> Plan {
        Plan {
            descriptor: None,
            read_only: true,
            volatile_calls: false,
            relations: Vec::new(),
            params: Vec::new(),
            is_null: false,
        }
    }
}

impl Plan {
    pub fn returning(descriptor: RowDescriptor) -> Plan {
        Plan {
            descriptor: Some(descriptor),
            ..Plan::default()
        }
    }

    pub fn scalar(ty: ScalarType) -> Plan {
        Plan::returning(RowDescriptor::single(ty))
    }

    pub fn utility() -> Plan {
        Plan::default()
    }
}

/// A failure reported by the engine while compiling a fragment.
#[derive(Debug, Clone)]
pub struct EngineError {
    pub sqlstate: SqlState,
    pub message: String,
}

impl EngineError {
    pub fn syntax<S: Into<String>>(message: S) -> EngineError {
        EngineError {
            sqlstate: SqlState::resolve("syntax_error").expect("known condition"),
            message: message.into(),
        }
    }
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.sqlstate)
    }
}

impl std::error::Error for EngineError {}

/// The host SQL engine, as the checker sees it.
pub trait HostSqlEngine {
    /// Compile one SQL fragment into a plan.
    fn prepare(&self, text: &str) -> Result<Rc<Plan>, EngineError>;

    /// The result-row descriptor of a plan, if it returns rows.
    fn result_descriptor(&self, plan: &Plan) -> Option<RowDescriptor> {
        plan.descriptor.clone()
    }

    /// Whether the plan only reads data.
    fn is_read_only(&self, plan: &Plan) -> bool {
        plan.read_only
    }

    /// Relations the plan references.
    fn referenced_relations<'p>(&self, plan: &'p Plan) -> &'p [RelationRef] {
        &plan.relations
    }

    /// Whether the plan calls any volatile functions.
    fn contains_volatile_calls(&self, plan: &Plan) -> bool {
        plan.volatile_calls
    }
}

/// A table-driven engine: registered fragments compile to their registered
/// plans, and simple literals are inferred so trivial expressions do not
/// need registration.
#[derive(Default)]
pub struct CatalogEngine {
    queries: IndexMap<String, Rc<Plan>, RandomState>,
}

impl CatalogEngine {
    pub fn new() -> CatalogEngine {
        CatalogEngine::default()
    }

    pub fn register<S: Into<String>>(&mut self, text: S, plan: Plan) -> &mut Self {
        self.queries.insert(text.into(), Rc::new(plan));
        self
    }

    pub fn register_scalar<S: Into<String>>(&mut self, text: S, ty: ScalarType) -> &mut Self {
        self.register(text, Plan::scalar(ty))
    }

    /// Infer a plan for an unregistered fragment, or fail like the host
    /// engine's parser would.
    fn infer(&self, text: &str) -> Result<Plan, EngineError> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(EngineError::syntax("empty query"));
        }
        if trimmed.eq_ignore_ascii_case("null") {
            let mut plan = Plan::scalar(ScalarType::Unknown);
            plan.is_null = true;
            return Ok(plan);
        }
        if trimmed.eq_ignore_ascii_case("true") || trimmed.eq_ignore_ascii_case("false") {
            return Ok(Plan::scalar(ScalarType::Bool));
        }
        if trimmed.starts_with('\'') && trimmed.ends_with('\'') && trimmed.len() >= 2 {
            return Ok(Plan::scalar(ScalarType::Unknown));
        }
        if trimmed.chars().all(|c| c.is_ascii_digit())
            || (trimmed.starts_with('-') && trimmed[1..].chars().all(|c| c.is_ascii_digit()))
        {
            return Ok(Plan::scalar(ScalarType::Int4));
        }
        if trimmed.chars().all(|c| c.is_ascii_digit() || c == '.')
            && trimmed.chars().filter(|&c| c == '.').count() == 1
        {
            return Ok(Plan::scalar(ScalarType::Numeric));
        }
        Err(EngineError::syntax(format!(
            "syntax error at or near \"{}\"",
            trimmed
        )))
    }

    /// Collect `$n` placeholders as referenced parameter slots.
    fn scan_params(text: &str) -> Vec<Dno> {
        let mut params = Vec::new();
        let bytes = text.as_bytes();
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b'$' {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end].is_ascii_digit() {
                    end += 1;
                }
                if end > start {
                    if let Ok(n) = text[start..end].parse::<Dno>() {
                        if !params.contains(&n) {
                            params.push(n);
                        }
                    }
                }
                i = end;
            } else {
                i += 1;
            }
        }
        params
    }
}

impl HostSqlEngine for CatalogEngine {
    fn prepare(&self, text: &str) -> Result<Rc<Plan>, EngineError> {
        if let Some(plan) = self.queries.get(text) {
            return Ok(plan.clone());
        }
        let mut plan = self.infer(text)?;
        plan.params = CatalogEngine::scan_params(text);
        Ok(Rc::new(plan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::PlType;

    #[test]
    fn literal_inference() {
        let engine = CatalogEngine::new();
        let plan = engine.prepare("42").unwrap();
        assert_eq!(
            plan.descriptor.as_ref().unwrap().value_type(),
            PlType::Scalar(ScalarType::Int4)
        );
        let plan = engine.prepare("3.14").unwrap();
        assert_eq!(
            plan.descriptor.as_ref().unwrap().value_type(),
            PlType::Scalar(ScalarType::Numeric)
        );
        let plan = engine.prepare("'abc'").unwrap();
        assert_eq!(
            plan.descriptor.as_ref().unwrap().value_type(),
            PlType::Scalar(ScalarType::Unknown)
        );
        let plan = engine.prepare("NULL").unwrap();
        assert!(plan.is_null);
    }

    #[test]
    fn registration_wins() {
        let mut engine = CatalogEngine::new();
        engine.register_scalar("count(*) from t", ScalarType::Int8);
        let plan = engine.prepare("count(*) from t").unwrap();
        assert_eq!(
            plan.descriptor.as_ref().unwrap().value_type(),
            PlType::Scalar(ScalarType::Int8)
        );
    }

    #[test]
    fn unknown_text_is_a_syntax_error() {
        let engine = CatalogEngine::new();
        assert!(engine.prepare("select broken from").is_err());
    }

    #[test]
    fn param_scanning() {
        assert_eq!(CatalogEngine::scan_params("$1 + $2 + $1"), vec![1, 2]);
        assert_eq!(CatalogEngine::scan_params("no params"), Vec::<Dno>::new());
    }
}
