//! SQLSTATE error codes and exception condition names.

use std::fmt;

use phf::phf_map;
use serde::de::{self, Deserialize, Deserializer};
use serde::{Serialize, Serializer};

/// A five-character SQLSTATE code.
///
/// The all-zero value is reserved as the re-raise sentinel: a bare `RAISE;`
/// carries it until the raise is resolved against an enclosing handler.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct SqlState([u8; 5]);

/// The sentinel for a bare `RAISE;` with no arguments.
pub const RERAISE: SqlState = SqlState([0; 5]);

/// `raise_exception`, the default code of `RAISE EXCEPTION` without a
/// condition.
pub const RAISE_EXCEPTION: SqlState = SqlState(*b"P0001");

/// `assert_failure`, raised by a failing `ASSERT`. Not caught by OTHERS.
pub const ASSERT_FAILURE: SqlState = SqlState(*b"P0004");

/// `query_canceled`. Not caught by OTHERS.
pub const QUERY_CANCELED: SqlState = SqlState(*b"57014");

/// The condition names a `RAISE` statement or an exception handler clause
/// may use, mapped to their SQLSTATE codes.
static CONDITION_NAMES: phf::Map<&'static str, &'static str> = phf_map! {
    "successful_completion" => "00000",
    "warning" => "01000",
    "no_data" => "02000",
    "sql_statement_not_yet_complete" => "03000",
    "connection_exception" => "08000",
    "feature_not_supported" => "0A000",
    "data_exception" => "22000",
    "string_data_right_truncation" => "22001",
    "null_value_not_allowed" => "22004",
    "numeric_value_out_of_range" => "22003",
    "division_by_zero" => "22012",
    "invalid_datetime_format" => "22007",
    "invalid_text_representation" => "22P02",
    "integrity_constraint_violation" => "23000",
    "not_null_violation" => "23502",
    "foreign_key_violation" => "23503",
    "unique_violation" => "23505",
    "check_violation" => "23514",
    "invalid_cursor_state" => "24000",
    "invalid_transaction_state" => "25000",
    "read_only_sql_transaction" => "25006",
    "invalid_sql_statement_name" => "26000",
    "dependent_privilege_descriptors_still_exist" => "2B000",
    "invalid_transaction_termination" => "2D000",
    "external_routine_invocation_exception" => "39000",
    "invalid_cursor_name" => "34000",
    "syntax_error" => "42601",
    "insufficient_privilege" => "42501",
    "undefined_column" => "42703",
    "undefined_function" => "42883",
    "undefined_table" => "42P01",
    "duplicate_column" => "42701",
    "duplicate_table" => "42P07",
    "datatype_mismatch" => "42804",
    "insufficient_resources" => "53000",
    "too_many_connections" => "53300",
    "program_limit_exceeded" => "54000",
    "object_not_in_prerequisite_state" => "55000",
    "query_canceled" => "57014",
    "deadlock_detected" => "40P01",
    "serialization_failure" => "40001",
    "internal_error" => "XX000",
    "data_corrupted" => "XX001",
    "raise_exception" => "P0001",
    "no_data_found" => "P0002",
    "too_many_rows" => "P0003",
    "assert_failure" => "P0004",
};

impl SqlState {
    /// Parse a literal five-character SQLSTATE.
    pub fn from_code(code: &str) -> Option<SqlState> {
        let bytes = code.as_bytes();
        if bytes.len() != 5 {
            return None;
        }
        if !bytes
            .iter()
            .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
        {
            return None;
        }
        let mut out = [0u8; 5];
        out.copy_from_slice(bytes);
        Some(SqlState(out))
    }

    /// Resolve a condition name or a literal SQLSTATE code.
    pub fn resolve(name: &str) -> Option<SqlState> {
        if let Some(code) = CONDITION_NAMES.get(name) {
            return SqlState::from_code(code);
        }
        SqlState::from_code(name)
    }

    pub fn is_reraise(self) -> bool {
        self == RERAISE
    }

    /// Whether this code names a whole class of conditions (ends in `000`).
    pub fn is_class(self) -> bool {
        &self.0[2..] == b"000"
    }

    /// Handler-clause matching: exact SQLSTATE match, or class-prefix match
    /// when this code is a category condition. The re-raise sentinel never
    /// matches anything.
    pub fn matches(self, raised: SqlState) -> bool {
        if raised.is_reraise() {
            return false;
        }
        if self.is_class() {
            self.0[..2] == raised.0[..2]
        } else {
            self == raised
        }
    }

    /// Whether an `OTHERS` handler catches this code.
    pub fn caught_by_others(self) -> bool {
        !self.is_reraise() && self != QUERY_CANCELED && self != ASSERT_FAILURE
    }

    pub fn code(&self) -> &str {
        if self.is_reraise() {
            return "(re-raise)";
        }
        // constructed from validated ASCII only
        std::str::from_utf8(&self.0).unwrap_or("?????")
    }
}

impl fmt::Display for SqlState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl fmt::Debug for SqlState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "SqlState({})", self.code())
    }
}

impl Serialize for SqlState {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

impl<'de> Deserialize<'de> for SqlState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<SqlState, D::Error> {
        let text = String::deserialize(deserializer)?;
        SqlState::from_code(&text)
            .ok_or_else(|| de::Error::custom(format!("invalid SQLSTATE {:?}", text)))
    }
}
