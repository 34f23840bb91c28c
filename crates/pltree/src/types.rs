//! The SQL type model: scalar types, row descriptors, and the cast catalog.

use std::fmt;

/// The scalar SQL types the checker understands.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    Bool,
    Int2,
    Int4,
    Int8,
    Float4,
    Float8,
    Numeric,
    Text,
    Varchar,
    BpChar,
    Name,
    Date,
    Time,
    Timestamp,
    Timestamptz,
    Interval,
    Uuid,
    Json,
    Jsonb,
    Bytea,
    RefCursor,
    Oid,
    /// The type of an untyped string literal, before the planner has
    /// resolved it against a target.
    Unknown,
}

impl ScalarType {
    pub fn name(self) -> &'static str {
        use self::ScalarType::*;
        match self {
            Bool => "boolean",
            Int2 => "smallint",
            Int4 => "integer",
            Int8 => "bigint",
            Float4 => "real",
            Float8 => "double precision",
            Numeric => "numeric",
            Text => "text",
            Varchar => "character varying",
            BpChar => "character",
            Name => "name",
            Date => "date",
            Time => "time",
            Timestamp => "timestamp",
            Timestamptz => "timestamp with time zone",
            Interval => "interval",
            Uuid => "uuid",
            Json => "json",
            Jsonb => "jsonb",
            Bytea => "bytea",
            RefCursor => "refcursor",
            Oid => "oid",
            Unknown => "unknown",
        }
    }

    /// Whether this type belongs to the string category, for the purposes
    /// of the taint check.
    pub fn is_string(self) -> bool {
        matches!(
            self,
            ScalarType::Text | ScalarType::Varchar | ScalarType::BpChar | ScalarType::Name
        )
    }

    fn numeric_rank(self) -> Option<u8> {
        use self::ScalarType::*;
        match self {
            Int2 => Some(0),
            Int4 => Some(1),
            Int8 => Some(2),
            Numeric => Some(3),
            _ => None,
        }
    }

    fn float_rank(self) -> Option<u8> {
        match self {
            ScalarType::Float4 => Some(0),
            ScalarType::Float8 => Some(1),
            _ => None,
        }
    }
}

impl fmt::Display for ScalarType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One column of a [`RowDescriptor`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub ty: PlType,
    /// Dropped columns remain in the descriptor but are skipped when
    /// matching fields positionally.
    #[serde(default)]
    pub dropped: bool,
}

impl ColumnDef {
    pub fn new<S: Into<String>>(name: S, ty: PlType) -> ColumnDef {
        ColumnDef {
            name: name.into(),
            ty,
            dropped: false,
        }
    }

    pub fn scalar<S: Into<String>>(name: S, ty: ScalarType) -> ColumnDef {
        ColumnDef::new(name, PlType::Scalar(ty))
    }

    pub fn dropped() -> ColumnDef {
        ColumnDef {
            name: String::new(),
            ty: PlType::Scalar(ScalarType::Unknown),
            dropped: true,
        }
    }
}

/// The host SQL engine's description of a query's result columns.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RowDescriptor {
    pub columns: Vec<ColumnDef>,
}

impl RowDescriptor {
    pub fn new(columns: Vec<ColumnDef>) -> RowDescriptor {
        RowDescriptor { columns }
    }

    pub fn single(ty: ScalarType) -> RowDescriptor {
        RowDescriptor {
            columns: vec![ColumnDef::scalar("?column?", ty)],
        }
    }

    /// Iterate the columns that have not been dropped.
    pub fn live_columns(&self) -> impl Iterator<Item = &ColumnDef> {
        self.columns.iter().filter(|c| !c.dropped)
    }

    /// The value type a query with this descriptor produces: a single live
    /// column is a scalar value, anything else is a composite.
    pub fn value_type(&self) -> PlType {
        let mut live = self.live_columns();
        match (live.next(), live.next()) {
            (Some(only), None) => only.ty.clone(),
            _ => PlType::Row(self.clone()),
        }
    }
}

/// A declared variable or value type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PlType {
    Scalar(ScalarType),
    /// A named composite with a known descriptor.
    Row(RowDescriptor),
    /// An untyped record; takes the shape of whatever is assigned to it.
    Record,
    Array(Box<PlType>),
}

impl PlType {
    pub fn scalar(&self) -> Option<ScalarType> {
        match self {
            PlType::Scalar(ty) => Some(*ty),
            _ => None,
        }
    }

    pub fn is_composite(&self) -> bool {
        matches!(self, PlType::Row(_) | PlType::Record)
    }

    pub fn name(&self) -> String {
        match self {
            PlType::Scalar(ty) => ty.name().to_owned(),
            PlType::Row(_) => "composite".to_owned(),
            PlType::Record => "record".to_owned(),
            PlType::Array(of) => format!("{}[]", of.name()),
        }
    }
}

impl fmt::Display for PlType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.name())
    }
}

/// How a cast between two types may be invoked, mirroring the host
/// engine's cast catalog.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub enum CastContext {
    /// Applied automatically in any expression context.
    Implicit,
    /// Applied automatically on assignment only.
    Assignment,
    /// Must be written out by the user.
    Explicit,
}

/// Look up the cast catalog for a cast from `from` to `to`.
///
/// Returns `None` when no cast path exists at all.
pub fn find_cast(from: ScalarType, to: ScalarType) -> Option<CastContext> {
    use self::ScalarType::*;

    if from == to {
        return Some(CastContext::Implicit);
    }

    // untyped literals coerce to anything
    if from == Unknown {
        return Some(CastContext::Implicit);
    }

    // exact numeric family: widening is implicit, narrowing by assignment
    if let (Some(f), Some(t)) = (from.numeric_rank(), to.numeric_rank()) {
        return Some(if f < t {
            CastContext::Implicit
        } else {
            CastContext::Assignment
        });
    }

    // float family
    if let (Some(f), Some(t)) = (from.float_rank(), to.float_rank()) {
        return Some(if f < t {
            CastContext::Implicit
        } else {
            CastContext::Assignment
        });
    }

    // exact <-> approximate
    if from.numeric_rank().is_some() && to.float_rank().is_some() {
        return Some(CastContext::Implicit);
    }
    if from.float_rank().is_some() && to.numeric_rank().is_some() {
        return Some(CastContext::Assignment);
    }

    // string family: freely interchangeable on assignment paths
    if from.is_string() && to.is_string() {
        return Some(CastContext::Implicit);
    }

    // date/time tower
    match (from, to) {
        (Date, Timestamp) | (Date, Timestamptz) | (Timestamp, Timestamptz) => {
            return Some(CastContext::Implicit)
        }
        (Timestamp, Date) | (Timestamptz, Date) | (Timestamptz, Timestamp) => {
            return Some(CastContext::Assignment)
        }
        (Time, Interval) | (Interval, Time) => return Some(CastContext::Explicit),
        _ => {}
    }

    // json family
    match (from, to) {
        (Json, Jsonb) | (Jsonb, Json) => return Some(CastContext::Explicit),
        _ => {}
    }

    // anything has a textual representation, but getting at it requires an
    // explicit cast through the type's output function
    if to.is_string() || from.is_string() {
        return Some(CastContext::Explicit);
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widening_is_implicit() {
        assert_eq!(
            find_cast(ScalarType::Int4, ScalarType::Int8),
            Some(CastContext::Implicit)
        );
        assert_eq!(
            find_cast(ScalarType::Int4, ScalarType::Numeric),
            Some(CastContext::Implicit)
        );
        assert_eq!(
            find_cast(ScalarType::Float4, ScalarType::Float8),
            Some(CastContext::Implicit)
        );
    }

    #[test]
    fn narrowing_is_assignment() {
        assert_eq!(
            find_cast(ScalarType::Numeric, ScalarType::Int4),
            Some(CastContext::Assignment)
        );
        assert_eq!(
            find_cast(ScalarType::Float8, ScalarType::Int8),
            Some(CastContext::Assignment)
        );
    }

    #[test]
    fn no_cast_between_unrelated() {
        assert_eq!(find_cast(ScalarType::Bool, ScalarType::Date), None);
        assert_eq!(find_cast(ScalarType::Uuid, ScalarType::Interval), None);
    }

    #[test]
    fn text_output_is_explicit() {
        assert_eq!(
            find_cast(ScalarType::Int4, ScalarType::Text),
            Some(CastContext::Explicit)
        );
        assert_eq!(
            find_cast(ScalarType::Text, ScalarType::Date),
            Some(CastContext::Explicit)
        );
    }

    #[test]
    fn descriptor_value_type() {
        let single = RowDescriptor::single(ScalarType::Int4);
        assert_eq!(single.value_type(), PlType::Scalar(ScalarType::Int4));

        let row = RowDescriptor::new(vec![
            ColumnDef::scalar("a", ScalarType::Int4),
            ColumnDef::scalar("b", ScalarType::Text),
        ]);
        assert!(row.value_type().is_composite());

        let with_dropped = RowDescriptor::new(vec![
            ColumnDef::dropped(),
            ColumnDef::scalar("a", ScalarType::Int4),
        ]);
        assert_eq!(with_dropped.value_type(), PlType::Scalar(ScalarType::Int4));
    }
}
