//! The statement vocabulary a [`HostSession`](crate::HostSession) accepts.

use std::cmp::Ordering;

use vtbridge_types::{ConstraintOp, Value, ValueKind};

/// Column name that addresses the rowid.
pub const ROWID: &str = "rowid";

/// One `WHERE` term: `column <op> value`.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub op: ConstraintOp,
    /// Right-hand side; ignored by `IS NULL`/`IS NOT NULL`.
    pub value: Value,
}

impl Predicate {
    pub fn new(column: &str, op: ConstraintOp, value: impl Into<Value>) -> Self {
        Self {
            column: column.to_owned(),
            op,
            value: value.into(),
        }
    }

    pub fn eq(column: &str, value: impl Into<Value>) -> Self {
        Self::new(column, ConstraintOp::Eq, value)
    }

    pub fn ne(column: &str, value: impl Into<Value>) -> Self {
        Self::new(column, ConstraintOp::Ne, value)
    }

    pub fn gt(column: &str, value: impl Into<Value>) -> Self {
        Self::new(column, ConstraintOp::Gt, value)
    }

    pub fn ge(column: &str, value: impl Into<Value>) -> Self {
        Self::new(column, ConstraintOp::Ge, value)
    }

    pub fn lt(column: &str, value: impl Into<Value>) -> Self {
        Self::new(column, ConstraintOp::Lt, value)
    }

    pub fn le(column: &str, value: impl Into<Value>) -> Self {
        Self::new(column, ConstraintOp::Le, value)
    }

    pub fn is_null(column: &str) -> Self {
        Self::new(column, ConstraintOp::IsNull, Value::Null)
    }

    pub fn not_null(column: &str) -> Self {
        Self::new(column, ConstraintOp::IsNotNull, Value::Null)
    }

    pub fn like(column: &str, pattern: &str) -> Self {
        Self::new(column, ConstraintOp::Like, pattern)
    }

    pub fn glob(column: &str, pattern: &str) -> Self {
        Self::new(column, ConstraintOp::Glob, pattern)
    }

    pub fn regexp(column: &str, pattern: &str) -> Self {
        Self::new(column, ConstraintOp::Regexp, pattern)
    }

    /// The value the host binds for this term at filter time.
    pub(crate) fn bound_value(&self) -> Value {
        if self.op.has_argument() {
            self.value.clone()
        } else {
            Value::Null
        }
    }
}

/// One `ORDER BY` term.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderTerm {
    pub column: String,
    pub desc: bool,
}

impl OrderTerm {
    pub fn asc(column: &str) -> Self {
        Self {
            column: column.to_owned(),
            desc: false,
        }
    }

    pub fn desc(column: &str) -> Self {
        Self {
            column: column.to_owned(),
            desc: true,
        }
    }
}

/// Right-hand side of a `SET` clause.
#[derive(Debug, Clone, PartialEq)]
pub enum SetExpr {
    /// `column = value`
    Value(Value),
    /// `column = column + value`
    Add(Value),
}

/// One `SET column = ...` assignment.
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub column: String,
    pub expr: SetExpr,
}

impl Assignment {
    pub fn set(column: &str, value: impl Into<Value>) -> Self {
        Self {
            column: column.to_owned(),
            expr: SetExpr::Value(value.into()),
        }
    }

    pub fn add(column: &str, value: impl Into<Value>) -> Self {
        Self {
            column: column.to_owned(),
            expr: SetExpr::Add(value.into()),
        }
    }

    /// New value of the column given its current value.
    pub fn apply(&self, current: &Value) -> Value {
        match &self.expr {
            SetExpr::Value(value) => value.clone(),
            SetExpr::Add(delta) => add(current, delta),
        }
    }
}

/// `lhs + rhs` with the host's numeric rules: integer arithmetic when both
/// sides are integers and the sum fits, real otherwise; NULL if either side
/// is NULL; text that does not parse as a number counts as zero.
pub fn add(lhs: &Value, rhs: &Value) -> Value {
    if lhs.is_null() || rhs.is_null() {
        return Value::Null;
    }
    let (a, b) = (numeric(lhs), numeric(rhs));
    if let (Value::Integer(x), Value::Integer(y)) = (&a, &b) {
        if let Some(sum) = x.checked_add(*y) {
            return Value::Integer(sum);
        }
    }
    let real = |v: &Value| {
        v.coerce(ValueKind::Real)
            .and_then(|r| r.as_real())
            .unwrap_or(0.0)
    };
    Value::Real(real(&a) + real(&b))
}

fn numeric(value: &Value) -> Value {
    match value {
        Value::Integer(_) | Value::Real(_) => value.clone(),
        Value::Text(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::Integer)
            .ok()
            .or_else(|| value.coerce(ValueKind::Real))
            .unwrap_or(Value::Integer(0)),
        Value::Null | Value::Blob(_) => Value::Integer(0),
    }
}

/// The order the host sorts values in: NULL, numbers, text, blobs.
pub fn sort_order(a: &Value, b: &Value) -> Ordering {
    const fn class(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Integer(_) | Value::Real(_) => 1,
            Value::Text(_) => 2,
            Value::Blob(_) => 3,
        }
    }
    class(a)
        .cmp(&class(b))
        .then_with(|| a.compare(b).unwrap_or(Ordering::Equal))
}
