use vtbridge_error::{Result, VtabError};
use vtbridge_types::Value;

use crate::constraint::{Index, ROWID_COLUMN, UsedConstraint};

/// The plan a cursor was asked to scan with, plus the bound arguments.
///
/// Argument `i` corresponds to `index.constraints[i]`; operators without a
/// right-hand side still occupy their slot (with NULL).
#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    plan: i32,
    index: Index,
    arguments: Vec<Value>,
}

impl Filter {
    /// Bind `arguments` to `index`, requiring a 1:1 match in count.
    pub fn new(plan: i32, index: Index, arguments: Vec<Value>) -> Result<Self> {
        let expected = index.argument_count();
        if arguments.len() != expected {
            return Err(VtabError::ArgumentCount {
                expected,
                actual: arguments.len(),
            });
        }
        Ok(Self {
            plan,
            index,
            arguments,
        })
    }

    /// Bind `arguments` to `index`, padding missing slots with NULL and
    /// dropping surplus ones.
    #[must_use]
    pub fn lenient(plan: i32, index: Index, mut arguments: Vec<Value>) -> Self {
        arguments.resize(index.argument_count(), Value::Null);
        Self {
            plan,
            index,
            arguments,
        }
    }

    pub const fn plan(&self) -> i32 {
        self.plan
    }

    pub const fn index(&self) -> &Index {
        &self.index
    }

    pub fn arguments(&self) -> &[Value] {
        &self.arguments
    }

    /// Consumed constraints paired with their bound argument.
    pub fn bindings(&self) -> impl Iterator<Item = (&UsedConstraint, &Value)> {
        self.index.constraints.iter().zip(&self.arguments)
    }

    /// Evaluate every consumed constraint against a candidate row.
    ///
    /// `row` holds the row's column values in declaration order; columns
    /// past its end read as NULL. Short-circuits on the first failing
    /// constraint. `LIMIT`/`OFFSET` never reject a row.
    pub fn allows(&self, rowid: i64, row: &[Value]) -> bool {
        self.bindings().all(|(used, argument)| {
            let constraint = &used.constraint;
            if !constraint.op.is_row_predicate() {
                return true;
            }
            let stored = if constraint.column == ROWID_COLUMN {
                Value::Integer(rowid)
            } else {
                usize::try_from(constraint.column)
                    .ok()
                    .and_then(|i| row.get(i))
                    .cloned()
                    .unwrap_or(Value::Null)
            };
            stored.test_constraint(constraint.op, argument)
        })
    }
}
