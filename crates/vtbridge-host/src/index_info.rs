//! The host's index-info record and its translation to and from the
//! negotiation vocabulary.

use vtbridge_error::{Result, VtabError};
use vtbridge_types::{ConstraintOp, Value};
use vtbridge_vtab::{Constraint, ConstraintInfo, Index, OrderByTerm};

/// Host operator codes for pushed-down constraints.
pub mod op_code {
    pub const EQ: i32 = 2;
    pub const GT: i32 = 4;
    pub const LE: i32 = 8;
    pub const LT: i32 = 16;
    pub const GE: i32 = 32;
    pub const MATCH: i32 = 64;
    pub const LIKE: i32 = 65;
    pub const GLOB: i32 = 66;
    pub const REGEXP: i32 = 67;
    pub const NE: i32 = 68;
    pub const ISNOT: i32 = 69;
    pub const ISNOTNULL: i32 = 70;
    pub const ISNULL: i32 = 71;
    pub const IS: i32 = 72;
    pub const LIMIT: i32 = 73;
    pub const OFFSET: i32 = 74;
    /// First code reserved for functions overloaded by the table.
    pub const FUNCTION: i32 = 150;
}

/// `idx_flags` bit: the scan visits at most one row.
pub const SCAN_UNIQUE: i32 = 1;

/// Row estimate reported when a plan does not give one.
pub const DEFAULT_ESTIMATED_ROWS: i64 = 25;

/// Decode a host operator code.
pub const fn op_from_code(code: i32) -> ConstraintOp {
    match code {
        op_code::EQ => ConstraintOp::Eq,
        op_code::GT => ConstraintOp::Gt,
        op_code::LE => ConstraintOp::Le,
        op_code::LT => ConstraintOp::Lt,
        op_code::GE => ConstraintOp::Ge,
        op_code::MATCH => ConstraintOp::Match,
        op_code::LIKE => ConstraintOp::Like,
        op_code::GLOB => ConstraintOp::Glob,
        op_code::REGEXP => ConstraintOp::Regexp,
        op_code::NE => ConstraintOp::Ne,
        op_code::ISNOT => ConstraintOp::IsNot,
        op_code::ISNOTNULL => ConstraintOp::IsNotNull,
        op_code::ISNULL => ConstraintOp::IsNull,
        op_code::IS => ConstraintOp::Is,
        op_code::LIMIT => ConstraintOp::Limit,
        op_code::OFFSET => ConstraintOp::Offset,
        c if c >= op_code::FUNCTION => ConstraintOp::Function,
        _ => ConstraintOp::Unknown,
    }
}

/// Encode an operator as a host code. `Unknown` encodes as `0`.
pub const fn op_to_code(op: ConstraintOp) -> i32 {
    match op {
        ConstraintOp::Eq => op_code::EQ,
        ConstraintOp::Gt => op_code::GT,
        ConstraintOp::Le => op_code::LE,
        ConstraintOp::Lt => op_code::LT,
        ConstraintOp::Ge => op_code::GE,
        ConstraintOp::Match => op_code::MATCH,
        ConstraintOp::Like => op_code::LIKE,
        ConstraintOp::Glob => op_code::GLOB,
        ConstraintOp::Regexp => op_code::REGEXP,
        ConstraintOp::Ne => op_code::NE,
        ConstraintOp::IsNot => op_code::ISNOT,
        ConstraintOp::IsNotNull => op_code::ISNOTNULL,
        ConstraintOp::IsNull => op_code::ISNULL,
        ConstraintOp::Is => op_code::IS,
        ConstraintOp::Limit => op_code::LIMIT,
        ConstraintOp::Offset => op_code::OFFSET,
        ConstraintOp::Function => op_code::FUNCTION,
        ConstraintOp::Unknown => 0,
    }
}

/// One input constraint as the host encodes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostConstraint {
    /// Column index (0-based; `-1` for rowid).
    pub column: i32,
    /// Host operator code, see [`op_code`].
    pub op: i32,
    pub usable: bool,
}

/// One ORDER BY term as the host encodes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostOrderBy {
    pub column: i32,
    pub desc: bool,
}

/// Per-constraint output of `best_index`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostConstraintUsage {
    /// 1-based slot in the `filter` argument array; `0` = not consumed.
    pub argv_index: i32,
    /// The host may skip its own check of this constraint.
    pub omit: bool,
}

/// The record exchanged with the host during index selection.
///
/// The host fills the inputs (`constraints`, `right_values`, `order_by`,
/// `columns_used`); `best_index` fills the outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct HostIndexInfo {
    pub constraints: Vec<HostConstraint>,
    /// Right-hand literal per constraint, where known at planning time.
    pub right_values: Vec<Option<Value>>,
    pub order_by: Vec<HostOrderBy>,
    pub columns_used: u64,

    pub constraint_usage: Vec<HostConstraintUsage>,
    /// Plan id; pass back unchanged to `filter`.
    pub idx_num: i32,
    pub idx_str: Option<String>,
    pub order_by_consumed: bool,
    pub estimated_cost: f64,
    pub estimated_rows: i64,
    pub idx_flags: i32,
}

impl HostIndexInfo {
    #[must_use]
    pub fn new(constraints: Vec<HostConstraint>, order_by: Vec<HostOrderBy>, columns_used: u64) -> Self {
        let len = constraints.len();
        Self {
            constraints,
            right_values: vec![None; len],
            order_by,
            columns_used,
            constraint_usage: vec![HostConstraintUsage::default(); len],
            idx_num: 0,
            idx_str: None,
            order_by_consumed: false,
            estimated_cost: f64::MAX,
            estimated_rows: DEFAULT_ESTIMATED_ROWS,
            idx_flags: 0,
        }
    }

    /// Record the right-hand literal of constraint `i`.
    #[must_use]
    pub fn with_right_value(mut self, i: usize, value: Value) -> Self {
        if let Some(slot) = self.right_values.get_mut(i) {
            *slot = Some(value);
        }
        self
    }

    /// The proposal this record describes.
    pub fn to_constraint_info(&self) -> ConstraintInfo {
        let constraints = self
            .constraints
            .iter()
            .enumerate()
            .map(|(i, c)| Constraint {
                constraint_index: i,
                column: c.column,
                usable: c.usable,
                op: op_from_code(c.op),
                argument: self.right_values.get(i).cloned().flatten(),
            })
            .collect();
        let order_by = self
            .order_by
            .iter()
            .map(|o| OrderByTerm {
                column: o.column,
                desc: o.desc,
            })
            .collect();
        ConstraintInfo::new(constraints, order_by, self.columns_used)
    }

    /// Write a negotiated plan into the output fields.
    ///
    /// Fails if the plan consumes a constraint the host did not offer, or
    /// one it marked unusable.
    pub fn apply(&mut self, plan: i32, index: &Index) -> Result<()> {
        let mut usage = vec![HostConstraintUsage::default(); self.constraints.len()];
        for (slot, used) in index.constraints.iter().enumerate() {
            let position = used.constraint.constraint_index;
            let offered = self.constraints.get(position).ok_or_else(|| {
                VtabError::internal(format!(
                    "plan consumes constraint {position} but only {} were offered",
                    self.constraints.len()
                ))
            })?;
            if !offered.usable {
                return Err(VtabError::internal(format!(
                    "plan consumes unusable constraint {position}"
                )));
            }
            if usage[position].argv_index != 0 {
                return Err(VtabError::internal(format!(
                    "plan consumes constraint {position} twice"
                )));
            }
            usage[position] = HostConstraintUsage {
                argv_index: i32::try_from(slot + 1)
                    .map_err(|_| VtabError::internal("too many consumed constraints"))?,
                omit: used.omit,
            };
        }
        self.constraint_usage = usage;
        self.idx_num = plan;
        self.idx_str.clone_from(&index.idx_str);
        self.order_by_consumed = index.order_by_consumed;
        self.estimated_cost = index.estimated_cost;
        self.estimated_rows = index.estimated_rows.unwrap_or(DEFAULT_ESTIMATED_ROWS);
        self.idx_flags = if index.zero_or_one_row { SCAN_UNIQUE } else { 0 };
        Ok(())
    }
}
