//! Query planner vocabulary for one negotiation round.
//!
//! The host proposes a [`ConstraintInfo`]; the table answers with an
//! [`IndexSolution`]. Equal proposals are the cache key for solutions, so
//! every type on the proposal side has structural `Eq + Hash`.

use vtbridge_types::{ConstraintOp, Value};

/// Column index the host uses for the rowid.
pub const ROWID_COLUMN: i32 = -1;

/// A single WHERE-clause term the host can push down.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Constraint {
    /// Position in the host's constraint array.
    pub constraint_index: usize,
    /// Target column (0-based; [`ROWID_COLUMN`] for rowid).
    pub column: i32,
    /// Whether the host can supply the argument for this candidate plan.
    pub usable: bool,
    /// The comparison operator.
    pub op: ConstraintOp,
    /// The right-hand literal, when the host knows it at planning time.
    pub argument: Option<Value>,
}

impl Constraint {
    /// A usable constraint with no known right-hand literal.
    #[must_use]
    pub fn new(constraint_index: usize, column: i32, op: ConstraintOp) -> Self {
        Self {
            constraint_index,
            column,
            usable: true,
            op,
            argument: None,
        }
    }

    #[must_use]
    pub fn with_usable(mut self, usable: bool) -> Self {
        self.usable = usable;
        self
    }

    #[must_use]
    pub fn with_argument(mut self, argument: Value) -> Self {
        self.argument = Some(argument);
        self
    }

    /// Whether this constraint targets the rowid.
    pub const fn is_rowid(&self) -> bool {
        self.column == ROWID_COLUMN
    }
}

/// A single ORDER BY term from the query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OrderByTerm {
    /// Column index (0-based).
    pub column: i32,
    /// `true` if descending, `false` if ascending.
    pub desc: bool,
}

impl OrderByTerm {
    #[must_use]
    pub const fn asc(column: i32) -> Self {
        Self {
            column,
            desc: false,
        }
    }

    #[must_use]
    pub const fn desc(column: i32) -> Self {
        Self { column, desc: true }
    }
}

/// The host's proposal for one planning round.
///
/// Two proposals are equal iff their constraints, order-by terms and
/// columns-used masks are all equal.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ConstraintInfo {
    /// WHERE clause constraints, in host order.
    pub constraints: Vec<Constraint>,
    /// Requested result order.
    pub order_by: Vec<OrderByTerm>,
    /// Bit `i` set if the query reads column `i`; bit 63 covers columns 63+.
    pub columns_used: u64,
}

impl ConstraintInfo {
    #[must_use]
    pub fn new(constraints: Vec<Constraint>, order_by: Vec<OrderByTerm>, columns_used: u64) -> Self {
        Self {
            constraints,
            order_by,
            columns_used,
        }
    }

    /// Constraints the host marked usable for this candidate.
    pub fn usable(&self) -> impl Iterator<Item = &Constraint> {
        self.constraints.iter().filter(|c| c.usable)
    }

    /// Whether the query reads `column`.
    pub const fn uses_column(&self, column: u32) -> bool {
        let bit = if column > 63 { 63 } else { column };
        self.columns_used & (1_u64 << bit) != 0
    }
}

/// One constraint an [`Index`] consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct UsedConstraint {
    pub constraint: Constraint,
    /// Promise that row production already enforces this exact predicate,
    /// so the host may skip its own check.
    pub omit: bool,
}

/// A table's access plan for one [`ConstraintInfo`].
///
/// The position of each entry in `constraints` is the argument slot the
/// host fills at filter time.
#[derive(Debug, Clone, PartialEq)]
pub struct Index {
    pub constraints: Vec<UsedConstraint>,
    /// Rows are produced in the requested order.
    pub order_by_consumed: bool,
    /// Estimated cost of the scan (lower is better).
    pub estimated_cost: f64,
    pub estimated_rows: Option<i64>,
    /// At most one row can qualify.
    pub zero_or_one_row: bool,
    /// Free-form plan label, passed back to the cursor.
    pub idx_str: Option<String>,
}

impl Default for Index {
    fn default() -> Self {
        Self {
            constraints: Vec::new(),
            order_by_consumed: false,
            estimated_cost: Self::DEFAULT_COST,
            estimated_rows: None,
            zero_or_one_row: false,
            idx_str: None,
        }
    }
}

impl Index {
    /// Cost reported by the naive "accept everything" strategy.
    pub const DEFAULT_COST: f64 = 1000.0;

    /// Consume every usable constraint at [`Index::DEFAULT_COST`], without
    /// omitting any host check or claiming any order.
    #[must_use]
    pub fn accept_usable(info: &ConstraintInfo) -> Self {
        Self {
            constraints: info
                .usable()
                .map(|c| UsedConstraint {
                    constraint: c.clone(),
                    omit: false,
                })
                .collect(),
            ..Self::default()
        }
    }

    /// Append a consumed constraint; its argument slot is the next position.
    pub fn push(&mut self, constraint: &Constraint, omit: bool) {
        self.constraints.push(UsedConstraint {
            constraint: constraint.clone(),
            omit,
        });
    }

    #[must_use]
    pub fn with_cost(mut self, estimated_cost: f64) -> Self {
        self.estimated_cost = estimated_cost;
        self
    }

    #[must_use]
    pub fn with_rows(mut self, estimated_rows: i64) -> Self {
        self.estimated_rows = Some(estimated_rows);
        self
    }

    #[must_use]
    pub fn with_order_by_consumed(mut self, consumed: bool) -> Self {
        self.order_by_consumed = consumed;
        self
    }

    #[must_use]
    pub fn with_zero_or_one_row(mut self, unique: bool) -> Self {
        self.zero_or_one_row = unique;
        self
    }

    #[must_use]
    pub fn with_idx_str(mut self, idx_str: impl Into<String>) -> Self {
        self.idx_str = Some(idx_str.into());
        self
    }

    /// Number of filter arguments this plan consumes.
    pub fn argument_count(&self) -> usize {
        self.constraints.len()
    }
}

/// The outcome of index negotiation.
#[derive(Debug, Clone, PartialEq)]
pub enum IndexSolution {
    /// The constraint set is unsatisfiable for this table.
    None,
    Index(Index),
}

impl IndexSolution {
    pub fn index(&self) -> Option<&Index> {
        match self {
            Self::None => None,
            Self::Index(index) => Some(index),
        }
    }

    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }
}

impl From<Index> for IndexSolution {
    fn from(index: Index) -> Self {
        Self::Index(index)
    }
}
