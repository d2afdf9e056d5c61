use std::fmt;

/// Comparison operator for a pushed-down constraint.
///
/// `Limit` and `Offset` carry no left-hand column; `IsNull` and `IsNotNull`
/// carry no right-hand argument (their filter slot is still occupied, by
/// NULL).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ConstraintOp {
    Eq,
    Gt,
    Le,
    Lt,
    Ge,
    Match,
    Like,
    Glob,
    Regexp,
    Ne,
    IsNot,
    IsNotNull,
    IsNull,
    Is,
    Limit,
    Offset,
    /// A function overloaded by the table (`xFindFunction`).
    Function,
    /// Anything the bridge does not recognise.
    Unknown,
}

impl ConstraintOp {
    /// Whether the operator compares against a right-hand argument.
    pub const fn has_argument(self) -> bool {
        !matches!(self, Self::IsNull | Self::IsNotNull)
    }

    /// Whether the operator applies to a column of the row.
    pub const fn has_column(self) -> bool {
        !matches!(self, Self::Limit | Self::Offset)
    }

    /// Whether the operator is a per-row predicate at all.
    ///
    /// `LIMIT`/`OFFSET` restrict how many rows are produced, not which rows
    /// qualify.
    pub const fn is_row_predicate(self) -> bool {
        self.has_column()
    }

    /// `=` or `IS`: pins the column to a single value.
    pub const fn is_equality(self) -> bool {
        matches!(self, Self::Eq | Self::Is)
    }

    /// `<`, `<=`, `>`, `>=`.
    pub const fn is_range(self) -> bool {
        matches!(self, Self::Gt | Self::Ge | Self::Lt | Self::Le)
    }

    /// SQL spelling of the operator.
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Gt => ">",
            Self::Le => "<=",
            Self::Lt => "<",
            Self::Ge => ">=",
            Self::Match => "MATCH",
            Self::Like => "LIKE",
            Self::Glob => "GLOB",
            Self::Regexp => "REGEXP",
            Self::Ne => "<>",
            Self::IsNot => "IS NOT",
            Self::IsNotNull => "IS NOT NULL",
            Self::IsNull => "IS NULL",
            Self::Is => "IS",
            Self::Limit => "LIMIT",
            Self::Offset => "OFFSET",
            Self::Function => "FUNCTION",
            Self::Unknown => "?",
        }
    }
}

impl fmt::Display for ConstraintOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}
