//! Core value types shared by every layer of the virtual-table bridge.
//!
//! - [`Value`]: the five-variant tagged union exchanged with the host engine.
//! - [`ConstraintOp`]: the operators the host can push down to a table.
//! - [`TypeAffinity`]: column affinity derived from a declared type name.
//! - [`pattern`]: LIKE / GLOB / REGEXP matching used by constraint tests.

pub mod op;
pub mod pattern;
pub mod value;

pub use op::ConstraintOp;
pub use value::{Value, ValueKind, format_real};

/// Column type affinity, derived from the declared type of a column.
///
/// See <https://www.sqlite.org/datatype3.html#type_affinity>.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum TypeAffinity {
    /// INTEGER, INT, TINYINT, BIGINT, ...
    Integer,
    /// TEXT, VARCHAR, CLOB, ...
    Text,
    /// BLOB or no declared type.
    Blob,
    /// REAL, DOUBLE, FLOAT.
    Real,
    /// Everything else: NUMERIC, DECIMAL, BOOLEAN, DATE, ...
    Numeric,
}

impl TypeAffinity {
    /// Determine the affinity for a declared column type name.
    ///
    /// First-match rule:
    /// 1. Contains "INT" → INTEGER
    /// 2. Contains "CHAR", "CLOB", or "TEXT" → TEXT
    /// 3. Contains "BLOB" or is empty → BLOB
    /// 4. Contains "REAL", "FLOA", or "DOUB" → REAL
    /// 5. Otherwise → NUMERIC
    pub fn from_type_name(type_name: &str) -> Self {
        let upper = type_name.to_ascii_uppercase();

        if upper.contains("INT") {
            Self::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            Self::Text
        } else if upper.trim().is_empty() || upper.contains("BLOB") {
            Self::Blob
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            Self::Real
        } else {
            Self::Numeric
        }
    }

    /// The value kind a column of this affinity naturally stores.
    pub const fn preferred_kind(self) -> Option<ValueKind> {
        match self {
            Self::Integer => Some(ValueKind::Integer),
            Self::Text => Some(ValueKind::Text),
            Self::Real => Some(ValueKind::Real),
            Self::Blob | Self::Numeric => None,
        }
    }
}
