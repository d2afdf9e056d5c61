use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::ConstraintOp;
use crate::pattern;

/// The variant tag of a [`Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ValueKind {
    Null,
    Integer,
    Real,
    Text,
    Blob,
}

impl ValueKind {
    /// The host's `typeof()` spelling.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer => "integer",
            Self::Real => "real",
            Self::Text => "text",
            Self::Blob => "blob",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A dynamically-typed value exchanged with the host engine.
///
/// Immutable once constructed. Equality and hashing are structural: two
/// values are equal only if they have the same variant and the same payload
/// (`Integer(1) != Real(1.0)`, reals compare by bit pattern). Use
/// [`Value::compare`] for SQL ordering with coercion.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// A 64-bit signed integer.
    Integer(i64),
    /// A 64-bit IEEE 754 floating-point number.
    Real(f64),
    /// A UTF-8 text string.
    Text(String),
    /// A binary large object.
    Blob(Vec<u8>),
}

impl Value {
    /// The variant tag of this value.
    pub const fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Integer(_) => ValueKind::Integer,
            Self::Real(_) => ValueKind::Real,
            Self::Text(_) => ValueKind::Text,
            Self::Blob(_) => ValueKind::Blob,
        }
    }

    /// Returns true if this is a NULL value.
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns true for INTEGER and REAL values.
    pub const fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Real(_))
    }

    /// Try to extract an integer value.
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to extract a real value.
    pub const fn as_real(&self) -> Option<f64> {
        match self {
            Self::Real(f) => Some(*f),
            _ => None,
        }
    }

    /// Try to extract a text reference.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Try to extract a blob reference.
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Self::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// Convert this value to another variant.
    ///
    /// - integer ↔ real convert numerically; a real becomes an integer only
    ///   when it is integral and within `i64` range.
    /// - integer/real ↔ text use canonical decimal formatting and parsing;
    ///   text that is not a numeric literal does not coerce (it is never
    ///   read as zero).
    /// - blob coerces only to blob, null only to null.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn coerce(&self, kind: ValueKind) -> Option<Self> {
        if self.kind() == kind {
            return Some(self.clone());
        }
        match (self, kind) {
            (Self::Integer(i), ValueKind::Real) => Some(Self::Real(*i as f64)),
            (Self::Real(f), ValueKind::Integer) => real_to_integer(*f).map(Self::Integer),
            (Self::Integer(i), ValueKind::Text) => Some(Self::Text(i.to_string())),
            (Self::Real(f), ValueKind::Text) => Some(Self::Text(format_real(*f))),
            (Self::Text(s), ValueKind::Integer) => match parse_numeric(s)? {
                Self::Integer(i) => Some(Self::Integer(i)),
                Self::Real(f) => real_to_integer(f).map(Self::Integer),
                _ => None,
            },
            (Self::Text(s), ValueKind::Real) => match parse_numeric(s)? {
                Self::Integer(i) => Some(Self::Real(i as f64)),
                real @ Self::Real(_) => Some(real),
                _ => None,
            },
            _ => None,
        }
    }

    /// Order `self` against `rhs`, coercing `rhs` toward `self`'s variant.
    ///
    /// Integer/real pairs compare exactly (no precision loss for large
    /// integers). A numeric left side parses a text right side as a number;
    /// a text left side formats a numeric right side as text. NULL orders
    /// equal to NULL. Returns `None` when the operands are incomparable
    /// (for example a blob against an integer, or a numeric column against
    /// non-numeric text).
    pub fn compare(&self, rhs: &Self) -> Option<Ordering> {
        match (self, rhs) {
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Real(a), Self::Real(b)) => a.partial_cmp(b),
            (Self::Integer(a), Self::Real(b)) => int_real_cmp(*a, *b),
            (Self::Real(a), Self::Integer(b)) => int_real_cmp(*b, *a).map(Ordering::reverse),
            (Self::Integer(_) | Self::Real(_), Self::Text(s)) => self.compare(&parse_numeric(s)?),
            (Self::Text(a), Self::Integer(b)) => Some(a.as_str().cmp(b.to_string().as_str())),
            (Self::Text(a), Self::Real(b)) => Some(a.as_str().cmp(format_real(*b).as_str())),
            (Self::Text(a), Self::Text(b)) => Some(a.cmp(b)),
            (Self::Blob(a), Self::Blob(b)) => Some(a.cmp(b)),
            _ => None,
        }
    }

    /// Evaluate `self <op> argument`, where `self` is a stored column value
    /// and `argument` the value bound for the constraint.
    ///
    /// Returns `false` whenever the answer is NULL under SQL three-valued
    /// logic or the operands are incomparable, so a local pre-filter built on
    /// this never admits a row the host would reject.
    pub fn test_constraint(&self, op: ConstraintOp, argument: &Self) -> bool {
        match op {
            ConstraintOp::Eq => self.compare_non_null(argument) == Some(Ordering::Equal),
            ConstraintOp::Ne => matches!(
                self.compare_non_null(argument),
                Some(Ordering::Less | Ordering::Greater)
            ),
            ConstraintOp::Lt => self.compare_non_null(argument) == Some(Ordering::Less),
            ConstraintOp::Le => matches!(
                self.compare_non_null(argument),
                Some(Ordering::Less | Ordering::Equal)
            ),
            ConstraintOp::Gt => self.compare_non_null(argument) == Some(Ordering::Greater),
            ConstraintOp::Ge => matches!(
                self.compare_non_null(argument),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            ConstraintOp::Is => match (self.is_null(), argument.is_null()) {
                (true, true) => true,
                (false, false) => self.compare(argument) == Some(Ordering::Equal),
                _ => false,
            },
            ConstraintOp::IsNot => match (self.is_null(), argument.is_null()) {
                (true, true) => false,
                (false, false) => matches!(
                    self.compare(argument),
                    Some(Ordering::Less | Ordering::Greater)
                ),
                _ => true,
            },
            ConstraintOp::IsNull => self.is_null(),
            ConstraintOp::IsNotNull => !self.is_null(),
            ConstraintOp::Like => self
                .text_operands(argument)
                .is_some_and(|(text, pat)| pattern::like(&pat, &text, None)),
            ConstraintOp::Glob => self
                .text_operands(argument)
                .is_some_and(|(text, pat)| pattern::glob(&pat, &text)),
            ConstraintOp::Regexp => self
                .text_operands(argument)
                .and_then(|(text, pat)| pattern::regexp(&pat, &text))
                .unwrap_or(false),
            ConstraintOp::Limit | ConstraintOp::Offset => true,
            ConstraintOp::Match | ConstraintOp::Function | ConstraintOp::Unknown => false,
        }
    }

    fn compare_non_null(&self, rhs: &Self) -> Option<Ordering> {
        if self.is_null() || rhs.is_null() {
            return None;
        }
        self.compare(rhs)
    }

    fn text_operands(&self, argument: &Self) -> Option<(String, String)> {
        let Some(Self::Text(text)) = self.coerce(ValueKind::Text) else {
            return None;
        };
        let Some(Self::Text(pat)) = argument.coerce(ValueKind::Text) else {
            return None;
        };
        Some((text, pat))
    }

    /// Returns the host's `typeof()` string for this value.
    pub const fn typeof_str(&self) -> &'static str {
        self.kind().name()
    }
}

/// Parse a numeric literal (integer preferred, then real).
///
/// Surrounding ASCII whitespace is ignored. `inf`/`nan` spellings are not
/// numeric literals.
fn parse_numeric(s: &str) -> Option<Value> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(i) = trimmed.parse::<i64>() {
        return Some(Value::Integer(i));
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.contains("inf") || lower.contains("nan") {
        return None;
    }
    trimmed.parse::<f64>().ok().map(Value::Real)
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss, clippy::float_cmp)]
fn real_to_integer(f: f64) -> Option<i64> {
    if !(-9_223_372_036_854_775_808.0..9_223_372_036_854_775_808.0).contains(&f) {
        return None;
    }
    let i = f as i64;
    ((i as f64) == f).then_some(i)
}

/// Compare an integer with a real without losing precision for |i| > 2^53.
#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn int_real_cmp(i: i64, r: f64) -> Option<Ordering> {
    if r.is_nan() {
        return None;
    }
    if r < -9_223_372_036_854_775_808.0 {
        return Some(Ordering::Greater);
    }
    if r >= 9_223_372_036_854_775_808.0 {
        return Some(Ordering::Less);
    }
    let y = r as i64;
    match i.cmp(&y) {
        Ordering::Equal => (i as f64).partial_cmp(&r),
        unequal => Some(unequal),
    }
}

/// Format a real as text with 15 significant digits, always keeping a
/// decimal point (`120.0`, not `120`), the host's canonical REAL → TEXT
/// conversion.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn format_real(f: f64) -> String {
    if f.is_nan() {
        return "NaN".to_owned();
    }
    if f.is_infinite() {
        return if f.is_sign_positive() { "Inf" } else { "-Inf" }.to_owned();
    }
    let abs = f.abs();
    if abs == 0.0 {
        return "0.0".to_owned();
    }
    let exp = abs.log10().floor() as i32;
    if exp >= 15 || exp < -4 {
        let s = format!("{f:.14e}");
        let Some(e_pos) = s.find('e') else {
            return s;
        };
        let mantissa = s[..e_pos].trim_end_matches('0');
        let mantissa = if mantissa.ends_with('.') {
            format!("{mantissa}0")
        } else {
            mantissa.to_owned()
        };
        let exp_str = &s[e_pos + 1..];
        let (sign, digits) = match exp_str.strip_prefix('-') {
            Some(rest) => ("-", rest),
            None => ("+", exp_str.trim_start_matches('+')),
        };
        let exp_num: u32 = digits.parse().unwrap_or(0);
        format!("{mantissa}e{sign}{exp_num:02}")
    } else {
        #[allow(clippy::cast_sign_loss)]
        let decimal_places = (14 - exp).max(0) as usize;
        let s = format!("{f:.decimal_places$}");
        if s.contains('.') {
            let trimmed = s.trim_end_matches('0');
            if trimmed.ends_with('.') {
                format!("{trimmed}0")
            } else {
                trimmed.to_owned()
            }
        } else {
            format!("{s}.0")
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Real(a), Self::Real(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Blob(a), Self::Blob(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind().hash(state);
        match self {
            Self::Null => {}
            Self::Integer(i) => i.hash(state),
            Self::Real(f) => f.to_bits().hash(state),
            Self::Text(s) => s.hash(state),
            Self::Blob(b) => b.hash(state),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Real(v) => f.write_str(&format_real(*v)),
            Self::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            Self::Blob(b) => {
                f.write_str("X'")?;
                for byte in b {
                    write!(f, "{byte:02X}")?;
                }
                f.write_str("'")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Integer(i64::from(i))
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Integer(i64::from(b))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        if f.is_nan() { Self::Null } else { Self::Real(f) }
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_owned())
    }
}

impl From<Vec<u8>> for Value {
    fn from(b: Vec<u8>) -> Self {
        Self::Blob(b)
    }
}

impl From<&[u8]> for Value {
    fn from(b: &[u8]) -> Self {
        Self::Blob(b.to_vec())
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map_or(Self::Null, Into::into)
    }
}

#[cfg(test)]
#[allow(clippy::float_cmp)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn integer_real_coercion() {
        assert_eq!(Value::Integer(3).coerce(ValueKind::Real), Some(Value::Real(3.0)));
        assert_eq!(Value::Real(4.0).coerce(ValueKind::Integer), Some(Value::Integer(4)));
        assert_eq!(Value::Real(4.4).coerce(ValueKind::Integer), None);
        assert_eq!(Value::Real(1e300).coerce(ValueKind::Integer), None);
    }

    #[test]
    fn text_numeric_coercion() {
        assert_eq!(
            Value::from(" 42 ").coerce(ValueKind::Integer),
            Some(Value::Integer(42))
        );
        assert_eq!(Value::from("2.5").coerce(ValueKind::Real), Some(Value::Real(2.5)));
        assert_eq!(Value::from("7").coerce(ValueKind::Real), Some(Value::Real(7.0)));
        // Parse failure is a failed coercion, not zero.
        assert_eq!(Value::from("Bar").coerce(ValueKind::Integer), None);
        assert_eq!(Value::from("inf").coerce(ValueKind::Real), None);
        assert_eq!(Value::from("").coerce(ValueKind::Real), None);
        assert_eq!(Value::Integer(-5).coerce(ValueKind::Text), Some(Value::from("-5")));
        assert_eq!(Value::Real(1.1).coerce(ValueKind::Text), Some(Value::from("1.1")));
    }

    #[test]
    fn blob_and_null_only_coerce_to_themselves() {
        let blob = Value::Blob(vec![1, 2]);
        assert_eq!(blob.coerce(ValueKind::Blob), Some(blob.clone()));
        assert_eq!(blob.coerce(ValueKind::Text), None);
        assert_eq!(Value::from("ab").coerce(ValueKind::Blob), None);
        assert_eq!(Value::Null.coerce(ValueKind::Null), Some(Value::Null));
        assert_eq!(Value::Null.coerce(ValueKind::Integer), None);
        assert_eq!(Value::Integer(0).coerce(ValueKind::Null), None);
    }

    #[test]
    fn compare_coerces_right_hand_side() {
        assert_eq!(Value::Real(3.3).compare(&Value::Integer(2)), Some(Ordering::Greater));
        assert_eq!(Value::Integer(3).compare(&Value::Real(3.0)), Some(Ordering::Equal));
        assert_eq!(Value::Integer(4).compare(&Value::from("4.5")), Some(Ordering::Less));
        assert_eq!(Value::from("12").compare(&Value::Integer(5)), Some(Ordering::Less));
        assert_eq!(Value::Integer(4).compare(&Value::from("four")), None);
        assert_eq!(Value::Blob(vec![1]).compare(&Value::Integer(1)), None);
        assert_eq!(Value::Null.compare(&Value::Integer(1)), None);
        assert_eq!(Value::Null.compare(&Value::Null), Some(Ordering::Equal));
    }

    #[test]
    fn compare_large_integers_exactly() {
        let imax = Value::Integer(i64::MAX);
        let fmax = Value::Real(9_223_372_036_854_775_808.0);
        assert_eq!(imax.compare(&fmax), Some(Ordering::Less));
        assert_eq!(fmax.compare(&imax), Some(Ordering::Greater));
        assert_eq!(Value::Integer(1).compare(&Value::Real(f64::NAN)), None);
    }

    #[test]
    fn range_constraints() {
        let b = Value::Real(4.4);
        assert!(b.test_constraint(ConstraintOp::Gt, &Value::Integer(2)));
        assert!(b.test_constraint(ConstraintOp::Lt, &Value::Integer(5)));
        assert!(!b.test_constraint(ConstraintOp::Lt, &Value::Real(4.4)));
        assert!(b.test_constraint(ConstraintOp::Le, &Value::Real(4.4)));
        assert!(b.test_constraint(ConstraintOp::Ge, &Value::Integer(4)));
        assert!(!b.test_constraint(ConstraintOp::Eq, &Value::Integer(4)));
        assert!(b.test_constraint(ConstraintOp::Ne, &Value::Integer(4)));
    }

    #[test]
    fn null_semantics() {
        let null = Value::Null;
        assert!(!null.test_constraint(ConstraintOp::Eq, &Value::Null));
        assert!(!null.test_constraint(ConstraintOp::Ne, &Value::Integer(1)));
        assert!(null.test_constraint(ConstraintOp::Is, &Value::Null));
        assert!(!null.test_constraint(ConstraintOp::IsNot, &Value::Null));
        assert!(null.test_constraint(ConstraintOp::IsNot, &Value::Integer(1)));
        assert!(null.test_constraint(ConstraintOp::IsNull, &Value::Null));
        assert!(!null.test_constraint(ConstraintOp::IsNotNull, &Value::Null));
        assert!(Value::from("x").test_constraint(ConstraintOp::IsNotNull, &Value::Null));
    }

    #[test]
    fn incomparable_is_conservatively_false() {
        let blob = Value::Blob(vec![0xCA, 0xFE]);
        for op in [
            ConstraintOp::Eq,
            ConstraintOp::Ne,
            ConstraintOp::Lt,
            ConstraintOp::Gt,
            ConstraintOp::IsNot,
            ConstraintOp::Like,
            ConstraintOp::Glob,
        ] {
            assert!(!blob.test_constraint(op, &Value::Integer(1)), "{op}");
        }
        assert!(!Value::from("x").test_constraint(ConstraintOp::Match, &Value::from("x")));
        assert!(!Value::Integer(1).test_constraint(ConstraintOp::Function, &Value::Integer(1)));
    }

    #[test]
    fn pattern_constraints() {
        let c = Value::from("Three");
        assert!(c.test_constraint(ConstraintOp::Like, &Value::from("th%")));
        assert!(!c.test_constraint(ConstraintOp::Glob, &Value::from("th*")));
        assert!(c.test_constraint(ConstraintOp::Glob, &Value::from("Th*")));
        assert!(c.test_constraint(ConstraintOp::Regexp, &Value::from("e{2}$")));
        assert!(!c.test_constraint(ConstraintOp::Regexp, &Value::from("[")));
        // Numbers are matched through their text form.
        assert!(Value::Integer(123).test_constraint(ConstraintOp::Like, &Value::from("12%")));
    }

    #[test]
    fn limit_offset_admit_every_row() {
        assert!(Value::Null.test_constraint(ConstraintOp::Limit, &Value::Integer(0)));
        assert!(Value::Null.test_constraint(ConstraintOp::Offset, &Value::Integer(10)));
    }

    #[test]
    fn structural_equality() {
        assert_ne!(Value::Integer(1), Value::Real(1.0));
        assert_eq!(Value::Real(1.1), Value::Real(1.1));
        assert_ne!(Value::Real(0.0), Value::Real(-0.0));
        assert_eq!(Value::from("Bar"), Value::Text("Bar".to_owned()));
    }

    #[test]
    fn display_formatting() {
        assert_eq!(Value::Null.to_string(), "NULL");
        assert_eq!(Value::Integer(-1).to_string(), "-1");
        assert_eq!(Value::Real(120.0).to_string(), "120.0");
        assert_eq!(Value::from("it's").to_string(), "'it''s'");
        assert_eq!(Value::Blob(vec![0xCA, 0xFE]).to_string(), "X'CAFE'");
    }

    #[test]
    fn real_formatting() {
        assert_eq!(format_real(1.1), "1.1");
        assert_eq!(format_real(3.0), "3.0");
        assert_eq!(format_real(0.0), "0.0");
        assert_eq!(format_real(1e20), "1.0e+20");
        assert_eq!(format_real(0.000_01), "1.0e-05");
        assert_eq!(format_real(-2.5), "-2.5");
    }

    #[test]
    fn from_conversions() {
        assert_eq!(Value::from(42i64), Value::Integer(42));
        assert_eq!(Value::from(7i32), Value::Integer(7));
        assert_eq!(Value::from(true), Value::Integer(1));
        assert_eq!(Value::from(f64::NAN), Value::Null);
        assert_eq!(Value::from(vec![1u8]), Value::Blob(vec![1]));
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::from("x"));
    }

    #[test]
    fn serde_keeps_variants() {
        let row = vec![Value::Integer(1), Value::Real(1.1), Value::from("Bar"), Value::Null];
        let json = serde_json::to_string(&row).unwrap();
        let back: Vec<Value> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, row);
    }

    proptest! {
        #[test]
        fn prop_numeric_compare_is_antisymmetric(a in any::<i64>(), b in -1.0e19f64..1.0e19f64) {
            let lhs = Value::Integer(a);
            let rhs = Value::Real(b);
            prop_assert_eq!(lhs.compare(&rhs), rhs.compare(&lhs).map(Ordering::reverse));
        }

        #[test]
        fn prop_integer_text_roundtrip(i in any::<i64>()) {
            let text = Value::Integer(i).coerce(ValueKind::Text).unwrap();
            prop_assert_eq!(text.coerce(ValueKind::Integer), Some(Value::Integer(i)));
        }
    }
}
