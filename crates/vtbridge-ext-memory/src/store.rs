//! Ordered row storage shared by a table and its cursors.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::Arc;

use parking_lot::RwLock;
use vtbridge_types::Value;

/// A store shared between the table that owns it (strong) and the cursors
/// scanning it (weak).
pub type SharedStore = Arc<RwLock<Store>>;

/// A [`Value`] with the total order rows are kept in.
///
/// NULL sorts first, then numbers (integers and reals interleaved by
/// exact value), then text, then blobs; the same order the host uses for
/// `ORDER BY`. A NaN real falls in the NULL class, and `-0.0` equals `0.0`.
#[derive(Debug, Clone)]
pub struct RowKey(pub Value);

impl RowKey {
    /// Wrap `value`, storing `-0.0` as `0.0`.
    pub fn new(value: Value) -> Self {
        match value {
            Value::Real(r) if r == 0.0 => Self(Value::Real(0.0)),
            other => Self(other),
        }
    }

    const fn class(&self) -> u8 {
        match self.0 {
            Value::Null => 0,
            Value::Real(r) if r.is_nan() => 0,
            Value::Integer(_) | Value::Real(_) => 1,
            Value::Text(_) => 2,
            Value::Blob(_) => 3,
        }
    }

    /// Smallest key of the text class.
    pub(crate) fn first_text() -> Self {
        Self(Value::Text(String::new()))
    }

    /// Smallest key of the blob class.
    pub(crate) fn first_blob() -> Self {
        Self(Value::Blob(Vec::new()))
    }

    pub const fn is_numeric(&self) -> bool {
        self.class() == 1
    }
}

impl Ord for RowKey {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.class().cmp(&other.class()) {
            // NULL and NaN are all equal.
            Ordering::Equal if self.class() == 0 => Ordering::Equal,
            // Exact for mixed integer/real pairs; NaN is excluded above.
            Ordering::Equal => self.0.compare(&other.0).unwrap_or(Ordering::Equal),
            unequal => unequal,
        }
    }
}

impl PartialOrd for RowKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for RowKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for RowKey {}

/// One stored row.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub rowid: i64,
    pub values: Vec<Value>,
}

/// Rows ordered by key, plus the rowid allocator.
#[derive(Debug, Clone, Default)]
pub struct Store {
    rows: BTreeMap<RowKey, Row>,
    next_rowid: i64,
}

impl Store {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn get(&self, key: &Value) -> Option<&Row> {
        self.rows.get(&RowKey::new(key.clone()))
    }

    pub fn contains(&self, key: &Value) -> bool {
        self.get(key).is_some()
    }

    /// Rows in key order.
    pub fn rows(&self) -> impl Iterator<Item = (&Value, &Row)> {
        self.rows.iter().map(|(k, r)| (&k.0, r))
    }

    /// Rows with keys in `[lower, upper]` (each end per its bound), in key
    /// order.
    pub(crate) fn window<'s>(
        &'s self,
        lower: Bound<&RowKey>,
        upper: Bound<&RowKey>,
    ) -> impl Iterator<Item = (&'s RowKey, &'s Row)> + use<'s> {
        let upper = upper.cloned();
        self.rows
            .range::<RowKey, _>((lower, Bound::Unbounded))
            .take_while(move |(key, _)| match &upper {
                Bound::Included(end) => *key <= end,
                Bound::Excluded(end) => *key < end,
                Bound::Unbounded => true,
            })
    }

    /// Next unused rowid. Rowids only grow.
    pub fn allocate_rowid(&mut self) -> i64 {
        let rowid = self.next_rowid.max(1);
        self.next_rowid = rowid.saturating_add(1);
        rowid
    }

    /// Store `row` under `key`, replacing any row already there.
    pub fn put(&mut self, key: Value, row: Row) {
        self.next_rowid = self.next_rowid.max(row.rowid.saturating_add(1));
        self.rows.insert(RowKey::new(key), row);
    }

    pub fn remove(&mut self, key: &Value) -> Option<Row> {
        self.rows.remove(&RowKey::new(key.clone()))
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }
}
