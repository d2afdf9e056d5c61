//! Cursor over a memory table.

use std::ops::Bound;
use std::sync::Weak;

use parking_lot::RwLock;
use tracing::trace;
use vtbridge_error::{Result, VtabError};
use vtbridge_types::{ConstraintOp, Value};
use vtbridge_vtab::{CursorBase, Filter, ROWID_COLUMN, VirtualTableCursor};

use crate::store::{Row, RowKey, Store};

/// Scans a snapshot of the rows that matched the last filter.
///
/// The snapshot is taken at `filter` time, so mutations made while the scan
/// is in progress do not disturb it.
pub struct MemoryCursor {
    base: CursorBase,
    store: Weak<RwLock<Store>>,
    key_column: Option<usize>,
    rows: Vec<Row>,
    position: usize,
}

impl MemoryCursor {
    pub(crate) fn new(table: &str, store: Weak<RwLock<Store>>, key_column: Option<usize>) -> Self {
        Self {
            base: CursorBase::new(table),
            store,
            key_column,
            rows: Vec::new(),
            position: 0,
        }
    }

    fn is_key(&self, column: i32) -> bool {
        match self.key_column {
            Some(key) => usize::try_from(column).is_ok_and(|c| c == key),
            None => column == ROWID_COLUMN,
        }
    }

    fn current(&self) -> Option<&Row> {
        self.rows.get(self.position)
    }
}

/// Key bounds implied by the numeric key constraints of a filter.
///
/// Each end is taken from the first constraint that sets it; any one
/// constraint already bounds a superset of the matching rows.
fn numeric_bounds(filter: &Filter, is_key: impl Fn(i32) -> bool) -> Option<(Bound<RowKey>, Bound<RowKey>)> {
    let mut lower = Bound::Unbounded;
    let mut upper = Bound::Unbounded;
    for (used, argument) in filter.bindings() {
        let constraint = &used.constraint;
        if !is_key(constraint.column) {
            continue;
        }
        if !argument.is_numeric() {
            // A text or blob argument can match keys of several classes.
            return None;
        }
        let key = || RowKey(argument.clone());
        match constraint.op {
            ConstraintOp::Eq if matches!(lower, Bound::Unbounded) && matches!(upper, Bound::Unbounded) => {
                lower = Bound::Included(key());
                upper = Bound::Included(key());
            }
            ConstraintOp::Gt if matches!(lower, Bound::Unbounded) => lower = Bound::Excluded(key()),
            ConstraintOp::Ge if matches!(lower, Bound::Unbounded) => lower = Bound::Included(key()),
            ConstraintOp::Lt if matches!(upper, Bound::Unbounded) => upper = Bound::Excluded(key()),
            ConstraintOp::Le if matches!(upper, Bound::Unbounded) => upper = Bound::Included(key()),
            _ => {}
        }
    }
    Some((lower, upper))
}

/// Rows that may satisfy `filter`, in key order. Always a superset of the
/// rows `Filter::allows` admits.
fn candidates<'a>(
    store: &'a Store,
    filter: &Filter,
    is_key: impl Fn(i32) -> bool,
) -> Box<dyn Iterator<Item = &'a Row> + 'a> {
    let Some((lower, upper)) = numeric_bounds(filter, is_key) else {
        return Box::new(store.rows().map(|(_, row)| row));
    };
    if matches!((&lower, &upper), (Bound::Unbounded, Bound::Unbounded)) {
        return Box::new(store.rows().map(|(_, row)| row));
    }
    // A numeric argument compares against numeric keys by value and against
    // text keys as text, so the text class is always scanned too.
    let numeric: Vec<&Row> = {
        let null = RowKey(Value::Null);
        let first_text = RowKey::first_text();
        let start = match &lower {
            Bound::Unbounded => Bound::Excluded(&null),
            Bound::Included(k) => Bound::Included(k),
            Bound::Excluded(k) => Bound::Excluded(k),
        };
        let end = match &upper {
            Bound::Unbounded => Bound::Excluded(&first_text),
            Bound::Included(k) => Bound::Included(k),
            Bound::Excluded(k) => Bound::Excluded(k),
        };
        store
            .window(start, end)
            .filter(|(key, _)| key.is_numeric())
            .map(|(_, row)| row)
            .collect()
    };
    let first_text = RowKey::first_text();
    let first_blob = RowKey::first_blob();
    let text: Vec<&Row> = store
        .window(Bound::Included(&first_text), Bound::Excluded(&first_blob))
        .map(|(_, row)| row)
        .collect();
    Box::new(numeric.into_iter().chain(text))
}

impl VirtualTableCursor for MemoryCursor {
    fn base(&self) -> &CursorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CursorBase {
        &mut self.base
    }

    fn filter(&mut self, filter: Filter) -> Result<()> {
        let store = self.store.upgrade().ok_or_else(|| VtabError::TableGone {
            name: self.base.table().to_owned(),
        })?;
        let store = store.read();
        let rows: Vec<Row> = candidates(&store, &filter, |c| self.is_key(c))
            .filter(|row| filter.allows(row.rowid, &row.values))
            .cloned()
            .collect();
        trace!(
            target: "vtbridge.memory",
            table = self.base.table(),
            plan = filter.plan(),
            scanned = store.len(),
            matched = rows.len(),
            "filter"
        );
        drop(store);
        self.rows = rows;
        self.position = 0;
        self.base.set_filter(filter);
        Ok(())
    }

    fn next(&mut self) -> Result<()> {
        if self.position < self.rows.len() {
            self.position += 1;
        }
        Ok(())
    }

    fn has_current_row(&self) -> bool {
        self.position < self.rows.len()
    }

    fn current_rowid(&self) -> Result<i64> {
        self.current().map(|row| row.rowid).ok_or_else(|| {
            VtabError::misuse(format!(
                "cursor on {} is not positioned on a row",
                self.base.table()
            ))
        })
    }

    fn column_value(&self, column: i32) -> Option<Value> {
        let column = usize::try_from(column).ok()?;
        self.current()?.values.get(column).cloned()
    }

    fn close(&mut self) -> Result<()> {
        trace!(target: "vtbridge.memory", table = self.base.table(), "close");
        self.rows.clear();
        self.position = 0;
        self.base.clear_filter();
        Ok(())
    }
}
