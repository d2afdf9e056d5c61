//! The [`VirtualTableCursor`] trait.

use tracing::trace;
use vtbridge_error::{Result, VtabError};
use vtbridge_types::Value;

use crate::filter::Filter;

/// State every cursor carries: the table it scans and the last filter.
#[derive(Debug, Clone)]
pub struct CursorBase {
    table: String,
    filter: Option<Filter>,
}

impl CursorBase {
    #[must_use]
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_owned(),
            filter: None,
        }
    }

    /// Name of the table this cursor scans.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// The most recently applied filter, if any.
    pub const fn filter(&self) -> Option<&Filter> {
        self.filter.as_ref()
    }

    pub fn set_filter(&mut self, filter: Filter) {
        self.filter = Some(filter);
    }

    pub fn clear_filter(&mut self) {
        self.filter = None;
    }

    /// Whether the active filter admits this row. With no filter every row
    /// qualifies.
    pub fn allows(&self, rowid: i64, row: &[Value]) -> bool {
        self.filter.as_ref().is_none_or(|f| f.allows(rowid, row))
    }
}

/// One scan over a virtual table.
///
/// Cursors are `Send` but not `Sync`. The host drives them in the order
/// `filter → (next | has_current_row | current_rowid | column_value)* →
/// close`; `filter` may be repeated to restart the scan.
pub trait VirtualTableCursor: Send {
    fn base(&self) -> &CursorBase;

    fn base_mut(&mut self) -> &mut CursorBase;

    /// Begin (or restart) a scan. Must position on the first qualifying
    /// row. Default stores the filter and positions nowhere.
    fn filter(&mut self, filter: Filter) -> Result<()> {
        trace!(
            target: "vtbridge.vtab",
            table = self.base().table(),
            plan = filter.plan(),
            arguments = filter.arguments().len(),
            "filter"
        );
        self.base_mut().set_filter(filter);
        Ok(())
    }

    /// Advance one row. An error aborts the statement; end of data is
    /// reported by [`has_current_row`](Self::has_current_row).
    fn next(&mut self) -> Result<()> {
        Ok(())
    }

    fn has_current_row(&self) -> bool {
        false
    }

    fn current_rowid(&self) -> Result<i64> {
        Err(VtabError::misuse(format!(
            "cursor on {} is not positioned on a row",
            self.base().table()
        )))
    }

    /// Value of column `column` on the current row; `None` reads as NULL.
    fn column_value(&self, _column: i32) -> Option<Value> {
        None
    }

    /// Release resources. The cursor is never used again.
    fn close(&mut self) -> Result<()> {
        trace!(target: "vtbridge.vtab", table = self.base().table(), "close");
        self.base_mut().clear_filter();
        Ok(())
    }
}

/// A cursor over no rows; what a table gets if it never overrides
/// `open_cursor`.
#[derive(Debug, Clone)]
pub struct EmptyCursor {
    base: CursorBase,
}

impl EmptyCursor {
    #[must_use]
    pub fn new(table: &str) -> Self {
        Self {
            base: CursorBase::new(table),
        }
    }
}

impl VirtualTableCursor for EmptyCursor {
    fn base(&self) -> &CursorBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut CursorBase {
        &mut self.base
    }
}

#[cfg(test)]
mod tests {
    use vtbridge_types::ConstraintOp;

    use super::*;
    use crate::constraint::{Constraint, ConstraintInfo, Index};

    /// Integers `1..=limit`, the shape of a `generate_series` table.
    struct SeriesCursor {
        base: CursorBase,
        limit: i64,
        current: i64,
    }

    impl SeriesCursor {
        fn qualifies(&self) -> bool {
            self.base.allows(self.current, &[Value::Integer(self.current)])
        }

        fn skip_rejected(&mut self) {
            while self.current <= self.limit && !self.qualifies() {
                self.current += 1;
            }
        }
    }

    impl VirtualTableCursor for SeriesCursor {
        fn base(&self) -> &CursorBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut CursorBase {
            &mut self.base
        }

        fn filter(&mut self, filter: Filter) -> Result<()> {
            self.base.set_filter(filter);
            self.current = 1;
            self.skip_rejected();
            Ok(())
        }

        fn next(&mut self) -> Result<()> {
            self.current += 1;
            self.skip_rejected();
            Ok(())
        }

        fn has_current_row(&self) -> bool {
            self.current <= self.limit
        }

        fn current_rowid(&self) -> Result<i64> {
            Ok(self.current)
        }

        fn column_value(&self, column: i32) -> Option<Value> {
            (column == 0).then_some(Value::Integer(self.current))
        }
    }

    fn collect(cursor: &mut dyn VirtualTableCursor) -> Vec<i64> {
        let mut rows = Vec::new();
        while cursor.has_current_row() {
            rows.push(cursor.current_rowid().unwrap());
            cursor.next().unwrap();
        }
        rows
    }

    fn gt_filter(bound: i64) -> Filter {
        let info = ConstraintInfo::new(vec![Constraint::new(0, 0, ConstraintOp::Gt)], vec![], 1);
        Filter::new(0, Index::accept_usable(&info), vec![Value::Integer(bound)]).unwrap()
    }

    #[test]
    fn filter_then_iterate() {
        let mut cursor = SeriesCursor {
            base: CursorBase::new("series"),
            limit: 5,
            current: 0,
        };
        cursor.filter(gt_filter(2)).unwrap();
        assert_eq!(collect(&mut cursor), vec![3, 4, 5]);
        assert_eq!(cursor.column_value(1), None);
    }

    #[test]
    fn refilter_restarts_the_scan() {
        let mut cursor = SeriesCursor {
            base: CursorBase::new("series"),
            limit: 5,
            current: 0,
        };
        cursor.filter(gt_filter(3)).unwrap();
        cursor.next().unwrap();
        cursor.filter(gt_filter(0)).unwrap();
        assert_eq!(collect(&mut cursor), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn empty_cursor_defaults() {
        let mut cursor = EmptyCursor::new("t");
        cursor.filter(gt_filter(0)).unwrap();
        assert!(cursor.base().filter().is_some());
        assert!(!cursor.has_current_row());
        assert!(cursor.current_rowid().is_err());
        assert_eq!(cursor.column_value(0), None);
        cursor.next().unwrap();
        cursor.close().unwrap();
        assert!(cursor.base().filter().is_none());
        assert_eq!(cursor.base().table(), "t");
    }

    #[test]
    fn cursor_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<EmptyCursor>();
        assert_send::<Box<dyn VirtualTableCursor>>();
    }
}
