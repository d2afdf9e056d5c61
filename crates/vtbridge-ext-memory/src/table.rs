//! The memory table: planning, mutation and transactions.

use std::sync::{Arc, Weak};

use tracing::{debug, info};
use vtbridge_error::{Result, VtabError};
use vtbridge_types::{ConstraintOp, TypeAffinity, Value};
use vtbridge_vtab::{
    ConstraintInfo, Declaration, Index, IndexSolution, ROWID_COLUMN, TableArgs, TableBase,
    VirtualTable, VirtualTableCursor, parse_column_list,
};

use crate::cursor::MemoryCursor;
use crate::module::{Registry, StoreKey};
use crate::store::{Row, SharedStore, Store};

/// Cost of a plan that pins the key to one value.
const KEY_EQ_COST: f64 = 1.0;

/// A mutable table held entirely in memory.
///
/// With a single-column `PRIMARY KEY` rows are keyed and ordered by that
/// column; otherwise by rowid. Values are stored exactly as given.
pub struct MemoryTable {
    base: TableBase,
    declaration: Declaration,
    key_column: Option<usize>,
    store: SharedStore,
    registry: Weak<Registry>,
    transaction: Option<Store>,
    savepoints: Vec<(i32, Store)>,
}

impl MemoryTable {
    pub(crate) fn new(args: &TableArgs, store: SharedStore, registry: Weak<Registry>) -> Result<Self> {
        let declaration = parse_column_list(&args.arguments.join(", "))?;
        let key_column = declaration.key_column();
        Ok(Self {
            base: TableBase::new(args),
            declaration,
            key_column,
            store,
            registry,
            transaction: None,
            savepoints: Vec::new(),
        })
    }

    pub const fn declaration(&self) -> &Declaration {
        &self.declaration
    }

    pub fn row_count(&self) -> usize {
        self.store.read().len()
    }

    fn is_key(&self, column: i32) -> bool {
        match self.key_column {
            Some(key) => usize::try_from(column).is_ok_and(|c| c == key),
            None => column == ROWID_COLUMN,
        }
    }

    fn key_name(&self) -> String {
        let column = self
            .key_column
            .and_then(|k| self.declaration.columns.get(k))
            .map_or("rowid", |c| c.name.as_str());
        format!("{}.{column}", self.base.name())
    }

    fn check_row(&self, values: &[Value]) -> Result<()> {
        if values.len() != self.declaration.len() {
            return Err(VtabError::domain(format!(
                "table {} has {} columns but {} values were supplied",
                self.base.name(),
                self.declaration.len(),
                values.len()
            )));
        }
        for (i, (column, value)) in self.declaration.columns.iter().zip(values).enumerate() {
            let is_key = self.key_column == Some(i);
            let auto_key = is_key && column.affinity == TypeAffinity::Integer;
            if (column.not_null || is_key) && value.is_null() && !auto_key {
                return Err(VtabError::NotNullViolation {
                    column: format!("{}.{}", self.base.name(), column.name),
                });
            }
            if is_key && value.as_real().is_some_and(f64::is_nan) {
                return Err(VtabError::TypeMismatch {
                    expected: "comparable key".to_owned(),
                    actual: "NaN".to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Fill a NULL `INTEGER PRIMARY KEY` the way the host assigns rowids.
    fn assign_auto_key(&self, store: &mut Store, values: &mut [Value], requested: Option<&Value>) {
        let Some(k) = self.key_column else { return };
        if !values[k].is_null() {
            return;
        }
        let integer_key = self.declaration.columns[k].affinity == TypeAffinity::Integer;
        if integer_key {
            values[k] = match requested.and_then(Value::as_integer) {
                Some(rowid) => Value::Integer(rowid),
                None => Value::Integer(store.allocate_rowid()),
            };
        }
    }

    fn integer_rowid(requested: &Value) -> Result<Value> {
        requested
            .as_integer()
            .map(Value::Integer)
            .ok_or_else(|| VtabError::TypeMismatch {
                expected: "integer rowid".to_owned(),
                actual: requested.typeof_str().to_owned(),
            })
    }

    fn rowid_for(store: &mut Store, key: &Value, previous: Option<i64>) -> i64 {
        match (key, previous) {
            (Value::Integer(i), _) => *i,
            (_, Some(rowid)) => rowid,
            _ => store.allocate_rowid(),
        }
    }
}

impl VirtualTable for MemoryTable {
    fn base(&self) -> &TableBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TableBase {
        &mut self.base
    }

    /// Key equality is a point lookup; key ranges a bounded walk; anything
    /// else a full scan with a local pre-filter.
    #[allow(clippy::cast_precision_loss)]
    fn propose_index(&self, info: &ConstraintInfo) -> Result<IndexSolution> {
        let rows = self.row_count();
        let scan_cost = (rows as f64).max(1.0);
        let mut index = Index::default();

        let key_eq = info
            .usable()
            .find(|c| self.is_key(c.column) && c.op == ConstraintOp::Eq);
        let (label, cost, estimate) = if let Some(eq) = key_eq {
            index.push(eq, true);
            index.zero_or_one_row = true;
            ("key-eq", KEY_EQ_COST, 1)
        } else {
            let mut ranged = false;
            for c in info.usable().filter(|c| self.is_key(c.column) && c.op.is_range()) {
                index.push(c, true);
                ranged = true;
            }
            if ranged {
                let cost = 10.0 * (rows.max(2) as f64).log2();
                ("key-range", cost, i64::try_from(rows / 4).unwrap_or(i64::MAX).max(1))
            } else {
                ("scan", scan_cost, i64::try_from(rows).unwrap_or(i64::MAX))
            }
        };

        for c in info.usable() {
            let pushable = c.op.is_row_predicate()
                && !matches!(
                    c.op,
                    ConstraintOp::Match | ConstraintOp::Function | ConstraintOp::Unknown
                );
            let taken = index
                .constraints
                .iter()
                .any(|u| u.constraint.constraint_index == c.constraint_index);
            if pushable && !taken {
                index.push(c, false);
            }
        }

        let ordered = matches!(
            info.order_by.as_slice(),
            [term] if !term.desc && self.is_key(term.column)
        );
        debug!(
            target: "vtbridge.memory",
            table = self.base.name(),
            plan = label,
            cost,
            consumed = index.argument_count(),
            ordered,
            "proposed index"
        );
        Ok(index
            .with_cost(cost)
            .with_rows(estimate)
            .with_order_by_consumed(ordered)
            .with_idx_str(label)
            .into())
    }

    fn open_cursor(&self) -> Result<Box<dyn VirtualTableCursor>> {
        Ok(Box::new(MemoryCursor::new(
            self.base.name(),
            Arc::downgrade(&self.store),
            self.key_column,
        )))
    }

    fn insert(&mut self, key: Option<&Value>, values: &[Value]) -> Result<Option<i64>> {
        self.check_row(values)?;
        let mut values = values.to_vec();
        let mut store = self.store.write();
        self.assign_auto_key(&mut store, &mut values, key);

        let row_key = match (self.key_column, key) {
            (Some(k), _) => values[k].clone(),
            (None, Some(requested)) => Self::integer_rowid(requested)?,
            (None, None) => Value::Integer(store.allocate_rowid()),
        };
        if store.contains(&row_key) {
            return Err(VtabError::PrimaryKeyViolation {
                key: self.key_name(),
            });
        }
        let rowid = Self::rowid_for(&mut store, &row_key, None);
        debug!(target: "vtbridge.memory", table = self.base.name(), key = %row_key, rowid, "insert");
        store.put(row_key, Row { rowid, values });
        Ok(Some(rowid))
    }

    fn update(&mut self, key: &Value, new_key: Option<&Value>, values: &[Value]) -> Result<()> {
        self.check_row(values)?;
        let mut values = values.to_vec();
        let mut store = self.store.write();
        let previous = store
            .get(key)
            .map(|row| row.rowid)
            .ok_or_else(|| VtabError::NoSuchRow {
                key: key.to_string(),
            })?;
        self.assign_auto_key(&mut store, &mut values, new_key.or(Some(key)));

        let target = match self.key_column {
            Some(k) => values[k].clone(),
            None => Self::integer_rowid(new_key.unwrap_or(key))?,
        };
        let moved = store.get(&target).is_none_or(|row| row.rowid != previous);
        if moved && store.contains(&target) {
            return Err(VtabError::PrimaryKeyViolation {
                key: self.key_name(),
            });
        }
        store.remove(key);
        let rowid = Self::rowid_for(&mut store, &target, Some(previous));
        debug!(
            target: "vtbridge.memory",
            table = self.base.name(),
            %key,
            new_key = %target,
            "update"
        );
        store.put(target, Row { rowid, values });
        Ok(())
    }

    fn delete(&mut self, key: &Value) -> Result<()> {
        let removed = self.store.write().remove(key);
        if removed.is_none() {
            return Err(VtabError::NoSuchRow {
                key: key.to_string(),
            });
        }
        debug!(target: "vtbridge.memory", table = self.base.name(), %key, "delete");
        Ok(())
    }

    fn disconnect(&mut self) -> Result<()> {
        info!(
            target: "vtbridge.memory",
            table = self.base.name(),
            rows = self.row_count(),
            "disconnected; rows retained"
        );
        Ok(())
    }

    fn destroy(&mut self) -> Result<()> {
        self.store.write().clear();
        if let Some(registry) = self.registry.upgrade() {
            registry
                .lock()
                .remove(&StoreKey::new(self.base.schema(), self.base.name()));
        }
        info!(target: "vtbridge.memory", table = self.base.name(), "destroyed");
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        self.transaction = Some(self.store.read().clone());
        self.savepoints.clear();
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        self.transaction = None;
        self.savepoints.clear();
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        if let Some(snapshot) = self.transaction.take() {
            *self.store.write() = snapshot;
            debug!(target: "vtbridge.memory", table = self.base.name(), "rolled back");
        }
        self.savepoints.clear();
        Ok(())
    }

    fn savepoint(&mut self, level: i32) -> Result<()> {
        self.savepoints.retain(|(n, _)| *n < level);
        self.savepoints.push((level, self.store.read().clone()));
        Ok(())
    }

    fn release(&mut self, level: i32) -> Result<()> {
        self.savepoints.retain(|(n, _)| *n < level);
        Ok(())
    }

    /// Restores the state at savepoint `level`, which stays open.
    fn rollback_to(&mut self, level: i32) -> Result<()> {
        self.savepoints.retain(|(n, _)| *n <= level);
        if let Some((_, snapshot)) = self.savepoints.last().filter(|(n, _)| *n == level) {
            *self.store.write() = snapshot.clone();
        }
        Ok(())
    }

    fn rename(&mut self, new_name: &str) -> Result<()> {
        let Some(registry) = self.registry.upgrade() else {
            return Ok(());
        };
        let mut registry = registry.lock();
        let to = StoreKey::new(self.base.schema(), new_name);
        if registry.contains_key(&to) {
            return Err(VtabError::domain(format!(
                "there is already another table or index with this name: {new_name}"
            )));
        }
        let from = StoreKey::new(self.base.schema(), self.base.name());
        if let Some(store) = registry.remove(&from) {
            registry.insert(to, store);
        }
        info!(target: "vtbridge.memory", from = self.base.name(), to = new_name, "renamed");
        Ok(())
    }
}
