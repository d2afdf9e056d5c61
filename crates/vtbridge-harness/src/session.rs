//! A minimal query engine driving a [`VtabBridge`] through its host entry
//! points.

use std::cmp::Ordering;
use std::collections::HashMap;

use tracing::{debug, debug_span, trace};
use vtbridge_error::{ErrorCode, VtabError};
use vtbridge_host::index_info::op_to_code;
use vtbridge_host::{
    BridgeConfig, CursorHandle, HostConstraint, HostError, HostIndexInfo, HostOrderBy, HostResult,
    TableHandle, VtabBridge,
};
use vtbridge_types::{ConstraintOp, Value};
use vtbridge_vtab::{Declaration, Module, ROWID_COLUMN};

use crate::query::{Assignment, OrderTerm, Predicate, ROWID, sort_order};

/// Schema every session table lives in.
pub const SCHEMA: &str = "main";

#[derive(Debug, Clone)]
struct SessionTable {
    handle: TableHandle,
    declaration: Declaration,
}

/// A row as the executor reads it off a cursor.
#[derive(Debug, Clone, PartialEq)]
struct ScannedRow {
    rowid: i64,
    values: Vec<Value>,
}

/// Constraint sets offered to `best_index` for one statement, most
/// permissive first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Candidate {
    All,
    Equality,
    Nothing,
}

impl Candidate {
    const ROUNDS: [Self; 3] = [Self::All, Self::Equality, Self::Nothing];

    const fn offers(self, op: ConstraintOp) -> bool {
        match self {
            Self::All => true,
            Self::Equality => op.is_equality(),
            Self::Nothing => false,
        }
    }
}

/// One connection's worth of statements against virtual tables.
///
/// Tables are addressed by name (case-insensitive) in schema [`SCHEMA`].
/// Every statement plans through `best_index`, scans through a cursor and
/// writes through `update`, the way a host engine would.
#[derive(Debug, Default)]
pub struct HostSession {
    bridge: VtabBridge,
    tables: HashMap<String, SessionTable>,
}

impl HostSession {
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            bridge: VtabBridge::new(config),
            tables: HashMap::new(),
        }
    }

    pub const fn bridge(&self) -> &VtabBridge {
        &self.bridge
    }

    pub fn bridge_mut(&mut self) -> &mut VtabBridge {
        &mut self.bridge
    }

    pub fn register_module(&mut self, module: Box<dyn Module>) -> HostResult<()> {
        self.bridge.register_module(module)
    }

    /// Handle of a table created or connected in this session.
    pub fn handle(&self, name: &str) -> Option<TableHandle> {
        self.tables.get(&name.to_ascii_lowercase()).map(|t| t.handle)
    }

    pub fn declaration(&self, name: &str) -> Option<&Declaration> {
        self.tables
            .get(&name.to_ascii_lowercase())
            .map(|t| &t.declaration)
    }

    // ── DDL ─────────────────────────────────────────────────────────

    /// `CREATE VIRTUAL TABLE name USING module(args...)`.
    pub fn execute_create(&mut self, module: &str, name: &str, args: &[&str]) -> HostResult<TableHandle> {
        self.attach(module, name, args, true)
    }

    /// Reattach to a table a previous session created.
    pub fn execute_connect(&mut self, module: &str, name: &str, args: &[&str]) -> HostResult<TableHandle> {
        self.attach(module, name, args, false)
    }

    fn attach(&mut self, module: &str, name: &str, args: &[&str], create: bool) -> HostResult<TableHandle> {
        let _span = debug_span!("host_session", stmt = "create", table = name).entered();
        let key = name.to_ascii_lowercase();
        if self.tables.contains_key(&key) {
            return Err(HostError::new(
                ErrorCode::Error,
                format!("table {name} already exists"),
            ));
        }
        let mut argv = vec![module, SCHEMA, name];
        argv.extend_from_slice(args);
        let created = if create {
            self.bridge.create(&argv)?
        } else {
            self.bridge.connect(&argv)?
        };
        let Some(declaration) = created.declaration else {
            // The executor needs column names; give the table back.
            let _ = self.bridge.disconnect(created.handle);
            return Err(HostError::new(
                ErrorCode::Error,
                format!("malformed declaration for table {name}: {}", created.sql),
            ));
        };
        debug!(target: "vtbridge.harness", table = name, handle = %created.handle, sql = %created.sql, "table attached");
        self.tables.insert(
            key,
            SessionTable {
                handle: created.handle,
                declaration,
            },
        );
        Ok(created.handle)
    }

    /// `DROP TABLE name`.
    pub fn drop_table(&mut self, name: &str) -> HostResult<()> {
        let table = self.detach(name)?;
        self.bridge.destroy(table.handle)
    }

    /// Close the session's use of `name`, leaving its data to the module.
    pub fn disconnect(&mut self, name: &str) -> HostResult<()> {
        let table = self.detach(name)?;
        self.bridge.disconnect(table.handle)
    }

    /// `ALTER TABLE name RENAME TO new_name`.
    pub fn rename_table(&mut self, name: &str, new_name: &str) -> HostResult<()> {
        let table = self.lookup(name)?;
        let to = new_name.to_ascii_lowercase();
        if self.tables.contains_key(&to) {
            return Err(HostError::new(
                ErrorCode::Error,
                format!("there is already another table or index with this name: {new_name}"),
            ));
        }
        self.bridge.rename(table.handle, new_name)?;
        self.tables.remove(&name.to_ascii_lowercase());
        self.tables.insert(to, table);
        Ok(())
    }

    fn detach(&mut self, name: &str) -> HostResult<SessionTable> {
        self.tables
            .remove(&name.to_ascii_lowercase())
            .ok_or_else(|| no_such_table(name))
    }

    fn lookup(&self, name: &str) -> HostResult<SessionTable> {
        self.tables
            .get(&name.to_ascii_lowercase())
            .cloned()
            .ok_or_else(|| no_such_table(name))
    }

    // ── DML ─────────────────────────────────────────────────────────

    /// `SELECT * FROM name WHERE predicates ORDER BY order_by`.
    ///
    /// `columns_used` is passed to planning as is.
    pub fn select(
        &mut self,
        name: &str,
        predicates: &[Predicate],
        order_by: &[OrderTerm],
        columns_used: u64,
    ) -> HostResult<Vec<Vec<Value>>> {
        let _span = debug_span!("host_session", stmt = "select", table = name).entered();
        let table = self.lookup(name)?;
        let rows = self.scan(&table, predicates, order_by, columns_used)?;
        Ok(rows.into_iter().map(|row| row.values).collect())
    }

    /// `INSERT INTO name VALUES (values...)`. Returns the rowid the table
    /// reported, if any.
    pub fn insert(&mut self, name: &str, values: Vec<Value>) -> HostResult<Option<i64>> {
        let _span = debug_span!("host_session", stmt = "insert", table = name).entered();
        let table = self.lookup(name)?;
        let mut argv = Vec::with_capacity(values.len() + 2);
        argv.push(Value::Null);
        argv.push(Value::Null);
        argv.extend(values);
        self.bridge.update(table.handle, &argv)
    }

    /// `UPDATE name SET assignments WHERE predicates`. Returns the number of
    /// rows changed.
    ///
    /// Matching rows are collected before the first write, and every
    /// assignment sees the row as it was before the statement.
    pub fn update_where(
        &mut self,
        name: &str,
        predicates: &[Predicate],
        assignments: &[Assignment],
    ) -> HostResult<usize> {
        let _span = debug_span!("host_session", stmt = "update", table = name).entered();
        let table = self.lookup(name)?;
        let targets = assignments
            .iter()
            .map(|a| {
                table
                    .declaration
                    .column_index(&a.column)
                    .map(|column| (column, a))
                    .ok_or_else(|| no_such_column(&a.column))
            })
            .collect::<HostResult<Vec<_>>>()?;

        let width = table.declaration.len();
        let rows = self.scan(&table, predicates, &[], all_columns(width))?;
        for row in &rows {
            let old_key = row_key(&table.declaration, row.rowid, &row.values);
            let mut values = row.values.clone();
            for (column, assignment) in &targets {
                values[*column] = assignment.apply(&row.values[*column]);
            }
            let new_key = row_key(&table.declaration, row.rowid, &values);
            trace!(target: "vtbridge.harness", %old_key, %new_key, "update row");
            let mut argv = Vec::with_capacity(width + 2);
            argv.push(old_key);
            argv.push(new_key);
            argv.extend(values);
            self.bridge.update(table.handle, &argv)?;
        }
        Ok(rows.len())
    }

    /// `DELETE FROM name WHERE predicates`. Returns the number of rows
    /// removed.
    pub fn delete_where(&mut self, name: &str, predicates: &[Predicate]) -> HostResult<usize> {
        let _span = debug_span!("host_session", stmt = "delete", table = name).entered();
        let table = self.lookup(name)?;
        let rows = self.scan(&table, predicates, &[], all_columns(table.declaration.len()))?;
        for row in &rows {
            let key = row_key(&table.declaration, row.rowid, &row.values);
            self.bridge.update(table.handle, &[key])?;
        }
        Ok(rows.len())
    }

    // ── Planning ────────────────────────────────────────────────────

    /// The plan a `SELECT` with these terms would run.
    pub fn plan_for(
        &mut self,
        name: &str,
        predicates: &[Predicate],
        order_by: &[OrderTerm],
    ) -> HostResult<HostIndexInfo> {
        let table = self.lookup(name)?;
        let columns = resolve_predicates(&table.declaration, predicates)?;
        let order = resolve_order(&table.declaration, order_by)?;
        let width = table.declaration.len();
        self.choose_plan(table.handle, predicates, &columns, &order, all_columns(width))
    }

    /// Offer each candidate constraint set and keep the cheapest plan.
    fn choose_plan(
        &mut self,
        handle: TableHandle,
        predicates: &[Predicate],
        columns: &[i32],
        order: &[HostOrderBy],
        columns_used: u64,
    ) -> HostResult<HostIndexInfo> {
        let mut best: Option<HostIndexInfo> = None;
        for candidate in Candidate::ROUNDS {
            let constraints = predicates
                .iter()
                .zip(columns)
                .map(|(p, &column)| HostConstraint {
                    column,
                    op: op_to_code(p.op),
                    usable: candidate.offers(p.op),
                })
                .collect();
            let mut info = HostIndexInfo::new(constraints, order.to_vec(), columns_used);
            for (i, p) in predicates.iter().enumerate() {
                if p.op.has_argument() {
                    info = info.with_right_value(i, p.value.clone());
                }
            }
            match self.bridge.best_index(handle, &mut info) {
                Ok(()) => {}
                Err(err) if err.code == ErrorCode::Constraint => {
                    debug!(target: "vtbridge.harness", ?candidate, "candidate has no solution");
                    continue;
                }
                Err(err) => return Err(err),
            }
            debug!(
                target: "vtbridge.harness",
                ?candidate,
                plan = info.idx_num,
                cost = info.estimated_cost,
                "candidate planned"
            );
            if best
                .as_ref()
                .is_none_or(|b| info.estimated_cost < b.estimated_cost)
            {
                best = Some(info);
            }
        }
        // Every candidate rejected is a planning failure, not a constraint.
        best.ok_or_else(|| {
            HostError::new(ErrorCode::Error, VtabError::NoQuerySolution.to_string())
        })
    }

    // ── Execution ───────────────────────────────────────────────────

    fn scan(
        &mut self,
        table: &SessionTable,
        predicates: &[Predicate],
        order_by: &[OrderTerm],
        columns_used: u64,
    ) -> HostResult<Vec<ScannedRow>> {
        let columns = resolve_predicates(&table.declaration, predicates)?;
        let order = resolve_order(&table.declaration, order_by)?;
        let info = self.choose_plan(table.handle, predicates, &columns, &order, columns_used)?;
        let args = bind_arguments(&info, predicates);
        let width = i32::try_from(table.declaration.len())
            .map_err(|_| HostError::from(VtabError::internal("too many columns")))?;

        let mut rows = self.run(table.handle, &info, &args, width)?;

        // The host re-checks whatever the table did not promise to enforce.
        rows.retain(|row| {
            predicates
                .iter()
                .zip(&columns)
                .zip(&info.constraint_usage)
                .filter(|(_, usage)| !usage.omit)
                .all(|((p, &column), _)| {
                    let value = column_value(row, column);
                    value.test_constraint(p.op, &p.bound_value())
                })
        });

        if !order.is_empty() && !info.order_by_consumed {
            rows.sort_by(|a, b| {
                order.iter().fold(Ordering::Equal, |acc, term| {
                    acc.then_with(|| {
                        let ord = sort_order(&column_value(a, term.column), &column_value(b, term.column));
                        if term.desc { ord.reverse() } else { ord }
                    })
                })
            });
        }
        Ok(rows)
    }

    /// Open a cursor, drain it, and close it whatever happened.
    fn run(
        &mut self,
        handle: TableHandle,
        info: &HostIndexInfo,
        args: &[Value],
        width: i32,
    ) -> HostResult<Vec<ScannedRow>> {
        let cursor = self.bridge.open(handle)?;
        let drained = self.drain(cursor, info, args, width);
        let closed = self.bridge.close(cursor);
        let rows = drained?;
        closed?;
        Ok(rows)
    }

    fn drain(
        &mut self,
        cursor: CursorHandle,
        info: &HostIndexInfo,
        args: &[Value],
        width: i32,
    ) -> HostResult<Vec<ScannedRow>> {
        self.bridge
            .filter(cursor, info.idx_num, info.idx_str.as_deref(), args)?;
        let mut rows = Vec::new();
        while !self.bridge.eof(cursor)? {
            let rowid = self.bridge.rowid(cursor)?;
            let values = (0..width)
                .map(|column| self.bridge.column(cursor, column))
                .collect::<HostResult<Vec<_>>>()?;
            rows.push(ScannedRow { rowid, values });
            self.bridge.next(cursor)?;
        }
        trace!(target: "vtbridge.harness", %cursor, rows = rows.len(), "scan drained");
        Ok(rows)
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

fn no_such_table(name: &str) -> HostError {
    HostError::new(ErrorCode::Error, format!("no such table: {name}"))
}

fn no_such_column(name: &str) -> HostError {
    HostError::new(ErrorCode::Error, format!("no such column: {name}"))
}

/// Column index of `name`; `rowid` addresses the rowid unless a declared
/// column shadows it.
fn resolve_column(declaration: &Declaration, name: &str) -> HostResult<i32> {
    match declaration.column_index(name) {
        Some(i) => i32::try_from(i).map_err(|_| no_such_column(name)),
        None if name.eq_ignore_ascii_case(ROWID) => Ok(ROWID_COLUMN),
        None => Err(no_such_column(name)),
    }
}

fn resolve_predicates(declaration: &Declaration, predicates: &[Predicate]) -> HostResult<Vec<i32>> {
    predicates
        .iter()
        .map(|p| resolve_column(declaration, &p.column))
        .collect()
}

fn resolve_order(declaration: &Declaration, order_by: &[OrderTerm]) -> HostResult<Vec<HostOrderBy>> {
    order_by
        .iter()
        .map(|term| {
            Ok(HostOrderBy {
                column: resolve_column(declaration, &term.column)?,
                desc: term.desc,
            })
        })
        .collect()
}

/// Filter arguments in `argv_index` order.
fn bind_arguments(info: &HostIndexInfo, predicates: &[Predicate]) -> Vec<Value> {
    let mut slots: Vec<(i32, Value)> = info
        .constraint_usage
        .iter()
        .zip(predicates)
        .filter(|(usage, _)| usage.argv_index > 0)
        .map(|(usage, p)| (usage.argv_index, p.bound_value()))
        .collect();
    slots.sort_by_key(|(slot, _)| *slot);
    slots.into_iter().map(|(_, value)| value).collect()
}

fn column_value(row: &ScannedRow, column: i32) -> Value {
    if column == ROWID_COLUMN {
        return Value::Integer(row.rowid);
    }
    usize::try_from(column)
        .ok()
        .and_then(|c| row.values.get(c))
        .cloned()
        .unwrap_or(Value::Null)
}

/// The key `update` addresses a row by: its primary-key value, or its rowid.
fn row_key(declaration: &Declaration, rowid: i64, values: &[Value]) -> Value {
    declaration
        .key_column()
        .and_then(|k| values.get(k))
        .cloned()
        .unwrap_or(Value::Integer(rowid))
}

fn all_columns(width: usize) -> u64 {
    if width >= 64 {
        u64::MAX
    } else {
        (1_u64 << width) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declaration(columns: &str) -> Declaration {
        vtbridge_vtab::parse_column_list(columns).unwrap()
    }

    #[test]
    fn rowid_resolves_unless_shadowed() {
        let plain = declaration("a INTEGER, b TEXT");
        assert_eq!(resolve_column(&plain, "B").unwrap(), 1);
        assert_eq!(resolve_column(&plain, "ROWID").unwrap(), ROWID_COLUMN);
        let err = resolve_column(&plain, "zzz").unwrap_err();
        assert_eq!(err.message, "no such column: zzz");

        let shadowed = declaration("rowid TEXT, b");
        assert_eq!(resolve_column(&shadowed, "rowid").unwrap(), 0);
    }

    #[test]
    fn arguments_follow_argv_index() {
        let predicates = [Predicate::gt("b", 2), Predicate::not_null("c"), Predicate::lt("b", 5)];
        let mut info = HostIndexInfo::new(vec![], vec![], 0);
        info.constraint_usage = vec![
            vtbridge_host::HostConstraintUsage { argv_index: 2, omit: true },
            vtbridge_host::HostConstraintUsage { argv_index: 0, omit: false },
            vtbridge_host::HostConstraintUsage { argv_index: 1, omit: true },
        ];
        assert_eq!(
            bind_arguments(&info, &predicates),
            vec![Value::Integer(5), Value::Integer(2)]
        );
    }

    #[test]
    fn keys_prefer_the_primary_key() {
        let keyed = declaration("a INTEGER PRIMARY KEY, b");
        let values = [Value::Integer(7), Value::from("x")];
        assert_eq!(row_key(&keyed, 99, &values), Value::Integer(7));
        let plain = declaration("a, b");
        assert_eq!(row_key(&plain, 99, &values), Value::Integer(99));
    }

    #[test]
    fn column_masks() {
        assert_eq!(all_columns(0), 0);
        assert_eq!(all_columns(3), 0b111);
        assert_eq!(all_columns(64), u64::MAX);
        assert_eq!(all_columns(200), u64::MAX);
    }

    #[test]
    fn unknown_tables_are_reported() {
        let mut session = HostSession::default();
        let err = session.select("ghost", &[], &[], 0).unwrap_err();
        assert_eq!(err.code, ErrorCode::Error);
        assert_eq!(err.message, "no such table: ghost");
    }
}
