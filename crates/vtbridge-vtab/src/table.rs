//! The [`VirtualTable`] trait and its shared state.

use tracing::{debug, warn};
use vtbridge_error::{Result, VtabError};
use vtbridge_types::Value;

use crate::cache::{CachedPlan, IndexCache};
use crate::constraint::{ConstraintInfo, Index, IndexSolution};
use crate::cursor::{EmptyCursor, VirtualTableCursor};

/// The host's creation arguments, split into their fixed positions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableArgs {
    pub module: String,
    pub schema: String,
    pub name: String,
    /// The remaining module arguments, verbatim.
    pub arguments: Vec<String>,
}

impl TableArgs {
    #[must_use]
    pub fn new(module: &str, schema: &str, name: &str, arguments: &[&str]) -> Self {
        Self {
            module: module.to_owned(),
            schema: schema.to_owned(),
            name: name.to_owned(),
            arguments: arguments.iter().map(|a| (*a).to_owned()).collect(),
        }
    }

    /// Split a host argument vector: module name, schema name, table name,
    /// then module arguments.
    pub fn from_host_argv(argv: &[&str]) -> Result<Self> {
        match argv {
            [module, schema, name, rest @ ..] => Ok(Self::new(module, schema, name, rest)),
            _ => Err(VtabError::misuse(format!(
                "virtual table argument vector needs at least 3 entries, got {}",
                argv.len()
            ))),
        }
    }

    /// `schema.name`, as used in log lines and error messages.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema, self.name)
    }
}

/// State every table carries: identity, creation arguments, and the
/// index-solution cache.
#[derive(Debug)]
pub struct TableBase {
    schema: String,
    name: String,
    arguments: Vec<String>,
    cache: IndexCache,
}

impl TableBase {
    #[must_use]
    pub fn new(args: &TableArgs) -> Self {
        Self {
            schema: args.schema.clone(),
            name: args.name.clone(),
            arguments: args.arguments.clone(),
            cache: IndexCache::new(),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identity is fixed at creation; rename is the single exception.
    pub fn set_name(&mut self, name: &str) {
        name.clone_into(&mut self.name);
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub const fn index_cache(&self) -> &IndexCache {
        &self.cache
    }

    pub fn index_cache_mut(&mut self) -> &mut IndexCache {
        &mut self.cache
    }
}

/// One virtual table instance.
///
/// Implementors supply [`base`](Self::base)/[`base_mut`](Self::base_mut)
/// and override whichever hooks their table kind needs. The defaults
/// describe a table that accepts every usable constraint at a flat cost,
/// produces no rows, and ignores mutations.
pub trait VirtualTable: Send {
    fn base(&self) -> &TableBase;

    fn base_mut(&mut self) -> &mut TableBase;

    /// Column-definition list the host parses to learn the table's shape.
    ///
    /// Default joins the creation arguments verbatim.
    fn declaration_schema(&self) -> String {
        self.base().arguments().join(", ")
    }

    /// Negotiate an access plan for `info`. Must be a pure function of
    /// `info`.
    fn propose_index(&self, info: &ConstraintInfo) -> Result<IndexSolution> {
        Ok(IndexSolution::Index(Index::accept_usable(info)))
    }

    /// Cache-through wrapper around [`propose_index`](Self::propose_index).
    ///
    /// Override this instead of `propose_index` for custom caching policies.
    fn propose_index_cached(&mut self, info: &ConstraintInfo) -> Result<CachedPlan> {
        if let Some(cached) = self.base().index_cache().lookup(info) {
            debug!(
                target: "vtbridge.vtab",
                table = self.base().name(),
                plan = cached.plan,
                "index cache hit"
            );
            return Ok(cached);
        }
        let solution = self.propose_index(info)?;
        let plan = self
            .base_mut()
            .index_cache_mut()
            .insert(info.clone(), solution.clone());
        debug!(
            target: "vtbridge.vtab",
            table = self.base().name(),
            plan,
            satisfiable = !solution.is_none(),
            "index cache miss"
        );
        Ok(CachedPlan {
            plan,
            solution,
            hit: false,
        })
    }

    /// Resolve a plan id handed out by
    /// [`propose_index_cached`](Self::propose_index_cached).
    fn cached_index(&self, plan: i32) -> Option<Index> {
        self.base().index_cache().get(plan).cloned()
    }

    fn clear_index_cache(&mut self) {
        self.base_mut().index_cache_mut().clear();
    }

    fn open_cursor(&self) -> Result<Box<dyn VirtualTableCursor>> {
        Ok(Box::new(EmptyCursor::new(self.base().name())))
    }

    /// INSERT a row. `key` is the key the statement requested, if any.
    ///
    /// Returns the new rowid.
    fn insert(&mut self, key: Option<&Value>, values: &[Value]) -> Result<Option<i64>> {
        debug!(
            target: "vtbridge.vtab",
            table = self.base().name(),
            has_key = key.is_some(),
            columns = values.len(),
            "insert ignored by default hook"
        );
        Ok(None)
    }

    /// UPDATE the row at `key`. `new_key` is present only when the
    /// statement changed the key itself.
    fn update(&mut self, key: &Value, new_key: Option<&Value>, values: &[Value]) -> Result<()> {
        debug!(
            target: "vtbridge.vtab",
            table = self.base().name(),
            %key,
            key_changed = new_key.is_some(),
            columns = values.len(),
            "update ignored by default hook"
        );
        Ok(())
    }

    /// DELETE the row at `key`.
    fn delete(&mut self, key: &Value) -> Result<()> {
        debug!(
            target: "vtbridge.vtab",
            table = self.base().name(),
            %key,
            "delete ignored by default hook"
        );
        Ok(())
    }

    /// The host is done with this instance on this connection.
    fn disconnect(&mut self) -> Result<()> {
        debug!(target: "vtbridge.vtab", table = self.base().name(), "disconnect");
        Ok(())
    }

    /// The SQL-level table is being dropped.
    fn destroy(&mut self) -> Result<()> {
        debug!(target: "vtbridge.vtab", table = self.base().name(), "destroy");
        Ok(())
    }

    fn begin(&mut self) -> Result<()> {
        Ok(())
    }

    /// Phase one of a two-phase commit.
    fn sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn commit(&mut self) -> Result<()> {
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        Ok(())
    }

    fn savepoint(&mut self, _level: i32) -> Result<()> {
        Ok(())
    }

    fn release(&mut self, _level: i32) -> Result<()> {
        Ok(())
    }

    fn rollback_to(&mut self, _level: i32) -> Result<()> {
        Ok(())
    }

    /// Default returns [`VtabError::Unsupported`].
    fn rename(&mut self, _new_name: &str) -> Result<()> {
        Err(VtabError::Unsupported)
    }
}

/// Stand-in returned by a [`Module`](crate::Module) whose constructor hooks
/// were never overridden. Declares its arguments and produces no rows.
#[derive(Debug)]
pub struct PlaceholderTable {
    base: TableBase,
}

impl PlaceholderTable {
    #[must_use]
    pub fn new(args: &TableArgs) -> Self {
        warn!(
            target: "vtbridge.vtab",
            module = %args.module,
            table = %args.qualified_name(),
            "module does not override its constructor; using a placeholder table"
        );
        Self {
            base: TableBase::new(args),
        }
    }
}

impl VirtualTable for PlaceholderTable {
    fn base(&self) -> &TableBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TableBase {
        &mut self.base
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use proptest::prelude::*;
    use vtbridge_types::ConstraintOp;

    use super::*;
    use crate::constraint::Constraint;

    fn args(arguments: &[&str]) -> TableArgs {
        TableArgs::new("counting", "main", "t", arguments)
    }

    /// Counts `propose_index` calls and prefers equality on column 0.
    struct CountingTable {
        base: TableBase,
        calls: AtomicUsize,
    }

    impl CountingTable {
        fn new() -> Self {
            Self {
                base: TableBase::new(&args(&["a INTEGER", "b TEXT"])),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl VirtualTable for CountingTable {
        fn base(&self) -> &TableBase {
            &self.base
        }

        fn base_mut(&mut self) -> &mut TableBase {
            &mut self.base
        }

        fn propose_index(&self, info: &ConstraintInfo) -> Result<IndexSolution> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            let mut index = Index::default();
            for c in info.usable().filter(|c| c.column == 0 && c.op == ConstraintOp::Eq) {
                index.push(c, true);
            }
            if index.constraints.is_empty() {
                return Ok(IndexSolution::None);
            }
            Ok(index.with_cost(1.0).with_zero_or_one_row(true).into())
        }
    }

    fn eq_info(argument: i64) -> ConstraintInfo {
        ConstraintInfo::new(
            vec![Constraint::new(0, 0, ConstraintOp::Eq).with_argument(Value::Integer(argument))],
            vec![],
            0b11,
        )
    }

    #[test]
    fn host_argv_split() {
        let parsed = TableArgs::from_host_argv(&["memory", "main", "t1", "a INT", "b"]).unwrap();
        assert_eq!(parsed, TableArgs::new("memory", "main", "t1", &["a INT", "b"]));
        assert_eq!(parsed.qualified_name(), "main.t1");
        assert!(matches!(
            TableArgs::from_host_argv(&["memory", "main"]),
            Err(VtabError::Misuse(_))
        ));
    }

    #[test]
    fn default_declaration_joins_arguments() {
        let table = PlaceholderTable::new(&args(&["a INTEGER", "b REAL", "c TEXT"]));
        assert_eq!(table.declaration_schema(), "a INTEGER, b REAL, c TEXT");
    }

    #[test]
    fn default_proposal_accepts_everything_at_flat_cost() {
        let table = PlaceholderTable::new(&args(&["a"]));
        let info = ConstraintInfo::new(
            vec![
                Constraint::new(0, 0, ConstraintOp::Like),
                Constraint::new(1, 0, ConstraintOp::Eq).with_usable(false),
            ],
            vec![],
            1,
        );
        let IndexSolution::Index(index) = table.propose_index(&info).unwrap() else {
            panic!("default proposal must be satisfiable");
        };
        assert_eq!(index.argument_count(), 1);
        assert!((index.estimated_cost - 1000.0).abs() < f64::EPSILON);
        assert!(!index.order_by_consumed);
    }

    #[test]
    fn cached_proposal_is_computed_once() {
        let mut table = CountingTable::new();
        let first = table.propose_index_cached(&eq_info(4)).unwrap();
        let second = table.propose_index_cached(&eq_info(4)).unwrap();
        assert!(!first.hit);
        assert!(second.hit);
        assert_eq!(first.plan, second.plan);
        assert_eq!(first.solution, second.solution);
        assert_eq!(table.calls.load(Ordering::Relaxed), 1);
        assert!(table.cached_index(first.plan).is_some());
    }

    #[test]
    fn clearing_twice_then_recomputes() {
        let mut table = CountingTable::new();
        let first = table.propose_index_cached(&eq_info(4)).unwrap();
        table.clear_index_cache();
        table.clear_index_cache();
        assert!(table.base().index_cache().is_empty());
        assert!(table.cached_index(first.plan).is_none());
        let again = table.propose_index_cached(&eq_info(4)).unwrap();
        assert!(!again.hit);
        assert_ne!(again.plan, first.plan);
        assert_eq!(table.calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn default_mutations_and_hooks() {
        let mut table = PlaceholderTable::new(&args(&["a"]));
        assert_eq!(table.insert(None, &[Value::Integer(1)]).unwrap(), None);
        table.update(&Value::Integer(1), None, &[]).unwrap();
        table.delete(&Value::Integer(1)).unwrap();
        table.begin().unwrap();
        table.sync().unwrap();
        table.commit().unwrap();
        table.savepoint(1).unwrap();
        table.release(1).unwrap();
        table.rollback_to(0).unwrap();
        table.rollback().unwrap();
        table.disconnect().unwrap();
        table.destroy().unwrap();
        assert_eq!(table.rename("u"), Err(VtabError::Unsupported));
    }

    #[test]
    fn default_cursor_has_no_rows() {
        let table = PlaceholderTable::new(&args(&["a"]));
        let cursor = table.open_cursor().unwrap();
        assert!(!cursor.has_current_row());
    }

    proptest! {
        #[test]
        fn prop_equal_proposals_share_one_solution(a in -10i64..10, b in -10i64..10) {
            let mut table = CountingTable::new();
            let x = table.propose_index_cached(&eq_info(a)).unwrap();
            let y = table.propose_index_cached(&eq_info(b)).unwrap();
            let z = table.propose_index_cached(&eq_info(a)).unwrap();
            prop_assert_eq!(&x.solution, &z.solution);
            prop_assert_eq!(x.plan, z.plan);
            prop_assert!(z.hit);
            let expected_calls = if a == b { 1 } else { 2 };
            prop_assert_eq!(table.calls.load(Ordering::Relaxed), expected_calls);
            prop_assert_eq!(a == b, x.plan == y.plan);
        }
    }
}
