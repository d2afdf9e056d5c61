//! [`VtabBridge`]: the entry-point table a host engine drives.

use std::collections::HashMap;
use std::fmt;
use std::num::NonZeroU64;
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{debug, debug_span, info, trace, warn};
use vtbridge_error::{Result, VtabError};
use vtbridge_types::Value;
use vtbridge_vtab::{
    Declaration, Filter, IndexSolution, Module, RegisteredModule, SharedTable, TableArgs,
    VirtualTable, VirtualTableCursor, canonical_module_name, parse_column_list,
};

use crate::boundary::{HostError, HostResult, guarded};
use crate::config::BridgeConfig;
use crate::index_info::HostIndexInfo;
use crate::metrics::{BridgeMetrics, BridgeMetricsSnapshot, Counter};
use crate::mutation::Mutation;

type WeakTable = Weak<Mutex<Box<dyn VirtualTable>>>;

// ── Handles ─────────────────────────────────────────────────────────

/// Opaque host-side reference to a table instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableHandle(NonZeroU64);

/// Opaque host-side reference to an open cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CursorHandle(NonZeroU64);

impl TableHandle {
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl CursorHandle {
    pub const fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "table#{}", self.0)
    }
}

impl fmt::Display for CursorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "cursor#{}", self.0)
    }
}

/// Result of a successful create/connect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedTable {
    pub handle: TableHandle,
    /// `CREATE TABLE x(<columns>)` for the host to parse.
    pub sql: String,
    /// The parsed column list; `None` only when validation is disabled and
    /// the declaration did not parse.
    pub declaration: Option<Declaration>,
}

// ── Registry slots ──────────────────────────────────────────────────

struct TableSlot {
    module: String,
    args: TableArgs,
    table: WeakTable,
    declaration: Option<Declaration>,
    last_error: Option<String>,
}

struct CursorSlot {
    owner: TableHandle,
    table_name: String,
    table: WeakTable,
    cursor: Box<dyn VirtualTableCursor>,
}

// ── Bridge ──────────────────────────────────────────────────────────

/// Host-facing adapter over registered modules, their tables and cursors.
///
/// One bridge serves one connection. Calls are synchronous and arrive in
/// host order; the bridge keeps no locks across calls.
pub struct VtabBridge {
    config: BridgeConfig,
    modules: HashMap<String, RegisteredModule>,
    tables: HashMap<TableHandle, TableSlot>,
    cursors: HashMap<CursorHandle, CursorSlot>,
    issued: u64,
    metrics: BridgeMetrics,
}

impl fmt::Debug for VtabBridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VtabBridge")
            .field("config", &self.config)
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .field("tables", &self.tables.len())
            .field("cursors", &self.cursors.len())
            .finish_non_exhaustive()
    }
}

impl Default for VtabBridge {
    fn default() -> Self {
        Self::new(BridgeConfig::default())
    }
}

impl VtabBridge {
    #[must_use]
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            modules: HashMap::new(),
            tables: HashMap::new(),
            cursors: HashMap::new(),
            issued: 0,
            metrics: BridgeMetrics::default(),
        }
    }

    pub const fn config(&self) -> &BridgeConfig {
        &self.config
    }

    // ── Registration ────────────────────────────────────────────────

    /// Bind a module to this connection under its (case-insensitive) name.
    pub fn register_module(&mut self, module: Box<dyn Module>) -> HostResult<()> {
        let _span = debug_span!("vtab_host", api = "register_module").entered();
        let key = canonical_module_name(module.name());
        if self.modules.contains_key(&key) {
            let err = VtabError::ModuleExists {
                name: module.name().to_owned(),
            };
            return self.finish("register_module", None, Err(err));
        }
        info!(target: "vtbridge.host", module = %key, "module registered");
        self.modules.insert(key, RegisteredModule::new(module));
        Ok(())
    }

    pub fn has_module(&self, name: &str) -> bool {
        self.modules.contains_key(&canonical_module_name(name))
    }

    /// Number of tables the named module currently owns.
    pub fn module_table_count(&self, name: &str) -> usize {
        self.modules
            .get(&canonical_module_name(name))
            .map_or(0, |m| m.tables().len())
    }

    // ── Table lifecycle ─────────────────────────────────────────────

    /// `CREATE VIRTUAL TABLE`. `argv` is module name, schema name, table
    /// name, then module arguments.
    pub fn create(&mut self, argv: &[&str]) -> HostResult<CreatedTable> {
        let _span = debug_span!("vtab_host", api = "create").entered();
        self.bump(Counter::Create);
        let result = self.instantiate(argv, true);
        self.finish("create", None, result)
    }

    /// Reattach to a table created in an earlier session.
    pub fn connect(&mut self, argv: &[&str]) -> HostResult<CreatedTable> {
        let _span = debug_span!("vtab_host", api = "connect").entered();
        self.bump(Counter::Connect);
        let result = self.instantiate(argv, false);
        self.finish("connect", None, result)
    }

    fn instantiate(&mut self, argv: &[&str], create: bool) -> Result<CreatedTable> {
        let args = TableArgs::from_host_argv(argv)?;
        let key = canonical_module_name(&args.module);
        let catch = self.config.catch_panics;
        let validate = self.config.validate_declarations;
        let module = self
            .modules
            .get_mut(&key)
            .ok_or_else(|| VtabError::NoSuchModule {
                name: args.module.clone(),
            })?;

        let shared = guarded(catch, || {
            if create {
                module.create(&args)
            } else {
                module.connect(&args)
            }
        })?;

        let checked = guarded(catch, || Ok(shared.lock().declaration_schema())).and_then(|sql| {
            match parse_column_list(&sql) {
                Ok(declaration) => Ok((sql, Some(declaration))),
                Err(err) if validate => Err(err),
                Err(err) => {
                    warn!(
                        target: "vtbridge.host",
                        table = %args.qualified_name(),
                        error = %err,
                        "accepting unparsed declaration"
                    );
                    Ok((sql, None))
                }
            }
        });
        let (sql, declaration) = match checked {
            Ok(checked) => checked,
            Err(err) => {
                module.release(&shared);
                return Err(err);
            }
        };

        let handle = TableHandle(self.allocate());
        info!(
            target: "vtbridge.host",
            module = %key,
            table = %args.qualified_name(),
            %handle,
            columns = declaration.as_ref().map_or(0, Declaration::len),
            "virtual table ready"
        );
        self.tables.insert(
            handle,
            TableSlot {
                module: key,
                args,
                table: Arc::downgrade(&shared),
                declaration: declaration.clone(),
                last_error: None,
            },
        );
        Ok(CreatedTable {
            handle,
            sql: format!("CREATE TABLE x({sql})"),
            declaration,
        })
    }

    /// The connection is done with this table.
    pub fn disconnect(&mut self, handle: TableHandle) -> HostResult<()> {
        let _span = debug_span!("vtab_host", api = "disconnect").entered();
        let result = self.teardown(handle, false);
        self.finish("disconnect", None, result)
    }

    /// `DROP TABLE` of the virtual table.
    pub fn destroy(&mut self, handle: TableHandle) -> HostResult<()> {
        let _span = debug_span!("vtab_host", api = "destroy").entered();
        let result = self.teardown(handle, true);
        self.finish("destroy", None, result)
    }

    fn teardown(&mut self, handle: TableHandle, destroy: bool) -> Result<()> {
        let slot = self
            .tables
            .remove(&handle)
            .ok_or(VtabError::InvalidHandle {
                kind: "table",
                id: handle.get(),
            })?;
        let Some(shared) = slot.table.upgrade() else {
            warn!(target: "vtbridge.host", %handle, "table was already released");
            return Ok(());
        };
        let hook = guarded(self.config.catch_panics, || {
            let mut table = shared.lock();
            if destroy {
                table.destroy()
            } else {
                table.disconnect()
            }
        });
        if let Some(module) = self.modules.get_mut(&slot.module) {
            module.release(&shared);
        }
        let dangling = self.cursors.values().filter(|c| c.owner == handle).count();
        if dangling > 0 {
            warn!(
                target: "vtbridge.host",
                %handle,
                cursors = dangling,
                "table released while cursors are still open"
            );
        }
        info!(
            target: "vtbridge.host",
            table = %slot.args.qualified_name(),
            %handle,
            destroy,
            "virtual table released"
        );
        hook
    }

    // ── Planning ────────────────────────────────────────────────────

    /// Negotiate a plan for one candidate constraint set.
    ///
    /// Fails with code `Constraint` when the table has no solution for this
    /// candidate.
    pub fn best_index(&mut self, handle: TableHandle, info: &mut HostIndexInfo) -> HostResult<()> {
        let _span = debug_span!("vtab_host", api = "best_index").entered();
        self.bump(Counter::BestIndex);
        let result = self.negotiate(handle, info);
        self.finish("best_index", Some(handle), result)
    }

    fn negotiate(&mut self, handle: TableHandle, info: &mut HostIndexInfo) -> Result<()> {
        let shared = self.table_ref(handle)?;
        let proposal = info.to_constraint_info();
        let cached = guarded(self.config.catch_panics, || {
            shared.lock().propose_index_cached(&proposal)
        })?;
        self.bump(if cached.hit {
            Counter::CacheHit
        } else {
            Counter::CacheMiss
        });
        match &cached.solution {
            IndexSolution::None => Err(VtabError::NoQuerySolution),
            IndexSolution::Index(index) => {
                info.apply(cached.plan, index)?;
                debug!(
                    target: "vtbridge.host",
                    %handle,
                    plan = cached.plan,
                    cached = cached.hit,
                    cost = index.estimated_cost,
                    arguments = index.argument_count(),
                    order_by_consumed = index.order_by_consumed,
                    "plan negotiated"
                );
                Ok(())
            }
        }
    }

    /// Drop every cached plan of a table; outstanding plan ids go stale.
    pub fn clear_index_cache(&mut self, handle: TableHandle) -> HostResult<()> {
        self.with_table("clear_index_cache", handle, |table| {
            table.clear_index_cache();
            Ok(())
        })
    }

    // ── Cursors ─────────────────────────────────────────────────────

    pub fn open(&mut self, handle: TableHandle) -> HostResult<CursorHandle> {
        let _span = debug_span!("vtab_host", api = "open").entered();
        self.bump(Counter::Open);
        let result = self.open_cursor(handle);
        self.finish("open", Some(handle), result)
    }

    fn open_cursor(&mut self, handle: TableHandle) -> Result<CursorHandle> {
        let max = self.config.max_open_cursors;
        if max > 0 && self.cursors.len() >= max {
            return Err(VtabError::TooManyCursors { max });
        }
        let shared = self.table_ref(handle)?;
        let cursor = guarded(self.config.catch_panics, || shared.lock().open_cursor())?;
        let table_name = self
            .tables
            .get(&handle)
            .map(|slot| slot.args.name.clone())
            .unwrap_or_default();
        let id = CursorHandle(self.allocate());
        trace!(target: "vtbridge.host", %handle, cursor = %id, "cursor opened");
        self.cursors.insert(
            id,
            CursorSlot {
                owner: handle,
                table_name,
                table: Arc::downgrade(&shared),
                cursor,
            },
        );
        Ok(id)
    }

    /// Start (or restart) a scan with plan `idx_num` and its bound
    /// arguments.
    pub fn filter(
        &mut self,
        handle: CursorHandle,
        idx_num: i32,
        idx_str: Option<&str>,
        args: &[Value],
    ) -> HostResult<()> {
        let _span = debug_span!("vtab_host", api = "filter").entered();
        self.bump(Counter::Filter);
        let owner = self.cursor_owner(handle);
        let result = self.apply_filter(handle, idx_num, idx_str, args);
        self.finish("filter", owner, result)
    }

    fn apply_filter(
        &mut self,
        handle: CursorHandle,
        idx_num: i32,
        idx_str: Option<&str>,
        args: &[Value],
    ) -> Result<()> {
        let catch = self.config.catch_panics;
        let strict = self.config.strict_filter_arguments;
        let slot = self.cursor_slot(handle)?;
        let shared = slot.table.upgrade().ok_or_else(|| VtabError::TableGone {
            name: slot.table_name.clone(),
        })?;
        let index = shared.lock().cached_index(idx_num).ok_or_else(|| {
            warn!(target: "vtbridge.host", cursor = %handle, plan = idx_num, "stale plan id");
            VtabError::StalePlan { plan: idx_num }
        })?;
        if index.idx_str.as_deref() != idx_str {
            debug!(
                target: "vtbridge.host",
                cursor = %handle,
                plan = idx_num,
                "idx_str differs from the negotiated plan label"
            );
        }
        let filter = if strict {
            Filter::new(idx_num, index, args.to_vec())?
        } else {
            Filter::lenient(idx_num, index, args.to_vec())
        };
        guarded(catch, || slot.cursor.filter(filter))
    }

    pub fn next(&mut self, handle: CursorHandle) -> HostResult<()> {
        let _span = debug_span!("vtab_host", api = "next").entered();
        self.bump(Counter::Next);
        let owner = self.cursor_owner(handle);
        let catch = self.config.catch_panics;
        let result = self.cursor_slot(handle).and_then(|slot| {
            guarded(catch, || slot.cursor.next()).map_err(|err| match err {
                VtabError::Domain(detail) => VtabError::row_production(detail),
                other => other,
            })
        });
        self.finish("next", owner, result)
    }

    /// Whether the cursor has run past its last row.
    pub fn eof(&mut self, handle: CursorHandle) -> HostResult<bool> {
        let owner = self.cursor_owner(handle);
        let catch = self.config.catch_panics;
        let result = self
            .cursor_slot(handle)
            .and_then(|slot| guarded(catch, || Ok(!slot.cursor.has_current_row())));
        self.finish("eof", owner, result)
    }

    /// Value of column `column` on the current row; NULL when the cursor
    /// has none.
    pub fn column(&mut self, handle: CursorHandle, column: i32) -> HostResult<Value> {
        let owner = self.cursor_owner(handle);
        let catch = self.config.catch_panics;
        let width = owner
            .and_then(|h| self.tables.get(&h))
            .and_then(|slot| slot.declaration.as_ref())
            .map(Declaration::len);
        let result = self.cursor_slot(handle).and_then(|slot| {
            let in_range = usize::try_from(column)
                .is_ok_and(|c| width.is_none_or(|width| c < width));
            if !in_range {
                return Err(VtabError::ColumnRange { index: column });
            }
            guarded(catch, || {
                Ok(slot.cursor.column_value(column).unwrap_or(Value::Null))
            })
        });
        self.finish("column", owner, result)
    }

    pub fn rowid(&mut self, handle: CursorHandle) -> HostResult<i64> {
        let owner = self.cursor_owner(handle);
        let catch = self.config.catch_panics;
        let result = self
            .cursor_slot(handle)
            .and_then(|slot| guarded(catch, || slot.cursor.current_rowid()));
        self.finish("rowid", owner, result)
    }

    /// Close a cursor. Closing an unknown handle is a no-op.
    pub fn close(&mut self, handle: CursorHandle) -> HostResult<()> {
        let _span = debug_span!("vtab_host", api = "close").entered();
        let Some(mut slot) = self.cursors.remove(&handle) else {
            trace!(target: "vtbridge.host", cursor = %handle, "close of unknown cursor ignored");
            return Ok(());
        };
        let result = guarded(self.config.catch_panics, || slot.cursor.close());
        let owner = slot.owner;
        drop(slot);
        trace!(target: "vtbridge.host", cursor = %handle, "cursor closed");
        self.finish("close", Some(owner), result)
    }

    // ── Mutation ────────────────────────────────────────────────────

    /// INSERT/UPDATE/DELETE, encoded as described on [`Mutation`].
    ///
    /// Returns the new rowid for an insert.
    pub fn update(&mut self, handle: TableHandle, argv: &[Value]) -> HostResult<Option<i64>> {
        let _span = debug_span!("vtab_host", api = "update").entered();
        self.bump(Counter::Update);
        let result = Mutation::from_host_argv(argv).and_then(|mutation| {
            debug!(target: "vtbridge.host", %handle, op = mutation.kind(), "mutation");
            let shared = self.table_ref(handle)?;
            guarded(self.config.catch_panics, || {
                let mut table = shared.lock();
                match mutation {
                    Mutation::Delete { key } => table.delete(key).map(|()| None),
                    Mutation::Insert { key, values } => table.insert(key, values),
                    Mutation::Update {
                        key,
                        new_key,
                        values,
                    } => table.update(key, new_key, values).map(|()| None),
                }
            })
        });
        self.finish("update", Some(handle), result)
    }

    // ── Transactions and rename ─────────────────────────────────────

    pub fn begin(&mut self, handle: TableHandle) -> HostResult<()> {
        self.with_table("begin", handle, |table| table.begin())
    }

    pub fn sync(&mut self, handle: TableHandle) -> HostResult<()> {
        self.with_table("sync", handle, |table| table.sync())
    }

    pub fn commit(&mut self, handle: TableHandle) -> HostResult<()> {
        self.with_table("commit", handle, |table| table.commit())
    }

    pub fn rollback(&mut self, handle: TableHandle) -> HostResult<()> {
        self.with_table("rollback", handle, |table| table.rollback())
    }

    pub fn savepoint(&mut self, handle: TableHandle, level: i32) -> HostResult<()> {
        self.with_table("savepoint", handle, |table| table.savepoint(level))
    }

    pub fn release(&mut self, handle: TableHandle, level: i32) -> HostResult<()> {
        self.with_table("release", handle, |table| table.release(level))
    }

    pub fn rollback_to(&mut self, handle: TableHandle, level: i32) -> HostResult<()> {
        self.with_table("rollback_to", handle, |table| table.rollback_to(level))
    }

    pub fn rename(&mut self, handle: TableHandle, new_name: &str) -> HostResult<()> {
        self.with_table("rename", handle, |table| {
            table.rename(new_name)?;
            table.base_mut().set_name(new_name);
            Ok(())
        })?;
        if let Some(slot) = self.tables.get_mut(&handle) {
            new_name.clone_into(&mut slot.args.name);
        }
        Ok(())
    }

    // ── Introspection ───────────────────────────────────────────────

    /// Message of the most recent error raised through this table.
    pub fn table_error_message(&self, handle: TableHandle) -> Option<&str> {
        self.tables.get(&handle)?.last_error.as_deref()
    }

    pub fn declaration(&self, handle: TableHandle) -> Option<&Declaration> {
        self.tables.get(&handle)?.declaration.as_ref()
    }

    /// The live table behind a handle.
    pub fn table(&self, handle: TableHandle) -> Option<SharedTable> {
        self.tables.get(&handle)?.table.upgrade()
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn open_cursor_count(&self) -> usize {
        self.cursors.len()
    }

    pub fn metrics(&self) -> BridgeMetricsSnapshot {
        self.metrics.snapshot()
    }

    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }

    // ── Internals ───────────────────────────────────────────────────

    fn allocate(&mut self) -> NonZeroU64 {
        let id = NonZeroU64::MIN.saturating_add(self.issued);
        self.issued += 1;
        id
    }

    fn bump(&self, counter: Counter) {
        if self.config.record_metrics {
            self.metrics.bump(counter);
        }
    }

    fn table_ref(&self, handle: TableHandle) -> Result<SharedTable> {
        let slot = self.tables.get(&handle).ok_or(VtabError::InvalidHandle {
            kind: "table",
            id: handle.get(),
        })?;
        slot.table.upgrade().ok_or_else(|| {
            warn!(target: "vtbridge.host", %handle, "lookup through a released table");
            VtabError::TableGone {
                name: slot.args.name.clone(),
            }
        })
    }

    fn cursor_owner(&self, handle: CursorHandle) -> Option<TableHandle> {
        self.cursors.get(&handle).map(|slot| slot.owner)
    }

    fn cursor_slot(&mut self, handle: CursorHandle) -> Result<&mut CursorSlot> {
        let slot = self
            .cursors
            .get_mut(&handle)
            .ok_or(VtabError::InvalidHandle {
                kind: "cursor",
                id: handle.get(),
            })?;
        if slot.table.strong_count() == 0 {
            warn!(target: "vtbridge.host", cursor = %handle, "cursor outlived its table");
            return Err(VtabError::TableGone {
                name: slot.table_name.clone(),
            });
        }
        Ok(slot)
    }

    fn with_table<T>(
        &mut self,
        api: &'static str,
        handle: TableHandle,
        f: impl FnOnce(&mut dyn VirtualTable) -> Result<T>,
    ) -> HostResult<T> {
        let _span = debug_span!("vtab_host", api).entered();
        let catch = self.config.catch_panics;
        let result = self.table_ref(handle).and_then(|shared| {
            guarded(catch, || {
                let mut table = shared.lock();
                f(table.as_mut())
            })
        });
        self.finish(api, Some(handle), result)
    }

    /// Convert an outcome for the host, recording the error against the
    /// table it concerns.
    fn finish<T>(
        &mut self,
        api: &'static str,
        table: Option<TableHandle>,
        result: Result<T>,
    ) -> HostResult<T> {
        let err = match result {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if err == VtabError::NoQuerySolution {
            debug!(target: "vtbridge.host", api, "candidate rejected by table");
        } else {
            warn!(
                target: "vtbridge.host",
                api,
                code = err.error_code() as i32,
                error = %err,
                "virtual table call failed"
            );
        }
        self.bump(Counter::Error);
        if let Some(slot) = table.and_then(|h| self.tables.get_mut(&h)) {
            slot.last_error = Some(err.to_string());
        }
        Err(HostError::from(err))
    }
}
