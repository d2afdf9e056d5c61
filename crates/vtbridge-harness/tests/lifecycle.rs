//! Table lifecycle, ownership and error containment at the host boundary.

use vtbridge_error::{ErrorCode, Result};
use vtbridge_ext_memory::MemoryModule;
use vtbridge_harness::{HostSession, OrderTerm, Predicate};
use vtbridge_host::{BridgeConfig, HostIndexInfo};
use vtbridge_types::Value;
use vtbridge_vtab::{ConstraintInfo, IndexSolution, Module, TableArgs, TableBase, VirtualTable};

const COLUMNS: [&str; 3] = ["a INTEGER PRIMARY KEY", "b REAL", "c TEXT"];

fn memory_session() -> (HostSession, MemoryModule) {
    let module = MemoryModule::new();
    let mut session = HostSession::default();
    session.register_module(Box::new(module.clone())).unwrap();
    (session, module)
}

fn seeded() -> (HostSession, MemoryModule) {
    let (mut session, module) = memory_session();
    session.execute_create("memory", "t", &COLUMNS).unwrap();
    for a in 1..=3 {
        session
            .insert("t", vec![Value::Integer(a), Value::Real(0.5), Value::from("v")])
            .unwrap();
    }
    (session, module)
}

fn keys(session: &mut HostSession, table: &str) -> Vec<i64> {
    session
        .select(table, &[], &[OrderTerm::asc("a")], 0b111)
        .unwrap()
        .into_iter()
        .filter_map(|r| r[0].as_integer())
        .collect()
}

// -- Modules with unusual behavior --

/// Declares a column list the host cannot parse.
struct Garbled {
    base: TableBase,
}

impl VirtualTable for Garbled {
    fn base(&self) -> &TableBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TableBase {
        &mut self.base
    }

    fn declaration_schema(&self) -> String {
        "a INTEGER, (b".to_owned()
    }
}

/// Panics while planning.
struct Volatile {
    base: TableBase,
}

impl VirtualTable for Volatile {
    fn base(&self) -> &TableBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut TableBase {
        &mut self.base
    }

    fn propose_index(&self, _info: &ConstraintInfo) -> Result<IndexSolution> {
        panic!("planner exploded");
    }
}

struct Custom(&'static str);

impl Module for Custom {
    fn name(&self) -> &str {
        self.0
    }

    fn create_table(&self, args: &TableArgs) -> Result<Box<dyn VirtualTable>> {
        let base = TableBase::new(args);
        Ok(match self.0 {
            "garbled" => Box::new(Garbled { base }),
            _ => Box::new(Volatile { base }),
        })
    }
}

// -- Tests --

#[test]
fn destroy_strands_open_cursors() {
    let (mut session, module) = seeded();
    let handle = session.handle("t").unwrap();
    let plan = session.plan_for("t", &[], &[]).unwrap();
    let cursor = session.bridge_mut().open(handle).unwrap();

    session.drop_table("t").unwrap();
    assert_eq!(module.store_count(), 0);
    assert_eq!(session.bridge().table_count(), 0);
    assert_eq!(session.bridge().module_table_count("memory"), 0);

    let bridge = session.bridge_mut();
    let err = bridge
        .filter(cursor, plan.idx_num, plan.idx_str.as_deref(), &[])
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::NotFound);
    assert_eq!(err.message, "virtual table t is no longer available");
    bridge.close(cursor).unwrap();
    assert_eq!(bridge.open_cursor_count(), 0);

    let mut info = HostIndexInfo::new(vec![], vec![], 0);
    let err = bridge.best_index(handle, &mut info).unwrap_err();
    assert_eq!(err.code, ErrorCode::Misuse);

    let err = session.select("t", &[], &[], 0).unwrap_err();
    assert_eq!(err.message, "no such table: t");
}

#[test]
fn failed_create_registers_nothing() {
    let (mut session, module) = memory_session();
    let err = session
        .execute_create("memory", "t", &["a INTEGER", "a TEXT"])
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::Error);
    assert!(err.message.contains("duplicate column name"));
    assert!(session.handle("t").is_none());
    assert_eq!(session.bridge().table_count(), 0);
    assert_eq!(session.bridge().module_table_count("memory"), 0);
    assert_eq!(module.store_count(), 0);

    session.execute_create("memory", "t", &COLUMNS).unwrap();
    assert_eq!(module.store_count(), 1);
}

#[test]
fn malformed_declarations_are_rejected() {
    let mut session = HostSession::default();
    session.register_module(Box::new(Custom("garbled"))).unwrap();
    let err = session.execute_create("garbled", "g", &[]).unwrap_err();
    assert_eq!(err.code, ErrorCode::Error);
    assert_eq!(session.bridge().module_table_count("garbled"), 0);
    assert_eq!(session.bridge().table_count(), 0);
}

#[test]
fn lenient_bridges_reject_unparsed_declarations_at_the_session() {
    let config = BridgeConfig::from_json(r#"{ "validate_declarations": false }"#).unwrap();
    let mut session = HostSession::new(config);
    session.register_module(Box::new(Custom("garbled"))).unwrap();
    let err = session.execute_create("garbled", "g", &[]).unwrap_err();
    assert!(err.message.starts_with("malformed declaration for table g"));
    assert_eq!(session.bridge().table_count(), 0);
}

#[test]
fn panics_stay_behind_the_boundary() {
    let mut session = HostSession::default();
    session.register_module(Box::new(Custom("volatile"))).unwrap();
    session.execute_create("volatile", "v", &["x"]).unwrap();

    let err = session.select("v", &[], &[], 0b1).unwrap_err();
    assert_eq!(err.code, ErrorCode::Internal);
    assert!(err.message.contains("planner exploded"));

    // The table is still there and still takes writes.
    assert_eq!(session.bridge().table_count(), 1);
    assert_eq!(session.insert("v", vec![Value::Integer(1)]).unwrap(), None);
}

#[test]
fn module_names_are_case_insensitive() {
    let (mut session, _) = memory_session();
    session.execute_create("MeMoRy", "t", &COLUMNS).unwrap();
    assert!(session.bridge().has_module("MEMORY"));

    let err = session
        .register_module(Box::new(MemoryModule::new()))
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::Error);
    assert_eq!(err.message, "module memory already exists");

    let err = session.execute_create("nope", "x", &["a"]).unwrap_err();
    assert_eq!(err.message, "no such module: nope");
}

#[test]
fn table_names_are_unique_per_session() {
    let (mut session, _) = seeded();
    let err = session.execute_create("memory", "T", &COLUMNS).unwrap_err();
    assert_eq!(err.message, "table T already exists");
    assert_eq!(keys(&mut session, "t"), vec![1, 2, 3]);
}

#[test]
fn rows_survive_disconnect_and_reconnect() {
    let (mut session, module) = seeded();
    session.disconnect("t").unwrap();
    assert_eq!(session.bridge().table_count(), 0);
    assert_eq!(module.rows("main", "t").map(|rows| rows.len()), Some(3));

    session.execute_connect("memory", "t", &COLUMNS).unwrap();
    assert_eq!(keys(&mut session, "t"), vec![1, 2, 3]);
}

#[test]
fn transactions_through_the_bridge() {
    let (mut session, _) = seeded();
    let handle = session.handle("t").unwrap();
    let row = |a: i64| vec![Value::Integer(a), Value::Null, Value::Null];

    session.bridge_mut().begin(handle).unwrap();
    session.insert("t", row(10)).unwrap();
    session.bridge_mut().rollback(handle).unwrap();
    assert_eq!(keys(&mut session, "t"), vec![1, 2, 3]);

    session.bridge_mut().begin(handle).unwrap();
    session.insert("t", row(4)).unwrap();
    session.bridge_mut().savepoint(handle, 0).unwrap();
    session.delete_where("t", &[Predicate::le("a", 2)]).unwrap();
    assert_eq!(keys(&mut session, "t"), vec![3, 4]);
    session.bridge_mut().rollback_to(handle, 0).unwrap();
    assert_eq!(keys(&mut session, "t"), vec![1, 2, 3, 4]);
    session.bridge_mut().release(handle, 0).unwrap();
    session.bridge_mut().sync(handle).unwrap();
    session.bridge_mut().commit(handle).unwrap();
    assert_eq!(keys(&mut session, "t"), vec![1, 2, 3, 4]);
}

#[test]
fn rename_moves_the_table() {
    let (mut session, module) = seeded();
    session.rename_table("t", "u").unwrap();
    assert_eq!(keys(&mut session, "u"), vec![1, 2, 3]);
    assert!(session.select("t", &[], &[], 0).is_err());
    assert!(module.rows("main", "t").is_none());
    assert_eq!(module.rows("main", "u").map(|rows| rows.len()), Some(3));
}

#[test]
fn cursor_limits_come_from_configuration() {
    let config = BridgeConfig::from_json(r#"{ "max_open_cursors": 1 }"#).unwrap();
    let module = MemoryModule::new();
    let mut session = HostSession::new(config);
    session.register_module(Box::new(module)).unwrap();
    session.execute_create("memory", "t", &COLUMNS).unwrap();
    let handle = session.handle("t").unwrap();

    let held = session.bridge_mut().open(handle).unwrap();
    let err = session.select("t", &[], &[], 0b111).unwrap_err();
    assert_eq!(err.code, ErrorCode::Busy);

    session.bridge_mut().close(held).unwrap();
    assert!(session.select("t", &[], &[], 0b111).unwrap().is_empty());
    assert_eq!(session.bridge().open_cursor_count(), 0);
}

#[test]
fn errors_are_counted() {
    let (mut session, _) = seeded();
    session.bridge().reset_metrics();
    let _ = session.insert("t", vec![Value::Integer(1), Value::Null, Value::Null]);
    let metrics = session.bridge().metrics();
    assert_eq!(metrics.update, 1);
    assert_eq!(metrics.error, 1);
    let handle = session.handle("t").unwrap();
    assert_eq!(
        session.bridge().table_error_message(handle),
        Some("PRIMARY KEY constraint failed: t.a")
    );
}
