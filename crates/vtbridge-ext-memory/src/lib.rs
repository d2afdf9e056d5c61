//! In-memory virtual tables: `CREATE VIRTUAL TABLE t USING memory(...)`.
//!
//! The module arguments are the table's column definitions, e.g.
//! `memory(a INTEGER PRIMARY KEY, b REAL, c TEXT)`. Tables support the full
//! mutation and transaction surface of the bridge and push key equality
//! and key ranges down into an ordered store.

mod cursor;
mod module;
mod store;
mod table;

pub use cursor::MemoryCursor;
pub use module::MemoryModule;
pub use store::{Row, RowKey, SharedStore, Store};
pub use table::MemoryTable;

#[must_use]
pub const fn extension_name() -> &'static str {
    MemoryModule::NAME
}
