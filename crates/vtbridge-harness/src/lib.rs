//! Drives virtual tables the way a query engine would.
//!
//! [`HostSession`] plans every statement through `best_index`, reads rows
//! through bridge cursors and writes through `update`, re-checking the
//! predicates a table did not take responsibility for. The integration
//! tests under `tests/` use it to exercise whole statements end to end.

pub mod query;
pub mod session;

pub use query::{Assignment, OrderTerm, Predicate, ROWID, SetExpr, add, sort_order};
pub use session::{HostSession, SCHEMA};
