//! Virtual table object model.
//!
//! This crate defines open, user-implementable traits for:
//! - virtual tables ([`VirtualTable`]) with index negotiation and mutation
//! - scan cursors ([`VirtualTableCursor`])
//! - table factories ([`Module`])
//!
//! It also provides the vocabulary of one planning round
//! ([`ConstraintInfo`] in, [`IndexSolution`] out), the per-table
//! [`IndexCache`] that makes negotiated plans reusable, the [`Filter`] a
//! cursor is driven with, and a parser for the column list a table declares.

pub mod cache;
pub mod constraint;
pub mod cursor;
pub mod declaration;
pub mod filter;
pub mod module;
pub mod table;

pub use cache::{CachedPlan, IndexCache};
pub use constraint::{
    Constraint, ConstraintInfo, Index, IndexSolution, OrderByTerm, ROWID_COLUMN, UsedConstraint,
};
pub use cursor::{CursorBase, EmptyCursor, VirtualTableCursor};
pub use declaration::{ColumnDef, Declaration, parse_column_list};
pub use filter::Filter;
pub use module::{Module, RegisteredModule, SharedTable, canonical_module_name};
pub use table::{PlaceholderTable, TableArgs, TableBase, VirtualTable};
pub use vtbridge_types::{ConstraintOp, Value};
