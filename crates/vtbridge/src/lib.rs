//! Public API facade for the virtual-table bridge.
//!
//! Table authors implement [`VirtualTable`], [`VirtualTableCursor`] and
//! [`Module`]; a host engine drives them through [`VtabBridge`].

pub use vtbridge_error::{ErrorCode, Result, VtabError};
pub use vtbridge_ext_memory::MemoryModule;
pub use vtbridge_host::{
    BridgeConfig, BridgeMetricsSnapshot, CreatedTable, CursorHandle, HostConstraint,
    HostConstraintUsage, HostError, HostIndexInfo, HostOrderBy, HostResult, Mutation,
    TableHandle, VtabBridge, op_code,
};
pub use vtbridge_types::{ConstraintOp, TypeAffinity, Value, ValueKind};
pub use vtbridge_vtab::{
    Constraint, ConstraintInfo, CursorBase, Declaration, Filter, Index, IndexSolution, Module,
    OrderByTerm, ROWID_COLUMN, TableArgs, TableBase, VirtualTable, VirtualTableCursor,
};

/// The names a table author usually needs.
pub mod prelude {
    pub use vtbridge_error::{Result, VtabError};
    pub use vtbridge_types::{ConstraintOp, Value};
    pub use vtbridge_vtab::{
        ConstraintInfo, CursorBase, Filter, Index, IndexSolution, Module, TableArgs, TableBase,
        VirtualTable, VirtualTableCursor,
    };
}

/// A bridge with the bundled table kinds already registered.
pub fn bridge_with_builtin_modules(config: BridgeConfig) -> HostResult<VtabBridge> {
    let mut bridge = VtabBridge::new(config);
    bridge.register_module(Box::new(MemoryModule::new()))?;
    Ok(bridge)
}
