//! Table factories and the ownership of the tables they produce.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;
use vtbridge_error::Result;

use crate::table::{PlaceholderTable, TableArgs, VirtualTable};

/// A table instance shared between its module (strong) and host-side
/// handles (weak).
pub type SharedTable = Arc<Mutex<Box<dyn VirtualTable>>>;

/// Canonical registry key for a module name (lowercase ASCII).
#[must_use]
pub fn canonical_module_name(name: &str) -> String {
    name.to_ascii_lowercase()
}

/// A named factory of virtual tables.
///
/// Both constructors default to a [`PlaceholderTable`] and a logged
/// warning; a usable module overrides both.
pub trait Module: Send + Sync {
    fn name(&self) -> &str;

    /// `CREATE VIRTUAL TABLE`: may create backing storage.
    fn create_table(&self, args: &TableArgs) -> Result<Box<dyn VirtualTable>> {
        Ok(Box::new(PlaceholderTable::new(args)))
    }

    /// Reattach to a table created in an earlier session with the same
    /// arguments.
    fn connect_to_table(&self, args: &TableArgs) -> Result<Box<dyn VirtualTable>> {
        Ok(Box::new(PlaceholderTable::new(args)))
    }
}

/// A module bound to a connection, holding a strong reference to every
/// table it has created or connected until that table is released.
pub struct RegisteredModule {
    module: Box<dyn Module>,
    tables: Vec<SharedTable>,
}

impl fmt::Debug for RegisteredModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegisteredModule")
            .field("name", &self.module.name())
            .field("tables", &self.tables.len())
            .finish()
    }
}

impl RegisteredModule {
    #[must_use]
    pub fn new(module: Box<dyn Module>) -> Self {
        Self {
            module,
            tables: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        self.module.name()
    }

    pub fn create(&mut self, args: &TableArgs) -> Result<SharedTable> {
        let table = self.module.create_table(args)?;
        info!(
            target: "vtbridge.vtab",
            module = self.module.name(),
            table = %args.qualified_name(),
            "virtual table created"
        );
        Ok(self.adopt(table))
    }

    pub fn connect(&mut self, args: &TableArgs) -> Result<SharedTable> {
        let table = self.module.connect_to_table(args)?;
        info!(
            target: "vtbridge.vtab",
            module = self.module.name(),
            table = %args.qualified_name(),
            "virtual table connected"
        );
        Ok(self.adopt(table))
    }

    fn adopt(&mut self, table: Box<dyn VirtualTable>) -> SharedTable {
        let shared = Arc::new(Mutex::new(table));
        self.tables.push(Arc::clone(&shared));
        shared
    }

    /// Drop the module's strong hold on `table`. Returns `false` if the
    /// module did not own it.
    pub fn release(&mut self, table: &SharedTable) -> bool {
        let before = self.tables.len();
        self.tables.retain(|owned| !Arc::ptr_eq(owned, table));
        before != self.tables.len()
    }

    /// Tables currently owned by this module.
    pub fn tables(&self) -> &[SharedTable] {
        &self.tables
    }
}
