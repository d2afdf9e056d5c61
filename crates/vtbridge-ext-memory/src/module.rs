//! The `memory` module and the stores it keeps across connects.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::debug;
use vtbridge_error::Result;
use vtbridge_vtab::{Module, TableArgs, VirtualTable};

use crate::store::{Row, SharedStore, Store};
use crate::table::MemoryTable;

/// Identity of a store: schema and table name, case-folded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct StoreKey {
    schema: String,
    name: String,
}

impl StoreKey {
    pub(crate) fn new(schema: &str, name: &str) -> Self {
        Self {
            schema: schema.to_ascii_lowercase(),
            name: name.to_ascii_lowercase(),
        }
    }
}

pub(crate) type Registry = Mutex<HashMap<StoreKey, SharedStore>>;

/// Factory for [`MemoryTable`]s.
///
/// Clones share one registry of stores, so a clone kept outside the bridge
/// can inspect what the registered instance holds.
#[derive(Clone, Default)]
pub struct MemoryModule {
    stores: Arc<Registry>,
}

impl MemoryModule {
    pub const NAME: &'static str = "memory";

    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows of `schema.name` in key order, or `None` if no such store.
    pub fn rows(&self, schema: &str, name: &str) -> Option<Vec<Row>> {
        let stores = self.stores.lock();
        let store = stores.get(&StoreKey::new(schema, name))?.read();
        Some(store.rows().map(|(_, row)| row.clone()).collect())
    }

    /// Number of live stores.
    pub fn store_count(&self) -> usize {
        self.stores.lock().len()
    }

    fn table(&self, args: &TableArgs, fresh: bool) -> Result<Box<dyn VirtualTable>> {
        let key = StoreKey::new(&args.schema, &args.name);
        let store = {
            let mut stores = self.stores.lock();
            match stores.get(&key) {
                Some(existing) if !fresh => Arc::clone(existing),
                _ => {
                    debug!(
                        target: "vtbridge.memory",
                        table = %args.qualified_name(),
                        "new store"
                    );
                    let store: SharedStore = Arc::new(RwLock::new(Store::default()));
                    stores.insert(key.clone(), Arc::clone(&store));
                    store
                }
            }
        };
        match MemoryTable::new(args, store, Arc::downgrade(&self.stores)) {
            Ok(table) => Ok(Box::new(table)),
            Err(err) => {
                if fresh {
                    self.stores.lock().remove(&key);
                }
                Err(err)
            }
        }
    }
}

impl Module for MemoryModule {
    fn name(&self) -> &str {
        Self::NAME
    }

    /// Always starts from an empty store, replacing any left by an earlier
    /// table of the same name.
    fn create_table(&self, args: &TableArgs) -> Result<Box<dyn VirtualTable>> {
        self.table(args, true)
    }

    /// Reattaches to the store a previous create left behind.
    fn connect_to_table(&self, args: &TableArgs) -> Result<Box<dyn VirtualTable>> {
        self.table(args, false)
    }
}
