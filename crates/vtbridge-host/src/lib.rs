//! The host-engine side of the virtual-table bridge.
//!
//! A query engine talks to virtual tables through a fixed table of entry
//! points keyed by opaque handles. [`VtabBridge`] implements that table on
//! top of the `vtbridge-vtab` object model:
//!
//! - handles are plain integer keys into a per-bridge registry, never
//!   reinterpreted memory;
//! - modules own their tables, handles and cursors only look them up;
//! - every table or cursor error, and every panic, is converted into a
//!   [`HostError`] (result code plus message) at the boundary.

pub mod boundary;
pub mod bridge;
pub mod config;
pub mod index_info;
pub mod metrics;
pub mod mutation;

pub use boundary::{HostError, HostResult};
pub use bridge::{CreatedTable, CursorHandle, TableHandle, VtabBridge};
pub use config::BridgeConfig;
pub use index_info::{HostConstraint, HostConstraintUsage, HostIndexInfo, HostOrderBy, op_code};
pub use metrics::BridgeMetricsSnapshot;
pub use mutation::Mutation;
