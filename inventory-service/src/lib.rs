//! Inventory stock decrement under concurrent order placement, with a
//! pessimistic (row lock) and an optimistic (versioned retry) placer.

pub mod api;
pub mod error;
pub mod ledger;
pub mod memory_store;
pub mod models;
pub mod pg_store;
pub mod placement;
pub mod schema;
pub mod store;

pub use error::PlacementError;
pub use memory_store::MemoryStore;
pub use pg_store::PgStore;
pub use placement::{InventoryService, OptimisticPlacer, PessimisticPlacer};
pub use store::{InventoryStore, StockTx, TxOptions};
