#![allow(dead_code)]

use inventory_service::{InventoryService, MemoryStore};
use shared::{OrderStatus, PlacementPolicy};

pub const WIDGET: i32 = 1;

/// A store holding a single product with the given stock at version 1.
pub fn store_with_stock(stock: i32) -> MemoryStore {
    let store = MemoryStore::new();
    store.insert_item(WIDGET, "Super Widget", stock);
    store
}

pub fn service(store: &MemoryStore) -> InventoryService<MemoryStore> {
    InventoryService::new(store.clone(), PlacementPolicy::default())
}

pub fn service_with(store: &MemoryStore, policy: PlacementPolicy) -> InventoryService<MemoryStore> {
    InventoryService::new(store.clone(), policy)
}

pub fn count(store: &MemoryStore, status: OrderStatus) -> usize {
    store.orders().iter().filter(|order| order.status == status).count()
}

pub fn stock_and_version(store: &MemoryStore) -> (i32, i32) {
    let item = store.item(WIDGET).expect("widget is seeded");
    (item.stock, item.version)
}
