//! Seam between the placers and the data store.
//!
//! Placers never coordinate through process memory; every exclusion and
//! atomicity guarantee comes from the store behind these traits.

use async_trait::async_trait;
use futures::future::BoxFuture;
use shared::*;
use std::time::Duration;
use uuid::Uuid;
use crate::error::PlacementError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxOptions {
    /// Bound on waiting for row locks inside the transaction. `None` waits indefinitely.
    pub lock_timeout: Option<Duration>,
}

impl TxOptions {
    pub fn with_lock_timeout(lock_timeout: Duration) -> Self {
        Self {
            lock_timeout: Some(lock_timeout),
        }
    }
}

/// Statements available inside one transaction.
#[async_trait]
pub trait StockTx: Send {
    /// `SELECT ... FOR UPDATE`. Holds the row lock until the transaction ends.
    async fn lock_item(&mut self, product_id: i32) -> Result<Option<InventoryItem>, PlacementError>;

    /// Plain unlocked read.
    async fn read_item(&mut self, product_id: i32) -> Result<Option<InventoryItem>, PlacementError>;

    /// Unconditional decrement; callers must hold the row lock. Bumps `version`.
    async fn decrement_stock(&mut self, product_id: i32, quantity: i32) -> Result<(), PlacementError>;

    /// Single-statement compare-and-set: decrements `stock` and bumps `version`
    /// only while `version == expected_version AND stock >= quantity`.
    /// Returns whether exactly one row matched.
    async fn compare_and_decrement(
        &mut self,
        product_id: i32,
        quantity: i32,
        expected_version: i32,
    ) -> Result<bool, PlacementError>;

    async fn insert_order(&mut self, request: &OrderRequest, status: OrderStatus) -> Result<Order, PlacementError>;
}

pub type TxFuture<'t, T> = BoxFuture<'t, Result<T, PlacementError>>;

#[async_trait]
pub trait InventoryStore: Clone + Send + Sync + 'static {
    /// Runs `body` in one transaction on one pooled connection. Commits when
    /// `body` returns `Ok`, rolls back otherwise. The connection goes back to
    /// the pool before this returns.
    async fn transaction<T, F>(&self, options: TxOptions, body: F) -> Result<T, PlacementError>
    where
        T: Send + 'static,
        F: for<'t> FnOnce(&'t mut dyn StockTx) -> TxFuture<'t, T> + Send + 'static;

    async fn find_product(&self, product_id: i32) -> Result<Option<InventoryItem>, PlacementError>;

    async fn find_order(&self, order_id: Uuid) -> Result<Option<Order>, PlacementError>;

    async fn order_stats(&self) -> Result<OrderStats, PlacementError>;

    /// Restores the seed catalogue stock and resets every version to 1.
    /// Returns the number of product rows touched.
    async fn reset_products(&self) -> Result<usize, PlacementError>;
}
