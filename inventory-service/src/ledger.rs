//! Append-only order ledger.
//!
//! Rows are only written through [`record`] or [`append`]. Nothing updates or
//! deletes them.

use shared::*;
use tracing::debug;
use crate::error::PlacementError;
use crate::store::{InventoryStore, StockTx, TxOptions};

/// Appends one row inside the caller's transaction, so it commits or rolls
/// back together with any stock mutation made in the same transaction.
pub async fn record(
    tx: &mut dyn StockTx,
    request: &OrderRequest,
    status: OrderStatus,
) -> Result<Order, PlacementError> {
    let order = tx.insert_order(request, status).await?;
    debug!(
        order_id = %order.id,
        product_id = order.product_id,
        status = %order.status,
        "ledger_append"
    );
    Ok(order)
}

/// Appends one row in a transaction of its own.
pub async fn append<S: InventoryStore>(
    store: &S,
    request: &OrderRequest,
    status: OrderStatus,
) -> Result<Order, PlacementError> {
    let request = request.clone();
    store
        .transaction(TxOptions::default(), move |tx| {
            Box::pin(async move { record(tx, &request, status).await })
        })
        .await
}

pub async fn stats<S: InventoryStore>(store: &S) -> Result<OrderStats, PlacementError> {
    store.order_stats().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;

    #[tokio::test]
    async fn every_append_is_counted_once() {
        let store = MemoryStore::seeded();
        let request = OrderRequest::new(1, 5, "auditor");

        append(&store, &request, OrderStatus::Success).await.unwrap();
        append(&store, &request, OrderStatus::FailedOutOfStock).await.unwrap();
        append(&store, &request, OrderStatus::FailedConflict).await.unwrap();
        append(&store, &request, OrderStatus::FailedConflict).await.unwrap();

        let stats = stats(&store).await.unwrap();
        assert_eq!(
            stats,
            OrderStats {
                total_orders: 4,
                successful_orders: 1,
                failed_out_of_stock: 1,
                failed_conflict: 2,
            }
        );
        assert!(stats.is_partitioned());
    }

    #[tokio::test]
    async fn appended_rows_are_found_unchanged() {
        let store = MemoryStore::seeded();
        let order = append(&store, &OrderRequest::new(2, 3, "reader"), OrderStatus::FailedOutOfStock)
            .await
            .unwrap();

        let found = store.find_order(order.id).await.unwrap();
        assert_eq!(found, Some(order));
    }
}
