//! Order placement under the two concurrency-control disciplines.

use shared::*;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;
use crate::error::PlacementError;
use crate::ledger;
use crate::store::{InventoryStore, TxOptions};

/// Terminal, already-ledgered outcome of a transaction.
#[derive(Debug)]
enum Decision {
    Placed(Order),
    OutOfStock { order: Order, available: i32 },
}

/// One optimistic round.
#[derive(Debug)]
enum Attempt {
    Decided(Decision),
    /// The conditional update matched no row: another writer moved the version.
    Lost { observed_version: i32 },
}

fn validate(request: &OrderRequest) -> Result<(), PlacementError> {
    if request.quantity < 1 {
        return Err(PlacementError::InvalidRequest(format!(
            "quantity must be positive, got {}",
            request.quantity
        )));
    }
    if request.user_id.trim().is_empty() {
        return Err(PlacementError::InvalidRequest("userId must not be empty".to_string()));
    }
    Ok(())
}

fn insufficient(order: &Order, available: i32) -> PlacementError {
    PlacementError::InsufficientStock {
        order_id: order.id,
        product_id: order.product_id,
        requested: order.quantity,
        available,
    }
}

/// Locks the inventory row before reading it, so placements on one product
/// run strictly one after another.
#[derive(Clone)]
pub struct PessimisticPlacer<S> {
    store: S,
    lock_timeout: Duration,
}

impl<S: InventoryStore> PessimisticPlacer<S> {
    pub fn new(store: S, policy: &PlacementPolicy) -> Self {
        Self {
            store,
            lock_timeout: policy.lock_timeout,
        }
    }

    pub async fn place(&self, request: &OrderRequest) -> Result<PlacementReceipt, PlacementError> {
        validate(request)?;
        info!(
            product_id = request.product_id,
            user_id = %request.user_id,
            "pessimistic_lock_acquire_attempt"
        );

        let req = request.clone();
        let decision = self
            .store
            .transaction(TxOptions::with_lock_timeout(self.lock_timeout), move |tx| {
                Box::pin(async move {
                    let item = tx
                        .lock_item(req.product_id)
                        .await?
                        .ok_or(PlacementError::NotFound { product_id: req.product_id })?;

                    if item.stock < req.quantity {
                        let order = ledger::record(tx, &req, OrderStatus::FailedOutOfStock).await?;
                        return Ok(Decision::OutOfStock { order, available: item.stock });
                    }

                    // The row lock makes a version check unnecessary.
                    tx.decrement_stock(req.product_id, req.quantity).await?;
                    let order = ledger::record(tx, &req, OrderStatus::Success).await?;
                    Ok(Decision::Placed(order))
                })
            })
            .await;

        match decision {
            Ok(Decision::Placed(order)) => {
                info!(
                    order_id = %order.id,
                    product_id = order.product_id,
                    quantity = order.quantity,
                    user_id = %order.user_id,
                    "pessimistic_order_success"
                );
                Ok(PlacementReceipt::from(&order))
            }
            Ok(Decision::OutOfStock { order, available }) => {
                info!(
                    order_id = %order.id,
                    product_id = order.product_id,
                    stock = available,
                    requested = order.quantity,
                    user_id = %order.user_id,
                    "pessimistic_insufficient_stock"
                );
                Err(insufficient(&order, available))
            }
            Err(PlacementError::LockTimeout) => {
                warn!(
                    product_id = request.product_id,
                    user_id = %request.user_id,
                    timeout_ms = self.lock_timeout.as_millis() as u64,
                    "pessimistic_lock_timeout"
                );
                Err(PlacementError::LockTimeout)
            }
            Err(err) => Err(err),
        }
    }
}

/// Reads without locking and commits through a version-guarded conditional
/// update, retrying with exponential backoff when another writer wins.
#[derive(Clone)]
pub struct OptimisticPlacer<S> {
    store: S,
    max_retries: u32,
    policy: PlacementPolicy,
}

impl<S: InventoryStore> OptimisticPlacer<S> {
    pub fn new(store: S, policy: &PlacementPolicy) -> Self {
        Self {
            store,
            max_retries: policy.max_retries.max(1),
            policy: *policy,
        }
    }

    pub async fn place(&self, request: &OrderRequest) -> Result<PlacementReceipt, PlacementError> {
        validate(request)?;

        for attempt in 1..=self.max_retries {
            info!(
                attempt,
                product_id = request.product_id,
                user_id = %request.user_id,
                "optimistic_attempt"
            );

            match self.attempt(request).await? {
                Attempt::Decided(Decision::Placed(order)) => {
                    info!(
                        order_id = %order.id,
                        product_id = order.product_id,
                        quantity = order.quantity,
                        user_id = %order.user_id,
                        attempt,
                        "optimistic_order_success"
                    );
                    return Ok(PlacementReceipt::from(&order));
                }
                // Insufficient stock is final even though it was read unlocked.
                Attempt::Decided(Decision::OutOfStock { order, available }) => {
                    info!(
                        order_id = %order.id,
                        product_id = order.product_id,
                        stock = available,
                        requested = order.quantity,
                        user_id = %order.user_id,
                        "optimistic_insufficient_stock"
                    );
                    return Err(insufficient(&order, available));
                }
                Attempt::Lost { observed_version } => {
                    if attempt == self.max_retries {
                        break;
                    }
                    let backoff = self.policy.backoff(attempt);
                    info!(
                        product_id = request.product_id,
                        attempt,
                        observed_version,
                        backoff_ms = backoff.as_millis() as u64,
                        user_id = %request.user_id,
                        "optimistic_conflict_retry"
                    );
                    // The attempt's transaction and connection are already released.
                    tokio::time::sleep(backoff).await;
                }
            }
        }

        let order = ledger::append(&self.store, request, OrderStatus::FailedConflict).await?;
        warn!(
            order_id = %order.id,
            product_id = request.product_id,
            attempts = self.max_retries,
            user_id = %request.user_id,
            "optimistic_conflict_exhausted"
        );
        Err(PlacementError::ConflictExhausted {
            order_id: order.id,
            attempts: self.max_retries,
        })
    }

    /// One read-then-CAS round in a fresh transaction.
    async fn attempt(&self, request: &OrderRequest) -> Result<Attempt, PlacementError> {
        let req = request.clone();
        self.store
            .transaction(TxOptions::default(), move |tx| {
                Box::pin(async move {
                    let item = tx
                        .read_item(req.product_id)
                        .await?
                        .ok_or(PlacementError::NotFound { product_id: req.product_id })?;

                    if item.stock < req.quantity {
                        let order = ledger::record(tx, &req, OrderStatus::FailedOutOfStock).await?;
                        return Ok(Attempt::Decided(Decision::OutOfStock { order, available: item.stock }));
                    }

                    if !tx.compare_and_decrement(req.product_id, req.quantity, item.version).await? {
                        return Ok(Attempt::Lost { observed_version: item.version });
                    }
                    let order = ledger::record(tx, &req, OrderStatus::Success).await?;
                    Ok(Attempt::Decided(Decision::Placed(order)))
                })
            })
            .await
    }
}

/// Both placers and the ledger reads over one injected store handle.
#[derive(Clone)]
pub struct InventoryService<S> {
    store: S,
    pessimistic: PessimisticPlacer<S>,
    optimistic: OptimisticPlacer<S>,
}

impl<S: InventoryStore> InventoryService<S> {
    pub fn new(store: S, policy: PlacementPolicy) -> Self {
        Self {
            pessimistic: PessimisticPlacer::new(store.clone(), &policy),
            optimistic: OptimisticPlacer::new(store.clone(), &policy),
            store,
        }
    }

    pub async fn place(&self, strategy: Strategy, request: &OrderRequest) -> Result<PlacementReceipt, PlacementError> {
        match strategy {
            Strategy::Pessimistic => self.place_pessimistic(request).await,
            Strategy::Optimistic => self.place_optimistic(request).await,
        }
    }

    pub async fn place_pessimistic(&self, request: &OrderRequest) -> Result<PlacementReceipt, PlacementError> {
        self.pessimistic.place(request).await
    }

    pub async fn place_optimistic(&self, request: &OrderRequest) -> Result<PlacementReceipt, PlacementError> {
        self.optimistic.place(request).await
    }

    pub async fn recorded_stats(&self) -> Result<OrderStats, PlacementError> {
        ledger::stats(&self.store).await
    }

    pub async fn product(&self, product_id: i32) -> Result<Option<InventoryItem>, PlacementError> {
        self.store.find_product(product_id).await
    }

    pub async fn order(&self, order_id: Uuid) -> Result<Option<Order>, PlacementError> {
        self.store.find_order(order_id).await
    }

    pub async fn reset(&self) -> Result<usize, PlacementError> {
        let reset = self.store.reset_products().await?;
        info!(products = reset, "products_reset");
        Ok(reset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory_store::MemoryStore;

    #[test]
    fn rejects_non_positive_quantity_and_blank_user() {
        assert!(validate(&OrderRequest::new(1, 1, "u")).is_ok());
        assert!(matches!(
            validate(&OrderRequest::new(1, 0, "u")),
            Err(PlacementError::InvalidRequest(_))
        ));
        assert!(matches!(
            validate(&OrderRequest::new(1, 3, "  ")),
            Err(PlacementError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn invalid_requests_touch_nothing() {
        let store = MemoryStore::seeded();
        let service = InventoryService::new(store.clone(), PlacementPolicy::default());

        for strategy in [Strategy::Pessimistic, Strategy::Optimistic] {
            let err = service.place(strategy, &OrderRequest::new(1, -4, "u")).await.unwrap_err();
            assert!(matches!(err, PlacementError::InvalidRequest(_)));
        }
        assert!(store.orders().is_empty());
        assert_eq!(store.item(1).unwrap().stock, 100);
    }

    #[tokio::test]
    async fn zero_retry_budget_still_makes_one_attempt() {
        let store = MemoryStore::seeded();
        let placer = OptimisticPlacer::new(store.clone(), &PlacementPolicy::new(2000, 0, 50));

        let receipt = placer.place(&OrderRequest::new(2, 5, "u")).await.unwrap();
        assert_eq!(receipt.status, OrderStatus::Success);
        assert_eq!(store.item(2).unwrap().stock, 45);
    }
}
