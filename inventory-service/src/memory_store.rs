//! In-process store for tests and local runs.
//!
//! Row locks are per-row async mutexes acquired under the transaction's lock
//! timeout. `lock_item` and every row write take the row's mutex and keep it
//! until the transaction ends, so a conditional update waits behind a
//! `lock_item` holder just as in PostgreSQL. A failed transaction restores
//! each row it wrote to the exact value it had before. Writes become visible
//! as soon as they are made; plain reads do not wait for locks.

use async_trait::async_trait;
use chrono::Utc;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use shared::*;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{Mutex as RowMutex, OwnedMutexGuard};
use uuid::Uuid;
use crate::error::PlacementError;
use crate::store::{InventoryStore, StockTx, TxFuture, TxOptions};

type Interleave = Box<dyn FnMut(&mut InventoryItem) + Send>;

#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    row_locks: Mutex<HashMap<i32, Arc<RowMutex<()>>>>,
    interleave: Mutex<Option<Interleave>>,
}

#[derive(Default)]
struct State {
    products: BTreeMap<i32, InventoryItem>,
    orders: Vec<Order>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The seed catalogue with ids starting at 1, every version at 1.
    pub fn seeded() -> Self {
        let store = Self::new();
        for (id, seed) in (1..).zip(SEED_CATALOGUE) {
            store.insert_item(id, seed.name, seed.stock);
        }
        store
    }

    pub fn insert_item(&self, id: i32, name: &str, stock: i32) {
        let item = InventoryItem {
            id,
            name: name.to_string(),
            stock,
            version: 1,
        };
        lock(&self.inner.state).products.insert(id, item);
    }

    /// Installs a competing writer that runs against the row right before
    /// every conditional update. It sees the row as committed by others and
    /// may change `stock` and `version` the way a concurrent buyer would.
    pub fn interleave_writer(&self, writer: impl FnMut(&mut InventoryItem) + Send + 'static) {
        *lock(&self.inner.interleave) = Some(Box::new(writer));
    }

    pub fn item(&self, product_id: i32) -> Option<InventoryItem> {
        lock(&self.inner.state).products.get(&product_id).cloned()
    }

    pub fn orders(&self) -> Vec<Order> {
        lock(&self.inner.state).orders.clone()
    }
}

impl Inner {
    fn row_lock(&self, product_id: i32) -> Arc<RowMutex<()>> {
        lock(&self.row_locks)
            .entry(product_id)
            .or_insert_with(|| Arc::new(RowMutex::new(())))
            .clone()
    }

    fn run_interleave(&self, product_id: i32) {
        let mut interleave = lock(&self.interleave);
        if let Some(writer) = interleave.as_mut() {
            if let Some(item) = lock(&self.state).products.get_mut(&product_id) {
                writer(item);
            }
        }
    }
}

enum Undo {
    /// Row as it was before this transaction first wrote it.
    Row(InventoryItem),
    Order(Uuid),
}

struct MemoryTx<'s> {
    store: &'s Inner,
    lock_timeout: Option<Duration>,
    held: HashMap<i32, OwnedMutexGuard<()>>,
    undo: Vec<Undo>,
}

impl<'s> MemoryTx<'s> {
    fn new(store: &'s Inner, options: TxOptions) -> Self {
        Self {
            store,
            lock_timeout: options.lock_timeout,
            held: HashMap::new(),
            undo: Vec::new(),
        }
    }

    /// Takes the row lock unless this transaction already holds it. Held
    /// until the transaction ends, like a PostgreSQL row lock.
    async fn acquire(&mut self, product_id: i32) -> Result<(), PlacementError> {
        if self.held.contains_key(&product_id) {
            return Ok(());
        }

        let row = self.store.row_lock(product_id);
        let guard = match self.lock_timeout {
            Some(limit) => tokio::time::timeout(limit, row.lock_owned())
                .await
                .map_err(|_| PlacementError::LockTimeout)?,
            None => row.lock_owned().await,
        };
        self.held.insert(product_id, guard);
        Ok(())
    }

    fn rollback(&mut self) {
        let mut state = lock(&self.store.state);
        while let Some(step) = self.undo.pop() {
            match step {
                Undo::Row(previous) => {
                    if let Some(item) = state.products.get_mut(&previous.id) {
                        *item = previous;
                    }
                }
                Undo::Order(id) => state.orders.retain(|order| order.id != id),
            }
        }
    }

    fn apply_decrement(&mut self, item: &mut InventoryItem, quantity: i32) {
        self.undo.push(Undo::Row(item.clone()));
        item.stock -= quantity;
        item.version += 1;
    }
}

#[async_trait]
impl<'s> StockTx for MemoryTx<'s> {
    async fn lock_item(&mut self, product_id: i32) -> Result<Option<InventoryItem>, PlacementError> {
        let exists = lock(&self.store.state).products.contains_key(&product_id);
        if !exists {
            return Ok(None);
        }

        self.acquire(product_id).await?;
        Ok(lock(&self.store.state).products.get(&product_id).cloned())
    }

    async fn read_item(&mut self, product_id: i32) -> Result<Option<InventoryItem>, PlacementError> {
        Ok(lock(&self.store.state).products.get(&product_id).cloned())
    }

    async fn decrement_stock(&mut self, product_id: i32, quantity: i32) -> Result<(), PlacementError> {
        self.acquire(product_id).await?;

        let store = self.store;
        let mut state = lock(&store.state);
        let Some(item) = state.products.get_mut(&product_id) else {
            return Ok(());
        };
        if item.stock < quantity {
            return Err(DieselError::DatabaseError(
                DatabaseErrorKind::CheckViolation,
                Box::new(format!("stock for product {product_id} would become negative")),
            )
            .into());
        }
        self.apply_decrement(item, quantity);
        Ok(())
    }

    async fn compare_and_decrement(
        &mut self,
        product_id: i32,
        quantity: i32,
        expected_version: i32,
    ) -> Result<bool, PlacementError> {
        self.store.run_interleave(product_id);

        // The guarded UPDATE waits for any lock holder, then re-checks the row.
        self.acquire(product_id).await?;

        let store = self.store;
        let mut state = lock(&store.state);
        let Some(item) = state.products.get_mut(&product_id) else {
            return Ok(false);
        };
        if item.version != expected_version || item.stock < quantity {
            return Ok(false);
        }
        self.apply_decrement(item, quantity);
        Ok(true)
    }

    async fn insert_order(&mut self, request: &OrderRequest, status: OrderStatus) -> Result<Order, PlacementError> {
        let order = Order {
            id: Uuid::new_v4(),
            product_id: request.product_id,
            quantity: request.quantity,
            user_id: request.user_id.clone(),
            status,
            created_at: Utc::now(),
        };
        lock(&self.store.state).orders.push(order.clone());
        self.undo.push(Undo::Order(order.id));
        Ok(order)
    }
}

#[async_trait]
impl InventoryStore for MemoryStore {
    async fn transaction<T, F>(&self, options: TxOptions, body: F) -> Result<T, PlacementError>
    where
        T: Send + 'static,
        F: for<'t> FnOnce(&'t mut dyn StockTx) -> TxFuture<'t, T> + Send + 'static,
    {
        let mut tx = MemoryTx::new(&self.inner, options);
        let result = body(&mut tx).await;
        if result.is_err() {
            tx.rollback();
        }
        result
    }

    async fn find_product(&self, product_id: i32) -> Result<Option<InventoryItem>, PlacementError> {
        Ok(self.item(product_id))
    }

    async fn find_order(&self, order_id: Uuid) -> Result<Option<Order>, PlacementError> {
        let state = lock(&self.inner.state);
        Ok(state.orders.iter().find(|order| order.id == order_id).cloned())
    }

    async fn order_stats(&self) -> Result<OrderStats, PlacementError> {
        Ok(OrderStats::from_orders(&lock(&self.inner.state).orders))
    }

    async fn reset_products(&self) -> Result<usize, PlacementError> {
        let mut state = lock(&self.inner.state);
        for item in state.products.values_mut() {
            if let Some(stock) = seed_stock(&item.name) {
                item.stock = stock;
            }
            item.version = 1;
        }
        Ok(state.products.len())
    }
}
