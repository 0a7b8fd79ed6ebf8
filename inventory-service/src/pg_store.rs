use async_trait::async_trait;
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel_async::scoped_futures::ScopedFutureExt;
use diesel_async::{pooled_connection::bb8::Pool, AsyncConnection, AsyncPgConnection, RunQueryDsl};
use shared::*;
use tracing::debug;
use uuid::Uuid;
use crate::error::PlacementError;
use crate::models::*;
use crate::schema::*;
use crate::store::{InventoryStore, StockTx, TxFuture, TxOptions};

pub type DbPool = Pool<AsyncPgConnection>;

/// PostgreSQL-backed store. Row locks, lock timeouts and the conditional
/// update are all enforced by the database, so any number of service
/// instances can share one database.
#[derive(Clone)]
pub struct PgStore {
    pool: DbPool,
}

impl PgStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

struct PgTx<'c> {
    conn: &'c mut AsyncPgConnection,
}

#[async_trait]
impl<'c> StockTx for PgTx<'c> {
    async fn lock_item(&mut self, product_id: i32) -> Result<Option<InventoryItem>, PlacementError> {
        let product = products::table
            .find(product_id)
            .for_update()
            .first::<Product>(&mut *self.conn)
            .await
            .optional()?;
        Ok(product.map(InventoryItem::from))
    }

    async fn read_item(&mut self, product_id: i32) -> Result<Option<InventoryItem>, PlacementError> {
        let product = products::table
            .find(product_id)
            .first::<Product>(&mut *self.conn)
            .await
            .optional()?;
        Ok(product.map(InventoryItem::from))
    }

    async fn decrement_stock(&mut self, product_id: i32, quantity: i32) -> Result<(), PlacementError> {
        diesel::update(products::table.find(product_id))
            .set((
                products::stock.eq(products::stock - quantity),
                products::version.eq(products::version + 1),
            ))
            .execute(&mut *self.conn)
            .await?;
        Ok(())
    }

    async fn compare_and_decrement(
        &mut self,
        product_id: i32,
        quantity: i32,
        expected_version: i32,
    ) -> Result<bool, PlacementError> {
        let updated = diesel::update(
            products::table
                .filter(products::id.eq(product_id))
                .filter(products::version.eq(expected_version))
                .filter(products::stock.ge(quantity)),
        )
        .set((
            products::stock.eq(products::stock - quantity),
            products::version.eq(products::version + 1),
        ))
        .execute(&mut *self.conn)
        .await?;
        Ok(updated == 1)
    }

    async fn insert_order(&mut self, request: &OrderRequest, status: OrderStatus) -> Result<Order, PlacementError> {
        let stored = diesel::insert_into(orders::table)
            .values(&NewOrder::for_request(request, status))
            .get_result::<DbOrder>(&mut *self.conn)
            .await?;
        Ok(Order::try_from(stored)?)
    }
}

#[async_trait]
impl InventoryStore for PgStore {
    async fn transaction<T, F>(&self, options: TxOptions, body: F) -> Result<T, PlacementError>
    where
        T: Send + 'static,
        F: for<'t> FnOnce(&'t mut dyn StockTx) -> TxFuture<'t, T> + Send + 'static,
    {
        let mut pooled = self.pool.get().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        conn.transaction::<T, PlacementError, _>(move |conn| {
            async move {
                if let Some(timeout) = options.lock_timeout {
                    // SET does not accept bind parameters.
                    diesel::sql_query(format!("SET LOCAL lock_timeout = '{}ms'", timeout.as_millis()))
                        .execute(conn)
                        .await?;
                }
                let mut tx = PgTx { conn };
                body(&mut tx).await
            }
            .scope_boxed()
        })
        .await
    }

    async fn find_product(&self, product_id: i32) -> Result<Option<InventoryItem>, PlacementError> {
        let mut conn = self.pool.get().await?;
        let product = products::table
            .find(product_id)
            .first::<Product>(&mut conn)
            .await
            .optional()?;
        Ok(product.map(InventoryItem::from))
    }

    async fn find_order(&self, order_id: Uuid) -> Result<Option<Order>, PlacementError> {
        let mut conn = self.pool.get().await?;
        let order = orders::table
            .find(order_id)
            .first::<DbOrder>(&mut conn)
            .await
            .optional()?;
        Ok(order.map(Order::try_from).transpose()?)
    }

    async fn order_stats(&self) -> Result<OrderStats, PlacementError> {
        let mut conn = self.pool.get().await?;
        let counts = orders::table
            .group_by(orders::status)
            .select((orders::status, count_star()))
            .load::<(String, i64)>(&mut conn)
            .await?;

        let mut stats = OrderStats::default();
        for (status, count) in &counts {
            stats.tally_raw(status, *count);
        }
        Ok(stats)
    }

    async fn reset_products(&self) -> Result<usize, PlacementError> {
        let mut pooled = self.pool.get().await?;
        let conn: &mut AsyncPgConnection = &mut pooled;

        conn.transaction::<usize, PlacementError, _>(|conn| {
            async move {
                for seed in SEED_CATALOGUE {
                    let touched = diesel::update(products::table.filter(products::name.eq(seed.name)))
                        .set(products::stock.eq(seed.stock))
                        .execute(conn)
                        .await?;
                    debug!(product = seed.name, stock = seed.stock, touched, "seed_stock_restored");
                }
                let reset = diesel::update(products::table)
                    .set(products::version.eq(1))
                    .execute(conn)
                    .await?;
                Ok(reset)
            }
            .scope_boxed()
        })
        .await
    }
}
