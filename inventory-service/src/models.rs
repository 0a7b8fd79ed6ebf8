use diesel::prelude::*;
use uuid::Uuid;
use chrono::{DateTime, Utc};
use shared::*;

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = crate::schema::products)]
pub struct Product {
    pub id: i32,
    pub name: String,
    pub stock: i32,
    pub version: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable)]
#[diesel(table_name = crate::schema::orders)]
pub struct DbOrder {
    pub id: Uuid,
    pub product_id: i32,
    pub quantity: i32,
    pub user_id: String,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Insertable)]
#[diesel(table_name = crate::schema::orders)]
pub struct NewOrder<'a> {
    pub id: Uuid,
    pub product_id: i32,
    pub quantity: i32,
    pub user_id: &'a str,
    pub status: &'a str,
}

impl<'a> NewOrder<'a> {
    pub fn for_request(request: &'a OrderRequest, status: OrderStatus) -> Self {
        Self {
            id: Uuid::new_v4(),
            product_id: request.product_id,
            quantity: request.quantity,
            user_id: &request.user_id,
            status: status.as_str(),
        }
    }
}

impl From<Product> for InventoryItem {
    fn from(product: Product) -> Self {
        Self {
            id: product.id,
            name: product.name,
            stock: product.stock,
            version: product.version,
        }
    }
}

impl TryFrom<DbOrder> for Order {
    type Error = UnknownStatus;

    fn try_from(db_order: DbOrder) -> Result<Self, Self::Error> {
        Ok(Self {
            id: db_order.id,
            product_id: db_order.product_id,
            quantity: db_order.quantity,
            user_id: db_order.user_id,
            status: db_order.status.parse()?,
            created_at: db_order.created_at,
        })
    }
}
