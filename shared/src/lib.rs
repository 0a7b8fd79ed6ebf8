//! Data model shared by the inventory placers, their stores and the HTTP layer.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Terminal outcome recorded for every ledgered placement attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Success,
    FailedOutOfStock,
    FailedConflict,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 3] = [
        OrderStatus::Success,
        OrderStatus::FailedOutOfStock,
        OrderStatus::FailedConflict,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Success => "SUCCESS",
            OrderStatus::FailedOutOfStock => "FAILED_OUT_OF_STOCK",
            OrderStatus::FailedConflict => "FAILED_CONFLICT",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown order status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for OrderStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "SUCCESS" => Ok(OrderStatus::Success),
            "FAILED_OUT_OF_STOCK" => Ok(OrderStatus::FailedOutOfStock),
            "FAILED_CONFLICT" => Ok(OrderStatus::FailedConflict),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Concurrency-control discipline a caller picks for a placement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Pessimistic,
    Optimistic,
}

/// A stocked product. `stock` never drops below zero and `version` grows by one
/// on every committed stock mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryItem {
    pub id: i32,
    pub name: String,
    pub stock: i32,
    pub version: i32,
}

/// Append-only ledger row. Never updated once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub product_id: i32,
    pub quantity: i32,
    pub user_id: String,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub product_id: i32,
    pub quantity: i32,
    pub user_id: String,
}

impl OrderRequest {
    pub fn new(product_id: i32, quantity: i32, user_id: impl Into<String>) -> Self {
        Self {
            product_id,
            quantity,
            user_id: user_id.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlacementReceipt {
    pub order_id: Uuid,
    pub status: OrderStatus,
}

impl From<&Order> for PlacementReceipt {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            status: order.status,
        }
    }
}

/// Read-side view over the ledger. The three outcome counts partition
/// `total_orders` as long as only known statuses are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStats {
    pub total_orders: i64,
    pub successful_orders: i64,
    pub failed_out_of_stock: i64,
    pub failed_conflict: i64,
}

impl OrderStats {
    pub fn tally(&mut self, status: OrderStatus, count: i64) {
        self.total_orders += count;
        match status {
            OrderStatus::Success => self.successful_orders += count,
            OrderStatus::FailedOutOfStock => self.failed_out_of_stock += count,
            OrderStatus::FailedConflict => self.failed_conflict += count,
        }
    }

    /// Counts a raw status column value; unrecognised values only add to the total.
    pub fn tally_raw(&mut self, status: &str, count: i64) {
        match status.parse::<OrderStatus>() {
            Ok(status) => self.tally(status, count),
            Err(_) => self.total_orders += count,
        }
    }

    pub fn from_orders<'a>(orders: impl IntoIterator<Item = &'a Order>) -> Self {
        orders.into_iter().fold(Self::default(), |mut stats, order| {
            stats.tally(order.status, 1);
            stats
        })
    }

    pub fn is_partitioned(&self) -> bool {
        self.total_orders == self.successful_orders + self.failed_out_of_stock + self.failed_conflict
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedProduct {
    pub name: &'static str,
    pub stock: i32,
}

/// Catalogue restored by the reset operation.
pub const SEED_CATALOGUE: [SeedProduct; 2] = [
    SeedProduct { name: "Super Widget", stock: 100 },
    SeedProduct { name: "Mega Gadget", stock: 50 },
];

pub fn seed_stock(name: &str) -> Option<i32> {
    SEED_CATALOGUE
        .iter()
        .find(|seed| seed.name == name)
        .map(|seed| seed.stock)
}

/// Tuning shared by both placers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlacementPolicy {
    /// Longest the pessimistic path waits for the row lock.
    pub lock_timeout: Duration,
    /// Optimistic attempts before giving up with a conflict.
    pub max_retries: u32,
    pub base_backoff: Duration,
}

impl Default for PlacementPolicy {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(2000),
            max_retries: 3,
            base_backoff: Duration::from_millis(50),
        }
    }
}

impl PlacementPolicy {
    pub fn new(lock_timeout_ms: u64, max_retries: u32, base_backoff_ms: u64) -> Self {
        Self {
            lock_timeout: Duration::from_millis(lock_timeout_ms),
            max_retries,
            base_backoff: Duration::from_millis(base_backoff_ms),
        }
    }

    /// Delay after losing the race on `attempt` (1-based): `base * 2^(attempt - 1)`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_backoff.saturating_mul(factor)
    }
}
