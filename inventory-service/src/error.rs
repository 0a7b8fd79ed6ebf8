use diesel::result::Error as DieselError;
use diesel_async::pooled_connection::PoolError;
use shared::UnknownStatus;
use uuid::Uuid;

/// Every way a placement or ledger read can end other than success.
///
/// The first four variants are business outcomes and are surfaced to callers
/// as distinct results. The rest are infrastructure failures.
#[derive(Debug, thiserror::Error)]
pub enum PlacementError {
    #[error("product {product_id} not found")]
    NotFound { product_id: i32 },

    /// Already ledgered as `FAILED_OUT_OF_STOCK` under `order_id`.
    #[error("insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        order_id: Uuid,
        product_id: i32,
        requested: i32,
        available: i32,
    },

    /// Never ledgered; the attempt did not observe the row.
    #[error("timed out waiting for the inventory row lock")]
    LockTimeout,

    /// Already ledgered as `FAILED_CONFLICT` under `order_id`.
    #[error("gave up after {attempts} conflicting attempts")]
    ConflictExhausted { order_id: Uuid, attempts: u32 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("database error: {0}")]
    Database(DieselError),

    #[error("connection pool error: {0}")]
    Pool(String),

    #[error("corrupt ledger row: {0}")]
    CorruptLedger(#[from] UnknownStatus),
}

impl PlacementError {
    /// Ledger row written for this failure, if any.
    pub fn order_id(&self) -> Option<Uuid> {
        match self {
            PlacementError::InsufficientStock { order_id, .. }
            | PlacementError::ConflictExhausted { order_id, .. } => Some(*order_id),
            _ => None,
        }
    }
}

impl From<DieselError> for PlacementError {
    fn from(err: DieselError) -> Self {
        if is_lock_timeout(&err) {
            PlacementError::LockTimeout
        } else {
            PlacementError::Database(err)
        }
    }
}

impl From<bb8::RunError<PoolError>> for PlacementError {
    fn from(err: bb8::RunError<PoolError>) -> Self {
        PlacementError::Pool(err.to_string())
    }
}

// PostgreSQL reports an expired `lock_timeout` as
// "canceling statement due to lock timeout" (SQLSTATE 55P03).
fn is_lock_timeout(err: &DieselError) -> bool {
    match err {
        DieselError::DatabaseError(_, info) => info.message().contains("lock timeout"),
        _ => false,
    }
}
