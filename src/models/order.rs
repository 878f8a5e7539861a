use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// Жизненный цикл заказа: pending -> paid -> completed, либо pending -> failed.
pub const ORDER_PENDING: &str = "pending";
pub const ORDER_PAID: &str = "paid";
pub const ORDER_COMPLETED: &str = "completed";
pub const ORDER_FAILED: &str = "failed";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Order {
    pub id: i64,
    pub user_id: i32,
    pub showtime_id: i64,
    pub total: i64,
    pub status: String,
    pub qr_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Order {
    /// Заказ уже финализирован: повторный callback шлюза не должен
    /// производить никаких записей.
    pub fn is_finalized(status: &str) -> bool {
        matches!(status, ORDER_PAID | ORDER_COMPLETED)
    }

    /// Заказ ещё может быть переведён в failed (просрочка, отказ шлюза).
    pub fn is_pending(status: &str) -> bool {
        status == ORDER_PENDING
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finalized_states_block_resettlement() {
        assert!(Order::is_finalized(ORDER_PAID));
        assert!(Order::is_finalized(ORDER_COMPLETED));
        assert!(!Order::is_finalized(ORDER_PENDING));
        assert!(!Order::is_finalized(ORDER_FAILED));
    }

    #[test]
    fn only_pending_orders_can_expire() {
        assert!(Order::is_pending(ORDER_PENDING));
        assert!(!Order::is_pending(ORDER_FAILED));
        assert!(!Order::is_pending(ORDER_PAID));
    }
}
