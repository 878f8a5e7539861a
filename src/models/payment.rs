use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// Статусы платёжной сессии; логически отделены от статуса заказа -
// один заказ может иметь несколько попыток через разные шлюзы.
pub const PAYMENT_PENDING: &str = "pending";
pub const PAYMENT_SUCCESS: &str = "success";
pub const PAYMENT_FAILED: &str = "failed";
pub const PAYMENT_EXPIRED: &str = "expired";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: i64,
    pub order_id: i64,
    pub provider: String,
    pub gateway_ref: String,
    pub amount: i64,
    pub status: String,
    pub response_data: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
