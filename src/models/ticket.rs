use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Билет создаётся только после перехода заказа в `paid`; ticket_code -
/// неизменяемый идентификатор для контроля на входе.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub order_id: i64,
    pub seat_id: i64,
    pub ticket_code: Uuid,
    pub created_at: DateTime<Utc>,
}
