use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Мягкая временная блокировка пары (место, сеанс) одним пользователем.
///
/// Инвариант: не более одной непросроченной блокировки на пару; таблица
/// закрыта уникальным индексом (seat_id, showtime_id), так что гонка двух
/// конкурентных вставок разрешается на уровне БД.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SeatHold {
    pub id: i64,
    pub seat_id: i64,
    pub showtime_id: i64,
    pub user_id: i32,
    pub blocked_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
