use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const SHOWTIME_ACTIVE: &str = "active";
pub const SHOWTIME_CANCELLED: &str = "cancelled";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Showtime {
    pub id: i64,
    pub room_id: i64,
    pub movie_title: String,
    pub show_date: NaiveDate,
    pub starts_at: NaiveDateTime,
    pub ends_at: NaiveDateTime,
    pub base_price: i64,
    pub status: String,
}
