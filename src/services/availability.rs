use serde::Serialize;
use sqlx::FromRow;

use crate::database::Database;
use crate::error::ApiError;
use crate::models::SeatState;

/// Резолвер доступности: чистое чтение.
///
/// Срок блокировки сравнивается с часами БД прямо в запросе, поэтому
/// просроченная блокировка перестаёт считаться Held сразу, не дожидаясь
/// прохода sweeper'а.
#[derive(Debug, Clone, Serialize)]
pub struct SeatAvailability {
    pub seat_id: i64,
    pub seat_row: String,
    pub seat_number: i32,
    pub category: String,
    pub price: i64,
    pub state: SeatState,
}

#[derive(FromRow)]
struct SeatStateRow {
    seat_id: i64,
    seat_row: String,
    seat_number: i32,
    category: String,
    price: i64,
    booked: bool,
    held: bool,
}

pub async fn seat_map(db: &Database, showtime_id: i64) -> Result<Vec<SeatAvailability>, ApiError> {
    let rows: Vec<SeatStateRow> = sqlx::query_as(
        r#"
        SELECT s.id AS seat_id,
               s.seat_row,
               s.seat_number,
               s.category,
               s.price,
               (ss.seat_id IS NOT NULL) AS booked,
               (h.seat_id IS NOT NULL)  AS held
        FROM seats s
        JOIN showtimes st ON st.id = $1 AND st.room_id = s.room_id
        LEFT JOIN seat_status ss
               ON ss.seat_id = s.id AND ss.showtime_id = $1
        LEFT JOIN seat_holds h
               ON h.seat_id = s.id AND h.showtime_id = $1 AND h.expires_at > NOW()
        WHERE s.is_enabled
        ORDER BY s.seat_row, s.seat_number
        "#,
    )
    .bind(showtime_id)
    .fetch_all(&db.pool)
    .await?;

    if rows.is_empty() {
        // Либо сеанса нет, либо зал без мест - различаем для клиента
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM showtimes WHERE id = $1)")
                .bind(showtime_id)
                .fetch_one(&db.pool)
                .await?;
        if !exists {
            return Err(ApiError::NotFound("Сеанс не найден"));
        }
    }

    Ok(rows
        .into_iter()
        .map(|r| SeatAvailability {
            seat_id: r.seat_id,
            seat_row: r.seat_row,
            seat_number: r.seat_number,
            category: r.category,
            price: r.price,
            state: SeatState::resolve(r.booked, r.held),
        })
        .collect())
}
