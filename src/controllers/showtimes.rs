use axum::{
    extract::{Path, State},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use std::sync::Arc;

use crate::error::ApiError;
use crate::models::{SeatHold, Showtime};
use crate::services::availability;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/showtimes", get(list_showtimes))
        .route("/showtimes/{showtime_id}/seats", get(get_seat_map))
        .route("/showtimes/{showtime_id}/holds", get(list_active_holds))
}

// GET /api/showtimes - предстоящие сеансы
async fn list_showtimes(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let showtimes: Vec<Showtime> = sqlx::query_as(
        r#"
        SELECT id, room_id, movie_title, show_date, starts_at, ends_at, base_price, status
        FROM showtimes
        WHERE status = 'active' AND starts_at > NOW()
        ORDER BY starts_at
        "#,
    )
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(showtimes))
}

// GET /api/showtimes/{id}/seats - карта зала с эффективным состоянием мест.
// Чтение чистое и никогда не продлевает блокировки.
async fn get_seat_map(
    State(state): State<Arc<AppState>>,
    Path(showtime_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    if showtime_id <= 0 {
        return Err(ApiError::Validation("showtime_id должен быть > 0".to_string()));
    }

    let seats = availability::seat_map(&state.db, showtime_id).await?;
    Ok(Json(seats))
}

// GET /api/showtimes/{id}/holds - диагностика: живые блокировки сеанса.
// Строки эфемерны, эндпоинт нужен операторам, а не UI.
async fn list_active_holds(
    State(state): State<Arc<AppState>>,
    Path(showtime_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let holds: Vec<SeatHold> = sqlx::query_as(
        r#"
        SELECT id, seat_id, showtime_id, user_id, blocked_at, expires_at
        FROM seat_holds
        WHERE showtime_id = $1 AND expires_at > NOW()
        ORDER BY expires_at
        "#,
    )
    .bind(showtime_id)
    .fetch_all(&state.db.pool)
    .await?;

    Ok(Json(holds))
}
