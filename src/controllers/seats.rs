use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::post,
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::services::reservation::ReservationManager;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/seats/reserve", post(reserve_seats))
        .route("/seats/release", post(release_seats))
}

#[derive(Debug, Deserialize)]
struct SeatSetRequest {
    showtime_id: i64,
    seat_ids: Vec<i64>,
}

// POST /api/seats/reserve - захват набора мест целиком (всё или ничего).
// Повторный вызов теми же местами продлевает блокировку - многошаговый
// checkout держит места живыми без отдельного API продления.
async fn reserve_seats(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<SeatSetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let granted = ReservationManager::new(state)
        .reserve(req.showtime_id, &req.seat_ids, user.user_id)
        .await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "seat_ids": granted.seat_ids,
            "hold_ttl_secs": granted.hold_ttl_secs,
            "expires_at": granted.expires_at,
        })),
    ))
}

// POST /api/seats/release - идемпотентное снятие своих блокировок
async fn release_seats(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<SeatSetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let released = ReservationManager::new(state)
        .release(req.showtime_id, &req.seat_ids, user.user_id)
        .await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "released_seat_ids": released,
        })),
    ))
}
