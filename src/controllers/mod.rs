pub mod showtimes;
pub mod seats;
pub mod orders;
pub mod payment;
pub mod ws;

use axum::{extract::State, http::StatusCode, Router};
use std::sync::Arc;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(showtimes::routes())
        .merge(seats::routes())
        .merge(orders::routes())
        .merge(payment::routes())
        .merge(ws::routes())
}

// GET /health - живая проверка, включая соединение с БД
pub async fn health(State(state): State<Arc<crate::AppState>>) -> (StatusCode, &'static str) {
    match state.db.ping().await {
        Ok(()) => (StatusCode::OK, "OK"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "DB unavailable"),
    }
}
