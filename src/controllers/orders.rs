use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;

use crate::error::ApiError;
use crate::middleware::AuthUser;
use crate::models::{order, PaymentRecord, Seat, Ticket};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders", post(create_order))
        .route("/orders/{order_id}", get(get_order))
}

#[derive(Debug, Deserialize)]
struct AddonItem {
    name: String,
    quantity: i32,
    unit_price: i64,
}

#[derive(Debug, Deserialize)]
struct CreateOrderRequest {
    showtime_id: i64,
    seat_ids: Vec<i64>,
    #[serde(default)]
    addons: Vec<AddonItem>,
}

// POST /api/orders - заказ собирается только из живых блокировок
// запрашивающего; итог считается на сервере из цен мест и допов.
async fn create_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateOrderRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if req.showtime_id <= 0 {
        return Err(ApiError::Validation("showtime_id должен быть > 0".to_string()));
    }
    if req.seat_ids.is_empty() {
        return Err(ApiError::Validation("в заказе нет мест".to_string()));
    }
    let mut unique = req.seat_ids.clone();
    unique.sort_unstable();
    unique.dedup();
    if unique.len() != req.seat_ids.len() {
        return Err(ApiError::Validation("seat_ids содержит дубликаты".to_string()));
    }
    if req
        .addons
        .iter()
        .any(|a| a.quantity <= 0 || a.unit_price < 0 || a.name.is_empty())
    {
        return Err(ApiError::Validation("некорректные допы в заказе".to_string()));
    }

    let mut tx = state.db.pool.begin().await?;

    // Все места должны быть под живой блокировкой этого пользователя;
    // FOR UPDATE защищает от параллельного sweeper'а и конкурентов
    let held: Vec<i64> = sqlx::query_scalar(
        r#"
        SELECT seat_id FROM seat_holds
        WHERE showtime_id = $1
          AND user_id = $2
          AND seat_id = ANY($3)
          AND expires_at > NOW()
        FOR UPDATE
        "#,
    )
    .bind(req.showtime_id)
    .bind(user.user_id)
    .bind(&req.seat_ids)
    .fetch_all(&mut *tx)
    .await?;

    let missing: Vec<i64> = req
        .seat_ids
        .iter()
        .copied()
        .filter(|id| !held.contains(id))
        .collect();
    if !missing.is_empty() {
        // Блокировка истекла или её не было - места нужно занять заново
        return Err(ApiError::Conflict { seat_ids: missing });
    }

    let seats: Vec<Seat> = sqlx::query_as(
        "SELECT id, room_id, seat_row, seat_number, category, price, is_enabled
         FROM seats WHERE id = ANY($1)",
    )
    .bind(&req.seat_ids)
    .fetch_all(&mut *tx)
    .await?;

    let seats_total: i64 = seats.iter().map(|s| s.price).sum();
    let addons_total: i64 = req
        .addons
        .iter()
        .map(|a| a.unit_price * a.quantity as i64)
        .sum();
    let total = seats_total + addons_total;

    let order_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO orders (user_id, showtime_id, total, status)
        VALUES ($1, $2, $3, 'pending')
        RETURNING id
        "#,
    )
    .bind(user.user_id)
    .bind(req.showtime_id)
    .bind(total)
    .fetch_one(&mut *tx)
    .await?;

    for seat in &seats {
        sqlx::query("INSERT INTO order_seats (order_id, seat_id, price) VALUES ($1, $2, $3)")
            .bind(order_id)
            .bind(seat.id)
            .bind(seat.price)
            .execute(&mut *tx)
            .await?;
    }

    for addon in &req.addons {
        sqlx::query(
            "INSERT INTO order_addons (order_id, name, quantity, unit_price) VALUES ($1, $2, $3, $4)",
        )
        .bind(order_id)
        .bind(&addon.name)
        .bind(addon.quantity)
        .bind(addon.unit_price)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    tracing::info!(
        "order {} created: user={} showtime={} total={}",
        order_id,
        user.user_id,
        req.showtime_id,
        total
    );

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "order_id": order_id,
            "total": total,
        })),
    ))
}

// GET /api/orders/{id} - статус заказа, платежей и выпущенные билеты
async fn get_order(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(order_id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    let found: Option<order::Order> = sqlx::query_as(
        r#"
        SELECT id, user_id, showtime_id, total, status, qr_code, created_at
        FROM orders
        WHERE id = $1 AND user_id = $2
        "#,
    )
    .bind(order_id)
    .bind(user.user_id)
    .fetch_optional(&state.db.pool)
    .await?;

    let found = found.ok_or(ApiError::NotFound("Заказ не найден"))?;

    let payments: Vec<PaymentRecord> = sqlx::query_as(
        r#"
        SELECT id, order_id, provider, gateway_ref, amount, status, response_data,
               created_at, updated_at
        FROM payments
        WHERE order_id = $1
        ORDER BY created_at DESC
        "#,
    )
    .bind(order_id)
    .fetch_all(&state.db.pool)
    .await?;

    let tickets: Vec<Ticket> = if order::Order::is_finalized(&found.status) {
        sqlx::query_as(
            "SELECT id, order_id, seat_id, ticket_code, created_at
             FROM tickets WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_all(&state.db.pool)
        .await?
    } else {
        Vec::new()
    };

    Ok(Json(json!({
        "success": true,
        "order_id": found.id,
        "showtime_id": found.showtime_id,
        "total": found.total,
        "status": found.status,
        "qr_code": found.qr_code,
        "payments": payments
            .into_iter()
            .map(|p| json!({
                "provider": p.provider,
                "gateway_ref": p.gateway_ref,
                "amount": p.amount,
                "status": p.status,
            }))
            .collect::<Vec<_>>(),
        "tickets": tickets
            .into_iter()
            .map(|t| json!({
                "seat_id": t.seat_id,
                "ticket_code": t.ticket_code,
            }))
            .collect::<Vec<_>>(),
    })))
}
