use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::ApiError;
use crate::gateway::{
    ChargeRequest, GatewayError, PaymentGateway, PROVIDER_MOMO, PROVIDER_VNPAY,
};
use crate::middleware::AuthUser;
use crate::services::settlement::{SettlementOrchestrator, SettlementResult};
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/orders/{order_id}/pay", post(initiate_payment))
        .route("/payment/vnpay/return", get(vnpay_return))
        .route("/payment/vnpay/ipn", get(vnpay_ipn))
        .route("/payment/momo/ipn", post(momo_ipn))
}

/* ---------- инициация ---------- */

#[derive(Debug, Deserialize)]
struct InitiatePaymentRequest {
    provider: String,
}

// POST /api/orders/{id}/pay - построить артефакт оплаты у выбранного
// провайдера и записать pending-платёж. Заказ может иметь несколько
// платёжных сессий, оплатится не больше одной.
async fn initiate_payment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(order_id): Path<i64>,
    headers: HeaderMap,
    Json(req): Json<InitiatePaymentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if order_id <= 0 {
        return Err(ApiError::Validation("order_id должен быть > 0".to_string()));
    }

    let order: Option<(i64, String, String, i64)> = sqlx::query_as(
        r#"
        SELECT o.total, o.status, st.movie_title,
               (SELECT COUNT(*) FROM order_seats os WHERE os.order_id = o.id)
        FROM orders o
        JOIN showtimes st ON st.id = o.showtime_id
        WHERE o.id = $1 AND o.user_id = $2
        "#,
    )
    .bind(order_id)
    .bind(user.user_id)
    .fetch_optional(&state.db.pool)
    .await?;

    let (total, status, movie_title, seat_count) =
        order.ok_or(ApiError::NotFound("Заказ не найден"))?;

    if status != crate::models::order::ORDER_PENDING {
        return Err(ApiError::Validation(
            "Заказ уже обработан или отменён".to_string(),
        ));
    }
    if total <= 0 {
        return Err(ApiError::Validation("Некорректная сумма заказа".to_string()));
    }

    let charge_req = ChargeRequest {
        order_id,
        amount: total,
        order_info: format!("{} - {} билет(ов)", movie_title, seat_count),
        client_ip: client_ip(&headers),
    };

    let charge = match req.provider.as_str() {
        PROVIDER_VNPAY => state.gateways.vnpay.build_charge(&charge_req).await?,
        PROVIDER_MOMO => state.gateways.momo.build_charge(&charge_req).await?,
        _ => {
            return Err(ApiError::Validation(
                "provider должен быть vnpay | momo".to_string(),
            ))
        }
    };

    sqlx::query(
        r#"
        INSERT INTO payments (order_id, provider, gateway_ref, amount, status)
        VALUES ($1, $2, $3, $4, 'pending')
        "#,
    )
    .bind(order_id)
    .bind(&req.provider)
    .bind(&charge.gateway_ref)
    .bind(total)
    .execute(&state.db.pool)
    .await?;

    tracing::info!(
        "payment initiated: order={} provider={} ref={}",
        order_id,
        req.provider,
        charge.gateway_ref
    );

    Ok((
        StatusCode::OK,
        Json(json!({
            "success": true,
            "order_id": order_id,
            "amount": total,
            "gateway_ref": charge.gateway_ref,
            "charge": charge.artifact,
        })),
    ))
}

fn client_ip(headers: &HeaderMap) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| "127.0.0.1".to_string())
}

/* ---------- VNPay callbacks ---------- */

// GET /api/payment/vnpay/return - браузерный redirect после оплаты.
// Тонкий слой: проверить подпись, нормализовать, отдать оркестратору.
async fn vnpay_return(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.gateways.vnpay.verify_callback(&params)?;

    let result = SettlementOrchestrator::new(state).settle(outcome).await?;

    let message = match result {
        SettlementResult::Settled => "Оплата прошла, билеты оформлены",
        SettlementResult::Duplicate => "Заказ уже был обработан",
        SettlementResult::Failed => "Оплата не прошла, места освобождены",
    };

    Ok(Json(json!({
        "success": !matches!(result, SettlementResult::Failed),
        "message": message,
    })))
}

// GET /api/payment/vnpay/ipn - server-to-server уведомление.
// Протокол VNPay: всегда HTTP 200, исход в RspCode.
async fn vnpay_ipn(
    State(state): State<Arc<AppState>>,
    Query(params): Query<BTreeMap<String, String>>,
) -> impl IntoResponse {
    let outcome = match state.gateways.vnpay.verify_callback(&params) {
        Ok(outcome) => outcome,
        Err(GatewayError::SignatureInvalid) | Err(GatewayError::MissingField("vnp_SecureHash")) => {
            tracing::warn!("vnpay ipn rejected: bad signature");
            return Json(json!({"RspCode": "97", "Message": "Invalid signature"}));
        }
        Err(e) => {
            tracing::warn!("vnpay ipn rejected: {}", e);
            return Json(json!({"RspCode": "99", "Message": "Invalid request"}));
        }
    };

    match SettlementOrchestrator::new(state).settle(outcome).await {
        Ok(SettlementResult::Settled) | Ok(SettlementResult::Failed) => {
            Json(json!({"RspCode": "00", "Message": "Confirmed"}))
        }
        Ok(SettlementResult::Duplicate) => {
            Json(json!({"RspCode": "02", "Message": "Order already confirmed"}))
        }
        Err(ApiError::NotFound(_)) => Json(json!({"RspCode": "01", "Message": "Order not found"})),
        Err(e) => {
            tracing::error!("vnpay ipn settlement error: {:?}", e);
            Json(json!({"RspCode": "99", "Message": "Unknown error"}))
        }
    }
}

/* ---------- MoMo callback ---------- */

// POST /api/payment/momo/ipn - MoMo шлёт JSON и ждёт 2xx, иначе повторяет
// доставку. Ошибки отражаем в теле, статус всегда 200.
async fn momo_ipn(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<serde_json::Value>,
) -> impl IntoResponse {
    let params = json_to_params(&payload);

    let outcome = match state.gateways.momo.verify_callback(&params) {
        Ok(outcome) => outcome,
        Err(GatewayError::SignatureInvalid) => {
            tracing::warn!("momo ipn rejected: bad signature");
            return (StatusCode::OK, Json(json!({"message": "Invalid signature"})));
        }
        Err(e) => {
            tracing::warn!("momo ipn rejected: {}", e);
            return (StatusCode::OK, Json(json!({"message": "Invalid request"})));
        }
    };

    match SettlementOrchestrator::new(state).settle(outcome).await {
        Ok(_) => (StatusCode::OK, Json(json!({"message": "Processed"}))),
        Err(e) => {
            tracing::error!("momo ipn settlement error: {:?}", e);
            // Всё равно 200, чтобы MoMo не зациклился на повторной доставке
            (StatusCode::OK, Json(json!({"message": "Error occurred but processed"})))
        }
    }
}

/// MoMo присылает смешанные типы (числа и строки); подпись считается по
/// десятичному представлению чисел.
fn json_to_params(payload: &serde_json::Value) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    if let Some(map) = payload.as_object() {
        for (key, value) in map {
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                _ => continue,
            };
            params.insert(key.clone(), rendered);
        }
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_params_render_numbers_as_decimal_strings() {
        let payload = json!({
            "orderId": "MOMO123",
            "amount": 50000,
            "resultCode": 0,
            "transId": 4014083433i64,
        });

        let params = json_to_params(&payload);
        assert_eq!(params["orderId"], "MOMO123");
        assert_eq!(params["amount"], "50000");
        assert_eq!(params["resultCode"], "0");
        assert_eq!(params["transId"], "4014083433");
    }

    #[test]
    fn client_ip_prefers_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", "10.0.0.5, 172.16.0.1".parse().unwrap());
        assert_eq!(client_ip(&headers), "10.0.0.5");

        assert_eq!(client_ip(&HeaderMap::new()), "127.0.0.1");
    }
}
