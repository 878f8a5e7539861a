use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Единая таксономия ошибок API.
///
/// `Conflict` и `Validation` - ожидаемая часть контракта, не логируются как
/// ошибки. `SignatureInvalid` - событие безопасности. `Storage` - отказ БД,
/// операция завершается без попыток "угадать" состояние.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("места уже заняты")]
    Conflict { seat_ids: Vec<i64> },

    #[error("{0}")]
    NotFound(&'static str),

    #[error("подпись платёжного уведомления не прошла проверку")]
    SignatureInvalid,

    #[error("заказ уже обработан")]
    DuplicateSettlement,

    #[error("ошибка платёжного шлюза: {0}")]
    Gateway(String),

    #[error("ошибка базы данных")]
    Storage(#[from] sqlx::Error),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::SignatureInvalid => StatusCode::BAD_REQUEST,
            // Шлюзы ждут 2xx, чтобы перестать слать повторы
            ApiError::DuplicateSettlement => StatusCode::OK,
            ApiError::Gateway(_) => StatusCode::BAD_GATEWAY,
            ApiError::Storage(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Conflict { .. } | ApiError::Validation(_) | ApiError::NotFound(_) => {}
            ApiError::SignatureInvalid => {
                tracing::warn!("callback rejected: signature verification failed");
            }
            ApiError::DuplicateSettlement => {
                tracing::debug!("duplicate settlement acknowledged");
            }
            ApiError::Gateway(detail) => {
                tracing::error!("payment gateway error: {}", detail);
            }
            ApiError::Storage(e) => {
                tracing::error!("storage error: {:?}", e);
            }
        }

        let body = match &self {
            ApiError::Conflict { seat_ids } => json!({
                "success": false,
                "message": self.to_string(),
                "conflict_seat_ids": seat_ids,
            }),
            // Внутренние детали не отдаём наружу
            ApiError::Storage(_) => json!({
                "success": false,
                "message": "Сервис временно недоступен, повторите попытку позже",
            }),
            _ => json!({
                "success": false,
                "message": self.to_string(),
            }),
        };

        (self.status(), Json(body)).into_response()
    }
}
