//! Адаптеры платёжных шлюзов.
//!
//! Оба провайдера спрятаны за одним контрактом: построить артефакт запуска
//! оплаты (`build_charge`) и проверить/нормализовать входящий callback
//! (`verify_callback`). Оркестратор расчётов работает только с
//! нормализованным [`CallbackOutcome`] и ничего не знает о провайдерах.

pub mod client;
pub mod momo;
pub mod vnpay;

use std::collections::BTreeMap;

use serde::Serialize;
use thiserror::Error;

use crate::config::Config;
use crate::error::ApiError;

pub const PROVIDER_VNPAY: &str = "vnpay";
pub const PROVIDER_MOMO: &str = "momo";

/// Что именно запускать на стороне клиента.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ChargeArtifact {
    /// Браузерный redirect на hosted-страницу провайдера.
    RedirectUrl { url: String },
    /// Ссылка на оплату, полученная server-to-server вызовом.
    PayUrl { url: String },
}

/// Данные заказа, достаточные для формирования запроса на оплату.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub order_id: i64,
    /// Сумма в базовых единицах валюты; нормализацию под провайдера
    /// делает адаптер.
    pub amount: i64,
    pub order_info: String,
    pub client_ip: String,
}

/// Результат инициации: артефакт + референс сессии у провайдера.
#[derive(Debug, Clone)]
pub struct Charge {
    pub artifact: ChargeArtifact,
    pub gateway_ref: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentOutcome {
    Success,
    Failure,
}

/// Нормализованный, проверенный callback провайдера.
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    pub provider: &'static str,
    pub gateway_ref: String,
    pub outcome: PaymentOutcome,
    /// Сумма уже приведена к базовым единицам валюты.
    pub amount: i64,
    /// Сырой набор параметров - уходит в payments.response_data.
    pub raw: serde_json::Value,
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("callback signature mismatch")]
    SignatureInvalid,
    #[error("callback is missing required field `{0}`")]
    MissingField(&'static str),
    #[error("malformed callback field `{0}`")]
    Malformed(&'static str),
    #[error("gateway call failed: {0}")]
    Upstream(String),
    #[error("gateway temporarily unavailable (circuit open)")]
    CircuitOpen,
}

impl From<GatewayError> for ApiError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::SignatureInvalid => ApiError::SignatureInvalid,
            GatewayError::MissingField(_) | GatewayError::Malformed(_) => {
                ApiError::Validation(e.to_string())
            }
            GatewayError::Upstream(_) | GatewayError::CircuitOpen => {
                ApiError::Gateway(e.to_string())
            }
        }
    }
}

/// Общий контракт двух реализаций.
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> &'static str;

    /// Детерминированно сериализует поля заказа, подписывает канонический
    /// вид и возвращает артефакт запуска оплаты.
    fn build_charge(
        &self,
        req: &ChargeRequest,
    ) -> impl std::future::Future<Output = Result<Charge, GatewayError>> + Send;

    /// Пересчитывает подпись по входящим параметрам (без самого поля
    /// подписи); расхождение - всегда отказ, какой бы статус ни заявлял
    /// callback.
    fn verify_callback(
        &self,
        params: &BTreeMap<String, String>,
    ) -> Result<CallbackOutcome, GatewayError>;
}

/// Оба адаптера, сконструированные один раз при старте: у MoMo живёт
/// состояние circuit breaker'а, его нельзя пересоздавать на каждый запрос.
pub struct Gateways {
    pub vnpay: vnpay::VnpayGateway,
    pub momo: momo::MomoGateway,
}

impl Gateways {
    pub fn from_config(config: &Config) -> Self {
        Self {
            vnpay: vnpay::VnpayGateway::from_config(&config.vnpay),
            momo: momo::MomoGateway::from_config(&config.momo, &config.circuit_breaker),
        }
    }
}

/// Hex-представление байтов подписи (оба провайдера сравнивают hex-строки).
pub(crate) fn hex_digest(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        use std::fmt::Write;
        let _ = write!(out, "{:02x}", b);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_digest_is_lowercase_and_padded() {
        assert_eq!(hex_digest(&[0x00, 0x0f, 0xab]), "000fab");
    }
}
