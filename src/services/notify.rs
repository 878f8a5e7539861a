use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::config::NotifierConfig;

/// Ошибка доставки билетов. Никогда не пересекает границу расчёта:
/// оплаченный заказ не может стать failed из-за недоставленного письма.
#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("dispatch request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("dispatcher rejected payload: HTTP {0}")]
    Rejected(u16),
}

#[derive(Debug, Serialize)]
pub struct TicketLine {
    pub seat_row: String,
    pub seat_number: i32,
    pub ticket_code: String,
}

#[derive(Debug, Serialize)]
pub struct TicketPayload {
    pub order_id: i64,
    pub qr_code: String,
    pub movie_title: String,
    pub starts_at: String,
    pub total: i64,
    pub tickets: Vec<TicketLine>,
}

/// Отправка билетов во внешний диспетчер уведомлений (почтовый сервис).
/// Вызывается строго после коммита расчётной транзакции.
#[derive(Clone)]
pub struct TicketNotifier {
    http: reqwest::Client,
    dispatch_url: String,
}

impl TicketNotifier {
    pub fn from_config(config: &NotifierConfig) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            dispatch_url: config.dispatch_url.clone(),
        }
    }

    pub async fn send(&self, contact: &str, payload: &TicketPayload) -> Result<(), DeliveryError> {
        let response = self
            .http
            .post(&self.dispatch_url)
            .json(&serde_json::json!({
                "to": contact,
                "subject": format!("Ваши билеты: {}", payload.movie_title),
                "ticket": payload,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(DeliveryError::Rejected(response.status().as_u16()));
        }

        info!("tickets for order {} dispatched to {}", payload.order_id, contact);
        Ok(())
    }
}
