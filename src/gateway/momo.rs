//! Адаптер MoMo: server-to-server инициация.
//!
//! Create-вызов уходит POST'ом через общий клиент с circuit breaker'ом и
//! возвращает payUrl. Подпись - HMAC-SHA256 от строки `key=value`,
//! склеенной `&` по алфавиту ключей. Суммы MoMo присылает в базовых
//! единицах, нормализация не нужна.

use base64::{engine::general_purpose, Engine as _};
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use tracing::info;

use crate::config::{CircuitBreakerConfig, MomoConfig};

use super::client::GatewayHttpClient;
use super::{
    hex_digest, CallbackOutcome, Charge, ChargeArtifact, ChargeRequest, GatewayError,
    PaymentGateway, PaymentOutcome, PROVIDER_MOMO,
};

const REQUEST_TYPE: &str = "payWithMethod";
const MOMO_SUCCESS_CODE: &str = "0";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct MomoCreateRequest {
    partner_code: String,
    request_id: String,
    amount: i64,
    order_id: String,
    order_info: String,
    redirect_url: String,
    ipn_url: String,
    lang: String,
    request_type: String,
    auto_capture: bool,
    extra_data: String,
    signature: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MomoCreateResponse {
    result_code: i64,
    message: Option<String>,
    pay_url: Option<String>,
}

pub struct MomoGateway {
    partner_code: String,
    access_key: String,
    secret_key: String,
    create_url: String,
    redirect_url: String,
    ipn_url: String,
    client: GatewayHttpClient,
}

impl MomoGateway {
    pub fn from_config(config: &MomoConfig, breaker: &CircuitBreakerConfig) -> Self {
        Self {
            partner_code: config.partner_code.clone(),
            access_key: config.access_key.clone(),
            secret_key: config.secret_key.clone(),
            create_url: config.create_url.clone(),
            redirect_url: config.redirect_url.clone(),
            ipn_url: config.ipn_url.clone(),
            client: GatewayHttpClient::new(breaker),
        }
    }

    /// `key=value&key=value` по алфавиту ключей, значения без кодирования.
    fn raw_signature(fields: &BTreeMap<String, String>) -> String {
        fields
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&")
    }

    fn sign(&self, raw: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(raw.as_bytes());
        hex_digest(&mac.finalize().into_bytes())
    }
}

impl PaymentGateway for MomoGateway {
    fn provider(&self) -> &'static str {
        PROVIDER_MOMO
    }

    async fn build_charge(&self, req: &ChargeRequest) -> Result<Charge, GatewayError> {
        let gateway_ref = format!("{}{}", self.partner_code, Utc::now().timestamp_millis());
        let request_id = gateway_ref.clone();
        // Внутренний номер заказа едет в extraData, как и у redirect-флоу
        let extra_data = general_purpose::STANDARD
            .encode(serde_json::json!({ "order_id": req.order_id }).to_string());

        let mut fields = BTreeMap::new();
        fields.insert("accessKey".to_string(), self.access_key.clone());
        fields.insert("amount".to_string(), req.amount.to_string());
        fields.insert("extraData".to_string(), extra_data.clone());
        fields.insert("ipnUrl".to_string(), self.ipn_url.clone());
        fields.insert("orderId".to_string(), gateway_ref.clone());
        fields.insert("orderInfo".to_string(), req.order_info.clone());
        fields.insert("partnerCode".to_string(), self.partner_code.clone());
        fields.insert("redirectUrl".to_string(), self.redirect_url.clone());
        fields.insert("requestId".to_string(), request_id.clone());
        fields.insert("requestType".to_string(), REQUEST_TYPE.to_string());

        let signature = self.sign(&Self::raw_signature(&fields));

        let body = MomoCreateRequest {
            partner_code: self.partner_code.clone(),
            request_id,
            amount: req.amount,
            order_id: gateway_ref.clone(),
            order_info: req.order_info.clone(),
            redirect_url: self.redirect_url.clone(),
            ipn_url: self.ipn_url.clone(),
            lang: "vi".to_string(),
            request_type: REQUEST_TYPE.to_string(),
            auto_capture: true,
            extra_data,
            signature,
        };

        let create_url = self.create_url.clone();
        let http = self.client.http.clone();
        let response: MomoCreateResponse = self
            .client
            .execute(async move {
                http.post(&create_url)
                    .json(&body)
                    .send()
                    .await?
                    .json::<MomoCreateResponse>()
                    .await
            })
            .await?;

        if response.result_code != 0 {
            return Err(GatewayError::Upstream(
                response
                    .message
                    .unwrap_or_else(|| format!("create rejected with code {}", response.result_code)),
            ));
        }

        let pay_url = response
            .pay_url
            .ok_or(GatewayError::Malformed("payUrl"))?;

        info!("momo charge created: ref={}", gateway_ref);

        Ok(Charge {
            artifact: ChargeArtifact::PayUrl { url: pay_url },
            gateway_ref,
        })
    }

    fn verify_callback(
        &self,
        params: &BTreeMap<String, String>,
    ) -> Result<CallbackOutcome, GatewayError> {
        let mut inbound = params.clone();

        let claimed = inbound
            .remove("signature")
            .ok_or(GatewayError::MissingField("signature"))?;
        // accessKey не приходит в IPN, но входит в подписываемую строку
        inbound.insert("accessKey".to_string(), self.access_key.clone());

        let recomputed = self.sign(&Self::raw_signature(&inbound));
        if !recomputed.eq_ignore_ascii_case(&claimed) {
            return Err(GatewayError::SignatureInvalid);
        }

        let gateway_ref = inbound
            .get("orderId")
            .cloned()
            .ok_or(GatewayError::MissingField("orderId"))?;
        let result_code = inbound
            .get("resultCode")
            .cloned()
            .ok_or(GatewayError::MissingField("resultCode"))?;
        let amount: i64 = inbound
            .get("amount")
            .ok_or(GatewayError::MissingField("amount"))?
            .parse()
            .map_err(|_| GatewayError::Malformed("amount"))?;

        let outcome = if result_code == MOMO_SUCCESS_CODE {
            PaymentOutcome::Success
        } else {
            PaymentOutcome::Failure
        };

        Ok(CallbackOutcome {
            provider: PROVIDER_MOMO,
            gateway_ref,
            outcome,
            amount,
            raw: serde_json::to_value(params).unwrap_or(serde_json::Value::Null),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::PaymentGateway;

    fn gateway_with_create_url(create_url: &str) -> MomoGateway {
        MomoGateway::from_config(
            &MomoConfig {
                partner_code: "MOMO".to_string(),
                access_key: "F8BBA842ECF85".to_string(),
                secret_key: "K951B6PE1waDMi640xX08PD3vg6EkVlz".to_string(),
                create_url: create_url.to_string(),
                redirect_url: "https://shop.example/payment-result".to_string(),
                ipn_url: "https://shop.example/api/payment/momo/ipn".to_string(),
            },
            &CircuitBreakerConfig {
                failure_threshold: 5,
                timeout_seconds: 60,
            },
        )
    }

    fn gateway() -> MomoGateway {
        gateway_with_create_url("https://test-payment.momo.vn/v2/gateway/api/create")
    }

    fn signed_ipn(gw: &MomoGateway, result_code: &str, amount: i64) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("amount".to_string(), amount.to_string());
        params.insert("extraData".to_string(), "eyJvcmRlcl9pZCI6NDJ9".to_string());
        params.insert("message".to_string(), "Successful.".to_string());
        params.insert("orderId".to_string(), "MOMO1717171717171".to_string());
        params.insert("orderInfo".to_string(), "2 tickets".to_string());
        params.insert("orderType".to_string(), "momo_wallet".to_string());
        params.insert("partnerCode".to_string(), "MOMO".to_string());
        params.insert("payType".to_string(), "qr".to_string());
        params.insert("requestId".to_string(), "MOMO1717171717171".to_string());
        params.insert("responseTime".to_string(), "1717171717999".to_string());
        params.insert("resultCode".to_string(), result_code.to_string());
        params.insert("transId".to_string(), "4014083433".to_string());

        let mut to_sign = params.clone();
        to_sign.insert("accessKey".to_string(), "F8BBA842ECF85".to_string());
        let signature = gw.sign(&MomoGateway::raw_signature(&to_sign));
        params.insert("signature".to_string(), signature);
        params
    }

    #[test]
    fn raw_signature_joins_sorted_pairs_with_ampersand() {
        let mut fields = BTreeMap::new();
        fields.insert("orderId".to_string(), "MOMO1".to_string());
        fields.insert("amount".to_string(), "50000".to_string());
        fields.insert("accessKey".to_string(), "key".to_string());

        assert_eq!(
            MomoGateway::raw_signature(&fields),
            "accessKey=key&amount=50000&orderId=MOMO1"
        );
    }

    #[test]
    fn verify_accepts_genuine_success_without_amount_scaling() {
        let gw = gateway();
        let params = signed_ipn(&gw, "0", 50_000);

        let outcome = gw.verify_callback(&params).unwrap();
        assert_eq!(outcome.outcome, PaymentOutcome::Success);
        assert_eq!(outcome.amount, 50_000);
        assert_eq!(outcome.gateway_ref, "MOMO1717171717171");
    }

    #[test]
    fn non_zero_result_code_is_a_failure_outcome() {
        let gw = gateway();
        let params = signed_ipn(&gw, "1006", 50_000);

        let outcome = gw.verify_callback(&params).unwrap();
        assert_eq!(outcome.outcome, PaymentOutcome::Failure);
    }

    #[test]
    fn forged_result_code_fails_signature_check() {
        let gw = gateway();
        let mut params = signed_ipn(&gw, "1006", 50_000);
        // Злоумышленник переписывает отказ в успех, подпись остаётся старой
        params.insert("resultCode".to_string(), "0".to_string());

        assert!(matches!(
            gw.verify_callback(&params),
            Err(GatewayError::SignatureInvalid)
        ));
    }

    #[test]
    fn missing_signature_is_rejected() {
        let gw = gateway();
        let mut params = signed_ipn(&gw, "0", 50_000);
        params.remove("signature");

        assert!(matches!(
            gw.verify_callback(&params),
            Err(GatewayError::MissingField("signature"))
        ));
    }
}
