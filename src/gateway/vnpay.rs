//! Адаптер VNPay: браузерный redirect-флоу.
//!
//! Артефакт оплаты - URL hosted-страницы, собранный локально: параметры
//! сортируются по ключу, кодируются в канонический query-вид и
//! подписываются HMAC-SHA512 от секрета мерчанта. Callback (return и IPN)
//! проверяется пересчётом той же подписи; суммы у VNPay умножены на 100.

use chrono::{Duration as ChronoDuration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha512;
use std::collections::BTreeMap;

use crate::config::VnpayConfig;

use super::{
    hex_digest, CallbackOutcome, Charge, ChargeArtifact, ChargeRequest, GatewayError,
    PaymentGateway, PaymentOutcome, PROVIDER_VNPAY,
};

const VNP_VERSION: &str = "2.1.0";
const VNP_COMMAND: &str = "pay";
const VNP_CURRENCY: &str = "VND";
const VNP_SUCCESS_CODE: &str = "00";
const CHARGE_LIFETIME_MINUTES: i64 = 15;

pub struct VnpayGateway {
    tmn_code: String,
    hash_secret: String,
    payment_url: String,
    return_url: String,
}

impl VnpayGateway {
    pub fn from_config(config: &VnpayConfig) -> Self {
        Self {
            tmn_code: config.tmn_code.clone(),
            hash_secret: config.hash_secret.clone(),
            payment_url: config.payment_url.clone(),
            return_url: config.return_url.clone(),
        }
    }

    /// Канонический вид: ключи отсортированы (BTreeMap), form-urlencoding.
    fn canonical_query(params: &BTreeMap<String, String>) -> String {
        serde_urlencoded::to_string(params).unwrap_or_default()
    }

    fn sign(&self, canonical: &str) -> String {
        let mut mac = Hmac::<Sha512>::new_from_slice(self.hash_secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(canonical.as_bytes());
        hex_digest(&mac.finalize().into_bytes())
    }
}

impl PaymentGateway for VnpayGateway {
    fn provider(&self) -> &'static str {
        PROVIDER_VNPAY
    }

    async fn build_charge(&self, req: &ChargeRequest) -> Result<Charge, GatewayError> {
        let now = Utc::now();
        let txn_ref = format!("VNP{}{}", req.order_id, now.format("%H%M%S"));

        let mut params = BTreeMap::new();
        params.insert("vnp_Version".to_string(), VNP_VERSION.to_string());
        params.insert("vnp_Command".to_string(), VNP_COMMAND.to_string());
        params.insert("vnp_TmnCode".to_string(), self.tmn_code.clone());
        params.insert("vnp_Locale".to_string(), "vn".to_string());
        params.insert("vnp_CurrCode".to_string(), VNP_CURRENCY.to_string());
        params.insert("vnp_TxnRef".to_string(), txn_ref.clone());
        params.insert("vnp_OrderInfo".to_string(), req.order_info.clone());
        params.insert("vnp_OrderType".to_string(), "billpayment".to_string());
        // VNPay принимает суммы, умноженные на 100
        params.insert("vnp_Amount".to_string(), (req.amount * 100).to_string());
        params.insert("vnp_ReturnUrl".to_string(), self.return_url.clone());
        params.insert("vnp_IpAddr".to_string(), req.client_ip.clone());
        params.insert(
            "vnp_CreateDate".to_string(),
            now.format("%Y%m%d%H%M%S").to_string(),
        );
        params.insert(
            "vnp_ExpireDate".to_string(),
            (now + ChronoDuration::minutes(CHARGE_LIFETIME_MINUTES))
                .format("%Y%m%d%H%M%S")
                .to_string(),
        );

        let canonical = Self::canonical_query(&params);
        let secure_hash = self.sign(&canonical);
        let url = format!(
            "{}?{}&vnp_SecureHash={}",
            self.payment_url, canonical, secure_hash
        );

        Ok(Charge {
            artifact: ChargeArtifact::RedirectUrl { url },
            gateway_ref: txn_ref,
        })
    }

    fn verify_callback(
        &self,
        params: &BTreeMap<String, String>,
    ) -> Result<CallbackOutcome, GatewayError> {
        let mut inbound = params.clone();

        let claimed_hash = inbound
            .remove("vnp_SecureHash")
            .ok_or(GatewayError::MissingField("vnp_SecureHash"))?;
        inbound.remove("vnp_SecureHashType");

        let recomputed = self.sign(&Self::canonical_query(&inbound));
        if !recomputed.eq_ignore_ascii_case(&claimed_hash) {
            // Поддельный success ничем не отличается от поддельного failure:
            // любое расхождение подписи - отказ без чтения статуса
            return Err(GatewayError::SignatureInvalid);
        }

        let gateway_ref = inbound
            .get("vnp_TxnRef")
            .cloned()
            .ok_or(GatewayError::MissingField("vnp_TxnRef"))?;
        let response_code = inbound
            .get("vnp_ResponseCode")
            .cloned()
            .ok_or(GatewayError::MissingField("vnp_ResponseCode"))?;
        let amount_raw: i64 = inbound
            .get("vnp_Amount")
            .ok_or(GatewayError::MissingField("vnp_Amount"))?
            .parse()
            .map_err(|_| GatewayError::Malformed("vnp_Amount"))?;

        let outcome = if response_code == VNP_SUCCESS_CODE {
            PaymentOutcome::Success
        } else {
            PaymentOutcome::Failure
        };

        Ok(CallbackOutcome {
            provider: PROVIDER_VNPAY,
            gateway_ref,
            outcome,
            // Обратно в базовые единицы
            amount: amount_raw / 100,
            raw: serde_json::to_value(params).unwrap_or(serde_json::Value::Null),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::PaymentGateway;

    fn gateway() -> VnpayGateway {
        VnpayGateway::from_config(&VnpayConfig {
            tmn_code: "DEMO0001".to_string(),
            hash_secret: "supersecret".to_string(),
            payment_url: "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string(),
            return_url: "https://shop.example/api/payment/vnpay/return".to_string(),
            ipn_url: "https://shop.example/api/payment/vnpay/ipn".to_string(),
        })
    }

    fn signed_callback(gw: &VnpayGateway, response_code: &str, amount: i64) -> BTreeMap<String, String> {
        let mut params = BTreeMap::new();
        params.insert("vnp_TxnRef".to_string(), "VNP42120000".to_string());
        params.insert("vnp_Amount".to_string(), (amount * 100).to_string());
        params.insert("vnp_ResponseCode".to_string(), response_code.to_string());
        params.insert("vnp_TransactionNo".to_string(), "13863817".to_string());
        params.insert("vnp_BankCode".to_string(), "NCB".to_string());

        let hash = gw.sign(&VnpayGateway::canonical_query(&params));
        params.insert("vnp_SecureHash".to_string(), hash);
        params
    }

    #[tokio::test]
    async fn charge_url_carries_sorted_params_and_signature() {
        let gw = gateway();
        let charge = gw
            .build_charge(&ChargeRequest {
                order_id: 42,
                amount: 180_000,
                order_info: "2 tickets".to_string(),
                client_ip: "127.0.0.1".to_string(),
            })
            .await
            .unwrap();

        let ChargeArtifact::RedirectUrl { url } = charge.artifact else {
            panic!("vnpay must produce a redirect url");
        };
        assert!(url.starts_with("https://sandbox.vnpayment.vn"));
        // Сумма умножена на 100
        assert!(url.contains("vnp_Amount=18000000"));
        assert!(url.contains("vnp_SecureHash="));
        assert!(charge.gateway_ref.starts_with("VNP42"));

        // vnp_Amount идёт раньше vnp_Command: ключи отсортированы
        let amount_pos = url.find("vnp_Amount").unwrap();
        let command_pos = url.find("vnp_Command").unwrap();
        assert!(amount_pos < command_pos);
    }

    #[test]
    fn verify_accepts_genuine_success_and_normalizes_amount() {
        let gw = gateway();
        let params = signed_callback(&gw, "00", 180_000);

        let outcome = gw.verify_callback(&params).unwrap();
        assert_eq!(outcome.outcome, PaymentOutcome::Success);
        assert_eq!(outcome.amount, 180_000);
        assert_eq!(outcome.gateway_ref, "VNP42120000");
    }

    #[test]
    fn verify_maps_non_zero_response_code_to_failure() {
        let gw = gateway();
        let params = signed_callback(&gw, "24", 180_000);

        let outcome = gw.verify_callback(&params).unwrap();
        assert_eq!(outcome.outcome, PaymentOutcome::Failure);
    }

    #[test]
    fn tampered_amount_is_rejected_even_with_success_code() {
        let gw = gateway();
        let mut params = signed_callback(&gw, "00", 180_000);
        params.insert("vnp_Amount".to_string(), "100".to_string());

        assert!(matches!(
            gw.verify_callback(&params),
            Err(GatewayError::SignatureInvalid)
        ));
    }

    #[test]
    fn missing_secure_hash_is_rejected() {
        let gw = gateway();
        let mut params = signed_callback(&gw, "00", 180_000);
        params.remove("vnp_SecureHash");

        assert!(matches!(
            gw.verify_callback(&params),
            Err(GatewayError::MissingField("vnp_SecureHash"))
        ));
    }

    #[test]
    fn hash_type_field_is_excluded_from_recomputation() {
        let gw = gateway();
        let mut params = signed_callback(&gw, "00", 180_000);
        // Поле vnp_SecureHashType не участвует в подписи
        params.insert("vnp_SecureHashType".to_string(), "HmacSHA512".to_string());

        assert!(gw.verify_callback(&params).is_ok());
    }
}
