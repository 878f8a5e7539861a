//! Интеграционный тест исходящего create-вызова MoMo: реальный HTTP до
//! поднятого wiremock-сервера, включая поведение circuit breaker'а.

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use cinema_system::config::{CircuitBreakerConfig, MomoConfig};
use cinema_system::gateway::momo::MomoGateway;
use cinema_system::gateway::{ChargeArtifact, ChargeRequest, GatewayError, PaymentGateway};

fn momo_gateway(create_url: String, failure_threshold: u32) -> MomoGateway {
    MomoGateway::from_config(
        &MomoConfig {
            partner_code: "MOMO".to_string(),
            access_key: "F8BBA842ECF85".to_string(),
            secret_key: "K951B6PE1waDMi640xX08PD3vg6EkVlz".to_string(),
            create_url,
            redirect_url: "https://shop.example/payment-result".to_string(),
            ipn_url: "https://shop.example/api/payment/momo/ipn".to_string(),
        },
        &CircuitBreakerConfig {
            failure_threshold,
            timeout_seconds: 60,
        },
    )
}

fn charge_request() -> ChargeRequest {
    ChargeRequest {
        order_id: 42,
        amount: 180_000,
        order_info: "Mai - 2 билет(ов)".to_string(),
        client_ip: "127.0.0.1".to_string(),
    }
}

#[tokio::test]
async fn create_call_returns_pay_url_and_gateway_ref() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/gateway/api/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "resultCode": 0,
            "message": "Successful.",
            "payUrl": "https://test-payment.momo.vn/pay/abc123"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let gateway = momo_gateway(format!("{}/v2/gateway/api/create", server.uri()), 5);
    let charge = gateway.build_charge(&charge_request()).await.unwrap();

    match charge.artifact {
        ChargeArtifact::PayUrl { url } => {
            assert_eq!(url, "https://test-payment.momo.vn/pay/abc123");
        }
        other => panic!("momo must produce a pay url, got {:?}", other),
    }
    assert!(charge.gateway_ref.starts_with("MOMO"));
}

#[tokio::test]
async fn upstream_rejection_surfaces_gateway_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2/gateway/api/create"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "resultCode": 41,
            "message": "Duplicated orderId"
        })))
        .mount(&server)
        .await;

    let gateway = momo_gateway(format!("{}/v2/gateway/api/create", server.uri()), 5);
    let err = gateway.build_charge(&charge_request()).await.unwrap_err();

    match err {
        GatewayError::Upstream(message) => assert_eq!(message, "Duplicated orderId"),
        other => panic!("expected upstream rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn repeated_transport_failures_open_the_circuit() {
    let server = MockServer::start().await;
    // Пустые 500-е: send() проходит, разбор JSON падает -> сбой транспорта
    Mock::given(method("POST"))
        .and(path("/v2/gateway/api/create"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let gateway = momo_gateway(format!("{}/v2/gateway/api/create", server.uri()), 2);

    for _ in 0..2 {
        let err = gateway.build_charge(&charge_request()).await.unwrap_err();
        assert!(matches!(err, GatewayError::Upstream(_)));
    }

    // Порог достигнут: третий вызов блокируется до сервера
    let err = gateway.build_charge(&charge_request()).await.unwrap_err();
    assert!(matches!(err, GatewayError::CircuitOpen));
}
