use serde::Deserialize;
use std::env;

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub vnpay: VnpayConfig,
    pub momo: MomoConfig,
    pub sweeper: SweeperConfig,
    pub notifier: NotifierConfig,
    pub circuit_breaker: CircuitBreakerConfig,
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
}

// Настройки базы данных
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_size: u32,
}

// Настройки шлюза VNPay (браузерный redirect-флоу)
#[derive(Debug, Clone, Deserialize)]
pub struct VnpayConfig {
    pub tmn_code: String,
    pub hash_secret: String,
    pub payment_url: String,
    pub return_url: String,
    pub ipn_url: String,
}

// Настройки шлюза MoMo (server-to-server create + IPN)
#[derive(Debug, Clone, Deserialize)]
pub struct MomoConfig {
    pub partner_code: String,
    pub access_key: String,
    pub secret_key: String,
    pub create_url: String,
    pub redirect_url: String,
    pub ipn_url: String,
}

// Настройки фонового процесса очистки просроченных блокировок
#[derive(Debug, Clone, Deserialize)]
pub struct SweeperConfig {
    pub interval_secs: u64,
}

// Настройки доставки билетов
#[derive(Debug, Clone, Deserialize)]
pub struct NotifierConfig {
    pub dispatch_url: String,
}

// Настройки Circuit Breaker
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Self {
        Config {
            app: AppConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .unwrap_or_else(|_| "8000".to_string())
                    .parse()
                    .expect("PORT must be a valid number"),
                environment: env::var("ENVIRONMENT").unwrap_or_else(|_| "development".to_string()),
                rust_log: env::var("RUST_LOG")
                    .unwrap_or_else(|_| "cinema_system=debug,tower_http=debug".to_string()),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
                pool_size: env::var("DB_POOL_SIZE")
                    .unwrap_or_else(|_| "20".to_string())
                    .parse()
                    .expect("DB_POOL_SIZE must be a valid number"),
            },
            vnpay: VnpayConfig {
                tmn_code: env::var("VNPAY_TMN_CODE").expect("VNPAY_TMN_CODE must be set"),
                hash_secret: env::var("VNPAY_HASH_SECRET").expect("VNPAY_HASH_SECRET must be set"),
                payment_url: env::var("VNPAY_PAYMENT_URL")
                    .unwrap_or_else(|_| "https://sandbox.vnpayment.vn/paymentv2/vpcpay.html".to_string()),
                return_url: env::var("VNPAY_RETURN_URL")
                    .unwrap_or_else(|_| "https://your-domain.com/api/payment/vnpay/return".to_string()),
                ipn_url: env::var("VNPAY_IPN_URL")
                    .unwrap_or_else(|_| "https://your-domain.com/api/payment/vnpay/ipn".to_string()),
            },
            momo: MomoConfig {
                partner_code: env::var("MOMO_PARTNER_CODE").expect("MOMO_PARTNER_CODE must be set"),
                access_key: env::var("MOMO_ACCESS_KEY").expect("MOMO_ACCESS_KEY must be set"),
                secret_key: env::var("MOMO_SECRET_KEY").expect("MOMO_SECRET_KEY must be set"),
                create_url: env::var("MOMO_CREATE_URL")
                    .unwrap_or_else(|_| "https://test-payment.momo.vn/v2/gateway/api/create".to_string()),
                redirect_url: env::var("MOMO_REDIRECT_URL")
                    .unwrap_or_else(|_| "https://your-domain.com/payment-result".to_string()),
                ipn_url: env::var("MOMO_IPN_URL")
                    .unwrap_or_else(|_| "https://your-domain.com/api/payment/momo/ipn".to_string()),
            },
            sweeper: SweeperConfig {
                interval_secs: env::var("SWEEPER_INTERVAL_SECS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .expect("SWEEPER_INTERVAL_SECS must be a valid number"),
            },
            notifier: NotifierConfig {
                dispatch_url: env::var("TICKET_DISPATCH_URL")
                    .unwrap_or_else(|_| "http://localhost:8025/api/send".to_string()),
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: env::var("CIRCUIT_BREAKER_FAILURE_THRESHOLD")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()
                    .expect("CIRCUIT_BREAKER_FAILURE_THRESHOLD must be a valid number"),
                timeout_seconds: env::var("CIRCUIT_BREAKER_TIMEOUT_SECONDS")
                    .unwrap_or_else(|_| "60".to_string())
                    .parse()
                    .expect("CIRCUIT_BREAKER_TIMEOUT_SECONDS must be a valid number"),
            },
        }
    }
}
