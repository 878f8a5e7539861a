//! HTTP-клиент исходящих вызовов к платёжным шлюзам.
//!
//! Все сетевые вызовы защищены паттерном "Автоматический выключатель":
//! после серии сбоев запросы блокируются, по таймауту разрешается один
//! пробный запрос.

use std::sync::Mutex;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

use crate::config::CircuitBreakerConfig;

use super::GatewayError;

/// Состояния выключателя.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Нормальный режим, запросы разрешены.
    Closed,
    /// Режим блокировки после множественных сбоев.
    Open,
    /// Пробный режим: один тестовый запрос после таймаута.
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    failure_threshold: u32,
    timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(failure_threshold: u32, timeout_seconds: u64) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
            }),
            failure_threshold,
            timeout: Duration::from_secs(timeout_seconds),
        }
    }

    /// Можно ли выполнить следующий запрос.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                if elapsed >= self.timeout {
                    inner.state = CircuitState::HalfOpen;
                    info!("circuit breaker transitioning to HalfOpen state");
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Closed;
                inner.failure_count = 0;
                info!("circuit breaker recovered - transitioning to Closed state");
            }
            CircuitState::Closed => {
                inner.failure_count = 0;
            }
            CircuitState::Open => {}
        }
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.failure_count += 1;
        inner.last_failure = Some(Instant::now());
        match inner.state {
            CircuitState::Closed => {
                if inner.failure_count >= self.failure_threshold {
                    inner.state = CircuitState::Open;
                    error!(
                        "circuit breaker OPENED - {} failures reached threshold {}",
                        inner.failure_count, self.failure_threshold
                    );
                }
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                warn!("circuit breaker test failed - returning to Open state");
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().unwrap().state
    }
}

/// reqwest-клиент + выключатель. Используется адаптерами, которым нужен
/// server-to-server вызов (MoMo create); redirect-флоу VNPay сетевых
/// вызовов не делает.
pub struct GatewayHttpClient {
    pub http: reqwest::Client,
    breaker: CircuitBreaker,
}

impl GatewayHttpClient {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("Failed to create HTTP client"),
            breaker: CircuitBreaker::new(config.failure_threshold, config.timeout_seconds),
        }
    }

    /// Пропускает операцию через выключатель.
    pub async fn execute<F, T>(&self, operation: F) -> Result<T, GatewayError>
    where
        F: std::future::Future<Output = Result<T, reqwest::Error>>,
    {
        if !self.breaker.can_execute() {
            warn!("circuit breaker is OPEN - blocking payment gateway request");
            return Err(GatewayError::CircuitOpen);
        }

        match operation.await {
            Ok(result) => {
                self.breaker.record_success();
                Ok(result)
            }
            Err(e) => {
                error!("payment gateway request failed: {:?}", e);
                self.breaker.record_failure();
                Err(GatewayError::Upstream(e.to_string()))
            }
        }
    }

    pub fn breaker_state(&self) -> CircuitState {
        self.breaker.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opens_after_reaching_failure_threshold() {
        let breaker = CircuitBreaker::new(3, 60);
        assert!(breaker.can_execute());

        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Closed);

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
        assert!(!breaker.can_execute());
    }

    #[test]
    fn half_open_after_timeout_then_closes_on_success() {
        let breaker = CircuitBreaker::new(1, 0); // нулевой таймаут: сразу HalfOpen
        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);

        assert!(breaker.can_execute());
        assert_eq!(breaker.state(), CircuitState::HalfOpen);

        breaker.record_success();
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[test]
    fn failed_probe_reopens_the_circuit() {
        let breaker = CircuitBreaker::new(1, 0);
        breaker.record_failure();
        assert!(breaker.can_execute()); // HalfOpen probe

        breaker.record_failure();
        assert_eq!(breaker.state(), CircuitState::Open);
    }

    #[test]
    fn success_resets_failure_count_when_closed() {
        let breaker = CircuitBreaker::new(2, 60);
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        // Счётчик сбросился, порог не достигнут - цепь остаётся замкнутой
        assert_eq!(breaker.state(), CircuitState::Closed);
    }
}
