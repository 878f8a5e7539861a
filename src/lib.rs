pub mod config;
pub mod database;
pub mod error;
pub mod models;
pub mod controllers;
pub mod middleware;
pub mod services;
pub mod gateway;

use std::sync::Arc;

use gateway::Gateways;
use services::broadcast::SeatEventHub;
use services::notify::TicketNotifier;

// Shared state для всего приложения
pub struct AppState {
    pub db: database::Database,
    pub config: config::Config,
    pub hub: SeatEventHub,
    pub gateways: Gateways,
    pub notifier: TicketNotifier,
}

impl AppState {
    pub async fn new(config: config::Config) -> anyhow::Result<Arc<Self>> {
        let db = database::Database::new(&config.database.url, config.database.pool_size).await?;

        db.run_migrations().await?;

        // Шлюзы создаются один раз: circuit breaker хранит состояние
        let gateways = Gateways::from_config(&config);
        let notifier = TicketNotifier::from_config(&config.notifier);

        Ok(Arc::new(Self {
            db,
            config,
            hub: SeatEventHub::new(),
            gateways,
            notifier,
        }))
    }
}
