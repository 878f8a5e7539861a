use axum::{routing::get, Router};
use std::net::SocketAddr;
use std::time::Duration;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cinema_system::{
    config::Config,
    controllers,
    services::sweeper::Sweeper,
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&config.app.rust_log))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Cinema Ticket API");

    let sweep_interval = Duration::from_secs(config.sweeper.interval_secs);
    let port = config.app.port;

    // Соединение с БД + миграции + шлюзы
    let app_state = AppState::new(config).await?;
    info!("Database connected");

    // --- Start background tasks ---

    // Sweeper: просроченные блокировки мест и брошенные заказы.
    // TTL на захвате сам ограничивает худшую несвежесть одним интервалом.
    let sweeper = Sweeper::new(app_state.clone());
    tokio::task::spawn(async move {
        let mut ticker = tokio::time::interval(sweep_interval);
        loop {
            ticker.tick().await;
            sweeper.run_tick().await;
        }
    });

    // --- Start the web server ---

    let app = Router::new()
        .route("/", get(|| async { "Cinema Ticket API v1.0" }))
        .route("/health", get(controllers::health))
        // Mount the routes from the controllers module
        .nest("/api", controllers::routes())
        // Pass the application state to the router
        .with_state(app_state.clone())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
