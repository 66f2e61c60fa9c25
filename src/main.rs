// src/main.rs

use std::sync::Arc;
use std::time::Duration;

use dotenvy::dotenv;
use exam_gate::config::Config;
use exam_gate::engine::{ExamEngine, MonitorPolicy, spawn_sweeper};
use exam_gate::routes;
use exam_gate::state::AppState;
use exam_gate::store::{MemoryStore, PgStore, Store};
use exam_gate::utils::clock::SystemClock;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file (if present)
    dotenv().ok();

    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    let store: Arc<dyn Store> = match config.database_url.as_deref() {
        Some(url) => {
            let pool = connect_with_retry(url).await?;
            tracing::info!("Running migrations...");
            sqlx::migrate!("./migrations").run(&pool).await?;
            tracing::info!("Migrations applied successfully.");
            Arc::new(PgStore::new(pool))
        }
        None => {
            tracing::warn!(
                "DATABASE_URL not set; using the in-memory store (data is lost on exit)"
            );
            Arc::new(MemoryStore::default())
        }
    };

    let engine = Arc::new(ExamEngine::new(
        store,
        Arc::new(SystemClock),
        MonitorPolicy::from(&config),
    ));
    let sweep_every = Duration::from_secs(config.sweep_interval_secs.max(1));
    let _sweeper = spawn_sweeper(engine.clone(), sweep_every);

    let state = AppState { engine, config: config.clone() };
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}

async fn connect_with_retry(url: &str) -> Result<sqlx::PgPool, sqlx::Error> {
    let mut retry_count = 0;
    loop {
        match PgPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(url)
            .await
        {
            Ok(pool) => {
                tracing::info!("Database connected...");
                return Ok(pool);
            }
            Err(e) => {
                retry_count += 1;
                if retry_count > 5 {
                    tracing::error!("Failed to connect to database after 5 retries: {}", e);
                    return Err(e);
                }
                tracing::warn!("Database not ready, retrying in 2s... (Attempt {})", retry_count);
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }
    }
}
