// src/main.rs

use std::sync::Arc;

use dotenvy::dotenv;
use exam_trainer::config::{Config, StorageBackend};
use exam_trainer::routes;
use exam_trainer::state::AppState;
use exam_trainer::store::{DynStore, MemoryStore, PgStore, loader};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file (if present)
    dotenv().ok();

    // Load configuration from environment
    let config = Config::from_env();

    let file_appender = tracing_appender::rolling::daily("logs", "app.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::new(&config.rust_log);
    let stdout_layer = fmt::layer().with_writer(std::io::stdout).with_target(false);
    let file_layer = fmt::layer().with_writer(non_blocking).with_ansi(false);

    // Initialize Tracing (Logging)
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .init();

    tracing::info!(
        correct_weight = config.score_weights.correct,
        incorrect_weight = config.score_weights.incorrect,
        unseen_policy = ?config.unseen_policy,
        "Scoring configuration loaded"
    );

    let store: DynStore = match config.storage {
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or("DATABASE_URL must be set for the postgres backend")?;
            Arc::new(PgStore::connect(url).await?)
        }
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory storage; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };

    // Import question pools shipped as JSON files
    if let Some(dir) = &config.question_pool_dir {
        match loader::import_pools(store.as_ref(), dir).await {
            Ok(count) => tracing::info!("Imported {} question pool(s) from {}", count, dir.display()),
            Err(e) => tracing::error!("Failed to import question pools from {}: {}", dir.display(), e),
        }
    }

    let bind_addr = config.bind_addr.clone();
    let state = AppState::new(store, config);

    // Create the Axum application router
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("Listening on {}", bind_addr);

    // Start the server
    axum::serve(listener, app).await?;
    Ok(())
}
