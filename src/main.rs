use std::sync::Arc;

use streambridge::api;
use streambridge::config::QueueConfig;
use streambridge::engine::{Dispatcher, Reaper};
use streambridge::services::SinkRegistry;

use sqlx::postgres::PgPoolOptions;
use std::env;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "streambridge=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Streambridge v{}", env!("CARGO_PKG_VERSION"));

    let database_url = env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    info!("Connecting to database...");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    info!("Database connected");

    let config = QueueConfig::from_env();
    let sinks = SinkRegistry::from_env();

    let dispatcher = Arc::new(Dispatcher::new(
        pool.clone(),
        sinks.clone(),
        config.clone(),
    ));
    let workers = Arc::clone(&dispatcher).spawn_workers();
    info!("Spawned {} dispatch worker(s)", workers.len());

    let reaper = Reaper::new(pool.clone(), config.clone());
    tokio::spawn(async move { reaper.run().await });

    let app = api::build_router(pool, sinks, config)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let host = env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = env::var("PORT").unwrap_or_else(|_| "3310".to_string());
    let addr = format!("{}:{}", host, port);

    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
