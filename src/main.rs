use std::sync::Arc;

use anyhow::Context;
use fightpicks::{
    build_router, AppConfig, AppState, InMemoryScoringRepository, PostgresScoringRepository,
    ScoringRepository,
};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fightpicks=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting fight picks scoring server");

    let config = AppConfig::from_env();

    let repository: Arc<dyn ScoringRepository> = match &config.database_url {
        Some(database_url) => {
            let pool = sqlx::PgPool::connect(database_url)
                .await
                .context("Failed to connect to database")?;
            let repository = PostgresScoringRepository::new(pool)
                .with_statement_timeout(config.scoring.resolution_timeout);
            repository
                .migrate()
                .await
                .context("Failed to run migrations")?;
            info!("Using PostgreSQL scoring store");
            Arc::new(repository)
        }
        None => {
            warn!("DATABASE_URL not set, scores live in memory only");
            Arc::new(InMemoryScoringRepository::new())
        }
    };

    let app_state = AppState::new(repository, config.scoring, config.token.clone());
    let app = build_router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!(bind_addr = %config.bind_addr, "Server running");
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
