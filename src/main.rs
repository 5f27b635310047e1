use std::sync::Arc;

use redis::Client as RedisClient;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use petitions_api::{
    build_router,
    config::Config,
    db,
    services::{email::EmailService, metrics, tokens::TokenIssuer},
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "petitions_api=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env()?);

    let tokens = TokenIssuer::new(
        &config.jwt_secret,
        config.access_token_ttl_seconds,
        config.refresh_token_ttl_days,
    )?;

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database connected and migrations applied");

    let redis = match &config.redis_url {
        Some(url) => {
            let conn = RedisClient::open(url.as_str())?
                .get_multiplexed_async_connection()
                .await?;
            info!("Redis connected");
            Some(conn)
        }
        None => {
            warn!("REDIS_URL not set, login rate limiting disabled");
            None
        }
    };

    let email = EmailService::new(&config).map(Arc::new);
    if email.is_some() {
        info!("SMTP email service configured");
    } else {
        warn!("SMTP not configured, password reset emails disabled");
    }

    metrics::start(pool.clone());

    let state = AppState {
        db: pool,
        redis,
        config: config.clone(),
        tokens: Arc::new(tokens),
        email,
    };

    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("petitions API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
