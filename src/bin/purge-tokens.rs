/// Delete expired and revoked refresh tokens.
/// Run daily (e.g., via cron job: 0 3 * * * /app/purge-tokens)
///
/// Usage: purge-tokens [--older-than-days N]

use clap::Parser;
use sqlx::postgres::PgPoolOptions;

#[derive(Parser)]
#[command(name = "purge-tokens", about = "Purge expired and revoked refresh tokens")]
struct Args {
    /// Keep rows that expired or were revoked within the last N days
    #[arg(long, default_value_t = 7)]
    older_than_days: i64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    if args.older_than_days < 0 {
        anyhow::bail!("--older-than-days must not be negative");
    }

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable not set"))?;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;

    tracing::info!("Purging refresh tokens older than {} days", args.older_than_days);
    let deleted =
        petitions_api::services::auth::AuthService::purge_refresh_tokens(&pool, args.older_than_days)
            .await?;
    tracing::info!("Deleted {} refresh tokens", deleted);

    Ok(())
}
