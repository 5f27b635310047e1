/// Credit tokens to a user's balance.
///
/// Usage: grant-tokens (--email EMAIL | --user-id UUID) --amount N [--description TEXT]

use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use uuid::Uuid;

use petitions_api::services::balance::BalanceService;

#[derive(Parser)]
#[command(name = "grant-tokens", about = "Credit petition tokens to a user")]
struct Args {
    /// Account email
    #[arg(long, conflicts_with = "user_id", required_unless_present = "user_id")]
    email: Option<String>,

    /// Account id
    #[arg(long)]
    user_id: Option<Uuid>,

    /// Tokens to add (must be positive)
    #[arg(long)]
    amount: i64,

    #[arg(long, default_value = "Manual credit")]
    description: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();

    let database_url = std::env::var("DATABASE_URL")
        .map_err(|_| anyhow::anyhow!("DATABASE_URL environment variable not set"))?;

    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(&database_url)
        .await?;

    let user_id = match (args.user_id, args.email.as_deref()) {
        (Some(id), _) => id,
        (None, Some(email)) => sqlx::query_scalar("SELECT id FROM users WHERE LOWER(email) = LOWER($1)")
            .bind(email.trim())
            .fetch_optional(&pool)
            .await?
            .ok_or_else(|| anyhow::anyhow!("No user with email {email}"))?,
        (None, None) => anyhow::bail!("Either --email or --user-id is required"),
    };

    let balance = BalanceService::credit(&pool, user_id, args.amount, &args.description).await?;
    tracing::info!("Credited {} tokens to {}; balance is now {}", args.amount, user_id, balance);

    Ok(())
}
