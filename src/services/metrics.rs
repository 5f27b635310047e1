use lazy_static::lazy_static;
use prometheus::{register_counter_vec, register_gauge, register_gauge_vec, CounterVec, Gauge, GaugeVec};
use sqlx::PgPool;
use tracing::{info, warn};

lazy_static! {
    // ── Event counters ──────────────────────────────────────────────────────
    pub static ref LOGINS_COUNTER: CounterVec = register_counter_vec!(
        "api_logins_total",
        "Login attempts by outcome",
        &["status"]
    ).unwrap();

    pub static ref REFRESH_COUNTER: CounterVec = register_counter_vec!(
        "api_token_refreshes_total",
        "Refresh token exchanges by outcome (success, rejected, reused)",
        &["status"]
    ).unwrap();

    pub static ref PETITIONS_CREATED_COUNTER: CounterVec = register_counter_vec!(
        "api_petitions_created_total",
        "Petitions created",
        &["legal_area"]
    ).unwrap();

    // ── Business metrics ────────────────────────────────────────────────────
    pub static ref USERS_GAUGE: Gauge = register_gauge!(
        "petitions_users_total",
        "Registered users"
    ).unwrap();

    pub static ref PETITIONS_GAUGE: GaugeVec = register_gauge_vec!(
        "petitions_by_status_total",
        "Petitions by status",
        &["status"]
    ).unwrap();

    pub static ref ACTIVE_SESSIONS_GAUGE: Gauge = register_gauge!(
        "petitions_active_refresh_tokens_total",
        "Refresh tokens that are neither revoked nor expired"
    ).unwrap();
}

/// Spawn the background metrics collector (refreshes every 5 minutes).
pub fn start(pool: PgPool) {
    tokio::spawn(async move {
        if let Err(e) = collect(&pool).await {
            warn!("Metrics: initial collection failed: {}", e);
        }
        loop {
            tokio::time::sleep(tokio::time::Duration::from_secs(300)).await;
            if let Err(e) = collect(&pool).await {
                warn!("Metrics: collection failed: {}", e);
            }
        }
    });
}

async fn collect(pool: &PgPool) -> anyhow::Result<()> {
    let users: i64 = sqlx::query_scalar("SELECT COUNT(*)::BIGINT FROM users")
        .fetch_one(pool)
        .await?;
    USERS_GAUGE.set(users as f64);

    let by_status: Vec<(String, i64)> =
        sqlx::query_as("SELECT status, COUNT(*)::BIGINT FROM petitions GROUP BY status")
            .fetch_all(pool)
            .await
            .unwrap_or_default();
    for (status, count) in &by_status {
        PETITIONS_GAUGE.with_label_values(&[status.as_str()]).set(*count as f64);
    }

    let sessions: i64 = sqlx::query_scalar(
        "SELECT COUNT(*)::BIGINT FROM refresh_tokens WHERE revoked_at IS NULL AND expires_at > NOW()",
    )
    .fetch_one(pool)
    .await
    .unwrap_or(0);
    ACTIVE_SESSIONS_GAUGE.set(sessions as f64);

    info!("Metrics: collected ({} users, {} petition statuses)", users, by_status.len());
    Ok(())
}
