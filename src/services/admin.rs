use sqlx::PgPool;
use uuid::Uuid;

use crate::models::admin::AdminStats;

pub struct AdminService;

impl AdminService {
    /// Admin status as currently stored; `None` when the user no longer exists.
    pub async fn is_admin(pool: &PgPool, user_id: Uuid) -> anyhow::Result<Option<bool>> {
        let is_admin = sqlx::query_scalar("SELECT is_admin FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;
        Ok(is_admin)
    }

    pub async fn stats(pool: &PgPool) -> anyhow::Result<AdminStats> {
        let (total_users, counts) = tokio::try_join!(
            sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users").fetch_one(pool),
            sqlx::query_as::<_, (String, i64)>(
                "SELECT status, COUNT(*) FROM petitions GROUP BY status"
            )
            .fetch_all(pool),
        )?;
        Ok(AdminStats::from_status_counts(total_users, counts))
    }
}
