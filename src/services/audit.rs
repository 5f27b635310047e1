use sqlx::PgPool;
use uuid::Uuid;

/// An audit log entry to record.
pub struct AuditEntry {
    pub user_id: Uuid,
    pub action: &'static str,
    pub resource_type: &'static str,
    pub resource_id: Uuid,
    pub detail: Option<String>,
}

/// Fire-and-forget audit log entry.
/// Spawns a background task: never blocks the request handler,
/// never propagates errors (logs a warning on failure).
pub fn log(pool: PgPool, entry: AuditEntry) {
    tokio::spawn(async move {
        let res = sqlx::query(
            "INSERT INTO audit_log (user_id, action, resource_type, resource_id, detail)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(entry.user_id)
        .bind(entry.action)
        .bind(entry.resource_type)
        .bind(entry.resource_id)
        .bind(entry.detail)
        .execute(&pool)
        .await;

        if let Err(e) = res {
            tracing::warn!("audit log insert failed for {} {}: {e}", entry.action, entry.resource_id);
        }
    });
}
