use serde_json::Value;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::models::balance::{BalanceResponse, TokenTransaction};

/// A ledger entry to record alongside a balance change.
pub struct LedgerEntry<'a> {
    pub user_id: Uuid,
    pub amount: i64,
    pub transaction_type: &'a str,
    pub description: String,
    pub petition_id: Option<Uuid>,
    pub team_id: Option<Uuid>,
    pub metadata: Value,
}

pub struct BalanceService;

impl BalanceService {
    /// Lock the user's balance row for the rest of the transaction and return it.
    /// A user without a row has a balance of zero.
    pub async fn lock_balance(conn: &mut PgConnection, user_id: Uuid) -> anyhow::Result<i64> {
        sqlx::query("INSERT INTO user_tokens (user_id, tokens) VALUES ($1, 0) ON CONFLICT (user_id) DO NOTHING")
            .bind(user_id)
            .execute(&mut *conn)
            .await?;
        let tokens: i64 =
            sqlx::query_scalar("SELECT tokens FROM user_tokens WHERE user_id = $1 FOR UPDATE")
                .bind(user_id)
                .fetch_one(&mut *conn)
                .await?;
        Ok(tokens)
    }

    /// Write a ledger entry and apply its amount to the balance. Returns the new balance.
    pub async fn apply(conn: &mut PgConnection, entry: LedgerEntry<'_>) -> anyhow::Result<i64> {
        sqlx::query(
            "INSERT INTO token_transactions
                (user_id, amount, transaction_type, description, petition_id, team_id, metadata)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(entry.user_id)
        .bind(entry.amount)
        .bind(entry.transaction_type)
        .bind(&entry.description)
        .bind(entry.petition_id)
        .bind(entry.team_id)
        .bind(&entry.metadata)
        .execute(&mut *conn)
        .await?;

        let tokens: i64 = sqlx::query_scalar(
            "UPDATE user_tokens SET tokens = tokens + $1, updated_at = NOW()
             WHERE user_id = $2
             RETURNING tokens",
        )
        .bind(entry.amount)
        .bind(entry.user_id)
        .fetch_one(&mut *conn)
        .await?;
        Ok(tokens)
    }

    /// Credit a user's balance outside of any purchase flow.
    pub async fn credit(
        pool: &PgPool,
        user_id: Uuid,
        amount: i64,
        description: &str,
    ) -> anyhow::Result<i64> {
        if amount <= 0 {
            anyhow::bail!("Credit amount must be positive");
        }
        let mut tx = pool.begin().await?;
        Self::lock_balance(&mut *tx, user_id).await?;
        let tokens = Self::apply(
            &mut *tx,
            LedgerEntry {
                user_id,
                amount,
                transaction_type: "manual_credit",
                description: description.to_string(),
                petition_id: None,
                team_id: None,
                metadata: serde_json::json!({}),
            },
        )
        .await?;
        tx.commit().await?;
        Ok(tokens)
    }

    pub async fn for_user(pool: &PgPool, user_id: Uuid) -> anyhow::Result<BalanceResponse> {
        let tokens: Option<i64> =
            sqlx::query_scalar("SELECT tokens FROM user_tokens WHERE user_id = $1")
                .bind(user_id)
                .fetch_optional(pool)
                .await?;
        let transactions = sqlx::query_as::<_, TokenTransaction>(
            "SELECT * FROM token_transactions WHERE user_id = $1 ORDER BY created_at DESC LIMIT 50",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(BalanceResponse { tokens: tokens.unwrap_or(0), transactions })
    }
}
