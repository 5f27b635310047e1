use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    models::user::{UpdateProfileRequest, User, UserProfile},
    services::auth::USER_COLUMNS,
};

pub struct ProfileService;

impl ProfileService {
    pub async fn get(pool: &PgPool, user_id: Uuid) -> anyhow::Result<Option<UserProfile>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
        Ok(user.map(UserProfile::from))
    }

    pub async fn update(
        pool: &PgPool,
        user_id: Uuid,
        req: &UpdateProfileRequest,
    ) -> anyhow::Result<Option<UserProfile>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users
             SET name = COALESCE($1, name),
                 avatar_url = COALESCE($2, avatar_url),
                 oab_number = COALESCE($3, oab_number),
                 phone = COALESCE($4, phone),
                 city = COALESCE($5, city),
                 state = COALESCE($6, state),
                 updated_at = NOW()
             WHERE id = $7
             RETURNING {USER_COLUMNS}"
        ))
        .bind(req.name.as_deref().map(str::trim))
        .bind(&req.avatar_url)
        .bind(&req.oab_number)
        .bind(&req.phone)
        .bind(&req.city)
        .bind(&req.state)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
        Ok(user.map(UserProfile::from))
    }
}
