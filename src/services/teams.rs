use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::team::{Membership, Team, TeamBalance, TeamDetail, TeamMemberView, TeamRole},
};

const MEMBER_VIEW_QUERY: &str = "SELECT tm.id, tm.user_id, tm.role, u.name, u.email, u.avatar_url, tm.created_at
     FROM team_members tm
     JOIN users u ON u.id = tm.user_id";

pub struct TeamService;

impl TeamService {
    /// Ids of every team the user belongs to. Queried fresh on every request.
    pub async fn team_ids_for(pool: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<Uuid>> {
        let ids = sqlx::query_scalar("SELECT team_id FROM team_members WHERE user_id = $1")
            .bind(user_id)
            .fetch_all(pool)
            .await?;
        Ok(ids)
    }

    pub async fn role_in(
        pool: &PgPool,
        team_id: Uuid,
        user_id: Uuid,
    ) -> anyhow::Result<Option<TeamRole>> {
        let role: Option<String> = sqlx::query_scalar(
            "SELECT role FROM team_members WHERE team_id = $1 AND user_id = $2",
        )
        .bind(team_id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
        role.map(|r| r.parse::<TeamRole>()).transpose()
    }

    pub async fn exists(pool: &PgPool, team_id: Uuid) -> anyhow::Result<bool> {
        let exists = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM teams WHERE id = $1)")
            .bind(team_id)
            .fetch_one(pool)
            .await?;
        Ok(exists)
    }

    /// The single owner of a team, if the team exists.
    pub async fn owner_of(conn: &mut PgConnection, team_id: Uuid) -> anyhow::Result<Option<Uuid>> {
        let owner = sqlx::query_scalar(
            "SELECT user_id FROM team_members WHERE team_id = $1 AND role = 'owner'",
        )
        .bind(team_id)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(owner)
    }

    pub async fn list_memberships(pool: &PgPool, user_id: Uuid) -> anyhow::Result<Vec<Membership>> {
        let rows = sqlx::query_as::<_, Membership>(
            "SELECT tm.team_id, tm.role, t.id, t.name, t.created_at, t.updated_at
             FROM team_members tm
             JOIN teams t ON t.id = tm.team_id
             WHERE tm.user_id = $1
             ORDER BY t.name",
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;
        Ok(rows)
    }

    /// Create a team with `owner_id` as its owner.
    pub async fn create(pool: &PgPool, owner_id: Uuid, name: &str) -> Result<Team, ApiError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ApiError::bad_request("Team name is required"));
        }

        let mut tx = pool.begin().await?;
        let team = sqlx::query_as::<_, Team>("INSERT INTO teams (name) VALUES ($1) RETURNING *")
            .bind(name)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO team_members (team_id, user_id, role) VALUES ($1, $2, 'owner')")
            .bind(team.id)
            .bind(owner_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(team)
    }

    pub async fn get_detail(pool: &PgPool, team_id: Uuid) -> anyhow::Result<Option<TeamDetail>> {
        let Some(team) = sqlx::query_as::<_, Team>("SELECT * FROM teams WHERE id = $1")
            .bind(team_id)
            .fetch_optional(pool)
            .await?
        else {
            return Ok(None);
        };

        let members = sqlx::query_as::<_, TeamMemberView>(&format!(
            "{MEMBER_VIEW_QUERY} WHERE tm.team_id = $1 ORDER BY tm.created_at"
        ))
        .bind(team_id)
        .fetch_all(pool)
        .await?;

        Ok(Some(TeamDetail { team, members }))
    }

    pub async fn update(pool: &PgPool, team_id: Uuid, name: Option<&str>) -> Result<Team, ApiError> {
        let name = name.map(str::trim);
        if name.is_some_and(str::is_empty) {
            return Err(ApiError::bad_request("Team name cannot be empty"));
        }
        sqlx::query_as::<_, Team>(
            "UPDATE teams SET name = COALESCE($1, name), updated_at = NOW()
             WHERE id = $2
             RETURNING *",
        )
        .bind(name)
        .bind(team_id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Team not found"))
    }

    pub async fn delete(pool: &PgPool, team_id: Uuid) -> anyhow::Result<bool> {
        let deleted = sqlx::query("DELETE FROM teams WHERE id = $1")
            .bind(team_id)
            .execute(pool)
            .await?
            .rows_affected();
        Ok(deleted > 0)
    }

    /// Add an existing user, looked up by email, to a team.
    pub async fn add_member(
        pool: &PgPool,
        team_id: Uuid,
        email: &str,
        role: TeamRole,
    ) -> Result<TeamMemberView, ApiError> {
        if role == TeamRole::Owner {
            return Err(ApiError::bad_request("A team has exactly one owner"));
        }
        let email = email.trim().to_lowercase();
        if email.is_empty() {
            return Err(ApiError::bad_request("Email is required"));
        }

        let user_id: Uuid = sqlx::query_scalar("SELECT id FROM users WHERE lower(email) = $1")
            .bind(&email)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::not_found("No user with this email"))?;

        sqlx::query(
            "INSERT INTO team_members (team_id, user_id, role) VALUES ($1, $2, $3)
             ON CONFLICT (team_id, user_id) DO NOTHING",
        )
        .bind(team_id)
        .bind(user_id)
        .bind(role.to_string())
        .execute(pool)
        .await?;

        let member = sqlx::query_as::<_, TeamMemberView>(&format!(
            "{MEMBER_VIEW_QUERY} WHERE tm.team_id = $1 AND tm.user_id = $2"
        ))
        .bind(team_id)
        .bind(user_id)
        .fetch_one(pool)
        .await?;
        Ok(member)
    }

    pub async fn remove_member(pool: &PgPool, team_id: Uuid, user_id: Uuid) -> Result<(), ApiError> {
        match Self::role_in(pool, team_id, user_id).await? {
            None => Err(ApiError::not_found("Member not found")),
            Some(TeamRole::Owner) => Err(ApiError::bad_request("The team owner cannot be removed")),
            Some(TeamRole::Member) => {
                sqlx::query("DELETE FROM team_members WHERE team_id = $1 AND user_id = $2")
                    .bind(team_id)
                    .bind(user_id)
                    .execute(pool)
                    .await?;
                Ok(())
            }
        }
    }

    /// Token balance of the team's owner, who pays for the team's petitions.
    pub async fn balance(pool: &PgPool, team_id: Uuid) -> Result<TeamBalance, ApiError> {
        let mut conn = pool.acquire().await?;
        let owner_id = Self::owner_of(&mut *conn, team_id)
            .await?
            .ok_or_else(|| ApiError::not_found("Team owner not found"))?;
        let tokens: Option<i64> =
            sqlx::query_scalar("SELECT tokens FROM user_tokens WHERE user_id = $1")
                .bind(owner_id)
                .fetch_optional(&mut *conn)
                .await?;
        Ok(TeamBalance { team_id, owner_id, tokens: tokens.unwrap_or(0) })
    }
}
