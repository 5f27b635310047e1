use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TeamRole {
    Owner,
    Member,
}

impl std::fmt::Display for TeamRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TeamRole::Owner => "owner",
            TeamRole::Member => "member",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for TeamRole {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "owner" => Ok(TeamRole::Owner),
            "member" => Ok(TeamRole::Member),
            _ => Err(anyhow::anyhow!("Unknown team role: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// One of the caller's memberships, as listed by `GET /api-teams`.
#[derive(Debug, Clone, Serialize, FromRow)]
pub struct Membership {
    pub team_id: Uuid,
    /// Fetched as TEXT, see `TeamRole` for the accepted values.
    pub role: String,
    #[sqlx(flatten)]
    pub team: Team,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct TeamMemberView {
    pub id: Uuid,
    pub user_id: Uuid,
    pub role: String,
    pub name: Option<String>,
    pub email: String,
    pub avatar_url: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct TeamDetail {
    #[serde(flatten)]
    pub team: Team,
    pub members: Vec<TeamMemberView>,
}

#[derive(Debug, Serialize)]
pub struct TeamBalance {
    pub team_id: Uuid,
    pub owner_id: Uuid,
    pub tokens: i64,
}

#[derive(Debug, Deserialize)]
pub struct CreateTeamRequest {
    #[serde(default)]
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateTeamRequest {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AddMemberRequest {
    #[serde(default)]
    pub email: String,
    pub role: Option<TeamRole>,
}
