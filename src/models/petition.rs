use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PetitionStatus {
    Pending,
    Processing,
    InReview,
    Review,
    Approved,
    Rejected,
    Complete,
}

impl std::fmt::Display for PetitionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PetitionStatus::Pending => "pending",
            PetitionStatus::Processing => "processing",
            PetitionStatus::InReview => "in_review",
            PetitionStatus::Review => "review",
            PetitionStatus::Approved => "approved",
            PetitionStatus::Rejected => "rejected",
            PetitionStatus::Complete => "complete",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for PetitionStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PetitionStatus::Pending),
            "processing" => Ok(PetitionStatus::Processing),
            "in_review" => Ok(PetitionStatus::InReview),
            "review" => Ok(PetitionStatus::Review),
            "approved" => Ok(PetitionStatus::Approved),
            "rejected" => Ok(PetitionStatus::Rejected),
            "complete" => Ok(PetitionStatus::Complete),
            _ => Err(anyhow::anyhow!("Unknown petition status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Petition {
    pub id: Uuid,
    pub user_id: Uuid,
    pub team_id: Option<Uuid>,
    pub title: String,
    pub description: String,
    pub legal_area: Option<String>,
    pub petition_type: Option<String>,
    pub has_process: bool,
    pub process_number: Option<String>,
    pub target: Option<String>,
    pub content: String,
    pub category: Option<String>,
    pub form_answers: Value,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Row shape used by the list endpoint (no form answers or content).
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PetitionSummary {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub legal_area: Option<String>,
    pub petition_type: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub user_id: Uuid,
    pub team_id: Option<Uuid>,
    pub author_name: Option<String>,
    pub author_email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PetitionAttachment {
    pub id: Uuid,
    pub petition_id: Uuid,
    pub file_name: String,
    pub file_url: String,
    pub file_type: Option<String>,
    pub file_size: Option<i64>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PetitionComment {
    pub id: Uuid,
    pub petition_id: Uuid,
    pub author_id: Uuid,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PetitionDocument {
    pub id: Uuid,
    pub petition_id: Uuid,
    pub file_name: String,
    pub file_url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PetitionDetail {
    #[serde(flatten)]
    pub petition: Petition,
    pub attachments: Vec<PetitionAttachment>,
    pub comments: Vec<PetitionComment>,
    pub petition_documents: Vec<PetitionDocument>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PetitionQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
    pub sort_direction: Option<String>,
}

impl PetitionQuery {
    pub const DEFAULT_LIMIT: i64 = 20;
    pub const MAX_LIMIT: i64 = 100;
    pub const MAX_PAGE: i64 = 100_000;

    pub fn page(&self) -> i64 {
        self.page.unwrap_or(1).clamp(1, Self::MAX_PAGE)
    }

    pub fn limit(&self) -> i64 {
        self.limit.unwrap_or(Self::DEFAULT_LIMIT).clamp(1, Self::MAX_LIMIT)
    }

    pub fn offset(&self) -> i64 {
        (self.page() - 1).saturating_mul(self.limit())
    }

    pub fn ascending(&self) -> bool {
        self.sort_direction.as_deref() == Some("asc")
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PetitionPage {
    pub data: Vec<PetitionSummary>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
    pub total_pages: i64,
}

impl PetitionPage {
    pub fn new(data: Vec<PetitionSummary>, total: i64, page: i64, limit: i64) -> Self {
        let total_pages = if total == 0 { 0 } else { (total + limit - 1) / limit };
        Self { data, total, page, limit, total_pages }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CreatePetitionRequest {
    pub title: Option<String>,
    pub team_id: Option<Uuid>,
    pub description: Option<String>,
    pub legal_area: Option<String>,
    pub petition_type: Option<String>,
    #[serde(default)]
    pub has_process: bool,
    pub process_number: Option<String>,
    pub target: Option<String>,
    pub form_answers: Option<Value>,
    pub content: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct UpdatePetitionRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub legal_area: Option<String>,
    pub petition_type: Option<String>,
    pub has_process: Option<bool>,
    pub process_number: Option<String>,
    pub target: Option<String>,
    pub form_answers: Option<Value>,
    pub content: Option<String>,
    pub category: Option<String>,
    pub status: Option<String>,
}

/// Trim, and turn blank strings into `None`.
pub fn clean(s: Option<&str>) -> Option<String> {
    s.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}
