use serde_json::{json, Value};
use sqlx::PgPool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    error::ApiError,
    models::{
        auth::AuthenticatedUser,
        petition::{
            clean, CreatePetitionRequest, Petition, PetitionAttachment, PetitionComment, PetitionDetail,
            PetitionDocument, PetitionPage, PetitionQuery, PetitionStatus, PetitionSummary,
            UpdatePetitionRequest,
        },
    },
    services::{
        audit::{self, AuditEntry},
        balance::{BalanceService, LedgerEntry},
        metrics::PETITIONS_CREATED_COUNTER,
        policy::{decide, decide_create, PetitionAction, PetitionResource, Subject},
        teams::TeamService,
    },
};

/// Shared filter: admins see everything, others their own petitions and their teams'.
const VISIBILITY_FILTER: &str = "($1::BOOLEAN OR p.user_id = $2 OR p.team_id = ANY($3))
       AND ($4::TEXT IS NULL OR p.status = $4)";

pub struct PetitionService;

impl PetitionService {
    /// Build the authorization subject, re-reading team memberships.
    pub async fn subject_for(pool: &PgPool, user: &AuthenticatedUser) -> anyhow::Result<Subject> {
        let team_ids = TeamService::team_ids_for(pool, user.user_id).await?;
        Ok(Subject::new(user, team_ids))
    }

    pub async fn list(
        pool: &PgPool,
        subject: &Subject,
        query: &PetitionQuery,
    ) -> Result<PetitionPage, ApiError> {
        let status = match clean(query.status.as_deref()) {
            Some(s) => Some(
                s.parse::<PetitionStatus>()
                    .map_err(|e| ApiError::bad_request(e.to_string()))?
                    .to_string(),
            ),
            None => None,
        };
        let direction = if query.ascending() { "ASC" } else { "DESC" };

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*)::BIGINT FROM petitions p WHERE {VISIBILITY_FILTER}"
        ))
        .bind(subject.is_admin)
        .bind(subject.user_id)
        .bind(&subject.team_ids)
        .bind(&status)
        .fetch_one(pool)
        .await?;

        let data = sqlx::query_as::<_, PetitionSummary>(&format!(
            "SELECT p.id, p.title, p.description, p.legal_area, p.petition_type, p.status,
                    p.created_at, p.updated_at, p.user_id, p.team_id,
                    u.name AS author_name, u.email AS author_email
             FROM petitions p
             JOIN users u ON u.id = p.user_id
             WHERE {VISIBILITY_FILTER}
             ORDER BY p.created_at {direction}
             LIMIT $5 OFFSET $6"
        ))
        .bind(subject.is_admin)
        .bind(subject.user_id)
        .bind(&subject.team_ids)
        .bind(&status)
        .bind(query.limit())
        .bind(query.offset())
        .fetch_all(pool)
        .await?;

        Ok(PetitionPage::new(data, total, query.page(), query.limit()))
    }

    pub async fn get(pool: &PgPool, subject: &Subject, id: Uuid) -> Result<PetitionDetail, ApiError> {
        let petition = sqlx::query_as::<_, Petition>("SELECT * FROM petitions WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or_else(|| ApiError::not_found("Petition not found"))?;

        let resource = PetitionResource { owner_id: petition.user_id, team_id: petition.team_id };
        if !decide(subject, &resource, PetitionAction::Read).is_allowed() {
            return Err(ApiError::forbidden("No permission to access this petition"));
        }

        // Related rows are best effort: a failing side query yields an empty list.
        let (attachments, comments, documents) = tokio::join!(
            sqlx::query_as::<_, PetitionAttachment>(
                "SELECT * FROM petition_attachments WHERE petition_id = $1 ORDER BY created_at"
            )
            .bind(id)
            .fetch_all(pool),
            sqlx::query_as::<_, PetitionComment>(
                "SELECT * FROM petition_comments WHERE petition_id = $1 ORDER BY created_at"
            )
            .bind(id)
            .fetch_all(pool),
            sqlx::query_as::<_, PetitionDocument>(
                "SELECT * FROM petition_documents WHERE petition_id = $1 ORDER BY created_at DESC"
            )
            .bind(id)
            .fetch_all(pool),
        );

        Ok(PetitionDetail {
            petition,
            attachments: attachments.unwrap_or_else(|e| {
                warn!("petition {id}: attachments query failed: {e}");
                Vec::new()
            }),
            comments: comments.unwrap_or_else(|e| {
                warn!("petition {id}: comments query failed: {e}");
                Vec::new()
            }),
            petition_documents: documents.unwrap_or_else(|e| {
                warn!("petition {id}: documents query failed: {e}");
                Vec::new()
            }),
        })
    }

    /// Create a petition on a team and debit `cost` tokens from the team owner,
    /// atomically.
    pub async fn create(
        pool: &PgPool,
        subject: &Subject,
        req: &CreatePetitionRequest,
        cost: i64,
    ) -> Result<Petition, ApiError> {
        let title = clean(req.title.as_deref()).ok_or_else(|| ApiError::bad_request("Title is required"))?;
        let team_id = req.team_id.ok_or_else(|| ApiError::bad_request("Team id is required"))?;
        let form_answers = match &req.form_answers {
            None => json!({}),
            Some(v @ Value::Object(_)) => v.clone(),
            Some(_) => return Err(ApiError::bad_request("form_answers must be an object")),
        };

        if !decide_create(subject, team_id).is_allowed() {
            return Err(ApiError::forbidden("Access denied: you are not a member of this team"));
        }

        let mut tx = pool.begin().await?;

        let owner_id = TeamService::owner_of(&mut *tx, team_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("team {team_id} has no owner"))?;

        let balance = BalanceService::lock_balance(&mut *tx, owner_id).await?;
        if balance < cost {
            return Err(ApiError::bad_request(format!(
                "Insufficient balance: {cost} tokens required, {balance} available"
            )));
        }

        let process_number = if req.has_process { clean(req.process_number.as_deref()) } else { None };

        let petition = sqlx::query_as::<_, Petition>(
            "INSERT INTO petitions
                (user_id, team_id, title, description, legal_area, petition_type, has_process,
                 process_number, target, content, category, form_answers, status)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
             RETURNING *",
        )
        .bind(subject.user_id)
        .bind(team_id)
        .bind(&title)
        .bind(clean(req.description.as_deref()).unwrap_or_default())
        .bind(clean(req.legal_area.as_deref()))
        .bind(clean(req.petition_type.as_deref()))
        .bind(req.has_process)
        .bind(process_number)
        .bind(clean(req.target.as_deref()))
        .bind(clean(req.content.as_deref()).unwrap_or_default())
        .bind(clean(req.category.as_deref()))
        .bind(&form_answers)
        .bind(PetitionStatus::Pending.to_string())
        .fetch_one(&mut *tx)
        .await?;

        let remaining = BalanceService::apply(
            &mut *tx,
            LedgerEntry {
                user_id: owner_id,
                amount: -cost,
                transaction_type: "petition_creation",
                description: format!("Petition created: {}", petition.title),
                petition_id: Some(petition.id),
                team_id: Some(team_id),
                metadata: json!({
                    "petition_id": petition.id,
                    "created_by": subject.user_id,
                    "cost": cost,
                    "team_id": team_id,
                }),
            },
        )
        .await?;

        tx.commit().await?;

        PETITIONS_CREATED_COUNTER
            .with_label_values(&[petition.legal_area.as_deref().unwrap_or("unspecified")])
            .inc();
        info!(
            petition_id = %petition.id,
            team_id = %team_id,
            owner_id = %owner_id,
            remaining,
            "petition created"
        );
        audit::log(
            pool.clone(),
            AuditEntry {
                user_id: subject.user_id,
                action: "petition.create",
                resource_type: "petition",
                resource_id: petition.id,
                detail: Some(format!("charged {cost} tokens to {owner_id}")),
            },
        );

        Ok(petition)
    }

    pub async fn update(
        pool: &PgPool,
        subject: &Subject,
        id: Uuid,
        req: &UpdatePetitionRequest,
    ) -> Result<Petition, ApiError> {
        Self::authorize(pool, subject, id, PetitionAction::Update).await?;

        let status = req
            .status
            .as_deref()
            .map(|s| s.trim().parse::<PetitionStatus>())
            .transpose()
            .map_err(|e| ApiError::bad_request(e.to_string()))?
            .map(|s| s.to_string());
        if req.title.as_deref().is_some_and(|t| t.trim().is_empty()) {
            return Err(ApiError::bad_request("Title cannot be empty"));
        }
        if req.form_answers.as_ref().is_some_and(|v| !v.is_object()) {
            return Err(ApiError::bad_request("form_answers must be an object"));
        }

        let petition = sqlx::query_as::<_, Petition>(
            "UPDATE petitions
             SET title = COALESCE($1, title),
                 description = COALESCE($2, description),
                 legal_area = COALESCE($3, legal_area),
                 petition_type = COALESCE($4, petition_type),
                 has_process = COALESCE($5, has_process),
                 process_number = COALESCE($6, process_number),
                 target = COALESCE($7, target),
                 form_answers = COALESCE($8, form_answers),
                 content = COALESCE($9, content),
                 category = COALESCE($10, category),
                 status = COALESCE($11, status),
                 updated_at = NOW()
             WHERE id = $12
             RETURNING *",
        )
        .bind(req.title.as_deref().map(str::trim))
        .bind(req.description.as_deref().map(str::trim))
        .bind(clean(req.legal_area.as_deref()))
        .bind(clean(req.petition_type.as_deref()))
        .bind(req.has_process)
        .bind(clean(req.process_number.as_deref()))
        .bind(clean(req.target.as_deref()))
        .bind(&req.form_answers)
        .bind(req.content.as_deref().map(str::trim))
        .bind(clean(req.category.as_deref()))
        .bind(&status)
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Petition not found"))?;

        audit::log(
            pool.clone(),
            AuditEntry {
                user_id: subject.user_id,
                action: "petition.update",
                resource_type: "petition",
                resource_id: id,
                detail: status.map(|s| format!("status={s}")),
            },
        );
        Ok(petition)
    }

    pub async fn delete(pool: &PgPool, subject: &Subject, id: Uuid) -> Result<(), ApiError> {
        Self::authorize(pool, subject, id, PetitionAction::Delete).await?;

        sqlx::query("DELETE FROM petitions WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;

        audit::log(
            pool.clone(),
            AuditEntry {
                user_id: subject.user_id,
                action: "petition.delete",
                resource_type: "petition",
                resource_id: id,
                detail: None,
            },
        );
        Ok(())
    }

    /// 404 when the petition does not exist, 403 when the policy denies.
    async fn authorize(
        pool: &PgPool,
        subject: &Subject,
        id: Uuid,
        action: PetitionAction,
    ) -> Result<(), ApiError> {
        let row: Option<(Uuid, Option<Uuid>)> =
            sqlx::query_as("SELECT user_id, team_id FROM petitions WHERE id = $1")
                .bind(id)
                .fetch_optional(pool)
                .await?;
        let (owner_id, team_id) = row.ok_or_else(|| ApiError::not_found("Petition not found"))?;

        if decide(subject, &PetitionResource { owner_id, team_id }, action).is_allowed() {
            Ok(())
        } else {
            Err(ApiError::forbidden("No permission for this petition"))
        }
    }
}
