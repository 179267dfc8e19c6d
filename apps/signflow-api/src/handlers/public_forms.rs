//! Public Form Gateway: token-gated anonymous submission

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use signflow_core::generate_token;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::documents::fetch_owned_document;
use crate::models::*;
use crate::state::AppState;

/// Flip a document public: allocate a token and store the required-field
/// policy. Idempotent for an already-public document; the existing token
/// is kept so shared links stay valid.
pub async fn create_public_form(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(document_id): Path<String>,
    Json(req): Json<CreatePublicFormRequest>,
) -> Result<Json<PublicFormResponse>, ApiError> {
    let doc = fetch_owned_document(&state.db, &user.id, &document_id).await?;

    let config_json = serde_json::to_string(&req.required_fields)
        .map_err(|e| ApiError::Internal(e.into()))?;
    let now = Utc::now();

    let token = match &doc.public_token {
        Some(existing) if doc.is_public => {
            sqlx::query(
                "UPDATE documents SET public_form_config_json = ?, updated_at = ? WHERE id = ?",
            )
            .bind(&config_json)
            .bind(now.to_rfc3339())
            .bind(&document_id)
            .execute(&state.db)
            .await?;
            existing.clone()
        }
        _ => allocate_public_token(&state.db, &document_id, &config_json, now).await?,
    };

    tracing::info!("Public form enabled for document {}", document_id);

    Ok(Json(PublicFormResponse {
        document_id,
        url: format!("{}/form/{}", state.base_url.trim_end_matches('/'), token),
        public_token: token,
        required_fields: req.required_fields,
    }))
}

async fn allocate_public_token(
    db: &sqlx::SqlitePool,
    document_id: &str,
    config_json: &str,
    now: chrono::DateTime<Utc>,
) -> Result<String, ApiError> {
    for _ in 0..3 {
        let token = generate_token();
        let updated = sqlx::query(
            r#"
            UPDATE documents
            SET is_public = 1, public_token = ?, public_form_config_json = ?,
                public_enabled_at = COALESCE(public_enabled_at, ?), updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&token)
        .bind(config_json)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(document_id)
        .execute(db)
        .await;

        match updated {
            Ok(_) => return Ok(token),
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                tracing::warn!("public token collision, regenerating");
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(ApiError::Conflict(
        "could not allocate a unique public token".to_string(),
    ))
}

/// Take a document private again. Historical submissions survive and
/// stay listable; the token is cleared so `is_public` and the token
/// remain in lockstep.
pub async fn disable_public_form(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(document_id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    fetch_owned_document(&state.db, &user.id, &document_id).await?;

    sqlx::query(
        "UPDATE documents SET is_public = 0, public_token = NULL, updated_at = ? WHERE id = ?",
    )
    .bind(Utc::now().to_rfc3339())
    .bind(&document_id)
    .execute(&state.db)
    .await?;

    Ok(Json(MessageResponse {
        message: "Public form disabled".to_string(),
    }))
}

async fn fetch_public_document(
    db: &sqlx::SqlitePool,
    token: &str,
) -> Result<DbDocument, ApiError> {
    let doc: Option<DbDocument> =
        sqlx::query_as("SELECT * FROM documents WHERE public_token = ? AND is_public = 1")
            .bind(token)
            .fetch_optional(db)
            .await?;
    doc.ok_or_else(|| ApiError::NotFound("Unknown public form token".to_string()))
}

/// What an anonymous visitor sees: the document, its fields, and which
/// submitter attributes are mandatory.
pub async fn get_public_form(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<PublicFormView>, ApiError> {
    let doc = fetch_public_document(&state.db, &token).await?;

    let rows: Vec<DbFieldWithContact> = sqlx::query_as(
        r#"
        SELECT f.*, c.name AS recipient_name, c.email AS recipient_email
        FROM document_fields f
        LEFT JOIN contacts c ON c.id = f.recipient_id
        WHERE f.document_id = ?
        ORDER BY f.page, f.created_at, f.id
        "#,
    )
    .bind(&doc.id)
    .fetch_all(&state.db)
    .await?;

    let required_fields = doc.public_form_config();
    Ok(Json(PublicFormView {
        required_fields,
        fields: rows.into_iter().map(Into::into).collect(),
        document: doc.into(),
    }))
}

/// Accept an anonymous submission. The required-field policy is checked
/// before anything is written; a failure returns the per-field error map
/// and persists nothing. Submissions are independent immutable records;
/// they never touch the document or its fields.
pub async fn submit_public_form(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    Json(req): Json<PublicFormSubmitRequest>,
) -> Result<Json<SubmitAck>, ApiError> {
    let doc = fetch_public_document(&state.db, &token).await?;

    let config = doc.public_form_config();
    config
        .validate(req.name.as_deref(), req.email.as_deref(), req.phone.as_deref())
        .map_err(ApiError::Validation)?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let field_data_json =
        serde_json::to_string(&req.fields).map_err(|e| ApiError::Internal(e.into()))?;
    let submitter_name = req
        .name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or("Anonymous")
        .to_string();

    sqlx::query(
        r#"
        INSERT INTO public_form_submissions
            (id, document_id, submitter_name, submitter_email, submitter_phone, field_data_json, submitted_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&doc.id)
    .bind(&submitter_name)
    .bind(&req.email)
    .bind(&req.phone)
    .bind(&field_data_json)
    .bind(now.to_rfc3339())
    .execute(&state.db)
    .await?;

    let submission = DbSubmission {
        id,
        document_id: doc.id,
        submitter_name,
        submitter_email: req.email,
        submitter_phone: req.phone,
        field_data_json,
        submitted_at: now,
    };

    Ok(Json(SubmitAck {
        message: "Form submitted successfully".to_string(),
        submission: submission.into(),
    }))
}

/// Owner-only submission listing. This is an authorization check, not an
/// existence check: a form toggled off keeps its history, but a document
/// that was never public has nothing to list and the caller gets
/// `Forbidden`.
pub async fn list_submissions(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(document_id): Path<String>,
) -> Result<Json<Vec<SubmissionResponse>>, ApiError> {
    let doc = fetch_owned_document(&state.db, &user.id, &document_id).await?;

    if !doc.is_public && doc.public_enabled_at.is_none() {
        return Err(ApiError::Forbidden(
            "document has no public form".to_string(),
        ));
    }

    let rows: Vec<DbSubmission> = sqlx::query_as(
        "SELECT * FROM public_form_submissions WHERE document_id = ? ORDER BY submitted_at DESC",
    )
    .bind(&document_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(rows.into_iter().map(Into::into).collect()))
}
