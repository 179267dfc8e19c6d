//! Signing Session Manager: token issuance, resolution, completion

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use chrono::{Duration, Utc};
use uuid::Uuid;

use signflow_core::{
    effective_status, generate_token, DocumentStatus, SessionStatus, SESSION_TTL_DAYS,
};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::documents::{fetch_owned_document, transition_document_status};
use crate::models::*;
use crate::state::AppState;

const SESSION_WITH_CONTACT: &str = r#"
    SELECT s.*, c.name AS contact_name, c.email AS contact_email
    FROM signing_sessions s
    JOIN contacts c ON c.id = s.contact_id
"#;

/// Look up a session by token and apply lazy expiry. Unknown and
/// expired tokens are both `NotFound`; a session past its deadline is
/// persisted as expired on this read. Completed sessions come back
/// as-is so a signer revisiting their link sees the finished state.
pub(crate) async fn fetch_live_session(
    db: &sqlx::SqlitePool,
    token: &str,
) -> Result<DbSessionWithContact, ApiError> {
    let sql = format!("{} WHERE s.session_token = ?", SESSION_WITH_CONTACT);
    let row: Option<DbSessionWithContact> = sqlx::query_as(&sql)
        .bind(token)
        .fetch_optional(db)
        .await?;
    let row = row.ok_or_else(|| ApiError::NotFound("Unknown signing token".to_string()))?;

    let stored = SessionStatus::parse(&row.session.status)
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("corrupt status on session {}", row.session.id)))?;
    let now = Utc::now();

    match effective_status(stored, row.session.expires_at, now) {
        SessionStatus::Expired => {
            if stored != SessionStatus::Expired {
                sqlx::query("UPDATE signing_sessions SET status = 'expired', updated_at = ? WHERE id = ?")
                    .bind(now.to_rfc3339())
                    .bind(&row.session.id)
                    .execute(db)
                    .await?;
            }
            Err(ApiError::NotFound("Signing token has expired".to_string()))
        }
        _ => Ok(row),
    }
}

/// Send a document for signing: one fresh-token session per recipient,
/// superseding any live session for the same pair, then a notification
/// per recipient with the outcome reported individually. All recipients
/// must be the owner's contacts or the whole call is rejected before
/// any session is created.
pub async fn send_for_signing(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(document_id): Path<String>,
    Json(req): Json<SendForSigningRequest>,
) -> Result<Json<SendForSigningResponse>, ApiError> {
    if req.recipient_ids.is_empty() {
        return Err(ApiError::validation(
            "recipient_ids",
            "At least one recipient is required.",
        ));
    }

    let doc = fetch_owned_document(&state.db, &user.id, &document_id).await?;

    let mut contacts = Vec::new();
    let mut invalid = Vec::new();
    for id in &req.recipient_ids {
        let contact: Option<DbContact> =
            sqlx::query_as("SELECT * FROM contacts WHERE id = ? AND owner_id = ?")
                .bind(id)
                .bind(&user.id)
                .fetch_optional(&state.db)
                .await?;
        match contact {
            Some(c) => contacts.push(c),
            None => invalid.push(id.clone()),
        }
    }
    if !invalid.is_empty() {
        return Err(ApiError::validation(
            "recipient_ids",
            format!("Unknown recipients: {}", invalid.join(", ")),
        ));
    }

    let now = Utc::now();
    let expires_at = now + Duration::days(SESSION_TTL_DAYS);

    let mut tx = state.db.begin().await?;
    transition_document_status(&mut *tx, &doc, DocumentStatus::InProgress).await?;

    let mut sessions = Vec::new();
    for contact in &contacts {
        // Supersede, never duplicate: a live session for this pair dies here.
        sqlx::query(
            r#"
            DELETE FROM signing_sessions
            WHERE document_id = ? AND contact_id = ? AND status != 'completed'
            "#,
        )
        .bind(&document_id)
        .bind(&contact.id)
        .execute(&mut *tx)
        .await?;

        let session = insert_session(&mut tx, &document_id, &contact.id, now, expires_at).await?;
        sessions.push((contact.clone(), session));
    }

    tx.commit().await?;

    // Delivery happens after commit so a slow notifier never holds the
    // transaction, and one failure never aborts the batch.
    let mut results = Vec::new();
    for (contact, session) in sessions {
        let url = format!(
            "{}/sign/{}",
            state.base_url.trim_end_matches('/'),
            session.session_token
        );
        let subject = format!("Signature requested: {}", doc.title);
        let body = format!(
            "{},\n\nYou have been asked to sign \"{}\".\nOpen your signing link: {}\n\nThis link expires on {}.",
            contact.name,
            doc.title,
            url,
            session.expires_at.format("%Y-%m-%d")
        );

        let delivery = state.notifier.send(&contact.email, &subject, &body).await;
        if let Err(e) = &delivery {
            tracing::warn!("notification to {} failed: {}", contact.email, e);
        }

        results.push(RecipientSendResult {
            recipient_id: contact.id.clone(),
            email: contact.email.clone(),
            delivered: delivery.is_ok(),
            failure_reason: delivery.err().map(|e| e.to_string()),
            session: SessionResponse::from_row(session, SessionStatus::Pending),
        });
    }

    tracing::info!(
        "Sent document {} for signing to {} recipients",
        document_id,
        results.len()
    );

    Ok(Json(SendForSigningResponse {
        document_id,
        results,
    }))
}

/// Insert a pending session, regenerating the token on the (vanishing)
/// chance of a collision. Exhausting retries is a hard conflict.
async fn insert_session(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    document_id: &str,
    contact_id: &str,
    now: chrono::DateTime<Utc>,
    expires_at: chrono::DateTime<Utc>,
) -> Result<DbSession, ApiError> {
    for _ in 0..3 {
        let token = generate_token();
        let id = Uuid::new_v4().to_string();
        let inserted = sqlx::query(
            r#"
            INSERT INTO signing_sessions
                (id, document_id, contact_id, session_token, status, signed_at, expires_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, 'pending', NULL, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(document_id)
        .bind(contact_id)
        .bind(&token)
        .bind(expires_at.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&mut **tx)
        .await;

        match inserted {
            Ok(_) => {
                return Ok(DbSession {
                    id,
                    document_id: document_id.to_string(),
                    contact_id: contact_id.to_string(),
                    session_token: token,
                    status: "pending".to_string(),
                    signed_at: None,
                    expires_at,
                    created_at: now,
                    updated_at: now,
                })
            }
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
                tracing::warn!("session token collision, regenerating");
                continue;
            }
            Err(e) => return Err(e.into()),
        }
    }
    Err(ApiError::Conflict(
        "could not allocate a unique session token".to_string(),
    ))
}

/// Resolve a signing token. First resolution moves the session
/// `pending -> in_progress`.
pub async fn resolve_session(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let row = fetch_live_session(&state.db, &token).await?;
    let stored = SessionStatus::parse(&row.session.status).unwrap_or(SessionStatus::Pending);

    let status = if stored == SessionStatus::Pending {
        sqlx::query("UPDATE signing_sessions SET status = 'in_progress', updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(&row.session.id)
            .execute(&state.db)
            .await?;
        SessionStatus::InProgress
    } else {
        stored
    };

    Ok(Json(SessionResponse::from_joined(row, status)))
}

/// The fields on the session's document assigned to the session's
/// recipient, with contact details joined at read time.
pub async fn session_fields(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<Vec<FieldResponse>>, ApiError> {
    let row = fetch_live_session(&state.db, &token).await?;

    let rows: Vec<DbFieldWithContact> = sqlx::query_as(
        r#"
        SELECT f.*, c.name AS recipient_name, c.email AS recipient_email
        FROM document_fields f
        LEFT JOIN contacts c ON c.id = f.recipient_id
        WHERE f.document_id = ? AND f.recipient_id = ?
        ORDER BY f.page, f.created_at, f.id
        "#,
    )
    .bind(&row.session.document_id)
    .bind(&row.session.contact_id)
    .fetch_all(&state.db)
    .await?;

    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// Complete a session once every required assigned field is filled.
/// Sets `signed_at`; the document's own status is then re-evaluated
/// from the full session set.
pub async fn complete_session(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
) -> Result<Json<SessionResponse>, ApiError> {
    let row = fetch_live_session(&state.db, &token).await?;
    let stored = SessionStatus::parse(&row.session.status).unwrap_or(SessionStatus::Pending);
    if stored == SessionStatus::Completed {
        return Err(ApiError::Conflict("session already completed".to_string()));
    }

    let incomplete: Vec<(String,)> = sqlx::query_as(
        r#"
        SELECT id FROM document_fields
        WHERE document_id = ? AND recipient_id = ? AND required = 1 AND is_completed = 0
        "#,
    )
    .bind(&row.session.document_id)
    .bind(&row.session.contact_id)
    .fetch_all(&state.db)
    .await?;
    if !incomplete.is_empty() {
        let ids: Vec<String> = incomplete.into_iter().map(|(id,)| id).collect();
        return Err(ApiError::validation(
            "fields",
            format!("Required fields not completed: {}", ids.join(", ")),
        ));
    }

    let now = Utc::now();
    let mut tx = state.db.begin().await?;
    sqlx::query(
        r#"
        UPDATE signing_sessions
        SET status = 'completed', signed_at = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .bind(&row.session.id)
    .execute(&mut *tx)
    .await?;

    // Document completion is derived from the whole session set, not
    // assumed from this one signature.
    let (open,): (i64,) = sqlx::query_as(
        "SELECT COUNT(*) FROM signing_sessions WHERE document_id = ? AND status != 'completed'",
    )
    .bind(&row.session.document_id)
    .fetch_one(&mut *tx)
    .await?;

    if open == 0 {
        let doc: Option<DbDocument> = sqlx::query_as("SELECT * FROM documents WHERE id = ?")
            .bind(&row.session.document_id)
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(doc) = doc {
            transition_document_status(&mut *tx, &doc, DocumentStatus::Completed).await?;
        }
    }

    tx.commit().await?;

    tracing::info!(
        "Session {} completed for document {}",
        row.session.id,
        row.session.document_id
    );

    let mut session = row.session;
    session.status = "completed".to_string();
    session.signed_at = Some(now);
    let mut resp = SessionResponse::from_row(session, SessionStatus::Completed);
    resp.contact_name = Some(row.contact_name);
    resp.contact_email = Some(row.contact_email);
    Ok(Json(resp))
}
