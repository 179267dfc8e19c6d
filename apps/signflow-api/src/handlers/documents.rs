//! Document aggregate: create, read, update, delete, list

use axum::{
    extract::{Path, Query, State},
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use signflow_core::{DocumentStatus, Scenario};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::*;
use crate::state::AppState;

/// Fetch a document and enforce ownership. Unknown id is `NotFound`;
/// someone else's document is `Forbidden`.
pub(crate) async fn fetch_owned_document(
    db: &sqlx::SqlitePool,
    owner_id: &str,
    document_id: &str,
) -> Result<DbDocument, ApiError> {
    let doc: Option<DbDocument> = sqlx::query_as("SELECT * FROM documents WHERE id = ?")
        .bind(document_id)
        .fetch_optional(db)
        .await?;

    let doc = doc.ok_or_else(|| ApiError::NotFound(format!("Document not found: {}", document_id)))?;
    if doc.owner_id != owner_id {
        return Err(ApiError::Forbidden("not the document owner".to_string()));
    }
    Ok(doc)
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| *c != '/' && *c != '\\')
        .collect();
    if cleaned.is_empty() {
        "document.bin".to_string()
    } else {
        cleaned
    }
}

/// Upsert a directory contact from a lightweight (email, name, phone)
/// tuple and return its id.
async fn upsert_contact(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    owner_id: &str,
    input: &RecipientInput,
) -> Result<String, ApiError> {
    let existing: Option<(String,)> =
        sqlx::query_as("SELECT id FROM contacts WHERE owner_id = ? AND email = ?")
            .bind(owner_id)
            .bind(&input.email)
            .fetch_optional(&mut **tx)
            .await?;

    if let Some((id,)) = existing {
        return Ok(id);
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    sqlx::query(
        r#"
        INSERT INTO contacts (id, owner_id, name, email, phone, company, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, NULL, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(owner_id)
    .bind(&input.name)
    .bind(&input.email)
    .bind(&input.phone)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(&mut **tx)
    .await?;

    Ok(id)
}

/// Create a document: store the file, apply scenario defaults to the
/// signing config, upsert signer/bcc contacts, optionally attach to a
/// folder (lookup failure is ignored, matching the editor's relaxed
/// folder semantics).
pub async fn create_document(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateDocumentRequest>,
) -> Result<Json<DocumentResponse>, ApiError> {
    if req.title.trim().is_empty() {
        return Err(ApiError::validation("title", "Title must not be empty."));
    }
    let scenario = Scenario::parse(&req.scenario)
        .ok_or_else(|| ApiError::validation("scenario", format!("Unknown scenario: {}", req.scenario)))?;
    let bytes = BASE64
        .decode(&req.file_base64)
        .map_err(|e| ApiError::validation("file_base64", format!("Invalid base64: {}", e)))?;

    let config = req.config.normalized_for(scenario);

    let id = Uuid::new_v4().to_string();
    let file_path = format!(
        "documents/{}/{}_{}",
        user.id,
        id,
        sanitize_file_name(&req.file_name)
    );
    let file_url = state
        .files
        .store(&bytes, &file_path)
        .await
        .map_err(|e| ApiError::Upstream(format!("file store: {}", e)))?;

    let now = Utc::now();
    let mut tx = state.db.begin().await?;

    // Folder attach is best-effort: an unknown or foreign folder id is
    // dropped, not surfaced.
    let folder_id = match &req.folder_id {
        Some(fid) => {
            let found: Option<(String,)> =
                sqlx::query_as("SELECT id FROM documents WHERE id = ? AND owner_id = ?")
                    .bind(fid)
                    .bind(&user.id)
                    .fetch_optional(&mut *tx)
                    .await?;
            if found.is_none() {
                tracing::debug!("ignoring unknown folder {} for document {}", fid, id);
            }
            found.map(|(id,)| id)
        }
        None => None,
    };

    sqlx::query(
        r#"
        INSERT INTO documents (
            id, owner_id, title, note, scenario, status, file_path, file_url,
            send_in_order, automatic_reminders, reminder_interval_days,
            completion_deadline_days, allow_field_changes, require_otp,
            notify_on_signature, is_public, public_token,
            public_form_config_json, public_enabled_at, folder_id,
            created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, 'pending', ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, NULL, NULL, NULL, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&user.id)
    .bind(req.title.trim())
    .bind(&req.note)
    .bind(scenario.as_str())
    .bind(&file_path)
    .bind(&file_url)
    .bind(config.send_in_order)
    .bind(config.automatic_reminders)
    .bind(config.reminder_interval_days)
    .bind(config.completion_deadline_days)
    .bind(config.allow_field_changes)
    .bind(config.require_otp)
    .bind(config.notify_on_signature)
    .bind(&folder_id)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(&mut *tx)
    .await?;

    for (inputs, role) in [(&req.signers, "signer"), (&req.bcc, "bcc")] {
        for input in inputs.iter() {
            let contact_id = upsert_contact(&mut tx, &user.id, input).await?;
            sqlx::query(
                r#"
                INSERT INTO document_signers (document_id, contact_id, role)
                VALUES (?, ?, ?)
                ON CONFLICT DO NOTHING
                "#,
            )
            .bind(&id)
            .bind(&contact_id)
            .bind(role)
            .execute(&mut *tx)
            .await?;
        }
    }

    tx.commit().await?;

    tracing::info!("Created document {} (scenario={})", id, scenario);

    let doc = fetch_owned_document(&state.db, &user.id, &id).await?;
    Ok(Json(doc.into()))
}

/// List the caller's documents, filtered by status, title substring, or
/// the "needs my signature" view (documents where the caller is a signer
/// with an open session).
pub async fn list_documents(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<ListDocumentsQuery>,
) -> Result<Json<Vec<DocumentResponse>>, ApiError> {
    if query.needs_my_signature.unwrap_or(false) {
        let email = user.email.clone().ok_or_else(|| {
            ApiError::validation("needs_my_signature", "Caller identity has no email.")
        })?;
        let docs: Vec<DbDocument> = sqlx::query_as(
            r#"
            SELECT DISTINCT d.*
            FROM documents d
            JOIN signing_sessions s ON s.document_id = d.id
            JOIN contacts c ON c.id = s.contact_id
            WHERE c.email = ?
              AND s.status != 'completed'
              AND d.status != 'completed'
            ORDER BY d.updated_at DESC
            "#,
        )
        .bind(&email)
        .fetch_all(&state.db)
        .await?;
        return Ok(Json(docs.into_iter().map(Into::into).collect()));
    }

    let mut sql = String::from("SELECT * FROM documents WHERE owner_id = ?");
    if query.status.is_some() {
        sql.push_str(" AND status = ?");
    }
    if query.title.is_some() {
        sql.push_str(" AND title LIKE ?");
    }
    sql.push_str(" ORDER BY updated_at DESC");

    let mut q = sqlx::query_as::<_, DbDocument>(&sql).bind(&user.id);
    if let Some(status) = &query.status {
        q = q.bind(status);
    }
    if let Some(title) = &query.title {
        q = q.bind(format!("%{}%", title));
    }

    let docs = q.fetch_all(&state.db).await?;
    Ok(Json(docs.into_iter().map(Into::into).collect()))
}

pub async fn get_document(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let doc = fetch_owned_document(&state.db, &user.id, &id).await?;
    Ok(Json(doc.into()))
}

/// Walk the folder chain upward from `start`; true if `needle` appears.
/// Guards folder moves against cycles.
async fn is_self_or_descendant(
    db: &sqlx::SqlitePool,
    start: &str,
    needle: &str,
) -> Result<bool, ApiError> {
    let mut current = Some(start.to_string());
    // A folder chain longer than this is already broken.
    let mut hops = 0;
    while let Some(id) = current {
        if id == needle {
            return Ok(true);
        }
        hops += 1;
        if hops > 64 {
            return Ok(true);
        }
        let parent: Option<(Option<String>,)> =
            sqlx::query_as("SELECT folder_id FROM documents WHERE id = ?")
                .bind(&id)
                .fetch_optional(db)
                .await?;
        current = parent.and_then(|(p,)| p);
    }
    Ok(false)
}

/// Update title, note, signing config, or folder. Status is never
/// client-writable; folder moves must land on a non-descendant.
pub async fn update_document(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateDocumentRequest>,
) -> Result<Json<DocumentResponse>, ApiError> {
    let doc = fetch_owned_document(&state.db, &user.id, &id).await?;
    let scenario = Scenario::parse(&doc.scenario)
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("corrupt scenario on {}", doc.id)))?;

    let title = match &req.title {
        Some(t) if t.trim().is_empty() => {
            return Err(ApiError::validation("title", "Title must not be empty."))
        }
        Some(t) => t.trim().to_string(),
        None => doc.title.clone(),
    };
    let note = match req.note {
        None => doc.note.clone(),
        Some(None) => None,
        Some(Some(n)) => Some(n),
    };

    let config = match req.config {
        Some(cfg) => cfg.normalized_for(scenario),
        None => doc.signing_config(),
    };

    let folder_id = match req.folder_id {
        None => doc.folder_id.clone(),
        Some(None) => None,
        Some(Some(target)) => {
            let found: Option<(String,)> =
                sqlx::query_as("SELECT id FROM documents WHERE id = ? AND owner_id = ?")
                    .bind(&target)
                    .bind(&user.id)
                    .fetch_optional(&state.db)
                    .await?;
            match found {
                None => {
                    tracing::debug!("ignoring unknown folder {} for document {}", target, id);
                    doc.folder_id.clone()
                }
                Some((target,)) => {
                    if is_self_or_descendant(&state.db, &target, &doc.id).await? {
                        return Err(ApiError::validation(
                            "folder_id",
                            "Moving here would create a folder cycle.",
                        ));
                    }
                    Some(target)
                }
            }
        }
    };

    sqlx::query(
        r#"
        UPDATE documents
        SET title = ?, note = ?, send_in_order = ?, automatic_reminders = ?,
            reminder_interval_days = ?, completion_deadline_days = ?,
            allow_field_changes = ?, require_otp = ?, notify_on_signature = ?,
            folder_id = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&title)
    .bind(&note)
    .bind(config.send_in_order)
    .bind(config.automatic_reminders)
    .bind(config.reminder_interval_days)
    .bind(config.completion_deadline_days)
    .bind(config.allow_field_changes)
    .bind(config.require_otp)
    .bind(config.notify_on_signature)
    .bind(&folder_id)
    .bind(Utc::now().to_rfc3339())
    .bind(&id)
    .execute(&state.db)
    .await?;

    let doc = fetch_owned_document(&state.db, &user.id, &id).await?;
    Ok(Json(doc.into()))
}

/// Delete a document and everything under it. The backing file is
/// removed first; a storage failure is logged and swallowed unless
/// STRICT_FILE_DELETE is set. Fields, sessions, signer links, and
/// submissions go in one transaction.
pub async fn delete_document(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let doc = fetch_owned_document(&state.db, &user.id, &id).await?;

    if let Err(e) = state.files.delete(&doc.file_path).await {
        if state.strict_file_delete {
            return Err(ApiError::Upstream(format!("file delete: {}", e)));
        }
        tracing::warn!("failed to delete file {} for document {}: {}", doc.file_path, id, e);
    }

    let mut tx = state.db.begin().await?;
    for table in [
        "document_fields",
        "signing_sessions",
        "document_signers",
        "public_form_submissions",
    ] {
        sqlx::query(&format!("DELETE FROM {} WHERE document_id = ?", table))
            .bind(&id)
            .execute(&mut *tx)
            .await?;
    }
    // Documents filed under this one become top-level, not orphans.
    sqlx::query("UPDATE documents SET folder_id = NULL WHERE folder_id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM documents WHERE id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    state.forget_layout_lock(&id);
    tracing::info!("Deleted document {}", id);

    Ok(Json(MessageResponse {
        message: "Document deleted successfully".to_string(),
    }))
}

/// Move a document between statuses on behalf of workflow operations.
/// Transitions are monotonic; anything else is a conflict.
pub(crate) async fn transition_document_status(
    executor: impl sqlx::Executor<'_, Database = sqlx::Sqlite>,
    doc: &DbDocument,
    to: DocumentStatus,
) -> Result<(), ApiError> {
    let from = DocumentStatus::parse(&doc.status)
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("corrupt status on {}", doc.id)))?;
    if from == to {
        return Ok(());
    }
    if !from.can_transition(to) {
        return Err(ApiError::Conflict(format!(
            "document {} cannot move from {} to {}",
            doc.id, from, to
        )));
    }
    sqlx::query("UPDATE documents SET status = ?, updated_at = ? WHERE id = ?")
        .bind(to.as_str())
        .bind(Utc::now().to_rfc3339())
        .bind(&doc.id)
        .execute(executor)
        .await?;
    Ok(())
}
