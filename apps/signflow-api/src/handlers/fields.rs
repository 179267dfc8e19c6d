//! Field Completion Engine: layout replacement and value updates

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use uuid::Uuid;

use signflow_core::{
    derive_completed, derived_widget_name, validate_placement, FieldRecipient, Scenario,
};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::documents::fetch_owned_document;
use crate::handlers::sessions::fetch_live_session;
use crate::models::*;
use crate::state::AppState;

const FIELD_WITH_CONTACT: &str = r#"
    SELECT f.*, c.name AS recipient_name, c.email AS recipient_email
    FROM document_fields f
    LEFT JOIN contacts c ON c.id = f.recipient_id
"#;

async fn fetch_field_joined(
    db: &sqlx::SqlitePool,
    document_id: &str,
    field_id: &str,
) -> Result<Option<DbFieldWithContact>, ApiError> {
    let sql = format!("{} WHERE f.id = ? AND f.document_id = ?", FIELD_WITH_CONTACT);
    let row = sqlx::query_as::<_, DbFieldWithContact>(&sql)
        .bind(field_id)
        .bind(document_id)
        .fetch_optional(db)
        .await?;
    Ok(row)
}

/// Either the document owner or the bearer of a live session token on
/// the same document may touch field values.
async fn authorize_field_access(
    state: &AppState,
    document_id: &str,
    user: Option<&AuthUser>,
    token: Option<&str>,
) -> Result<(), ApiError> {
    if let Some(user) = user {
        fetch_owned_document(&state.db, &user.id, document_id).await?;
        return Ok(());
    }
    if let Some(token) = token {
        let session = fetch_live_session(&state.db, token).await?;
        if session.session.document_id != document_id {
            return Err(ApiError::Forbidden(
                "session token is for a different document".to_string(),
            ));
        }
        return Ok(());
    }
    Err(ApiError::Forbidden(
        "authentication or session token required".to_string(),
    ))
}

/// Resolve a catalog entry for a placed field, creating it on first
/// sight. Keyed by a name derived from type+label so repeated layout
/// saves are idempotent.
async fn upsert_widget(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    input: &FieldInput,
) -> Result<String, ApiError> {
    let name = derived_widget_name(&input.field_type, &input.label);
    let existing: Option<(String,)> = sqlx::query_as("SELECT id FROM widgets WHERE name = ?")
        .bind(&name)
        .fetch_optional(&mut **tx)
        .await?;
    if let Some((id,)) = existing {
        return Ok(id);
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO widgets (id, name, widget_type, label, placeholder, required, options_json, created_at, updated_at)
        VALUES (?, ?, ?, ?, NULL, ?, '[]', ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&name)
    .bind(&input.field_type)
    .bind(&input.label)
    .bind(input.required)
    .bind(&now)
    .bind(&now)
    .execute(&mut **tx)
    .await?;
    Ok(id)
}

/// Replace the document's entire field set with the supplied per-page
/// layout. Atomic: the old set and the new set never coexist, and a
/// validation failure on any field leaves the previous layout intact.
/// Serialized per document via an advisory lock.
pub async fn save_layout(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(document_id): Path<String>,
    Json(req): Json<SaveLayoutRequest>,
) -> Result<Json<Vec<FieldResponse>>, ApiError> {
    let doc = fetch_owned_document(&state.db, &user.id, &document_id).await?;
    let scenario = Scenario::parse(&doc.scenario)
        .ok_or_else(|| ApiError::Internal(anyhow::anyhow!("corrupt scenario on {}", doc.id)))?;

    let lock = state.layout_lock(&document_id);
    let _guard = lock.lock().await;

    let mut tx = state.db.begin().await?;

    sqlx::query("DELETE FROM document_fields WHERE document_id = ?")
        .bind(&document_id)
        .execute(&mut *tx)
        .await?;

    let now = Utc::now();
    let mut created_ids = Vec::new();

    for page in &req.pages {
        for input in &page.fields {
            if let Err((attr, msg)) = validate_placement(page.page, input.width, input.height) {
                return Err(ApiError::validation(attr, msg));
            }

            let recipient = input.recipient.clone().unwrap_or(FieldRecipient::Owner);
            if !recipient.valid_for(scenario) {
                return Err(ApiError::validation(
                    "recipient",
                    format!("scenario '{}' does not take assigned recipients", scenario),
                ));
            }
            if let FieldRecipient::Contact(contact_id) = &recipient {
                let known: Option<(String,)> =
                    sqlx::query_as("SELECT id FROM contacts WHERE id = ? AND owner_id = ?")
                        .bind(contact_id)
                        .bind(&user.id)
                        .fetch_optional(&mut *tx)
                        .await?;
                if known.is_none() {
                    return Err(ApiError::validation(
                        "recipient",
                        format!("Unknown recipient: {}", contact_id),
                    ));
                }
            }

            let widget_id = upsert_widget(&mut tx, input).await?;
            let is_completed = derive_completed(
                input.value.as_deref(),
                input.signature_data.as_deref(),
                false,
            );
            let metadata_json = input
                .metadata
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "{}".to_string());

            let id = Uuid::new_v4().to_string();
            sqlx::query(
                r#"
                INSERT INTO document_fields (
                    id, document_id, widget_id, field_type, label, page,
                    x, y, width, height, scale, is_stamp, signature_type,
                    required, recipient_id, value, signature_data,
                    completion_forced, is_completed, metadata_json,
                    created_at, updated_at
                )
                VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0, ?, ?, ?, ?)
                "#,
            )
            .bind(&id)
            .bind(&document_id)
            .bind(&widget_id)
            .bind(&input.field_type)
            .bind(&input.label)
            .bind(page.page)
            .bind(input.x)
            .bind(input.y)
            .bind(input.width)
            .bind(input.height)
            .bind(input.scale)
            .bind(input.is_stamp)
            .bind(&input.signature_type)
            .bind(input.required)
            .bind(recipient.contact_id())
            .bind(&input.value)
            .bind(&input.signature_data)
            .bind(is_completed)
            .bind(&metadata_json)
            .bind(now.to_rfc3339())
            .bind(now.to_rfc3339())
            .execute(&mut *tx)
            .await?;

            created_ids.push(id);
        }
    }

    tx.commit().await?;

    tracing::info!(
        "Replaced layout for document {}: {} fields",
        document_id,
        created_ids.len()
    );

    let sql = format!(
        "{} WHERE f.document_id = ? ORDER BY f.page, f.created_at, f.id",
        FIELD_WITH_CONTACT
    );
    let rows = sqlx::query_as::<_, DbFieldWithContact>(&sql)
        .bind(&document_id)
        .fetch_all(&state.db)
        .await?;

    Ok(Json(rows.into_iter().map(Into::into).collect()))
}

/// Fields grouped by page, with each recipient's directory entry joined
/// at read time.
pub async fn list_fields(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(document_id): Path<String>,
) -> Result<Json<Vec<PageFieldsResponse>>, ApiError> {
    fetch_owned_document(&state.db, &user.id, &document_id).await?;

    let sql = format!(
        "{} WHERE f.document_id = ? ORDER BY f.page, f.created_at, f.id",
        FIELD_WITH_CONTACT
    );
    let rows = sqlx::query_as::<_, DbFieldWithContact>(&sql)
        .bind(&document_id)
        .fetch_all(&state.db)
        .await?;

    let mut pages: BTreeMap<i64, Vec<FieldResponse>> = BTreeMap::new();
    for row in rows {
        pages
            .entry(row.field.page)
            .or_default()
            .push(row.into());
    }

    Ok(Json(
        pages
            .into_iter()
            .map(|(page, fields)| PageFieldsResponse { page, fields })
            .collect(),
    ))
}

async fn apply_value_update(
    state: &AppState,
    document_id: &str,
    req: &UpdateFieldValueRequest,
    existing: &DbFieldWithContact,
) -> Result<FieldValueAck, ApiError> {
    let is_completed = derive_completed(
        req.value.as_deref(),
        req.signature_data.as_deref(),
        existing.field.completion_forced,
    );

    sqlx::query(
        r#"
        UPDATE document_fields
        SET value = ?, signature_data = ?, is_completed = ?, updated_at = ?
        WHERE id = ? AND document_id = ?
        "#,
    )
    .bind(&req.value)
    .bind(&req.signature_data)
    .bind(is_completed)
    .bind(Utc::now().to_rfc3339())
    .bind(&req.field_id)
    .bind(document_id)
    .execute(&state.db)
    .await?;

    Ok(FieldValueAck {
        field_id: req.field_id.clone(),
        value: req.value.clone(),
        signature_data: req.signature_data.clone(),
        is_completed,
        persisted: true,
    })
}

/// Overwrite a field's value/signature and recompute completion.
/// `NotFound` when the field is not on this document.
pub async fn update_field_value(
    State(state): State<Arc<AppState>>,
    user: Option<AuthUser>,
    Path(document_id): Path<String>,
    Query(tq): Query<TokenQuery>,
    Json(req): Json<UpdateFieldValueRequest>,
) -> Result<Json<FieldValueAck>, ApiError> {
    authorize_field_access(&state, &document_id, user.as_ref(), tq.token.as_deref()).await?;

    let existing = fetch_field_joined(&state.db, &document_id, &req.field_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Field not found: {}", req.field_id)))?;

    let ack = apply_value_update(&state, &document_id, &req, &existing).await?;
    Ok(Json(ack))
}

/// Same as [`update_field_value`], but a missing field is a soft no-op:
/// the attempted value is echoed back unpersisted. Clients use this for
/// optimistic edits before the layout has been saved.
pub async fn update_field_value_or_create(
    State(state): State<Arc<AppState>>,
    user: Option<AuthUser>,
    Path(document_id): Path<String>,
    Query(tq): Query<TokenQuery>,
    Json(req): Json<UpdateFieldValueRequest>,
) -> Result<Json<FieldValueAck>, ApiError> {
    authorize_field_access(&state, &document_id, user.as_ref(), tq.token.as_deref()).await?;

    match fetch_field_joined(&state.db, &document_id, &req.field_id).await? {
        Some(existing) => {
            let ack = apply_value_update(&state, &document_id, &req, &existing).await?;
            Ok(Json(ack))
        }
        None => Ok(Json(FieldValueAck {
            field_id: req.field_id.clone(),
            value: req.value.clone(),
            signature_data: req.signature_data.clone(),
            is_completed: derive_completed(req.value.as_deref(), req.signature_data.as_deref(), false),
            persisted: false,
        })),
    }
}

/// Force-complete a field regardless of value presence. Used for
/// checkboxes, stamps, and other non-data fields.
pub async fn mark_complete(
    State(state): State<Arc<AppState>>,
    user: Option<AuthUser>,
    Path((document_id, field_id)): Path<(String, String)>,
    Query(tq): Query<TokenQuery>,
) -> Result<Json<FieldResponse>, ApiError> {
    authorize_field_access(&state, &document_id, user.as_ref(), tq.token.as_deref()).await?;

    let updated = sqlx::query(
        r#"
        UPDATE document_fields
        SET completion_forced = 1, is_completed = 1, updated_at = ?
        WHERE id = ? AND document_id = ?
        "#,
    )
    .bind(Utc::now().to_rfc3339())
    .bind(&field_id)
    .bind(&document_id)
    .execute(&state.db)
    .await?;

    if updated.rows_affected() == 0 {
        return Err(ApiError::NotFound(format!("Field not found: {}", field_id)));
    }

    let row = fetch_field_joined(&state.db, &document_id, &field_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Field not found: {}", field_id)))?;
    Ok(Json(row.into()))
}
