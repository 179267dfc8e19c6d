//! Saved signature library: reusable signature images kept per owner

use axum::{
    extract::{Path, State},
    Json,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::*;
use crate::state::AppState;

async fn fetch_owned_signature(
    db: &sqlx::SqlitePool,
    owner_id: &str,
    signature_id: &str,
) -> Result<DbSavedSignature, ApiError> {
    let sig: Option<DbSavedSignature> =
        sqlx::query_as("SELECT * FROM saved_signatures WHERE id = ?")
            .bind(signature_id)
            .fetch_optional(db)
            .await?;

    let sig =
        sig.ok_or_else(|| ApiError::NotFound(format!("Signature not found: {}", signature_id)))?;
    if sig.owner_id != owner_id {
        return Err(ApiError::Forbidden("not the signature owner".to_string()));
    }
    Ok(sig)
}

pub async fn list_signatures(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<SavedSignatureListResponse>, ApiError> {
    let rows: Vec<DbSavedSignature> = sqlx::query_as(
        "SELECT * FROM saved_signatures WHERE owner_id = ? ORDER BY created_at DESC",
    )
    .bind(&user.id)
    .fetch_all(&state.db)
    .await?;

    let count = rows.len();
    Ok(Json(SavedSignatureListResponse {
        results: rows.into_iter().map(Into::into).collect(),
        count,
    }))
}

/// Store a signature image and register it in the caller's library.
pub async fn create_signature(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateSignatureRequest>,
) -> Result<Json<SavedSignatureResponse>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::validation("name", "Name must not be empty."));
    }
    let bytes = BASE64
        .decode(&req.image_base64)
        .map_err(|e| ApiError::validation("image_base64", format!("Invalid base64: {}", e)))?;
    if bytes.is_empty() {
        return Err(ApiError::validation("image_base64", "Image must not be empty."));
    }

    let id = Uuid::new_v4().to_string();
    let image_path = format!("signatures/{}/{}.png", user.id, id);
    let image_url = state
        .files
        .store(&bytes, &image_path)
        .await
        .map_err(|e| ApiError::Upstream(format!("file store: {}", e)))?;

    sqlx::query(
        r#"
        INSERT INTO saved_signatures
            (id, owner_id, name, signature_type, image_path, image_url, font, color, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&user.id)
    .bind(req.name.trim())
    .bind(&req.signature_type)
    .bind(&image_path)
    .bind(&image_url)
    .bind(&req.font)
    .bind(&req.color)
    .bind(Utc::now().to_rfc3339())
    .execute(&state.db)
    .await?;

    let sig = fetch_owned_signature(&state.db, &user.id, &id).await?;
    Ok(Json(sig.into()))
}

/// Remove a signature from the library. The stored image goes first;
/// a storage failure is logged and swallowed so the row always goes.
pub async fn delete_signature(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    let sig = fetch_owned_signature(&state.db, &user.id, &id).await?;

    if let Err(e) = state.files.delete(&sig.image_path).await {
        tracing::warn!("failed to delete image {} for signature {}: {}", sig.image_path, id, e);
    }

    sqlx::query("DELETE FROM saved_signatures WHERE id = ?")
        .bind(&id)
        .execute(&state.db)
        .await?;

    Ok(Json(MessageResponse {
        message: "Signature deleted successfully".to_string(),
    }))
}
