//! Recipient directory: per-owner contact CRUD and search

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::*;
use crate::state::AppState;

async fn fetch_owned_contact(
    db: &sqlx::SqlitePool,
    owner_id: &str,
    contact_id: &str,
) -> Result<DbContact, ApiError> {
    let contact: Option<DbContact> = sqlx::query_as("SELECT * FROM contacts WHERE id = ?")
        .bind(contact_id)
        .fetch_optional(db)
        .await?;
    let contact =
        contact.ok_or_else(|| ApiError::NotFound(format!("Contact not found: {}", contact_id)))?;
    if contact.owner_id != owner_id {
        return Err(ApiError::Forbidden("not the contact owner".to_string()));
    }
    Ok(contact)
}

fn validate_contact_email(email: &str) -> Result<(), ApiError> {
    if email.trim().is_empty() || !email.contains('@') {
        return Err(ApiError::validation("email", "Enter a valid email address."));
    }
    Ok(())
}

pub async fn list_contacts(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<ContactResponse>>, ApiError> {
    let contacts: Vec<DbContact> =
        sqlx::query_as("SELECT * FROM contacts WHERE owner_id = ? ORDER BY name")
            .bind(&user.id)
            .fetch_all(&state.db)
            .await?;
    Ok(Json(contacts.into_iter().map(Into::into).collect()))
}

pub async fn create_contact(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Json(req): Json<CreateContactRequest>,
) -> Result<Json<ContactResponse>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::validation("name", "Name must not be empty."));
    }
    validate_contact_email(&req.email)?;

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let inserted = sqlx::query(
        r#"
        INSERT INTO contacts (id, owner_id, name, email, phone, company, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(&user.id)
    .bind(req.name.trim())
    .bind(&req.email)
    .bind(&req.phone)
    .bind(&req.company)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(&state.db)
    .await;

    match inserted {
        Ok(_) => {}
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            return Err(ApiError::validation(
                "email",
                "A contact with this email already exists.",
            ));
        }
        Err(e) => return Err(e.into()),
    }

    let contact = fetch_owned_contact(&state.db, &user.id, &id).await?;
    Ok(Json(contact.into()))
}

pub async fn update_contact(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateContactRequest>,
) -> Result<Json<ContactResponse>, ApiError> {
    let contact = fetch_owned_contact(&state.db, &user.id, &id).await?;

    let name = match &req.name {
        Some(n) if n.trim().is_empty() => {
            return Err(ApiError::validation("name", "Name must not be empty."))
        }
        Some(n) => n.trim().to_string(),
        None => contact.name.clone(),
    };
    let email = match &req.email {
        Some(e) => {
            validate_contact_email(e)?;
            e.clone()
        }
        None => contact.email.clone(),
    };
    let phone = req.phone.clone().or_else(|| contact.phone.clone());
    let company = req.company.clone().or_else(|| contact.company.clone());

    let updated = sqlx::query(
        r#"
        UPDATE contacts SET name = ?, email = ?, phone = ?, company = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&name)
    .bind(&email)
    .bind(&phone)
    .bind(&company)
    .bind(Utc::now().to_rfc3339())
    .bind(&id)
    .execute(&state.db)
    .await;

    match updated {
        Ok(_) => {}
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            return Err(ApiError::validation(
                "email",
                "A contact with this email already exists.",
            ));
        }
        Err(e) => return Err(e.into()),
    }

    let contact = fetch_owned_contact(&state.db, &user.id, &id).await?;
    Ok(Json(contact.into()))
}

/// Delete a contact unless a field or session still references it.
/// A referenced contact is a hard conflict; no dangling recipients.
pub async fn delete_contact(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>, ApiError> {
    fetch_owned_contact(&state.db, &user.id, &id).await?;

    let (field_refs,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM document_fields WHERE recipient_id = ?")
            .bind(&id)
            .fetch_one(&state.db)
            .await?;
    let (session_refs,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM signing_sessions WHERE contact_id = ?")
            .bind(&id)
            .fetch_one(&state.db)
            .await?;
    if field_refs > 0 || session_refs > 0 {
        return Err(ApiError::Conflict(format!(
            "contact is referenced by {} field(s) and {} session(s)",
            field_refs, session_refs
        )));
    }

    let mut tx = state.db.begin().await?;
    sqlx::query("DELETE FROM document_signers WHERE contact_id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    sqlx::query("DELETE FROM contacts WHERE id = ?")
        .bind(&id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(Json(MessageResponse {
        message: "Contact deleted successfully".to_string(),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct ContactSearchQuery {
    #[serde(default)]
    pub q: String,
}

/// Substring search over name and email.
pub async fn search_contacts(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    Query(query): Query<ContactSearchQuery>,
) -> Result<Json<Vec<ContactResponse>>, ApiError> {
    let contacts: Vec<DbContact> = if query.q.is_empty() {
        sqlx::query_as("SELECT * FROM contacts WHERE owner_id = ? ORDER BY name")
            .bind(&user.id)
            .fetch_all(&state.db)
            .await?
    } else {
        let pattern = format!("%{}%", query.q);
        sqlx::query_as(
            r#"
            SELECT * FROM contacts
            WHERE owner_id = ? AND (name LIKE ? OR email LIKE ?)
            ORDER BY name
            "#,
        )
        .bind(&user.id)
        .bind(&pattern)
        .bind(&pattern)
        .fetch_all(&state.db)
        .await?
    };

    Ok(Json(contacts.into_iter().map(Into::into).collect()))
}
