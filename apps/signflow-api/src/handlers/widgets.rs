//! Field catalog: reusable widget definitions

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::models::*;
use crate::state::AppState;

/// The widget types the editor can place, as (value, display) pairs.
pub const WIDGET_TYPES: &[(&str, &str)] = &[
    ("signature", "Signature"),
    ("initials", "Initials"),
    ("date", "Date"),
    ("text", "Text"),
    ("checkbox", "Checkbox"),
    ("stamp", "Stamp"),
];

pub fn is_known_widget_type(widget_type: &str) -> bool {
    WIDGET_TYPES.iter().any(|(value, _)| *value == widget_type)
}

/// Widgets are shared across owners, so listing takes any authenticated
/// caller.
pub async fn list_widgets(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
) -> Result<Json<Vec<WidgetResponse>>, ApiError> {
    let widgets: Vec<DbWidget> = sqlx::query_as("SELECT * FROM widgets ORDER BY name")
        .fetch_all(&state.db)
        .await?;
    Ok(Json(widgets.into_iter().map(Into::into).collect()))
}

pub async fn create_widget(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Json(req): Json<CreateWidgetRequest>,
) -> Result<Json<WidgetResponse>, ApiError> {
    if req.name.trim().is_empty() {
        return Err(ApiError::validation("name", "Name must not be empty."));
    }
    if !is_known_widget_type(&req.widget_type) {
        return Err(ApiError::validation(
            "widget_type",
            format!("Unknown widget type: {}", req.widget_type),
        ));
    }

    let id = Uuid::new_v4().to_string();
    let now = Utc::now();
    let options_json = req
        .options
        .as_ref()
        .map(|o| o.to_string())
        .unwrap_or_else(|| "[]".to_string());

    let inserted = sqlx::query(
        r#"
        INSERT INTO widgets (id, name, widget_type, label, placeholder, required, options_json, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&id)
    .bind(req.name.trim())
    .bind(&req.widget_type)
    .bind(&req.label)
    .bind(&req.placeholder)
    .bind(req.required)
    .bind(&options_json)
    .bind(now.to_rfc3339())
    .bind(now.to_rfc3339())
    .execute(&state.db)
    .await;

    match inserted {
        Ok(_) => {}
        Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => {
            return Err(ApiError::validation(
                "name",
                "A widget with this name already exists.",
            ));
        }
        Err(e) => return Err(e.into()),
    }

    let widget: DbWidget = sqlx::query_as("SELECT * FROM widgets WHERE id = ?")
        .bind(&id)
        .fetch_one(&state.db)
        .await?;
    Ok(Json(widget.into()))
}

/// The static widget-type table for editor pickers.
pub async fn widget_types(_user: AuthUser) -> Json<Vec<[&'static str; 2]>> {
    Json(
        WIDGET_TYPES
            .iter()
            .map(|(value, display)| [*value, *display])
            .collect(),
    )
}

#[derive(Debug, Default, Deserialize)]
pub struct WidgetsByTypeQuery {
    #[serde(rename = "type")]
    pub widget_type: Option<String>,
}

pub async fn widgets_by_type(
    State(state): State<Arc<AppState>>,
    _user: AuthUser,
    Query(query): Query<WidgetsByTypeQuery>,
) -> Result<Json<Vec<WidgetResponse>>, ApiError> {
    let widgets: Vec<DbWidget> = match &query.widget_type {
        Some(widget_type) => {
            sqlx::query_as("SELECT * FROM widgets WHERE widget_type = ? ORDER BY name")
                .bind(widget_type)
                .fetch_all(&state.db)
                .await?
        }
        None => {
            sqlx::query_as("SELECT * FROM widgets ORDER BY name")
                .fetch_all(&state.db)
                .await?
        }
    };
    Ok(Json(widgets.into_iter().map(Into::into).collect()))
}
