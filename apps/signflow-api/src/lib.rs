//! SignFlow API library
//!
//! The server binary is a thin wrapper around [`router`]; integration
//! tests build an [`state::AppState`] over an in-memory database and
//! drive the same handlers.

use std::sync::Arc;

use axum::{
    routing::{delete, get, patch, post},
    Router,
};

pub mod auth;
pub mod error;
pub mod handlers;
pub mod models;
pub mod notifier;
pub mod state;
pub mod storage;

use state::AppState;

/// Build the full SignFlow route table over shared state.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(handlers::health))
        // Document aggregate
        .route(
            "/api/documents",
            post(handlers::documents::create_document).get(handlers::documents::list_documents),
        )
        .route(
            "/api/documents/:id",
            get(handlers::documents::get_document)
                .patch(handlers::documents::update_document)
                .delete(handlers::documents::delete_document),
        )
        // Signing sessions
        .route(
            "/api/documents/:id/send-for-signing",
            post(handlers::sessions::send_for_signing),
        )
        .route(
            "/api/signing-sessions/:token",
            get(handlers::sessions::resolve_session),
        )
        .route(
            "/api/signing-sessions/:token/fields",
            get(handlers::sessions::session_fields),
        )
        .route(
            "/api/signing-sessions/:token/complete",
            patch(handlers::sessions::complete_session),
        )
        // Field completion engine
        .route(
            "/api/documents/:id/fields",
            post(handlers::fields::save_layout).get(handlers::fields::list_fields),
        )
        .route(
            "/api/documents/:id/field-value",
            patch(handlers::fields::update_field_value),
        )
        .route(
            "/api/documents/:id/field-value-or-create",
            patch(handlers::fields::update_field_value_or_create),
        )
        .route(
            "/api/documents/:id/fields/:field_id/complete",
            post(handlers::fields::mark_complete),
        )
        // Public form gateway
        .route(
            "/api/documents/:id/public-form",
            post(handlers::public_forms::create_public_form)
                .delete(handlers::public_forms::disable_public_form),
        )
        .route(
            "/api/documents/:id/submissions",
            get(handlers::public_forms::list_submissions),
        )
        .route(
            "/api/public-forms/:token",
            get(handlers::public_forms::get_public_form),
        )
        .route(
            "/api/public-forms/:token/submit",
            post(handlers::public_forms::submit_public_form),
        )
        // Field catalog
        .route(
            "/api/widgets",
            get(handlers::widgets::list_widgets).post(handlers::widgets::create_widget),
        )
        .route("/api/widgets/types", get(handlers::widgets::widget_types))
        .route("/api/widgets/by-type", get(handlers::widgets::widgets_by_type))
        // Saved signature library
        .route(
            "/api/signatures",
            get(handlers::signatures::list_signatures)
                .post(handlers::signatures::create_signature),
        )
        .route(
            "/api/signatures/:id",
            delete(handlers::signatures::delete_signature),
        )
        // Recipient directory
        .route(
            "/api/contacts",
            get(handlers::contacts::list_contacts).post(handlers::contacts::create_contact),
        )
        .route(
            "/api/contacts/search",
            get(handlers::contacts::search_contacts),
        )
        .route(
            "/api/contacts/:id",
            patch(handlers::contacts::update_contact).delete(handlers::contacts::delete_contact),
        )
        .with_state(state)
}
