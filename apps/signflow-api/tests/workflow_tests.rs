//! End-to-end workflow tests for signflow-api
//!
//! Runs the real handlers against an in-memory SQLite database, a memory
//! file store, and a scripted notifier. Each test builds its own state;
//! the single-connection pool keeps every query on the same in-memory
//! database.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::{Path, Query, State};
use axum::Json;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::{Duration, Utc};
use pretty_assertions::assert_eq;
use sqlx::sqlite::SqlitePoolOptions;

use signflow_api::auth::AuthUser;
use signflow_api::error::ApiError;
use signflow_api::handlers::{contacts, documents, fields, public_forms, sessions, signatures, widgets};
use signflow_api::models::{
    ContactResponse, CreateContactRequest, CreateDocumentRequest, CreatePublicFormRequest,
    CreateSignatureRequest, CreateWidgetRequest, DocumentResponse, FieldInput, ListDocumentsQuery,
    PageLayout, PublicFormSubmitRequest, RecipientInput, SaveLayoutRequest, SendForSigningRequest,
    SendForSigningResponse, TokenQuery, UpdateDocumentRequest, UpdateFieldValueRequest,
};
use signflow_api::notifier::{LogNotifier, Notifier, NotifyError};
use signflow_api::state::AppState;
use signflow_api::storage::{FileStore, MemoryFileStore};
use signflow_core::{FieldRecipient, PublicFormConfig, SessionStatus, SigningConfig, TOKEN_LEN};

// ============================================================
// Harness
// ============================================================

/// Notifier that refuses delivery to one address.
struct FlakyNotifier {
    reject: String,
}

#[async_trait]
impl Notifier for FlakyNotifier {
    async fn send(&self, to: &str, _subject: &str, _body: &str) -> Result<(), NotifyError> {
        if to == self.reject {
            Err(NotifyError::Delivery("mailbox unavailable".to_string()))
        } else {
            Ok(())
        }
    }
}

async fn setup() -> (Arc<AppState>, Arc<MemoryFileStore>) {
    setup_with(Arc::new(LogNotifier)).await
}

async fn setup_with(notifier: Arc<dyn Notifier>) -> (Arc<AppState>, Arc<MemoryFileStore>) {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");
    let files = Arc::new(MemoryFileStore::new());
    let state = AppState::with_parts(pool, notifier, files.clone(), "http://test.local")
        .migrate()
        .await
        .expect("migrations");
    (Arc::new(state), files)
}

fn owner() -> AuthUser {
    AuthUser {
        id: "owner-1".to_string(),
        email: Some("owner@example.com".to_string()),
    }
}

fn signer(name: &str, email: &str) -> RecipientInput {
    RecipientInput {
        name: name.to_string(),
        email: email.to_string(),
        phone: None,
    }
}

async fn create_doc(
    state: &Arc<AppState>,
    user: AuthUser,
    scenario: &str,
    signers: Vec<RecipientInput>,
) -> DocumentResponse {
    documents::create_document(
        State(state.clone()),
        user,
        Json(CreateDocumentRequest {
            title: "Lease Agreement".to_string(),
            note: None,
            scenario: scenario.to_string(),
            file_name: "lease.pdf".to_string(),
            file_base64: BASE64.encode(b"%PDF-1.4 stub"),
            config: SigningConfig::default(),
            signers,
            bcc: vec![],
            folder_id: None,
        }),
    )
    .await
    .expect("create document")
    .0
}

async fn contact_by_email(state: &Arc<AppState>, user: AuthUser, email: &str) -> ContactResponse {
    let list = contacts::list_contacts(State(state.clone()), user)
        .await
        .expect("list contacts")
        .0;
    list.into_iter()
        .find(|c| c.email == email)
        .expect("contact exists")
}

fn signature_field(recipient: Option<FieldRecipient>, required: bool) -> FieldInput {
    FieldInput {
        field_type: "signature".to_string(),
        label: "Sign here".to_string(),
        x: 40.0,
        y: 600.0,
        width: 180.0,
        height: 40.0,
        scale: 1.0,
        is_stamp: false,
        signature_type: None,
        required,
        recipient,
        value: None,
        signature_data: None,
        metadata: None,
    }
}

async fn save_one_field_each(
    state: &Arc<AppState>,
    doc_id: &str,
    recipients: &[&ContactResponse],
) -> Vec<signflow_api::models::FieldResponse> {
    let field_inputs = recipients
        .iter()
        .map(|c| signature_field(Some(FieldRecipient::Contact(c.id.clone())), true))
        .collect();
    fields::save_layout(
        State(state.clone()),
        owner(),
        Path(doc_id.to_string()),
        Json(SaveLayoutRequest {
            pages: vec![PageLayout {
                page: 1,
                fields: field_inputs,
            }],
        }),
    )
    .await
    .expect("save layout")
    .0
}

async fn send(
    state: &Arc<AppState>,
    doc_id: &str,
    recipient_ids: Vec<String>,
) -> SendForSigningResponse {
    sessions::send_for_signing(
        State(state.clone()),
        owner(),
        Path(doc_id.to_string()),
        Json(SendForSigningRequest { recipient_ids }),
    )
    .await
    .expect("send for signing")
    .0
}

async fn sign_and_complete(state: &Arc<AppState>, token: &str) {
    let session_fields = sessions::session_fields(State(state.clone()), Path(token.to_string()))
        .await
        .expect("session fields")
        .0;
    for f in &session_fields {
        fields::update_field_value(
            State(state.clone()),
            None,
            Path(f.document_id.clone()),
            Query(TokenQuery {
                token: Some(token.to_string()),
            }),
            Json(UpdateFieldValueRequest {
                field_id: f.id.clone(),
                value: None,
                signature_data: Some("data:image/png;base64,iVBORw0KGgo=".to_string()),
            }),
        )
        .await
        .expect("fill field");
    }
    sessions::complete_session(State(state.clone()), Path(token.to_string()))
        .await
        .expect("complete session");
}

// ============================================================
// Signing Round Trip
// ============================================================

#[tokio::test]
async fn two_signer_round_trip() {
    let (state, _) = setup().await;
    let doc = create_doc(
        &state,
        owner(),
        "request",
        vec![
            signer("Ada Lovelace", "ada@example.com"),
            signer("Alan Turing", "alan@example.com"),
        ],
    )
    .await;
    assert_eq!(doc.status, "pending");

    let ada = contact_by_email(&state, owner(), "ada@example.com").await;
    let alan = contact_by_email(&state, owner(), "alan@example.com").await;
    save_one_field_each(&state, &doc.id, &[&ada, &alan]).await;

    let sent = send(&state, &doc.id, vec![ada.id.clone(), alan.id.clone()]).await;
    assert_eq!(sent.results.len(), 2);
    let token_a = sent.results[0].session.token.clone();
    let token_b = sent.results[1].session.token.clone();
    assert_ne!(token_a, token_b);
    assert_eq!(token_a.len(), TOKEN_LEN);
    for r in &sent.results {
        assert!(r.delivered);
        assert_eq!(r.session.status, SessionStatus::Pending);
    }

    let doc = documents::get_document(State(state.clone()), owner(), Path(doc.id.clone()))
        .await
        .expect("get document")
        .0;
    assert_eq!(doc.status, "in_progress");

    // First open moves the session to in_progress.
    let resolved = sessions::resolve_session(State(state.clone()), Path(token_a.clone()))
        .await
        .expect("resolve")
        .0;
    assert_eq!(resolved.status, SessionStatus::InProgress);
    assert_eq!(resolved.contact_email.as_deref(), Some("ada@example.com"));

    sign_and_complete(&state, &token_a).await;
    let doc = documents::get_document(State(state.clone()), owner(), Path(doc.id.clone()))
        .await
        .expect("get document")
        .0;
    assert_eq!(doc.status, "in_progress", "one signer still open");

    sign_and_complete(&state, &token_b).await;
    let doc = documents::get_document(State(state.clone()), owner(), Path(doc.id))
        .await
        .expect("get document")
        .0;
    assert_eq!(doc.status, "completed");
}

#[tokio::test]
async fn completing_requires_required_fields() {
    let (state, _) = setup().await;
    let doc = create_doc(
        &state,
        owner(),
        "request",
        vec![signer("Ada Lovelace", "ada@example.com")],
    )
    .await;
    let ada = contact_by_email(&state, owner(), "ada@example.com").await;
    save_one_field_each(&state, &doc.id, &[&ada]).await;
    let sent = send(&state, &doc.id, vec![ada.id.clone()]).await;
    let token = sent.results[0].session.token.clone();

    let err = sessions::complete_session(State(state.clone()), Path(token.clone()))
        .await
        .expect_err("incomplete fields must block completion");
    match err {
        ApiError::Validation(errors) => assert!(errors.contains_key("fields")),
        other => panic!("expected validation error, got {:?}", other),
    }

    sign_and_complete(&state, &token).await;

    // A second completion is a conflict, not a silent success.
    let err = sessions::complete_session(State(state.clone()), Path(token))
        .await
        .expect_err("double completion");
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[tokio::test]
async fn resend_supersedes_live_sessions_but_keeps_completed() {
    let (state, _) = setup().await;
    let doc = create_doc(
        &state,
        owner(),
        "request",
        vec![
            signer("Ada Lovelace", "ada@example.com"),
            signer("Alan Turing", "alan@example.com"),
        ],
    )
    .await;
    let ada = contact_by_email(&state, owner(), "ada@example.com").await;
    let alan = contact_by_email(&state, owner(), "alan@example.com").await;
    save_one_field_each(&state, &doc.id, &[&ada, &alan]).await;

    let first = send(&state, &doc.id, vec![ada.id.clone(), alan.id.clone()]).await;
    let ada_token = first.results[0].session.token.clone();
    let alan_token = first.results[1].session.token.clone();
    sign_and_complete(&state, &ada_token).await;

    let second = send(&state, &doc.id, vec![ada.id.clone(), alan.id.clone()]).await;

    // Alan's first token died with the superseded session.
    let err = sessions::resolve_session(State(state.clone()), Path(alan_token))
        .await
        .expect_err("superseded token");
    assert!(matches!(err, ApiError::NotFound(_)));

    // Ada's completed session survives alongside her fresh one.
    let resolved = sessions::resolve_session(State(state.clone()), Path(ada_token))
        .await
        .expect("completed session stays resolvable")
        .0;
    assert_eq!(resolved.status, SessionStatus::Completed);

    let ada_sessions: Vec<(String,)> = sqlx::query_as(
        "SELECT status FROM signing_sessions WHERE document_id = ? AND contact_id = ?",
    )
    .bind(&doc.id)
    .bind(&ada.id)
    .fetch_all(&state.db)
    .await
    .expect("count sessions");
    assert_eq!(ada_sessions.len(), 2);

    let fresh = second
        .results
        .iter()
        .find(|r| r.recipient_id == ada.id)
        .expect("ada in batch");
    assert_eq!(fresh.session.status, SessionStatus::Pending);
}

#[tokio::test]
async fn send_rejects_unknown_recipients_without_side_effects() {
    let (state, _) = setup().await;
    let doc = create_doc(
        &state,
        owner(),
        "request",
        vec![signer("Ada Lovelace", "ada@example.com")],
    )
    .await;
    let ada = contact_by_email(&state, owner(), "ada@example.com").await;

    let err = sessions::send_for_signing(
        State(state.clone()),
        owner(),
        Path(doc.id.clone()),
        Json(SendForSigningRequest {
            recipient_ids: vec![ada.id.clone(), "no-such-contact".to_string()],
        }),
    )
    .await
    .expect_err("unknown recipient");
    match err {
        ApiError::Validation(errors) => assert!(errors.contains_key("recipient_ids")),
        other => panic!("expected validation error, got {:?}", other),
    }

    // No session was created and the document never left pending.
    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM signing_sessions WHERE document_id = ?")
        .bind(&doc.id)
        .fetch_one(&state.db)
        .await
        .expect("count");
    assert_eq!(count.0, 0);
    let doc = documents::get_document(State(state.clone()), owner(), Path(doc.id))
        .await
        .expect("get document")
        .0;
    assert_eq!(doc.status, "pending");
}

#[tokio::test]
async fn expired_tokens_read_as_gone() {
    let (state, _) = setup().await;
    let doc = create_doc(
        &state,
        owner(),
        "request",
        vec![signer("Ada Lovelace", "ada@example.com")],
    )
    .await;
    let ada = contact_by_email(&state, owner(), "ada@example.com").await;
    save_one_field_each(&state, &doc.id, &[&ada]).await;
    let sent = send(&state, &doc.id, vec![ada.id]).await;
    let token = sent.results[0].session.token.clone();

    sqlx::query("UPDATE signing_sessions SET expires_at = ? WHERE session_token = ?")
        .bind((Utc::now() - Duration::days(1)).to_rfc3339())
        .bind(&token)
        .execute(&state.db)
        .await
        .expect("backdate expiry");

    let err = sessions::resolve_session(State(state.clone()), Path(token.clone()))
        .await
        .expect_err("expired token");
    assert!(matches!(err, ApiError::NotFound(_)));

    // Lazy expiry persisted the terminal status.
    let stored: (String,) =
        sqlx::query_as("SELECT status FROM signing_sessions WHERE session_token = ?")
            .bind(&token)
            .fetch_one(&state.db)
            .await
            .expect("stored status");
    assert_eq!(stored.0, "expired");
}

#[tokio::test]
async fn failed_delivery_is_reported_per_recipient() {
    let (state, _) = setup_with(Arc::new(FlakyNotifier {
        reject: "alan@example.com".to_string(),
    }))
    .await;
    let doc = create_doc(
        &state,
        owner(),
        "request",
        vec![
            signer("Ada Lovelace", "ada@example.com"),
            signer("Alan Turing", "alan@example.com"),
        ],
    )
    .await;
    let ada = contact_by_email(&state, owner(), "ada@example.com").await;
    let alan = contact_by_email(&state, owner(), "alan@example.com").await;
    save_one_field_each(&state, &doc.id, &[&ada, &alan]).await;

    let sent = send(&state, &doc.id, vec![ada.id.clone(), alan.id.clone()]).await;
    let ada_result = sent.results.iter().find(|r| r.recipient_id == ada.id).unwrap();
    let alan_result = sent.results.iter().find(|r| r.recipient_id == alan.id).unwrap();

    assert!(ada_result.delivered);
    assert!(ada_result.failure_reason.is_none());
    assert!(!alan_result.delivered);
    assert!(alan_result.failure_reason.is_some());

    // The session exists despite the failed notification; the token can
    // still be handed over out of band.
    sessions::resolve_session(State(state.clone()), Path(alan_result.session.token.clone()))
        .await
        .expect("session usable despite delivery failure");
}

// ============================================================
// Documents
// ============================================================

#[tokio::test]
async fn self_scenario_forces_solo_config() {
    let (state, _) = setup().await;
    let doc = documents::create_document(
        State(state.clone()),
        owner(),
        Json(CreateDocumentRequest {
            title: "My own NDA".to_string(),
            note: None,
            scenario: "self".to_string(),
            file_name: "nda.pdf".to_string(),
            file_base64: BASE64.encode(b"%PDF-1.4 stub"),
            config: SigningConfig {
                send_in_order: true,
                automatic_reminders: true,
                reminder_interval_days: Some(3),
                ..Default::default()
            },
            signers: vec![],
            bcc: vec![],
            folder_id: None,
        }),
    )
    .await
    .expect("create document")
    .0;

    assert!(!doc.config.send_in_order);
    assert!(!doc.config.automatic_reminders);
    assert_eq!(doc.config.reminder_interval_days, None);
}

#[tokio::test]
async fn needs_my_signature_lists_open_requests() {
    let (state, _) = setup().await;
    let doc = create_doc(
        &state,
        owner(),
        "request",
        vec![signer("Ada Lovelace", "ada@example.com")],
    )
    .await;
    let ada_contact = contact_by_email(&state, owner(), "ada@example.com").await;
    save_one_field_each(&state, &doc.id, &[&ada_contact]).await;
    let sent = send(&state, &doc.id, vec![ada_contact.id]).await;
    let token = sent.results[0].session.token.clone();

    let ada_user = AuthUser {
        id: "user-ada".to_string(),
        email: Some("ada@example.com".to_string()),
    };
    let pending_view = documents::list_documents(
        State(state.clone()),
        ada_user.clone(),
        Query(ListDocumentsQuery {
            status: None,
            title: None,
            needs_my_signature: Some(true),
        }),
    )
    .await
    .expect("list")
    .0;
    assert_eq!(pending_view.len(), 1);
    assert_eq!(pending_view[0].id, doc.id);

    sign_and_complete(&state, &token).await;

    let after = documents::list_documents(
        State(state.clone()),
        ada_user,
        Query(ListDocumentsQuery {
            status: None,
            title: None,
            needs_my_signature: Some(true),
        }),
    )
    .await
    .expect("list")
    .0;
    assert!(after.is_empty());
}

#[tokio::test]
async fn deleting_a_document_cascades() {
    let (state, files) = setup().await;
    let doc = create_doc(
        &state,
        owner(),
        "request",
        vec![signer("Ada Lovelace", "ada@example.com")],
    )
    .await;
    let ada = contact_by_email(&state, owner(), "ada@example.com").await;
    save_one_field_each(&state, &doc.id, &[&ada]).await;
    send(&state, &doc.id, vec![ada.id]).await;
    assert!(!files.is_empty().await);
    let lock_before = state.layout_lock(&doc.id);

    documents::delete_document(State(state.clone()), owner(), Path(doc.id.clone()))
        .await
        .expect("delete");

    // The advisory lock entry went with the document.
    let lock_after = state.layout_lock(&doc.id);
    assert!(!Arc::ptr_eq(&lock_before, &lock_after));

    for table in ["document_fields", "signing_sessions", "document_signers"] {
        let sql = format!("SELECT COUNT(*) FROM {} WHERE document_id = ?", table);
        let count: (i64,) = sqlx::query_as(&sql)
            .bind(&doc.id)
            .fetch_one(&state.db)
            .await
            .expect("count");
        assert_eq!(count.0, 0, "{} rows must be gone", table);
    }
    assert!(files.is_empty().await, "stored file removed");

    let err = documents::get_document(State(state.clone()), owner(), Path(doc.id))
        .await
        .expect_err("document gone");
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn folder_moves_reject_cycles_and_explicit_null_detaches() {
    let (state, _) = setup().await;
    let parent = create_doc(&state, owner(), "self", vec![]).await;
    let child = create_doc(&state, owner(), "self", vec![]).await;

    let moved = documents::update_document(
        State(state.clone()),
        owner(),
        Path(child.id.clone()),
        Json(UpdateDocumentRequest {
            folder_id: Some(Some(parent.id.clone())),
            ..Default::default()
        }),
    )
    .await
    .expect("nest child under parent")
    .0;
    assert_eq!(moved.folder_id.as_deref(), Some(parent.id.as_str()));

    // Moving the parent under its own descendant would close a loop.
    let err = documents::update_document(
        State(state.clone()),
        owner(),
        Path(parent.id.clone()),
        Json(UpdateDocumentRequest {
            folder_id: Some(Some(child.id.clone())),
            ..Default::default()
        }),
    )
    .await
    .expect_err("cycle refused");
    match err {
        ApiError::Validation(errors) => assert!(errors.contains_key("folder_id")),
        other => panic!("expected validation error, got {:?}", other),
    }

    // A document is its own trivial descendant.
    let err = documents::update_document(
        State(state.clone()),
        owner(),
        Path(child.id.clone()),
        Json(UpdateDocumentRequest {
            folder_id: Some(Some(child.id.clone())),
            ..Default::default()
        }),
    )
    .await
    .expect_err("self-parent refused");
    assert!(matches!(err, ApiError::Validation(_)));

    // Unknown folder ids are dropped, keeping the current placement.
    let unchanged = documents::update_document(
        State(state.clone()),
        owner(),
        Path(child.id.clone()),
        Json(UpdateDocumentRequest {
            folder_id: Some(Some("no-such-folder".to_string())),
            ..Default::default()
        }),
    )
    .await
    .expect("unknown folder ignored")
    .0;
    assert_eq!(unchanged.folder_id.as_deref(), Some(parent.id.as_str()));

    // An explicit null detaches.
    let detached = documents::update_document(
        State(state.clone()),
        owner(),
        Path(child.id.clone()),
        Json(UpdateDocumentRequest {
            folder_id: Some(None),
            ..Default::default()
        }),
    )
    .await
    .expect("detach")
    .0;
    assert_eq!(detached.folder_id, None);
}

#[tokio::test]
async fn updates_persist_and_explicit_null_clears_note() {
    let (state, _) = setup().await;
    let doc = create_doc(&state, owner(), "request", vec![]).await;

    let updated = documents::update_document(
        State(state.clone()),
        owner(),
        Path(doc.id.clone()),
        Json(UpdateDocumentRequest {
            title: Some("Renamed Lease".to_string()),
            note: Some(Some("Countersign by Friday".to_string())),
            config: Some(SigningConfig {
                send_in_order: true,
                ..SigningConfig::default()
            }),
            ..Default::default()
        }),
    )
    .await
    .expect("update")
    .0;
    assert_eq!(updated.title, "Renamed Lease");
    assert_eq!(updated.note.as_deref(), Some("Countersign by Friday"));
    assert!(updated.config.send_in_order);

    // Absent note key leaves the note alone.
    let untouched = documents::update_document(
        State(state.clone()),
        owner(),
        Path(doc.id.clone()),
        Json(UpdateDocumentRequest {
            title: Some("Renamed Again".to_string()),
            ..Default::default()
        }),
    )
    .await
    .expect("update without note")
    .0;
    assert_eq!(untouched.note.as_deref(), Some("Countersign by Friday"));

    // An explicit null clears it.
    let cleared = documents::update_document(
        State(state.clone()),
        owner(),
        Path(doc.id.clone()),
        Json(UpdateDocumentRequest {
            note: Some(None),
            ..Default::default()
        }),
    )
    .await
    .expect("clear note")
    .0;
    assert_eq!(cleared.note, None);
    assert_eq!(cleared.title, "Renamed Again");

    // On the wire, a missing key and an explicit null are distinct.
    let absent: UpdateDocumentRequest = serde_json::from_str("{}").expect("empty patch");
    assert_eq!(absent.note, None);
    let null: UpdateDocumentRequest =
        serde_json::from_str(r#"{"note": null}"#).expect("null note");
    assert_eq!(null.note, Some(None));
}

// ============================================================
// Field Values
// ============================================================

#[tokio::test]
async fn missing_field_update_is_not_found_but_or_create_is_soft() {
    let (state, _) = setup().await;
    let doc = create_doc(&state, owner(), "self", vec![]).await;

    let req = UpdateFieldValueRequest {
        field_id: "no-such-field".to_string(),
        value: Some("hello".to_string()),
        signature_data: None,
    };

    let err = fields::update_field_value(
        State(state.clone()),
        Some(owner()),
        Path(doc.id.clone()),
        Query(TokenQuery { token: None }),
        Json(req.clone()),
    )
    .await
    .expect_err("strict update");
    assert!(matches!(err, ApiError::NotFound(_)));

    let ack = fields::update_field_value_or_create(
        State(state.clone()),
        Some(owner()),
        Path(doc.id),
        Query(TokenQuery { token: None }),
        Json(req),
    )
    .await
    .expect("soft update")
    .0;
    assert!(!ack.persisted);
    assert_eq!(ack.value.as_deref(), Some("hello"));
    assert!(ack.is_completed, "echoed ack still derives completion");
}

#[tokio::test]
async fn forced_completion_sticks_through_value_clears() {
    let (state, _) = setup().await;
    let doc = create_doc(&state, owner(), "self", vec![]).await;
    let saved = fields::save_layout(
        State(state.clone()),
        owner(),
        Path(doc.id.clone()),
        Json(SaveLayoutRequest {
            pages: vec![PageLayout {
                page: 1,
                fields: vec![FieldInput {
                    field_type: "checkbox".to_string(),
                    required: true,
                    ..signature_field(Some(FieldRecipient::Owner), true)
                }],
            }],
        }),
    )
    .await
    .expect("save layout")
    .0;
    let field_id = saved[0].id.clone();
    assert!(!saved[0].is_completed);

    let forced = fields::mark_complete(
        State(state.clone()),
        Some(owner()),
        Path((doc.id.clone(), field_id.clone())),
        Query(TokenQuery { token: None }),
    )
    .await
    .expect("mark complete")
    .0;
    assert!(forced.is_completed);

    // Clearing the value afterwards must not un-complete a forced field.
    let ack = fields::update_field_value(
        State(state.clone()),
        Some(owner()),
        Path(doc.id),
        Query(TokenQuery { token: None }),
        Json(UpdateFieldValueRequest {
            field_id,
            value: None,
            signature_data: None,
        }),
    )
    .await
    .expect("clear value")
    .0;
    assert!(ack.is_completed);
}

#[tokio::test]
async fn save_layout_replaces_wholesale_and_reuses_widgets() {
    let (state, _) = setup().await;
    let doc = create_doc(&state, owner(), "self", vec![]).await;

    let two = SaveLayoutRequest {
        pages: vec![PageLayout {
            page: 1,
            fields: vec![
                signature_field(Some(FieldRecipient::Owner), true),
                signature_field(Some(FieldRecipient::Owner), false),
            ],
        }],
    };
    let saved = fields::save_layout(
        State(state.clone()),
        owner(),
        Path(doc.id.clone()),
        Json(two.clone()),
    )
    .await
    .expect("first save")
    .0;
    assert_eq!(saved.len(), 2);

    let saved = fields::save_layout(
        State(state.clone()),
        owner(),
        Path(doc.id.clone()),
        Json(two),
    )
    .await
    .expect("second save")
    .0;
    assert_eq!(saved.len(), 2, "replacement, not accumulation");

    // Both saves placed the same (type, label) pair; the catalog holds
    // one widget for it, not one per save.
    let widget_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM widgets")
        .fetch_one(&state.db)
        .await
        .expect("widget count");
    assert_eq!(widget_count.0, 1);
}

#[tokio::test]
async fn layout_failure_leaves_previous_layout_intact() {
    let (state, _) = setup().await;
    let doc = create_doc(&state, owner(), "request", vec![]).await;

    fields::save_layout(
        State(state.clone()),
        owner(),
        Path(doc.id.clone()),
        Json(SaveLayoutRequest {
            pages: vec![PageLayout {
                page: 1,
                fields: vec![signature_field(Some(FieldRecipient::Owner), true)],
            }],
        }),
    )
    .await
    .expect("initial layout");

    let err = fields::save_layout(
        State(state.clone()),
        owner(),
        Path(doc.id.clone()),
        Json(SaveLayoutRequest {
            pages: vec![PageLayout {
                page: 1,
                fields: vec![signature_field(
                    Some(FieldRecipient::Contact("ghost".to_string())),
                    true,
                )],
            }],
        }),
    )
    .await
    .expect_err("unknown recipient in layout");
    assert!(matches!(err, ApiError::Validation(_)));

    let pages = fields::list_fields(State(state.clone()), owner(), Path(doc.id))
        .await
        .expect("list fields")
        .0;
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].fields.len(), 1, "old layout survived the bad save");
}

// ============================================================
// Public Forms
// ============================================================

#[tokio::test]
async fn public_form_lifecycle() {
    let (state, _) = setup().await;
    let doc = create_doc(&state, owner(), "self", vec![]).await;

    let form = public_forms::create_public_form(
        State(state.clone()),
        owner(),
        Path(doc.id.clone()),
        Json(CreatePublicFormRequest {
            required_fields: PublicFormConfig {
                email: true,
                ..Default::default()
            },
        }),
    )
    .await
    .expect("enable public form")
    .0;
    assert_eq!(form.public_token.len(), TOKEN_LEN);
    assert!(form.url.ends_with(&form.public_token));

    // Re-enabling keeps the shared link stable.
    let again = public_forms::create_public_form(
        State(state.clone()),
        owner(),
        Path(doc.id.clone()),
        Json(CreatePublicFormRequest {
            required_fields: PublicFormConfig {
                email: true,
                ..Default::default()
            },
        }),
    )
    .await
    .expect("re-enable")
    .0;
    assert_eq!(again.public_token, form.public_token);

    let view = public_forms::get_public_form(State(state.clone()), Path(form.public_token.clone()))
        .await
        .expect("public view")
        .0;
    assert!(view.required_fields.email);
    assert_eq!(view.document.id, doc.id);

    // Policy failure persists nothing.
    let err = public_forms::submit_public_form(
        State(state.clone()),
        Path(form.public_token.clone()),
        Json(PublicFormSubmitRequest {
            name: Some("Grace".to_string()),
            email: None,
            phone: None,
            fields: HashMap::new(),
        }),
    )
    .await
    .expect_err("missing required email");
    match err {
        ApiError::Validation(errors) => {
            assert_eq!(errors.get("email").map(String::as_str), Some("This field is required."))
        }
        other => panic!("expected validation error, got {:?}", other),
    }

    let listed = public_forms::list_submissions(State(state.clone()), owner(), Path(doc.id.clone()))
        .await
        .expect("list submissions")
        .0;
    assert!(listed.is_empty(), "rejected submission left no record");

    // Anonymous submitter name defaults.
    let mut data = HashMap::new();
    data.insert("comment".to_string(), serde_json::json!("looks good"));
    let ack = public_forms::submit_public_form(
        State(state.clone()),
        Path(form.public_token.clone()),
        Json(PublicFormSubmitRequest {
            name: None,
            email: Some("grace@example.com".to_string()),
            phone: None,
            fields: data,
        }),
    )
    .await
    .expect("valid submission")
    .0;
    assert_eq!(ack.submission.submitter_name, "Anonymous");

    public_forms::disable_public_form(State(state.clone()), owner(), Path(doc.id.clone()))
        .await
        .expect("disable");

    let err = public_forms::get_public_form(State(state.clone()), Path(form.public_token.clone()))
        .await
        .expect_err("disabled form");
    assert!(matches!(err, ApiError::NotFound(_)));

    let doc_after = documents::get_document(State(state.clone()), owner(), Path(doc.id.clone()))
        .await
        .expect("get document")
        .0;
    assert!(!doc_after.is_public);
    assert_eq!(doc_after.public_token, None);

    // History outlives the toggle.
    let listed = public_forms::list_submissions(State(state.clone()), owner(), Path(doc.id))
        .await
        .expect("list after disable")
        .0;
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].submitter_email.as_deref(), Some("grace@example.com"));
}

#[tokio::test]
async fn never_public_documents_hide_their_submission_list() {
    let (state, _) = setup().await;
    let doc = create_doc(&state, owner(), "self", vec![]).await;

    let err = public_forms::list_submissions(State(state.clone()), owner(), Path(doc.id))
        .await
        .expect_err("never-public document");
    assert!(matches!(err, ApiError::Forbidden(_)));
}

// ============================================================
// Contacts and Widgets
// ============================================================

#[tokio::test]
async fn contact_emails_are_unique_per_owner() {
    let (state, _) = setup().await;
    let req = CreateContactRequest {
        name: "Ada Lovelace".to_string(),
        email: "ada@example.com".to_string(),
        phone: None,
        company: None,
    };
    contacts::create_contact(State(state.clone()), owner(), Json(req.clone()))
        .await
        .expect("first contact");

    let err = contacts::create_contact(State(state.clone()), owner(), Json(req.clone()))
        .await
        .expect_err("duplicate email");
    match err {
        ApiError::Validation(errors) => assert_eq!(
            errors.get("email").map(String::as_str),
            Some("A contact with this email already exists.")
        ),
        other => panic!("expected validation error, got {:?}", other),
    }

    // Another owner may hold the same address.
    let other = AuthUser {
        id: "owner-2".to_string(),
        email: None,
    };
    contacts::create_contact(State(state.clone()), other, Json(req))
        .await
        .expect("same email, different owner");
}

#[tokio::test]
async fn referenced_contacts_refuse_deletion() {
    let (state, _) = setup().await;
    let doc = create_doc(
        &state,
        owner(),
        "request",
        vec![signer("Ada Lovelace", "ada@example.com")],
    )
    .await;
    let ada = contact_by_email(&state, owner(), "ada@example.com").await;
    save_one_field_each(&state, &doc.id, &[&ada]).await;

    let err = contacts::delete_contact(State(state.clone()), owner(), Path(ada.id))
        .await
        .expect_err("contact referenced by fields");
    assert!(matches!(err, ApiError::Conflict(_)));

    let free = contacts::create_contact(
        State(state.clone()),
        owner(),
        Json(CreateContactRequest {
            name: "Unused".to_string(),
            email: "unused@example.com".to_string(),
            phone: None,
            company: None,
        }),
    )
    .await
    .expect("free contact")
    .0;
    contacts::delete_contact(State(state.clone()), owner(), Path(free.id))
        .await
        .expect("unreferenced contact deletes");
}

#[tokio::test]
async fn widget_catalog_rejects_unknown_types_and_duplicate_names() {
    let (state, _) = setup().await;

    let err = widgets::create_widget(
        State(state.clone()),
        owner(),
        Json(CreateWidgetRequest {
            name: "hologram_1".to_string(),
            widget_type: "hologram".to_string(),
            label: "Hologram".to_string(),
            placeholder: None,
            required: false,
            options: None,
        }),
    )
    .await
    .expect_err("unknown widget type");
    assert!(matches!(err, ApiError::Validation(_)));

    let req = CreateWidgetRequest {
        name: "signature_main".to_string(),
        widget_type: "signature".to_string(),
        label: "Main signature".to_string(),
        placeholder: None,
        required: true,
        options: None,
    };
    widgets::create_widget(State(state.clone()), owner(), Json(req.clone()))
        .await
        .expect("create widget");
    let err = widgets::create_widget(State(state.clone()), owner(), Json(req))
        .await
        .expect_err("duplicate name");
    match err {
        ApiError::Validation(errors) => assert_eq!(
            errors.get("name").map(String::as_str),
            Some("A widget with this name already exists.")
        ),
        other => panic!("expected validation error, got {:?}", other),
    }
}

// ============================================================
// Saved Signatures
// ============================================================

#[tokio::test]
async fn signature_library_is_scoped_per_owner() {
    let (state, files) = setup().await;

    let created = signatures::create_signature(
        State(state.clone()),
        owner(),
        Json(CreateSignatureRequest {
            name: "My scrawl".to_string(),
            signature_type: "drawn".to_string(),
            image_base64: BASE64.encode(b"\x89PNG scribble"),
            font: None,
            color: Some("#1a1a1a".to_string()),
        }),
    )
    .await
    .expect("create signature")
    .0;
    assert!(created.image_url.starts_with("memory://signatures/owner-1/"));
    assert_eq!(created.signature_type, "drawn");

    let listed = signatures::list_signatures(State(state.clone()), owner())
        .await
        .expect("list")
        .0;
    assert_eq!(listed.count, 1);
    assert_eq!(listed.results[0].id, created.id);

    // Another owner sees an empty library and cannot delete across it.
    let stranger = AuthUser {
        id: "owner-2".to_string(),
        email: None,
    };
    let theirs = signatures::list_signatures(State(state.clone()), stranger.clone())
        .await
        .expect("stranger list")
        .0;
    assert_eq!(theirs.count, 0);
    let err =
        signatures::delete_signature(State(state.clone()), stranger, Path(created.id.clone()))
            .await
            .expect_err("foreign delete refused");
    assert!(matches!(err, ApiError::Forbidden(_)));

    let gone = signatures::delete_signature(State(state.clone()), owner(), Path(created.id.clone()))
        .await
        .expect("delete")
        .0;
    assert_eq!(gone.message, "Signature deleted successfully");
    assert!(files.is_empty().await, "stored image removed");
    let listed = signatures::list_signatures(State(state.clone()), owner())
        .await
        .expect("list after delete")
        .0;
    assert_eq!(listed.count, 0);

    let err = signatures::delete_signature(State(state.clone()), owner(), Path(created.id))
        .await
        .expect_err("already gone");
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn signature_delete_survives_a_missing_image() {
    let (state, files) = setup().await;

    let created = signatures::create_signature(
        State(state.clone()),
        owner(),
        Json(CreateSignatureRequest {
            name: "Typed".to_string(),
            signature_type: "typed".to_string(),
            image_base64: BASE64.encode(b"\x89PNG typed"),
            font: Some("Caveat".to_string()),
            color: None,
        }),
    )
    .await
    .expect("create")
    .0;

    // Yank the stored image out from under the row.
    let image_path = format!(
        "signatures/owner-1/{}.png",
        created.id
    );
    files.delete(&image_path).await.expect("drop image");

    // The row still goes even though the image delete fails.
    signatures::delete_signature(State(state.clone()), owner(), Path(created.id))
        .await
        .expect("delete with missing image");
    let listed = signatures::list_signatures(State(state.clone()), owner())
        .await
        .expect("list")
        .0;
    assert_eq!(listed.count, 0);
}

#[tokio::test]
async fn signature_create_validates_its_payload() {
    let (state, _) = setup().await;

    let err = signatures::create_signature(
        State(state.clone()),
        owner(),
        Json(CreateSignatureRequest {
            name: "   ".to_string(),
            signature_type: "drawn".to_string(),
            image_base64: BASE64.encode(b"x"),
            font: None,
            color: None,
        }),
    )
    .await
    .expect_err("blank name");
    match err {
        ApiError::Validation(errors) => assert!(errors.contains_key("name")),
        other => panic!("expected validation error, got {:?}", other),
    }

    let err = signatures::create_signature(
        State(state.clone()),
        owner(),
        Json(CreateSignatureRequest {
            name: "Empty".to_string(),
            signature_type: "drawn".to_string(),
            image_base64: String::new(),
            font: None,
            color: None,
        }),
    )
    .await
    .expect_err("empty image");
    match err {
        ApiError::Validation(errors) => assert!(errors.contains_key("image_base64")),
        other => panic!("expected validation error, got {:?}", other),
    }
}

// ============================================================
// HTTP Surface
// ============================================================

#[tokio::test]
async fn unidentified_callers_are_rejected_at_the_router() {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    let (state, _) = setup().await;
    let app = signflow_api::router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/documents")
                .body(Body::empty())
                .expect("request"),
        )
        .await
        .expect("router response");
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}
