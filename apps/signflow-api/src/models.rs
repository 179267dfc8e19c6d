//! Data models for the SignFlow API
//!
//! `Db*` structs mirror table rows (`sqlx::FromRow`, JSON columns stored
//! as TEXT). `*Request`/`*Response` structs are the wire types. Contact
//! details on fields and sessions are joined at read time, never stored
//! alongside the row, so a renamed contact is reflected everywhere.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::FromRow;

use signflow_core::{FieldRecipient, PublicFormConfig, SessionStatus, SigningConfig};

// ============================================================
// Contacts
// ============================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbContact {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactResponse {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub company: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbContact> for ContactResponse {
    fn from(c: DbContact) -> Self {
        Self {
            id: c.id,
            owner_id: c.owner_id,
            name: c.name,
            email: c.email,
            phone: c.phone,
            company: c.company,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateContactRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub company: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateContactRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub company: Option<String>,
}

// ============================================================
// Widgets (field catalog)
// ============================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbWidget {
    pub id: String,
    pub name: String,
    pub widget_type: String,
    pub label: String,
    pub placeholder: Option<String>,
    pub required: bool,
    pub options_json: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WidgetResponse {
    pub id: String,
    pub name: String,
    pub widget_type: String,
    pub label: String,
    pub placeholder: Option<String>,
    pub required: bool,
    pub options: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbWidget> for WidgetResponse {
    fn from(w: DbWidget) -> Self {
        let options = serde_json::from_str(&w.options_json).unwrap_or_else(|_| json!([]));
        Self {
            id: w.id,
            name: w.name,
            widget_type: w.widget_type,
            label: w.label,
            placeholder: w.placeholder,
            required: w.required,
            options,
            created_at: w.created_at,
            updated_at: w.updated_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateWidgetRequest {
    pub name: String,
    pub widget_type: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub placeholder: Option<String>,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub options: Option<serde_json::Value>,
}

// ============================================================
// Documents
// ============================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbDocument {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub note: Option<String>,
    pub scenario: String,
    pub status: String,
    pub file_path: String,
    pub file_url: String,
    pub send_in_order: bool,
    pub automatic_reminders: bool,
    pub reminder_interval_days: Option<i64>,
    pub completion_deadline_days: Option<i64>,
    pub allow_field_changes: bool,
    pub require_otp: bool,
    pub notify_on_signature: bool,
    pub is_public: bool,
    pub public_token: Option<String>,
    pub public_form_config_json: Option<String>,
    pub public_enabled_at: Option<DateTime<Utc>>,
    pub folder_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DbDocument {
    pub fn signing_config(&self) -> SigningConfig {
        SigningConfig {
            send_in_order: self.send_in_order,
            automatic_reminders: self.automatic_reminders,
            reminder_interval_days: self.reminder_interval_days,
            completion_deadline_days: self.completion_deadline_days,
            allow_field_changes: self.allow_field_changes,
            require_otp: self.require_otp,
            notify_on_signature: self.notify_on_signature,
        }
    }

    pub fn public_form_config(&self) -> PublicFormConfig {
        self.public_form_config_json
            .as_deref()
            .and_then(|raw| serde_json::from_str(raw).ok())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentResponse {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub note: Option<String>,
    pub scenario: String,
    pub status: String,
    pub file_url: String,
    pub config: SigningConfig,
    pub is_public: bool,
    pub public_token: Option<String>,
    pub folder_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbDocument> for DocumentResponse {
    fn from(d: DbDocument) -> Self {
        let config = d.signing_config();
        Self {
            id: d.id,
            owner_id: d.owner_id,
            title: d.title,
            note: d.note,
            scenario: d.scenario,
            status: d.status,
            file_url: d.file_url,
            config,
            is_public: d.is_public,
            public_token: d.public_token,
            folder_id: d.folder_id,
            created_at: d.created_at,
            updated_at: d.updated_at,
        }
    }
}

/// Lightweight (email, name, phone) tuple used to upsert directory
/// contacts while creating a document.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipientInput {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateDocumentRequest {
    pub title: String,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default = "default_scenario")]
    pub scenario: String,
    pub file_name: String,
    /// Base64-encoded document bytes.
    pub file_base64: String,
    #[serde(default)]
    pub config: SigningConfig,
    #[serde(default)]
    pub signers: Vec<RecipientInput>,
    #[serde(default)]
    pub bcc: Vec<RecipientInput>,
    #[serde(default)]
    pub folder_id: Option<String>,
}

fn default_scenario() -> String {
    "self".to_string()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateDocumentRequest {
    pub title: Option<String>,
    /// Same absent/null/value semantics as `folder_id`.
    #[serde(default, deserialize_with = "double_option")]
    pub note: Option<Option<String>>,
    pub config: Option<SigningConfig>,
    /// Absent: leave the folder alone. `null`: detach. A value: move,
    /// subject to the non-descendant check.
    #[serde(default, deserialize_with = "double_option")]
    pub folder_id: Option<Option<String>>,
}

/// Distinguishes an absent JSON key (outer `None`) from an explicit
/// `null` (inner `None`).
fn double_option<'de, T, D>(de: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    T::deserialize(de).map(Some)
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListDocumentsQuery {
    pub status: Option<String>,
    pub title: Option<String>,
    #[serde(default)]
    pub needs_my_signature: Option<bool>,
}

// ============================================================
// Fields
// ============================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbField {
    pub id: String,
    pub document_id: String,
    pub widget_id: Option<String>,
    pub field_type: String,
    pub label: String,
    pub page: i64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub scale: f64,
    pub is_stamp: bool,
    pub signature_type: Option<String>,
    pub required: bool,
    pub recipient_id: Option<String>,
    pub value: Option<String>,
    pub signature_data: Option<String>,
    pub completion_forced: bool,
    pub is_completed: bool,
    pub metadata_json: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Field row with its recipient's directory entry joined in.
#[derive(Debug, Clone, FromRow)]
pub struct DbFieldWithContact {
    #[sqlx(flatten)]
    pub field: DbField,
    pub recipient_name: Option<String>,
    pub recipient_email: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FieldResponse {
    pub id: String,
    pub document_id: String,
    pub widget_id: Option<String>,
    pub field_type: String,
    pub label: String,
    pub page: i64,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub scale: f64,
    pub is_stamp: bool,
    pub signature_type: Option<String>,
    pub required: bool,
    pub recipient: FieldRecipient,
    pub recipient_name: Option<String>,
    pub recipient_email: Option<String>,
    pub value: Option<String>,
    pub signature_data: Option<String>,
    pub is_completed: bool,
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<DbFieldWithContact> for FieldResponse {
    fn from(row: DbFieldWithContact) -> Self {
        let f = row.field;
        let metadata = serde_json::from_str(&f.metadata_json).unwrap_or_else(|_| json!({}));
        Self {
            id: f.id,
            document_id: f.document_id,
            widget_id: f.widget_id,
            field_type: f.field_type,
            label: f.label,
            page: f.page,
            x: f.x,
            y: f.y,
            width: f.width,
            height: f.height,
            scale: f.scale,
            is_stamp: f.is_stamp,
            signature_type: f.signature_type,
            required: f.required,
            recipient: FieldRecipient::from_contact_id(f.recipient_id),
            recipient_name: row.recipient_name,
            recipient_email: row.recipient_email,
            value: f.value,
            signature_data: f.signature_data,
            is_completed: f.is_completed,
            metadata,
            created_at: f.created_at,
            updated_at: f.updated_at,
        }
    }
}

/// One field as supplied to a layout save.
#[derive(Debug, Clone, Deserialize)]
pub struct FieldInput {
    pub field_type: String,
    #[serde(default)]
    pub label: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default = "default_scale")]
    pub scale: f64,
    #[serde(default)]
    pub is_stamp: bool,
    #[serde(default)]
    pub signature_type: Option<String>,
    #[serde(default)]
    pub required: bool,
    /// Absent means the owner's own (unassigned) field.
    #[serde(default)]
    pub recipient: Option<FieldRecipient>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub signature_data: Option<String>,
    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

fn default_scale() -> f64 {
    1.0
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageLayout {
    pub page: i64,
    #[serde(default)]
    pub fields: Vec<FieldInput>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SaveLayoutRequest {
    pub pages: Vec<PageLayout>,
}

/// Fields of one page, for the grouped read view.
#[derive(Debug, Clone, Serialize)]
pub struct PageFieldsResponse {
    pub page: i64,
    pub fields: Vec<FieldResponse>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateFieldValueRequest {
    pub field_id: String,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub signature_data: Option<String>,
}

/// Acknowledgment for optimistic value updates. `persisted` is false
/// when the target field did not exist and the write was a soft no-op.
#[derive(Debug, Clone, Serialize)]
pub struct FieldValueAck {
    pub field_id: String,
    pub value: Option<String>,
    pub signature_data: Option<String>,
    pub is_completed: bool,
    pub persisted: bool,
}

/// Session-token query parameter accepted by field-value routes so
/// signers can write without an owner identity.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

// ============================================================
// Signing sessions
// ============================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbSession {
    pub id: String,
    pub document_id: String,
    pub contact_id: String,
    pub session_token: String,
    pub status: String,
    pub signed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Session row with its contact joined in.
#[derive(Debug, Clone, FromRow)]
pub struct DbSessionWithContact {
    #[sqlx(flatten)]
    pub session: DbSession,
    pub contact_name: String,
    pub contact_email: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionResponse {
    pub id: String,
    pub document_id: String,
    pub contact_id: String,
    pub contact_name: Option<String>,
    pub contact_email: Option<String>,
    pub token: String,
    pub status: SessionStatus,
    pub signed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl SessionResponse {
    pub fn from_row(s: DbSession, status: SessionStatus) -> Self {
        Self {
            id: s.id,
            document_id: s.document_id,
            contact_id: s.contact_id,
            contact_name: None,
            contact_email: None,
            token: s.session_token,
            status,
            signed_at: s.signed_at,
            expires_at: s.expires_at,
            created_at: s.created_at,
        }
    }

    pub fn from_joined(row: DbSessionWithContact, status: SessionStatus) -> Self {
        let mut resp = Self::from_row(row.session, status);
        resp.contact_name = Some(row.contact_name);
        resp.contact_email = Some(row.contact_email);
        resp
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SendForSigningRequest {
    pub recipient_ids: Vec<String>,
}

/// Per-recipient delivery outcome: the batch never aborts because one
/// notification failed. Sessions exist either way; a failed entry can be
/// retried or its link copied out-of-band.
#[derive(Debug, Clone, Serialize)]
pub struct RecipientSendResult {
    pub recipient_id: String,
    pub email: String,
    pub delivered: bool,
    pub failure_reason: Option<String>,
    pub session: SessionResponse,
}

#[derive(Debug, Clone, Serialize)]
pub struct SendForSigningResponse {
    pub document_id: String,
    pub results: Vec<RecipientSendResult>,
}

// ============================================================
// Saved signatures
// ============================================================

#[derive(Debug, Clone, FromRow)]
pub struct DbSavedSignature {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub signature_type: String,
    pub image_path: String,
    pub image_url: String,
    pub font: Option<String>,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedSignatureResponse {
    pub id: String,
    pub name: String,
    pub signature_type: String,
    pub image_url: String,
    pub font: Option<String>,
    pub color: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<DbSavedSignature> for SavedSignatureResponse {
    fn from(s: DbSavedSignature) -> Self {
        Self {
            id: s.id,
            name: s.name,
            signature_type: s.signature_type,
            image_url: s.image_url,
            font: s.font,
            color: s.color,
            created_at: s.created_at,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateSignatureRequest {
    pub name: String,
    #[serde(default = "default_signature_type")]
    pub signature_type: String,
    /// Base64-encoded signature image bytes.
    pub image_base64: String,
    #[serde(default)]
    pub font: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
}

fn default_signature_type() -> String {
    "drawn".to_string()
}

/// Listing carries an explicit count alongside the rows.
#[derive(Debug, Clone, Serialize)]
pub struct SavedSignatureListResponse {
    pub results: Vec<SavedSignatureResponse>,
    pub count: usize,
}

// ============================================================
// Public forms
// ============================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePublicFormRequest {
    #[serde(default)]
    pub required_fields: PublicFormConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct PublicFormResponse {
    pub document_id: String,
    pub public_token: String,
    pub url: String,
    pub required_fields: PublicFormConfig,
}

/// What an anonymous visitor sees when resolving a public token.
#[derive(Debug, Clone, Serialize)]
pub struct PublicFormView {
    pub document: DocumentResponse,
    pub required_fields: PublicFormConfig,
    pub fields: Vec<FieldResponse>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PublicFormSubmitRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub fields: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, FromRow)]
pub struct DbSubmission {
    pub id: String,
    pub document_id: String,
    pub submitter_name: String,
    pub submitter_email: Option<String>,
    pub submitter_phone: Option<String>,
    pub field_data_json: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionResponse {
    pub id: String,
    pub document_id: String,
    pub submitter_name: String,
    pub submitter_email: Option<String>,
    pub submitter_phone: Option<String>,
    pub fields: serde_json::Value,
    pub submitted_at: DateTime<Utc>,
}

impl From<DbSubmission> for SubmissionResponse {
    fn from(s: DbSubmission) -> Self {
        let fields = serde_json::from_str(&s.field_data_json).unwrap_or_else(|_| json!({}));
        Self {
            id: s.id,
            document_id: s.document_id,
            submitter_name: s.submitter_name,
            submitter_email: s.submitter_email,
            submitter_phone: s.submitter_phone,
            fields,
            submitted_at: s.submitted_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitAck {
    pub message: String,
    pub submission: SubmissionResponse,
}

/// Simple `{"message": ...}` body for deletes and toggles.
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}
