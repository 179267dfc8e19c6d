//! Document signing workflow core logic
//!
//! This crate provides the domain rules for the signing workflow,
//! independent of HTTP and storage: document scenarios and the status
//! machine, the per-recipient signing-session state machine with lazy
//! expiry, unguessable token generation, field-completion derivation,
//! and the public-form required-field policy.
//!
//! Everything here is pure; the signflow-api crate wires it to axum
//! and SQLite.

pub mod document;
pub mod field;
pub mod public_form;
pub mod session;
pub mod token;

pub use document::{DocumentStatus, Scenario, SigningConfig};
pub use field::{derive_completed, derived_widget_name, validate_placement, FieldRecipient};
pub use public_form::PublicFormConfig;
pub use session::{effective_status, SessionStatus, SESSION_TTL_DAYS};
pub use token::{generate_token, TOKEN_LEN};
