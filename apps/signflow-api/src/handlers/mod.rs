//! HTTP handlers for the SignFlow API

pub mod contacts;
pub mod documents;
pub mod fields;
pub mod public_forms;
pub mod sessions;
pub mod signatures;
pub mod widgets;

/// Health check endpoint
pub async fn health() -> &'static str {
    "OK"
}
