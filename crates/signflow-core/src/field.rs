//! Placed-field rules: recipient assignment, completion derivation,
//! placement validation

use serde::{Deserialize, Serialize};

use crate::document::Scenario;

/// Who a placed field belongs to. The owner's own fields carry no
/// contact reference; everything else points at a directory contact.
/// Modeled as an explicit union so no code path has to sniff sentinel
/// strings out of an id column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum FieldRecipient {
    /// The document owner signing their own field
    Owner,
    /// A contact from the recipient directory
    Contact(String),
}

impl FieldRecipient {
    /// The value stored in the field's recipient column: NULL for the
    /// owner, the contact id otherwise.
    pub fn contact_id(&self) -> Option<&str> {
        match self {
            FieldRecipient::Owner => None,
            FieldRecipient::Contact(id) => Some(id.as_str()),
        }
    }

    pub fn from_contact_id(id: Option<String>) -> Self {
        match id {
            Some(id) => FieldRecipient::Contact(id),
            None => FieldRecipient::Owner,
        }
    }

    /// Contact-assigned fields only make sense on documents that have
    /// external recipients at all.
    pub fn valid_for(&self, scenario: Scenario) -> bool {
        match self {
            FieldRecipient::Owner => true,
            FieldRecipient::Contact(_) => scenario.allows_recipients(),
        }
    }
}

fn nonempty(s: Option<&str>) -> bool {
    s.map(|v| !v.trim().is_empty()).unwrap_or(false)
}

/// A field is complete iff it holds a value, holds signature data, or an
/// authorized editor forced it (checkboxes, stamps). Pure function of the
/// field's state; the API recomputes it on every mutation that touches
/// value or signature so the stored flag cannot drift.
pub fn derive_completed(value: Option<&str>, signature_data: Option<&str>, forced: bool) -> bool {
    forced || nonempty(value) || nonempty(signature_data)
}

/// Geometry constraints for a placed field: pages are 1-based, sizes
/// strictly positive. Returns the offending attribute name for the
/// validation error map.
pub fn validate_placement(page: i64, width: f64, height: f64) -> Result<(), (&'static str, String)> {
    if page < 1 {
        return Err(("page", format!("page must be >= 1, got {}", page)));
    }
    if !(width > 0.0) {
        return Err(("width", format!("width must be > 0, got {}", width)));
    }
    if !(height > 0.0) {
        return Err(("height", format!("height must be > 0, got {}", height)));
    }
    Ok(())
}

/// Derived catalog name for widget upsert during layout saves: stable
/// for a given (type, label) pair so repeated saves hit the same entry.
pub fn derived_widget_name(widget_type: &str, label: &str) -> String {
    let slug: String = label
        .trim()
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '-' })
        .collect();
    format!("{}-{}", widget_type, slug.trim_matches('-'))
}
