//! Document scenarios, status machine, and signing configuration

use serde::{Deserialize, Serialize};

/// A document's intended workflow mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scenario {
    /// Owner signs their own document
    #[serde(rename = "self")]
    SelfSign,
    /// Multi-party signature request
    Request,
    /// Reusable template
    Template,
}

impl Scenario {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scenario::SelfSign => "self",
            Scenario::Request => "request",
            Scenario::Template => "template",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "self" => Some(Scenario::SelfSign),
            "request" => Some(Scenario::Request),
            "template" => Some(Scenario::Template),
            _ => None,
        }
    }

    /// Whether fields on this document may be assigned to external recipients
    pub fn allows_recipients(&self) -> bool {
        matches!(self, Scenario::Request | Scenario::Template)
    }
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Document lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Pending,
    InProgress,
    Completed,
    Declined,
}

impl DocumentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentStatus::Pending => "pending",
            DocumentStatus::InProgress => "in_progress",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Declined => "declined",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(DocumentStatus::Pending),
            "in_progress" => Some(DocumentStatus::InProgress),
            "completed" => Some(DocumentStatus::Completed),
            "declined" => Some(DocumentStatus::Declined),
            _ => None,
        }
    }

    /// Legal forward transitions. Status never moves backward; the only
    /// way out of `Declined` is a resend, which puts the document back
    /// in progress with fresh sessions.
    pub fn can_transition(self, to: DocumentStatus) -> bool {
        use DocumentStatus::*;
        matches!(
            (self, to),
            (Pending, InProgress)
                | (Pending, Declined)
                | (InProgress, Completed)
                | (InProgress, Declined)
                | (Declined, InProgress)
        )
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Signing configuration carried by a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningConfig {
    /// Deliver signing requests one recipient at a time
    #[serde(default)]
    pub send_in_order: bool,
    /// Send periodic reminders to recipients who have not signed
    #[serde(default)]
    pub automatic_reminders: bool,
    /// Days between reminders, when enabled
    #[serde(default)]
    pub reminder_interval_days: Option<i64>,
    /// Days until the signing request is considered overdue
    #[serde(default)]
    pub completion_deadline_days: Option<i64>,
    /// Recipients may adjust field placement while signing
    #[serde(default)]
    pub allow_field_changes: bool,
    /// Require a one-time passcode before a session opens
    #[serde(default)]
    pub require_otp: bool,
    /// Notify the owner on every individual signature
    #[serde(default)]
    pub notify_on_signature: bool,
}

impl Default for SigningConfig {
    fn default() -> Self {
        Self {
            send_in_order: false,
            automatic_reminders: false,
            reminder_interval_days: None,
            completion_deadline_days: None,
            allow_field_changes: false,
            require_otp: false,
            notify_on_signature: false,
        }
    }
}

impl SigningConfig {
    /// Apply scenario-specific defaults. Self-signed documents have no
    /// external recipients, so ordered delivery and reminders are forced
    /// off regardless of what the client sent.
    pub fn normalized_for(mut self, scenario: Scenario) -> Self {
        if scenario == Scenario::SelfSign {
            self.send_in_order = false;
            self.automatic_reminders = false;
            self.reminder_interval_days = None;
        }
        self
    }
}
