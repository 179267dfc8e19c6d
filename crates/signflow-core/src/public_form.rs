//! Public-form required-field policy
//!
//! A public document carries a small policy describing which submitter
//! attributes are mandatory. Validation runs before anything is
//! persisted and reports per-field hints suitable for direct display.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Required-field policy stored on a public document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicFormConfig {
    #[serde(default)]
    pub name: bool,
    #[serde(default)]
    pub email: bool,
    #[serde(default)]
    pub phone: bool,
}

impl PublicFormConfig {
    /// Check a submission against the policy. `Err` carries a field ->
    /// hint map keyed `name`/`email`/`phone`; nothing may be persisted
    /// when it is non-empty.
    pub fn validate(
        &self,
        name: Option<&str>,
        email: Option<&str>,
        phone: Option<&str>,
    ) -> Result<(), BTreeMap<String, String>> {
        let mut errors = BTreeMap::new();
        let missing = |v: Option<&str>| v.map(|s| s.trim().is_empty()).unwrap_or(true);

        if self.name && missing(name) {
            errors.insert("name".to_string(), "This field is required.".to_string());
        }
        if self.email && missing(email) {
            errors.insert("email".to_string(), "This field is required.".to_string());
        } else if let Some(email) = email {
            // Light shape check only; real verification is delivery's problem.
            if !email.trim().is_empty() && !email.contains('@') {
                errors.insert("email".to_string(), "Enter a valid email address.".to_string());
            }
        }
        if self.phone && missing(phone) {
            errors.insert("phone".to_string(), "This field is required.".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_required_email_is_reported() {
        let cfg = PublicFormConfig {
            email: true,
            ..Default::default()
        };
        let errors = cfg.validate(Some("Ada"), None, None).unwrap_err();
        assert!(errors.contains_key("email"));
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn empty_policy_accepts_anonymous() {
        let cfg = PublicFormConfig::default();
        assert!(cfg.validate(None, None, None).is_ok());
    }

    #[test]
    fn whitespace_does_not_satisfy_requirement() {
        let cfg = PublicFormConfig {
            name: true,
            ..Default::default()
        };
        assert!(cfg.validate(Some("   "), None, None).is_err());
    }

    #[test]
    fn malformed_email_is_rejected_even_when_optional() {
        let cfg = PublicFormConfig::default();
        let errors = cfg.validate(None, Some("not-an-email"), None).unwrap_err();
        assert!(errors.contains_key("email"));
    }

    #[test]
    fn all_required_all_present() {
        let cfg = PublicFormConfig {
            name: true,
            email: true,
            phone: true,
        };
        assert!(cfg
            .validate(Some("Ada"), Some("ada@example.com"), Some("+15550100"))
            .is_ok());
    }
}
