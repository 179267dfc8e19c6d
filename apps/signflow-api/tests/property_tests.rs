//! Property-based tests for signflow-api
//!
//! Exercises token shape, status machines, completion derivation, and
//! the public-form policy using proptest.

use proptest::prelude::*;

use signflow_core::{
    derive_completed, derived_widget_name, effective_status, generate_token, validate_placement,
    DocumentStatus, PublicFormConfig, Scenario, SessionStatus, SigningConfig, TOKEN_LEN,
};

// ============================================================
// Strategies
// ============================================================

fn session_status() -> impl Strategy<Value = SessionStatus> {
    prop_oneof![
        Just(SessionStatus::Pending),
        Just(SessionStatus::InProgress),
        Just(SessionStatus::Completed),
        Just(SessionStatus::Expired),
    ]
}

fn document_status() -> impl Strategy<Value = DocumentStatus> {
    prop_oneof![
        Just(DocumentStatus::Pending),
        Just(DocumentStatus::InProgress),
        Just(DocumentStatus::Completed),
        Just(DocumentStatus::Declined),
    ]
}

fn scenario() -> impl Strategy<Value = Scenario> {
    prop_oneof![
        Just(Scenario::SelfSign),
        Just(Scenario::Request),
        Just(Scenario::Template),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // ============================================================
    // Token Tests
    // ============================================================

    #[test]
    fn tokens_are_always_32_lowercase_hex(_seed in 0u32..100) {
        let token = generate_token();
        prop_assert_eq!(token.len(), TOKEN_LEN);
        let pattern = regex::Regex::new(r"^[0-9a-f]{32}$").unwrap();
        prop_assert!(pattern.is_match(&token));
    }

    // ============================================================
    // Status Machine Tests
    // ============================================================

    #[test]
    fn session_terminal_states_are_final(from in session_status(), to in session_status()) {
        if from.is_terminal() {
            prop_assert!(!from.can_transition(to));
        }
    }

    #[test]
    fn session_status_strings_roundtrip(status in session_status()) {
        prop_assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
    }

    #[test]
    fn document_status_never_moves_backward(from in document_status(), to in document_status()) {
        // The only "backward" edge is the explicit declined -> in_progress resend.
        use DocumentStatus::*;
        if from.can_transition(to) {
            let is_resend = from == Declined && to == InProgress;
            prop_assert!(is_resend || matches!(
                (from, to),
                (Pending, InProgress) | (Pending, Declined) | (InProgress, Completed) | (InProgress, Declined)
            ));
        }
    }

    #[test]
    fn expiry_only_affects_live_sessions(status in session_status(), offset_secs in -86_400i64..86_400) {
        let now = chrono::Utc::now();
        let expires = now + chrono::Duration::seconds(offset_secs);
        let effective = effective_status(status, expires, now);
        if status.is_terminal() {
            prop_assert_eq!(effective, status);
        } else if offset_secs <= 0 {
            prop_assert_eq!(effective, SessionStatus::Expired);
        } else {
            prop_assert_eq!(effective, status);
        }
    }

    // ============================================================
    // Completion Derivation Tests
    // ============================================================

    #[test]
    fn completion_follows_value_presence(
        value in proptest::option::of("[ a-zA-Z0-9]{0,20}"),
        signature in proptest::option::of("[a-zA-Z0-9+/=]{0,40}"),
        forced in any::<bool>()
    ) {
        let completed = derive_completed(value.as_deref(), signature.as_deref(), forced);
        let has_value = value.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false);
        let has_signature = signature.as_deref().map(|v| !v.trim().is_empty()).unwrap_or(false);
        prop_assert_eq!(completed, forced || has_value || has_signature);
    }

    // ============================================================
    // Placement Validation Tests
    // ============================================================

    #[test]
    fn positive_geometry_is_accepted(
        page in 1i64..1000,
        width in 1.0f64..500.0,
        height in 1.0f64..500.0
    ) {
        prop_assert!(validate_placement(page, width, height).is_ok());
    }

    #[test]
    fn non_positive_pages_are_rejected(page in -1000i64..1) {
        prop_assert!(validate_placement(page, 100.0, 40.0).is_err());
    }

    // ============================================================
    // Config Normalization Tests
    // ============================================================

    #[test]
    fn self_sign_always_disables_ordered_delivery(
        send_in_order in any::<bool>(),
        automatic_reminders in any::<bool>(),
        sc in scenario()
    ) {
        let cfg = SigningConfig {
            send_in_order,
            automatic_reminders,
            ..Default::default()
        };
        let normalized = cfg.normalized_for(sc);
        if sc == Scenario::SelfSign {
            prop_assert!(!normalized.send_in_order);
            prop_assert!(!normalized.automatic_reminders);
        } else {
            prop_assert_eq!(normalized.send_in_order, send_in_order);
            prop_assert_eq!(normalized.automatic_reminders, automatic_reminders);
        }
    }

    // ============================================================
    // Widget Name Derivation Tests
    // ============================================================

    #[test]
    fn widget_names_are_deterministic(
        widget_type in "[a-z]{3,10}",
        label in "[ a-zA-Z0-9]{0,30}"
    ) {
        let a = derived_widget_name(&widget_type, &label);
        let b = derived_widget_name(&widget_type, &label);
        prop_assert_eq!(a.clone(), b);
        prop_assert!(a.starts_with(&widget_type));
        prop_assert!(!a.contains(' '));
    }

    // ============================================================
    // Public Form Policy Tests
    // ============================================================

    #[test]
    fn required_attributes_always_produce_error_keys(
        require_name in any::<bool>(),
        require_email in any::<bool>(),
        require_phone in any::<bool>()
    ) {
        let cfg = PublicFormConfig {
            name: require_name,
            email: require_email,
            phone: require_phone,
        };
        match cfg.validate(None, None, None) {
            Ok(()) => {
                prop_assert!(!require_name && !require_email && !require_phone);
            }
            Err(errors) => {
                prop_assert_eq!(errors.contains_key("name"), require_name);
                prop_assert_eq!(errors.contains_key("email"), require_email);
                prop_assert_eq!(errors.contains_key("phone"), require_phone);
            }
        }
    }

    #[test]
    fn satisfied_policy_never_errors(
        name in "[A-Za-z]{1,20}",
        local in "[a-z]{1,10}",
        domain in "[a-z]{2,10}",
        phone in "[0-9]{7,12}"
    ) {
        let cfg = PublicFormConfig { name: true, email: true, phone: true };
        let email = format!("{}@{}.com", local, domain);
        prop_assert!(cfg.validate(Some(&name), Some(&email), Some(&phone)).is_ok());
    }
}

// ============================================================
// Unit Tests (non-property)
// ============================================================

mod unit_tests {
    use signflow_core::{generate_token, SessionStatus, SESSION_TTL_DAYS};
    use std::collections::HashSet;

    #[test]
    fn test_token_uniqueness_over_batch() {
        let tokens: HashSet<String> = (0..500).map(|_| generate_token()).collect();
        assert_eq!(tokens.len(), 500);
    }

    #[test]
    fn test_default_ttl_is_30_days() {
        assert_eq!(SESSION_TTL_DAYS, 30);
    }

    #[test]
    fn test_session_status_display() {
        assert_eq!(SessionStatus::InProgress.to_string(), "in_progress");
        assert_eq!(SessionStatus::Pending.to_string(), "pending");
    }
}
