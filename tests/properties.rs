use proptest::prelude::*;
use serde_json::{json, Value};
use toolgate::engine::evaluator::PolicyEngine;
use toolgate::engine::pattern_matcher::PatternMatcher;
use toolgate::engine::risk::RiskAssessor;
use toolgate::engine_core::models::{Parameters, PolicyCondition};
use toolgate::guardrails::{extract_text, PiiConfig, PiiDetectionGuardrail, PiiType};
use toolgate::{PolicyAction, RiskLevel, SecurityPolicy, ToolExecutionRequest};

fn request(tool: &str, params: Parameters) -> ToolExecutionRequest {
    ToolExecutionRequest::new("agent", tool, params).unwrap()
}

fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "\\PC*".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..4)
                .prop_map(|m| Value::Object(m.into_iter().collect())),
        ]
    })
}

proptest! {
    #[test]
    fn test_critical_fragment_always_critical(
        prefix in "[a-z-]{0,10}",
        suffix in "[a-z-]{0,10}",
    ) {
        let tool = format!("{}system-admin{}", prefix, suffix);
        prop_assert_eq!(RiskAssessor::assess(&request(&tool, Parameters::new())), RiskLevel::Critical);
    }

    #[test]
    fn test_sensitive_key_at_least_high(
        prefix in "[A-Za-z]{0,6}",
        tool in "[a-z]{3,12}",
    ) {
        let mut params = Parameters::new();
        params.insert(format!("{}Password", prefix), json!("x"));
        prop_assert!(RiskAssessor::assess(&request(&tool, params)) >= RiskLevel::High);
    }

    #[test]
    fn test_literal_pattern_matches_only_itself(
        pattern in "[a-zA-Z0-9._+?()|\\[\\]-]{1,16}",
        other in "[a-zA-Z0-9._-]{1,16}",
    ) {
        let matcher = PatternMatcher::compile(&pattern).unwrap();
        prop_assert!(matcher.is_match(&pattern));
        prop_assert_eq!(matcher.is_match(&other), other == pattern);
    }

    #[test]
    fn test_trailing_wildcard_matches_any_suffix(
        prefix in "[a-z-]{0,10}",
        suffix in "\\PC*",
    ) {
        let pattern = format!("{}*", prefix);
        let candidate = format!("{}{}", prefix, suffix);
        prop_assert!(PatternMatcher::wildcard_match(&pattern, &candidate));
    }

    #[test]
    fn test_evaluate_is_deterministic(
        tool in "[a-z]{1,6}-[a-z]{1,6}",
        key in "[a-z]{1,8}",
        priorities in prop::collection::vec(0..5i32, 1..6),
    ) {
        let policies = priorities
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let action = if i % 2 == 0 { PolicyAction::Allow } else { PolicyAction::Deny };
                SecurityPolicy::new(format!("p{}", i), action, "")
                    .with_priority(*p)
                    .with_condition(PolicyCondition::ToolName { pattern: "*-*".to_string() })
            })
            .collect();
        let engine = PolicyEngine::new(policies).unwrap();
        let mut params = Parameters::new();
        params.insert(key, json!(1));
        let req = request(&tool, params);

        let first = engine.evaluate(&req);
        let second = engine.evaluate(&req);
        prop_assert_eq!(first.action, second.action);
        prop_assert_eq!(&first.metadata.matched_policy, &second.metadata.matched_policy);
        prop_assert_eq!(first.risk_level, second.risk_level);

        // Lowest priority wins; ties go to the earliest registered
        let min = priorities.iter().min().unwrap();
        let winner = priorities.iter().position(|p| p == min).unwrap();
        prop_assert_eq!(first.metadata.matched_policy, format!("p{}", winner));
    }

    #[test]
    fn test_redaction_leaves_no_detections(
        words in prop::collection::vec("[a-z]{1,8}", 0..6),
        users in prop::collection::vec("[a-z]{1,8}", 1..4),
    ) {
        let guardrail = PiiDetectionGuardrail::new(PiiConfig {
            detect_types: vec![PiiType::Email, PiiType::Phone, PiiType::Ssn],
            ..PiiConfig::default()
        })
        .unwrap();

        let mut parts = words.clone();
        for user in &users {
            parts.push(format!("{}@example.org", user));
        }
        parts.push("555-123-4567".to_string());
        let text = parts.join(" ");

        let detections = guardrail.detect(&text);
        prop_assert_eq!(detections.len(), users.len() + 1);
        let redacted = guardrail.redact(&text, &detections, false);
        prop_assert!(guardrail.detect(&redacted).is_empty());
    }

    #[test]
    fn test_extract_text_never_panics(value in arb_json()) {
        let _ = extract_text(&value);
    }
}
