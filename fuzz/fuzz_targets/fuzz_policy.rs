// Copyright 2026 BadCompany
// Licensed under the Apache License, Version 2.0

#![no_main]

use arbitrary::{Arbitrary, Unstructured};
use libfuzzer_sys::fuzz_target;
use toolgate::engine::evaluator::PolicyEngine;
use toolgate::engine::pattern_matcher::PatternMatcher;
use toolgate::engine_core::models::{Parameters, PolicyCondition};
use toolgate::loader::policy_loader::{PolicyFormat, PolicyLoader};
use toolgate::{PolicyAction, SecurityPolicy, ToolExecutionRequest};

/// Structured request plus a pattern to exercise wildcard compilation.
#[derive(Debug, Arbitrary)]
struct FuzzPolicyInput {
    agent_id: String,
    tool_name: String,
    arg_key: String,
    arg_value: String,
    pattern: String,
    priority: i32,
}

fuzz_target!(|data: &[u8]| {
    let mut unstructured = Unstructured::new(data);

    if let Ok(input) = FuzzPolicyInput::arbitrary(&mut unstructured) {
        let mut params = Parameters::new();
        params.insert(input.arg_key.clone(), serde_json::Value::String(input.arg_value));
        let Ok(request) = ToolExecutionRequest::new(input.agent_id, input.tool_name.clone(), params) else {
            return;
        };

        if let Ok(matcher) = PatternMatcher::compile(&input.pattern) {
            // A pattern without wildcards matches itself
            if !input.pattern.contains('*') {
                assert!(matcher.is_match(&input.pattern));
            }
        }

        let policy = SecurityPolicy::new("fuzz", PolicyAction::Deny, "")
            .with_priority(input.priority)
            .with_condition(PolicyCondition::ToolName { pattern: input.pattern })
            .with_condition(PolicyCondition::ParameterExists { name: input.arg_key });
        if let Ok(engine) = PolicyEngine::new(vec![policy]) {
            let decision = engine.evaluate(&request);
            assert_eq!(decision.tool_name, input.tool_name);
        }
    }

    // Raw policy documents in both formats
    if let Ok(text) = std::str::from_utf8(data) {
        let _ = PolicyLoader::from_str(text, PolicyFormat::Yaml);
        let _ = PolicyLoader::from_str(text, PolicyFormat::Json);
    }
});
