// Copyright 2026 BadCompany
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

// Comprehensive policy validation - fail-fast at config load time

use crate::engine::pattern_matcher::PatternMatcher;
use crate::engine_core::errors::PipelineError;
use crate::engine_core::models::{PolicyAction, PolicyCondition, SecurityPolicy, Transformation};

use std::collections::HashSet;

/// Validates policy definitions for structural correctness and semantic consistency
pub struct PolicyValidator;

impl PolicyValidator {
    /// Validate a whole set - call after loading from disk
    pub fn validate_policies(policies: &[SecurityPolicy]) -> Result<(), PipelineError> {
        let mut seen = HashSet::new();
        for policy in policies {
            Self::validate_policy(policy)?;
            if !seen.insert(policy.name.as_str()) {
                return Err(PipelineError::ConfigurationError(format!(
                    "Duplicate policy name '{}'",
                    policy.name
                )));
            }
        }
        Ok(())
    }

    /// Validate a single policy definition
    pub fn validate_policy(policy: &SecurityPolicy) -> Result<(), PipelineError> {
        if policy.name.trim().is_empty() {
            return Err(PipelineError::ValidationError(
                "Policy name cannot be empty".to_string(),
            ));
        }

        match (policy.action, &policy.transformation) {
            (PolicyAction::Transform, None) => {
                return Err(PipelineError::ConfigurationError(format!(
                    "Policy '{}': action 'transform' requires a transformation",
                    policy.name
                )));
            }
            (PolicyAction::Allow | PolicyAction::Deny, Some(_)) => {
                return Err(PipelineError::ConfigurationError(format!(
                    "Policy '{}': transformation is only valid with action 'transform'",
                    policy.name
                )));
            }
            (_, Some(t)) => Self::validate_transformation(t, &policy.name)?,
            _ => {}
        }

        for (idx, condition) in policy.conditions.iter().enumerate() {
            let context = format!("Policy '{}', condition #{}", policy.name, idx + 1);
            Self::validate_condition(condition, &context)?;
        }

        if policy.guardrails.iter().any(|g| g.trim().is_empty()) {
            return Err(PipelineError::ConfigurationError(format!(
                "Policy '{}': guardrail names cannot be empty",
                policy.name
            )));
        }

        Ok(())
    }

    fn validate_condition(condition: &PolicyCondition, context: &str) -> Result<(), PipelineError> {
        match condition {
            PolicyCondition::ToolName { pattern } | PolicyCondition::AgentId { pattern } => {
                if pattern.is_empty() {
                    return Err(PipelineError::ValidationError(format!(
                        "{}: pattern cannot be empty",
                        context
                    )));
                }
                PatternMatcher::compile(pattern).map(|_| ())
            }
            PolicyCondition::ParameterExists { name } | PolicyCondition::ParameterValue { name, .. } => {
                if name.is_empty() {
                    return Err(PipelineError::ValidationError(format!(
                        "{}: parameter name cannot be empty",
                        context
                    )));
                }
                Ok(())
            }
            PolicyCondition::RiskLevel { .. } => Ok(()),
        }
    }

    fn validate_transformation(transformation: &Transformation, policy_name: &str) -> Result<(), PipelineError> {
        let (kind, names) = match transformation {
            Transformation::ReadOnly => return Ok(()),
            Transformation::ParameterFilter { remove } => ("parameter_filter", remove),
            Transformation::ParameterAnonymize { fields } => ("parameter_anonymize", fields),
        };
        if names.is_empty() {
            return Err(PipelineError::ConfigurationError(format!(
                "Policy '{}': {} must name at least one parameter",
                policy_name, kind
            )));
        }
        Ok(())
    }

    /// Ensure every guardrail a policy references is actually registered
    pub fn validate_guardrail_references(policies: &[SecurityPolicy], registered: &[&str]) -> Result<(), PipelineError> {
        for policy in policies {
            for name in &policy.guardrails {
                if !registered.contains(&name.as_str()) {
                    return Err(PipelineError::ConfigurationError(format!(
                        "Policy '{}' references unknown guardrail '{}' (registered: {})",
                        policy.name,
                        name,
                        registered.join(", ")
                    )));
                }
            }
        }
        Ok(())
    }
}
