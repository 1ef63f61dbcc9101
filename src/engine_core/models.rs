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

//! Domain models for the decision pipeline.
//!
//! This module contains pure data structures representing requests, policies,
//! transformations and decisions. It is designed to be free of I/O side effects.

use crate::engine_core::constants::policy::{DEFAULT_POLICY_NAME, DEFAULT_POLICY_PRIORITY};
use crate::engine_core::errors::PipelineError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use uuid::Uuid;

/// Ordered parameter map of a tool call
pub type Parameters = serde_json::Map<String, Value>;

/// A tool call submitted by an agent. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawToolExecutionRequest")]
pub struct ToolExecutionRequest {
    agent_id: String,
    tool_name: String,
    parameters: Parameters,
    #[serde(skip_serializing_if = "Option::is_none")]
    context: Option<Parameters>,
}

/// Wire shape before validation
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawToolExecutionRequest {
    agent_id: String,
    tool_name: String,
    #[serde(default)]
    parameters: Parameters,
    #[serde(default)]
    context: Option<Parameters>,
}

impl TryFrom<RawToolExecutionRequest> for ToolExecutionRequest {
    type Error = PipelineError;

    fn try_from(raw: RawToolExecutionRequest) -> Result<Self, Self::Error> {
        let request = ToolExecutionRequest::new(raw.agent_id, raw.tool_name, raw.parameters)?;
        Ok(match raw.context {
            Some(ctx) => request.with_context(ctx),
            None => request,
        })
    }
}

impl ToolExecutionRequest {
    pub fn new(
        agent_id: impl Into<String>,
        tool_name: impl Into<String>,
        parameters: Parameters,
    ) -> Result<Self, PipelineError> {
        let agent_id = agent_id.into();
        let tool_name = tool_name.into();
        if agent_id.trim().is_empty() {
            return Err(PipelineError::ValidationError(
                "agentId cannot be empty".to_string(),
            ));
        }
        if tool_name.trim().is_empty() {
            return Err(PipelineError::ValidationError(
                "toolName cannot be empty".to_string(),
            ));
        }
        Ok(Self {
            agent_id,
            tool_name,
            parameters,
            context: None,
        })
    }

    pub fn with_context(mut self, context: Parameters) -> Self {
        self.context = Some(context);
        self
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn parameters(&self) -> &Parameters {
        &self.parameters
    }

    pub fn context(&self) -> Option<&Parameters> {
        self.context.as_ref()
    }

    /// Copy of this request under a different tool name
    pub(crate) fn renamed(&self, tool_name: String) -> Self {
        Self {
            tool_name,
            ..self.clone()
        }
    }

    /// Copy of this request with replaced parameters
    pub(crate) fn with_parameters(&self, parameters: Parameters) -> Self {
        Self {
            parameters,
            ..self.clone()
        }
    }
}

/// Coarse ordinal risk classification, ordered low < medium < high < critical
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
            RiskLevel::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
pub enum ComparisonOperator {
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<=")]
    Lte,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "==")]
    Eq,
}

impl ComparisonOperator {
    pub fn compare(self, lhs: RiskLevel, rhs: RiskLevel) -> bool {
        match self {
            ComparisonOperator::Gte => lhs >= rhs,
            ComparisonOperator::Gt => lhs > rhs,
            ComparisonOperator::Lte => lhs <= rhs,
            ComparisonOperator::Lt => lhs < rhs,
            ComparisonOperator::Eq => lhs == rhs,
        }
    }
}

/// A single predicate over a request. Conditions in a policy are AND-combined.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PolicyCondition {
    /// `*` matches any run of characters; the whole name must match
    ToolName { pattern: String },
    AgentId { pattern: String },
    RiskLevel {
        operator: ComparisonOperator,
        value: RiskLevel,
    },
    ParameterExists { name: String },
    ParameterValue { name: String, value: Value },
}

/// Pure rewrite applied when a policy's action is `transform`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Transformation {
    ReadOnly,
    ParameterFilter {
        remove: BTreeSet<String>,
    },
    ParameterAnonymize {
        #[serde(alias = "names")]
        fields: BTreeSet<String>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "lowercase")]
pub enum PolicyAction {
    Allow,
    Deny,
    Transform,
}

impl std::fmt::Display for PolicyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyAction::Allow => write!(f, "allow"),
            PolicyAction::Deny => write!(f, "deny"),
            PolicyAction::Transform => write!(f, "transform"),
        }
    }
}

fn default_priority() -> i32 {
    DEFAULT_POLICY_PRIORITY
}

fn default_enabled() -> bool {
    true
}

/// Policy record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "schema", derive(schemars::JsonSchema))]
#[serde(rename_all = "camelCase")]
pub struct SecurityPolicy {
    pub name: String,
    /// Lower evaluates first
    #[serde(default = "default_priority")]
    pub priority: i32,
    #[serde(default)]
    pub conditions: Vec<PolicyCondition>,
    pub action: PolicyAction,
    #[serde(default)]
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformation: Option<Transformation>,
    /// Guardrails the pipeline runs when this policy matches
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub guardrails: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl SecurityPolicy {
    pub fn new(name: impl Into<String>, action: PolicyAction, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            priority: DEFAULT_POLICY_PRIORITY,
            conditions: Vec::new(),
            action,
            reason: reason.into(),
            transformation: None,
            guardrails: Vec::new(),
            enabled: true,
        }
    }

    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_condition(mut self, condition: PolicyCondition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn with_transformation(mut self, transformation: Transformation) -> Self {
        self.transformation = Some(transformation);
        self
    }

    pub fn with_guardrails<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.guardrails = names.into_iter().map(Into::into).collect();
        self
    }
}

/// Condensed guardrail verdict attached to a decision
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailSummary {
    pub passed: bool,
    pub max_risk_score: u8,
    pub failed_guardrails: Vec<String>,
    pub guardrails_executed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecisionMetadata {
    pub matched_policy: String,
    pub evaluation_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardrails: Option<GuardrailSummary>,
}

/// Final verdict for one request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityDecision {
    pub request_id: Uuid,
    pub agent_id: String,
    pub tool_name: String,
    pub action: PolicyAction,
    pub reason: String,
    pub risk_level: RiskLevel,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transformed_request: Option<ToolExecutionRequest>,
    pub metadata: DecisionMetadata,
}

impl SecurityDecision {
    /// Deny at critical risk, used whenever evaluation itself fails.
    pub fn fail_closed(
        agent_id: impl Into<String>,
        tool_name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            agent_id: agent_id.into(),
            tool_name: tool_name.into(),
            action: PolicyAction::Deny,
            reason: reason.into(),
            risk_level: RiskLevel::Critical,
            transformed_request: None,
            metadata: DecisionMetadata {
                matched_policy: DEFAULT_POLICY_NAME.to_string(),
                evaluation_time_ms: 0,
                guardrails: None,
            },
        }
    }

    pub fn is_denied(&self) -> bool {
        self.action == PolicyAction::Deny
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_risk_level_total_order() {
        assert!(RiskLevel::Low < RiskLevel::Medium);
        assert!(RiskLevel::Medium < RiskLevel::High);
        assert!(RiskLevel::High < RiskLevel::Critical);
    }

    #[test]
    fn test_request_rejects_empty_fields() {
        assert!(matches!(
            ToolExecutionRequest::new("", "file-read", Parameters::new()),
            Err(PipelineError::ValidationError(_))
        ));
        assert!(matches!(
            ToolExecutionRequest::new("agent-1", "  ", Parameters::new()),
            Err(PipelineError::ValidationError(_))
        ));
    }

    #[test]
    fn test_request_deserialization_validates() {
        let ok: ToolExecutionRequest = serde_json::from_value(json!({
            "agentId": "agent-1",
            "toolName": "file-read",
            "parameters": {"path": "/tmp/a"}
        }))
        .unwrap();
        assert_eq!(ok.tool_name(), "file-read");
        assert!(ok.context().is_none());

        let missing_params: ToolExecutionRequest =
            serde_json::from_value(json!({"agentId": "a", "toolName": "t"})).unwrap();
        assert!(missing_params.parameters().is_empty());

        let empty_agent = serde_json::from_value::<ToolExecutionRequest>(json!({
            "agentId": "",
            "toolName": "file-read"
        }));
        assert!(empty_agent.is_err());

        let null_params = serde_json::from_value::<ToolExecutionRequest>(json!({
            "agentId": "a",
            "toolName": "t",
            "parameters": null
        }));
        assert!(null_params.is_err());
    }

    #[test]
    fn test_policy_wire_format() {
        let policy: SecurityPolicy = serde_json::from_value(json!({
            "name": "strip-secrets",
            "priority": 5,
            "conditions": [
                {"type": "tool_name", "pattern": "database-*"},
                {"type": "risk_level", "operator": ">=", "value": "high"}
            ],
            "action": "transform",
            "reason": "secrets removed",
            "transformation": {"type": "parameter_filter", "remove": ["password"]}
        }))
        .unwrap();

        assert_eq!(policy.priority, 5);
        assert!(policy.enabled);
        assert_eq!(
            policy.conditions[1],
            PolicyCondition::RiskLevel {
                operator: ComparisonOperator::Gte,
                value: RiskLevel::High
            }
        );
        assert!(matches!(
            policy.transformation,
            Some(Transformation::ParameterFilter { .. })
        ));
    }

    #[test]
    fn test_policy_priority_defaults_to_last() {
        let policy: SecurityPolicy =
            serde_json::from_value(json!({"name": "p", "action": "allow"})).unwrap();
        assert_eq!(policy.priority, DEFAULT_POLICY_PRIORITY);
        assert!(policy.conditions.is_empty());
    }

    #[test]
    fn test_anonymize_accepts_names_alias() {
        let t: Transformation = serde_json::from_value(json!({
            "type": "parameter_anonymize",
            "names": ["email"]
        }))
        .unwrap();
        assert_eq!(
            t,
            Transformation::ParameterAnonymize {
                fields: BTreeSet::from(["email".to_string()])
            }
        );
    }

    #[test]
    fn test_decision_serializes_camel_case() {
        let decision = SecurityDecision::fail_closed("agent-1", "tool", "boom");
        let value = serde_json::to_value(&decision).unwrap();
        assert_eq!(value["action"], "deny");
        assert_eq!(value["riskLevel"], "critical");
        assert_eq!(value["metadata"]["matchedPolicy"], "default");
        assert!(value.get("transformedRequest").is_none());
    }
}
