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

//! Policy evaluation engine.
//!
//! `PolicyEngine` holds an ordered, pre-compiled policy set. Evaluation is
//! synchronous, deterministic and never fails: any internal error becomes a
//! fail-closed deny at critical risk.

use crate::engine::pattern_matcher::PatternMatcher;
use crate::engine::risk::RiskAssessor;
use crate::engine::transform;
use crate::engine_core::constants::policy::DEFAULT_POLICY_NAME;
use crate::engine_core::errors::PipelineError;
use crate::engine_core::models::{
    ComparisonOperator, DecisionMetadata, PolicyAction, PolicyCondition, RiskLevel,
    SecurityDecision, SecurityPolicy, ToolExecutionRequest,
};
use serde_json::Value;
use std::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
enum CompiledCondition {
    ToolName(PatternMatcher),
    AgentId(PatternMatcher),
    RiskLevel {
        operator: ComparisonOperator,
        value: RiskLevel,
    },
    ParameterExists(String),
    ParameterValue {
        name: String,
        value: Value,
    },
}

impl CompiledCondition {
    fn compile(condition: &PolicyCondition) -> Result<Self, PipelineError> {
        Ok(match condition {
            PolicyCondition::ToolName { pattern } => {
                CompiledCondition::ToolName(PatternMatcher::compile(pattern)?)
            }
            PolicyCondition::AgentId { pattern } => {
                CompiledCondition::AgentId(PatternMatcher::compile(pattern)?)
            }
            PolicyCondition::RiskLevel { operator, value } => CompiledCondition::RiskLevel {
                operator: *operator,
                value: *value,
            },
            PolicyCondition::ParameterExists { name } => {
                CompiledCondition::ParameterExists(name.clone())
            }
            PolicyCondition::ParameterValue { name, value } => CompiledCondition::ParameterValue {
                name: name.clone(),
                value: value.clone(),
            },
        })
    }

    fn matches(&self, request: &ToolExecutionRequest, risk: RiskLevel) -> bool {
        match self {
            CompiledCondition::ToolName(m) => m.is_match(request.tool_name()),
            CompiledCondition::AgentId(m) => m.is_match(request.agent_id()),
            CompiledCondition::RiskLevel { operator, value } => operator.compare(risk, *value),
            CompiledCondition::ParameterExists(name) => request.parameters().contains_key(name),
            CompiledCondition::ParameterValue { name, value } => {
                request.parameters().get(name) == Some(value)
            }
        }
    }
}

#[derive(Debug, Clone)]
struct CompiledPolicy {
    policy: SecurityPolicy,
    conditions: Vec<CompiledCondition>,
}

impl CompiledPolicy {
    fn compile(policy: SecurityPolicy) -> Result<Self, PipelineError> {
        if policy.name.trim().is_empty() {
            return Err(PipelineError::ValidationError(
                "Policy name cannot be empty".to_string(),
            ));
        }
        if policy.action == PolicyAction::Transform && policy.transformation.is_none() {
            return Err(PipelineError::ConfigurationError(format!(
                "Policy '{}' has action 'transform' but no transformation",
                policy.name
            )));
        }
        let conditions = policy
            .conditions
            .iter()
            .map(CompiledCondition::compile)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { policy, conditions })
    }

    fn matches(&self, request: &ToolExecutionRequest, risk: RiskLevel) -> bool {
        self.conditions.iter().all(|c| c.matches(request, risk))
    }
}

/// A decision together with the policy that produced it (`None` for the default).
#[derive(Debug)]
pub struct PolicyOutcome<'a> {
    pub decision: SecurityDecision,
    pub matched: Option<&'a SecurityPolicy>,
}

#[derive(Debug, Clone, Default)]
pub struct PolicyEngine {
    /// Sorted by priority ascending; ties keep registration order
    policies: Vec<CompiledPolicy>,
}

impl PolicyEngine {
    pub fn new(policies: Vec<SecurityPolicy>) -> Result<Self, PipelineError> {
        let mut engine = Self::default();
        for policy in policies {
            engine.add_policy(policy)?;
        }
        Ok(engine)
    }

    pub fn add_policy(&mut self, policy: SecurityPolicy) -> Result<(), PipelineError> {
        if self.policies.iter().any(|p| p.policy.name == policy.name) {
            return Err(PipelineError::ConfigurationError(format!(
                "Duplicate policy name '{}'",
                policy.name
            )));
        }
        let compiled = CompiledPolicy::compile(policy)?;
        let idx = self
            .policies
            .partition_point(|p| p.policy.priority <= compiled.policy.priority);
        self.policies.insert(idx, compiled);
        Ok(())
    }

    /// Policies in evaluation order
    pub fn policies(&self) -> impl Iterator<Item = &SecurityPolicy> {
        self.policies.iter().map(|p| &p.policy)
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }

    pub fn evaluate(&self, request: &ToolExecutionRequest) -> SecurityDecision {
        let risk = RiskAssessor::assess(request);
        self.evaluate_outcome(request, risk).decision
    }

    /// Evaluate with a precomputed risk level and report which policy matched.
    pub fn evaluate_outcome(&self, request: &ToolExecutionRequest, risk: RiskLevel) -> PolicyOutcome<'_> {
        let started = Instant::now();
        match self.try_evaluate(request, risk) {
            Ok((mut decision, matched)) => {
                decision.metadata.evaluation_time_ms = started.elapsed().as_millis() as u64;
                PolicyOutcome { decision, matched }
            }
            Err(e) => {
                warn!("Policy evaluation failed, denying request: {}", e);
                let mut decision = SecurityDecision::fail_closed(
                    request.agent_id(),
                    request.tool_name(),
                    format!("Policy evaluation failed: {}", e),
                );
                decision.metadata.evaluation_time_ms = started.elapsed().as_millis() as u64;
                PolicyOutcome {
                    decision,
                    matched: None,
                }
            }
        }
    }

    fn try_evaluate(
        &self,
        request: &ToolExecutionRequest,
        risk: RiskLevel,
    ) -> Result<(SecurityDecision, Option<&SecurityPolicy>), PipelineError> {
        for compiled in self.policies.iter().filter(|p| p.policy.enabled) {
            if !compiled.matches(request, risk) {
                continue;
            }
            let policy = &compiled.policy;
            debug!(policy = %policy.name, action = %policy.action, "Policy matched");

            let transformed_request = match policy.action {
                PolicyAction::Transform => {
                    let transformation = policy.transformation.as_ref().ok_or_else(|| {
                        PipelineError::PolicyEvaluationError(format!(
                            "Policy '{}' is missing its transformation",
                            policy.name
                        ))
                    })?;
                    Some(transform::apply(transformation, request))
                }
                _ => None,
            };

            let reason = if policy.reason.is_empty() {
                format!("Matched policy '{}'", policy.name)
            } else {
                policy.reason.clone()
            };

            let decision = SecurityDecision {
                request_id: Uuid::new_v4(),
                agent_id: request.agent_id().to_string(),
                tool_name: request.tool_name().to_string(),
                action: policy.action,
                reason,
                risk_level: risk,
                transformed_request,
                metadata: DecisionMetadata {
                    matched_policy: policy.name.clone(),
                    evaluation_time_ms: 0,
                    guardrails: None,
                },
            };
            return Ok((decision, Some(policy)));
        }

        let (action, reason) = if risk == RiskLevel::Critical {
            (
                PolicyAction::Deny,
                "No matching policy; critical risk requests are denied by default",
            )
        } else {
            (PolicyAction::Allow, "No matching policy; allowed by default")
        };
        debug!(%action, risk = %risk, "Default decision applied");

        Ok((
            SecurityDecision {
                request_id: Uuid::new_v4(),
                agent_id: request.agent_id().to_string(),
                tool_name: request.tool_name().to_string(),
                action,
                reason: reason.to_string(),
                risk_level: risk,
                transformed_request: None,
                metadata: DecisionMetadata {
                    matched_policy: DEFAULT_POLICY_NAME.to_string(),
                    evaluation_time_ms: 0,
                    guardrails: None,
                },
            },
            None,
        ))
    }
}
