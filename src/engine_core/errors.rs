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

// Domain error types for the decision pipeline

use thiserror::Error;

/// Main error type for the decision pipeline
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Invalid registration or definition (policy, transformation, guardrail)
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Malformed request or condition
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A guardrail returned an error
    #[error("Guardrail '{guardrail}' failed: {message}")]
    GuardrailExecutionError { guardrail: String, message: String },

    /// A guardrail did not resolve before its deadline
    #[error("Guardrail '{guardrail}' timed out after {timeout_ms}ms")]
    GuardrailTimeout { guardrail: String, timeout_ms: u64 },

    /// Internal failure while matching policies
    #[error("Policy evaluation error: {0}")]
    PolicyEvaluationError(String),

    /// I/O Error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// YAML parse error
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml_ng::Error),
}

impl PipelineError {
    /// Build an execution error for a named guardrail.
    pub fn guardrail(guardrail: impl Into<String>, message: impl Into<String>) -> Self {
        PipelineError::GuardrailExecutionError {
            guardrail: guardrail.into(),
            message: message.into(),
        }
    }

    /// True for errors raised by a guardrail run (error or timeout).
    pub fn is_guardrail_failure(&self) -> bool {
        matches!(
            self,
            PipelineError::GuardrailExecutionError { .. } | PipelineError::GuardrailTimeout { .. }
        )
    }
}
