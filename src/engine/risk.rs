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

//! Risk classification.
//!
//! Pure substring rules over the tool name and parameter keys. The tables live
//! in [`crate::engine_core::constants::risk`].

use crate::engine_core::constants::risk::{CRITICAL_TOOLS, HIGH_RISK_TOOLS, SENSITIVE_PARAMETERS};
use crate::engine_core::models::{RiskLevel, ToolExecutionRequest};

pub struct RiskAssessor;

impl RiskAssessor {
    /// Classify a request. First matching rule wins; nothing classifies as `low`.
    pub fn assess(request: &ToolExecutionRequest) -> RiskLevel {
        let tool_name = request.tool_name();

        if CRITICAL_TOOLS.iter().any(|t| tool_name.contains(t)) {
            return RiskLevel::Critical;
        }

        if HIGH_RISK_TOOLS.iter().any(|t| tool_name.contains(t)) {
            return RiskLevel::High;
        }

        if request.parameters().keys().any(|k| Self::is_sensitive_key(k)) {
            return RiskLevel::High;
        }

        RiskLevel::Medium
    }

    fn is_sensitive_key(key: &str) -> bool {
        let lowered = key.to_lowercase();
        SENSITIVE_PARAMETERS.iter().any(|s| lowered.contains(s))
    }
}
