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

//! Wildcard pattern matching for `tool_name` and `agent_id` conditions.
//!
//! `*` matches any run of characters (including none). Every other character,
//! regex metacharacters included, is literal. The whole subject must match.

use crate::engine_core::constants::policy::PATTERN_SIZE_LIMIT;
use crate::engine_core::errors::PipelineError;
use regex::{Regex, RegexBuilder};

#[derive(Debug, Clone)]
pub struct PatternMatcher {
    pattern: String,
    regex: Regex,
}

impl PatternMatcher {
    pub fn compile(pattern: &str) -> Result<Self, PipelineError> {
        let body = pattern
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join(".*");
        let regex = RegexBuilder::new(&format!("^(?s:{})$", body))
            .size_limit(PATTERN_SIZE_LIMIT)
            .build()
            .map_err(|e| {
                PipelineError::ConfigurationError(format!(
                    "Invalid pattern '{}': {}",
                    pattern, e
                ))
            })?;
        Ok(Self {
            pattern: pattern.to_string(),
            regex,
        })
    }

    pub fn is_match(&self, subject: &str) -> bool {
        self.regex.is_match(subject)
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// One-shot match. A pattern that fails to compile matches nothing.
    pub fn wildcard_match(pattern: &str, subject: &str) -> bool {
        Self::compile(pattern)
            .map(|m| m.is_match(subject))
            .unwrap_or(false)
    }
}
