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

//! Prompt injection detection.
//!
//! Scans text against six pattern families, each with a fixed risk score.
//! The verdict depends on how many independent matches were found relative to
//! the configured sensitivity.

use crate::engine_core::constants::guardrails::PROMPT_INJECTION;
use crate::engine_core::errors::PipelineError;
use crate::guardrails::{extract_text, Guardrail, GuardrailAction, GuardrailResult};
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub const FILTERED_INJECTION_PLACEHOLDER: &str = "[FILTERED_INJECTION]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InjectionFamily {
    InstructionInjection,
    RolePlaying,
    SystemLeakage,
    Jailbreak,
    Encoding,
    Delimiter,
}

impl InjectionFamily {
    pub const ALL: [InjectionFamily; 6] = [
        InjectionFamily::InstructionInjection,
        InjectionFamily::RolePlaying,
        InjectionFamily::SystemLeakage,
        InjectionFamily::Jailbreak,
        InjectionFamily::Encoding,
        InjectionFamily::Delimiter,
    ];

    pub fn risk_score(self) -> u8 {
        match self {
            InjectionFamily::Jailbreak => 100,
            InjectionFamily::SystemLeakage => 95,
            InjectionFamily::InstructionInjection => 90,
            InjectionFamily::Delimiter => 85,
            InjectionFamily::Encoding => 80,
            InjectionFamily::RolePlaying => 70,
        }
    }

    fn patterns(self) -> &'static [&'static str] {
        match self {
            InjectionFamily::InstructionInjection => &[
                r"\b(?:ignore|disregard|forget|override)\s+(?:all\s+)?(?:of\s+)?(?:the\s+|your\s+)?(?:previous|prior|above|earlier|preceding)\s+(?:instructions?|prompts?|rules?|directions?|context)\b",
                r"\bnew\s+instructions?\s*:",
            ],
            InjectionFamily::RolePlaying => &[
                r"\byou\s+are\s+now\s+(?:an?\s+)?\w+",
                r"\bpretend\s+(?:to\s+be|you\s+are)\b",
                r"\b(?:roleplay|role-play)\s+as\b",
                r"\bact\s+as\s+(?:if\s+you\s+(?:are|were)|an?\s+unrestricted)\b",
            ],
            InjectionFamily::SystemLeakage => &[
                r"\b(?:reveal|show|print|repeat|output|display)\s+(?:me\s+)?(?:your|the)\s+(?:system\s+prompt|initial\s+instructions|hidden\s+instructions|original\s+prompt)\b",
                r"\bwhat\s+(?:is|are)\s+your\s+(?:system\s+prompt|hidden\s+instructions|initial\s+instructions)\b",
            ],
            InjectionFamily::Jailbreak => &[
                r"\bDAN\s+mode\b",
                r"\bdo\s+anything\s+now\b",
                r"\bjailbr(?:eak|oken)\w*\b",
                r"\bdeveloper\s+mode\s+(?:enabled|on)\b",
                r"\bwithout\s+any\s+(?:restrictions|filters|limitations)\b",
            ],
            InjectionFamily::Encoding => &[
                r"\b(?:base64|rot13)\b",
                r"\b(?:decode|decrypt)\s+(?:this|the\s+following)\b",
                r"(?:\\x[0-9a-f]{2}){4,}",
            ],
            InjectionFamily::Delimiter => &[
                r"###\s*(?:system|instructions?|end)\b",
                r"<\|(?:im_start|im_end|system|endoftext)\|>",
                r"\[/?(?:INST|SYS)\]",
                r"</?system>",
            ],
        }
    }
}

/// Match-count threshold. `low` needs at least two independent matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sensitivity {
    Low,
    #[default]
    Medium,
    High,
}

impl Sensitivity {
    pub fn threshold(self) -> usize {
        match self {
            Sensitivity::Low => 2,
            Sensitivity::Medium | Sensitivity::High => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjectionAction {
    #[default]
    Block,
    Transform,
    Allow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InjectionConfig {
    pub enabled: bool,
    pub sensitivity: Sensitivity,
    pub action: InjectionAction,
}

impl Default for InjectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sensitivity: Sensitivity::Medium,
            action: InjectionAction::Block,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InjectionDetection {
    #[serde(rename = "type")]
    pub family: InjectionFamily,
    #[serde(rename = "match")]
    pub matched: String,
    pub risk_score: u8,
}

pub struct PromptInjectionGuardrail {
    config: InjectionConfig,
    patterns: Vec<(InjectionFamily, Regex)>,
}

impl PromptInjectionGuardrail {
    pub fn new(config: InjectionConfig) -> Result<Self, PipelineError> {
        let mut patterns = Vec::new();
        for family in InjectionFamily::ALL {
            for pattern in family.patterns() {
                let re = RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| PipelineError::ConfigurationError(format!("Injection pattern {:?}: {}", family, e)))?;
                patterns.push((family, re));
            }
        }
        Ok(Self { config, patterns })
    }

    pub fn detect(&self, text: &str) -> Vec<InjectionDetection> {
        self.patterns
            .iter()
            .flat_map(|(family, re)| {
                re.find_iter(text).map(move |m| InjectionDetection {
                    family: *family,
                    matched: m.as_str().to_string(),
                    risk_score: family.risk_score(),
                })
            })
            .collect()
    }

    /// Replace matched text, longest first, so a shorter match inside a longer one
    /// does not split it.
    fn filter_text(text: &str, detections: &[InjectionDetection]) -> String {
        let mut matches: Vec<&str> = detections.iter().map(|d| d.matched.as_str()).collect();
        matches.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
        matches.dedup();
        matches
            .into_iter()
            .fold(text.to_string(), |acc, m| acc.replace(m, FILTERED_INJECTION_PLACEHOLDER))
    }
}

#[async_trait]
impl Guardrail for PromptInjectionGuardrail {
    fn name(&self) -> &str {
        PROMPT_INJECTION
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    async fn evaluate(&self, input: &Value, _context: &Value) -> Result<GuardrailResult, PipelineError> {
        let text = extract_text(input);
        let detections = self.detect(&text);
        let match_count = detections.len();

        if match_count < self.config.sensitivity.threshold() {
            return Ok(GuardrailResult::pass("No prompt injection detected")
                .with_metadata("matchCount", json!(match_count)));
        }

        let risk_score = detections.iter().map(|d| d.risk_score).max().unwrap_or(0);
        let reason = format!("Prompt injection detected ({} pattern matches)", match_count);
        let (passed, action) = match self.config.action {
            InjectionAction::Block => (false, GuardrailAction::Block),
            InjectionAction::Transform => (true, GuardrailAction::Transform),
            InjectionAction::Allow => (true, GuardrailAction::Allow),
        };

        let mut result = GuardrailResult::new(passed, action, reason, risk_score)
            .with_metadata("matchCount", json!(match_count))
            .with_metadata("detections", json!(detections));
        if self.config.action == InjectionAction::Transform {
            result = result.with_metadata("filteredText", json!(Self::filter_text(&text, &detections)));
        }
        Ok(result)
    }
}
