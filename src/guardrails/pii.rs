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

//! PII detection and redaction.

use crate::engine_core::constants::guardrails::PII_DETECTION;
use crate::engine_core::errors::PipelineError;
use crate::guardrails::{extract_text, remove_overlaps, Guardrail, GuardrailAction, GuardrailResult};
use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PiiType {
    Email,
    Phone,
    Ssn,
    CreditCard,
    Name,
}

impl PiiType {
    pub fn as_str(self) -> &'static str {
        match self {
            PiiType::Email => "email",
            PiiType::Phone => "phone",
            PiiType::Ssn => "ssn",
            PiiType::CreditCard => "creditCard",
            PiiType::Name => "name",
        }
    }

    pub fn default_score(self) -> u8 {
        match self {
            PiiType::Email => 30,
            PiiType::Phone => 40,
            PiiType::Ssn => 90,
            PiiType::CreditCard => 95,
            PiiType::Name => 20,
        }
    }

    fn pattern(self) -> &'static str {
        match self {
            PiiType::Email => r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}",
            PiiType::Phone => r"\b(?:\+?1[-.\s]?)?\(?\d{3}\)?[-.\s]?\d{3}[-.\s]?\d{4}\b",
            PiiType::Ssn => r"\b\d{3}-\d{2}-\d{4}\b",
            PiiType::CreditCard => r"\b(?:\d{4}[-\s]?){3}\d{4}\b",
            PiiType::Name => r"\b[A-Z][a-z]+\s[A-Z][a-z]+\b",
        }
    }

    /// `[REDACTED_<TYPE>]`
    fn redaction_label(self) -> String {
        format!("[REDACTED_{}]", self.as_str().to_uppercase())
    }
}

/// What to do when PII is found. Only `block` fails the check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PiiAction {
    Block,
    #[default]
    Redact,
    Mask,
    Allow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PiiConfig {
    pub enabled: bool,
    pub detect_types: Vec<PiiType>,
    pub action: PiiAction,
    /// Per-type overrides of [`PiiType::default_score`]
    pub risk_scores: BTreeMap<PiiType, u8>,
}

impl Default for PiiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            // Names are noisy; opt in explicitly
            detect_types: vec![PiiType::Email, PiiType::Phone, PiiType::Ssn, PiiType::CreditCard],
            action: PiiAction::Redact,
            risk_scores: BTreeMap::new(),
        }
    }
}

impl PiiConfig {
    fn score(&self, pii_type: PiiType) -> u8 {
        self.risk_scores
            .get(&pii_type)
            .copied()
            .unwrap_or_else(|| pii_type.default_score())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PiiDetection {
    #[serde(rename = "type")]
    pub pii_type: PiiType,
    pub value: String,
    /// Byte offsets into the scanned text
    pub start: usize,
    pub end: usize,
}

pub struct PiiDetectionGuardrail {
    config: PiiConfig,
    patterns: Vec<(PiiType, Regex)>,
}

impl PiiDetectionGuardrail {
    pub fn new(config: PiiConfig) -> Result<Self, PipelineError> {
        let patterns = config
            .detect_types
            .iter()
            .map(|t| {
                Regex::new(t.pattern())
                    .map(|re| (*t, re))
                    .map_err(|e| PipelineError::ConfigurationError(format!("PII pattern {}: {}", t.as_str(), e)))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { config, patterns })
    }

    /// Non-overlapping detections ordered by position. At equal start the longer match wins.
    pub fn detect(&self, text: &str) -> Vec<PiiDetection> {
        let mut found: Vec<PiiDetection> = self
            .patterns
            .iter()
            .flat_map(|(t, re)| {
                re.find_iter(text).map(move |m| PiiDetection {
                    pii_type: *t,
                    value: m.as_str().to_string(),
                    start: m.start(),
                    end: m.end(),
                })
            })
            .collect();
        found.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
        remove_overlaps(found, |d| (d.start, d.end))
    }

    /// Apply redaction or masking right-to-left so earlier offsets stay valid.
    pub fn redact(&self, text: &str, detections: &[PiiDetection], mask: bool) -> String {
        let mut out = text.to_string();
        for d in detections.iter().rev() {
            let replacement = if mask {
                "*".repeat(d.value.chars().count())
            } else {
                d.pii_type.redaction_label()
            };
            out.replace_range(d.start..d.end, &replacement);
        }
        out
    }
}

#[async_trait]
impl Guardrail for PiiDetectionGuardrail {
    fn name(&self) -> &str {
        PII_DETECTION
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    async fn evaluate(&self, input: &Value, _context: &Value) -> Result<GuardrailResult, PipelineError> {
        let text = extract_text(input);
        let detections = self.detect(&text);
        if detections.is_empty() {
            return Ok(GuardrailResult::pass("No PII detected"));
        }

        let risk_score = detections
            .iter()
            .map(|d| self.config.score(d.pii_type))
            .max()
            .unwrap_or(0);
        let mut types: Vec<&str> = detections.iter().map(|d| d.pii_type.as_str()).collect();
        types.sort_unstable();
        types.dedup();
        let reason = format!("Detected PII: {}", types.join(", "));

        let (passed, action) = match self.config.action {
            PiiAction::Block => (false, GuardrailAction::Block),
            PiiAction::Redact => (true, GuardrailAction::Redact),
            PiiAction::Mask => (true, GuardrailAction::Mask),
            PiiAction::Allow => (true, GuardrailAction::Allow),
        };

        let mut result = GuardrailResult::new(passed, action, reason, risk_score)
            .with_metadata("detections", json!(detections));
        match self.config.action {
            PiiAction::Redact => {
                result = result.with_metadata("redactedText", json!(self.redact(&text, &detections, false)));
            }
            PiiAction::Mask => {
                result = result.with_metadata("redactedText", json!(self.redact(&text, &detections, true)));
            }
            PiiAction::Block | PiiAction::Allow => {}
        }
        Ok(result)
    }
}
