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

//! Content guardrails.
//!
//! A guardrail is a stateless check over a JSON input (plus an opaque context)
//! returning a pass/fail verdict with a 0-100 risk score. The set is open:
//! anything implementing [`Guardrail`] can be registered with the
//! [`GuardrailEngine`](engine::GuardrailEngine).

pub mod cache;
pub mod engine;
pub mod injection;
pub mod moderation;
pub mod pii;

use crate::engine_core::constants::guardrails::MAX_RISK_SCORE;
use crate::engine_core::errors::PipelineError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub use cache::{CacheConfig, CacheStats, GuardrailCache};
pub use engine::{GuardrailEngine, GuardrailEngineConfig, GuardrailEngineResult, GuardrailExecution};
pub use injection::{InjectionAction, InjectionConfig, PromptInjectionGuardrail, Sensitivity};
pub use moderation::{ContentModerationGuardrail, ModerationAction, ModerationCategory, ModerationConfig};
pub use pii::{PiiAction, PiiConfig, PiiDetection, PiiDetectionGuardrail, PiiType};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GuardrailAction {
    Allow,
    Block,
    Redact,
    Mask,
    Transform,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailResult {
    pub passed: bool,
    pub action: GuardrailAction,
    pub reason: String,
    pub risk_score: u8,
    #[serde(default)]
    pub metadata: serde_json::Map<String, Value>,
    pub timestamp: DateTime<Utc>,
}

impl GuardrailResult {
    pub fn pass(reason: impl Into<String>) -> Self {
        Self::new(true, GuardrailAction::Allow, reason, 0)
    }

    pub fn block(reason: impl Into<String>, risk_score: u8) -> Self {
        Self::new(false, GuardrailAction::Block, reason, risk_score)
    }

    pub fn new(passed: bool, action: GuardrailAction, reason: impl Into<String>, risk_score: u8) -> Self {
        Self {
            passed,
            action,
            reason: reason.into(),
            risk_score: risk_score.min(MAX_RISK_SCORE),
            metadata: serde_json::Map::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, key: &str, value: Value) -> Self {
        self.metadata.insert(key.to_string(), value);
        self
    }
}

/// A pluggable content check.
///
/// Implementations must not mutate their input and should be cheap to call
/// concurrently; the engine holds them behind `Arc`.
///
/// Failures must be returned as `Err`, never raised as a panic. A panic
/// unwinds through the whole pipeline evaluation so no decision is audited,
/// and release builds abort the process.
#[async_trait]
pub trait Guardrail: Send + Sync {
    fn name(&self) -> &str;

    fn enabled(&self) -> bool {
        true
    }

    async fn evaluate(&self, input: &Value, context: &Value) -> Result<GuardrailResult, PipelineError>;
}

/// Pull the text to scan out of a guardrail input.
///
/// Tried in order: a raw string, `prompt`, `messages[].content` joined with
/// spaces, `text`, and finally the JSON serialization of the whole input.
pub fn extract_text(input: &Value) -> String {
    if let Value::String(s) = input {
        return s.clone();
    }
    if let Some(prompt) = input.get("prompt").and_then(Value::as_str) {
        return prompt.to_string();
    }
    if let Some(messages) = input.get("messages").and_then(Value::as_array) {
        return messages
            .iter()
            .filter_map(|m| m.get("content").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(" ");
    }
    if let Some(text) = input.get("text").and_then(Value::as_str) {
        return text.to_string();
    }
    input.to_string()
}

/// Keep the earliest match of every overlapping group. Input must be sorted by start.
pub(crate) fn remove_overlaps<T>(spans: Vec<T>, range: impl Fn(&T) -> (usize, usize)) -> Vec<T> {
    let mut kept: Vec<T> = Vec::with_capacity(spans.len());
    let mut last_end = 0usize;
    for span in spans {
        let (start, end) = range(&span);
        if kept.is_empty() || start >= last_end {
            last_end = end;
            kept.push(span);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_extract_text_order() {
        assert_eq!(extract_text(&json!("raw")), "raw");
        assert_eq!(extract_text(&json!({"prompt": "p", "text": "t"})), "p");
        assert_eq!(
            extract_text(&json!({"messages": [{"content": "a"}, {"role": "x"}, {"content": "b"}]})),
            "a b"
        );
        assert_eq!(extract_text(&json!({"text": "t"})), "t");
        assert_eq!(extract_text(&json!({"query": "q"})), r#"{"query":"q"}"#);
    }

    #[test]
    fn test_extract_text_non_string_prompt_falls_through() {
        assert_eq!(extract_text(&json!({"prompt": 5, "text": "t"})), "t");
    }

    #[test]
    fn test_result_score_is_clamped() {
        assert_eq!(GuardrailResult::block("x", 250).risk_score, 100);
        let ok = GuardrailResult::pass("fine");
        assert!(ok.passed);
        assert_eq!(ok.risk_score, 0);
    }

    #[test]
    fn test_result_wire_format() {
        let v = serde_json::to_value(GuardrailResult::block("bad", 90).with_metadata("k", json!(1))).unwrap();
        assert_eq!(v["action"], "block");
        assert_eq!(v["riskScore"], 90);
        assert_eq!(v["metadata"]["k"], 1);
    }

    #[test]
    fn test_remove_overlaps_keeps_first() {
        let spans = vec![(0, 5), (3, 8), (5, 9), (10, 12)];
        let kept = remove_overlaps(spans, |s| *s);
        assert_eq!(kept, vec![(0, 5), (5, 9), (10, 12)]);
    }
}
