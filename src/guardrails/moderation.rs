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

//! Content moderation.
//!
//! Two strategies share one verdict shape. When an API key is configured the
//! text is classified by a remote moderation endpoint (OpenAI response
//! format); otherwise, or whenever the remote call fails for any reason, a
//! local regex table is used. The remote path never fails an evaluation.

use crate::engine_core::constants::guardrails::CONTENT_MODERATION;
use crate::engine_core::constants::moderation::{DEFAULT_ENDPOINT, DEFAULT_TIMEOUT_MS};
use crate::engine_core::errors::PipelineError;
use crate::guardrails::{extract_text, remove_overlaps, Guardrail, GuardrailAction, GuardrailResult};
use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;
use tracing::debug;

pub const FILTERED_PLACEHOLDER: &str = "[FILTERED]";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationCategory {
    Hate,
    Violence,
    Sexual,
    Harassment,
    #[serde(rename = "self-harm")]
    SelfHarm,
    Illegal,
}

impl ModerationCategory {
    pub const ALL: [ModerationCategory; 6] = [
        ModerationCategory::Hate,
        ModerationCategory::Violence,
        ModerationCategory::Sexual,
        ModerationCategory::Harassment,
        ModerationCategory::SelfHarm,
        ModerationCategory::Illegal,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ModerationCategory::Hate => "hate",
            ModerationCategory::Violence => "violence",
            ModerationCategory::Sexual => "sexual",
            ModerationCategory::Harassment => "harassment",
            ModerationCategory::SelfHarm => "self-harm",
            ModerationCategory::Illegal => "illegal",
        }
    }

    pub fn default_score(self) -> u8 {
        match self {
            ModerationCategory::Hate => 90,
            ModerationCategory::Violence => 85,
            ModerationCategory::Sexual => 80,
            ModerationCategory::Harassment => 70,
            ModerationCategory::SelfHarm => 95,
            ModerationCategory::Illegal => 85,
        }
    }

    fn pattern(self) -> &'static str {
        match self {
            ModerationCategory::Hate => {
                r"\b(?:hate\s+(?:all|every)\s+\w+|racial\s+slurs?|ethnic\s+cleansing|white\s+supremac\w*|subhuman\w*)\b"
            }
            ModerationCategory::Violence => {
                r"\b(?:(?:kill|murder|stab|shoot|hurt)\s+(?:you|him|her|them|everyone|people)|massacre\w*|behead\w*|mass\s+shooting)\b"
            }
            ModerationCategory::Sexual => {
                r"\b(?:porn\w*|explicit\s+sex\w*|sexual\s+content|nude\s+(?:photos?|images?|pictures?))\b"
            }
            ModerationCategory::Harassment => {
                r"\b(?:you\s+are\s+(?:worthless|pathetic|disgusting|an?\s+idiot)|nobody\s+likes\s+you|go\s+away\s+loser)\b"
            }
            ModerationCategory::SelfHarm => {
                r"\b(?:kill\s+myself|suicid\w*|self[-\s]?harm\w*|cut\s+myself|end\s+my\s+life)\b"
            }
            ModerationCategory::Illegal => {
                r"\b(?:buy\s+(?:drugs|cocaine|heroin|meth)|money\s+launder\w*|launder\w*\s+money|counterfeit\s+\w+|make\s+a\s+bomb|hack\s+into)\b"
            }
        }
    }

    /// Map an OpenAI moderation category key (`hate/threatening`, `illicit`, ...) onto ours
    fn from_remote_key(key: &str) -> Option<Self> {
        let base = key.split('/').next().unwrap_or(key);
        match base {
            "hate" => Some(ModerationCategory::Hate),
            "violence" => Some(ModerationCategory::Violence),
            "sexual" => Some(ModerationCategory::Sexual),
            "harassment" => Some(ModerationCategory::Harassment),
            "self-harm" => Some(ModerationCategory::SelfHarm),
            "illicit" | "illegal" => Some(ModerationCategory::Illegal),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModerationAction {
    #[default]
    Block,
    /// Pass with `filteredText`. Text flagged only by the remote endpoint has
    /// no local spans to rewrite, so `filteredText` is omitted.
    Transform,
    Allow,
}

#[derive(Clone)]
pub struct ModerationConfig {
    pub enabled: bool,
    pub action: ModerationAction,
    pub categories: Vec<ModerationCategory>,
    pub risk_scores: BTreeMap<ModerationCategory, u8>,
    /// Enables the remote strategy when set
    pub api_key: Option<String>,
    pub endpoint: String,
    pub timeout: Duration,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            action: ModerationAction::Block,
            categories: ModerationCategory::ALL.to_vec(),
            risk_scores: BTreeMap::new(),
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

impl std::fmt::Debug for ModerationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModerationConfig")
            .field("enabled", &self.enabled)
            .field("action", &self.action)
            .field("categories", &self.categories)
            .field("risk_scores", &self.risk_scores)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ModerationConfig {
    fn score(&self, category: ModerationCategory) -> u8 {
        self.risk_scores
            .get(&category)
            .copied()
            .unwrap_or_else(|| category.default_score())
    }
}

#[derive(Serialize)]
struct ModerationRequest<'a> {
    input: &'a str,
}

#[derive(Deserialize)]
struct ModerationResponse {
    #[serde(default)]
    results: Vec<ModerationVerdict>,
}

#[derive(Deserialize)]
struct ModerationVerdict {
    #[serde(default)]
    categories: HashMap<String, bool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    Remote,
    Local,
}

impl Strategy {
    fn as_str(self) -> &'static str {
        match self {
            Strategy::Remote => "remote",
            Strategy::Local => "local",
        }
    }
}

struct Span {
    category: ModerationCategory,
    start: usize,
    end: usize,
}

pub struct ContentModerationGuardrail {
    config: ModerationConfig,
    patterns: Vec<(ModerationCategory, Regex)>,
    client: Option<reqwest::Client>,
}

impl ContentModerationGuardrail {
    pub fn new(config: ModerationConfig) -> Result<Self, PipelineError> {
        let patterns = config
            .categories
            .iter()
            .map(|c| {
                RegexBuilder::new(c.pattern())
                    .case_insensitive(true)
                    .build()
                    .map(|re| (*c, re))
                    .map_err(|e| {
                        PipelineError::ConfigurationError(format!("Moderation pattern {}: {}", c.as_str(), e))
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let client = match config.api_key {
            Some(_) => Some(
                reqwest::Client::builder()
                    .timeout(config.timeout)
                    .build()
                    .map_err(|e| PipelineError::ConfigurationError(format!("Moderation client: {}", e)))?,
            ),
            None => None,
        };

        Ok(Self {
            config,
            patterns,
            client,
        })
    }

    fn local_spans(&self, text: &str) -> Vec<Span> {
        let mut spans: Vec<Span> = self
            .patterns
            .iter()
            .flat_map(|(c, re)| {
                re.find_iter(text).map(move |m| Span {
                    category: *c,
                    start: m.start(),
                    end: m.end(),
                })
            })
            .collect();
        spans.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
        spans
    }

    async fn classify_remote(&self, client: &reqwest::Client, api_key: &str, text: &str) -> Result<BTreeSet<ModerationCategory>, PipelineError> {
        let response = client
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(&ModerationRequest { input: text })
            .send()
            .await
            .map_err(|e| PipelineError::guardrail(CONTENT_MODERATION, format!("request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(PipelineError::guardrail(
                CONTENT_MODERATION,
                format!("endpoint returned status {}", response.status()),
            ));
        }

        let body: ModerationResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::guardrail(CONTENT_MODERATION, format!("unreadable response: {}", e)))?;
        let verdict = body
            .results
            .into_iter()
            .next()
            .ok_or_else(|| PipelineError::guardrail(CONTENT_MODERATION, "empty results"))?;

        Ok(verdict
            .categories
            .iter()
            .filter(|(_, flagged)| **flagged)
            .filter_map(|(key, _)| ModerationCategory::from_remote_key(key))
            .filter(|c| self.config.categories.contains(c))
            .collect())
    }

    fn filter_text(text: &str, spans: Vec<Span>) -> String {
        let spans = remove_overlaps(spans, |s| (s.start, s.end));
        let mut out = text.to_string();
        for span in spans.iter().rev() {
            out.replace_range(span.start..span.end, FILTERED_PLACEHOLDER);
        }
        out
    }
}

#[async_trait]
impl Guardrail for ContentModerationGuardrail {
    fn name(&self) -> &str {
        CONTENT_MODERATION
    }

    fn enabled(&self) -> bool {
        self.config.enabled
    }

    async fn evaluate(&self, input: &Value, _context: &Value) -> Result<GuardrailResult, PipelineError> {
        let text = extract_text(input);
        let spans = self.local_spans(&text);

        let remote = match (&self.client, &self.config.api_key) {
            (Some(client), Some(key)) => match self.classify_remote(client, key, &text).await {
                Ok(categories) => Some(categories),
                Err(e) => {
                    debug!(error = %e, "Remote moderation unavailable, using local patterns");
                    None
                }
            },
            _ => None,
        };
        let (violated, strategy) = match remote {
            Some(categories) => (categories, Strategy::Remote),
            None => (spans.iter().map(|s| s.category).collect(), Strategy::Local),
        };

        let names: Vec<&str> = violated.iter().map(|c| c.as_str()).collect();
        if violated.is_empty() {
            return Ok(GuardrailResult::pass("No content policy violations")
                .with_metadata("categories", json!(names))
                .with_metadata("strategy", json!(strategy.as_str())));
        }

        let risk_score = violated.iter().map(|c| self.config.score(*c)).max().unwrap_or(0);
        let reason = format!("Content flagged: {}", names.join(", "));
        let (passed, action) = match self.config.action {
            ModerationAction::Block => (false, GuardrailAction::Block),
            ModerationAction::Transform => (true, GuardrailAction::Transform),
            ModerationAction::Allow => (true, GuardrailAction::Allow),
        };

        let mut result = GuardrailResult::new(passed, action, reason, risk_score)
            .with_metadata("categories", json!(names))
            .with_metadata("strategy", json!(strategy.as_str()));
        // Only local spans can be rewritten
        if self.config.action == ModerationAction::Transform && !spans.is_empty() {
            result = result.with_metadata("filteredText", json!(Self::filter_text(&text, spans)));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn local(action: ModerationAction) -> ContentModerationGuardrail {
        ContentModerationGuardrail::new(ModerationConfig {
            action,
            ..ModerationConfig::default()
        })
        .unwrap()
    }

    /// One-shot HTTP server answering every request with `body`
    async fn serve_once(body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = Vec::new();
            let mut chunk = [0u8; 1024];
            loop {
                let n = socket.read(&mut chunk).await.unwrap();
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
                let text = String::from_utf8_lossy(&buf);
                if let Some(header_end) = text.find("\r\n\r\n") {
                    let length = text[..header_end]
                        .lines()
                        .find_map(|l| {
                            let lower = l.to_ascii_lowercase();
                            lower
                                .strip_prefix("content-length:")
                                .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                        })
                        .unwrap_or(0);
                    if buf.len() >= header_end + 4 + length {
                        break;
                    }
                }
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            socket.write_all(response.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        });
        format!("http://{}/v1/moderations", addr)
    }

    #[tokio::test]
    async fn test_local_block() {
        let g = local(ModerationAction::Block);
        let result = g.evaluate(&json!("I will kill you tomorrow"), &json!({})).await.unwrap();
        assert!(!result.passed);
        assert_eq!(result.risk_score, 85);
        assert_eq!(result.metadata["strategy"], json!("local"));
        assert_eq!(result.metadata["categories"], json!(["violence"]));
    }

    #[tokio::test]
    async fn test_max_score_over_categories() {
        let g = local(ModerationAction::Block);
        let result = g
            .evaluate(&json!("you are worthless and I want to end my life"), &json!({}))
            .await
            .unwrap();
        assert_eq!(result.risk_score, 95);
        assert_eq!(result.metadata["categories"], json!(["harassment", "self-harm"]));
    }

    #[tokio::test]
    async fn test_transform_filters_spans() {
        let g = local(ModerationAction::Transform);
        let result = g
            .evaluate(&json!({"text": "where can I buy drugs cheaply"}), &json!({}))
            .await
            .unwrap();
        assert!(result.passed);
        assert_eq!(result.action, GuardrailAction::Transform);
        assert_eq!(
            result.metadata["filteredText"],
            json!("where can I [FILTERED] cheaply")
        );
    }

    #[tokio::test]
    async fn test_clean_text_passes() {
        let g = local(ModerationAction::Block);
        let result = g.evaluate(&json!("summarize this report"), &json!({})).await.unwrap();
        assert!(result.passed);
        assert_eq!(result.risk_score, 0);
    }

    #[tokio::test]
    async fn test_remote_failure_falls_back_to_local() {
        let g = ContentModerationGuardrail::new(ModerationConfig {
            api_key: Some("sk-test".to_string()),
            endpoint: "http://127.0.0.1:1/v1/moderations".to_string(),
            timeout: Duration::from_millis(500),
            ..ModerationConfig::default()
        })
        .unwrap();
        let result = g.evaluate(&json!("plans for ethnic cleansing"), &json!({})).await.unwrap();
        assert!(!result.passed);
        assert_eq!(result.metadata["strategy"], json!("local"));
        assert_eq!(result.risk_score, 90);
    }

    #[tokio::test]
    async fn test_remote_verdict_is_used() {
        let endpoint = serve_once(
            r#"{"results":[{"flagged":true,"categories":{"hate":false,"violence/graphic":true,"sexual":false}}]}"#,
        )
        .await;
        let g = ContentModerationGuardrail::new(ModerationConfig {
            api_key: Some("sk-test".to_string()),
            endpoint,
            ..ModerationConfig::default()
        })
        .unwrap();
        // Locally clean text, remotely flagged
        let result = g.evaluate(&json!("a perfectly ordinary sentence"), &json!({})).await.unwrap();
        assert!(!result.passed);
        assert_eq!(result.metadata["strategy"], json!("remote"));
        assert_eq!(result.metadata["categories"], json!(["violence"]));
        assert_eq!(result.risk_score, 85);
    }

    #[tokio::test]
    async fn test_remote_transform_without_local_spans_omits_filtered_text() {
        let endpoint = serve_once(r#"{"results":[{"flagged":true,"categories":{"harassment":true}}]}"#).await;
        let g = ContentModerationGuardrail::new(ModerationConfig {
            action: ModerationAction::Transform,
            api_key: Some("sk-test".to_string()),
            endpoint,
            ..ModerationConfig::default()
        })
        .unwrap();
        let result = g.evaluate(&json!("a perfectly ordinary sentence"), &json!({})).await.unwrap();
        assert_eq!(result.action, GuardrailAction::Transform);
        assert_eq!(result.metadata["strategy"], json!("remote"));
        assert!(!result.metadata.contains_key("filteredText"));
    }

    #[test]
    fn test_remote_key_mapping() {
        assert_eq!(
            ModerationCategory::from_remote_key("harassment/threatening"),
            Some(ModerationCategory::Harassment)
        );
        assert_eq!(
            ModerationCategory::from_remote_key("self-harm/intent"),
            Some(ModerationCategory::SelfHarm)
        );
        assert_eq!(ModerationCategory::from_remote_key("illicit/violent"), Some(ModerationCategory::Illegal));
        assert_eq!(ModerationCategory::from_remote_key("unknown"), None);
    }

    #[test]
    fn test_debug_hides_api_key() {
        let config = ModerationConfig {
            api_key: Some("sk-very-secret".to_string()),
            ..ModerationConfig::default()
        };
        assert!(!format!("{:?}", config).contains("sk-very-secret"));
    }
}
