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

//! Guardrail execution engine.
//!
//! The engine is the guardrail registry: it owns the registered checks, fans a
//! request out to the enabled ones under a per-guardrail deadline, isolates
//! failures and aggregates a single verdict. Results are always reported in
//! registration order regardless of completion order.

use crate::engine_core::constants::guardrails::{DEFAULT_TIMEOUT_MS, ERROR_RISK_SCORE};
use crate::engine_core::errors::PipelineError;
use crate::engine_core::models::GuardrailSummary;
use crate::guardrails::cache::GuardrailCache;
use crate::guardrails::{Guardrail, GuardrailResult};
use futures::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct GuardrailEngineConfig {
    pub parallel_execution: bool,
    pub continue_on_error: bool,
    /// Deadline applied to each guardrail individually
    pub timeout: Duration,
}

impl Default for GuardrailEngineConfig {
    fn default() -> Self {
        Self {
            parallel_execution: true,
            continue_on_error: true,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }
}

/// Outcome of one guardrail within an engine run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailExecution {
    pub guardrail_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<GuardrailResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
    pub cached: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GuardrailEngineResult {
    pub passed: bool,
    pub max_risk_score: u8,
    pub failed_guardrails: Vec<String>,
    pub results: Vec<GuardrailExecution>,
    pub guardrails_executed: usize,
    pub total_execution_time_ms: u64,
}

impl GuardrailEngineResult {
    fn aggregate(results: Vec<GuardrailExecution>, started: Instant) -> Self {
        let passed = results
            .iter()
            .all(|e| e.result.as_ref().is_some_and(|r| r.passed));
        let max_risk_score = results
            .iter()
            .filter_map(|e| e.result.as_ref().map(|r| r.risk_score))
            .max()
            .unwrap_or(0);
        let failed_guardrails = results
            .iter()
            .filter(|e| !e.result.as_ref().is_some_and(|r| r.passed))
            .map(|e| e.guardrail_name.clone())
            .collect();
        Self {
            passed,
            max_risk_score,
            failed_guardrails,
            guardrails_executed: results.len(),
            results,
            total_execution_time_ms: started.elapsed().as_millis() as u64,
        }
    }

    pub fn summary(&self) -> GuardrailSummary {
        GuardrailSummary {
            passed: self.passed,
            max_risk_score: self.max_risk_score,
            failed_guardrails: self.failed_guardrails.clone(),
            guardrails_executed: self.guardrails_executed,
        }
    }
}

/// What to run: a registered guardrail, or a name nothing is registered under.
enum Slot {
    Registered(Arc<dyn Guardrail>),
    Missing(String),
}

struct RunOutcome {
    name: String,
    result: Result<GuardrailResult, PipelineError>,
    cached: bool,
    elapsed_ms: u64,
}

impl RunOutcome {
    fn into_execution(self, continue_on_error: bool) -> GuardrailExecution {
        match self.result {
            Ok(result) => GuardrailExecution {
                guardrail_name: self.name,
                result: Some(result),
                error: None,
                execution_time_ms: self.elapsed_ms,
                cached: self.cached,
            },
            Err(e) => {
                let message = e.to_string();
                let result = continue_on_error
                    .then(|| GuardrailResult::block(message.clone(), ERROR_RISK_SCORE));
                GuardrailExecution {
                    guardrail_name: self.name,
                    result,
                    error: Some(message),
                    execution_time_ms: self.elapsed_ms,
                    cached: false,
                }
            }
        }
    }
}

pub struct GuardrailEngine {
    config: GuardrailEngineConfig,
    guardrails: Vec<Arc<dyn Guardrail>>,
    cache: Option<Arc<GuardrailCache>>,
}

impl Default for GuardrailEngine {
    fn default() -> Self {
        Self::new(GuardrailEngineConfig::default())
    }
}

impl GuardrailEngine {
    pub fn new(config: GuardrailEngineConfig) -> Self {
        Self {
            config,
            guardrails: Vec::new(),
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<GuardrailCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &GuardrailEngineConfig {
        &self.config
    }

    pub fn cache(&self) -> Option<&Arc<GuardrailCache>> {
        self.cache.as_ref()
    }

    /// Register a guardrail. A guardrail with the same name is replaced in place.
    pub fn register(&mut self, guardrail: Arc<dyn Guardrail>) -> Result<(), PipelineError> {
        if guardrail.name().trim().is_empty() {
            return Err(PipelineError::ConfigurationError(
                "Guardrail name cannot be empty".to_string(),
            ));
        }
        match self
            .guardrails
            .iter()
            .position(|g| g.name() == guardrail.name())
        {
            Some(idx) => {
                debug!(guardrail = guardrail.name(), "Replacing registered guardrail");
                self.guardrails[idx] = guardrail;
            }
            None => self.guardrails.push(guardrail),
        }
        Ok(())
    }

    /// Remove by name. Returns whether anything was removed.
    pub fn unregister(&mut self, name: &str) -> bool {
        let before = self.guardrails.len();
        self.guardrails.retain(|g| g.name() != name);
        before != self.guardrails.len()
    }

    pub fn names(&self) -> Vec<&str> {
        self.guardrails.iter().map(|g| g.name()).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.guardrails.iter().any(|g| g.name() == name)
    }

    pub fn len(&self) -> usize {
        self.guardrails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guardrails.is_empty()
    }

    /// Run every enabled guardrail.
    pub async fn execute(&self, input: &Value, context: &Value) -> Result<GuardrailEngineResult, PipelineError> {
        let slots = self
            .guardrails
            .iter()
            .filter(|g| g.enabled())
            .cloned()
            .map(Slot::Registered)
            .collect();
        self.run(slots, input, context).await
    }

    /// Run only the named guardrails.
    ///
    /// Registered ones run in registration order; disabled ones are skipped.
    /// A name with no registered guardrail is reported as an error entry.
    pub async fn execute_selected(
        &self,
        names: &[String],
        input: &Value,
        context: &Value,
    ) -> Result<GuardrailEngineResult, PipelineError> {
        let mut slots: Vec<Slot> = self
            .guardrails
            .iter()
            .filter(|g| g.enabled() && names.iter().any(|n| n == g.name()))
            .cloned()
            .map(Slot::Registered)
            .collect();
        for name in names {
            if !self.contains(name) && !slots.iter().any(|s| matches!(s, Slot::Missing(n) if n == name)) {
                slots.push(Slot::Missing(name.clone()));
            }
        }
        self.run(slots, input, context).await
    }

    async fn run(&self, slots: Vec<Slot>, input: &Value, context: &Value) -> Result<GuardrailEngineResult, PipelineError> {
        let started = Instant::now();
        if slots.is_empty() {
            return Ok(GuardrailEngineResult::aggregate(Vec::new(), started));
        }

        let continue_on_error = self.config.continue_on_error;
        let mut executions = Vec::with_capacity(slots.len());

        if self.config.parallel_execution {
            let mut ordered: Vec<Option<GuardrailExecution>> = slots.iter().map(|_| None).collect();
            let mut pending: FuturesUnordered<_> = slots
                .iter()
                .enumerate()
                .map(|(idx, slot)| async move { (idx, self.run_slot(slot, input, context).await) })
                .collect();

            while let Some((idx, outcome)) = pending.next().await {
                let outcome = match (outcome, continue_on_error) {
                    (RunOutcome { result: Err(e), .. }, false) => return Err(e),
                    (outcome, _) => outcome,
                };
                ordered[idx] = Some(outcome.into_execution(continue_on_error));
            }
            executions.extend(ordered.into_iter().flatten());
        } else {
            for slot in &slots {
                let outcome = self.run_slot(slot, input, context).await;
                let failed = outcome.result.is_err();
                executions.push(outcome.into_execution(continue_on_error));
                if failed && !continue_on_error {
                    debug!("Sequential guardrail run stopped at first error");
                    break;
                }
            }
        }

        Ok(GuardrailEngineResult::aggregate(executions, started))
    }

    async fn run_slot(&self, slot: &Slot, input: &Value, context: &Value) -> RunOutcome {
        let started = Instant::now();
        let guardrail = match slot {
            Slot::Registered(g) => g,
            Slot::Missing(name) => {
                warn!(guardrail = %name, "Guardrail is not registered");
                return RunOutcome {
                    name: name.clone(),
                    result: Err(PipelineError::guardrail(name.as_str(), "not registered")),
                    cached: false,
                    elapsed_ms: 0,
                };
            }
        };
        let name = guardrail.name().to_string();

        if let Some(hit) = self.cache.as_ref().and_then(|c| c.get(&name, input, context)) {
            return RunOutcome {
                name,
                result: Ok(hit),
                cached: true,
                elapsed_ms: started.elapsed().as_millis() as u64,
            };
        }

        let result = match tokio::time::timeout(self.config.timeout, guardrail.evaluate(input, context)).await {
            Ok(Ok(result)) => {
                if let Some(cache) = &self.cache {
                    cache.set(&name, input, context, result.clone());
                }
                Ok(result)
            }
            Ok(Err(e)) => {
                warn!(guardrail = %name, error = %e, "Guardrail failed");
                if e.is_guardrail_failure() {
                    Err(e)
                } else {
                    Err(PipelineError::guardrail(name.as_str(), e.to_string()))
                }
            }
            Err(_) => {
                let timeout_ms = self.config.timeout.as_millis() as u64;
                warn!(guardrail = %name, timeout_ms, "Guardrail timed out");
                Err(PipelineError::GuardrailTimeout {
                    guardrail: name.clone(),
                    timeout_ms,
                })
            }
        };

        RunOutcome {
            name,
            result,
            cached: false,
            elapsed_ms: started.elapsed().as_millis() as u64,
        }
    }
}
