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

//! Audit seam.
//!
//! The pipeline hands exactly one [`SecurityDecision`] per evaluated request
//! to an [`AuditSink`], including synthesized fail-closed decisions.

use crate::engine_core::models::SecurityDecision;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::sync::{Mutex, MutexGuard};
use tracing::{info, warn};

pub trait AuditSink: Send + Sync {
    fn record(&self, decision: &SecurityDecision);
}

/// Emits one structured event per decision on the `audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, decision: &SecurityDecision) {
        let payload = canonical_payload(decision, &decision.request_id.to_string());
        let digest = hex::encode(Sha256::digest(payload.as_bytes()));

        info!(
            target: "audit",
            request_id = %decision.request_id,
            agent_id = %decision.agent_id,
            tool_name = %decision.tool_name,
            action = %decision.action,
            risk_level = %decision.risk_level,
            matched_policy = %decision.metadata.matched_policy,
            evaluation_time_ms = decision.metadata.evaluation_time_ms,
            digest = %digest,
            payload = %payload,
            "SECURITY_DECISION"
        );
    }
}

/// Canonical JSON for a stable fingerprint. Serialization failure is logged
/// and yields an empty payload.
fn canonical_payload<T: Serialize>(value: &T, request_id: &str) -> String {
    match serde_jcs::to_string(value) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(
                target: "audit",
                request_id,
                error = %e,
                "Failed to serialize decision; audit payload is empty"
            );
            String::new()
        }
    }
}

/// Keeps decisions in memory. Useful for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    decisions: Mutex<Vec<SecurityDecision>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn decisions(&self) -> Vec<SecurityDecision> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<SecurityDecision>> {
        match self.decisions.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, decision: &SecurityDecision) {
        self.lock().push(decision.clone());
    }
}
