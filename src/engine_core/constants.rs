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

//! toolgate constants - single source of truth for all configuration values.
//!
//! This module centralizes magic strings, default limits and the risk
//! classification tables so they can be reviewed and extended in one place.

/// Risk classification tables (substring matches)
pub mod risk {
    /// Tool name fragments that make a request critical
    pub const CRITICAL_TOOLS: &[&str] = &[
        "system-admin",
        "user-impersonation",
        "credential-write",
        "security-bypass",
        "privilege-escalation",
    ];

    /// Tool name fragments that make a request high risk
    pub const HIGH_RISK_TOOLS: &[&str] = &[
        "file-write",
        "file-delete",
        "system-command",
        "database-write",
        "external-api-call",
        "credential-access",
        "network-request",
    ];

    /// Parameter key fragments (compared lowercase) that make a request high risk
    pub const SENSITIVE_PARAMETERS: &[&str] = &["password", "token", "key", "secret", "credential"];
}

/// Policy evaluation constants
pub mod policy {
    /// Priority assigned to policies that do not declare one (evaluated last)
    pub const DEFAULT_POLICY_PRIORITY: i32 = i32::MAX;
    /// `matchedPolicy` value when no policy applied
    pub const DEFAULT_POLICY_NAME: &str = "default";
    /// Replacement value used by `parameter_anonymize`
    pub const ANONYMIZED_VALUE: &str = "[ANONYMIZED]";
    /// Upper bound on compiled wildcard pattern size
    pub const PATTERN_SIZE_LIMIT: usize = 1 << 20;
}

/// Guardrail engine defaults
pub mod guardrails {
    /// Per-guardrail deadline
    pub const DEFAULT_TIMEOUT_MS: u64 = 5000;
    /// Score assigned to a synthesized failure (error or timeout)
    pub const ERROR_RISK_SCORE: u8 = 100;
    /// Highest valid risk score
    pub const MAX_RISK_SCORE: u8 = 100;

    pub const PII_DETECTION: &str = "pii_detection";
    pub const CONTENT_MODERATION: &str = "content_moderation";
    pub const PROMPT_INJECTION: &str = "prompt_injection";
}

/// Guardrail result cache defaults
pub mod cache {
    pub const DEFAULT_MAX_SIZE: usize = 1000;
    pub const DEFAULT_TTL_SECS: u64 = 300;
    pub const DEFAULT_SWEEP_INTERVAL_SECS: u64 = 60;
}

/// Remote moderation defaults
pub mod moderation {
    pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/moderations";
    pub const DEFAULT_TIMEOUT_MS: u64 = 3000;
}

/// Configuration Environment Variables
pub mod config {
    pub const ENV_POLICIES_PATH: &str = "TOOLGATE_POLICIES_PATH";
    pub const ENV_LOG_LEVEL: &str = "LOG_LEVEL";
    pub const ENV_LOG_FORMAT: &str = "LOG_FORMAT";
    pub const ENV_GUARDRAIL_PARALLEL: &str = "TOOLGATE_GUARDRAIL_PARALLEL";
    pub const ENV_GUARDRAIL_CONTINUE_ON_ERROR: &str = "TOOLGATE_GUARDRAIL_CONTINUE_ON_ERROR";
    pub const ENV_GUARDRAIL_TIMEOUT_MS: &str = "TOOLGATE_GUARDRAIL_TIMEOUT_MS";
    pub const ENV_CACHE_ENABLED: &str = "TOOLGATE_CACHE_ENABLED";
    pub const ENV_CACHE_MAX_SIZE: &str = "TOOLGATE_CACHE_MAX_SIZE";
    pub const ENV_CACHE_TTL_SECS: &str = "TOOLGATE_CACHE_TTL_SECS";
    pub const ENV_MODERATION_API_KEY: &str = "TOOLGATE_MODERATION_API_KEY";
    pub const ENV_MODERATION_ENDPOINT: &str = "TOOLGATE_MODERATION_ENDPOINT";
}
