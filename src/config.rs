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

use crate::engine_core::constants::{cache, config as env_keys, guardrails, moderation};
use crate::engine_core::errors::PipelineError;
use crate::guardrails::{CacheConfig, GuardrailEngineConfig, ModerationConfig};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub policies_path: Option<PathBuf>,
    pub log_level: String,
    pub log_format: String, // "json" or "text"
    pub parallel_execution: bool,
    pub continue_on_error: bool,
    pub guardrail_timeout_ms: u64,
    pub cache_enabled: bool,
    pub cache_max_size: usize,
    pub cache_ttl_secs: u64,
    #[serde(skip_serializing)]
    pub moderation_api_key: Option<String>,
    pub moderation_endpoint: String,
}

impl Config {
    pub fn from_env() -> Result<Self, PipelineError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary variable source. Unset variables take defaults;
    /// set but unparseable ones are an error.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, PipelineError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        Ok(Self {
            policies_path: lookup(env_keys::ENV_POLICIES_PATH).map(PathBuf::from),
            log_level: lookup(env_keys::ENV_LOG_LEVEL).unwrap_or(defaults.log_level),
            log_format: lookup(env_keys::ENV_LOG_FORMAT).unwrap_or(defaults.log_format),
            parallel_execution: parse_bool(&lookup, env_keys::ENV_GUARDRAIL_PARALLEL, defaults.parallel_execution)?,
            continue_on_error: parse_bool(
                &lookup,
                env_keys::ENV_GUARDRAIL_CONTINUE_ON_ERROR,
                defaults.continue_on_error,
            )?,
            guardrail_timeout_ms: parse_num(&lookup, env_keys::ENV_GUARDRAIL_TIMEOUT_MS, defaults.guardrail_timeout_ms)?,
            cache_enabled: parse_bool(&lookup, env_keys::ENV_CACHE_ENABLED, defaults.cache_enabled)?,
            cache_max_size: parse_num(&lookup, env_keys::ENV_CACHE_MAX_SIZE, defaults.cache_max_size)?,
            cache_ttl_secs: parse_num(&lookup, env_keys::ENV_CACHE_TTL_SECS, defaults.cache_ttl_secs)?,
            moderation_api_key: lookup(env_keys::ENV_MODERATION_API_KEY).filter(|k| !k.trim().is_empty()),
            moderation_endpoint: lookup(env_keys::ENV_MODERATION_ENDPOINT).unwrap_or(defaults.moderation_endpoint),
        })
    }

    pub fn guardrail_engine_config(&self) -> GuardrailEngineConfig {
        GuardrailEngineConfig {
            parallel_execution: self.parallel_execution,
            continue_on_error: self.continue_on_error,
            timeout: Duration::from_millis(self.guardrail_timeout_ms),
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            max_size: self.cache_max_size,
            ttl: Duration::from_secs(self.cache_ttl_secs),
        }
    }

    pub fn moderation_config(&self) -> ModerationConfig {
        ModerationConfig {
            api_key: self.moderation_api_key.clone(),
            endpoint: self.moderation_endpoint.clone(),
            ..ModerationConfig::default()
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            policies_path: None,
            log_level: "info".to_string(),
            log_format: "text".to_string(),
            parallel_execution: true,
            continue_on_error: true,
            guardrail_timeout_ms: guardrails::DEFAULT_TIMEOUT_MS,
            cache_enabled: true,
            cache_max_size: cache::DEFAULT_MAX_SIZE,
            cache_ttl_secs: cache::DEFAULT_TTL_SECS,
            moderation_api_key: None,
            moderation_endpoint: moderation::DEFAULT_ENDPOINT.to_string(),
        }
    }
}

fn parse_bool<F>(lookup: &F, key: &str, default: bool) -> Result<bool, PipelineError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => match raw.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(PipelineError::ConfigurationError(format!(
                "{} must be a boolean, got '{}'",
                key, raw
            ))),
        },
    }
}

fn parse_num<F, T>(lookup: &F, key: &str, default: T) -> Result<T, PipelineError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| {
            PipelineError::ConfigurationError(format!("{} must be a non-negative integer, got '{}'", key, raw))
        }),
    }
}
