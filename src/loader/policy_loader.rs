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

// Policy file loading - YAML or JSON, bare list or `{policies: [...]}`

use crate::engine_core::errors::PipelineError;
use crate::engine_core::models::SecurityPolicy;
use crate::utils::policy_validator::PolicyValidator;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use tracing::info;

/// Accepted document roots
#[derive(Deserialize)]
#[serde(untagged)]
enum PolicyDocument {
    List(Vec<SecurityPolicy>),
    Wrapped { policies: Vec<SecurityPolicy> },
}

impl PolicyDocument {
    fn into_policies(self) -> Vec<SecurityPolicy> {
        match self {
            PolicyDocument::List(policies) | PolicyDocument::Wrapped { policies } => policies,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyFormat {
    Yaml,
    Json,
}

impl PolicyFormat {
    /// `.json` is JSON; everything else is parsed as YAML (a JSON superset).
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => PolicyFormat::Json,
            _ => PolicyFormat::Yaml,
        }
    }
}

pub struct PolicyLoader;

impl PolicyLoader {
    /// Load and validate a policy set
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Vec<SecurityPolicy>, PipelineError> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(PipelineError::ConfigurationError(format!(
                "Policies file not found at {:?}",
                path_ref
            )));
        }

        let content = fs::read_to_string(path_ref)?;
        let policies = Self::from_str(&content, PolicyFormat::from_path(path_ref))?;
        info!(path = %path_ref.display(), count = policies.len(), "Loaded policy set");
        Ok(policies)
    }

    pub fn from_str(content: &str, format: PolicyFormat) -> Result<Vec<SecurityPolicy>, PipelineError> {
        let document: PolicyDocument = match format {
            PolicyFormat::Json => serde_json::from_str(content)?,
            PolicyFormat::Yaml => serde_yaml_ng::from_str(content)?,
        };
        let policies = document.into_policies();
        PolicyValidator::validate_policies(&policies)?;
        Ok(policies)
    }
}
