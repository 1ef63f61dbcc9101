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

//! toolgate: a security decision pipeline for AI agent tool calls.
//!
//! Every tool call is classified for risk, matched against an ordered policy
//! set and optionally screened by content guardrails before a single
//! allow / deny / transform decision is returned and audited.

pub mod config;
pub mod engine;
pub mod engine_core;
pub mod guardrails;
pub mod loader;
pub mod utils;

pub use engine_core::errors::PipelineError;
pub use engine_core::models::{
    PolicyAction, RiskLevel, SecurityDecision, SecurityPolicy, ToolExecutionRequest,
};
pub use engine_core::security_core::SecurityPipeline;
