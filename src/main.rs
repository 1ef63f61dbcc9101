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

// Main entry point for the toolgate CLI
use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

use toolgate::config::Config;
use toolgate::engine::evaluator::PolicyEngine;
use toolgate::engine_core::constants::guardrails::{CONTENT_MODERATION, PII_DETECTION, PROMPT_INJECTION};
use toolgate::loader::policy_loader::PolicyLoader;
use toolgate::utils::policy_validator::PolicyValidator;
use toolgate::{SecurityPipeline, SecurityPolicy, ToolExecutionRequest};

/// Exit status for a denied request
const EXIT_DENIED: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "toolgate", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Evaluate one tool call and print the decision as JSON
    Evaluate {
        /// Path to policy file (YAML or JSON)
        #[arg(long)]
        policies: Option<PathBuf>,

        /// Path to request JSON; stdin when omitted
        #[arg(long)]
        request: Option<PathBuf>,
    },
    /// Load and validate a policy file
    Validate {
        /// Path to policy file (YAML or JSON)
        #[arg(long)]
        policies: Option<PathBuf>,
    },
    /// Print the JSON schema of a policy set
    #[cfg(feature = "schema")]
    Schema,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    install_panic_hook();

    // A bad variable must not silently drop the policy path or API key
    let config = Config::from_env().context("Invalid environment configuration")?;

    if let Err(e) = init_tracing(&config) {
        eprintln!("Failed to init tracing: {}", e);
    }

    match cli.command {
        Command::Evaluate { policies, request } => {
            let policies = load_policies(policies.or_else(|| config.policies_path.clone()))?;
            let request = read_request(request)?;

            let pipeline = SecurityPipeline::from_config(&config, policies)?;
            PolicyValidator::validate_guardrail_references(
                &pipeline.policy_engine().policies().cloned().collect::<Vec<_>>(),
                &pipeline.guardrail_engine().names(),
            )?;

            let decision = pipeline.evaluate(&request).await;
            println!("{}", serde_json::to_string_pretty(&decision)?);

            if decision.is_denied() {
                Ok(ExitCode::from(EXIT_DENIED))
            } else {
                Ok(ExitCode::SUCCESS)
            }
        }
        Command::Validate { policies } => {
            let Some(path) = policies.or_else(|| config.policies_path.clone()) else {
                bail!("No policy file given (use --policies or TOOLGATE_POLICIES_PATH)");
            };
            let policies = PolicyLoader::from_file(&path)
                .with_context(|| format!("Invalid policy file {}", path.display()))?;
            PolicyValidator::validate_guardrail_references(
                &policies,
                &[PII_DETECTION, CONTENT_MODERATION, PROMPT_INJECTION],
            )?;
            let engine = PolicyEngine::new(policies)?;

            println!("Policy set OK: {} policies", engine.len());
            for policy in engine.policies() {
                println!(
                    "  [{}] {} -> {}{}",
                    policy.priority,
                    policy.name,
                    policy.action,
                    if policy.enabled { "" } else { " (disabled)" }
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        #[cfg(feature = "schema")]
        Command::Schema => {
            let schema = schemars::schema_for!(Vec<SecurityPolicy>);
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_policies(path: Option<PathBuf>) -> anyhow::Result<Vec<SecurityPolicy>> {
    match path {
        Some(path) => {
            PolicyLoader::from_file(&path).with_context(|| format!("Invalid policy file {}", path.display()))
        }
        None => {
            info!("No policy file configured, using default decisions only");
            Ok(Vec::new())
        }
    }
}

fn read_request(path: Option<PathBuf>) -> anyhow::Result<ToolExecutionRequest> {
    let raw = match path {
        Some(path) => {
            std::fs::read_to_string(&path).with_context(|| format!("Failed to read request {}", path.display()))?
        }
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("Failed to read request from stdin")?;
            buf
        }
    };
    serde_json::from_str(&raw).context("Malformed request")
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info
            .location()
            .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()))
            .unwrap_or_else(|| "unknown".to_string());

        let message = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };

        eprintln!("PANIC: {} at {}", message, location);
    }));
}

fn init_tracing(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_writer(std::io::stderr);

    if config.log_format == "json" {
        subscriber.json().init();
    } else {
        subscriber.init();
    }

    Ok(())
}
