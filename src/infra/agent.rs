//! Junie CLI coding agent.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;

use crate::domain::{AgentError, CommandError, Secret};
use crate::infra::mcp::{self, McpSettings};
use crate::infra::shell::{self, CommandSpec};

const JUNIE_PACKAGE: &str = "@jetbrains/junie-cli";
const DEFAULT_CACHE_DIR: &str = "/junieCache";
/// Env var carrying the task payload into the agent process.
pub const TASK_ENV: &str = "EJ_TASK";

/// Everything the agent needs before it can run.
#[derive(Debug, Clone, Default)]
pub struct AgentSetup {
    /// Pinned CLI version; latest when absent.
    pub version: Option<String>,
    pub mcp: Option<McpSettings>,
}

/// A single agent invocation.
#[derive(Debug, Clone)]
pub struct AgentRequest<'a> {
    pub task: &'a str,
    pub api_key: &'a Secret,
    pub model: Option<&'a str>,
}

/// What the agent reported back; both fields are optional in its output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AgentOutcome {
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default, rename = "taskName")]
    pub task_name: Option<String>,
}

impl AgentOutcome {
    pub fn parse(stdout: &str) -> Result<Self, AgentError> {
        Ok(serde_json::from_str(stdout.trim())?)
    }
}

#[async_trait]
pub trait CodingAgent: Send + Sync {
    async fn prepare(&self, setup: &AgentSetup) -> Result<()>;
    async fn run(&self, request: AgentRequest<'_>) -> Result<AgentOutcome, AgentError>;
}

pub struct JunieCli {
    cache_dir: PathBuf,
    mcp_config_path: PathBuf,
}

impl JunieCli {
    pub fn new() -> Result<Self> {
        let mcp_config_path =
            mcp::default_config_path().context("cannot resolve home directory for MCP config")?;
        Ok(Self {
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            mcp_config_path,
        })
    }

    pub fn with_paths(cache_dir: impl Into<PathBuf>, mcp_config_path: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            mcp_config_path: mcp_config_path.into(),
        }
    }

    fn install_command(version: Option<&str>) -> CommandSpec {
        let package = match version {
            Some(version) => format!("{JUNIE_PACKAGE}@{version}"),
            None => JUNIE_PACKAGE.to_string(),
        };
        CommandSpec::new("npm").args(["i", "-g"]).arg(package)
    }

    fn run_command(&self, request: &AgentRequest<'_>) -> CommandSpec {
        let mut spec = CommandSpec::new("junie")
            .arg("--auth")
            .arg(request.api_key.expose())
            .arg(format!("--cache-dir={}", self.cache_dir.display()))
            .arg("--output-format=json")
            .env(TASK_ENV, request.task)
            .redact(request.api_key.expose());
        if let Some(model) = request.model {
            spec = spec.arg(format!("--model={model}"));
        }
        spec
    }
}

#[async_trait]
impl CodingAgent for JunieCli {
    async fn prepare(&self, setup: &AgentSetup) -> Result<()> {
        log::info!("Installing Junie CLI...");
        let output = shell::run(&Self::install_command(setup.version.as_deref()))
            .await
            .context("install Junie CLI")?;
        log::info!("{}", output.stdout.trim());

        log::info!("Using MCP: {}", if setup.mcp.is_some() { "yes" } else { "no" });
        if let Some(settings) = &setup.mcp {
            mcp::write_config(&self.mcp_config_path, settings)?;
        }
        Ok(())
    }

    async fn run(&self, request: AgentRequest<'_>) -> Result<AgentOutcome, AgentError> {
        tokio::fs::create_dir_all(&self.cache_dir)
            .await
            .with_context(|| format!("create cache dir {}", self.cache_dir.display()))?;

        log::debug!("Running Junie with task: '{}'", request.task);
        let output = shell::run(&self.run_command(&request))
            .await
            .inspect_err(|err| {
                if let CommandError::Failed { stdout, .. } = err {
                    log::error!("Junie output: {stdout}");
                }
            })
            .context("run Junie")?;
        log::debug!("Full output: {}", output.stdout.trim());

        let outcome = AgentOutcome::parse(&output.stdout)?;
        log::info!(
            "Execution result: {}",
            outcome.result.as_deref().unwrap_or("<none>")
        );
        Ok(outcome)
    }
}
