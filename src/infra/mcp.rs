//! MCP server configuration consumed by the Junie CLI.

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::domain::Secret;

const GITLAB_MCP_PACKAGE: &str = "@zereight/mcp-gitlab";

/// What the GitLab MCP server needs to talk to the current project.
#[derive(Debug, Clone)]
pub struct McpSettings {
    pub api_v4_url: String,
    pub token: Secret,
    pub project_id: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct McpConfig {
    mcp_servers: BTreeMap<&'static str, McpServer>,
}

#[derive(Debug, Serialize)]
struct McpServer {
    command: &'static str,
    args: Vec<&'static str>,
    env: BTreeMap<&'static str, String>,
}

/// `~/.junie/mcp/mcp.json`
pub fn default_config_path() -> Option<PathBuf> {
    home::home_dir().map(|home| home.join(".junie").join("mcp").join("mcp.json"))
}

pub fn render_config(settings: &McpSettings) -> Result<String> {
    let env = BTreeMap::from([
        (
            "GITLAB_PERSONAL_ACCESS_TOKEN",
            settings.token.expose().to_string(),
        ),
        ("GITLAB_API_URL", settings.api_v4_url.clone()),
        ("GITLAB_READ_ONLY_MODE", "false".to_string()),
        ("USE_GITLAB_WIKI", "false".to_string()),
        ("USE_MILESTONE", "false".to_string()),
        ("USE_PIPELINE", "true".to_string()),
        ("GITLAB_ALLOWED_PROJECT_IDS", settings.project_id.to_string()),
    ]);
    let config = McpConfig {
        mcp_servers: BTreeMap::from([(
            "gitlab",
            McpServer {
                command: "npx",
                args: vec!["-y", GITLAB_MCP_PACKAGE],
                env,
            },
        )]),
    };
    serde_json::to_string_pretty(&config).context("serialize MCP config")
}

/// Write the config, creating parent directories as needed.
pub fn write_config(path: &Path, settings: &McpSettings) -> Result<()> {
    log::info!("Initializing MCP config...");
    let json = render_config(settings)?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create MCP config dir {}", parent.display()))?;
    }
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    log::info!("MCP config created at {}", path.display());
    Ok(())
}
