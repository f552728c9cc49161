//! Git operations on the CI checkout.
//!
//! Identity and the authenticated `origin` URL are configured lazily, once
//! per [`GitSession`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;

use crate::domain::{ConfigError, Secret};
use crate::infra::env::{self, WebhookEnv};
use crate::infra::shell::{self, CommandSpec};

const GIT_USER_NAME: &str = "Junie";
const GIT_USER_EMAIL: &str = "Junie@jetbrains.com";

/// Paths never staged on behalf of the agent.
const STAGE_EXCLUDES: &[&str] = &["*.orig", "*.rej", "*.class", ".junie"];

/// One entry of `git status --porcelain`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStatus {
    pub index: char,
    pub working: char,
    pub path: String,
}

impl FileStatus {
    pub fn is_staged(&self) -> bool {
        self.index != ' ' && self.index != '?'
    }
}

pub fn has_staged_changes(files: &[FileStatus]) -> bool {
    files.iter().any(FileStatus::is_staged)
}

pub fn parse_porcelain(output: &str) -> Vec<FileStatus> {
    output
        .lines()
        .filter_map(|line| {
            let mut chars = line.chars();
            let index = chars.next()?;
            let working = chars.next()?;
            let path = line.get(3..)?.trim();
            if path.is_empty() {
                return None;
            }
            let path = path
                .rsplit_once(" -> ")
                .map_or(path, |(_, renamed)| renamed)
                .trim_matches('"');
            Some(FileStatus {
                index,
                working,
                path: path.to_string(),
            })
        })
        .collect()
}

#[async_trait]
pub trait GitWorkspace: Send {
    /// Create and switch to a new local branch.
    async fn checkout_new_branch(&mut self, branch: &str) -> Result<()>;
    /// Fetch an existing branch from `origin` and switch to it.
    async fn checkout_branch(&mut self, branch: &str) -> Result<()>;
    async fn stage_all(&mut self) -> Result<()>;
    async fn status(&mut self) -> Result<Vec<FileStatus>>;
    async fn commit(&mut self, message: &str) -> Result<()>;
    async fn push(&mut self, branch: &str) -> Result<()>;
}

/// Values needed to rewrite `origin` with token authentication.
#[derive(Debug, Clone)]
pub struct RemoteSettings {
    pub protocol: Option<String>,
    pub host: Option<String>,
    pub project_path: Option<String>,
    pub token: Secret,
}

impl RemoteSettings {
    pub fn from_env(env: &WebhookEnv, token: Secret) -> Self {
        let value = |var| env.non_empty(var).map(str::to_string);
        Self {
            protocol: value(env::SERVER_PROTOCOL),
            host: value(env::SERVER_HOST),
            project_path: value(env::PROJECT_PATH),
            token,
        }
    }

    /// `<protocol>://oauth2:<token>@<host>/<path>.git`; contains the token, never log it.
    pub fn authenticated_url(&self) -> Result<String, ConfigError> {
        let require = |value: &Option<String>, key: &str| {
            value
                .clone()
                .ok_or_else(|| ConfigError::MissingVar(key.to_string()))
        };
        let protocol = require(&self.protocol, env::SERVER_PROTOCOL.key)?;
        let host = require(&self.host, env::SERVER_HOST.key)?;
        let path = require(&self.project_path, env::PROJECT_PATH.key)?;
        Ok(format!(
            "{protocol}://oauth2:{}@{host}/{path}.git",
            self.token.expose()
        ))
    }
}

/// Where `git config` writes the bot identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigScope {
    Global,
    Local,
}

impl ConfigScope {
    fn flag(self) -> &'static str {
        match self {
            Self::Global => "--global",
            Self::Local => "--local",
        }
    }
}

pub struct GitSession {
    workdir: Option<PathBuf>,
    remote: RemoteSettings,
    safe_directory: Option<String>,
    env_file: Option<String>,
    config_scope: ConfigScope,
    identity_configured: bool,
    remote_configured: bool,
}

impl GitSession {
    pub fn new(remote: RemoteSettings) -> Self {
        Self {
            workdir: None,
            remote,
            safe_directory: None,
            env_file: None,
            config_scope: ConfigScope::Global,
            identity_configured: false,
            remote_configured: false,
        }
    }

    pub fn from_env(env: &WebhookEnv, token: Secret) -> Self {
        let mut session = Self::new(RemoteSettings::from_env(env, token));
        session.safe_directory = env.non_empty(env::PROJECT_DIR).map(str::to_string);
        session.env_file = env.non_empty(env::ENV_FILE).map(str::to_string);
        session
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn with_config_scope(mut self, scope: ConfigScope) -> Self {
        self.config_scope = scope;
        self
    }

    fn git(&self) -> CommandSpec {
        let spec = CommandSpec::new("git").redact(self.remote.token.expose());
        match &self.workdir {
            Some(dir) => spec.current_dir(dir),
            None => spec,
        }
    }

    async fn run(&self, spec: CommandSpec) -> Result<String> {
        let display = spec.display();
        let output = shell::run(&spec)
            .await
            .with_context(|| format!("`{display}` failed"))?;
        Ok(output.stdout)
    }

    async fn ensure_identity(&mut self) -> Result<()> {
        if self.identity_configured {
            return Ok(());
        }
        let scope = self.config_scope.flag();
        self.run(self.git().args(["config", scope, "user.name", GIT_USER_NAME]))
            .await?;
        self.run(self.git().args(["config", scope, "user.email", GIT_USER_EMAIL]))
            .await?;

        let safe_directory = match (&self.safe_directory, &self.workdir) {
            (Some(dir), _) => Some(dir.clone()),
            (None, Some(dir)) => Some(dir.to_string_lossy().to_string()),
            (None, None) => std::env::current_dir()
                .ok()
                .map(|dir| dir.to_string_lossy().to_string()),
        };
        if let Some(dir) = safe_directory {
            self.run(
                self.git()
                    .args(["config", scope, "--add", "safe.directory"])
                    .arg(dir),
            )
            .await?;
        }

        self.identity_configured = true;
        Ok(())
    }

    async fn ensure_remote(&mut self) -> Result<()> {
        if self.remote_configured {
            return Ok(());
        }
        let url = self.remote.authenticated_url()?;
        self.run(self.git().args(["remote", "set-url", "origin"]).arg(url))
            .await?;
        self.remote_configured = true;
        log::info!("Git remote origin configured with token authentication");
        Ok(())
    }

    fn stage_pathspecs(&self) -> Vec<String> {
        let mut specs = vec!["-A".to_string()];
        if let Some(env_file) = &self.env_file {
            specs.push(format!(":!{env_file}"));
        }
        specs.extend(STAGE_EXCLUDES.iter().map(|pattern| format!(":!{pattern}")));
        specs
    }
}

#[async_trait]
impl GitWorkspace for GitSession {
    async fn checkout_new_branch(&mut self, branch: &str) -> Result<()> {
        self.ensure_identity().await?;
        self.run(self.git().args(["checkout", "-b", branch])).await?;
        Ok(())
    }

    async fn checkout_branch(&mut self, branch: &str) -> Result<()> {
        self.ensure_identity().await?;
        self.ensure_remote().await?;
        self.run(self.git().args(["fetch", "origin", branch])).await?;
        self.run(self.git().args(["checkout", branch])).await?;
        Ok(())
    }

    async fn stage_all(&mut self) -> Result<()> {
        self.ensure_identity().await?;
        let specs = self.stage_pathspecs();
        self.run(self.git().arg("add").args(specs)).await?;
        Ok(())
    }

    async fn status(&mut self) -> Result<Vec<FileStatus>> {
        self.ensure_identity().await?;
        let output = self.run(self.git().args(["status", "--porcelain"])).await?;
        let files = parse_porcelain(&output);
        log::info!("Found {} file(s) with changes", files.len());
        for file in &files {
            log::info!(
                "  [index: '{}', working: '{}'] {}",
                file.index,
                file.working,
                file.path
            );
        }
        Ok(files)
    }

    async fn commit(&mut self, message: &str) -> Result<()> {
        self.ensure_identity().await?;
        self.run(self.git().args(["commit", "-m", message])).await?;
        Ok(())
    }

    async fn push(&mut self, branch: &str) -> Result<()> {
        self.ensure_identity().await?;
        self.ensure_remote().await?;
        self.run(self.git().args(["push", "origin", branch])).await?;
        log::info!("Push completed");
        Ok(())
    }
}
