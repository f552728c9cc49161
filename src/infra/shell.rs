//! Executable lookup and subprocess execution for git, npm and junie.

use std::path::{Path, PathBuf};
use tokio::process::Command;

use crate::domain::CommandError;

/// Fallback when the job image runs without a usable PATH.
const DEFAULT_SEARCH_PATHS: &[&str] = &[
    "/usr/local/bin",
    "/usr/bin",
    "/bin",
    "/usr/local/sbin",
    "/usr/sbin",
    "/sbin",
];

/// Resolve a program name against PATH; explicit paths are taken as-is.
pub fn find_bin(command: &str) -> Option<PathBuf> {
    let path = Path::new(command);
    if path.components().count() > 1 {
        return path.is_file().then(|| path.to_path_buf());
    }

    search_paths()
        .into_iter()
        .map(|dir| dir.join(command))
        .find(|candidate| candidate.is_file())
}

fn search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(env_path) = std::env::var_os("PATH") {
        push_unique_paths(&mut paths, std::env::split_paths(&env_path));
    }
    if paths.is_empty() {
        push_unique_paths(&mut paths, DEFAULT_SEARCH_PATHS.iter().map(PathBuf::from));
    }
    paths
}

fn push_unique_paths<I>(dest: &mut Vec<PathBuf>, paths: I)
where
    I: IntoIterator<Item = PathBuf>,
{
    for path in paths {
        if !dest.contains(&path) {
            dest.push(path);
        }
    }
}

/// Captured output of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
}

/// A subprocess invocation. Values registered with [`CommandSpec::redact`]
/// are masked wherever the command line is logged or reported.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    envs: Vec<(String, String)>,
    cwd: Option<PathBuf>,
    redactions: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            cwd: None,
            redactions: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn redact(mut self, value: impl Into<String>) -> Self {
        let value = value.into();
        if !value.is_empty() {
            self.redactions.push(value);
        }
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn arguments(&self) -> &[String] {
        &self.args
    }

    pub fn env_value(&self, key: &str) -> Option<&str> {
        self.envs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Command line safe for logs.
    pub fn display(&self) -> String {
        let line = std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        self.scrub(&line)
    }

    fn scrub(&self, text: &str) -> String {
        self.redactions
            .iter()
            .fold(text.to_string(), |acc, secret| acc.replace(secret.as_str(), "***"))
    }
}

/// Run a command to completion; a non-zero exit is an error carrying stderr.
pub async fn run(spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
    let program =
        find_bin(&spec.program).ok_or_else(|| CommandError::NotFound(spec.program.clone()))?;
    log::debug!("Executing: {}", spec.display());

    let mut command = Command::new(&program);
    command.args(&spec.args).kill_on_drop(true);
    for (key, value) in &spec.envs {
        command.env(key, value);
    }
    if let Some(cwd) = &spec.cwd {
        command.current_dir(cwd);
    }

    let output = command.output().await.map_err(|source| CommandError::Spawn {
        program: spec.program.clone(),
        source,
    })?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    if !output.status.success() {
        return Err(CommandError::Failed {
            program: spec.display(),
            status: output.status.to_string(),
            stdout: spec.scrub(stdout.trim()),
            stderr: spec.scrub(stderr.trim()),
        });
    }

    Ok(CommandOutput { stdout, stderr })
}
