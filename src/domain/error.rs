//! Domain error types for junie-gitlab.
//!
//! Configuration problems are detected before any side effect happens and are
//! always fatal. Transport-level failures of the collaborators (GitLab REST,
//! subprocesses, agent output) get their own enums so callers can tell a
//! permission problem apart from everything else.

use thiserror::Error;

/// Errors raised while turning the CI environment into an execution context.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} is required")]
    MissingVar(String),

    #[error("{key} must be a number, got '{value}'")]
    InvalidNumber { key: String, value: String },

    #[error("Invalid bot tagging pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Unsupported event kind: {0}")]
    UnsupportedEvent(String),

    #[error("Comment text and ID are required for note events")]
    MissingNoteComment,

    #[error("Invalid note event: missing issue or MR context")]
    InvalidNoteEvent,

    #[error("Missing required fields for merge_request event: {}", .0.join(", "))]
    MissingFields(Vec<String>),
}

/// Errors returned by the GitLab REST client.
#[derive(Debug, Error)]
pub enum GitLabError {
    #[error("GitLab API {operation} failed with status {status}: {body}")]
    Status {
        operation: String,
        status: u16,
        body: String,
    },

    #[error("GitLab API {operation} request failed: {source}")]
    Transport {
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Failed to decode GitLab {operation} response: {source}")]
    Decode {
        operation: String,
        #[source]
        source: reqwest::Error,
    },
}

impl GitLabError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Transport { source, .. } | Self::Decode { source, .. } => {
                source.status().map(|code| code.as_u16())
            }
        }
    }

    /// True for 403 responses, the only failure the token traversal tolerates.
    pub fn is_forbidden(&self) -> bool {
        self.status() == Some(403)
    }
}

/// Errors related to external commands (git, npm, junie).
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("`{0}` executable not found in PATH")]
    NotFound(String),

    #[error("Failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{program}` exited with {status}\nstderr: {stderr}\nstdout: {stdout}")]
    Failed {
        program: String,
        status: String,
        stdout: String,
        stderr: String,
    },
}

/// Errors related to the coding agent run.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Agent output is not valid JSON: {0}")]
    InvalidOutput(#[from] serde_json::Error),

    #[error("Agent run failed: {0}")]
    OperationFailed(#[from] anyhow::Error),
}
