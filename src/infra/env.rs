//! Typed access to the CI job environment.
//!
//! The webhook created by `init` maps GitLab payload fields onto the
//! variables listed here; the pipeline job then sees them as plain
//! environment variables.

use std::collections::HashMap;

use crate::domain::ConfigError;

/// One environment variable of the webhook contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvVar {
    pub key: &'static str,
    /// Value written into the webhook template, if the variable comes from the payload.
    pub template: Option<&'static str>,
}

const fn var(key: &'static str) -> EnvVar {
    EnvVar {
        key,
        template: None,
    }
}

const fn mapped(key: &'static str, template: &'static str) -> EnvVar {
    EnvVar {
        key,
        template: Some(template),
    }
}

pub const JUNIE_WEBHOOK: EnvVar = mapped("JUNIE_WEBHOOK", "true");
pub const JUNIE_BOT_TAGGING_PATTERN: EnvVar = var("JUNIE_BOT_TAGGING_PATTERN");
pub const JUNIE_VERSION: EnvVar = var("JUNIE_VERSION");
pub const USE_MCP: EnvVar = mapped("USE_MCP", "true");
pub const JUNIE_MODEL: EnvVar = var("JUNIE_MODEL");

pub const API_V4_URL: EnvVar = var("CI_API_V4_URL");
pub const DEFAULT_BRANCH: EnvVar = var("CI_DEFAULT_BRANCH");
pub const PROJECT_ID: EnvVar = var("CI_PROJECT_ID");
pub const PROJECT_NAME: EnvVar = var("CI_PROJECT_NAME");
pub const PIPELINE_ID: EnvVar = var("CI_PIPELINE_ID");

pub const EVENT_KIND: EnvVar = mapped("EVENT_KIND", "{{object_kind}}");

pub const GITLAB_TOKEN: EnvVar = var("GITLAB_TOKEN_FOR_JUNIE");
pub const JUNIE_API_KEY: EnvVar = var("JUNIE_API_KEY");

pub const ISSUE_ID: EnvVar = mapped("ISSUE_ID", "{{issue.iid}}");
pub const COMMENT_TEXT: EnvVar = mapped("COMMENT_TEXT", "{{object_attributes.note}}");
pub const ISSUE_URL: EnvVar = mapped("ISSUE_URL", "{{issue.url}}");

pub const MERGE_REQUEST_ID: EnvVar = mapped("MERGE_REQUEST_ID", "{{merge_request.iid}}");
pub const MERGE_REQUEST_SOURCE_BRANCH: EnvVar = mapped(
    "MERGE_REQUEST_SOURCE_BRANCH",
    "{{merge_request.source_branch}}",
);
pub const MERGE_REQUEST_TARGET_BRANCH: EnvVar = mapped(
    "MERGE_REQUEST_TARGET_BRANCH",
    "{{merge_request.target_branch}}",
);
pub const DISCUSSION_ID: EnvVar = mapped("DISCUSSION_ID", "{{object_attributes.discussion_id}}");

pub const MR_EVENT_ID: EnvVar = mapped("MR_EVENT_ID", "{{object_attributes.iid}}");
pub const MR_EVENT_SOURCE_BRANCH: EnvVar = mapped(
    "MR_EVENT_SOURCE_BRANCH",
    "{{object_attributes.source_branch}}",
);
pub const MR_EVENT_TARGET_BRANCH: EnvVar = mapped(
    "MR_EVENT_TARGET_BRANCH",
    "{{object_attributes.target_branch}}",
);
pub const MR_EVENT_TITLE: EnvVar = mapped("MR_EVENT_TITLE", "{{object_attributes.title}}");
pub const MR_EVENT_DESCRIPTION: EnvVar =
    mapped("MR_EVENT_DESCRIPTION", "{{object_attributes.description}}");
pub const MR_EVENT_ACTION: EnvVar = mapped("MR_EVENT_ACTION", "{{object_attributes.action}}");
pub const MR_EVENT_URL: EnvVar = mapped("MR_EVENT_URL", "{{object_attributes.url}}");

pub const OBJECT_ID: EnvVar = mapped("OBJECT_ID", "{{object_attributes.id}}");

pub const SERVER_PROTOCOL: EnvVar = var("CI_SERVER_PROTOCOL");
pub const SERVER_HOST: EnvVar = var("CI_SERVER_HOST");
pub const PROJECT_PATH: EnvVar = var("CI_PROJECT_PATH");
pub const PROJECT_DIR: EnvVar = var("CI_PROJECT_DIR");
pub const ENV_FILE: EnvVar = var("ENV_FILE");

/// Every variable of the webhook contract, in template order.
pub const WEBHOOK_VARIABLES: &[EnvVar] = &[
    JUNIE_WEBHOOK,
    JUNIE_BOT_TAGGING_PATTERN,
    JUNIE_VERSION,
    USE_MCP,
    JUNIE_MODEL,
    API_V4_URL,
    DEFAULT_BRANCH,
    PROJECT_ID,
    PROJECT_NAME,
    PIPELINE_ID,
    EVENT_KIND,
    GITLAB_TOKEN,
    JUNIE_API_KEY,
    ISSUE_ID,
    COMMENT_TEXT,
    ISSUE_URL,
    MERGE_REQUEST_ID,
    MERGE_REQUEST_SOURCE_BRANCH,
    MERGE_REQUEST_TARGET_BRANCH,
    DISCUSSION_ID,
    MR_EVENT_ID,
    MR_EVENT_SOURCE_BRANCH,
    MR_EVENT_TARGET_BRANCH,
    MR_EVENT_TITLE,
    MR_EVENT_DESCRIPTION,
    MR_EVENT_ACTION,
    MR_EVENT_URL,
    OBJECT_ID,
];

/// Immutable snapshot of the environment a run was started with.
#[derive(Clone, Default)]
pub struct WebhookEnv {
    values: HashMap<String, String>,
}

impl WebhookEnv {
    pub fn from_process() -> Self {
        Self::from_pairs(std::env::vars())
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Raw value; an empty string is kept as present.
    pub fn string(&self, var: EnvVar) -> Option<&str> {
        self.values.get(var.key).map(String::as_str)
    }

    /// Value that must be present and non-empty.
    pub fn non_empty(&self, var: EnvVar) -> Option<&str> {
        self.string(var).filter(|value| !value.is_empty())
    }

    pub fn require(&self, var: EnvVar) -> Result<&str, ConfigError> {
        self.non_empty(var)
            .ok_or_else(|| ConfigError::MissingVar(var.key.to_string()))
    }

    /// Numeric value; empty counts as absent, garbage is an error.
    pub fn number(&self, var: EnvVar) -> Result<Option<u64>, ConfigError> {
        let Some(raw) = self.non_empty(var) else {
            return Ok(None);
        };
        raw.trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidNumber {
                key: var.key.to_string(),
                value: raw.to_string(),
            })
    }

    pub fn require_number(&self, var: EnvVar) -> Result<u64, ConfigError> {
        self.number(var)?
            .ok_or_else(|| ConfigError::MissingVar(var.key.to_string()))
    }

    /// Only the literal `true` enables a flag.
    pub fn flag(&self, var: EnvVar) -> bool {
        self.string(var) == Some("true")
    }

    /// Keys present in the snapshot; values are never exposed here.
    pub fn detected_keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = WEBHOOK_VARIABLES
            .iter()
            .map(|var| var.key)
            .filter(|key| self.values.contains_key(*key))
            .collect();
        keys.sort_unstable();
        keys
    }
}

impl std::fmt::Debug for WebhookEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebhookEnv")
            .field("keys", &self.detected_keys())
            .finish()
    }
}
