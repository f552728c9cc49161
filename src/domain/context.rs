//! Execution context of a single pipeline run.
//!
//! The webhook payload arrives as loosely-typed environment variables; this
//! module turns them into exactly one [`EventContext`] variant or fails with
//! a [`ConfigError`] before anything else happens.

use regex::{Regex, RegexBuilder};
use std::fmt;
use std::str::FromStr;

use super::error::ConfigError;
use crate::infra::env::{self, WebhookEnv};

const DEFAULT_TAGGING_PATTERN: &str = "junie";

/// A credential that must never show up in logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

impl fmt::Display for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// How agent changes on merge request tasks are published.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PublishMode {
    /// Commit and push onto the merge request source branch.
    Append,
    /// Push a fresh branch and open a new merge request.
    #[default]
    New,
}

impl fmt::Display for PublishMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Append => write!(f, "append"),
            Self::New => write!(f, "new"),
        }
    }
}

impl FromStr for PublishMode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "append" => Ok(Self::Append),
            "new" => Ok(Self::New),
            other => Err(format!("unknown publish mode '{other}'")),
        }
    }
}

/// Options supplied on the `run` command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CliOptions {
    pub cleanup_after_idle_run: bool,
    pub publish_mode: PublishMode,
    pub custom_prompt: Option<String>,
}

impl CliOptions {
    /// Blank prompts are treated as not supplied.
    pub fn new(
        cleanup_after_idle_run: bool,
        publish_mode: PublishMode,
        custom_prompt: Option<String>,
    ) -> Self {
        Self {
            cleanup_after_idle_run,
            publish_mode,
            custom_prompt: custom_prompt.filter(|prompt| !prompt.trim().is_empty()),
        }
    }
}

/// Merge request state transition reported by GitLab.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleAction {
    Open,
    Update,
    Reopen,
    Close,
    Merge,
    /// Actions GitLab may add later (approval and friends); kept verbatim.
    Other(String),
}

impl fmt::Display for LifecycleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Update => write!(f, "update"),
            Self::Reopen => write!(f, "reopen"),
            Self::Close => write!(f, "close"),
            Self::Merge => write!(f, "merge"),
            Self::Other(action) => write!(f, "{action}"),
        }
    }
}

impl From<&str> for LifecycleAction {
    fn from(s: &str) -> Self {
        match s {
            "open" => Self::Open,
            "update" => Self::Update,
            "reopen" => Self::Reopen,
            "close" => Self::Close,
            "merge" => Self::Merge,
            other => Self::Other(other.to_string()),
        }
    }
}

/// Fields shared by every event kind.
#[derive(Debug, Clone)]
pub struct ContextCommon {
    pub project_id: u64,
    pub project_name: String,
    pub pipeline_id: u64,
    pub api_v4_url: String,
    pub default_branch: Option<String>,
    pub gitlab_token: Secret,
    pub agent_api_key: Secret,
    pub agent_version: Option<String>,
    pub agent_model: Option<String>,
    pub use_mcp: bool,
    pub tagging_pattern: Regex,
    pub cli: CliOptions,
}

/// A note left on an issue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueCommentEvent {
    pub issue_id: u64,
    pub issue_url: String,
    pub comment_text: String,
    pub comment_id: u64,
}

/// A note left on a merge request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequestCommentEvent {
    pub merge_request_id: u64,
    pub source_branch: String,
    pub target_branch: String,
    pub discussion_id: String,
    pub comment_text: String,
    pub comment_id: u64,
}

/// A merge request lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequestLifecycleEvent {
    pub merge_request_id: u64,
    pub source_branch: String,
    pub target_branch: String,
    pub title: String,
    pub description: String,
    pub action: LifecycleAction,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventContext {
    IssueComment(IssueCommentEvent),
    MergeRequestComment(MergeRequestCommentEvent),
    MergeRequestLifecycle(MergeRequestLifecycleEvent),
}

impl EventContext {
    pub fn is_mr(&self) -> bool {
        !matches!(self, Self::IssueComment(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::IssueComment(_) | Self::MergeRequestComment(_) => "note",
            Self::MergeRequestLifecycle(_) => "merge_request",
        }
    }
}

/// Everything a run needs to know about the triggering event.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub common: ContextCommon,
    pub event: EventContext,
}

impl ExecutionContext {
    pub fn from_env(env: &WebhookEnv, cli: CliOptions) -> Result<Self, ConfigError> {
        let project_id = env.require_number(env::PROJECT_ID)?;
        let event_kind = env.require(env::EVENT_KIND)?.to_string();

        let pattern = env
            .non_empty(env::JUNIE_BOT_TAGGING_PATTERN)
            .unwrap_or(DEFAULT_TAGGING_PATTERN);
        let tagging_pattern = compile_tagging_pattern(pattern)?;

        let common = ContextCommon {
            project_id,
            project_name: env
                .non_empty(env::PROJECT_NAME)
                .unwrap_or("unknown")
                .to_string(),
            pipeline_id: env.number(env::PIPELINE_ID)?.unwrap_or(0),
            api_v4_url: env.require(env::API_V4_URL)?.to_string(),
            default_branch: env.non_empty(env::DEFAULT_BRANCH).map(str::to_string),
            gitlab_token: Secret::new(env.require(env::GITLAB_TOKEN)?),
            agent_api_key: Secret::new(env.require(env::JUNIE_API_KEY)?),
            agent_version: env.non_empty(env::JUNIE_VERSION).map(str::to_string),
            agent_model: env.non_empty(env::JUNIE_MODEL).map(str::to_string),
            use_mcp: env.flag(env::USE_MCP),
            tagging_pattern,
            cli,
        };

        let event = match event_kind.as_str() {
            "note" => note_event(env)?,
            "merge_request" => merge_request_event(env)?,
            other => return Err(ConfigError::UnsupportedEvent(other.to_string())),
        };

        let context = Self { common, event };
        log::debug!("GitLab execution context: {context:#?}");
        Ok(context)
    }

    pub fn is_mr(&self) -> bool {
        self.event.is_mr()
    }
}

pub fn compile_tagging_pattern(pattern: &str) -> Result<Regex, ConfigError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

fn note_event(env: &WebhookEnv) -> Result<EventContext, ConfigError> {
    let comment_text = env.non_empty(env::COMMENT_TEXT);
    let comment_id = env.number(env::OBJECT_ID)?;
    let (Some(comment_text), Some(comment_id)) = (comment_text, comment_id) else {
        return Err(ConfigError::MissingNoteComment);
    };

    if let (Some(issue_id), Some(issue_url)) =
        (env.number(env::ISSUE_ID)?, env.non_empty(env::ISSUE_URL))
    {
        return Ok(EventContext::IssueComment(IssueCommentEvent {
            issue_id,
            issue_url: issue_url.to_string(),
            comment_text: comment_text.to_string(),
            comment_id,
        }));
    }

    if let (Some(merge_request_id), Some(source), Some(target), Some(discussion)) = (
        env.number(env::MERGE_REQUEST_ID)?,
        env.non_empty(env::MERGE_REQUEST_SOURCE_BRANCH),
        env.non_empty(env::MERGE_REQUEST_TARGET_BRANCH),
        env.non_empty(env::DISCUSSION_ID),
    ) {
        return Ok(EventContext::MergeRequestComment(MergeRequestCommentEvent {
            merge_request_id,
            source_branch: source.to_string(),
            target_branch: target.to_string(),
            discussion_id: discussion.to_string(),
            comment_text: comment_text.to_string(),
            comment_id,
        }));
    }

    Err(ConfigError::InvalidNoteEvent)
}

fn merge_request_event(env: &WebhookEnv) -> Result<EventContext, ConfigError> {
    let merge_request_id = env.number(env::MR_EVENT_ID)?;
    let source_branch = env.non_empty(env::MR_EVENT_SOURCE_BRANCH);
    let target_branch = env.non_empty(env::MR_EVENT_TARGET_BRANCH);
    let title = env.non_empty(env::MR_EVENT_TITLE);
    // An empty description is a valid payload value; only absence is an error.
    let description = env.string(env::MR_EVENT_DESCRIPTION);
    let action = env.non_empty(env::MR_EVENT_ACTION);
    let url = env.non_empty(env::MR_EVENT_URL);

    match (
        merge_request_id,
        source_branch,
        target_branch,
        title,
        description,
        action,
        url,
    ) {
        (
            Some(merge_request_id),
            Some(source_branch),
            Some(target_branch),
            Some(title),
            Some(description),
            Some(action),
            Some(url),
        ) => Ok(EventContext::MergeRequestLifecycle(
            MergeRequestLifecycleEvent {
                merge_request_id,
                source_branch: source_branch.to_string(),
                target_branch: target_branch.to_string(),
                title: title.to_string(),
                description: description.to_string(),
                action: LifecycleAction::from(action),
                url: url.to_string(),
            },
        )),
        _ => {
            let missing = [
                (env::MR_EVENT_ID, merge_request_id.is_some()),
                (env::MR_EVENT_SOURCE_BRANCH, source_branch.is_some()),
                (env::MR_EVENT_TARGET_BRANCH, target_branch.is_some()),
                (env::MR_EVENT_TITLE, title.is_some()),
                (env::MR_EVENT_DESCRIPTION, description.is_some()),
                (env::MR_EVENT_ACTION, action.is_some()),
                (env::MR_EVENT_URL, url.is_some()),
            ]
            .into_iter()
            .filter(|(_, present)| !present)
            .map(|(var, _)| var.key.to_string())
            .collect();
            Err(ConfigError::MissingFields(missing))
        }
    }
}
