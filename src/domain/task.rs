//! Work item derived from a triggering event.
//!
//! A [`Task`] borrows the execution context and carries whatever was fetched
//! from GitLab for it. Everything here is pure: prompts and feedback requests
//! are built but never sent.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::{Value, json};

use super::context::{
    ContextCommon, IssueCommentEvent, MergeRequestCommentEvent, MergeRequestLifecycleEvent,
};
use super::feedback::FeedbackRequest;
use crate::prompts::{
    self, FINISHED_PREFIX, GIT_OPERATIONS_NOTE, MR_INTRO_HEADER, MR_LINK_PREFIX,
    NO_CHANGES_MESSAGE, STARTED_MESSAGE,
};

lazy_static! {
    static ref CODE_REVIEW_TRIGGER: Regex =
        Regex::new(&format!("(?i){}", regex::escape(prompts::CODE_REVIEW_ACTION)))
            .expect("code review trigger regex");
}

const START_REACTION: &str = "thumbsup";

pub fn is_code_review(text: &str) -> bool {
    CODE_REVIEW_TRIGGER.is_match(text)
}

/// Issue fields needed to build a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueData {
    pub title: String,
    pub description: String,
}

/// Merge request fields needed to build a prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeRequestData {
    pub title: String,
    pub description: String,
    pub web_url: String,
}

#[derive(Debug, Clone)]
pub enum Task<'a> {
    IssueComment {
        common: &'a ContextCommon,
        event: &'a IssueCommentEvent,
        issue: IssueData,
    },
    MergeRequestComment {
        common: &'a ContextCommon,
        event: &'a MergeRequestCommentEvent,
        merge_request: MergeRequestData,
    },
    MergeRequestLifecycle {
        common: &'a ContextCommon,
        event: &'a MergeRequestLifecycleEvent,
    },
}

/// Outcome of task extraction. A failure is a normal result, not an error.
#[derive(Debug, Clone)]
pub enum TaskExtraction<'a> {
    Failed(String),
    Found(Task<'a>),
}

impl<'a> Task<'a> {
    pub fn common(&self) -> &'a ContextCommon {
        match self {
            Self::IssueComment { common, .. }
            | Self::MergeRequestComment { common, .. }
            | Self::MergeRequestLifecycle { common, .. } => *common,
        }
    }

    /// Branch to check out before the agent runs; issues work on the current tree.
    pub fn checkout_branch(&self) -> Option<&'a str> {
        match self {
            Self::IssueComment { .. } => None,
            Self::MergeRequestComment { event, .. } => Some(event.source_branch.as_str()),
            Self::MergeRequestLifecycle { event, .. } => Some(event.source_branch.as_str()),
        }
    }

    pub fn is_merge_request(&self) -> bool {
        !matches!(self, Self::IssueComment { .. })
    }

    pub fn title(&self) -> &str {
        match self {
            Self::IssueComment { issue, .. } => &issue.title,
            Self::MergeRequestComment { merge_request, .. } => &merge_request.title,
            Self::MergeRequestLifecycle { event, .. } => &event.title,
        }
    }

    /// Agent task payload: `{"textTask":{"text":"..."}}`.
    pub fn prompt(&self, use_mcp: bool) -> anyhow::Result<String> {
        let mut text = self.task_text()?;
        if use_mcp {
            text.push_str(&prompts::render("mcp_note", &self.mcp_ids())?);
        }
        text.push_str(GIT_OPERATIONS_NOTE);

        Ok(serde_json::to_string(&json!({
            "textTask": { "text": text }
        }))?)
    }

    pub fn mr_introduction(&self, outcome: Option<&str>) -> String {
        format!("{MR_INTRO_HEADER}{}", outcome.unwrap_or_default())
    }

    pub fn start_feedback(&self) -> Vec<FeedbackRequest> {
        match self {
            Self::IssueComment { common, event, .. } => vec![
                FeedbackRequest::IssueComment {
                    project_id: common.project_id,
                    issue_id: event.issue_id,
                    body: STARTED_MESSAGE.to_string(),
                },
                FeedbackRequest::IssueCommentReaction {
                    project_id: common.project_id,
                    issue_id: event.issue_id,
                    comment_id: event.comment_id,
                    emoji: START_REACTION.to_string(),
                },
            ],
            _ => vec![self.reply(STARTED_MESSAGE.to_string())],
        }
    }

    pub fn finish_feedback(
        &self,
        outcome: Option<&str>,
        task_name: Option<&str>,
        created_mr_url: Option<&str>,
    ) -> Vec<FeedbackRequest> {
        vec![self.reply(finish_message(outcome, task_name, created_mr_url))]
    }

    /// Where this task talks back: the issue, the discussion thread or the merge request.
    fn reply(&self, body: String) -> FeedbackRequest {
        match self {
            Self::IssueComment { common, event, .. } => FeedbackRequest::IssueComment {
                project_id: common.project_id,
                issue_id: event.issue_id,
                body,
            },
            Self::MergeRequestComment { common, event, .. } => {
                FeedbackRequest::MergeRequestDiscussionNote {
                    project_id: common.project_id,
                    merge_request_id: event.merge_request_id,
                    discussion_id: event.discussion_id.clone(),
                    body,
                }
            }
            Self::MergeRequestLifecycle { common, event } => FeedbackRequest::MergeRequestNote {
                project_id: common.project_id,
                merge_request_id: event.merge_request_id,
                body,
            },
        }
    }

    fn task_text(&self) -> anyhow::Result<String> {
        let custom_prompt = self.common().cli.custom_prompt.as_deref();
        let prompt_is_review = custom_prompt.is_some_and(is_code_review);

        match self {
            Self::IssueComment { event, issue, .. } => prompts::render(
                "issue_task",
                &json!({
                    "custom_prompt": custom_prompt,
                    "title": issue.title,
                    "description": issue.description,
                    "comment": event.comment_text,
                }),
            ),
            Self::MergeRequestComment {
                event,
                merge_request,
                ..
            } => {
                if prompt_is_review || is_code_review(&event.comment_text) {
                    return code_review_text(event.merge_request_id);
                }
                prompts::render(
                    "merge_request_task",
                    &json!({
                        "custom_prompt": custom_prompt,
                        "title": merge_request.title,
                        "description": merge_request.description,
                        "comment": event.comment_text,
                    }),
                )
            }
            Self::MergeRequestLifecycle { event, .. } => {
                if prompt_is_review {
                    return code_review_text(event.merge_request_id);
                }
                prompts::render(
                    "merge_request_task",
                    &json!({
                        "custom_prompt": custom_prompt,
                        "title": event.title,
                        "description": event.description,
                        "comment": Value::Null,
                    }),
                )
            }
        }
    }

    fn mcp_ids(&self) -> Value {
        let project_id = self.common().project_id;
        match self {
            Self::IssueComment { event, .. } => json!({
                "project_id": project_id,
                "issue_id": event.issue_id,
                "merge_request_id": Value::Null,
                "comment_id": event.comment_id,
            }),
            Self::MergeRequestComment { event, .. } => json!({
                "project_id": project_id,
                "issue_id": Value::Null,
                "merge_request_id": event.merge_request_id,
                "comment_id": event.comment_id,
            }),
            Self::MergeRequestLifecycle { event, .. } => json!({
                "project_id": project_id,
                "issue_id": Value::Null,
                "merge_request_id": event.merge_request_id,
                "comment_id": Value::Null,
            }),
        }
    }
}

fn code_review_text(merge_request_id: u64) -> anyhow::Result<String> {
    prompts::render(
        "code_review",
        &json!({ "merge_request_id": merge_request_id }),
    )
}

/// Completion message. A created merge request wins over the agent outcome;
/// empty strings count as absent.
pub fn finish_message(
    outcome: Option<&str>,
    task_name: Option<&str>,
    created_mr_url: Option<&str>,
) -> String {
    fn present(value: Option<&str>) -> Option<&str> {
        value.filter(|v| !v.is_empty())
    }

    let mut message = String::from(FINISHED_PREFIX);
    if let Some(url) = present(created_mr_url) {
        message.push_str(MR_LINK_PREFIX);
        message.push_str(url);
    } else if let Some(outcome) = present(outcome) {
        if let Some(name) = present(task_name) {
            message.push_str(&format!("**Task:** {name}\n\n"));
        }
        message.push_str(outcome);
    } else {
        message.push_str(NO_CHANGES_MESSAGE);
    }
    message.trim().to_string()
}
