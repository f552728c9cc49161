//! Delivers feedback requests to GitLab.

use crate::domain::{FeedbackRequest, GitLabError};
use crate::infra::gitlab::GitLabApi;

pub async fn submit(api: &dyn GitLabApi, request: &FeedbackRequest) -> Result<(), GitLabError> {
    match request {
        FeedbackRequest::IssueCommentReaction {
            project_id,
            issue_id,
            comment_id,
            emoji,
        } => {
            api.award_issue_note_emoji(*project_id, *issue_id, *comment_id, emoji)
                .await
        }
        FeedbackRequest::IssueComment {
            project_id,
            issue_id,
            body,
        } => api.add_issue_comment(*project_id, *issue_id, body).await,
        FeedbackRequest::MergeRequestDiscussionNote {
            project_id,
            merge_request_id,
            discussion_id,
            body,
        } => {
            api.add_merge_request_discussion_note(
                *project_id,
                *merge_request_id,
                discussion_id,
                body,
            )
            .await
        }
        FeedbackRequest::MergeRequestNote {
            project_id,
            merge_request_id,
            body,
        } => {
            api.add_merge_request_note(*project_id, *merge_request_id, body)
                .await
        }
    }
}

/// Submit in order. A failed item is logged and skipped; returns how many landed.
pub async fn dispatch_all(api: &dyn GitLabApi, requests: &[FeedbackRequest]) -> usize {
    let mut delivered = 0;
    for request in requests {
        log::debug!(
            "Posting {request}: {}",
            request.body().unwrap_or("<no body>")
        );
        match submit(api, request).await {
            Ok(()) => delivered += 1,
            // Reactions usually fail because the emoji is already set.
            Err(err) if matches!(request, FeedbackRequest::IssueCommentReaction { .. }) => {
                log::debug!("Failed to add {request} (probably it's already set): {err}");
            }
            Err(err) => log::warn!("Failed to post {request}: {err}"),
        }
    }
    delivered
}
