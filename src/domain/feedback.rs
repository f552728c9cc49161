use std::fmt;

/// A single write-back to GitLab announcing progress or results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedbackRequest {
    /// Award emoji on the note that triggered the run.
    IssueCommentReaction {
        project_id: u64,
        issue_id: u64,
        comment_id: u64,
        emoji: String,
    },
    /// Plain comment on an issue.
    IssueComment {
        project_id: u64,
        issue_id: u64,
        body: String,
    },
    /// Reply inside an existing merge request discussion thread.
    MergeRequestDiscussionNote {
        project_id: u64,
        merge_request_id: u64,
        discussion_id: String,
        body: String,
    },
    /// Standalone note on a merge request.
    MergeRequestNote {
        project_id: u64,
        merge_request_id: u64,
        body: String,
    },
}

impl FeedbackRequest {
    /// Text posted by this request, if it carries one.
    pub fn body(&self) -> Option<&str> {
        match self {
            Self::IssueCommentReaction { .. } => None,
            Self::IssueComment { body, .. }
            | Self::MergeRequestDiscussionNote { body, .. }
            | Self::MergeRequestNote { body, .. } => Some(body),
        }
    }
}

impl fmt::Display for FeedbackRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::IssueCommentReaction {
                issue_id,
                comment_id,
                emoji,
                ..
            } => write!(f, "reaction :{emoji}: on note {comment_id} of issue #{issue_id}"),
            Self::IssueComment { issue_id, .. } => write!(f, "comment on issue #{issue_id}"),
            Self::MergeRequestDiscussionNote {
                merge_request_id,
                discussion_id,
                ..
            } => write!(
                f,
                "note in discussion {discussion_id} of merge request !{merge_request_id}"
            ),
            Self::MergeRequestNote {
                merge_request_id, ..
            } => write!(f, "note on merge request !{merge_request_id}"),
        }
    }
}
