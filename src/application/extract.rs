//! Turns an execution context into a task, or a reason why there is none.

use crate::application::mention::has_mention;
use crate::domain::{
    EventContext, ExecutionContext, GitLabError, IssueData, MergeRequestData, Task, TaskExtraction,
};
use crate::infra::gitlab::GitLabApi;

const NO_MENTION_REASON: &str = "Comment doesn't contain mention to Junie";
const EMPTY_DESCRIPTION: &str = "(empty description)";

pub async fn extract_task<'a>(
    api: &dyn GitLabApi,
    context: &'a ExecutionContext,
) -> Result<TaskExtraction<'a>, GitLabError> {
    let common = &context.common;

    let task = match &context.event {
        EventContext::IssueComment(event) => {
            if !has_mention(
                api,
                common.project_id,
                &event.comment_text,
                &common.tagging_pattern,
            )
            .await?
            {
                return Ok(TaskExtraction::Failed(NO_MENTION_REASON.to_string()));
            }
            let issue = api.get_issue(common.project_id, event.issue_id).await?;
            Task::IssueComment {
                common,
                event,
                issue: IssueData {
                    title: issue.title,
                    description: issue.description.unwrap_or_default(),
                },
            }
        }
        EventContext::MergeRequestComment(event) => {
            if !has_mention(
                api,
                common.project_id,
                &event.comment_text,
                &common.tagging_pattern,
            )
            .await?
            {
                return Ok(TaskExtraction::Failed(NO_MENTION_REASON.to_string()));
            }
            let merge_request = api
                .get_merge_request(common.project_id, event.merge_request_id)
                .await?;
            Task::MergeRequestComment {
                common,
                event,
                merge_request: MergeRequestData {
                    title: merge_request.title,
                    description: merge_request
                        .description
                        .unwrap_or_else(|| EMPTY_DESCRIPTION.to_string()),
                    web_url: merge_request.web_url,
                },
            }
        }
        EventContext::MergeRequestLifecycle(event) => {
            if common.cli.custom_prompt.is_none() {
                return Ok(TaskExtraction::Failed(format!(
                    "MR event action '{}' no custom prompt set",
                    event.action
                )));
            }
            Task::MergeRequestLifecycle { common, event }
        }
    };

    Ok(TaskExtraction::Found(task))
}
