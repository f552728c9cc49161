//! Runs one event end to end: extract, prepare, run the agent, publish, report.

use anyhow::{Context, Result, bail};

use crate::application::extract::extract_task;
use crate::application::feedback::dispatch_all;
use crate::domain::{ExecutionContext, PublishMode, Task, TaskExtraction};
use crate::infra::agent::{AgentOutcome, AgentRequest, AgentSetup, CodingAgent};
use crate::infra::git::{GitWorkspace, has_staged_changes};
use crate::infra::gitlab::{GitLabApi, NewMergeRequest};
use crate::infra::mcp::McpSettings;

const DEFAULT_COMMIT_SUBJECT: &str = "task completed";

/// What a finished run did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReport {
    /// No task in the event.
    Idle { reason: String, cleaned_up: bool },
    Completed {
        outcome: AgentOutcome,
        publication: Publication,
    },
}

/// Where the agent's changes ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Publication {
    NothingStaged,
    PushedToBranch(String),
    MergeRequest { branch: String, url: String },
}

impl Publication {
    fn created_mr_url(&self) -> Option<&str> {
        match self {
            Self::MergeRequest { url, .. } => Some(url),
            _ => None,
        }
    }
}

pub fn commit_message(task_name: Option<&str>) -> String {
    format!(
        "generated changes by Junie: {}",
        task_name
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_COMMIT_SUBJECT)
    )
}

pub fn new_branch_name() -> String {
    format!("junie-{}", chrono::Utc::now().timestamp_millis())
}

pub struct Executor<'a> {
    gitlab: &'a dyn GitLabApi,
    git: &'a mut dyn GitWorkspace,
    agent: &'a dyn CodingAgent,
}

impl<'a> Executor<'a> {
    pub fn new(
        gitlab: &'a dyn GitLabApi,
        git: &'a mut dyn GitWorkspace,
        agent: &'a dyn CodingAgent,
    ) -> Self {
        Self { gitlab, git, agent }
    }

    pub async fn execute(&mut self, context: &ExecutionContext) -> Result<RunReport> {
        let task = match extract_task(self.gitlab, context)
            .await
            .context("task extraction failed")?
        {
            TaskExtraction::Found(task) => task,
            TaskExtraction::Failed(reason) => return self.idle(context, reason).await,
        };

        let common = &context.common;
        let setup = AgentSetup {
            version: common.agent_version.clone(),
            mcp: common.use_mcp.then(|| McpSettings {
                api_v4_url: common.api_v4_url.clone(),
                token: common.gitlab_token.clone(),
                project_id: common.project_id,
            }),
        };
        self.agent.prepare(&setup).await?;

        dispatch_all(self.gitlab, &task.start_feedback()).await;

        let checkout_branch = task.checkout_branch();
        if let Some(branch) = checkout_branch {
            log::info!("Checking out the branch {branch}");
            self.git.checkout_branch(branch).await?;
        }

        let prompt = task.prompt(common.use_mcp)?;
        let outcome = self
            .agent
            .run(AgentRequest {
                task: &prompt,
                api_key: &common.agent_api_key,
                model: common.agent_model.as_deref(),
            })
            .await?;

        let message = commit_message(outcome.task_name.as_deref());
        let publication = match checkout_branch {
            Some(branch)
                if task.is_merge_request() && common.cli.publish_mode == PublishMode::Append =>
            {
                self.push_to_branch(branch, &message).await?
            }
            _ => self.push_as_merge_request(context, &task, &outcome, &message).await?,
        };

        let finish = task.finish_feedback(
            outcome.result.as_deref(),
            outcome.task_name.as_deref(),
            publication.created_mr_url(),
        );
        dispatch_all(self.gitlab, &finish).await;

        Ok(RunReport::Completed {
            outcome,
            publication,
        })
    }

    async fn idle(&self, context: &ExecutionContext, reason: String) -> Result<RunReport> {
        log::info!("No task detected: {reason}");
        let common = &context.common;
        let cleaned_up = if common.cli.cleanup_after_idle_run {
            log::info!("Cleaning up...");
            self.gitlab
                .delete_pipeline(common.project_id, common.pipeline_id)
                .await
                .context("delete idle pipeline")?;
            true
        } else {
            log::info!("Auto-cleanup disabled and will be skipped");
            false
        };
        Ok(RunReport::Idle { reason, cleaned_up })
    }

    /// Stage everything; true when something ended up in the index.
    async fn stage(&mut self) -> Result<bool> {
        self.git.stage_all().await?;
        let files = self.git.status().await?;
        let staged = has_staged_changes(&files);
        if !staged {
            log::warn!("No changes to commit");
        }
        Ok(staged)
    }

    async fn push_to_branch(&mut self, branch: &str, message: &str) -> Result<Publication> {
        if !self.stage().await? {
            return Ok(Publication::NothingStaged);
        }
        log::info!("Changes will be pushed to the current branch {branch}.");
        self.git.commit(message).await?;
        self.git.push(branch).await?;
        Ok(Publication::PushedToBranch(branch.to_string()))
    }

    async fn push_as_merge_request(
        &mut self,
        context: &ExecutionContext,
        task: &Task<'_>,
        outcome: &AgentOutcome,
        message: &str,
    ) -> Result<Publication> {
        let target_branch = if task.is_merge_request() {
            task.checkout_branch()
        } else {
            context.common.default_branch.as_deref()
        };
        let Some(target_branch) = target_branch else {
            bail!("Can't determine target branch for merge request");
        };

        if !self.stage().await? {
            return Ok(Publication::NothingStaged);
        }

        let branch = new_branch_name();
        log::info!(
            "Changes will be pushed to a new branch {branch} and a merge request will be created."
        );
        self.git.checkout_new_branch(&branch).await?;
        self.git.commit(message).await?;
        self.git.push(&branch).await?;

        let request = NewMergeRequest {
            source_branch: branch.clone(),
            target_branch: target_branch.to_string(),
            title: task.title().to_string(),
            description: task.mr_introduction(outcome.result.as_deref()),
        };
        let merge_request = self
            .gitlab
            .create_merge_request(context.common.project_id, &request)
            .await
            .context("create merge request")?;
        log::info!("Merge request created: {}", merge_request.web_url);

        Ok(Publication::MergeRequest {
            branch,
            url: merge_request.web_url,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CliOptions;
    use crate::prompts::{MR_INTRO_HEADER, STARTED_MESSAGE};
    use crate::testing::{self, CREATED_MR_URL, FakeAgent, FakeGit, FakeGitLab};

    #[test]
    fn test_commit_message() {
        assert_eq!(
            commit_message(Some("Fix typo")),
            "generated changes by Junie: Fix typo"
        );
        assert_eq!(
            commit_message(None),
            "generated changes by Junie: task completed"
        );
    }

    #[test]
    fn test_new_branch_name_has_timestamp() {
        let name = new_branch_name();
        let millis = name.strip_prefix("junie-").expect("prefix");
        assert!(millis.parse::<i64>().is_ok());
    }

    #[tokio::test]
    async fn test_issue_with_changes_opens_merge_request() {
        let api = FakeGitLab::default().with_issue(3, "Crash on start", Some("It crashes"));
        let mut git = FakeGit::with_staged_changes();
        let agent = FakeAgent::returning(Some("Fixed the crash"), Some("Fix crash"));
        let context = testing::issue_context(CliOptions::default());

        let report = Executor::new(&api, &mut git, &agent)
            .execute(&context)
            .await
            .unwrap();

        let RunReport::Completed { publication, .. } = report else {
            panic!("expected a completed run");
        };
        let Publication::MergeRequest { branch, url } = publication else {
            panic!("expected a merge request");
        };
        assert!(branch.starts_with("junie-"));
        assert_eq!(url, CREATED_MR_URL);

        assert_eq!(
            git.ops,
            vec![
                "add".to_string(),
                format!("checkout -b {branch}"),
                "commit generated changes by Junie: Fix crash".to_string(),
                format!("push {branch}"),
            ]
        );

        let created = api.created_mrs();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].target_branch, "main");
        assert_eq!(created[0].title, "Crash on start");
        assert_eq!(
            created[0].description,
            format!("{MR_INTRO_HEADER}Fixed the crash")
        );

        assert_eq!(
            api.calls(),
            vec![
                "get_issue 3",
                "add_issue_comment 3",
                "award_issue_note_emoji 3 900 thumbsup",
                "create_merge_request",
                "add_issue_comment 3",
            ]
        );
        assert_eq!(
            api.bodies(),
            vec![
                STARTED_MESSAGE.to_string(),
                format!("✅ Junie finished\n\n📝 Merge Request link: {CREATED_MR_URL}"),
            ]
        );
        assert_eq!(agent.setups().len(), 1);
        assert!(agent.setups()[0].mcp.is_none());
    }

    #[tokio::test]
    async fn test_append_mode_pushes_to_source_branch() {
        let api = FakeGitLab::default().with_merge_request(11, "Add parser", Some("desc"));
        let mut git = FakeGit::with_staged_changes();
        let agent = FakeAgent::returning(Some("Renamed"), None);
        let cli = CliOptions::new(false, PublishMode::Append, None);
        let context = testing::mr_comment_context(cli);

        let report = Executor::new(&api, &mut git, &agent)
            .execute(&context)
            .await
            .unwrap();

        assert!(matches!(
            report,
            RunReport::Completed { publication: Publication::PushedToBranch(ref branch), .. } if branch == "feature"
        ));
        assert_eq!(
            git.ops,
            vec![
                "checkout feature",
                "add",
                "commit generated changes by Junie: task completed",
                "push feature",
            ]
        );
        assert!(api.created_mrs().is_empty());
        assert_eq!(
            api.bodies().last().map(String::as_str),
            Some("✅ Junie finished\n\nRenamed")
        );
        assert!(
            api.calls()
                .iter()
                .all(|call| !call.starts_with("add_merge_request_note"))
        );
    }

    #[tokio::test]
    async fn test_new_mode_on_merge_request_targets_source_branch() {
        let api = FakeGitLab::default().with_merge_request(11, "Add parser", Some("desc"));
        let mut git = FakeGit::with_staged_changes();
        let agent = FakeAgent::returning(Some("Done"), None);
        let context = testing::mr_comment_context(CliOptions::default());

        Executor::new(&api, &mut git, &agent)
            .execute(&context)
            .await
            .unwrap();

        let created = api.created_mrs();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].target_branch, "feature");
    }

    #[tokio::test]
    async fn test_idle_run_with_cleanup_deletes_pipeline() {
        let api = FakeGitLab::default();
        let mut git = FakeGit::default();
        let agent = FakeAgent::default();
        let context = testing::issue_context_with_comment(
            "no mention here",
            CliOptions::new(true, PublishMode::New, None),
        );

        let report = Executor::new(&api, &mut git, &agent)
            .execute(&context)
            .await
            .unwrap();

        assert_eq!(
            report,
            RunReport::Idle {
                reason: "Comment doesn't contain mention to Junie".into(),
                cleaned_up: true,
            }
        );
        assert_eq!(api.calls(), vec!["delete_pipeline 7"]);
        assert!(git.ops.is_empty());
        assert!(agent.tasks().is_empty());
    }

    #[tokio::test]
    async fn test_idle_run_without_cleanup_keeps_pipeline() {
        let api = FakeGitLab::default();
        let mut git = FakeGit::default();
        let agent = FakeAgent::default();
        let context = testing::lifecycle_context(CliOptions::default());

        let report = Executor::new(&api, &mut git, &agent)
            .execute(&context)
            .await
            .unwrap();

        assert!(matches!(report, RunReport::Idle { cleaned_up: false, .. }));
        assert!(api.calls().is_empty());
    }

    #[tokio::test]
    async fn test_no_staged_changes_reports_outcome() {
        let api = FakeGitLab::default().with_issue(3, "Question", Some("Why?"));
        let mut git = FakeGit::default();
        let agent = FakeAgent::returning(Some("Because."), Some("Answer"));
        let context = testing::issue_context(CliOptions::default());

        let report = Executor::new(&api, &mut git, &agent)
            .execute(&context)
            .await
            .unwrap();

        assert!(matches!(
            report,
            RunReport::Completed {
                publication: Publication::NothingStaged,
                ..
            }
        ));
        assert_eq!(git.ops, vec!["add"]);
        assert!(api.created_mrs().is_empty());
        assert_eq!(
            api.bodies().last().map(String::as_str),
            Some("✅ Junie finished\n\n**Task:** Answer\n\nBecause.")
        );
    }

    #[tokio::test]
    async fn test_feedback_failures_are_not_fatal() {
        let api = FakeGitLab::default()
            .with_issue(3, "Crash", Some("It crashes"))
            .with_failing_writes();
        let mut git = FakeGit::with_staged_changes();
        let agent = FakeAgent::returning(Some("Fixed"), None);
        let context = testing::issue_context(CliOptions::default());

        let report = Executor::new(&api, &mut git, &agent)
            .execute(&context)
            .await
            .unwrap();

        assert!(matches!(report, RunReport::Completed { .. }));
        assert_eq!(api.created_mrs().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_default_branch_is_fatal_for_issues() {
        let api = FakeGitLab::default().with_issue(3, "Crash", None);
        let mut git = FakeGit::with_staged_changes();
        let agent = FakeAgent::returning(None, None);
        let mut context = testing::issue_context(CliOptions::default());
        context.common.default_branch = None;

        let err = Executor::new(&api, &mut git, &agent)
            .execute(&context)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Can't determine target branch"));
        assert!(git.ops.is_empty());
    }

    #[tokio::test]
    async fn test_mcp_setup_and_prompt_note() {
        let api = FakeGitLab::default().with_issue(3, "Crash", None);
        let mut git = FakeGit::default();
        let agent = FakeAgent::returning(None, None);
        let mut context = testing::issue_context(CliOptions::default());
        context.common.use_mcp = true;

        Executor::new(&api, &mut git, &agent)
            .execute(&context)
            .await
            .unwrap();

        let setups = agent.setups();
        let mcp = setups[0].mcp.as_ref().expect("mcp settings");
        assert_eq!(mcp.project_id, 42);
        assert_eq!(mcp.api_v4_url, "https://gitlab.example.com/api/v4");
        assert!(agent.tasks()[0].contains("current issue ID: 3"));
        assert_eq!(
            api.bodies().last().map(String::as_str),
            Some("✅ Junie finished\n\nTask completed. No changes were made.")
        );
    }
}
