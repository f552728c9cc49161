//! In-memory collaborators for orchestration tests.

use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use crate::domain::{AgentError, CliOptions, ExecutionContext, GitLabError};
use crate::infra::agent::{AgentOutcome, AgentRequest, AgentSetup, CodingAgent};
use crate::infra::env::WebhookEnv;
use crate::infra::git::{FileStatus, GitWorkspace};
use crate::infra::gitlab::{
    AccessToken, GitLabApi, GitLabResult, Group, Issue, MergeRequest, Namespace, NewMergeRequest,
    NewProjectHook, Project, ProjectHook, User,
};

pub const CREATED_MR_URL: &str = "https://gitlab.example.com/g/p/-/merge_requests/99";

const BASE_ENV: &[(&str, &str)] = &[
    ("CI_PROJECT_ID", "42"),
    ("CI_PROJECT_NAME", "demo"),
    ("CI_PIPELINE_ID", "7"),
    ("CI_API_V4_URL", "https://gitlab.example.com/api/v4"),
    ("CI_DEFAULT_BRANCH", "main"),
    ("GITLAB_TOKEN_FOR_JUNIE", "glpat-secret"),
    ("JUNIE_API_KEY", "junie-secret"),
];

pub fn env_with(extra: &[(&str, &str)]) -> WebhookEnv {
    let mut pairs: Vec<(&str, &str)> = BASE_ENV.to_vec();
    pairs.extend_from_slice(extra);
    WebhookEnv::from_pairs(pairs)
}

pub fn issue_context(cli: CliOptions) -> ExecutionContext {
    issue_context_with_comment("@junie please fix the typo", cli)
}

pub fn issue_context_with_comment(comment: &str, cli: CliOptions) -> ExecutionContext {
    let env = env_with(&[
        ("EVENT_KIND", "note"),
        ("COMMENT_TEXT", comment),
        ("OBJECT_ID", "900"),
        ("ISSUE_ID", "3"),
        ("ISSUE_URL", "https://gitlab.example.com/g/p/-/issues/3"),
    ]);
    ExecutionContext::from_env(&env, cli).expect("issue context")
}

pub fn mr_comment_context(cli: CliOptions) -> ExecutionContext {
    mr_comment_context_from("@junie rename it", cli)
}

pub fn mr_comment_context_with_comment(comment: &str) -> ExecutionContext {
    mr_comment_context_from(comment, CliOptions::default())
}

fn mr_comment_context_from(comment: &str, cli: CliOptions) -> ExecutionContext {
    let env = env_with(&[
        ("EVENT_KIND", "note"),
        ("COMMENT_TEXT", comment),
        ("OBJECT_ID", "901"),
        ("MERGE_REQUEST_ID", "11"),
        ("MERGE_REQUEST_SOURCE_BRANCH", "feature"),
        ("MERGE_REQUEST_TARGET_BRANCH", "main"),
        ("DISCUSSION_ID", "abc123"),
    ]);
    ExecutionContext::from_env(&env, cli).expect("merge request comment context")
}

pub fn lifecycle_context(cli: CliOptions) -> ExecutionContext {
    lifecycle_context_with_action("open", cli)
}

pub fn lifecycle_context_with_action(action: &str, cli: CliOptions) -> ExecutionContext {
    let env = env_with(&[
        ("EVENT_KIND", "merge_request"),
        ("MR_EVENT_ID", "12"),
        ("MR_EVENT_SOURCE_BRANCH", "feature"),
        ("MR_EVENT_TARGET_BRANCH", "main"),
        ("MR_EVENT_TITLE", "Add parser"),
        ("MR_EVENT_DESCRIPTION", "Parses things"),
        ("MR_EVENT_ACTION", action),
        (
            "MR_EVENT_URL",
            "https://gitlab.example.com/g/p/-/merge_requests/12",
        ),
    ]);
    ExecutionContext::from_env(&env, cli).expect("lifecycle context")
}

pub fn token(id: u64, name: &str, user_id: u64, active: bool, revoked: bool) -> AccessToken {
    AccessToken {
        id,
        name: name.to_string(),
        user_id,
        active,
        revoked,
    }
}

fn status_error(operation: &str, status: u16) -> GitLabError {
    GitLabError::Status {
        operation: operation.to_string(),
        status,
        body: String::new(),
    }
}

#[derive(Default)]
pub struct FakeGitLab {
    issues: HashMap<u64, Issue>,
    merge_requests: HashMap<u64, MergeRequest>,
    project_tokens: Vec<AccessToken>,
    group_tokens: HashMap<u64, Vec<AccessToken>>,
    namespace: Option<Namespace>,
    groups: HashMap<u64, Group>,
    forbidden_groups: HashSet<u64>,
    failing_groups: HashSet<u64>,
    users: HashMap<u64, User>,
    hooks: Vec<ProjectHook>,
    failing_writes: bool,
    calls: Mutex<Vec<String>>,
    bodies: Mutex<Vec<String>>,
    created_mrs: Mutex<Vec<NewMergeRequest>>,
    created_hooks: Mutex<Vec<NewProjectHook>>,
}

impl FakeGitLab {
    pub fn with_issue(mut self, iid: u64, title: &str, description: Option<&str>) -> Self {
        self.issues.insert(
            iid,
            Issue {
                iid,
                title: title.to_string(),
                description: description.map(str::to_string),
                web_url: None,
            },
        );
        self
    }

    pub fn with_merge_request(mut self, iid: u64, title: &str, description: Option<&str>) -> Self {
        self.merge_requests.insert(
            iid,
            MergeRequest {
                iid,
                title: title.to_string(),
                description: description.map(str::to_string),
                web_url: format!("https://gitlab.example.com/g/p/-/merge_requests/{iid}"),
                source_branch: "feature".to_string(),
                target_branch: "main".to_string(),
            },
        );
        self
    }

    pub fn with_project_tokens(mut self, tokens: Vec<AccessToken>) -> Self {
        self.project_tokens = tokens;
        self
    }

    pub fn with_group_namespace(mut self, group_id: u64) -> Self {
        self.namespace = Some(Namespace {
            id: group_id,
            kind: "group".to_string(),
        });
        self
    }

    pub fn with_group(mut self, id: u64, parent_id: Option<u64>) -> Self {
        self.groups.insert(id, Group { id, parent_id });
        self
    }

    pub fn with_group_tokens(mut self, group_id: u64, tokens: Vec<AccessToken>) -> Self {
        self.group_tokens.insert(group_id, tokens);
        self
    }

    pub fn with_forbidden_group(mut self, group_id: u64) -> Self {
        self.forbidden_groups.insert(group_id);
        self
    }

    pub fn with_failing_group(mut self, group_id: u64) -> Self {
        self.failing_groups.insert(group_id);
        self
    }

    pub fn with_user(mut self, id: u64, username: &str) -> Self {
        self.users.insert(
            id,
            User {
                id,
                username: username.to_string(),
            },
        );
        self
    }

    pub fn with_hook(mut self, id: u64, template: Option<&str>) -> Self {
        self.hooks.push(ProjectHook {
            id,
            url: format!("https://gitlab.example.com/hooks/{id}"),
            custom_webhook_template: template.map(str::to_string),
        });
        self
    }

    /// Every note, comment and emoji write fails with a 500.
    pub fn with_failing_writes(mut self) -> Self {
        self.failing_writes = true;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn bodies(&self) -> Vec<String> {
        self.bodies.lock().unwrap().clone()
    }

    pub fn created_mrs(&self) -> Vec<NewMergeRequest> {
        self.created_mrs.lock().unwrap().clone()
    }

    pub fn created_hooks(&self) -> Vec<NewProjectHook> {
        self.created_hooks.lock().unwrap().clone()
    }

    fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
    }

    fn write(&self, operation: &str, body: Option<&str>) -> GitLabResult<()> {
        if self.failing_writes {
            return Err(status_error(operation, 500));
        }
        if let Some(body) = body {
            self.bodies.lock().unwrap().push(body.to_string());
        }
        Ok(())
    }

    fn group_access(&self, operation: &str, group_id: u64) -> GitLabResult<()> {
        if self.forbidden_groups.contains(&group_id) {
            return Err(status_error(operation, 403));
        }
        if self.failing_groups.contains(&group_id) {
            return Err(status_error(operation, 500));
        }
        Ok(())
    }
}

#[async_trait]
impl GitLabApi for FakeGitLab {
    async fn get_issue(&self, _project_id: u64, issue_iid: u64) -> GitLabResult<Issue> {
        self.record(format!("get_issue {issue_iid}"));
        self.issues
            .get(&issue_iid)
            .cloned()
            .ok_or_else(|| status_error("get issue", 404))
    }

    async fn add_issue_comment(
        &self,
        _project_id: u64,
        issue_iid: u64,
        body: &str,
    ) -> GitLabResult<()> {
        self.record(format!("add_issue_comment {issue_iid}"));
        self.write("create issue note", Some(body))
    }

    async fn award_issue_note_emoji(
        &self,
        _project_id: u64,
        issue_iid: u64,
        note_id: u64,
        emoji: &str,
    ) -> GitLabResult<()> {
        self.record(format!("award_issue_note_emoji {issue_iid} {note_id} {emoji}"));
        self.write("award emoji", None)
    }

    async fn get_merge_request(&self, _project_id: u64, mr_iid: u64) -> GitLabResult<MergeRequest> {
        self.record(format!("get_merge_request {mr_iid}"));
        self.merge_requests
            .get(&mr_iid)
            .cloned()
            .ok_or_else(|| status_error("get merge request", 404))
    }

    async fn add_merge_request_note(
        &self,
        _project_id: u64,
        mr_iid: u64,
        body: &str,
    ) -> GitLabResult<()> {
        self.record(format!("add_merge_request_note {mr_iid}"));
        self.write("create merge request note", Some(body))
    }

    async fn add_merge_request_discussion_note(
        &self,
        _project_id: u64,
        mr_iid: u64,
        discussion_id: &str,
        body: &str,
    ) -> GitLabResult<()> {
        self.record(format!(
            "add_merge_request_discussion_note {mr_iid} {discussion_id}"
        ));
        self.write("create discussion note", Some(body))
    }

    async fn create_merge_request(
        &self,
        _project_id: u64,
        request: &NewMergeRequest,
    ) -> GitLabResult<MergeRequest> {
        self.record("create_merge_request".to_string());
        self.created_mrs.lock().unwrap().push(request.clone());
        Ok(MergeRequest {
            iid: 99,
            title: request.title.clone(),
            description: Some(request.description.clone()),
            web_url: CREATED_MR_URL.to_string(),
            source_branch: request.source_branch.clone(),
            target_branch: request.target_branch.clone(),
        })
    }

    async fn delete_pipeline(&self, _project_id: u64, pipeline_id: u64) -> GitLabResult<()> {
        self.record(format!("delete_pipeline {pipeline_id}"));
        Ok(())
    }

    async fn list_project_access_tokens(&self, project_id: u64) -> GitLabResult<Vec<AccessToken>> {
        self.record(format!("list_project_access_tokens {project_id}"));
        Ok(self.project_tokens.clone())
    }

    async fn list_group_access_tokens(&self, group_id: u64) -> GitLabResult<Vec<AccessToken>> {
        self.record(format!("list_group_access_tokens {group_id}"));
        self.group_access("group access tokens", group_id)?;
        Ok(self
            .group_tokens
            .get(&group_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_user(&self, user_id: u64) -> GitLabResult<User> {
        self.record(format!("get_user {user_id}"));
        self.users
            .get(&user_id)
            .cloned()
            .ok_or_else(|| status_error("get user", 404))
    }

    async fn get_project(&self, project_id: u64) -> GitLabResult<Project> {
        self.record(format!("get_project {project_id}"));
        Ok(Project {
            id: project_id,
            namespace: self.namespace.clone(),
        })
    }

    async fn get_group(&self, group_id: u64) -> GitLabResult<Group> {
        self.record(format!("get_group {group_id}"));
        self.group_access("get group", group_id)?;
        self.groups
            .get(&group_id)
            .cloned()
            .ok_or_else(|| status_error("get group", 404))
    }

    async fn list_project_hooks(&self, project_id: u64) -> GitLabResult<Vec<ProjectHook>> {
        self.record(format!("list_project_hooks {project_id}"));
        Ok(self.hooks.clone())
    }

    async fn create_project_hook(
        &self,
        _project_id: u64,
        hook: &NewProjectHook,
    ) -> GitLabResult<ProjectHook> {
        self.record("create_project_hook".to_string());
        self.created_hooks.lock().unwrap().push(hook.clone());
        Ok(ProjectHook {
            id: 500,
            url: hook.url.clone(),
            custom_webhook_template: Some(hook.custom_webhook_template.clone()),
        })
    }
}

/// Git double that records operations; `staged` decides what status reports.
#[derive(Debug, Default)]
pub struct FakeGit {
    pub staged: bool,
    pub ops: Vec<String>,
}

impl FakeGit {
    pub fn with_staged_changes() -> Self {
        Self {
            staged: true,
            ops: Vec::new(),
        }
    }
}

#[async_trait]
impl GitWorkspace for FakeGit {
    async fn checkout_new_branch(&mut self, branch: &str) -> Result<()> {
        self.ops.push(format!("checkout -b {branch}"));
        Ok(())
    }

    async fn checkout_branch(&mut self, branch: &str) -> Result<()> {
        self.ops.push(format!("checkout {branch}"));
        Ok(())
    }

    async fn stage_all(&mut self) -> Result<()> {
        self.ops.push("add".to_string());
        Ok(())
    }

    async fn status(&mut self) -> Result<Vec<FileStatus>> {
        let index = if self.staged { 'M' } else { '?' };
        Ok(vec![FileStatus {
            index,
            working: ' ',
            path: "src/lib.rs".to_string(),
        }])
    }

    async fn commit(&mut self, message: &str) -> Result<()> {
        self.ops.push(format!("commit {message}"));
        Ok(())
    }

    async fn push(&mut self, branch: &str) -> Result<()> {
        self.ops.push(format!("push {branch}"));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeAgent {
    outcome: AgentOutcome,
    setups: Mutex<Vec<AgentSetup>>,
    tasks: Mutex<Vec<String>>,
}

impl FakeAgent {
    pub fn returning(result: Option<&str>, task_name: Option<&str>) -> Self {
        Self {
            outcome: AgentOutcome {
                result: result.map(str::to_string),
                task_name: task_name.map(str::to_string),
            },
            ..Self::default()
        }
    }

    pub fn setups(&self) -> Vec<AgentSetup> {
        self.setups.lock().unwrap().clone()
    }

    pub fn tasks(&self) -> Vec<String> {
        self.tasks.lock().unwrap().clone()
    }
}

#[async_trait]
impl CodingAgent for FakeAgent {
    async fn prepare(&self, setup: &AgentSetup) -> Result<()> {
        self.setups.lock().unwrap().push(setup.clone());
        Ok(())
    }

    async fn run(&self, request: AgentRequest<'_>) -> Result<AgentOutcome, AgentError> {
        self.tasks.lock().unwrap().push(request.task.to_string());
        Ok(self.outcome.clone())
    }
}
