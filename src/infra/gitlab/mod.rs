//! GitLab REST API surface used by the bot.

pub mod client;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::GitLabError;

pub use client::GitLabClient;

pub type GitLabResult<T> = Result<T, GitLabError>;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Issue {
    pub iid: u64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub web_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct MergeRequest {
    pub iid: u64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub web_url: String,
    #[serde(default)]
    pub source_branch: String,
    #[serde(default)]
    pub target_branch: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewMergeRequest {
    pub source_branch: String,
    pub target_branch: String,
    pub title: String,
    pub description: String,
}

/// Project or group access token; every token is backed by a bot user.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AccessToken {
    pub id: u64,
    pub name: String,
    pub user_id: u64,
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub revoked: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct User {
    pub id: u64,
    pub username: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Namespace {
    pub id: u64,
    pub kind: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Project {
    pub id: u64,
    #[serde(default)]
    pub namespace: Option<Namespace>,
}

impl Project {
    /// Namespace id when the project lives in a group rather than a user namespace.
    pub fn group_id(&self) -> Option<u64> {
        self.namespace
            .as_ref()
            .filter(|namespace| namespace.kind == "group")
            .map(|namespace| namespace.id)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct Group {
    pub id: u64,
    #[serde(default)]
    pub parent_id: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ProjectHook {
    pub id: u64,
    pub url: String,
    #[serde(default)]
    pub custom_webhook_template: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct HookHeader {
    pub key: String,
    pub value: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct NewProjectHook {
    pub url: String,
    pub name: String,
    pub description: String,
    pub issues_events: bool,
    pub note_events: bool,
    pub merge_requests_events: bool,
    pub push_events: bool,
    pub enable_ssl_verification: bool,
    pub token: String,
    pub custom_headers: Vec<HookHeader>,
    pub custom_webhook_template: String,
}

#[async_trait]
pub trait GitLabApi: Send + Sync {
    async fn get_issue(&self, project_id: u64, issue_iid: u64) -> GitLabResult<Issue>;

    async fn add_issue_comment(
        &self,
        project_id: u64,
        issue_iid: u64,
        body: &str,
    ) -> GitLabResult<()>;

    async fn award_issue_note_emoji(
        &self,
        project_id: u64,
        issue_iid: u64,
        note_id: u64,
        emoji: &str,
    ) -> GitLabResult<()>;

    async fn get_merge_request(&self, project_id: u64, mr_iid: u64) -> GitLabResult<MergeRequest>;

    async fn add_merge_request_note(
        &self,
        project_id: u64,
        mr_iid: u64,
        body: &str,
    ) -> GitLabResult<()>;

    async fn add_merge_request_discussion_note(
        &self,
        project_id: u64,
        mr_iid: u64,
        discussion_id: &str,
        body: &str,
    ) -> GitLabResult<()>;

    async fn create_merge_request(
        &self,
        project_id: u64,
        request: &NewMergeRequest,
    ) -> GitLabResult<MergeRequest>;

    async fn delete_pipeline(&self, project_id: u64, pipeline_id: u64) -> GitLabResult<()>;

    async fn list_project_access_tokens(&self, project_id: u64) -> GitLabResult<Vec<AccessToken>>;

    async fn list_group_access_tokens(&self, group_id: u64) -> GitLabResult<Vec<AccessToken>>;

    async fn get_user(&self, user_id: u64) -> GitLabResult<User>;

    async fn get_project(&self, project_id: u64) -> GitLabResult<Project>;

    async fn get_group(&self, group_id: u64) -> GitLabResult<Group>;

    async fn list_project_hooks(&self, project_id: u64) -> GitLabResult<Vec<ProjectHook>>;

    async fn create_project_hook(
        &self,
        project_id: u64,
        hook: &NewProjectHook,
    ) -> GitLabResult<ProjectHook>;
}
