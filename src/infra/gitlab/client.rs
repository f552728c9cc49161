use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use serde::de::DeserializeOwned;
use serde_json::json;
use std::time::Duration;

use super::{
    AccessToken, GitLabApi, GitLabResult, Group, Issue, MergeRequest, NewMergeRequest,
    NewProjectHook, Project, ProjectHook, User,
};
use crate::domain::{GitLabError, Secret};

const PER_PAGE: usize = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// GitLab REST v4 client authenticated with a private token.
#[derive(Clone)]
pub struct GitLabClient {
    http: reqwest::Client,
    api_base: String,
}

impl GitLabClient {
    pub fn new(api_base: &str, token: &Secret) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static("junie-gitlab"));
        let mut auth = HeaderValue::from_str(token.expose().trim())
            .context("invalid gitlab token header")?;
        auth.set_sensitive(true);
        headers.insert("PRIVATE-TOKEN", auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("failed to create gitlab api client")?;

        let api_base = api_base.trim_end_matches('/').to_string();
        log::info!("Using GitLab API: {api_base}");
        Ok(Self { http, api_base })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.api_base)
    }

    async fn send(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> GitLabResult<reqwest::Response> {
        let response = request
            .send()
            .await
            .map_err(|source| GitLabError::Transport {
                operation: operation.to_string(),
                source,
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(GitLabError::Status {
            operation: operation.to_string(),
            status: status.as_u16(),
            body: truncate_for_error(&body, 800),
        })
    }

    async fn request_json<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> GitLabResult<T> {
        self.send(operation, request)
            .await?
            .json::<T>()
            .await
            .map_err(|source| GitLabError::Decode {
                operation: operation.to_string(),
                source,
            })
    }

    /// Issue a request whose response body is not needed.
    async fn request_empty(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> GitLabResult<()> {
        self.send(operation, request).await.map(|_| ())
    }

    /// Walk `page=1..` with 100 items per page until a short page comes back.
    async fn paginated<T: DeserializeOwned>(
        &self,
        operation: &str,
        path: &str,
    ) -> GitLabResult<Vec<T>> {
        let mut page = 1_u32;
        let mut rows = Vec::new();
        loop {
            let request = self.http.get(self.url(path)).query(&[
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ]);
            let chunk: Vec<T> = self.request_json(operation, request).await?;
            let chunk_len = chunk.len();
            rows.extend(chunk);
            if chunk_len < PER_PAGE {
                break;
            }
            page = page.saturating_add(1);
        }
        log::debug!("Retrieved {} {operation} item(s)", rows.len());
        Ok(rows)
    }
}

#[async_trait]
impl GitLabApi for GitLabClient {
    async fn get_issue(&self, project_id: u64, issue_iid: u64) -> GitLabResult<Issue> {
        log::debug!("Fetching issue {issue_iid} from project {project_id}");
        let request = self
            .http
            .get(self.url(&format!("/projects/{project_id}/issues/{issue_iid}")));
        self.request_json("get issue", request).await
    }

    async fn add_issue_comment(
        &self,
        project_id: u64,
        issue_iid: u64,
        body: &str,
    ) -> GitLabResult<()> {
        log::debug!("Adding comment to issue {issue_iid} in project {project_id}");
        let request = self
            .http
            .post(self.url(&format!("/projects/{project_id}/issues/{issue_iid}/notes")))
            .json(&json!({ "body": body }));
        self.request_empty("create issue note", request).await
    }

    async fn award_issue_note_emoji(
        &self,
        project_id: u64,
        issue_iid: u64,
        note_id: u64,
        emoji: &str,
    ) -> GitLabResult<()> {
        let request = self
            .http
            .post(self.url(&format!(
                "/projects/{project_id}/issues/{issue_iid}/notes/{note_id}/award_emoji"
            )))
            .json(&json!({ "name": emoji }));
        self.request_empty("award emoji", request).await
    }

    async fn get_merge_request(&self, project_id: u64, mr_iid: u64) -> GitLabResult<MergeRequest> {
        log::debug!("Fetching merge request {mr_iid} from project {project_id}");
        let request = self
            .http
            .get(self.url(&format!("/projects/{project_id}/merge_requests/{mr_iid}")));
        self.request_json("get merge request", request).await
    }

    async fn add_merge_request_note(
        &self,
        project_id: u64,
        mr_iid: u64,
        body: &str,
    ) -> GitLabResult<()> {
        log::debug!("Adding note to merge request {mr_iid} in project {project_id}");
        let request = self
            .http
            .post(self.url(&format!(
                "/projects/{project_id}/merge_requests/{mr_iid}/notes"
            )))
            .json(&json!({ "body": body }));
        self.request_empty("create merge request note", request).await
    }

    async fn add_merge_request_discussion_note(
        &self,
        project_id: u64,
        mr_iid: u64,
        discussion_id: &str,
        body: &str,
    ) -> GitLabResult<()> {
        log::debug!(
            "Adding note to discussion {discussion_id} in merge request {mr_iid} of project {project_id}"
        );
        let request = self
            .http
            .post(self.url(&format!(
                "/projects/{project_id}/merge_requests/{mr_iid}/discussions/{discussion_id}/notes"
            )))
            .json(&json!({ "body": body }));
        self.request_empty("create discussion note", request).await
    }

    async fn create_merge_request(
        &self,
        project_id: u64,
        request: &NewMergeRequest,
    ) -> GitLabResult<MergeRequest> {
        log::debug!(
            "Creating merge request in project {project_id} from {} to {}",
            request.source_branch,
            request.target_branch
        );
        let builder = self
            .http
            .post(self.url(&format!("/projects/{project_id}/merge_requests")))
            .json(request);
        self.request_json("create merge request", builder).await
    }

    async fn delete_pipeline(&self, project_id: u64, pipeline_id: u64) -> GitLabResult<()> {
        log::debug!("Deleting pipeline {pipeline_id} from project {project_id}");
        let request = self
            .http
            .delete(self.url(&format!("/projects/{project_id}/pipelines/{pipeline_id}")));
        self.request_empty("delete pipeline", request).await
    }

    async fn list_project_access_tokens(&self, project_id: u64) -> GitLabResult<Vec<AccessToken>> {
        self.paginated(
            "project access tokens",
            &format!("/projects/{project_id}/access_tokens"),
        )
        .await
    }

    async fn list_group_access_tokens(&self, group_id: u64) -> GitLabResult<Vec<AccessToken>> {
        self.paginated(
            "group access tokens",
            &format!("/groups/{group_id}/access_tokens"),
        )
        .await
    }

    async fn get_user(&self, user_id: u64) -> GitLabResult<User> {
        let request = self.http.get(self.url(&format!("/users/{user_id}")));
        self.request_json("get user", request).await
    }

    async fn get_project(&self, project_id: u64) -> GitLabResult<Project> {
        let request = self.http.get(self.url(&format!("/projects/{project_id}")));
        self.request_json("get project", request).await
    }

    async fn get_group(&self, group_id: u64) -> GitLabResult<Group> {
        let request = self.http.get(self.url(&format!("/groups/{group_id}")));
        self.request_json("get group", request).await
    }

    async fn list_project_hooks(&self, project_id: u64) -> GitLabResult<Vec<ProjectHook>> {
        self.paginated("project hooks", &format!("/projects/{project_id}/hooks"))
            .await
    }

    async fn create_project_hook(
        &self,
        project_id: u64,
        hook: &NewProjectHook,
    ) -> GitLabResult<ProjectHook> {
        log::debug!("Creating webhook for project {project_id} with URL {}", hook.url);
        let request = self
            .http
            .post(self.url(&format!("/projects/{project_id}/hooks")))
            .json(hook);
        self.request_json("create project hook", request).await
    }
}

fn truncate_for_error(body: &str, max_chars: usize) -> String {
    if body.chars().count() <= max_chars {
        return body.to_string();
    }
    let truncated: String = body.chars().take(max_chars).collect();
    format!("{truncated}...")
}
