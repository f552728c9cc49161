//! One-off project setup: makes sure the webhook that triggers Junie pipelines exists.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::domain::{ConfigError, Secret};
use crate::infra::env::{self, EnvVar, WEBHOOK_VARIABLES, WebhookEnv};
use crate::infra::gitlab::{GitLabApi, HookHeader, NewProjectHook, ProjectHook};

const HOOK_NAME: &str = "Junie";
const HOOK_DESCRIPTION: &str = "Junie webhook";
const MARKER_VALUE: &str = "true";

/// Everything `init` needs from the CI environment.
#[derive(Debug, Clone)]
pub struct InitSettings {
    pub project_id: u64,
    pub api_v4_url: String,
    pub default_branch: String,
    pub token: Secret,
}

impl InitSettings {
    pub fn from_env(env: &WebhookEnv) -> Result<Self, ConfigError> {
        Ok(Self {
            project_id: env.require_number(env::PROJECT_ID)?,
            api_v4_url: env.require(env::API_V4_URL)?.to_string(),
            default_branch: env.require(env::DEFAULT_BRANCH)?.to_string(),
            token: Secret::new(env.require(env::GITLAB_TOKEN)?),
        })
    }

    fn trigger_url(&self) -> String {
        format!(
            "{}/projects/{}/pipeline?ref={}",
            self.api_v4_url.trim_end_matches('/'),
            self.project_id,
            self.default_branch
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InitOutcome {
    AlreadyConfigured(u64),
    Created(u64),
}

#[derive(Debug, Serialize, Deserialize)]
struct WebhookTemplate {
    variables: Vec<TemplateVariable>,
}

#[derive(Debug, Serialize, Deserialize)]
struct TemplateVariable {
    key: String,
    value: String,
}

/// Pipeline-trigger payload: every variable that has a webhook mapping.
pub fn webhook_template() -> Result<String> {
    let template = WebhookTemplate {
        variables: WEBHOOK_VARIABLES
            .iter()
            .filter_map(|var: &EnvVar| {
                var.template.map(|value| TemplateVariable {
                    key: var.key.to_string(),
                    value: value.to_string(),
                })
            })
            .collect(),
    };
    serde_json::to_string_pretty(&template).context("serialize webhook template")
}

/// True when the hook's template carries the Junie marker variable.
pub fn is_junie_hook(hook: &ProjectHook) -> bool {
    let Some(raw) = hook.custom_webhook_template.as_deref() else {
        return false;
    };
    match serde_json::from_str::<WebhookTemplate>(raw) {
        Ok(template) => template
            .variables
            .iter()
            .any(|var| var.key == env::JUNIE_WEBHOOK.key && var.value == MARKER_VALUE),
        Err(err) => {
            log::debug!("Skipping hook {} with unreadable template: {err}", hook.id);
            false
        }
    }
}

pub async fn initialize(api: &dyn GitLabApi, settings: &InitSettings) -> Result<InitOutcome> {
    let hooks = api
        .list_project_hooks(settings.project_id)
        .await
        .context("list project hooks")?;
    log::debug!("Project {} has {} hooks", settings.project_id, hooks.len());

    if let Some(existing) = hooks.iter().find(|hook| is_junie_hook(hook)) {
        log::info!("Junie webhook already exists (id {})", existing.id);
        return Ok(InitOutcome::AlreadyConfigured(existing.id));
    }

    let hook = NewProjectHook {
        url: settings.trigger_url(),
        name: HOOK_NAME.to_string(),
        description: HOOK_DESCRIPTION.to_string(),
        issues_events: true,
        note_events: true,
        merge_requests_events: true,
        push_events: false,
        enable_ssl_verification: true,
        token: settings.token.expose().to_string(),
        custom_headers: vec![HookHeader {
            key: "Authorization".to_string(),
            value: format!("Bearer {}", settings.token.expose()),
        }],
        custom_webhook_template: webhook_template()?,
    };
    let created = api
        .create_project_hook(settings.project_id, &hook)
        .await
        .context("create Junie webhook")?;
    log::info!("Junie webhook created (id {})", created.id);

    Ok(InitOutcome::Created(created.id))
}
