//! Decides whether a comment addresses the bot.
//!
//! A literal `@junie` always counts. Otherwise the comment must mention a
//! project or group bot user (`@project_..` / `@group_..`) whose access token
//! name matches the configured tagging pattern.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

use crate::domain::GitLabError;
use crate::infra::gitlab::{AccessToken, GitLabApi};

const LITERAL_MENTION: &str = "@junie";

lazy_static! {
    static ref BOT_MENTION_RE: Regex =
        Regex::new(r"@(project|group)_[-a-zA-Z0-9_]+").expect("bot mention regex");
}

/// Every `@project_..` / `@group_..` token in the text, in order of appearance.
pub fn bot_mentions(text: &str) -> Vec<&str> {
    BOT_MENTION_RE.find_iter(text).map(|m| m.as_str()).collect()
}

pub async fn has_mention(
    api: &dyn GitLabApi,
    project_id: u64,
    text: &str,
    tagging_pattern: &Regex,
) -> Result<bool, GitLabError> {
    if text.to_lowercase().contains(LITERAL_MENTION) {
        log::info!("Detected literal junie mention");
        return Ok(true);
    }

    let mentions = bot_mentions(text);
    if mentions.is_empty() {
        log::debug!("No bot user mentions in comment");
        return Ok(false);
    }

    let tokens = collect_access_tokens(api, project_id).await?;
    let candidates = tokens
        .iter()
        .filter(|token| token.active && !token.revoked)
        .filter(|token| tagging_pattern.is_match(&token.name));

    for token in candidates {
        let user = api.get_user(token.user_id).await?;
        if mentions
            .iter()
            .any(|mention| mention.contains(user.username.as_str()))
        {
            log::info!(
                "Detected mention to '{}' (token '{}')",
                user.username,
                token.name
            );
            return Ok(true);
        }
    }

    Ok(false)
}

/// Project tokens plus tokens of the owning group and all of its ancestors.
///
/// A 403 on a group stops the walk and keeps what was collected so far.
pub async fn collect_access_tokens(
    api: &dyn GitLabApi,
    project_id: u64,
) -> Result<Vec<AccessToken>, GitLabError> {
    log::debug!("Collecting access tokens for project {project_id}");
    let mut tokens = api.list_project_access_tokens(project_id).await?;
    log::debug!("Found {} project tokens", tokens.len());

    let project = api.get_project(project_id).await?;
    let mut next_group = project.group_id();
    if next_group.is_none() {
        log::debug!("Project {project_id} has no parent group");
    }

    let mut visited = HashSet::new();
    while let Some(group_id) = next_group {
        if !visited.insert(group_id) {
            log::warn!("Group {group_id} already visited, stopping traversal");
            break;
        }

        let group_tokens = match api.list_group_access_tokens(group_id).await {
            Ok(group_tokens) => group_tokens,
            Err(err) if err.is_forbidden() => {
                log::debug!(
                    "Insufficient permissions to access group {group_id}, stopping traversal"
                );
                break;
            }
            Err(err) => return Err(err),
        };
        log::debug!("Found {} tokens in group {group_id}", group_tokens.len());
        tokens.extend(group_tokens);

        next_group = match api.get_group(group_id).await {
            Ok(group) => group.parent_id,
            Err(err) if err.is_forbidden() => {
                log::debug!(
                    "Insufficient permissions to read group {group_id}, stopping traversal"
                );
                break;
            }
            Err(err) => return Err(err),
        };
    }

    log::debug!("Total tokens collected: {}", tokens.len());
    Ok(tokens)
}
