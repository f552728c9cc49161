//! Agent prompt templates and the fixed texts posted back to GitLab.

use handlebars::Handlebars;
use once_cell::sync::Lazy;
use serde_json::Value;
use std::collections::HashMap;

pub const CODE_REVIEW_ACTION: &str = "code-review";

pub const STARTED_MESSAGE: &str =
    "Hey, it's Junie by JetBrains! I started processing your request";
pub const FINISHED_PREFIX: &str = "✅ Junie finished\n\n";
pub const NO_CHANGES_MESSAGE: &str = "Task completed. No changes were made.";
pub const MR_LINK_PREFIX: &str = "📝 Merge Request link: ";

pub const MR_INTRO_HEADER: &str = "## Hey! This MR was made for you with Junie, the coding agent by JetBrains Early Access Preview\n\n\
It's still learning, developing, and might make mistakes. Please make sure you review the changes before you accept them.\n\
We'd love your feedback: join our Discord to share bugs and ideas [here](https://jb.gg/junie/github).\n\n";

pub const GIT_OPERATIONS_NOTE: &str = "\n\nIMPORTANT: Do NOT commit or push changes. The system will handle all git operations (staging, committing, and pushing) automatically.";

static PROMPT_REGISTRY: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert("issue_task", include_str!("issue_task.hbs"));
    m.insert("merge_request_task", include_str!("merge_request_task.hbs"));
    m.insert("code_review", include_str!("code_review.hbs"));
    m.insert("mcp_note", include_str!("mcp_note.hbs"));
    m
});

/// Render a prompt by name using Handlebars.
///
/// Usage:
///     render("code_review", json!({"merge_request_id": 12}))
///
/// Output is not HTML-escaped and trailing whitespace is trimmed.
pub fn render(name: &str, ctx: &Value) -> anyhow::Result<String> {
    let template = PROMPT_REGISTRY
        .get(name)
        .ok_or_else(|| anyhow::anyhow!("unknown prompt '{name}'"))?;

    let mut hb = Handlebars::new();
    hb.set_strict_mode(true); // fail if a variable is missing
    hb.register_escape_fn(handlebars::no_escape);

    hb.render_template(template, ctx)
        .map(|rendered| rendered.trim_end().to_string())
        .map_err(|e| anyhow::anyhow!("rendering prompt '{name}' failed: {e}"))
}
