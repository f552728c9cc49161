//! junie-gitlab entry point.
//!
//! `init` installs the project webhook once; `run` is invoked by the pipeline
//! the webhook triggers and handles exactly one event.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use junie_gitlab::application::executor::{Executor, RunReport};
use junie_gitlab::application::initializer::{self, InitOutcome, InitSettings};
use junie_gitlab::domain::{CliOptions, ExecutionContext, PublishMode};
use junie_gitlab::infra::agent::JunieCli;
use junie_gitlab::infra::env::WebhookEnv;
use junie_gitlab::infra::git::GitSession;
use junie_gitlab::infra::gitlab::client::GitLabClient;

#[derive(Parser, Debug)]
#[command(name = "junie-gitlab")]
#[command(about = "Run the Junie coding agent from GitLab CI", long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the project webhook that triggers Junie pipelines
    Init {
        /// Enable debug logging
        #[arg(short = 'V', long)]
        verbose: bool,
    },

    /// Handle the event passed in by the webhook-triggered pipeline
    Run {
        /// Delete the pipeline when the event holds no task
        #[arg(short = 'C', long)]
        cleanup: bool,

        /// Enable debug logging
        #[arg(short = 'V', long)]
        verbose: bool,

        /// Custom prompt prepended to every task
        #[arg(short, long)]
        prompt: Option<String>,

        /// How changes on merge request tasks are published
        #[arg(short = 'M', long, value_enum, default_value_t = MrMode::New)]
        mr_mode: MrMode,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum MrMode {
    /// Push onto the merge request source branch
    Append,
    /// Open a new merge request
    New,
}

impl From<MrMode> for PublishMode {
    fn from(mode: MrMode) -> Self {
        match mode {
            MrMode::Append => PublishMode::Append,
            MrMode::New => PublishMode::New,
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp(None)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let env = WebhookEnv::from_process();

    match args.command {
        Commands::Init { verbose } => {
            init_logging(verbose);
            run_init(&env).await
        }
        Commands::Run {
            cleanup,
            verbose,
            prompt,
            mr_mode,
        } => {
            init_logging(verbose);
            let cli = CliOptions::new(cleanup, mr_mode.into(), prompt);
            run_event(&env, cli).await
        }
    }
}

async fn run_init(env: &WebhookEnv) -> Result<()> {
    let settings = InitSettings::from_env(env)?;
    let gitlab = GitLabClient::new(&settings.api_v4_url, &settings.token)?;

    match initializer::initialize(&gitlab, &settings).await? {
        InitOutcome::AlreadyConfigured(id) => log::info!("Nothing to do, webhook {id} is in place"),
        InitOutcome::Created(id) => log::info!("Webhook {id} created"),
    }
    Ok(())
}

async fn run_event(env: &WebhookEnv, cli: CliOptions) -> Result<()> {
    log::debug!("Detected variables: {:?}", env.detected_keys());
    let context = ExecutionContext::from_env(env, cli).context("invalid CI environment")?;
    log::info!(
        "Handling {} event for project {} ({})",
        context.event.kind(),
        context.common.project_name,
        context.common.project_id
    );

    let gitlab = GitLabClient::new(&context.common.api_v4_url, &context.common.gitlab_token)?;
    let mut git = GitSession::from_env(env, context.common.gitlab_token.clone());
    let agent = JunieCli::new()?;

    let report = Executor::new(&gitlab, &mut git, &agent)
        .execute(&context)
        .await?;
    match report {
        RunReport::Idle { reason, cleaned_up } => {
            log::info!("Nothing to do ({reason}), pipeline cleaned up: {cleaned_up}");
        }
        RunReport::Completed { publication, .. } => {
            log::info!("Changes published: {publication:?}");
        }
    }

    log::info!("Execution finished successfully");
    Ok(())
}
