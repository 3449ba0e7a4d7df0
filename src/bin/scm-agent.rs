//! SCM Agent CLI
//!
//! Fetch, branch, commit and inspect Git and Subversion working copies

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use scm_agent::repository;
use scm_agent::{
    AgentConfig, ConfigLoadOptions, ConfigLoader, Credential, LocalHost, Remote, RemoteKind,
    Scm, ScmContext, Verbosity,
};
use serde_json::json;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing::{error, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Source control automation agent
#[derive(Parser)]
#[command(name = "scm-agent")]
#[command(version)]
#[command(about = "Source control automation agent", long_about = None)]
struct Cli {
    /// Configuration file (defaults to ./.scm-agent.yaml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Root directory for tool homes and keys
    #[arg(long, global = true)]
    work_dir: Option<PathBuf>,

    /// Command reporting (disabled, error, default, liveOutput)
    #[arg(long, global = true)]
    verbosity: Option<Verbosity>,

    /// Print results and logs as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct RemoteArgs {
    /// Repository URL
    #[arg(long)]
    url: String,

    /// Repository kind (git, subversion)
    #[arg(long, default_value = "git")]
    kind: RemoteKind,

    /// Branch to check out
    #[arg(long)]
    branch: Option<String>,

    /// Sub-path inside the repository
    #[arg(long)]
    path: Option<String>,

    /// Working copy directory
    #[arg(long)]
    dest: PathBuf,

    /// Identity id used for authentication
    #[arg(long)]
    identity: Option<u64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace the working copy with a fresh checkout
    Fetch {
        #[command(flatten)]
        remote: RemoteArgs,
    },

    /// Switch the working copy to a branch, creating it when missing
    Branch {
        /// Branch name, layout path or URL
        #[arg(value_name = "REF")]
        reference: String,

        #[command(flatten)]
        remote: RemoteArgs,
    },

    /// Commit files and publish them to the remote
    Commit {
        /// File to add (repeatable)
        #[arg(long = "file", value_name = "FILE")]
        files: Vec<String>,

        /// Commit message
        #[arg(short, long)]
        message: String,

        #[command(flatten)]
        remote: RemoteArgs,
    },

    /// Print the current revision
    Head {
        #[command(flatten)]
        remote: RemoteArgs,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.json);

    match run(cli).await {
        Ok(()) => process::exit(0),
        Err(e) => {
            error!("{:#}", e);
            if let Some(scm) = e.downcast_ref::<scm_agent::ScmError>() {
                for action in scm.suggested_actions() {
                    eprintln!("  - {}", action);
                }
            }
            process::exit(1);
        }
    }
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(fmt::layer().json().with_writer(std::io::stderr)).init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = ConfigLoader::load(ConfigLoadOptions {
        config_path: cli.config.clone(),
        cli_args: Some(AgentConfig {
            work_dir: cli.work_dir.clone(),
            verbosity: cli.verbosity,
            ..Default::default()
        }),
        env: std::env::vars().collect(),
    })
    .await
    .context("Failed to load configuration")?;

    let validation = ConfigLoader::validate(&config);
    for warning in &validation.warnings {
        warn!(field = %warning.field, "{}", warning.message);
    }
    if !validation.valid {
        for e in &validation.errors {
            error!(field = %e.field, "{}", e.message);
        }
        bail!("Invalid configuration");
    }

    let host = Arc::new(LocalHost::new(config.clone()));
    let ctx = ScmContext::new(config, host)?;

    match cli.command {
        Commands::Fetch { remote } => {
            let mut scm = open(&remote, &ctx).await?;
            scm.fetch().await?;
            let head = scm.head().await?;
            report(cli.json, "fetch", scm.as_ref(), Some(&head));
        }
        Commands::Branch { reference, remote } => {
            let mut scm = open(&remote, &ctx).await?;
            scm.branch(&reference).await?;
            report(cli.json, "branch", scm.as_ref(), None);
        }
        Commands::Commit {
            files,
            message,
            remote,
        } => {
            let mut scm = open(&remote, &ctx).await?;
            scm.commit(&files, &message).await?;
            let head = scm.head().await?;
            report(cli.json, "commit", scm.as_ref(), Some(&head));
        }
        Commands::Head { remote } => {
            let scm = open(&remote, &ctx).await?;
            let head = scm.head().await?;
            report(cli.json, "head", scm.as_ref(), Some(&head));
        }
    }
    Ok(())
}

async fn open(args: &RemoteArgs, ctx: &ScmContext) -> Result<Box<dyn Scm>> {
    let mut remote = Remote::new(args.url.clone(), args.kind);
    if let Some(branch) = &args.branch {
        remote = remote.with_branch(branch.clone());
    }
    if let Some(path) = &args.path {
        remote = remote.with_path(path.clone());
    }
    let credential = args.identity.map(Credential::Ref);
    let scm = repository::create(args.dest.clone(), remote, ctx, credential).await?;
    Ok(scm)
}

fn report(json: bool, command: &str, scm: &dyn Scm, head: Option<&str>) {
    let url = scm_agent::Mask::auth().apply(&scm.url());
    if json {
        println!(
            "{}",
            json!({
                "command": command,
                "kind": scm.kind().as_str(),
                "url": url,
                "path": scm.path(),
                "head": head,
            })
        );
        return;
    }
    println!("{} {} ({})", command, url, scm.path().display());
    if let Some(head) = head {
        println!("{}", head);
    }
}
