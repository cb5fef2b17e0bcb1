//! Command-line client for the assessment backend.
//!
//! Fetches the quality model, starts a session for the chosen goals, and
//! streams progress lines and goal results to stdout until the server ends
//! both channels or the user hits Ctrl-C.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};

use assessor::core::goal_tree::GoalTree;
use assessor::core::summary::summarize;
use assessor::core::types::{AppMetadata, GoalResult, Phase};
use assessor::error::AssessError;
use assessor::exit_codes;
use assessor::io::config::{AssessorConfig, load_config, write_config};
use assessor::io::model::build_goal_tree;
use assessor::io::transport::{HttpTransport, Transport};
use assessor::logging;
use assessor::orchestrator::{SessionEvent, SessionOrchestrator};

#[derive(Parser)]
#[command(
    name = "assessor",
    version,
    about = "Run quality assessments against a live assessment backend"
)]
struct Cli {
    /// Config file.
    #[arg(long, global = true, default_value = "assessor.toml")]
    config: PathBuf,
    /// More diagnostics on stderr (`-v` info, `-vv` debug).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write a default config file if missing.
    Init {
        /// Overwrite an existing config.
        #[arg(short, long)]
        force: bool,
    },
    /// Print the quality model as a goal tree with selectable paths.
    Model,
    /// Start a session and stream progress and results.
    Run(RunArgs),
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    /// Application name.
    #[arg(long)]
    name: Option<String>,
    /// Application type (e.g. web, mobile).
    #[arg(long = "app-type")]
    app_type: Option<String>,
    #[arg(long)]
    technology: Option<String>,
    /// Source path of the application.
    #[arg(long)]
    path: Option<String>,
    /// URL the application is served at.
    #[arg(long)]
    url: Option<String>,
    /// Goal path to select, e.g. `Performance` or `Performance/LoadTime`. Repeatable.
    #[arg(long = "goal", value_name = "PATH")]
    goals: Vec<String>,
}

impl RunArgs {
    fn metadata(&self) -> AppMetadata {
        AppMetadata {
            name: self.name.clone().unwrap_or_default(),
            app_type: self.app_type.clone().unwrap_or_default(),
            technology: self.technology.clone().unwrap_or_default(),
            path: self.path.clone().unwrap_or_default(),
            url: self.url.clone().unwrap_or_default(),
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);
    let code = match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Model => cmd_model(&cli.config).await,
        Command::Run(args) => cmd_run(&cli.config, &args).await,
    }
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if !force && path.exists() {
        println!("{} already exists", path.display());
        return Ok(exit_codes::OK);
    }
    write_config(path, &AssessorConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn connect(config: &AssessorConfig) -> Result<Arc<HttpTransport>> {
    let transport = HttpTransport::new(&config.base_url, config.connect_timeout())
        .context("create http client")?;
    Ok(Arc::new(transport))
}

async fn fetch_tree(transport: &HttpTransport) -> Result<GoalTree> {
    let raw = transport
        .fetch_quality_model()
        .await
        .with_context(|| format!("fetch quality model from {}", transport.base_url()))?;
    Ok(build_goal_tree(&raw)?)
}

async fn cmd_model(config_path: &Path) -> Result<i32> {
    let config = load_config(config_path)?;
    let transport = connect(&config)?;
    let tree = fetch_tree(&transport).await?;
    for line in render_tree(&tree) {
        println!("{}", line);
    }
    Ok(exit_codes::OK)
}

/// One line per goal: indentation by depth, then the selectable path.
fn render_tree(tree: &GoalTree) -> Vec<String> {
    tree.flatten()
        .into_iter()
        .filter_map(|id| {
            let node = tree.node(id)?;
            let path = tree.path_of(id)?;
            let depth = path.matches('/').count();
            let mut line = format!("{}{}", "  ".repeat(depth), path);
            if !node.description.is_empty() {
                line.push_str(&format!("  - {}", node.description));
            }
            Some(line)
        })
        .collect()
}

fn select_goals(tree: &mut GoalTree, paths: &[String]) -> Result<()> {
    for path in paths {
        let id = tree.find_path(path).ok_or_else(|| {
            anyhow!(
                "unknown goal '{}' (run `assessor model` to list goal paths)",
                path
            )
        })?;
        // Selecting a parent already selected this node through the cascade.
        if !tree.node(id).is_some_and(|node| node.selected) {
            tree.toggle_selection(id)?;
        }
    }
    Ok(())
}

async fn cmd_run(config_path: &Path, args: &RunArgs) -> Result<i32> {
    let config = load_config(config_path)?;
    let transport = connect(&config)?;
    let mut tree = fetch_tree(&transport).await?;
    select_goals(&mut tree, &args.goals)?;

    let mut orchestrator = SessionOrchestrator::new(transport.clone(), config.session_settings());
    let metadata = args.metadata();
    let session_id = match orchestrator.start(Some(&metadata), &tree).await {
        Ok(id) => id,
        Err(err @ (AssessError::StartFailed(_) | AssessError::StartTimedOut(_))) => {
            eprintln!("{}", err);
            return Ok(exit_codes::START_FAILED);
        }
        Err(err) => bail!(err),
    };
    println!("session {} started on {}", session_id, transport.base_url());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                let results = orchestrator.state().results.clone();
                orchestrator.stop();
                println!("stopped");
                print_final(results.values());
                return Ok(exit_codes::OK);
            }
            next = orchestrator.next_events() => {
                let Some(events) = next else { break };
                for event in &events {
                    report(&orchestrator, event);
                }
            }
        }
    }

    print_final(orchestrator.state().results.values());
    orchestrator.stop();
    Ok(exit_codes::OK)
}

fn report(orchestrator: &SessionOrchestrator<HttpTransport>, event: &SessionEvent) {
    match event {
        SessionEvent::ProgressAppended { line } => println!("  {}", line),
        SessionEvent::PhaseChanged {
            to: Phase::Completed,
            ..
        } => println!("instrumentation complete, waiting for results (Ctrl-C to stop)"),
        SessionEvent::PhaseChanged { .. } => {}
        SessionEvent::ResultsUpdated { goals } => {
            let results = &orchestrator.state().results;
            for goal in goals.iter().filter_map(|name| results.get(name)) {
                println!("{}", summary_line(goal));
            }
        }
        SessionEvent::SnapshotRejected { reason } => {
            eprintln!("warning: ignored results update: {}", reason);
        }
        SessionEvent::DecodeFailed { channel, error } => {
            eprintln!("warning: unreadable {} message: {}", channel, error);
        }
        SessionEvent::ChannelFailed { channel, error } => {
            eprintln!("error: {} channel failed: {}", channel, error);
        }
        SessionEvent::ChannelClosed { .. } => {}
    }
}

fn summary_line(goal: &GoalResult) -> String {
    let summary = summarize(goal);
    let score = match summary.latest_score_pct {
        Some(pct) => format!("{:.1}%", pct),
        None => "pending".to_string(),
    };
    let mut line = format!(
        "{}: {} ({} assessments)",
        summary.name, score, summary.assessments
    );
    if !summary.contributions.is_empty() {
        let parts: Vec<String> = summary
            .contributions
            .iter()
            .map(|(label, pct)| format!("{} {:.1}%", label, pct))
            .collect();
        line.push_str(&format!(" [{}]", parts.join(", ")));
    }
    line
}

fn print_final<'a>(results: impl Iterator<Item = &'a GoalResult>) {
    let lines: Vec<String> = results.map(summary_line).collect();
    if lines.is_empty() {
        println!("no results received");
        return;
    }
    println!("final results:");
    for line in lines {
        println!("  {}", line);
    }
}
