use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use scout::agent::{
    AgentRoster, GoogleSearch, HeadlessModel, OfflineSearch, ResearchAgent, SearchTool,
};
use scout::config::Config;
use scout::orchestration::{Executor, ExecutorConfig, ExecutorEvent, Pipeline, PipelineOutcome};
use scout::schema::SchemaRegistry;
use scout::{render, slog, slog_error, Result};

const EXIT_PARTIAL: u8 = 2;
const EXIT_ABORT: u8 = 1;

/// Scout - research a company and score it against the ideal customer profile
#[derive(Parser, Debug)]
#[command(name = "scout")]
#[command(version, about, long_about = None)]
#[command(after_help = "ENVIRONMENT:\n    SCOUT_DEBUG=1     Enable debug logging (alternative to --debug)\n    GOOGLE_API_KEY    Custom Search API key\n    GOOGLE_CSE_ID     Custom Search engine id")]
pub struct Cli {
    /// Enable debug logging (writes to ~/.scout/scout.log)
    #[arg(short = 'd', long, global = true)]
    pub debug: bool,

    /// Print the outcome as JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Override the configured number of concurrent nodes
    #[arg(long, global = true)]
    pub max_concurrency: Option<usize>,

    /// Research without real-time web search
    #[arg(long, global = true)]
    pub offline: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Full ICP score: headcount, data team and data stack
    Score {
        /// Company name
        company: String,
    },

    /// ICP score from headcount and data stack only
    Quick {
        /// Company name
        company: String,
    },

    /// Employee count report
    Headcount {
        /// Company name
        company: String,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    scout::log::init_with_debug(cli.debug);

    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            slog_error!("Aborted: {}", e);
            eprintln!("error: {}", e);
            ExitCode::from(EXIT_ABORT)
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    slog!("Scout starting: {:?}", cli.command);

    let Cli {
        json,
        max_concurrency,
        offline,
        command,
        ..
    } = cli;

    let mut config = Config::load()?.with_env_overrides();
    if let Some(max) = max_concurrency {
        config.max_concurrency = max;
    }
    config.validate()?;

    let executor = build_executor(&config, offline)?;
    let rt = tokio::runtime::Runtime::new()?;

    let outcome = rt.block_on(async move {
        let (tx, mut rx) = mpsc::channel::<ExecutorEvent>(64);
        let progress = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if !json {
                    eprintln!("{}", render::format_event(&event));
                }
            }
        });

        let pipeline = Pipeline::new(executor.with_events(tx), &config.scoring);
        let outcome = match &command {
            Command::Score { company } => pipeline.run_icp_pipeline(company).await,
            Command::Quick { company } => pipeline.run_quick_score(company).await,
            Command::Headcount { company } => pipeline.run_headcount(company).await,
        };

        // Closes the event channel so the progress task can finish.
        drop(pipeline);
        let _ = progress.await;
        outcome
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    } else {
        println!("{}", render::format_outcome(&outcome));
    }

    Ok(exit_code(&outcome))
}

fn build_executor(config: &Config, offline: bool) -> Result<Executor> {
    let registry = Arc::new(SchemaRegistry::standard());

    let model = HeadlessModel::from_command(&config.agent_command)?
        .with_timeout(Duration::from_secs(config.agent_timeout_secs));

    let search: Arc<dyn SearchTool> = if offline {
        slog!("Search disabled by --offline");
        Arc::new(OfflineSearch)
    } else if !config.search.has_credentials() {
        slog!("No search credentials configured, researching offline");
        Arc::new(OfflineSearch)
    } else {
        Arc::new(GoogleSearch::new(config.search.clone())?)
    };

    let agent = ResearchAgent::new(Arc::new(model), search, registry.clone())
        .with_max_tool_calls(config.max_tool_calls);

    Ok(
        Executor::new(AgentRoster::single(Arc::new(agent)), registry)
            .with_config(ExecutorConfig::from(config)),
    )
}

fn exit_code(outcome: &PipelineOutcome) -> ExitCode {
    match outcome {
        PipelineOutcome::Complete { .. } => ExitCode::SUCCESS,
        PipelineOutcome::Partial(report) if report.is_total_failure() => {
            ExitCode::from(EXIT_ABORT)
        }
        PipelineOutcome::Partial(_) => ExitCode::from(EXIT_PARTIAL),
    }
}
