//! prd: keep a git-tracked tree of platform configuration objects in sync
//! with the remote platform.

mod commands;
mod logging;
mod prompt;

use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;

use prd_core::{ProjectConfig, PullStrategy};
use prd_sync::{NonInteractive, Prompter, SyncContext};

use crate::commands::Invocation;
use crate::prompt::StdinPrompter;

#[derive(Parser)]
#[command(name = "prd")]
#[command(author, version, about = "Sync platform configuration objects with a local git tree")]
#[command(propagate_version = true)]
struct Cli {
    /// Project root holding prd_config.yaml
    #[arg(long, global = true, default_value = ".")]
    project: PathBuf,

    /// Print reports as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Never prompt; unresolved decisions are skipped
    #[arg(short, long, global = true)]
    yes: bool,

    /// Debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Pull remote objects into the local tree
    Pull {
        /// Organization directories (default: all configured)
        dirs: Vec<String>,

        /// How to treat objects changed on both sides: ask, skip, overwrite, merge
        #[arg(short, long, default_value = "ask")]
        strategy: PullStrategy,
    },

    /// Push local changes to the remote
    Push {
        /// Organization directories (default: all configured)
        dirs: Vec<String>,

        /// Skip the modified_at guard on updates
        #[arg(short, long)]
        force: bool,

        /// Recreate objects whose update fails
        #[arg(long)]
        upload_all: bool,

        /// Only push changes already added to the git index
        #[arg(long)]
        indexed_only: bool,
    },

    /// Show what a push would send
    Status {
        /// Organization directories (default: all configured)
        dirs: Vec<String>,

        /// Only changes already added to the git index
        #[arg(long)]
        indexed_only: bool,
    },

    /// Inspect the deploy mapping of a source organization
    Mapping {
        #[command(subcommand)]
        action: MappingCommand,
    },
}

#[derive(Subcommand)]
enum MappingCommand {
    /// List entries still waiting for a target
    Placeholders {
        /// Organization directory
        dir: String,
    },

    /// Print the target ids recorded for a source id
    Targets {
        /// Organization directory
        dir: String,

        /// Source object id
        source_id: i64,
    },
}

fn prompter(yes: bool, strategy: PullStrategy) -> Box<dyn Prompter> {
    if yes || !std::io::stdin().is_terminal() {
        let strategy = match strategy {
            PullStrategy::Ask => PullStrategy::Skip,
            other => other,
        };
        Box::new(NonInteractive::new(strategy))
    } else {
        Box::new(StdinPrompter::new())
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = ProjectConfig::load(&cli.project)?;
    let strategy = match &cli.command {
        Commands::Pull { strategy, .. } => *strategy,
        _ => PullStrategy::Ask,
    };
    let prompter = prompter(cli.yes, strategy);
    let invocation = Invocation {
        project: &cli.project,
        config: &config,
        prompter: prompter.as_ref(),
        json: cli.json,
    };

    match &cli.command {
        Commands::Pull { dirs, strategy } => commands::pull(&invocation, dirs, *strategy).await,
        Commands::Push {
            dirs,
            force,
            upload_all,
            indexed_only,
        } => {
            let context = SyncContext::new()
                .with_force(*force)
                .with_upload_all(*upload_all);
            commands::push(&invocation, dirs, context, *indexed_only).await
        }
        Commands::Status { dirs, indexed_only } => {
            commands::status(&invocation, dirs, *indexed_only).await
        }
        Commands::Mapping { action } => match action {
            MappingCommand::Placeholders { dir } => {
                commands::mapping_placeholders(&invocation, dir).await
            }
            MappingCommand::Targets { dir, source_id } => {
                commands::mapping_targets(&invocation, dir, *source_id).await
            }
        },
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.verbose);

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        // finished, but something needs the operator's attention
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            error!(error = %format!("{:#}", e), "prd failed");
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
