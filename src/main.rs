use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use chainrun::settings::PersistMode;

mod cmd;

#[derive(Parser)]
#[command(name = "chainrun")]
#[command(version, about = "Run chains of data-analysis links")]
pub struct Cli {
    /// Log at debug level (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a pipeline file
    Run(RunArgs),
    /// List the chains and links of a pipeline file
    Chains {
        /// Path to the pipeline file
        pipeline: PathBuf,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Path to the pipeline file
    pub pipeline: PathBuf,

    /// Settings file replacing the pipeline's [settings] table
    #[arg(long)]
    pub settings: Option<PathBuf>,

    /// Start with this chain, resuming from the services persisted by its predecessor
    #[arg(long)]
    pub begin_with: Option<String>,

    /// Stop after this chain
    #[arg(long)]
    pub end_with: Option<String>,

    /// Run only this chain
    #[arg(long, conflicts_with_all = ["begin_with", "end_with"])]
    pub single_chain: Option<String>,

    /// Directory for persisted process services
    #[arg(long)]
    pub results_dir: Option<PathBuf>,

    /// When to persist services: none, last_chain, each_chain or one_chain:<chain>
    #[arg(long)]
    pub persist: Option<PersistMode>,

    /// Maximum number of fork workers running at once
    #[arg(long)]
    pub max_workers: Option<usize>,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,

    /// Print the execute time of every link
    #[arg(long)]
    pub profile: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "chainrun=debug" } else { "chainrun=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let result = match &cli.command {
        Commands::Run(args) => cmd::cmd_run(args).await,
        Commands::Chains { pipeline } => cmd::cmd_chains(pipeline).map(|()| ExitCode::SUCCESS),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:?}");
            ExitCode::FAILURE
        }
    }
}
