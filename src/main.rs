use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

mod cmd;

#[derive(Parser)]
#[command(name = "scrutiny")]
#[command(version, about = "Audit review orchestrator")]
pub struct Cli {
    /// Path to the config file
    #[arg(long, global = true, default_value = "scrutiny.toml")]
    pub config: PathBuf,

    /// Override the oracle command from the config
    #[arg(long, global = true)]
    pub oracle_cmd: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Create a new audit record
    Init {
        /// Human-readable label for the review
        name: String,
    },
    /// List known records
    List,
    /// Show a record's sections, watch list and phase log
    Status { record: Uuid },
    /// Print the next phase for a record
    Next { record: Uuid },
    /// Run the record's next phase
    Run {
        record: Uuid,
        /// Run a specific phase instead of the derived next one
        #[arg(short, long)]
        phase: Option<String>,
        /// Evidence files to attach
        #[arg(long)]
        evidence: Vec<PathBuf>,
    },
    /// Submit supplemental expense evidence for incremental re-processing
    SubmitExpenses {
        record: Uuid,
        #[arg(long, required = true)]
        evidence: Vec<PathBuf>,
    },
    /// Show the derived re-verification targets
    Targets { record: Uuid },
    /// Run a targeted re-verification pass over the outstanding items
    Reverify { record: Uuid },
    /// Put an item on the watch list
    Flag {
        record: Uuid,
        #[arg(long)]
        domain: String,
        #[arg(long)]
        item: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        comment: Option<String>,
    },
    /// Remove a watch-list item
    Unflag {
        record: Uuid,
        #[arg(long)]
        domain: String,
        #[arg(long)]
        item: String,
    },
    /// Record a disposition for an item (comment required)
    Resolve {
        record: Uuid,
        #[arg(long)]
        domain: String,
        #[arg(long)]
        item: String,
        /// One of: resolved, flag, override
        #[arg(long)]
        kind: String,
        #[arg(long)]
        comment: String,
        #[arg(long, default_value = "reviewer")]
        by: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = scrutiny::config::ScrutinyConfig::load_or_default(&cli.config)?;
    if let Some(oracle_cmd) = &cli.oracle_cmd {
        config.oracle.cmd = oracle_cmd.clone();
        config.oracle.args = Vec::new();
    }

    match cli.command {
        Commands::Init { name } => cmd::cmd_init(&config, &name).await,
        Commands::List => cmd::cmd_list(&config).await,
        Commands::Status { record } => cmd::cmd_status(&config, record).await,
        Commands::Next { record } => cmd::cmd_next(&config, record).await,
        Commands::Run {
            record,
            phase,
            evidence,
        } => cmd::cmd_run(&config, record, phase.as_deref(), &evidence).await,
        Commands::SubmitExpenses { record, evidence } => {
            cmd::cmd_submit_expenses(&config, record, &evidence).await
        }
        Commands::Targets { record } => cmd::cmd_targets(&config, record).await,
        Commands::Reverify { record } => cmd::cmd_reverify(&config, record).await,
        Commands::Flag {
            record,
            domain,
            item,
            title,
            comment,
        } => cmd::cmd_flag(&config, record, &domain, &item, &title, comment).await,
        Commands::Unflag {
            record,
            domain,
            item,
        } => cmd::cmd_unflag(&config, record, &domain, &item).await,
        Commands::Resolve {
            record,
            domain,
            item,
            kind,
            comment,
            by,
        } => cmd::cmd_resolve(&config, record, &domain, &item, &kind, &comment, &by).await,
    }
}
