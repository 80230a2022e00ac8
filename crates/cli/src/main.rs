//! procmem CLI: the main entry point.
//!
//! Commands:
//! - `init`         Write a default config file
//! - `memory`       Add, search, show, export and import procedures
//! - `context`      Assemble the layered context for a task
//! - `learn`        Judge trajectories and store extracted procedures
//! - `consolidate`  Meta-analysis over a batch of trajectories

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod commands;

#[derive(Parser)]
#[command(
    name = "procmem",
    about = "procmem: procedural memory and bounded context assembly",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (defaults to ~/.procmem/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Manage the procedural memory store
    Memory {
        #[command(subcommand)]
        action: MemoryCommands,
    },

    /// Context assembly
    Context {
        #[command(subcommand)]
        action: ContextCommands,
    },

    /// Judge trajectories and store what they teach
    Learn {
        /// JSON file with one trajectory or an array of them
        #[arg(long)]
        trajectory: PathBuf,

        /// Do not extract anti-patterns from failed runs
        #[arg(long)]
        no_failures: bool,
    },

    /// Cross-trajectory meta-analysis
    Consolidate {
        /// JSONL file, one trajectory per line
        #[arg(long)]
        trajectories: PathBuf,
    },
}

#[derive(Subcommand)]
enum MemoryCommands {
    /// Add a procedure
    Add {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        content: String,
        /// human, success, failure, meta-analysis, exemplar, seed, principle, episode, contrastive
        #[arg(long, default_value = "human")]
        source: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
        /// Curriculum level 1-5 (classified from the title when omitted)
        #[arg(long)]
        level: Option<u8>,
        #[arg(long)]
        domain: Option<String>,
    },

    /// Search procedures (metadata only)
    Search {
        query: String,
        #[arg(short, long)]
        k: Option<usize>,
        /// Reorder by curriculum tier
        #[arg(long)]
        curriculum: bool,
        #[arg(long)]
        domain: Option<String>,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// Show full procedures by id
    Show {
        #[arg(required = true)]
        ids: Vec<String>,
    },

    /// Store statistics
    Stats,

    /// Export the store as a JSONL pack
    Export { output: PathBuf },

    /// Merge a JSONL pack into the store
    Import { pack: PathBuf },
}

#[derive(Subcommand)]
enum ContextCommands {
    /// Build the layered context for a task
    Build {
        #[arg(long)]
        task: String,
        /// Domain model JSON
        #[arg(long)]
        domain_model: PathBuf,
        /// Reference guide to compress into the last layer
        #[arg(long)]
        guide: Option<PathBuf>,
        /// Disable a layer (orientation, constraints, memory, guide)
        #[arg(long = "disable")]
        disable: Vec<String>,
        /// Print per-layer statistics as JSON after the context
        #[arg(long)]
        stats: bool,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config_path = cli.config.as_deref();
    match cli.command {
        Commands::Init { force } => commands::init::run(config_path, force).await?,
        Commands::Memory { action } => {
            let config = commands::load_config(config_path)?;
            match action {
                MemoryCommands::Add {
                    title,
                    description,
                    content,
                    source,
                    tags,
                    level,
                    domain,
                } => {
                    let draft = commands::memory::NewItem {
                        title,
                        description,
                        content,
                        source,
                        tags,
                        level,
                        domain,
                    };
                    commands::memory::add(&config, draft).await?
                }
                MemoryCommands::Search {
                    query,
                    k,
                    curriculum,
                    domain,
                    tags,
                } => commands::memory::search(&config, &query, k, curriculum, domain, tags).await?,
                MemoryCommands::Show { ids } => commands::memory::show(&config, &ids).await?,
                MemoryCommands::Stats => commands::memory::stats(&config).await?,
                MemoryCommands::Export { output } => {
                    commands::memory::export(&config, &output).await?
                }
                MemoryCommands::Import { pack } => commands::memory::import(&config, &pack).await?,
            }
        }
        Commands::Context { action } => {
            let config = commands::load_config(config_path)?;
            match action {
                ContextCommands::Build {
                    task,
                    domain_model,
                    guide,
                    disable,
                    stats,
                } => {
                    commands::context::build(
                        &config,
                        &task,
                        &domain_model,
                        guide.as_deref(),
                        &disable,
                        stats,
                    )
                    .await?
                }
            }
        }
        Commands::Learn {
            trajectory,
            no_failures,
        } => {
            let config = commands::load_config(config_path)?;
            commands::learn::learn(&config, &trajectory, no_failures).await?
        }
        Commands::Consolidate { trajectories } => {
            let config = commands::load_config(config_path)?;
            commands::learn::consolidate(&config, &trajectories).await?
        }
    }

    Ok(())
}
