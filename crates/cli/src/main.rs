//! tpforge CLI: the main entry point.
//!
//! Commands:
//! - `init`       : Write config, prompt templates and the knowledge directory
//! - `serve`      : Start the HTTP API
//! - `generate`   : One-shot policy generation from a JSON input file
//! - `regenerate` : Regenerate one section of a stored policy
//! - `search`     : Query the regulatory knowledge base
//! - `doctor`     : Diagnose configuration and dependencies

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tpforge_config::{AppConfig, LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(
    name = "tpforge",
    about = "tpforge - transfer-pricing policy generator",
    version,
    author
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Markdown,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the default config, prompt templates and knowledge directory
    Init,

    /// Start the HTTP API server
    Serve {
        /// Override the port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Generate a policy from a JSON input file without persisting it
    Generate {
        /// File with `company`, `transactions` and `fiscal_year`
        #[arg(short, long)]
        input: PathBuf,

        #[arg(short, long, value_enum, default_value = "markdown")]
        format: OutputFormat,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Regenerate one section of a stored policy
    Regenerate {
        #[arg(long)]
        policy: i64,

        /// Section name, e.g. `benchmarking`
        #[arg(long)]
        section: String,
    },

    /// Search the regulatory knowledge base
    Search {
        /// Jurisdiction to search, e.g. India or US
        #[arg(short, long)]
        jurisdiction: String,

        /// Transaction types to weigh in, comma separated
        #[arg(short, long, value_delimiter = ',')]
        types: Vec<String>,

        /// Maximum number of fragments
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        query: String,
    },

    /// Diagnose configuration, templates, knowledge base and provider
    Doctor,
}

fn init_tracing(verbose: bool, logging: &LoggingConfig) {
    let level = if verbose { "debug" } else { logging.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match logging.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Config errors are reported by the command itself
    let logging = AppConfig::load().map(|c| c.logging).unwrap_or_default();
    init_tracing(cli.verbose, &logging);

    match cli.command {
        Commands::Init => commands::init::run().await?,
        Commands::Serve { port } => commands::serve::run(port).await?,
        Commands::Generate {
            input,
            format,
            output,
        } => commands::generate::run(&input, format, output.as_deref()).await?,
        Commands::Regenerate { policy, section } => {
            commands::regenerate::run(policy, &section).await?
        }
        Commands::Search {
            jurisdiction,
            types,
            top_k,
            query,
        } => commands::search::run(&jurisdiction, types, top_k, &query).await?,
        Commands::Doctor => commands::doctor::run().await?,
    }

    Ok(())
}
