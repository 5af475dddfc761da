//! Warden command-line tool.
//!
//! Evaluates access requests against a JSON dataset and checks policy
//! documents before they are deployed.
//!
//! # Quick Start
//!
//! ```bash
//! # Check a dataset or policy file
//! warden validate ./dataset.json
//!
//! # Ask for a decision
//! warden evaluate --dataset ./dataset.json \
//!     --subject sub-001 --resource res-001 --action read \
//!     --env source_ip=10.0.0.5
//!
//! # Show how a path expands for hierarchical matching
//! warden hierarchy /api/v1/users
//! ```

mod commands;
mod style;

use std::path::PathBuf;

use anyhow::Result;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use warden_config::{ConfigLoader, WardenConfig};

/// Warden - attribute-based access control decisions.
#[derive(Parser)]
#[command(name = "warden")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Additional config file, layered above warden.toml and warden.local.toml.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version information.
    Version,

    /// Evaluate an access request against a dataset.
    Evaluate(EvaluateArgs),

    /// Validate a dataset, a policy list or a single policy document.
    Validate {
        /// Path to the JSON file.
        file: PathBuf,
    },

    /// Print the hierarchy expansion of a resource path.
    Hierarchy {
        /// Resource path, e.g. /api/v1/users.
        path: String,
    },

    /// Configuration commands.
    #[command(subcommand)]
    Config(ConfigCommands),
}

#[derive(clap::Args)]
struct EvaluateArgs {
    /// JSON dataset with subjects, resources, actions and policies. Defaults
    /// to `store.dataset` from the configuration.
    #[arg(short, long)]
    dataset: Option<PathBuf>,

    /// Subject id.
    #[arg(short, long)]
    subject: String,

    /// Resource id.
    #[arg(short, long)]
    resource: String,

    /// Action name.
    #[arg(short, long)]
    action: String,

    /// Environment attribute as key=value. Values that parse as JSON keep
    /// their type; anything else is a string. Repeatable.
    #[arg(short, long = "env", value_name = "KEY=VALUE")]
    env: Vec<String>,

    /// Evaluation time (RFC 3339). Defaults to now.
    #[arg(short, long)]
    timestamp: Option<DateTime<Utc>>,

    /// Give up after this many milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Request id recorded in the decision and the audit log.
    #[arg(long)]
    request_id: Option<String>,

    /// Surface storage errors and timeouts instead of denying.
    #[arg(long)]
    strict: bool,

    /// Output format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Show the effective configuration.
    Show {
        /// Output format.
        #[arg(short, long, value_enum, default_value_t = ConfigFormat::Toml)]
        format: ConfigFormat,
    },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Table,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum ConfigFormat {
    Toml,
    Json,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    style::set_no_color(cli.no_color);

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_file(path);
    }
    let config = loader.load()?;

    init_logging(&config);

    match cli.command {
        Commands::Version => {
            commands::version::run();
            Ok(())
        }
        Commands::Evaluate(args) => commands::evaluate::run(&config, args),
        Commands::Validate { file } => commands::validate::run(&file),
        Commands::Hierarchy { path } => {
            commands::hierarchy::run(&path);
            Ok(())
        }
        Commands::Config(ConfigCommands::Show { format }) => {
            commands::config::show(&config, format)
        }
    }
}

/// Logs go to stderr so that decision JSON on stdout stays parseable.
/// `RUST_LOG` overrides the configured filter.
fn init_logging(config: &WardenConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}
