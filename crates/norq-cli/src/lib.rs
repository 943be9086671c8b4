//! # Norq CLI
//!
//! Command-line interface to Norq queues.
//!
//! Every queue command runs directly against the configured backing store,
//! using the same configuration sources as the HTTP service, and prints its
//! result as JSON or YAML on stdout. Logs go to stderr.

use clap::{Parser, Subcommand};
use norq_api::{ConfigError, ServiceConfig};
use norq_core::{FlushTarget, NorqError, QueueEngine};
use norq_store::{StoreError, StoreFactory};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;

// ============================================================================
// CLI Structure
// ============================================================================

/// Norq CLI - JSON document queues over Redis
#[derive(Parser, Debug)]
#[command(name = "norq")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Inspect and modify Norq queues")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Logging level
    #[arg(short, long, default_value = "warn")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    pub format: OutputFormat,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// Append a JSON document to a queue
    Push { queue: String, document: String },

    /// Show the oldest document of a queue
    Peek { queue: String },

    /// Remove and show the oldest document of a queue
    Pop { queue: String },

    /// Number of documents in a queue
    Size { queue: String },

    /// Documents between two positions, inclusive; negative positions count from the end
    #[command(allow_negative_numbers = true)]
    Range { queue: String, start: i64, end: i64 },

    /// The first documents of a queue
    Head { queue: String, count: u64 },

    /// The last documents of a queue, newest first
    Tail { queue: String, count: u64 },

    /// One page of documents, numbered from 1
    Page { queue: String, page: u64, size: u64 },

    /// A document by id
    Get { queue: String, id: String },

    /// Overwrite a document by id
    Set {
        queue: String,
        id: String,
        document: String,
    },

    /// Remove a document by id
    Remove { queue: String, id: String },

    /// Clear a queue, or the whole store with `all`
    Flush { target: String },

    /// List every queue definition
    Model,

    /// Validate configuration
    Config {
        /// Show resolved configuration
        #[arg(short, long)]
        show: bool,
    },
}

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// YAML output
    Yaml,
}

// ============================================================================
// CLI Error Types
// ============================================================================

/// CLI errors
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Backing store error: {0}")]
    Store(#[from] StoreError),

    #[error("{0}")]
    Engine(#[from] NorqError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Output failed: {message}")]
    Output { message: String },
}

impl CliError {
    /// Process exit code for this error
    ///
    /// Engine errors caused by the caller's input count as invalid arguments.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Configuration(_) => 1,
            Self::Store(_) => 2,
            Self::Engine(e) if e.is_caller_error() => 3,
            Self::Engine(_) => 2,
            Self::InvalidArgument { .. } => 3,
            Self::Io(_) | Self::Output { .. } => 4,
        }
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::Output {
            message: e.to_string(),
        }
    }
}

impl From<serde_yaml::Error> for CliError {
    fn from(e: serde_yaml::Error) -> Self {
        Self::Output {
            message: e.to_string(),
        }
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();

    initialize_logging(&cli)?;

    let config = ServiceConfig::load(cli.config.as_deref())?;

    let output = match &cli.command {
        Commands::Config { show } => describe_config(&config, *show)?,
        command => {
            let engine = connect_engine(&config).await?;
            execute(command, &engine).await?
        }
    };

    println!("{}", render(&output, cli.format)?);
    Ok(())
}

/// Run one queue command against an engine
pub async fn execute(command: &Commands, engine: &QueueEngine) -> Result<Value, CliError> {
    debug!(command = ?command, "Executing command");

    let output = match command {
        Commands::Push { queue, document } => {
            serde_json::to_value(engine.push(queue, document.as_str()).await?)?
        }
        Commands::Peek { queue } => serde_json::to_value(engine.peek(queue).await?)?,
        Commands::Pop { queue } => serde_json::to_value(engine.pop(queue).await?)?,
        Commands::Size { queue } => json!(engine.size(queue).await?),
        Commands::Range { queue, start, end } => {
            serde_json::to_value(engine.range(queue, *start, *end).await?)?
        }
        Commands::Head { queue, count } => {
            serde_json::to_value(engine.head(queue, *count).await?)?
        }
        Commands::Tail { queue, count } => {
            serde_json::to_value(engine.tail(queue, *count).await?)?
        }
        Commands::Page { queue, page, size } => {
            serde_json::to_value(engine.page(queue, *page, *size).await?)?
        }
        Commands::Get { queue, id } => serde_json::to_value(engine.get(queue, id).await?)?,
        Commands::Set {
            queue,
            id,
            document,
        } => serde_json::to_value(engine.set(queue, id, document.as_str()).await?)?,
        Commands::Remove { queue, id } => serde_json::to_value(engine.remove(queue, id).await?)?,
        Commands::Flush { target } => {
            let outcome = engine.flush(FlushTarget::from(target.as_str())).await?;
            info!(target = %target, "Flush complete");
            serde_json::to_value(outcome)?
        }
        Commands::Model => {
            let model: serde_json::Map<String, Value> = engine
                .registry()
                .definitions()
                .into_iter()
                .map(|definition| Ok((definition.name.clone(), serde_json::to_value(definition)?)))
                .collect::<Result<_, serde_json::Error>>()?;
            Value::Object(model)
        }
        Commands::Config { .. } => {
            return Err(CliError::InvalidArgument {
                arg: "config".to_string(),
                message: "not a queue command".to_string(),
            })
        }
    };

    Ok(output)
}

/// Summary of a configuration that passed validation
pub fn describe_config(config: &ServiceConfig, show: bool) -> Result<Value, CliError> {
    if show {
        return Ok(serde_json::to_value(config)?);
    }

    Ok(json!({
        "valid": true,
        "provider": config.store.provider_type().to_string(),
        "queues": config.model.keys().collect::<Vec<_>>(),
    }))
}

/// Format command output
pub fn render(output: &Value, format: OutputFormat) -> Result<String, CliError> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(output)?),
        OutputFormat::Yaml => Ok(serde_yaml::to_string(output)?.trim_end().to_string()),
    }
}

// ============================================================================
// Private helpers
// ============================================================================

fn initialize_logging(cli: &Cli) -> Result<(), CliError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&cli.log_level).map_err(|e| CliError::InvalidArgument {
            arg: "log-level".to_string(),
            message: e.to_string(),
        })?,
    };

    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }

    Ok(())
}

async fn connect_engine(config: &ServiceConfig) -> Result<QueueEngine, CliError> {
    let registry = config.registry()?;
    let store = StoreFactory::create_store(&config.store).await?;
    Ok(QueueEngine::new(registry, store))
}
