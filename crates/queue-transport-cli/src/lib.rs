//! # Queue Transport CLI
//!
//! Command-line interface for the queue transport.
//!
//! This module provides CLI commands for:
//! - Sending a message to a queue
//! - Receiving and printing messages
//! - Checking whether a queue has work
//! - Purging a queue
//! - Showing the resolved configuration

use bytes::Bytes;
use clap::{Parser, Subcommand};
use queue_transport::{
    ConfigurationError, MessageId, ProviderError, QueueAddress, QueueTransport, RawQueueClient,
    StorageQueueClient, StorageQueueConfig, TransportError, TransportMessage, TransportSettings,
};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const ENV_PREFIX: &str = "QT";

// ============================================================================
// CLI Structure
// ============================================================================

/// Queue Transport CLI - send, receive and manage storage queues
#[derive(Parser)]
#[command(name = "queue-transport")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Send, receive and manage transport queues")]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, env = "QT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Logging level
    #[arg(short, long, default_value = "info")]
    pub log_level: String,

    /// Enable JSON logging
    #[arg(long)]
    pub json_logs: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Send a message to a queue
    Send {
        /// Destination queue address (`queue` or `queue@machine`)
        #[arg(short, long)]
        queue: String,

        /// Message body text
        #[arg(short, long, conflicts_with = "file")]
        body: Option<String>,

        /// Read the message body from a file
        #[arg(short, long)]
        file: Option<PathBuf>,

        /// Message header as `key=value`, may be repeated
        #[arg(short = 'H', long = "header")]
        headers: Vec<String>,

        /// Correlation identifier
        #[arg(long)]
        correlation_id: Option<String>,
    },

    /// Receive messages from a queue, removing them
    Receive {
        /// Queue address to receive from
        #[arg(short, long)]
        queue: String,

        /// Maximum number of messages to receive
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: OutputFormat,
    },

    /// Check whether a queue has a visible message
    Peek {
        /// Queue address to check
        #[arg(short, long)]
        queue: String,
    },

    /// Remove every message from a queue
    Purge {
        /// Queue address to purge
        #[arg(short, long)]
        queue: String,

        /// Confirm the purge
        #[arg(short, long)]
        yes: bool,
    },

    /// Show configuration
    Config {
        /// Show resolved configuration
        #[arg(short, long)]
        show: bool,

        /// Output format for configuration
        #[arg(short = 'f', long, default_value = "yaml")]
        format: ConfigFormat,
    },
}

/// Output format options for received messages
#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text
    Text,
    /// JSON output
    Json,
}

/// Configuration format options
#[derive(Clone, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum ConfigFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
}

// ============================================================================
// Configuration
// ============================================================================

/// Resolved CLI configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Transport tuning
    pub transport: TransportSettings,

    /// Storage account connection
    pub storage: StorageQueueConfig,
}

impl CliConfig {
    /// Copy of this configuration safe to print
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if copy.storage.sas_token.is_some() {
            copy.storage.sas_token = Some("<REDACTED>".to_string());
        }
        copy
    }
}

/// Load configuration from an optional file overridden by `QT__*` variables.
///
/// Nested keys use a double underscore, e.g. `QT__TRANSPORT__BATCH_SIZE` or
/// `QT__STORAGE__ACCOUNT_NAME`.
pub fn load_configuration(path: Option<&Path>) -> Result<CliConfig, CliError> {
    let mut builder = config::Config::builder();
    if let Some(path) = path {
        builder = builder.add_source(config::File::from(path).required(true));
    }

    let config: CliConfig = builder
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .and_then(|c| c.try_deserialize())
        .map_err(|e| ConfigurationError::Parsing {
            message: e.to_string(),
        })?;

    config.transport.validate()?;
    Ok(config)
}

/// Render the configuration with secrets redacted
pub fn render_configuration(config: &CliConfig, format: &ConfigFormat) -> Result<String, CliError> {
    let redacted = config.redacted();
    let rendered = match format {
        ConfigFormat::Yaml => serde_yaml::to_string(&redacted).map_err(|e| e.to_string()),
        ConfigFormat::Json => serde_json::to_string_pretty(&redacted).map_err(|e| e.to_string()),
    };

    rendered.map_err(|message| CliError::Configuration(ConfigurationError::Parsing { message }))
}

// ============================================================================
// Error Types
// ============================================================================

/// CLI error types
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid argument: {arg} - {message}")]
    InvalidArgument { arg: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    fn invalid(arg: &str, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            arg: arg.to_string(),
            message: message.into(),
        }
    }
}

// Provider construction only fails on bad connection settings.
impl From<ProviderError> for CliError {
    fn from(error: ProviderError) -> Self {
        Self::Configuration(ConfigurationError::Invalid {
            message: error.to_string(),
        })
    }
}

// ============================================================================
// Argument Parsing
// ============================================================================

/// Parse a `key=value` header argument
pub fn parse_header(raw: &str) -> Result<(String, String), CliError> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| CliError::invalid("header", format!("expected key=value, got '{}'", raw)))?;

    let key = key.trim();
    if key.is_empty() {
        return Err(CliError::invalid("header", "header name is empty"));
    }

    Ok((key.to_string(), value.to_string()))
}

/// Parse a queue address argument
pub fn parse_queue(raw: &str) -> Result<QueueAddress, CliError> {
    QueueAddress::parse(raw).map_err(|e| CliError::invalid("queue", e.to_string()))
}

/// Build the message for the `send` command
pub fn build_message(
    body: Option<String>,
    file: Option<&Path>,
    headers: &[String],
    correlation_id: Option<String>,
) -> Result<TransportMessage, CliError> {
    let body = match (body, file) {
        (Some(text), None) => Bytes::from(text),
        (None, Some(path)) => Bytes::from(std::fs::read(path)?),
        (Some(_), Some(_)) => {
            return Err(CliError::invalid("body", "use either --body or --file"));
        }
        (None, None) => {
            return Err(CliError::invalid("body", "one of --body or --file is required"));
        }
    };

    let mut message = TransportMessage::new(body);
    for raw in headers {
        let (key, value) = parse_header(raw)?;
        message = message.with_header(key, value);
    }
    if let Some(correlation_id) = correlation_id {
        message = message.with_correlation_id(correlation_id);
    }

    Ok(message)
}

/// Format a received message for output
pub fn render_message(message: &TransportMessage, format: &OutputFormat) -> String {
    let id = message.id.as_ref().map(|id| id.to_string()).unwrap_or_default();
    let body = String::from_utf8_lossy(&message.body);

    match format {
        OutputFormat::Json => serde_json::json!({
            "id": id,
            "correlation_id": message.correlation_id,
            "headers": message.headers,
            "time_sent": message.time_sent.to_string(),
            "body": body,
        })
        .to_string(),
        OutputFormat::Text => {
            let mut headers: Vec<_> = message.headers.iter().collect();
            headers.sort();

            let mut text = format!("id: {}\n", id);
            if let Some(correlation_id) = &message.correlation_id {
                text.push_str(&format!("correlation-id: {}\n", correlation_id));
            }
            for (key, value) in headers {
                text.push_str(&format!("header: {}={}\n", key, value));
            }
            text.push_str(&format!("time-sent: {}\n", message.time_sent));
            text.push_str(&body);
            text
        }
    }
}

// ============================================================================
// Commands
// ============================================================================

/// Send one message and print its assigned id
pub async fn send_command(
    transport: &QueueTransport,
    queue: &str,
    mut message: TransportMessage,
    out: &mut impl Write,
) -> Result<MessageId, CliError> {
    let destination = parse_queue(queue)?;
    let id = transport.send(&mut message, &destination).await?;

    info!(message_id = %id, destination = %destination, "Message sent");
    writeln!(out, "{}", id)?;
    Ok(id)
}

/// Bind the transport to a queue that must already exist
async fn bind_existing(
    transport: &mut QueueTransport,
    queue: &str,
) -> Result<QueueAddress, CliError> {
    let address = parse_queue(queue)?;
    if !transport.queue_exists(&address).await? {
        return Err(TransportError::QueueNotFound {
            queue_name: address.queue().to_string(),
        }
        .into());
    }

    transport.init(&address, false).await?;
    Ok(address)
}

/// Receive up to `count` messages without a transaction, printing each.
///
/// Fetches never lease more messages than are still to be printed, since a
/// non-transactional fetch deletes everything it returns.
pub async fn receive_command(
    transport: &mut QueueTransport,
    queue: &str,
    count: usize,
    format: &OutputFormat,
    out: &mut impl Write,
) -> Result<usize, CliError> {
    let address = bind_existing(transport, queue).await?;

    let mut received = 0;
    while received < count {
        transport.limit_batch_size(u32::try_from(count - received).unwrap_or(u32::MAX));
        match transport.receive().await? {
            Some(message) => {
                writeln!(out, "{}", render_message(&message, format))?;
                received += 1;
            }
            None => break,
        }
    }

    debug!(queue = %address, received, "Receive finished");
    Ok(received)
}

/// Print whether the queue has a visible message
pub async fn peek_command(
    transport: &mut QueueTransport,
    queue: &str,
    out: &mut impl Write,
) -> Result<bool, CliError> {
    bind_existing(transport, queue).await?;

    let available = transport.has_message().await?;
    writeln!(out, "{}", if available { "available" } else { "empty" })?;
    Ok(available)
}

/// Purge the queue after confirmation
pub async fn purge_command(
    transport: &mut QueueTransport,
    queue: &str,
    confirmed: bool,
    out: &mut impl Write,
) -> Result<(), CliError> {
    if !confirmed {
        return Err(CliError::invalid("yes", "purging requires --yes"));
    }

    let address = bind_existing(transport, queue).await?;
    transport.purge().await?;

    writeln!(out, "purged {}", address)?;
    Ok(())
}

// ============================================================================
// Entry Point
// ============================================================================

/// Initialize tracing, writing to stderr so command output stays clean
pub fn initialize_logging(level: &str, json: bool) -> Result<(), CliError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            EnvFilter::try_new(format!(
                "queue_transport={level},queue_transport_cli={level}"
            ))
        })
        .map_err(|e| CliError::invalid("log-level", e.to_string()))?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };

    result.map_err(|e| {
        CliError::Configuration(ConfigurationError::Invalid {
            message: format!("failed to initialize logging: {}", e),
        })
    })
}

/// Parse arguments, load configuration and run the selected command
pub async fn run_cli() -> Result<(), CliError> {
    let cli = Cli::parse();
    initialize_logging(&cli.log_level, cli.json_logs)?;

    let config = load_configuration(cli.config.as_deref())?;
    let mut out = std::io::stdout();

    match cli.command {
        Commands::Config { show, format } => {
            if show {
                write!(out, "{}", render_configuration(&config, &format)?)?;
            } else {
                info!("Configuration is valid");
                writeln!(out, "configuration is valid")?;
            }
            Ok(())
        }
        command => {
            let client: Arc<dyn RawQueueClient> =
                Arc::new(StorageQueueClient::new(config.storage.clone())?);
            let mut transport = QueueTransport::new(client, config.transport.clone())?;
            execute(command, &mut transport, &mut out).await
        }
    }
}

/// Run a queue command against a transport
pub async fn execute(
    command: Commands,
    transport: &mut QueueTransport,
    out: &mut impl Write,
) -> Result<(), CliError> {
    match command {
        Commands::Send {
            queue,
            body,
            file,
            headers,
            correlation_id,
        } => {
            let message = build_message(body, file.as_deref(), &headers, correlation_id)?;
            send_command(transport, &queue, message, out).await?;
        }
        Commands::Receive {
            queue,
            count,
            format,
        } => {
            receive_command(transport, &queue, count, &format, out).await?;
        }
        Commands::Peek { queue } => {
            peek_command(transport, &queue, out).await?;
        }
        Commands::Purge { queue, yes } => {
            purge_command(transport, &queue, yes, out).await?;
        }
        Commands::Config { .. } => {
            return Err(CliError::invalid(
                "command",
                "config does not operate on a queue",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
