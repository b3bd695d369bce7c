//! chatlink command line client
//!
//! `listen` prints chat messages from one or more topics until interrupted,
//! `send` publishes one message, and `config` validates the configuration.

use chatlink::config::ChatlinkConfig;
use chatlink::observability::logging::{init_default_logging, init_logging, LogFormat};
use chatlink::observability::metrics::metrics;
use chatlink::protocol::{ChatMessage, InboundMessage};
use chatlink::{command_span, MessagingSession, MqttTransport, SubscribeOutcome};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn, Instrument, Level};

/// Managed MQTT chat client
#[derive(Parser)]
#[command(name = "chatlink")]
#[command(about = "Publish and receive chat messages over MQTT")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging (overrides LOG_LEVEL with DEBUG)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subscribe and print messages until interrupted
    Listen {
        /// Topic filter to subscribe to (repeatable)
        #[arg(short, long, required = true)]
        topic: Vec<String>,
    },
    /// Publish a single chat message
    Send {
        #[arg(short, long)]
        topic: String,
        #[arg(short, long)]
        message: String,
        #[arg(short, long, env = "CHATLINK_SENDER")]
        sender: String,
        /// RFC 3339 timestamp; defaults to now (UTC)
        #[arg(long)]
        timestamp: Option<String>,
    },
    /// Validate configuration
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let logging = if cli.verbose > 0 {
        let format = LogFormat::parse(&std::env::var("LOG_FORMAT").unwrap_or_default());
        init_logging(Level::DEBUG, format, false)
    } else {
        init_default_logging()
    };
    if let Err(e) = logging {
        eprintln!("Failed to initialize logging: {e}");
    }

    info!("Starting chatlink v{}", env!("CARGO_PKG_VERSION"));

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Listen { topic } => {
            listen(config, topic)
                .instrument(command_span!(command = "listen"))
                .await
        }
        Commands::Send {
            topic,
            message,
            sender,
            timestamp,
        } => {
            let message = match timestamp {
                Some(timestamp) => ChatMessage::new(message, sender, timestamp),
                None => ChatMessage::now(message, sender),
            };
            send(config, topic, message)
                .instrument(command_span!(command = "send"))
                .await
        }
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }

    info!("Application shutdown complete");
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<ChatlinkConfig, Box<dyn std::error::Error>> {
    match config_path {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Ok(ChatlinkConfig::load_from_file(path)?)
        }
        None => {
            // Try default locations
            for path_str in ["chatlink.toml", "config/chatlink.toml"] {
                let path = PathBuf::from(path_str);
                if path.exists() {
                    info!("Loading configuration from: {}", path.display());
                    return Ok(ChatlinkConfig::load_from_file(&path)?);
                }
            }

            info!("No configuration file found, using defaults");
            Ok(ChatlinkConfig::with_generated_client_id())
        }
    }
}

fn build_session(
    config: &ChatlinkConfig,
) -> Result<MessagingSession<MqttTransport>, Box<dyn std::error::Error>> {
    let settings = config.session_settings()?;
    info!(
        broker = %settings.options.broker_address(),
        client_id = %settings.options.client_id,
        clean_session = settings.options.clean_session,
        "Session configured"
    );
    Ok(MessagingSession::new(settings, Arc::new(MqttTransport::new())))
}

fn print_message(inbound: &InboundMessage) {
    println!(
        "[{}] {} @ {}: {}",
        inbound.message.timestamp, inbound.message.sender, inbound.topic, inbound.message.message
    );
}

async fn listen(
    config: ChatlinkConfig,
    topics: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = build_session(&config)?;

    let (message_tx, mut message_rx) = mpsc::channel(64);
    session.set_message_sender(message_tx).await;

    session.connect().await?;
    for topic in &topics {
        match session.subscribe(topic).await? {
            SubscribeOutcome::Subscribed | SubscribeOutcome::AlreadyActive => {}
            SubscribeOutcome::NotConnected => {
                warn!(topic = %topic, "Connection dropped before subscribing");
            }
        }
    }

    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;
    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;

    info!(topics = ?topics, "Listening for messages");

    loop {
        tokio::select! {
            inbound = message_rx.recv() => match inbound {
                Some(inbound) => print_message(&inbound),
                None => break,
            },
            _ = sigint.recv() => {
                info!("Received SIGINT, shutting down gracefully...");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down gracefully...");
                break;
            }
        }
    }

    let result = session.shutdown().await;
    info!(metrics = %serde_json::to_string(&metrics().get_metrics())?, "Session metrics");
    Ok(result?)
}

async fn send(
    config: ChatlinkConfig,
    topic: String,
    message: ChatMessage,
) -> Result<(), Box<dyn std::error::Error>> {
    let session = build_session(&config)?;

    // A failed connect is not fatal here; publish makes its own reconnect attempt
    if let Err(e) = session.connect().await {
        warn!(error = %e, "Initial connect failed");
    }

    let report = session.publish_message(&topic, &message).await;
    if let Err(e) = session.shutdown().await {
        warn!(error = %e, "Disconnect after send failed");
    }

    let report = match report {
        Ok(report) => report,
        Err(e) => {
            if e.is_transient() {
                warn!(topic = %topic, error = %e, "Message was not delivered, safe to send again later");
            }
            return Err(e.into());
        }
    };
    info!(
        topic = %report.topic,
        bytes = report.bytes,
        reconnects = report.reconnects,
        "Message sent"
    );
    Ok(())
}

fn handle_config_command(
    config: &ChatlinkConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    info!("Configuration is valid");

    if show {
        println!("{}", config.to_toml_string()?);
    }

    Ok(())
}
