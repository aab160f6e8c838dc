//! humidi - MIDI device and note monitor
//!
//! Lists MIDI devices or prints note and device events from the system MIDI
//! service until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use humidi::config::LoggingConfig;
use humidi::{AppConfig, MidiFacade, MidirHost};

mod monitor;

/// humidi - Watch MIDI devices and key presses
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "humidi.yaml")]
    config: String,

    /// Log level (error, warn, info, debug, trace); overrides the config file
    #[arg(short, long, env = "LOG_LEVEL")]
    log_level: Option<String>,

    /// List available MIDI devices and exit
    #[arg(long)]
    list_ports: bool,

    /// Print the device list as JSON
    #[arg(long, requires = "list_ports")]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = AppConfig::load_or_default(&args.config).await?;

    let level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.logging.level.clone());
    let _log_guard = init_logging(&level, &config.logging)?;

    info!("Starting humidi v{}...", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let host = Arc::new(MidirHost::from_config(&config));
    let facade = MidiFacade::connect(host)
        .await
        .context("Failed to initialize MIDI")?;

    if args.list_ports {
        let registry = facade.device_registry();
        if args.json {
            monitor::print_registry_json(&registry)?;
        } else {
            monitor::print_registry(&registry);
        }
        return Ok(());
    }

    monitor::run(&facade, shutdown_signal()).await;

    info!("humidi shutdown complete");
    Ok(())
}

/// Install the tracing subscriber.
///
/// The returned guard flushes the log file on drop and must outlive `main`'s work.
fn init_logging(level: &str, logging: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (console, console_json) = if logging.json {
        (None, Some(fmt::layer().json().with_target(false)))
    } else {
        let layer = fmt::layer()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false);
        (Some(layer), None)
    };

    let (file, guard) = match &logging.file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or(Path::new("."));
            let prefix = path
                .file_name()
                .with_context(|| format!("Log file path '{}' has no file name", path.display()))?;

            let appender = tracing_appender::rolling::daily(directory, prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(console_json)
        .with(file)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl+C: {}", e);
    }
    info!("Shutdown signal received");
}
