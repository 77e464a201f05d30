//! journald_to_gelf binary: `journalctl -o json -f | journald_to_gelf -s graylog`

use clap::Parser;
use journald_to_gelf::{shutdown, transport, Config, PipelineRunner, Result};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = Config::parse();

    // Initialize tracing
    initialize_tracing(config.log_json);

    info!("Starting journald_to_gelf v{}", env!("CARGO_PKG_VERSION"));

    // Validate configuration
    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {}", e);
        std::process::exit(1);
    }

    // Create transport
    let transport = match transport::connect(&config).await {
        Ok(transport) => transport,
        Err(e) => {
            error!("Failed to set up {} transport: {}", config.protocol, e);
            std::process::exit(1);
        }
    };

    // Build pipeline
    let mut runner = PipelineRunner::new(&config, transport)?;

    // Set up signal handling
    let token = CancellationToken::new();
    let listener = match shutdown::spawn_signal_listener(token.clone()) {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to listen for termination signals: {}", e);
            std::process::exit(1);
        }
    };

    // Forward stdin until EOF or signal
    let input = BufReader::new(tokio::io::stdin());
    if let Err(e) = runner.run(input, token.clone()).await {
        error!("Pipeline stopped: {}", e);
    }

    // Graceful shutdown
    runner.shutdown().await;
    token.cancel();
    listener.abort();

    info!("Exiting...");

    // A blocking stdin read may still be parked on the runtime's blocking pool
    std::process::exit(0);
}

/// Diagnostics go to stderr so stdout stays free
fn initialize_tracing(json: bool) {
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

    let filter_layer = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(&log_level))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false);

    let fmt_layer = if json {
        fmt_layer.json().boxed()
    } else {
        fmt_layer.boxed()
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .init();
}
