//! msgflow server
//!
//! Runs the user, address and payment flows in one process and exposes
//! the producer API over HTTP.

mod api;
mod config;
mod server;
mod shutdown;
mod sinks;
mod state;

use clap::Parser;
use config::ConfigLoader;
use msgflow_core::pipeline::PipelineHandle;
use msgflow_sdk::{AddressMessage, UserMessage};
use server::{build_router, run_server};
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// msgflow - message-driven user, address and payment pipeline
#[derive(Parser, Debug)]
#[command(name = "msgflow-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./msgflow-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Publish a sample user and two sample addresses on startup
    #[arg(long, default_value = "false")]
    demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    init_tracing();

    // Parse command line arguments
    let args = Args::parse();

    tracing::info!("Starting msgflow-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = ConfigLoader::new(&args.config, args.listen);
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;

    let listen_addr = loaded_config.server.listen;
    tracing::info!("Configuration loaded from {:?}", args.config);

    // Wire and start the pipeline
    let mut pipeline = sinks::pipeline(loaded_config.pipeline)
        .start()
        .map_err(|e| {
            tracing::error!("Failed to start pipeline: {}", e);
            e
        })?;
    let handle = pipeline.handle();

    if args.demo {
        publish_demo_messages(&handle)?;
    }

    // Build the router
    let router = build_router(AppState::new(handle));

    // Run the server
    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    // Stop sources first; the registry goes last
    pipeline.stop().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Publish the sample producer messages.
fn publish_demo_messages(pipeline: &PipelineHandle) -> anyhow::Result<()> {
    pipeline.publish_user(UserMessage::new("test@test.com", "John", "Doe", 20))?;
    pipeline.publish_address(AddressMessage::new(
        "1 Sheffield Way",
        "City Center",
        "Sheffield",
        "S1 SHF",
    ))?;
    pipeline.publish_address(AddressMessage::new("X", "X", "X", "XXX"))?;
    tracing::info!("Demo messages published");
    Ok(())
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
