// Copyright (c) 2026 bad-antics
// Licensed under the MIT License. See LICENSE file in the project root.
// https://github.com/bad-antics/moisture-sim

//! MoistureSim - Soil-Moisture Device Telemetry Simulator
//!
//! Runs the simulation engine headless: a virtual sensor population advanced
//! on a fixed tick, with live reading batches streamed over WebSocket.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use moisture_sim::{Config, Engine, WebSocketServer, VERSION};

/// MoistureSim - Soil-Moisture Device Telemetry Simulator
#[derive(Parser, Debug)]
#[command(name = "moisture-sim")]
#[command(author = "MoistureSim Project")]
#[command(version = VERSION)]
#[command(about = "Simulated soil-moisture sensors with closed-loop watering and live streaming")]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace-level logging
    #[arg(long)]
    trace: bool,

    /// Start without the demo device population
    #[arg(long)]
    no_demo: bool,

    /// WebSocket server port
    #[arg(long)]
    ws_port: Option<u16>,

    /// Disable the WebSocket server
    #[arg(long)]
    no_websocket: bool,

    /// Fixed RNG seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Load or create configuration
    let config_path = args.config.clone().unwrap_or_else(Config::default_path);
    let mut config = Config::load_or_create(&config_path)?;

    // Environment, then command line
    config.apply_env()?;
    if args.no_demo {
        config.demo_mode = false;
    }
    if args.no_websocket {
        config.streaming.websocket_enabled = false;
    }
    if let Some(port) = args.ws_port {
        config.streaming.websocket_port = port;
    }
    if args.seed.is_some() {
        config.simulation.seed = args.seed;
    }
    config.validate()?;

    // Initialize logging
    let log_level = if args.trace {
        Level::TRACE
    } else if args.debug {
        Level::DEBUG
    } else {
        config.log_level.parse().unwrap_or(Level::INFO)
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(args.debug)
        .with_line_number(args.debug)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("🌱 MoistureSim v{} - Soil-Moisture Device Simulator", VERSION);
    info!("Configuration loaded from {:?}", config_path);
    info!(
        "Tick period: {:?}, history per device: {}",
        config.simulation.tick_period(),
        config.simulation.max_history
    );

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run_headless(config))
}

/// Run the engine until Ctrl+C
async fn run_headless(config: Config) -> Result<()> {
    use tokio::sync::broadcast;

    let streaming = config.streaming.clone();
    let demo_mode = config.demo_mode;

    let engine = Arc::new(Engine::new(config)?);
    info!("Core engine initialized");

    if demo_mode {
        engine.seed_demo_devices()?;
    }

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let server = if streaming.websocket_enabled {
        let server = WebSocketServer::new(&streaming, engine.clone());
        server.start(shutdown_tx.subscribe()).await?;
        Some(server)
    } else {
        None
    };

    engine.start();

    info!("🚀 MoistureSim running with {} devices", engine.list_devices().len());
    info!("   Press Ctrl+C to shutdown");

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("Shutdown signal received, cleaning up...");

    let _ = shutdown_tx.send(());
    engine.stop().await;
    drop(server);

    info!("MoistureSim shutdown complete");

    Ok(())
}
