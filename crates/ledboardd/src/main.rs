use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing_subscriber::filter::LevelFilter;

use ledboardd::config::Config;
use ledboardd::driver::UdpStripDriver;
use ledboardd::engine::AggregationRenderer;
use ledboardd::engine::Engine;
use ledboardd::source::MqttSource;

/// Status board daemon: renders entity states onto an addressable LED strip.
#[derive(Debug, Parser)]
#[command(name = "ledboardd", version)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(short, long, default_value = "ledboardd.toml")]
    config: PathBuf,

    /// Validate the configuration, print the mapping table, and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = Config::from_file(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;

    // Resolve and validate the whole board up front; everything wrong with
    // the configuration is fatal here.
    let board = config.build_board().context("invalid configuration")?;

    if args.check {
        print!("{}", board.table.summary());
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_max_level(LevelFilter::from(config.logging.level))
        .init();

    info!("ledboardd starting");
    info!("Loaded config from: {}", args.config.display());
    for line in board.table.summary().lines() {
        debug!("{line}");
    }

    // The mapping table moves into the renderer; grab the subscription set
    // first.
    let entities: Vec<String> = board.table.entity_ids().map(str::to_string).collect();

    info!(
        "Driving strip of {} pixels at {}",
        config.strip.length, config.strip.target
    );
    let driver = UdpStripDriver::connect(&config.strip.target, config.strip.length)
        .await
        .context("failed to set up strip driver")?;

    let renderer = AggregationRenderer::new(board, driver);
    let (engine, handle) = Engine::new(renderer);

    let source = MqttSource::new(&config.mqtt);
    info!(
        "Connecting to MQTT broker at {}:{}",
        config.mqtt.broker, config.mqtt.port
    );

    let engine_task = tokio::spawn(engine.run());
    let source_task = tokio::spawn(source.run(entities, handle));

    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            info!("Received shutdown signal");
        }
        Err(e) => {
            error!("Failed to listen for shutdown signal: {e}");
        }
    }

    // Shutdown simply stops dispatching further events; every render is
    // idempotent given the current registry, so nothing needs rollback.
    source_task.abort();
    engine_task.abort();

    info!("ledboardd shutdown complete");

    Ok(())
}
