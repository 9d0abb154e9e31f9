//! Standalone headless client binary.
//!
//! Usage:
//!   cargo run -p world_client -- [--addr 127.0.0.1:40000] [--name Player]
//!       [--tick-hz 60] [--frames N] [--config client.json]
//!
//! The client enters the world, runs one synchronization tick per frame and
//! logs the entities it tracks. It exits when kicked, when the connection
//! drops, or after `--frames` frames.

use std::env;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::info;
use world_client::{
    presentation::{CharacterFactory, HeadlessFactory, HeadlessHandle, Journal},
    TickOutcome, WorldClient,
};
use world_shared::config::SyncConfig;

struct Args {
    cfg: SyncConfig,
    frames: Option<u64>,
}

fn parse_args() -> anyhow::Result<Args> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => SyncConfig::from_json_file(&PathBuf::from(&args[i + 1]))?,
        _ => SyncConfig::default(),
    };
    let mut frames = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--name" if i + 1 < args.len() => {
                cfg.player_name = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().unwrap_or(60);
                i += 2;
            }
            "--frames" if i + 1 < args.len() => {
                frames = args[i + 1].parse().ok();
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok(Args { cfg, frames })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let Args { cfg, frames } = parse_args()?;
    info!(server = %cfg.server_addr, radius = cfg.visibility_radius, "Starting client");

    let factory: Arc<dyn CharacterFactory<HeadlessHandle>> =
        Arc::new(HeadlessFactory::new(Journal::new()));
    let mut client = WorldClient::connect(&cfg, factory).await.context("connect")?;

    let tick_interval = cfg.tick_interval();
    let mut interval = tokio::time::interval(tick_interval);

    loop {
        interval.tick().await;

        match client.frame().await? {
            TickOutcome::Kicked => {
                println!("Removed from world.");
                return Ok(());
            }
            TickOutcome::Skipped => break,
            TickOutcome::Applied(_) => {}
        }

        // Print tracked entities about once a second.
        if client.frames() % u64::from(cfg.tick_hz.max(1)) == 0 {
            let registry = client.session().registry();
            info!(
                frame = client.frames(),
                active = registry.active_count(),
                pending = registry.pending_count(),
                "Tracked entities"
            );
        }

        if frames.is_some_and(|limit| client.frames() >= limit) {
            break;
        }
    }

    client.exit().await?;
    info!("Left world");
    Ok(())
}
