//! Standalone authority binary.
//!
//! Usage:
//!   cargo run -p world_server -- [--addr 127.0.0.1:40000] [--tick-hz 20] [--npcs 8]
//!       [--config server.json]
//!
//! The authority listens for clients, wanders NPCs placed on a spiral around
//! the origin (some inside, some outside the default visibility radius) and
//! broadcasts their state every tick.
//!
//! Console commands:
//!   status            - Show authority status
//!   spawn <x> <z>     - Add an NPC
//!   despawn <id>      - Remove an NPC
//!   kick <id>         - Remove a client
//!   quit              - Shutdown

use std::env;
use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::info;
use world_server::server::AuthorityServer;
use world_shared::{config::SyncConfig, math::Vec3};

fn parse_args() -> anyhow::Result<(SyncConfig, usize)> {
    let args: Vec<String> = env::args().collect();

    let mut cfg = match args.iter().position(|a| a == "--config") {
        Some(i) if i + 1 < args.len() => SyncConfig::from_json_file(&PathBuf::from(&args[i + 1]))?,
        _ => SyncConfig {
            tick_hz: 20,
            ..Default::default()
        },
    };
    let mut npcs = 8;
    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--addr" if i + 1 < args.len() => {
                cfg.server_addr = args[i + 1].clone();
                i += 2;
            }
            "--tick-hz" if i + 1 < args.len() => {
                cfg.tick_hz = args[i + 1].parse().unwrap_or(20);
                i += 2;
            }
            "--npcs" if i + 1 < args.len() => {
                npcs = args[i + 1].parse().unwrap_or(8);
                i += 2;
            }
            _ => i += 1,
        }
    }
    Ok((cfg, npcs))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let (cfg, npcs) = parse_args()?;
    info!(addr = %cfg.server_addr, tick_hz = cfg.tick_hz, npcs, "Starting authority");

    let mut server = AuthorityServer::bind(cfg.clone())
        .await
        .context("bind authority")?;
    let local = server.local_addr()?;
    info!(%local, "Authority listening");

    for n in 0..npcs {
        let angle = n as f32 * 2.4;
        let dist = 25.0 * (n as f32 + 1.0);
        let id = server.spawn_npc(
            &format!("npc-{n}"),
            Vec3::new(angle.cos() * dist, 0.0, angle.sin() * dist),
        );
        info!(%id, dist, "NPC placed");
    }

    // Set up console input channel.
    let (console_tx, mut console_rx) = mpsc::channel::<String>(32);

    // Spawn stdin reader thread.
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut stdout = std::io::stdout();
        loop {
            print!("] ");
            let _ = stdout.flush();
            let mut line = String::new();
            if stdin.lock().read_line(&mut line).is_err() {
                break;
            }
            let line = line.trim().to_string();
            if !line.is_empty() && console_tx.blocking_send(line).is_err() {
                break;
            }
        }
    });

    println!("Authority ready. Type 'status' for info, 'quit' to exit.");
    println!();

    let tick_interval = cfg.tick_interval();
    let mut next_tick = tokio::time::Instant::now();

    loop {
        while let Ok(line) = console_rx.try_recv() {
            if matches!(line.as_str(), "quit" | "exit") {
                info!("Authority shutting down");
                return Ok(());
            }
            for out in server.exec_console(&line).await? {
                println!("{out}");
            }
        }

        // Accept new clients (non-blocking).
        if let Ok(Some(id)) = server.try_accept(std::time::Duration::from_millis(1)).await {
            info!(%id, "New client accepted");
        }

        server.step(tick_interval.as_secs_f32()).await?;

        // Wait for next tick.
        next_tick += tick_interval;
        tokio::time::sleep_until(next_tick).await;
    }
}
