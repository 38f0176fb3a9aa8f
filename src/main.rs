//! # Torneo — Community Tournament Control Plane
//!
//! One process, three entry points: the Discord polling loop (commands and
//! free-text triggers), the notification scheduler, and the HTTP gateway.
//! Every mutation funnels through the command bridge's single lock.
//!
//! Usage:
//!   torneo                          # Run with ~/.torneo/config.toml
//!   torneo --config ./torneo.toml   # Explicit config file
//!   torneo --db :memory:            # Ephemeral state (testing)

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tracing_subscriber::EnvFilter;

use torneo_bridge::Bridge;
use torneo_channels::DiscordChannel;
use torneo_core::TorneoConfig;
use torneo_db::TournamentDb;
use torneo_scheduler::{NotificationScheduler, spawn_scheduler};
use torneo_state::TournamentState;

#[derive(Parser)]
#[command(name = "torneo", version, about = "🏆 Torneo — community tournament control plane")]
struct Cli {
    /// Config file path (default: ~/.torneo/config.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Database path, overriding the configured one
    #[arg(long)]
    db: Option<String>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        "torneo=debug,tower_http=debug"
    } else {
        "torneo=info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .init();

    let config = match &cli.config {
        Some(path) => TorneoConfig::load_from(std::path::Path::new(path))?,
        None => TorneoConfig::load()?,
    };

    let db_path = shellexpand::tilde(
        cli.db.as_deref().unwrap_or(&config.storage.db_path),
    )
    .to_string();
    if db_path != ":memory:" {
        if let Some(parent) = std::path::Path::new(&db_path).parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let db = Arc::new(if db_path == ":memory:" {
        TournamentDb::open_in_memory()?
    } else {
        TournamentDb::open(std::path::Path::new(&db_path))?
    });
    let state = TournamentState::new(db, &config.tournament)?;
    tracing::info!(
        stage = state.current_stage(),
        "🏆 Torneo v{} — database {db_path}",
        env!("CARGO_PKG_VERSION")
    );
    let shared = Arc::new(Mutex::new(state));

    let discord = Arc::new(DiscordChannel::new(config.discord.clone()));
    let bridge = Bridge::new(shared.clone(), discord.clone(), config.clone());

    // Scheduler shares the bridge's lock, so a tick never interleaves with
    // a command touching the same notification row.
    let (stop_tx, stop_rx) = watch::channel(false);
    let scheduler = Arc::new(NotificationScheduler::new(
        shared,
        discord.clone(),
        &config.guild_id,
    ));
    let scheduler_task = tokio::spawn(spawn_scheduler(
        scheduler,
        config.scheduler.tick_secs,
        stop_rx,
    ));

    let gateway_task = tokio::spawn(torneo_gateway::start(
        bridge.clone(),
        config.gateway.clone(),
    ));

    let mut messages = torneo_channels::start_polling(discord, &config.operator_id).await?;

    loop {
        tokio::select! {
            msg = messages.recv() => match msg {
                Some(msg) => bridge.handle_message(msg).await,
                None => {
                    tracing::warn!("message stream closed");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                break;
            }
        }
    }

    let _ = stop_tx.send(true);
    let _ = scheduler_task.await;
    gateway_task.abort();
    Ok(())
}
