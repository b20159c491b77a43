mod commands;
mod config;
mod connection;
mod db;
mod error;
mod handler;
mod rdb;
mod replication;
mod resp;
mod types;

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use config::Config;
use db::Db;
use handler::handle_client;
use types::ServerState;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    let config = Config::parse();

    if let Err(e) = run(config).await {
        error!("{:#}", e);
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let mut state = ServerState::new();

    // The role is settled before any client can observe it.
    if let Some(master) = &config.replicaof {
        let link = replication::connect_to_master(master, config.port, &mut state).await?;
        tokio::spawn(async move {
            if let Err(e) = link.run().await {
                warn!("replication link to master failed: {}", e);
            }
        });
    }

    let state = Arc::new(state);
    let db = Db::new();

    let listener_address = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&listener_address)
        .await
        .with_context(|| format!("failed to bind {}", listener_address))?;
    info!(role = %state.role, "Listening on {}", listener_address);

    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Connection error: {}", e);
                continue;
            }
        };

        let db = db.clone();
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            debug!(%peer, "client connected");
            match handle_client(stream, db, state).await {
                Ok(()) => debug!(%peer, "client disconnected"),
                Err(e) => warn!(%peer, "connection closed: {}", e),
            }
        });
    }
}
