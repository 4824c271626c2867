use std::{net::SocketAddr, sync::Arc};

use clap::Parser;
use ledger_core::{CancelFlag, Ledger};
use ledger_node::{
    api::{self, AppState},
    config::Args,
    miner::Miner,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let ledger = Arc::new(Ledger::new(args.ledger_config()));
    let miner = Arc::new(Miner::new(
        args.miner_name.clone(),
        args.miner_keys()?,
        args.mine_interval(),
    ));

    let cancel = CancelFlag::new();
    let mining = tokio::spawn(miner.clone().run(ledger.clone(), cancel.clone()));

    let app = api::router(AppState {
        ledger: ledger.clone(),
        miners: vec![miner],
    });

    let addr: SocketAddr = args.listen.parse()?;
    info!(
        difficulty = args.difficulty,
        reward = args.mining_reward,
        "ledger-node listening on http://{addr}"
    );
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel))
        .await?;

    mining.await?;
    info!(
        length = ledger.len(),
        pending = ledger.pending_count(),
        "ledger-node stopped"
    );
    Ok(())
}

async fn shutdown_signal(cancel: CancelFlag) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for ctrl-c");
    }
    info!("shutdown requested");
    cancel.cancel();
}
