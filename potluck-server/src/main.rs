use std::env;
use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use potluck_server::config::Config;
use potluck_server::{app, shutdown_signal, LogNotifier, State};
use potluck_store::SledStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load()?.with_args(env::args())?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .init();

    let store = Arc::new(SledStore::open(&config.data_dir)?);
    info!(data_dir = %config.data_dir.display(), "opened document store");
    let state = State::new(store.clone(), Arc::new(LogNotifier), config.orphan_repair_age());

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    info!(%addr, "listening");
    axum::Server::bind(&addr)
        .serve(app(state).into_make_service())
        .with_graceful_shutdown(shutdown_signal(tokio::signal::ctrl_c()))
        .await?;

    store.flush().await?;
    Ok(())
}
