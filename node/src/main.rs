use anyhow::Context;
use axum::serve;
use pawmatch_node::store::{DocumentStore, MemoryStore};
use pawmatch_node::{init_tracing, router, AppConfig, AppState};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::from_env()?;
    let store: Arc<dyn DocumentStore> = match &config.data_dir {
        Some(dir) => Arc::new(
            MemoryStore::open(dir)
                .with_context(|| format!("failed to open document store at {}", dir.display()))?,
        ),
        None => Arc::new(MemoryStore::new()),
    };
    let state = AppState::new(config.clone(), store);

    let app = router(Arc::clone(&state));

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!(
        %local_addr,
        build_id = %config.build_id,
        persistent = config.data_dir.is_some(),
        "starting PawMatch node service"
    );

    serve(listener, app).await?;
    Ok(())
}
