use postnotes_core::{FileStore, IpcServer, NoteService, ServerConfig, StaticRegistry};
use std::sync::Arc;

fn log_level() -> tracing::Level {
    std::env::var("POSTNOTES_LOG")
        .ok()
        .and_then(|level| level.parse().ok())
        .unwrap_or(tracing::Level::INFO)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(log_level())
        .init();

    tracing::info!("Starting post notes server");

    let config = ServerConfig::load()?;
    let secret = config.secret()?;

    let store = FileStore::open(&config.store_path)?;
    tracing::info!("Using note store at {:?}", store.path());

    let service = NoteService::new(
        Arc::new(store),
        Arc::new(StaticRegistry::new(config.content_types.clone())),
        secret.as_bytes(),
    );

    // Create and start IPC server
    let ipc_server = IpcServer::new(Arc::new(service));

    tracing::info!("IPC server initialized, starting to listen for connections...");

    // Run the server
    ipc_server.start(&config.listen_addr).await?;

    Ok(())
}
