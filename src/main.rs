use psylab::app::counter_store;
use psylab::psylab_config::AppConfig;
use psylab::{App, AppResult};
use std::net::SocketAddr;
use tracing::info;

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() -> AppResult<()> {
    let config = AppConfig::from_env()?;
    let _log_guard = psylab::app::log_config(&config).init();

    let store = counter_store(&config).await?;
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let server = App::new(config, store)?.server()?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(psylab::Error::from)?;
    server.serve_with_shutdown(listener, shutdown_signal()).await?;
    info!("Server stopped");
    Ok(())
}
