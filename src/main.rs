mod config;
mod db;
mod errors;
mod logging;
mod models;
mod routes;
mod schema;
mod security;
mod state;
mod templates;
mod validator;

#[cfg(test)]
mod testing;

use std::net::SocketAddr;

use anyhow::Context;
use axum::serve;
use tokio::net::TcpListener;

use config::Config;
use db::establish_pool;
use routes::create_router;
use state::AppState;
use templates::TemplateCache;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    logging::init_tracing();

    let pool = establish_pool(&config.dsn)
        .await
        .context("failed to connect to the database")?;

    let templates =
        TemplateCache::load(&config.html_dir()).context("failed to build the template cache")?;

    let state = AppState::with_pool(pool, templates, config.static_dir(), config.secure_cookies);

    let app = create_router(state).into_make_service_with_connect_info::<SocketAddr>();

    let listener = TcpListener::bind(config.addr())
        .await
        .with_context(|| format!("failed to bind {}:{}", config.host, config.port))?;

    tracing::info!(addr = %listener.local_addr()?, "Starting server");

    serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
