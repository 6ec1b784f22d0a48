use std::{net::SocketAddr, sync::Arc};

use clap::Parser;
use jrpc_server::{
    build_app,
    config::{Cli, Config},
    jsonrpc::Dispatcher,
    logging::{self, TracingSink},
    procedures::{self, auth::StubAuthenticator},
    AppState, RPC_PATH,
};
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init_logging();

    let config = Config::from_env()?.apply_cli(Cli::parse())?;
    let registry = procedures::registry(Arc::new(StubAuthenticator::new()))?;
    let dispatcher = Dispatcher::new(registry)
        .with_sink(Arc::new(TracingSink))
        .with_notification_policy(config.notifications);

    let bind_socket = config.bind_socket()?;
    let app = build_app(AppState::new(dispatcher));
    let listener = tokio::net::TcpListener::bind(bind_socket).await?;

    info!(
        bind_addr = %config.bind_addr,
        bind_port = config.bind_port,
        path = RPC_PATH,
        notifications = ?config.notifications,
        "server starting, Ctrl-C to interrupt"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received, stopping server");
}
