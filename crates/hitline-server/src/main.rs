use tracing_subscriber::EnvFilter;

use hitline_server::build_app;
use hitline_server::config::ServerConfig;

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("HITLINE_LOG_FORMAT").is_ok_and(|v| v == "json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    tracing::info!("Hitline server starting");

    let config = ServerConfig::load();
    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {e}");
        std::process::exit(1);
    }
    let listen_addr = config.listen_addr.clone();
    let devices = config.devices.simulated.len();

    let (app, state) = build_app(config);

    let listener = match tokio::net::TcpListener::bind(&listen_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {listen_addr}: {e}");
            std::process::exit(1);
        },
    };
    tracing::info!(%listen_addr, devices, "Listening");

    let shutdown_session = state.session.clone();
    let result = axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("Shutdown signal received");
            shutdown_session.shutdown();
        })
        .await;
    if let Err(e) = result {
        tracing::error!("Server error: {e}");
        std::process::exit(1);
    }
}
