use creator_desk::telemetry;

#[tokio::main]
async fn main() {
    telemetry::setup_logging();

    let metrics = match telemetry::setup_metrics_recorder() {
        Ok(handle) => Some(handle),
        Err(error) => {
            tracing::warn!(%error, "prometheus recorder not installed");
            None
        },
    };

    let state = match creator_desk::initialize_state(metrics).await {
        Ok(state) => state,
        Err(error) => {
            tracing::error!(%error, "cannot initialize state");
            std::process::exit(1);
        },
    };

    let address = state.config.address.clone();
    let listener = match tokio::net::TcpListener::bind(&address).await {
        Ok(listener) => listener,
        Err(error) => {
            tracing::error!(%address, %error, "cannot bind listener");
            std::process::exit(1);
        },
    };

    tracing::info!(%address, version = state.config.version(), "server started");

    if let Err(error) = axum::serve(listener, creator_desk::app(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        tracing::error!(%error, "server stopped");
    }
}

async fn shutdown_signal() {
    if let Err(error) = tokio::signal::ctrl_c().await {
        tracing::error!(%error, "cannot listen for shutdown signal");
    }
    tracing::info!("shutting down");
}
