//! Fulfillment service entry point.

use std::sync::Arc;

use service::{AppState, Backends, Config, LogFormat};
use tokio::signal;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

fn init_tracing(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match config.log_format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    // 1. Initialize tracing
    init_tracing(&config);

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .expect("failed to install Prometheus recorder");
    service::describe_metrics();

    // 3. Connect stores and channel
    let backends = Backends::from_config(&config)
        .await
        .expect("failed to set up backends");

    // 4. Start the pipeline for this role
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut pipeline = backends
        .spawn_pipeline(&config, shutdown_rx.clone())
        .await
        .expect("failed to start pipeline");
    tracing::info!(role = config.role.as_str(), "pipeline started");

    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    // 5. Serve ops endpoints until shutdown
    let state = Arc::new(AppState {
        orders: Arc::clone(&backends.orders),
        role: config.role,
    });
    let app = service::create_app(state, metrics_handle);

    let addr = config.addr();
    tracing::info!(%addr, "starting ops server");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind address");

    let mut server_shutdown = shutdown_rx;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = server_shutdown.wait_for(|stop| *stop).await;
        })
        .await
        .expect("server error");

    // 6. Drain in-flight fulfillment work
    while let Some(joined) = pipeline.join_next().await {
        if let Err(e) = joined {
            tracing::error!(error = %e, "pipeline task failed");
        }
    }

    tracing::info!("service shut down gracefully");
}
