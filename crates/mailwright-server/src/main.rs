use std::sync::Arc;

use axum::{Json, Router, extract::State, routing::get};
use mailwright_core::credentials::FileTokenStore;
use mailwright_core::{Config, MailOperations, ToolRegistry, init_telemetry, mail_operations};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

mod api;

#[derive(Clone)]
struct AppState {
    ops: Arc<MailOperations<FileTokenStore>>,
    registry: Arc<ToolRegistry>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load(Config::default_path())?;

    let _guard = init_telemetry(&config.app, &config.telemetry)?;

    let state = AppState {
        ops: Arc::new(mail_operations(&config.gmail)?),
        registry: Arc::new(ToolRegistry::new()?),
    };
    let app = router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(
        "{} listening on {}",
        config.app.service_name,
        listener.local_addr()?
    );

    let shutdown = CancellationToken::new();
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    Ok(())
}

fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .nest("/tools", api::tools::router())
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    tools: usize,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        tools: state.registry.definitions().len(),
    })
}

async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl+c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("received ctrl+c, shutting down");
        }
        _ = terminate => {
            warn!("received terminate signal, shutting down");
        }
        _ = shutdown.cancelled() => {}
    }

    shutdown.cancel();
}
