//! Witness HTTP Server

use axum::{
    Router,
    routing::{get, post},
};
use kel_witness::{MemoryStore, RedisStore, Witness, WitnessIdentity, WitnessStore};
use std::net::SocketAddr;
use std::sync::Arc;

use crate::config::ServiceConfig;
use crate::handlers::{self, AppState};

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/process", post(handlers::process_event))
        .route("/query", post(handlers::query))
        .route("/introduce", get(handlers::introduce))
        .route("/oobi/:id", get(handlers::resolve_oobi))
        .route(
            "/oobi/:id/witness/:witness",
            get(handlers::resolve_witness_oobi),
        )
        .route("/escrow/sweep", post(handlers::sweep_escrow))
        .with_state(state)
}

async fn connect_store(
    config: &ServiceConfig,
) -> Result<Arc<dyn WitnessStore>, Box<dyn std::error::Error>> {
    let store: Arc<dyn WitnessStore> = match &config.redis_url {
        Some(url) => {
            tracing::info!("Connecting to Redis at {}", url);
            let store = RedisStore::connect(url, &config.redis_namespace)
                .await
                .map_err(|e| format!("Failed to connect to Redis: {}", e))?;
            tracing::info!("Connected to Redis");
            Arc::new(store)
        }
        None => {
            tracing::warn!("REDIS_URL not set, witness state is held in memory only");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(store)
}

pub async fn run(config: ServiceConfig) -> Result<(), Box<dyn std::error::Error>> {
    let store = connect_store(&config).await?;
    let identity = WitnessIdentity::new(Arc::new(config.key_provider()?));
    tracing::info!(aid = %identity.aid(), "Witness identity loaded");

    let witness = Arc::new(Witness::with_store(config.witness.clone(), identity, store));
    tokio::spawn(escrow_sweeper(witness.clone()));

    let app = create_router(Arc::new(AppState { witness }));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Witness service listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Sweeps escrow on the configured interval for the life of the process.
async fn escrow_sweeper(witness: Arc<Witness>) {
    let mut interval = tokio::time::interval(witness.config().sweep_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    // The first tick completes immediately
    interval.tick().await;

    loop {
        interval.tick().await;
        if let Err(e) = witness.sweep().await {
            tracing::error!("Escrow sweep failed: {}", e);
        }
    }
}

pub async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl+C signal"),
            Err(e) => tracing::error!("Failed to listen for Ctrl+C: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                tracing::info!("Received SIGTERM signal");
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Starting graceful shutdown...");
}
