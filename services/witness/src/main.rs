//! Witness - HTTP witness node for key event logs

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use witness_service::ServiceConfig;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "witness=debug,kel_witness=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!("Starting witness service");

    let config = ServiceConfig::from_env()?;
    witness_service::run(config).await?;

    Ok(())
}
