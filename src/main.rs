//! Pesta AI Server
//!
//! Run with: cargo run --bin pesta-server
//!
//! # Configuration
//!
//! A `.env` file in the working directory is loaded first. Environment
//! variables override the config file:
//! - `AI_API_KEY`: Provider key (without it every AI call returns a fallback)
//! - `PORT`: Port to listen on (default: 3001)
//! - `PESTA_HOST`: Host to bind to (default: 0.0.0.0)
//! - `PESTA_AI_MODEL`: Model name (default: gemini-flash-latest)
//! - `PESTA_LOG_LEVEL`, `PESTA_LOG_FORMAT`: Logging (pretty or json)
//! - `RUST_LOG`: Full filter directive, overrides `PESTA_LOG_LEVEL`

use pesta::api::{serve, AppState};
use pesta::config::{Config, LoggingConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let dotenv = dotenvy::dotenv();

    let config = Config::load_default();
    init_tracing(&config.logging);

    if let Ok(path) = dotenv {
        tracing::info!("Loaded environment from {:?}", path);
    }
    tracing::info!("Starting Pesta AI server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        model = %config.ai.model,
        ai_configured = config.ai.has_api_key(),
        "AI provider"
    );

    let state = AppState::from_config(config);
    serve(state).await?;

    tracing::info!("Pesta AI server stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| logging.filter_directive().into());
    let json = logging.is_json();

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json).then(tracing_subscriber::fmt::layer))
        .init();
}
