//! kisanvani-server: the headless advisory daemon.
//!
//! Exit codes: 0 clean shutdown, 1 fatal startup error (missing credentials,
//! unreadable directories), 2 misconfiguration.

mod config;
mod runtime;

use config::Config;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    // Opportunistic .env for development setups; the environment wins.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!(error = %e, "configuration invalid");
            return ExitCode::from(2);
        }
    };

    match runtime::run(config).await {
        Ok(()) => {
            tracing::info!("clean shutdown");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "fatal startup error");
            ExitCode::from(1)
        }
    }
}
