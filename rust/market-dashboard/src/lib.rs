pub mod config;
pub mod db;
pub mod error;
pub mod filter;
pub mod models;
pub mod params;
pub mod query;
pub mod server;
pub mod state;
pub mod telemetry;

use crate::{config::AppConfig, server::Server};

/// Bootstraps the dashboard API using environment configuration.
pub async fn run() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    Server::new(config).await?.run().await
}
