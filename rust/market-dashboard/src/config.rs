use anyhow::{Context, Result};
use serde::Deserialize;
use std::{
    net::{SocketAddr, ToSocketAddrs},
    time::Duration,
};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen_addr: SocketAddr,
    pub database_url: String,
    pub max_pool_size: u32,
    pub pg_ssl_root_cert: Option<String>,
    pub api_key: Option<String>,
    pub allowed_origins: Option<Vec<String>>,
    pub default_limit: i64,
    pub max_limit: i64,
    pub request_timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    dashboard_listen_addr: Option<String>,
    #[serde(default)]
    dashboard_listen_host: Option<String>,
    #[serde(default)]
    port: Option<u16>,
    #[serde(default)]
    dashboard_database_url: Option<String>,
    #[serde(default)]
    database_url: Option<String>,
    #[serde(default = "default_pool_size")]
    dashboard_max_pool_size: u32,
    #[serde(default)]
    pgsslrootcert: Option<String>,
    #[serde(default)]
    dashboard_api_key: Option<String>,
    #[serde(default)]
    api_key: Option<String>,
    #[serde(default)]
    dashboard_allowed_origins: Option<String>,
    #[serde(default = "default_limit")]
    dashboard_default_limit: i64,
    #[serde(default = "default_max_limit")]
    dashboard_max_limit: i64,
    #[serde(default = "default_timeout_secs")]
    dashboard_request_timeout_secs: u64,
}

const fn default_pool_size() -> u32 {
    10
}

const fn default_limit() -> i64 {
    100
}

const fn default_max_limit() -> i64 {
    1000
}

const fn default_timeout_secs() -> u64 {
    30
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        let raw: RawConfig = envy::from_env().context("failed to parse environment variables")?;
        Self::from_raw(raw)
    }

    /// Defaults for tests and tooling that never open a listener.
    pub fn embedded(database_url: String) -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            database_url,
            max_pool_size: 1,
            pg_ssl_root_cert: None,
            api_key: None,
            allowed_origins: None,
            default_limit: default_limit(),
            max_limit: default_max_limit(),
            request_timeout: Duration::from_secs(default_timeout_secs()),
        }
    }

    fn from_raw(raw: RawConfig) -> Result<Self> {
        let listen_addr = resolve_addr(
            raw.dashboard_listen_addr,
            raw.dashboard_listen_host,
            raw.port,
        )?;

        let database_url = raw
            .dashboard_database_url
            .or(raw.database_url)
            .filter(|url| !url.trim().is_empty())
            .context("DASHBOARD_DATABASE_URL or DATABASE_URL must be set")?;

        // An empty key disables the check, same as leaving it unset.
        let api_key = raw
            .dashboard_api_key
            .or(raw.api_key)
            .filter(|key| !key.is_empty());

        let allowed_origins = raw.dashboard_allowed_origins.and_then(|csv| {
            let trimmed: Vec<_> = csv
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed)
            }
        });

        let default_limit = raw.dashboard_default_limit.max(1);

        Ok(Self {
            listen_addr,
            database_url,
            max_pool_size: raw.dashboard_max_pool_size.max(1),
            pg_ssl_root_cert: raw.pgsslrootcert.filter(|path| !path.is_empty()),
            api_key,
            allowed_origins,
            default_limit,
            max_limit: raw.dashboard_max_limit.max(default_limit),
            request_timeout: Duration::from_secs(raw.dashboard_request_timeout_secs.max(1)),
        })
    }
}

fn resolve_addr(
    addr: Option<String>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<SocketAddr> {
    if let Some(addr) = addr {
        return addr
            .to_socket_addrs()
            .context("invalid DASHBOARD_LISTEN_ADDR value")?
            .next()
            .context("DASHBOARD_LISTEN_ADDR resolved to no addresses");
    }

    let host = host.unwrap_or_else(|| "0.0.0.0".to_string());
    let port = port.unwrap_or(8080);
    format!("{host}:{port}")
        .to_socket_addrs()
        .context("invalid listen host/port combination")?
        .next()
        .context("listen address resolved to no targets")
}
