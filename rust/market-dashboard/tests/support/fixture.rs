//! Seeded PostgreSQL fixture for running chart queries end to end.

use super::harness::{init_test_tracing, API_KEY};
use anyhow::Context;
use axum::{body::Body, http::Request, response::Response, Router};
use market_dashboard::{config::AppConfig, db::build_tls_connector, server::Server};
use std::{env, fs, future::Future};
use tokio::{
    task::JoinHandle,
    time::{sleep, Duration},
};
use tokio_postgres::{Client, Config as PgConfig, NoTls};
use tower::ServiceExt;

const DATABASE_URL_ENV: &str = "DASHBOARD_TEST_DATABASE_URL";
const DB_CONNECT_RETRIES: usize = 40;
const DB_CONNECT_DELAY_MS: u64 = 250;
const FIXTURE_LOCK_ID: i64 = 7_310_215;
const FIXTURE_SQL: &str = include_str!("../fixtures/analytics_master.sql");

/// Runs `test` against a server backed by a freshly seeded `analytics_master`.
/// Skips when `DASHBOARD_TEST_DATABASE_URL` is not set.
pub async fn with_fixture_harness<F, Fut>(test: F)
where
    F: FnOnce(FixtureHarness) -> Fut,
    Fut: Future<Output = ()>,
{
    init_test_tracing();

    let database_url = match read_env_value(DATABASE_URL_ENV)
        .expect("failed to read fixture database config")
    {
        Some(url) => url,
        None => {
            eprintln!("[dashboard-test] skipping fixture harness: {DATABASE_URL_ENV} is not set");
            return;
        }
    };

    let guard = FixtureGuard::acquire(&database_url)
        .await
        .expect("failed to acquire fixture lock");
    guard
        .seed()
        .await
        .expect("failed to seed analytics_master fixture");

    let mut config = AppConfig::embedded(database_url);
    config.max_pool_size = 5;
    config.api_key = Some(API_KEY.to_string());
    config.pg_ssl_root_cert = env::var("PGSSLROOTCERT").ok();
    let server = Server::new(config)
        .await
        .expect("failed to boot dashboard server against fixture database");

    test(FixtureHarness {
        router: server.router(),
    })
    .await;

    drop(server);
    drop(guard);
}

pub struct FixtureHarness {
    router: Router,
}

impl FixtureHarness {
    pub async fn get(&self, uri: &str) -> Response {
        let request = Request::builder()
            .method("GET")
            .uri(uri)
            .header("x-api-key", API_KEY)
            .body(Body::empty())
            .expect("request should build");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond")
    }
}

/// Holds the advisory lock that serializes fixture tests sharing one database.
struct FixtureGuard {
    client: Client,
    _connection_task: JoinHandle<()>,
}

impl FixtureGuard {
    async fn acquire(database_url: &str) -> anyhow::Result<Self> {
        let config: PgConfig = database_url
            .parse()
            .with_context(|| format!("{DATABASE_URL_ENV} is invalid"))?;

        let mut attempts = 0usize;
        let (client, task) = loop {
            match connect_with_env_tls(config.clone()).await {
                Ok(connected) => break connected,
                Err(err) => {
                    attempts += 1;
                    if attempts >= DB_CONNECT_RETRIES {
                        return Err(err);
                    }
                    sleep(Duration::from_millis(DB_CONNECT_DELAY_MS)).await;
                }
            }
        };

        client
            .execute("SELECT pg_advisory_lock($1)", &[&FIXTURE_LOCK_ID])
            .await?;
        Ok(Self {
            client,
            _connection_task: task,
        })
    }

    async fn seed(&self) -> anyhow::Result<()> {
        self.client
            .batch_execute(FIXTURE_SQL)
            .await
            .context("fixture SQL failed")
    }
}

async fn connect_with_env_tls(config: PgConfig) -> anyhow::Result<(Client, JoinHandle<()>)> {
    match env::var("PGSSLROOTCERT") {
        Ok(path) if !path.trim().is_empty() => {
            let connector = build_tls_connector(&path)?;
            let (client, connection) = config.connect(connector).await?;
            Ok((client, spawn_connection(connection)))
        }
        _ => {
            let (client, connection) = config.connect(NoTls).await?;
            Ok((client, spawn_connection(connection)))
        }
    }
}

fn spawn_connection<C>(connection: C) -> JoinHandle<()>
where
    C: Future<Output = Result<(), tokio_postgres::Error>> + Send + 'static,
{
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            eprintln!("[dashboard-test] fixture connection error: {err}");
        }
    })
}

fn read_env_value(key: &str) -> anyhow::Result<Option<String>> {
    if let Ok(value) = env::var(key) {
        if value.trim().is_empty() {
            anyhow::bail!("{key} is set but empty");
        }
        return Ok(Some(value));
    }

    let file_key = format!("{key}_FILE");
    if let Ok(path) = env::var(&file_key) {
        let value = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {file_key} ({path})"))?
            .trim()
            .to_string();
        if value.is_empty() {
            anyhow::bail!("{file_key} pointed at an empty file");
        }
        return Ok(Some(value));
    }

    Ok(None)
}
