//! PostgreSQL access: the pooled connection manager and the [`Executor`]
//! seam the query layer talks to.

use crate::{
    config::AppConfig,
    error::{Result as ServiceResult, ServiceError},
    query::BindParam,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use bb8::{ManageConnection, Pool};
use diesel::deserialize::QueryableByName;
use diesel::pg::Pg;
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
use diesel::sql_query;
use diesel::sql_types::{Array, Float8, Int8, Jsonb, Nullable, Text};
use diesel_async::{AsyncPgConnection, RunQueryDsl, SimpleAsyncConnection};
use rustls::{ClientConfig, RootCertStore};
use rustls_pemfile::certs;
use serde_json::Value;
use std::fs::File;
use std::io::BufReader;
use tokio_postgres::{Config as PgConfig, NoTls};
use tokio_postgres_rustls::MakeRustlsConnect;
use tracing::{error, info};

pub type PgPool = Pool<PgConnectionManager>;

/// Runs a parameterized statement and returns one JSON object per row, keyed
/// by column alias. SQL `NULL` arrives as JSON `null`.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn fetch(&self, sql: &str, params: &[BindParam]) -> ServiceResult<Vec<Value>>;
}

pub async fn connect_pool(config: &AppConfig) -> Result<PgPool> {
    let manager =
        PgConnectionManager::new(&config.database_url, config.pg_ssl_root_cert.as_deref())?;
    let pool = Pool::builder()
        .max_size(config.max_pool_size)
        .build(manager)
        .await
        .context("failed to build PostgreSQL connection pool")?;

    // One-time connectivity check so bad credentials show up in the startup logs.
    match pool.get().await {
        Ok(_) => info!("database connectivity check succeeded"),
        Err(err) => error!(error = ?err, "initial database connectivity check failed"),
    }

    Ok(pool)
}

#[derive(Clone)]
pub struct PgExecutor {
    pool: PgPool,
}

impl PgExecutor {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Executor for PgExecutor {
    async fn fetch(&self, sql: &str, params: &[BindParam]) -> ServiceResult<Vec<Value>> {
        // The pooled connection goes back to the pool when `conn` drops, on
        // every path out of this function.
        let mut conn = self.pool.get().await.map_err(|err| {
            error!(error = ?err, "failed to acquire database connection");
            ServiceError::Internal(anyhow::anyhow!("{err:?}"))
        })?;

        let mut query = sql_query(wrap_as_jsonb(sql)).into_boxed::<Pg>();
        for param in params {
            query = param.apply(query);
        }

        let rows: Vec<PayloadRow> = query.load(&mut *conn).await.map_err(|err| {
            error!(error = %err, "chart query failed");
            ServiceError::Query(err.to_string())
        })?;

        Ok(rows
            .into_iter()
            .map(|row| row.payload.unwrap_or(Value::Null))
            .collect())
    }
}

/// Projects every row of `sql` as a single JSONB object so rows decode by
/// alias regardless of the statement's shape.
fn wrap_as_jsonb(sql: &str) -> String {
    format!("SELECT to_jsonb(q) AS payload FROM (\n{sql}\n) AS q")
}

#[derive(QueryableByName)]
struct PayloadRow {
    #[diesel(sql_type = Nullable<Jsonb>)]
    payload: Option<Value>,
}

impl BindParam {
    fn apply<'a>(&self, query: BoxedSqlQuery<'a, Pg, SqlQuery>) -> BoxedSqlQuery<'a, Pg, SqlQuery> {
        match self {
            BindParam::TextArray(values) => query.bind::<Array<Text>, _>(values.clone()),
            BindParam::Int(value) => query.bind::<Int8, _>(*value),
            BindParam::Float(value) => query.bind::<Float8, _>(*value),
        }
    }
}

#[derive(Clone)]
pub struct PgConnectionManager {
    config: PgConfig,
    tls: PgTls,
}

#[derive(Clone)]
enum PgTls {
    None,
    Rustls(MakeRustlsConnect),
}

impl PgConnectionManager {
    fn new(database_url: &str, root_cert: Option<&str>) -> Result<Self> {
        let config = database_url
            .parse::<PgConfig>()
            .context("invalid DATABASE_URL")?;
        let tls = match root_cert {
            Some(path) => PgTls::Rustls(build_tls_connector(path)?),
            None => PgTls::None,
        };
        Ok(Self { config, tls })
    }
}

#[async_trait]
impl ManageConnection for PgConnectionManager {
    type Connection = AsyncPgConnection;
    type Error = anyhow::Error;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        let config = self.config.clone();
        match &self.tls {
            PgTls::None => {
                let (client, connection) = config.connect(NoTls).await?;
                AsyncPgConnection::try_from_client_and_connection(client, connection)
                    .await
                    .map_err(|err| anyhow::anyhow!(err))
            }
            PgTls::Rustls(connector) => {
                let (client, connection) = config.connect(connector.clone()).await?;
                AsyncPgConnection::try_from_client_and_connection(client, connection)
                    .await
                    .map_err(|err| anyhow::anyhow!(err))
            }
        }
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.batch_execute("SELECT 1").await?;
        Ok(())
    }

    fn has_broken(&self, _: &mut Self::Connection) -> bool {
        false
    }
}

/// rustls connector trusting only the certificates in `root_cert`.
pub fn build_tls_connector(root_cert: &str) -> Result<MakeRustlsConnect> {
    let mut reader = BufReader::new(
        File::open(root_cert)
            .with_context(|| format!("failed to open PGSSLROOTCERT file '{root_cert}'"))?,
    );
    let mut root_store = RootCertStore::empty();
    for cert in certs(&mut reader) {
        let cert = cert.context("failed to parse PGSSLROOTCERT")?;
        root_store
            .add(cert)
            .map_err(|_| anyhow::anyhow!("invalid certificate in PGSSLROOTCERT"))?;
    }

    if root_store.is_empty() {
        anyhow::bail!("PGSSLROOTCERT contained no certificates");
    }

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(MakeRustlsConnect::new(config))
}
