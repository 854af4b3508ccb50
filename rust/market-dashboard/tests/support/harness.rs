use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Request, StatusCode},
    response::Response,
    Router,
};
use market_dashboard::{
    config::AppConfig,
    db::Executor,
    error::{Result, ServiceError},
    query::BindParam,
    server::Server,
};
use serde_json::Value;
use std::{
    sync::{Arc, Mutex, Once},
    time::Duration,
};
use tower::ServiceExt;

pub const API_KEY: &str = "test-api-key";

static TRACING_INIT: Once = Once::new();

pub fn init_test_tracing() {
    TRACING_INIT.call_once(|| {
        let _ = tracing_subscriber::fmt::try_init();
    });
}

/// One statement as the executor saw it.
#[derive(Debug, Clone)]
pub struct RecordedQuery {
    pub sql: String,
    pub params: Vec<BindParam>,
}

/// Executor stand-in: records statements, replies with canned rows.
#[derive(Default)]
pub struct StubExecutor {
    rows: Vec<Value>,
    failure: Option<String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<RecordedQuery>>,
}

impl StubExecutor {
    pub fn with_rows(rows: Vec<Value>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }

    /// Replies only after `delay`, to outlast the request timeout.
    pub fn stalled(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<RecordedQuery> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl Executor for StubExecutor {
    async fn fetch(&self, sql: &str, params: &[BindParam]) -> Result<Vec<Value>> {
        self.calls.lock().expect("calls lock").push(RecordedQuery {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure {
            Some(message) => Err(ServiceError::Query(message.clone())),
            None => Ok(self.rows.clone()),
        }
    }
}

pub struct DashboardHarness {
    router: Router,
    executor: Arc<StubExecutor>,
}

impl DashboardHarness {
    pub fn new(executor: StubExecutor) -> Self {
        Self::with_api_key(executor, Some(API_KEY))
    }

    pub fn with_api_key(executor: StubExecutor, api_key: Option<&str>) -> Self {
        let mut config = AppConfig::embedded("postgres://unused/db".to_string());
        config.api_key = api_key.map(str::to_string);
        Self::with_config(executor, config)
    }

    pub fn with_request_timeout(executor: StubExecutor, timeout: Duration) -> Self {
        let mut config = AppConfig::embedded("postgres://unused/db".to_string());
        config.api_key = Some(API_KEY.to_string());
        config.request_timeout = timeout;
        Self::with_config(executor, config)
    }

    fn with_config(executor: StubExecutor, config: AppConfig) -> Self {
        init_test_tracing();

        let executor = Arc::new(executor);
        let server = Server::with_executor(config, Arc::clone(&executor) as Arc<dyn Executor>);

        Self {
            router: server.router(),
            executor,
        }
    }

    pub async fn get(&self, uri: &str) -> Response {
        self.send(uri, Some(API_KEY)).await
    }

    pub async fn get_without_api_key(&self, uri: &str) -> Response {
        self.send(uri, None).await
    }

    pub fn calls(&self) -> Vec<RecordedQuery> {
        self.executor.calls()
    }

    pub fn single_call(&self) -> RecordedQuery {
        let calls = self.calls();
        assert_eq!(calls.len(), 1, "expected exactly one query, got {calls:?}");
        calls.into_iter().next().expect("one call")
    }

    async fn send(&self, uri: &str, api_key: Option<&str>) -> Response {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(key) = api_key {
            builder = builder.header("x-api-key", key);
        }
        let request = builder.body(Body::empty()).expect("request should build");

        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router should respond")
    }
}

pub async fn read_json(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, body)
}

pub async fn read_text(response: Response) -> (StatusCode, String) {
    let status = response.status();
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("body should be readable");
    (status, String::from_utf8_lossy(&bytes).into_owned())
}
