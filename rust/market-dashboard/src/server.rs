use crate::{
    config::AppConfig,
    db::{self, Executor, PgExecutor},
    error::{Result, ServiceError},
    models::ChartData,
    params::QueryParams,
    query::{catalogue::ChartKind, QueryEngine, TranslateResponse},
    state::AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    routing::get,
    Json, Router,
};
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::{info, warn};

const API_KEY_HEADER: &str = "x-api-key";

type RawQuery = Query<Vec<(String, String)>>;

pub struct Server {
    config: Arc<AppConfig>,
    state: AppState,
}

impl Server {
    pub async fn new(config: AppConfig) -> anyhow::Result<Self> {
        let pool = db::connect_pool(&config).await?;
        Ok(Self::with_executor(config, Arc::new(PgExecutor::new(pool))))
    }

    /// Builds the server around any executor, e.g. a stub in tests.
    pub fn with_executor(config: AppConfig, executor: Arc<dyn Executor>) -> Self {
        let config = Arc::new(config);
        let query = QueryEngine::new(executor, &config);
        let state = AppState::new(Arc::clone(&config), query);
        Self { config, state }
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/", get(Self::root))
            .route("/health", get(Self::health))
            .route("/healthz", get(Self::healthz))
            .route("/products", get(Self::products))
            .route("/dashboard/:chart", get(Self::chart))
            .route("/translate/:chart", get(Self::translate))
            .with_state(self.state.clone())
            .layer(TimeoutLayer::with_status_code(
                StatusCode::REQUEST_TIMEOUT,
                self.config.request_timeout,
            ))
            .layer(cors_layer(&self.config))
            .layer(TraceLayer::new_for_http())
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let addr = self.config.listen_addr;
        let listener = TcpListener::bind(addr).await?;
        if self.config.api_key.is_none() {
            warn!("API key not configured; dashboard endpoints are unauthenticated");
        }
        info!(%addr, "market dashboard listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    async fn root() -> &'static str {
        "Market Intelligence API is running"
    }

    async fn health() -> &'static str {
        "OK"
    }

    async fn healthz() -> Json<serde_json::Value> {
        Json(json!({ "status": "ok" }))
    }

    async fn products(
        State(state): State<AppState>,
        headers: HeaderMap,
        Query(pairs): RawQuery,
    ) -> Result<Json<ChartData>> {
        enforce_api_key(&headers, &state.config)?;
        run_chart(&state, ChartKind::Products, pairs).await
    }

    async fn chart(
        State(state): State<AppState>,
        Path(chart): Path<String>,
        headers: HeaderMap,
        Query(pairs): RawQuery,
    ) -> Result<Json<ChartData>> {
        enforce_api_key(&headers, &state.config)?;
        let kind = chart.parse::<ChartKind>()?;
        run_chart(&state, kind, pairs).await
    }

    async fn translate(
        State(state): State<AppState>,
        Path(chart): Path<String>,
        headers: HeaderMap,
        Query(pairs): RawQuery,
    ) -> Result<Json<TranslateResponse>> {
        enforce_api_key(&headers, &state.config)?;
        let kind = chart.parse::<ChartKind>()?;
        let plan = state.query.plan(kind, &QueryParams::new(pairs));
        Ok(Json(state.query.translate(&plan)))
    }
}

async fn run_chart(
    state: &AppState,
    kind: ChartKind,
    pairs: Vec<(String, String)>,
) -> Result<Json<ChartData>> {
    let plan = state.query.plan(kind, &QueryParams::new(pairs));
    let data = state.query.execute(&plan).await?;
    Ok(Json(data))
}

fn enforce_api_key(headers: &HeaderMap, config: &AppConfig) -> Result<()> {
    if let Some(expected) = &config.api_key {
        let provided = headers
            .get(API_KEY_HEADER)
            .and_then(|value| value.to_str().ok());

        if provided != Some(expected.as_str()) {
            return Err(ServiceError::Auth);
        }
    }

    Ok(())
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let origin = match &config.allowed_origins {
        Some(origins) => AllowOrigin::list(
            origins
                .iter()
                .filter_map(|origin| origin.parse::<HeaderValue>().ok())
                .collect::<Vec<_>>(),
        ),
        None => AllowOrigin::from(Any),
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(API_KEY_HEADER)])
}
