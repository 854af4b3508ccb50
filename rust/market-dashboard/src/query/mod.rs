pub mod catalogue;
pub mod predicate;
pub mod spec;

use crate::{
    config::AppConfig,
    db::Executor,
    error::{Result, ServiceError},
    filter::FilterSet,
    models::{self, ChartData},
    params::QueryParams,
};
use catalogue::{Chart, ChartKind, LimitPolicy};
use predicate::Predicate;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum BindParam {
    TextArray(Vec<String>),
    Int(i64),
    Float(f64),
}

/// Statement text with `$1..$n` placeholders and the values for them, in order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<BindParam>,
}

/// Everything resolved from one request before touching the store.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryPlan {
    pub chart: Chart,
    pub filters: FilterSet,
}

impl QueryPlan {
    pub fn statement(&self) -> Statement {
        self.chart.statement(Predicate::from_filters(&self.filters))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TranslateResponse {
    #[serde(flatten)]
    pub chart: Chart,
    pub sql: String,
    pub params: Vec<BindParam>,
}

#[derive(Clone)]
pub struct QueryEngine {
    executor: Arc<dyn Executor>,
    limits: LimitPolicy,
}

impl QueryEngine {
    pub fn new(executor: Arc<dyn Executor>, config: &AppConfig) -> Self {
        Self {
            executor,
            limits: LimitPolicy {
                default: config.default_limit,
                max: config.max_limit,
            },
        }
    }

    pub fn plan(&self, kind: ChartKind, params: &QueryParams) -> QueryPlan {
        QueryPlan {
            chart: Chart::resolve(kind, params, &self.limits),
            filters: FilterSet::from_params(params),
        }
    }

    pub async fn execute(&self, plan: &QueryPlan) -> Result<ChartData> {
        let statement = plan.statement();
        check_binds(&statement)?;
        debug!(
            chart = plan.chart.spec().name,
            params = statement.params.len(),
            "executing chart query"
        );

        let rows = self
            .executor
            .fetch(&statement.sql, &statement.params)
            .await?;
        let fetched = rows.len();
        let data = models::map_rows(&plan.chart, rows)?;

        debug!(
            chart = plan.chart.spec().name,
            fetched,
            returned = data.len(),
            "chart query complete"
        );
        Ok(data)
    }

    pub fn translate(&self, plan: &QueryPlan) -> TranslateResponse {
        let Statement { sql, params } = plan.statement();
        TranslateResponse {
            chart: plan.chart,
            sql,
            params,
        }
    }
}

/// Rejects statements whose placeholders and bound values disagree before
/// they reach the store.
pub(crate) fn check_binds(statement: &Statement) -> Result<()> {
    let expected = max_dollar_placeholder(&statement.sql);
    let current = statement.params.len();
    if expected != current {
        return Err(ServiceError::Internal(anyhow::anyhow!(
            "sql expects {expected} binds but {current} were collected"
        )));
    }
    Ok(())
}

/// Highest `$n` placeholder index that appears in `sql`.
pub(crate) fn max_dollar_placeholder(sql: &str) -> usize {
    let bytes = sql.as_bytes();
    let mut max = 0usize;
    let mut i = 0usize;

    while i < bytes.len() {
        if bytes[i] != b'$' {
            i += 1;
            continue;
        }

        i += 1;
        if i >= bytes.len() || !bytes[i].is_ascii_digit() {
            continue;
        }

        let mut value = 0usize;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            value = value * 10 + (bytes[i] - b'0') as usize;
            i += 1;
        }

        max = max.max(value);
    }

    max
}
