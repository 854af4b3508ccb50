//! Chart catalogue: every endpoint resolves to exactly one [`Chart`], and
//! every chart to one [`AggregationSpec`].

use super::{
    predicate::Predicate,
    spec::{AggregationSpec, Column},
    Statement,
};
use crate::{
    error::{Result, ServiceError},
    params::QueryParams,
};
use serde::Serialize;
use std::str::FromStr;

pub const SCATTER_SAMPLE_SIZE: i64 = 2000;
pub const LEADERBOARD_SIZE: i64 = 100;
pub const PRODUCT_PAGE_SIZE: i64 = 100;

/// Chart endpoints. `Products` is only reachable through `/products`, so
/// it has no URL segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Kpi,
    Scatter,
    Distribution,
    Heatmap,
    Brand,
    ProductType,
    Products,
}

impl FromStr for ChartKind {
    type Err = ServiceError;

    fn from_str(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "kpi" => Ok(ChartKind::Kpi),
            "scatter" => Ok(ChartKind::Scatter),
            "distribution" => Ok(ChartKind::Distribution),
            "heatmap" => Ok(ChartKind::Heatmap),
            "brand" => Ok(ChartKind::Brand),
            "product-type" | "product_type" => Ok(ChartKind::ProductType),
            other => Err(ServiceError::InvalidRequest(format!(
                "unknown chart '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScatterAxes {
    /// discount (x) against rating (y), colored by brand.
    DiscountRating,
    /// price (x) against units sold (y), colored by product type.
    PriceQuantity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Brand,
    ProductType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HeatmapMetric {
    Units,
    Rating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitPolicy {
    pub default: i64,
    pub max: i64,
}

impl LimitPolicy {
    /// Positive integers are honoured up to `max`; anything else falls back
    /// to the default.
    pub fn resolve(&self, raw: Option<&str>) -> i64 {
        raw.and_then(|value| value.parse::<i64>().ok())
            .filter(|value| *value > 0)
            .unwrap_or(self.default)
            .min(self.max)
    }
}

impl Default for LimitPolicy {
    fn default() -> Self {
        Self {
            default: 100,
            max: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "chart", rename_all = "snake_case")]
pub enum Chart {
    Kpi,
    Scatter { axes: ScatterAxes },
    Distribution { dimension: Dimension, limit: i64 },
    Heatmap { metric: HeatmapMetric },
    BrandPerformance,
    ProductTypePerformance,
    Products,
}

impl Chart {
    /// Picks the variant for `kind` from the request's discriminators.
    /// Unrecognized discriminator values select the default shape.
    pub fn resolve(kind: ChartKind, params: &QueryParams, limits: &LimitPolicy) -> Self {
        match kind {
            ChartKind::Kpi => Chart::Kpi,
            ChartKind::Scatter => Chart::Scatter {
                axes: match params.get("type") {
                    Some("discount_rating") => ScatterAxes::DiscountRating,
                    _ => ScatterAxes::PriceQuantity,
                },
            },
            ChartKind::Distribution => Chart::Distribution {
                dimension: match params.get("type") {
                    Some("category") => Dimension::ProductType,
                    _ => Dimension::Brand,
                },
                limit: limits.resolve(params.get("limit")),
            },
            ChartKind::Heatmap => Chart::Heatmap {
                metric: match params.get("metric") {
                    Some("rating") => HeatmapMetric::Rating,
                    _ => HeatmapMetric::Units,
                },
            },
            ChartKind::Brand => Chart::BrandPerformance,
            ChartKind::ProductType => Chart::ProductTypePerformance,
            ChartKind::Products => Chart::Products,
        }
    }

    pub fn spec(&self) -> AggregationSpec {
        match *self {
            Chart::Kpi => KPI_ROLLUP,
            Chart::Scatter {
                axes: ScatterAxes::DiscountRating,
            } => SCATTER_DISCOUNT_RATING,
            Chart::Scatter {
                axes: ScatterAxes::PriceQuantity,
            } => SCATTER_PRICE_QUANTITY,
            Chart::Distribution { dimension, limit } => {
                let base = match dimension {
                    Dimension::Brand => DISTRIBUTION_BY_BRAND,
                    Dimension::ProductType => DISTRIBUTION_BY_PRODUCT_TYPE,
                };
                AggregationSpec {
                    limit: Some(limit),
                    ..base
                }
            }
            Chart::Heatmap {
                metric: HeatmapMetric::Units,
            } => HEATMAP_UNITS,
            Chart::Heatmap {
                metric: HeatmapMetric::Rating,
            } => HEATMAP_RATING,
            Chart::BrandPerformance => BRAND_PERFORMANCE,
            Chart::ProductTypePerformance => PRODUCT_TYPE_PERFORMANCE,
            Chart::Products => PRODUCT_LISTING,
        }
    }

    pub fn statement(&self, predicate: Predicate) -> Statement {
        self.spec().render(predicate)
    }
}

const KPI_ROLLUP: AggregationSpec = AggregationSpec {
    name: "kpi",
    columns: &[
        Column::new("COUNT(*)", "total_products"),
        Column::new("COALESCE(SUM(quantity_sold), 0)::BIGINT", "total_units_sold"),
        Column::new(
            "COALESCE(SUM(revenue_proxy), 0)::DOUBLE PRECISION",
            "revenue_proxy",
        ),
        Column::new(
            "COALESCE(SUM(revenue_proxy) / NULLIF(SUM(quantity_sold), 0), 0)::DOUBLE PRECISION",
            "avg_price",
        ),
        Column::new("COALESCE(AVG(rating), 0)::DOUBLE PRECISION", "avg_rating"),
        Column::new(
            "COALESCE(SUM(discount * quantity_sold) / NULLIF(SUM(quantity_sold), 0), 0)::DOUBLE PRECISION",
            "avg_discount",
        ),
    ],
    conditions: &[],
    group_by: &[],
    having: None,
    order_by: &[],
    limit: None,
};

const SCATTER_DISCOUNT_RATING: AggregationSpec = AggregationSpec {
    name: "scatter_discount_rating",
    columns: &[
        Column::new("id::TEXT", "id"),
        Column::new("discount::DOUBLE PRECISION", "x"),
        Column::new("rating::DOUBLE PRECISION", "y"),
        Column::new("brand", "category"),
    ],
    conditions: &["rating IS NOT NULL", "discount IS NOT NULL"],
    group_by: &[],
    having: None,
    order_by: &[],
    limit: Some(SCATTER_SAMPLE_SIZE),
};

const SCATTER_PRICE_QUANTITY: AggregationSpec = AggregationSpec {
    name: "scatter_price_quantity",
    columns: &[
        Column::new("id::TEXT", "id"),
        Column::new("price_effective::DOUBLE PRECISION", "x"),
        Column::new("quantity_sold::DOUBLE PRECISION", "y"),
        Column::new("product_type", "category"),
        Column::new("rating::DOUBLE PRECISION", "secondary"),
    ],
    conditions: &["price_effective IS NOT NULL", "quantity_sold IS NOT NULL"],
    group_by: &[],
    having: None,
    order_by: &[],
    limit: Some(SCATTER_SAMPLE_SIZE),
};

const DISTRIBUTION_BY_BRAND: AggregationSpec = AggregationSpec {
    name: "distribution_brand",
    columns: &[Column::new("brand", "name"), Column::new("COUNT(*)", "count")],
    conditions: &[],
    group_by: &["brand"],
    having: None,
    order_by: &["count DESC", "name ASC"],
    limit: None,
};

const DISTRIBUTION_BY_PRODUCT_TYPE: AggregationSpec = AggregationSpec {
    name: "distribution_product_type",
    columns: &[
        Column::new("product_type", "name"),
        Column::new("COUNT(*)", "count"),
    ],
    conditions: &[],
    group_by: &["product_type"],
    having: None,
    order_by: &["count DESC", "name ASC"],
    limit: None,
};

const HEATMAP_UNITS: AggregationSpec = AggregationSpec {
    name: "heatmap_units",
    columns: &[
        Column::new("brand", "brand"),
        Column::new("product_type", "product_type"),
        Column::new(
            "COALESCE(SUM(quantity_sold), 0)::DOUBLE PRECISION",
            "value",
        ),
    ],
    conditions: &[],
    group_by: &["brand", "product_type"],
    having: Some("COALESCE(SUM(quantity_sold), 0) > 0"),
    order_by: &["brand", "product_type"],
    limit: None,
};

const HEATMAP_RATING: AggregationSpec = AggregationSpec {
    name: "heatmap_rating",
    columns: &[
        Column::new("brand", "brand"),
        Column::new("product_type", "product_type"),
        Column::new("COALESCE(AVG(rating), 0)::DOUBLE PRECISION", "value"),
    ],
    conditions: &[],
    group_by: &["brand", "product_type"],
    having: Some("COALESCE(AVG(rating), 0) > 0"),
    order_by: &["brand", "product_type"],
    limit: None,
};

const BRAND_PERFORMANCE: AggregationSpec = AggregationSpec {
    name: "brand_performance",
    columns: &[
        Column::new("brand", "brand"),
        Column::new("COALESCE(SUM(quantity_sold), 0)::BIGINT", "units_sold"),
        Column::new("COALESCE(SUM(revenue_proxy), 0)::DOUBLE PRECISION", "revenue"),
        Column::new(
            "COALESCE(AVG(price_effective), 0)::DOUBLE PRECISION",
            "avg_price",
        ),
        Column::new("COALESCE(AVG(rating), 0)::DOUBLE PRECISION", "avg_rating"),
        Column::new("COUNT(*)", "count"),
    ],
    conditions: &[],
    group_by: &["brand"],
    having: None,
    order_by: &["revenue DESC"],
    limit: Some(LEADERBOARD_SIZE),
};

const PRODUCT_TYPE_PERFORMANCE: AggregationSpec = AggregationSpec {
    name: "product_type_performance",
    columns: &[
        Column::new("product_type", "product_type"),
        Column::new("COALESCE(SUM(quantity_sold), 0)::BIGINT", "units_sold"),
        Column::new("COALESCE(SUM(revenue_proxy), 0)::DOUBLE PRECISION", "revenue"),
        Column::new(
            "COALESCE(AVG(price_effective), 0)::DOUBLE PRECISION",
            "avg_price",
        ),
        Column::new("COUNT(*)", "count"),
    ],
    conditions: &[],
    group_by: &["product_type"],
    having: None,
    order_by: &["revenue DESC"],
    limit: Some(LEADERBOARD_SIZE),
};

const PRODUCT_LISTING: AggregationSpec = AggregationSpec {
    name: "products",
    columns: &[
        Column::new("id::TEXT", "id"),
        Column::new("title_raw", "title_raw"),
        Column::new("brand", "brand"),
        Column::new("product_type", "product_type"),
        Column::new("price_effective::DOUBLE PRECISION", "price_effective"),
        Column::new("rating::DOUBLE PRECISION", "rating"),
    ],
    conditions: &[],
    group_by: &[],
    having: None,
    order_by: &[],
    limit: Some(PRODUCT_PAGE_SIZE),
};
