//! Response records and the row-to-record mapping for each chart.

use crate::{
    error::{Result, ServiceError},
    query::catalogue::{Chart, ScatterAxes},
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use std::collections::HashMap;
use tracing::warn;

/// Scatter colors, handed out in first-seen order of each category.
pub const PALETTE: [&str; 5] = ["#3B82F6", "#10B981", "#F59E0B", "#8B5CF6", "#EC4899"];

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct KpiSummary {
    pub total_products: i64,
    pub total_units_sold: i64,
    pub revenue_proxy: f64,
    /// Revenue-weighted: `sum(revenue) / sum(units)`.
    pub avg_price: f64,
    pub avg_rating: f64,
    /// Unit-weighted fraction in `[0, 1]`.
    pub avg_discount: f64,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScatterPoint {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub fill: String,
    pub name: String,
    pub secondary: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NamedCount {
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct HeatmapCell {
    pub brand: String,
    pub product_type: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BrandPerformance {
    pub brand: String,
    pub units_sold: i64,
    pub revenue: f64,
    pub avg_price: f64,
    pub avg_rating: f64,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ProductTypePerformance {
    pub product_type: String,
    pub units_sold: i64,
    pub revenue: f64,
    pub avg_price: f64,
    pub count: i64,
}

#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Product {
    pub id: String,
    pub title_raw: String,
    pub brand: String,
    pub product_type: String,
    pub price_effective: f64,
    #[serde(default)]
    pub rating: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct ScatterRow {
    id: String,
    x: f64,
    y: f64,
    category: String,
    #[serde(default)]
    secondary: Option<f64>,
}

/// Shaped response for one chart request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ChartData {
    Kpi(KpiSummary),
    Scatter(Vec<ScatterPoint>),
    Distribution(Vec<NamedCount>),
    Heatmap(Vec<HeatmapCell>),
    BrandPerformance(Vec<BrandPerformance>),
    ProductTypePerformance(Vec<ProductTypePerformance>),
    Products(Vec<Product>),
}

impl ChartData {
    pub fn len(&self) -> usize {
        match self {
            ChartData::Kpi(_) => 1,
            ChartData::Scatter(rows) => rows.len(),
            ChartData::Distribution(rows) => rows.len(),
            ChartData::Heatmap(rows) => rows.len(),
            ChartData::BrandPerformance(rows) => rows.len(),
            ChartData::ProductTypePerformance(rows) => rows.len(),
            ChartData::Products(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Assigns palette colors per category for a single response.
#[derive(Debug, Default)]
pub struct PaletteAssigner {
    slots: HashMap<String, usize>,
}

impl PaletteAssigner {
    pub fn color_for(&mut self, category: &str) -> &'static str {
        let next = self.slots.len() % PALETTE.len();
        let slot = *self.slots.entry(category.to_string()).or_insert(next);
        PALETTE[slot]
    }
}

/// Maps executor rows into the record shape for `chart`.
///
/// Multi-row charts skip rows that fail to decode; the KPI rollup and the
/// product listing fail the request instead.
pub fn map_rows(chart: &Chart, rows: Vec<Value>) -> Result<ChartData> {
    let entity = chart.spec().name;
    let data = match chart {
        Chart::Kpi => ChartData::Kpi(decode_single(entity, rows)?),
        Chart::Scatter { axes } => ChartData::Scatter(map_scatter(*axes, rows)),
        Chart::Distribution { .. } => ChartData::Distribution(decode_lenient(entity, rows)),
        Chart::Heatmap { .. } => ChartData::Heatmap(decode_lenient(entity, rows)),
        Chart::BrandPerformance => ChartData::BrandPerformance(decode_lenient(entity, rows)),
        Chart::ProductTypePerformance => {
            ChartData::ProductTypePerformance(decode_lenient(entity, rows))
        }
        Chart::Products => ChartData::Products(decode_strict(entity, rows)?),
    };
    Ok(data)
}

fn map_scatter(axes: ScatterAxes, rows: Vec<Value>) -> Vec<ScatterPoint> {
    let mut palette = PaletteAssigner::default();
    decode_lenient::<ScatterRow>("scatter", rows)
        .into_iter()
        .map(|row| {
            let x = match axes {
                // Stored as a fraction, shown as a percentage.
                ScatterAxes::DiscountRating => row.x * 100.0,
                ScatterAxes::PriceQuantity => row.x,
            };
            ScatterPoint {
                fill: palette.color_for(&row.category).to_string(),
                id: row.id,
                x,
                y: row.y,
                name: row.category,
                secondary: row.secondary,
            }
        })
        .collect()
}

fn decode_lenient<T: DeserializeOwned>(entity: &'static str, rows: Vec<Value>) -> Vec<T> {
    rows.into_iter()
        .enumerate()
        .filter_map(|(index, row)| match serde_json::from_value(row) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(entity, index, error = %err, "skipping undecodable row");
                None
            }
        })
        .collect()
}

fn decode_strict<T: DeserializeOwned>(entity: &'static str, rows: Vec<Value>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| {
            serde_json::from_value(row).map_err(|err| ServiceError::Decode {
                entity,
                reason: err.to_string(),
            })
        })
        .collect()
}

fn decode_single<T: DeserializeOwned>(entity: &'static str, rows: Vec<Value>) -> Result<T> {
    let row = rows.into_iter().next().ok_or_else(|| ServiceError::Decode {
        entity,
        reason: "no rows returned".into(),
    })?;
    serde_json::from_value(row).map_err(|err| ServiceError::Decode {
        entity,
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::catalogue::{Dimension, HeatmapMetric};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn palette_follows_first_seen_order_and_cycles() {
        let mut palette = PaletteAssigner::default();
        let colors: Vec<_> = ["a", "b", "a", "c", "d", "e", "f", "b", "g"]
            .iter()
            .map(|category| palette.color_for(category))
            .collect();

        assert_eq!(
            colors,
            vec![
                PALETTE[0], PALETTE[1], PALETTE[0], PALETTE[2], PALETTE[3], PALETTE[4],
                PALETTE[0], PALETTE[1], PALETTE[1],
            ]
        );
    }

    #[test]
    fn discount_rating_scatter_is_percent_scaled() {
        let rows = vec![
            json!({"id": "p1", "x": 0.25, "y": 4.5, "category": "Acme"}),
            json!({"id": "p2", "x": 0.5, "y": 3.0, "category": "Globex"}),
            json!({"id": "p3", "x": 1.0, "y": 5.0, "category": "Acme"}),
        ];

        let data = map_rows(
            &Chart::Scatter {
                axes: ScatterAxes::DiscountRating,
            },
            rows,
        )
        .expect("scatter maps");

        let ChartData::Scatter(points) = data else {
            panic!("expected scatter data, got {data:?}");
        };
        assert_eq!(
            points.iter().map(|point| point.x).collect::<Vec<_>>(),
            vec![25.0, 50.0, 100.0]
        );
        assert!(points.iter().all(|point| (0.0..=100.0).contains(&point.x)));
        assert_eq!(points[0].fill, PALETTE[0]);
        assert_eq!(points[1].fill, PALETTE[1]);
        assert_eq!(points[2].fill, PALETTE[0]);
        assert_eq!(points[1].name, "Globex");
        assert!(points.iter().all(|point| point.secondary.is_none()));
    }

    #[test]
    fn price_quantity_scatter_keeps_raw_axes_and_secondary() {
        let rows = vec![
            json!({"id": "p1", "x": 19.9, "y": 120.0, "category": "Serum", "secondary": 4.2}),
            json!({"id": "p2", "x": 5.0, "y": 3.0, "category": "Toner", "secondary": null}),
        ];

        let data = map_rows(
            &Chart::Scatter {
                axes: ScatterAxes::PriceQuantity,
            },
            rows,
        )
        .expect("scatter maps");

        let serialized = serde_json::to_value(&data).expect("serializes");
        assert_eq!(
            serialized,
            json!([
                {"id": "p1", "x": 19.9, "y": 120.0, "fill": PALETTE[0], "name": "Serum", "secondary": 4.2},
                {"id": "p2", "x": 5.0, "y": 3.0, "fill": PALETTE[1], "name": "Toner"}
            ])
        );
    }

    #[test]
    fn undecodable_rows_are_skipped_for_aggregations() {
        let rows = vec![
            json!({"name": "Acme", "count": 12}),
            json!({"name": null, "count": 7}),
            json!({"name": "Globex", "count": "many"}),
            json!({"name": "Initech", "count": 3}),
        ];

        let data = map_rows(
            &Chart::Distribution {
                dimension: Dimension::Brand,
                limit: 100,
            },
            rows,
        )
        .expect("distribution maps");

        assert_eq!(
            data,
            ChartData::Distribution(vec![
                NamedCount {
                    name: "Acme".into(),
                    count: 12
                },
                NamedCount {
                    name: "Initech".into(),
                    count: 3
                },
            ])
        );
    }

    #[test]
    fn heatmap_cells_decode() {
        let rows = vec![json!({"brand": "Acme", "product_type": "Serum", "value": 4.25})];
        let data = map_rows(
            &Chart::Heatmap {
                metric: HeatmapMetric::Rating,
            },
            rows,
        )
        .expect("heatmap maps");
        assert_eq!(
            data,
            ChartData::Heatmap(vec![HeatmapCell {
                brand: "Acme".into(),
                product_type: "Serum".into(),
                value: 4.25
            }])
        );
    }

    #[test]
    fn kpi_decode_failure_fails_the_request() {
        let err = map_rows(&Chart::Kpi, vec![json!({"total_products": "n/a"})])
            .expect_err("bad KPI row must fail");
        assert!(matches!(err, ServiceError::Decode { entity: "kpi", .. }));

        let err = map_rows(&Chart::Kpi, Vec::new()).expect_err("missing KPI row must fail");
        assert!(err.to_string().contains("no rows returned"), "got: {err}");
    }

    #[test]
    fn kpi_with_no_matching_rows_reports_zeroes() {
        let row = json!({
            "total_products": 0,
            "total_units_sold": 0,
            "revenue_proxy": 0.0,
            "avg_price": 0.0,
            "avg_rating": 0.0,
            "avg_discount": 0.0
        });

        let data = map_rows(&Chart::Kpi, vec![row.clone()]).expect("kpi maps");
        assert_eq!(serde_json::to_value(&data).expect("serializes"), row);
    }

    #[test]
    fn products_omit_missing_rating() {
        let rows = vec![json!({
            "id": "sku-1",
            "title_raw": "Acme Serum 30ml",
            "brand": "Acme",
            "product_type": "Serum",
            "price_effective": 12.5,
            "rating": null
        })];

        let data = map_rows(&Chart::Products, rows).expect("products map");
        let serialized = serde_json::to_value(&data).expect("serializes");
        assert!(serialized[0].get("rating").is_none(), "got: {serialized}");
        assert_eq!(serialized[0]["price_effective"], json!(12.5));
    }

    #[test]
    fn product_decode_failure_fails_the_request() {
        let rows = vec![json!({"id": "sku-1", "title_raw": null})];
        assert!(map_rows(&Chart::Products, rows).is_err());
    }
}
