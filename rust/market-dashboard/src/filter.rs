//! Parsed filter intent for a single request.
//!
//! Malformed input never fails the request: a bound that does not parse as a
//! finite number is dropped and the remaining filters still apply.

use crate::params::QueryParams;
use std::collections::BTreeMap;
use tracing::debug;

/// Multi-select text columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CategoricalField {
    Brand,
    ProductType,
}

impl CategoricalField {
    pub const ALL: [CategoricalField; 2] = [CategoricalField::Brand, CategoricalField::ProductType];

    pub fn param(self) -> &'static str {
        match self {
            CategoricalField::Brand => "brand",
            CategoricalField::ProductType => "product_type",
        }
    }

    pub fn column(self) -> &'static str {
        match self {
            CategoricalField::Brand => "brand",
            CategoricalField::ProductType => "product_type",
        }
    }
}

/// Numeric columns that accept `min_*` / `max_*` bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RangeField {
    Price,
    Rating,
    Discount,
}

impl RangeField {
    pub const ALL: [RangeField; 3] = [RangeField::Price, RangeField::Rating, RangeField::Discount];

    pub fn column(self) -> &'static str {
        match self {
            RangeField::Price => "price_effective",
            RangeField::Rating => "rating",
            RangeField::Discount => "discount",
        }
    }

    pub fn min_param(self) -> &'static str {
        match self {
            RangeField::Price => "min_price",
            RangeField::Rating => "min_rating",
            RangeField::Discount => "min_discount",
        }
    }

    pub fn max_param(self) -> &'static str {
        match self {
            RangeField::Price => "max_price",
            RangeField::Rating => "max_rating",
            RangeField::Discount => "max_discount",
        }
    }

    /// Converts a user-facing bound into the unit stored in the column.
    ///
    /// Discount is stored as a 0–1 fraction; anything above 1 is read as a
    /// percentage, so `10` and `0.1` both mean ten percent.
    pub fn normalize(self, value: f64) -> f64 {
        match self {
            RangeField::Discount if value > 1.0 => value / 100.0,
            _ => value,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RangeBounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl RangeBounds {
    pub fn is_empty(&self) -> bool {
        self.min.is_none() && self.max.is_none()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSet {
    categorical: BTreeMap<CategoricalField, Vec<String>>,
    ranges: BTreeMap<RangeField, RangeBounds>,
}

impl FilterSet {
    pub fn from_params(params: &QueryParams) -> Self {
        let mut filters = Self::default();

        for field in CategoricalField::ALL {
            filters.set_values(field, params.get_all(field.param()));
        }

        for field in RangeField::ALL {
            let bounds = RangeBounds {
                min: parse_bound(field, field.min_param(), params.get(field.min_param())),
                max: parse_bound(field, field.max_param(), params.get(field.max_param())),
            };
            filters.set_range(field, bounds);
        }

        filters
    }

    /// Replaces the accepted values for `field`. An empty list removes the
    /// constraint instead of matching nothing.
    pub fn set_values(&mut self, field: CategoricalField, values: Vec<String>) {
        if values.is_empty() {
            self.categorical.remove(&field);
        } else {
            self.categorical.insert(field, values);
        }
    }

    /// Stores already-normalized bounds for `field`.
    pub fn set_range(&mut self, field: RangeField, bounds: RangeBounds) {
        if bounds.is_empty() {
            self.ranges.remove(&field);
        } else {
            self.ranges.insert(field, bounds);
        }
    }

    pub fn values(&self, field: CategoricalField) -> Option<&[String]> {
        self.categorical.get(&field).map(Vec::as_slice)
    }

    pub fn range(&self, field: RangeField) -> RangeBounds {
        self.ranges.get(&field).copied().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.categorical.is_empty() && self.ranges.is_empty()
    }

    pub fn categorical(&self) -> impl Iterator<Item = (CategoricalField, &[String])> + '_ {
        self.categorical
            .iter()
            .map(|(field, values)| (*field, values.as_slice()))
    }

    pub fn ranges(&self) -> impl Iterator<Item = (RangeField, RangeBounds)> + '_ {
        self.ranges.iter().map(|(field, bounds)| (*field, *bounds))
    }
}

fn parse_bound(field: RangeField, param: &str, raw: Option<&str>) -> Option<f64> {
    let raw = raw?;
    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(field.normalize(value)),
        _ => {
            debug!(param, value = raw, "ignoring malformed range bound");
            None
        }
    }
}
