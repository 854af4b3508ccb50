//! Filter-to-SQL predicate assembly.
//!
//! Every user-supplied value is bound as a parameter. The builder hands out
//! placeholders from its own parameter list, so skipped clauses can never
//! leave a gap between `$n` markers and the values bound to them.

use super::BindParam;
use crate::filter::FilterSet;

/// Baseline expression every predicate starts from.
pub const TRUE_BASELINE: &str = "1=1";

/// A WHERE-clause fragment and the values for its `$1..$n` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    sql: String,
    params: Vec<BindParam>,
}

impl Predicate {
    /// Builds the predicate for a request's filters.
    ///
    /// Clause order is fixed: categorical fields first (brand, product_type),
    /// then min/max per range field (price, rating, discount).
    pub fn from_filters(filters: &FilterSet) -> Self {
        let mut builder = PredicateBuilder::new();

        for (field, values) in filters.categorical() {
            builder.any_of(field.column(), values);
        }

        for (field, bounds) in filters.ranges() {
            if let Some(min) = bounds.min {
                builder.at_least(field.column(), min);
            }
            if let Some(max) = bounds.max {
                builder.at_most(field.column(), max);
            }
        }

        builder.build()
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[BindParam] {
        &self.params
    }

    pub fn into_parts(self) -> (String, Vec<BindParam>) {
        (self.sql, self.params)
    }
}

#[derive(Debug, Default)]
pub struct PredicateBuilder {
    clauses: Vec<String>,
    params: Vec<BindParam>,
}

impl PredicateBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Placeholder the next bound value will occupy.
    fn next_placeholder(&self) -> String {
        format!("${}", self.params.len() + 1)
    }

    /// Adds a clause that consumes exactly one parameter. `render` receives the
    /// placeholder reserved for `param`.
    pub fn bind<F>(&mut self, param: BindParam, render: F) -> &mut Self
    where
        F: FnOnce(&str) -> String,
    {
        let placeholder = self.next_placeholder();
        self.clauses.push(render(&placeholder));
        self.params.push(param);
        self
    }

    /// `column = ANY($n)` with all values bound as one array. No values, no clause.
    pub fn any_of(&mut self, column: &str, values: &[String]) -> &mut Self {
        if values.is_empty() {
            return self;
        }
        self.bind(BindParam::TextArray(values.to_vec()), |placeholder| {
            format!("{column} = ANY({placeholder})")
        })
    }

    pub fn at_least(&mut self, column: &str, value: f64) -> &mut Self {
        self.bind(BindParam::Float(value), |placeholder| {
            format!("{column} >= {placeholder}")
        })
    }

    pub fn at_most(&mut self, column: &str, value: f64) -> &mut Self {
        self.bind(BindParam::Float(value), |placeholder| {
            format!("{column} <= {placeholder}")
        })
    }

    pub fn build(self) -> Predicate {
        let mut sql = String::from(TRUE_BASELINE);
        for clause in &self.clauses {
            sql.push_str(" AND ");
            sql.push_str(clause);
        }
        Predicate {
            sql,
            params: self.params,
        }
    }
}
