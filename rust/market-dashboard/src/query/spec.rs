//! Declarative aggregation shapes rendered on top of a [`Predicate`].

use super::{predicate::Predicate, BindParam, Statement};

pub const TABLE: &str = "analytics_master";

/// One projected expression and the key it is returned under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub expr: &'static str,
    pub alias: &'static str,
}

impl Column {
    pub const fn new(expr: &'static str, alias: &'static str) -> Self {
        Self { expr, alias }
    }
}

/// A fixed `SELECT … GROUP BY … ORDER BY … LIMIT` skeleton.
///
/// Specs never deal with placeholder numbering: the row cap is bound after
/// the predicate's parameters when the statement is rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregationSpec {
    pub name: &'static str,
    pub columns: &'static [Column],
    /// Parameterless row conditions ANDed after the predicate.
    pub conditions: &'static [&'static str],
    pub group_by: &'static [&'static str],
    pub having: Option<&'static str>,
    pub order_by: &'static [&'static str],
    pub limit: Option<i64>,
}

impl AggregationSpec {
    pub fn render(&self, predicate: Predicate) -> Statement {
        let (predicate_sql, mut params) = predicate.into_parts();

        let select = self
            .columns
            .iter()
            .map(|column| format!("{} AS {}", column.expr, column.alias))
            .collect::<Vec<_>>()
            .join(",\n  ");

        let mut sql = format!("SELECT\n  {select}\nFROM {TABLE}\nWHERE {predicate_sql}");
        for condition in self.conditions {
            sql.push_str(" AND ");
            sql.push_str(condition);
        }

        if !self.group_by.is_empty() {
            sql.push_str("\nGROUP BY ");
            sql.push_str(&self.group_by.join(", "));
        }

        if let Some(having) = self.having {
            sql.push_str("\nHAVING ");
            sql.push_str(having);
        }

        if !self.order_by.is_empty() {
            sql.push_str("\nORDER BY ");
            sql.push_str(&self.order_by.join(", "));
        }

        if let Some(limit) = self.limit {
            params.push(BindParam::Int(limit));
            sql.push_str(&format!("\nLIMIT ${}", params.len()));
        }

        Statement { sql, params }
    }
}
