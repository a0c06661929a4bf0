//! Parameterized statement builders.
//!
//! Table and column names are trusted identifiers supplied by code. Values
//! never enter the statement text: every value becomes a `%s` placeholder and
//! is carried in the statement's parameter list, in placeholder order.

use super::value::{Record, SqlValue};

/// Statement text paired with its ordered parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    sql: String,
    params: Vec<SqlValue>,
}

impl Statement {
    /// Statement without parameters.
    #[must_use]
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Statement with `%s` placeholders and matching parameters.
    #[must_use]
    pub fn with_params(sql: impl Into<String>, params: Vec<SqlValue>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }

    /// Statement text.
    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Parameters in placeholder order.
    #[must_use]
    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }
}

/// Optional parts of a `SELECT`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectOptions<'a> {
    /// Columns to return; empty selects `*`.
    pub columns: &'a [&'a str],
    /// Exact-match filters joined with `AND`.
    pub filter: Option<&'a Record>,
    /// Trusted `ORDER BY` expression.
    pub order_by: Option<&'a str>,
    /// Row limit.
    pub limit: Option<u32>,
    /// Rows to skip.
    pub offset: Option<u32>,
}

/// Builds `SELECT <columns> FROM <table> [WHERE ..] [ORDER BY ..] [LIMIT %s] [OFFSET %s]`.
#[must_use]
pub fn build_select(table: &str, options: &SelectOptions<'_>) -> Statement {
    let columns = if options.columns.is_empty() {
        "*".to_string()
    } else {
        options.columns.join(", ")
    };

    let mut sql = format!("SELECT {} FROM {}", columns, table);
    let mut params = Vec::new();

    if let Some(filter) = options.filter.filter(|f| !f.is_empty()) {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions(filter));
        params.extend(filter.values().cloned());
    }
    if let Some(order_by) = options.order_by {
        sql.push_str(" ORDER BY ");
        sql.push_str(order_by);
    }
    if let Some(limit) = options.limit {
        sql.push_str(" LIMIT %s");
        params.push(SqlValue::from(limit));
    }
    if let Some(offset) = options.offset {
        sql.push_str(" OFFSET %s");
        params.push(SqlValue::from(offset));
    }

    Statement::with_params(sql, params)
}

/// Builds `INSERT INTO <table> (<cols>) VALUES (<placeholders>) [RETURNING ..]`.
///
/// Columns appear in the record's insertion order.
#[must_use]
pub fn build_insert(table: &str, data: &Record, returning: Option<&str>) -> Statement {
    let columns = data.columns().collect::<Vec<_>>().join(", ");
    let placeholders = vec!["%s"; data.len()].join(", ");

    let mut sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table, columns, placeholders
    );
    if let Some(returning) = returning {
        sql.push_str(" RETURNING ");
        sql.push_str(returning);
    }

    Statement::with_params(sql, data.values().cloned().collect())
}

/// Builds `UPDATE <table> SET c = %s, .. WHERE k = %s AND ..`.
///
/// `data` must not be empty; callers short-circuit no-op updates.
#[must_use]
pub fn build_update(table: &str, data: &Record, filter: &Record) -> Statement {
    let assignments = data
        .columns()
        .map(|column| format!("{} = %s", column))
        .collect::<Vec<_>>()
        .join(", ");

    let sql = format!(
        "UPDATE {} SET {} WHERE {}",
        table,
        assignments,
        conditions(filter)
    );
    let params = data.values().chain(filter.values()).cloned().collect();

    Statement::with_params(sql, params)
}

/// Builds `DELETE FROM <table> WHERE k = %s AND ..`.
#[must_use]
pub fn build_delete(table: &str, filter: &Record) -> Statement {
    let sql = format!("DELETE FROM {} WHERE {}", table, conditions(filter));
    Statement::with_params(sql, filter.values().cloned().collect())
}

/// Validates a caller-supplied sort key against `allowed` columns.
///
/// Accepts `col`, `col asc` and `col desc` (direction case-insensitive) and
/// returns the normalized expression, or `None` for anything else.
#[must_use]
pub fn sanitize_order_by(raw: &str, allowed: &[&str]) -> Option<String> {
    let mut parts = raw.split_whitespace();
    let column = parts.next()?;
    let direction = match parts.next() {
        None => None,
        Some(dir) if dir.eq_ignore_ascii_case("asc") => Some("ASC"),
        Some(dir) if dir.eq_ignore_ascii_case("desc") => Some("DESC"),
        Some(_) => return None,
    };
    if parts.next().is_some() || !allowed.contains(&column) {
        return None;
    }

    Some(match direction {
        Some(direction) => format!("{} {}", column, direction),
        None => column.to_string(),
    })
}

fn conditions(filter: &Record) -> String {
    filter
        .columns()
        .map(|column| format!("{} = %s", column))
        .collect::<Vec<_>>()
        .join(" AND ")
}
