//! Fluent SQL builder
//!
//! A [`Sql`] collects SQL fragments and their positional parameters, then
//! runs once through a terminal operation. Every terminal operation checks a
//! connection out of the pool and hands it back before returning, whether
//! the statement succeeded or not.

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::de::DeserializeOwned;
use simpledb_connection::ConnectionPool;
use simpledb_core::{QueryResult, Row, StatementResult, Value};

use crate::error::{QueryError, SqlResult};

/// Placeholder used for positional parameters
const PLACEHOLDER: &str = "?";

/// A SQL statement under construction
///
/// ```ignore
/// let title: Option<String> = db
///     .gen_sql()
///     .append("SELECT title FROM article", &[])
///     .append("WHERE id = ?", &[1.into()])
///     .select_string()
///     .await?;
/// ```
#[derive(Debug, Clone)]
pub struct Sql {
    pool: ConnectionPool,
    dev_mode: bool,
    sql: String,
    params: Vec<Value>,
}

impl Sql {
    pub(crate) fn new(pool: ConnectionPool, dev_mode: bool) -> Self {
        Self {
            pool,
            dev_mode,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    /// Append a fragment, binding `args` to its `?` placeholders in order
    ///
    /// Fragments are joined with a single space.
    pub fn append(&mut self, fragment: &str, args: &[Value]) -> &mut Self {
        self.push_fragment(fragment);
        self.params.extend_from_slice(args);
        self
    }

    /// Append a fragment whose `?` stands for a whole list of values
    ///
    /// `"id IN (?)"` with three values becomes `"id IN (?, ?, ?)"`. An empty
    /// list becomes `NULL`, so `IN (NULL)` matches no row.
    pub fn append_in(&mut self, fragment: &str, values: &[Value]) -> &mut Self {
        let expansion = if values.is_empty() {
            "NULL".to_string()
        } else {
            vec![PLACEHOLDER; values.len()].join(", ")
        };
        self.push_fragment(&fragment.replacen(PLACEHOLDER, &expansion, 1));
        self.params.extend_from_slice(values);
        self
    }

    /// The SQL text built so far
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// The bound parameters, in placeholder order
    pub fn params(&self) -> &[Value] {
        &self.params
    }

    fn push_fragment(&mut self, fragment: &str) {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            return;
        }
        if !self.sql.is_empty() {
            self.sql.push(' ');
        }
        self.sql.push_str(fragment);
    }

    fn log_statement(&self) {
        if self.dev_mode {
            tracing::info!(sql = %self.sql, params = ?self.params, "executing SQL");
        } else {
            tracing::debug!(sql = %self.sql, params = self.params.len(), "executing SQL");
        }
    }

    /// Run the statement as a write and return the driver's summary
    async fn execute(&self) -> SqlResult<StatementResult> {
        self.log_statement();
        let conn = self.pool.acquire().await?;
        let outcome = conn.execute(&self.sql, &self.params).await;
        let released = self.pool.release(conn);
        let result = outcome?;
        released?;
        Ok(result)
    }

    /// Run the statement as a read and return every row
    async fn fetch(&self) -> SqlResult<QueryResult> {
        self.log_statement();
        let conn = self.pool.acquire().await?;
        let outcome = conn.query(&self.sql, &self.params).await;
        let released = self.pool.release(conn);
        let result = outcome?;
        released?;
        Ok(result)
    }

    /// First column of the first row, `None` when there is no row or it is NULL
    async fn fetch_scalar(&self) -> SqlResult<Option<Value>> {
        let result = self.fetch().await?;
        Ok(result
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.values.into_iter().next())
            .filter(|value| !value.is_null()))
    }

    /// Execute an INSERT and return the generated key
    ///
    /// Returns 0 when the table has no AUTO_INCREMENT column, as MySQL's
    /// `LAST_INSERT_ID()` does.
    #[tracing::instrument(skip(self), fields(sql = %self.sql))]
    pub async fn insert(&self) -> SqlResult<u64> {
        let result = self.execute().await?;
        Ok(result.last_insert_id.unwrap_or(0))
    }

    /// Execute an UPDATE and return the number of affected rows
    #[tracing::instrument(skip(self), fields(sql = %self.sql))]
    pub async fn update(&self) -> SqlResult<u64> {
        Ok(self.execute().await?.affected_rows)
    }

    /// Execute a DELETE and return the number of affected rows
    #[tracing::instrument(skip(self), fields(sql = %self.sql))]
    pub async fn delete(&self) -> SqlResult<u64> {
        Ok(self.execute().await?.affected_rows)
    }

    /// The whole result set, column metadata included
    ///
    /// Columns are reported even when no row matched.
    pub async fn select_result(&self) -> SqlResult<QueryResult> {
        self.fetch().await
    }

    /// All rows of the result
    pub async fn select_rows(&self) -> SqlResult<Vec<Row>> {
        Ok(self.fetch().await?.rows)
    }

    /// The first row of the result, if any
    pub async fn select_row(&self) -> SqlResult<Option<Row>> {
        Ok(self.fetch().await?.rows.into_iter().next())
    }

    /// The first row keyed by column name; empty when there is no row
    pub async fn select_row_map(&self) -> SqlResult<HashMap<String, Value>> {
        Ok(self
            .select_row()
            .await?
            .map(|row| row.to_map())
            .unwrap_or_default())
    }

    pub async fn select_long(&self) -> SqlResult<Option<i64>> {
        self.fetch_scalar()
            .await?
            .map(|value| value.as_i64().ok_or_else(|| mismatch("an integer", &value)))
            .transpose()
    }

    pub async fn select_string(&self) -> SqlResult<Option<String>> {
        self.fetch_scalar()
            .await?
            .map(|value| match value {
                Value::String(s) | Value::Decimal(s) => Ok(s),
                Value::Bytes(bytes) => String::from_utf8(bytes)
                    .map_err(|e| QueryError::Decode(format!("column is not valid UTF-8: {}", e))),
                other => Ok(other.to_string()),
            })
            .transpose()
    }

    pub async fn select_bool(&self) -> SqlResult<Option<bool>> {
        self.fetch_scalar()
            .await?
            .map(|value| value.as_bool().ok_or_else(|| mismatch("a boolean", &value)))
            .transpose()
    }

    pub async fn select_datetime(&self) -> SqlResult<Option<NaiveDateTime>> {
        self.fetch_scalar()
            .await?
            .map(|value| value.as_datetime().ok_or_else(|| mismatch("a datetime", &value)))
            .transpose()
    }

    /// The first column of every row as integers
    pub async fn select_longs(&self) -> SqlResult<Vec<i64>> {
        self.fetch()
            .await?
            .rows
            .iter()
            .map(|row| match row.get(0) {
                Some(value) => value.as_i64().ok_or_else(|| mismatch("an integer", value)),
                None => Err(QueryError::Decode("row has no columns".into())),
            })
            .collect()
    }

    /// Every row decoded into `T`, matching fields to columns by name
    pub async fn select_rows_as<T: DeserializeOwned>(&self) -> SqlResult<Vec<T>> {
        self.fetch().await?.rows.iter().map(decode_row).collect()
    }

    /// The first row decoded into `T`, if any
    pub async fn select_row_as<T: DeserializeOwned>(&self) -> SqlResult<Option<T>> {
        self.select_row().await?.as_ref().map(decode_row).transpose()
    }
}

fn mismatch(expected: &str, value: &Value) -> QueryError {
    QueryError::Decode(format!("expected {}, got {:?}", expected, value))
}

fn decode_row<T: DeserializeOwned>(row: &Row) -> SqlResult<T> {
    serde_json::from_value(serde_json::Value::Object(row.to_json_object()))
        .map_err(|e| QueryError::Decode(e.to_string()))
}
