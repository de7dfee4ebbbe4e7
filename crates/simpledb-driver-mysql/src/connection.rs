//! MySQL connection implementation

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use mysql_async::prelude::*;
use mysql_async::{Column, Conn, OptsBuilder, Params, Row as MySqlRow};
use simpledb_core::{
    ColumnMeta, Connection, ConnectionConfig, DbError, QueryResult, Result, Row, StatementResult,
    Value,
};
use tokio::sync::Mutex;

use crate::factory::DEFAULT_PORT;
use crate::value::{as_flag, is_flag_column, mysql_to_value, value_to_mysql};

/// A single MySQL session
///
/// Pooling is left to `simpledb-connection`; this type owns exactly one
/// socket and serializes statements on it.
pub struct MySqlConnection {
    conn: Mutex<Option<Conn>>,
    closed: AtomicBool,
}

impl MySqlConnection {
    /// Connect to a MySQL database
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let host = config.host.clone();
        let port = config.port_or(DEFAULT_PORT);
        let database = config.get_string("database");
        let user = config.get_string("username");

        tracing::debug!(host = %host, port = %port, database = ?database, "connecting to MySQL database");

        let opts = OptsBuilder::default()
            .ip_or_hostname(host.as_str())
            .tcp_port(port)
            .db_name(database.as_deref())
            .user(user.as_deref())
            .pass(config.password.as_deref());

        let conn = Conn::new(opts).await.map_err(|e| {
            DbError::Connection(format!("Failed to connect to MySQL at {}:{}: {}", host, port, e))
        })?;

        tracing::info!(host = %host, port = %port, database = ?database, "MySQL connection established");
        Ok(Self {
            conn: Mutex::new(Some(conn)),
            closed: AtomicBool::new(false),
        })
    }
}

fn to_params(params: &[Value]) -> Params {
    if params.is_empty() {
        Params::Empty
    } else {
        Params::Positional(params.iter().map(value_to_mysql).collect())
    }
}

fn closed_error() -> DbError {
    DbError::Connection("MySQL connection is closed".into())
}

fn query_error(e: mysql_async::Error) -> DbError {
    DbError::Query(format!("Failed to execute query: {}", e))
}

/// Convert driver rows using the result set's column metadata
///
/// The columns are known even when no row matched.
fn convert_rows(result_columns: &[Column], mysql_rows: Vec<MySqlRow>) -> (Vec<ColumnMeta>, Vec<Row>) {
    let columns: Vec<ColumnMeta> = result_columns
        .iter()
        .enumerate()
        .map(|(idx, col)| ColumnMeta {
            name: col.name_str().to_string(),
            data_type: format!("{:?}", col.column_type()),
            nullable: true,
            ordinal: idx,
        })
        .collect();
    let column_names: Vec<String> = columns.iter().map(|c| c.name.clone()).collect();

    let rows = mysql_rows
        .into_iter()
        .map(|mysql_row| {
            let values = result_columns
                .iter()
                .enumerate()
                .map(|(idx, col)| {
                    let mysql_val: mysql_async::Value =
                        mysql_row.get(idx).unwrap_or(mysql_async::Value::NULL);
                    let value = mysql_to_value(mysql_val, col.column_type());
                    if is_flag_column(col.column_type(), col.column_length()) {
                        as_flag(value)
                    } else {
                        value
                    }
                })
                .collect();
            Row::new(column_names.clone(), values)
        })
        .collect();

    (columns, rows)
}

#[async_trait]
impl Connection for MySqlConnection {
    fn driver_name(&self) -> &str {
        "mysql"
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult> {
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(closed_error)?;

        let outcome = if params.is_empty() {
            conn.query_drop(sql).await
        } else {
            conn.exec_drop(sql, to_params(params)).await
        };
        outcome.map_err(|e| DbError::Query(format!("Failed to execute statement: {}", e)))?;

        let result = StatementResult {
            affected_rows: conn.affected_rows(),
            last_insert_id: conn.last_insert_id(),
        };
        tracing::debug!(
            affected_rows = result.affected_rows,
            last_insert_id = ?result.last_insert_id,
            "statement executed"
        );
        Ok(result)
    }

    #[tracing::instrument(skip(self, sql, params), fields(sql_preview = %sql.chars().take(100).collect::<String>()))]
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        let start_time = Instant::now();
        let mut guard = self.conn.lock().await;
        let conn = guard.as_mut().ok_or_else(closed_error)?;

        let (result_columns, mysql_rows) = if params.is_empty() {
            let result = conn.query_iter(sql).await.map_err(query_error)?;
            let result_columns = result.columns();
            let rows = result.collect_and_drop::<MySqlRow>().await.map_err(query_error)?;
            (result_columns, rows)
        } else {
            let result = conn
                .exec_iter(sql, to_params(params))
                .await
                .map_err(query_error)?;
            let result_columns = result.columns();
            let rows = result.collect_and_drop::<MySqlRow>().await.map_err(query_error)?;
            (result_columns, rows)
        };
        drop(guard);

        let result_columns: Arc<[Column]> = result_columns.unwrap_or_else(|| Arc::from(Vec::new()));
        let (columns, rows) = convert_rows(&result_columns, mysql_rows);
        let execution_time_ms = start_time.elapsed().as_millis() as u64;

        tracing::debug!(
            row_count = rows.len(),
            execution_time_ms = execution_time_ms,
            "query executed successfully"
        );

        Ok(QueryResult {
            id: uuid::Uuid::new_v4(),
            columns,
            rows,
            execution_time_ms,
        })
    }

    async fn close(&self) -> Result<()> {
        let conn = self.conn.lock().await.take();
        self.closed.store(true, Ordering::SeqCst);
        let Some(conn) = conn else {
            return Ok(());
        };

        tracing::debug!("closing MySQL connection");
        conn.disconnect()
            .await
            .map_err(|e| DbError::Connection(format!("Failed to close MySQL connection: {}", e)))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
