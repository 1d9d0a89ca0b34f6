//! MySQL adapter for readgate-query
//!
//! Opens one `MySqlConnection` per request over the text protocol, bounds
//! the statement with `max_execution_time`, and closes the connection on
//! every path.

use async_trait::async_trait;
use readgate_query::schema::group_columns;
use readgate_query::{
    AdapterFactory, Backend, BackendAdapter, ColumnInfo, ConnectionConfig, DataRow, Operation,
    QueryError, ResultSet, Result, SchemaInfo, ValidatedQuery,
};
use serde_json::Value;
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlDatabaseError, MySqlRow};
use sqlx::{Column, ConnectOptions, Connection, Executor, Row, TypeInfo, ValueRef};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

/// `ER_QUERY_TIMEOUT`: statement interrupted by `max_execution_time`
const ER_QUERY_TIMEOUT: u16 = 3024;

/// Base tables of the connection's default database, one row per column
const INTROSPECT_SQL: &str = "\
    SELECT CAST(c.TABLE_NAME AS CHAR), CAST(c.COLUMN_NAME AS CHAR), \
           CAST(c.DATA_TYPE AS CHAR), CAST(c.IS_NULLABLE AS CHAR), \
           CAST(c.COLUMN_KEY AS CHAR) \
    FROM information_schema.COLUMNS c \
    JOIN information_schema.TABLES t \
      ON t.TABLE_SCHEMA = c.TABLE_SCHEMA AND t.TABLE_NAME = c.TABLE_NAME \
    WHERE c.TABLE_SCHEMA = DATABASE() AND t.TABLE_TYPE = 'BASE TABLE' \
    ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION";

/// MySQL adapter
pub struct MySqlAdapter {
    options: MySqlConnectOptions,
}

impl MySqlAdapter {
    /// Build an adapter from a `mysql://` URL. Does not connect.
    pub fn new(url: &str) -> Result<Self> {
        let options = MySqlConnectOptions::from_str(url).map_err(|e| {
            QueryError::connection(format!("Invalid MySQL connection string: {}", e))
        })?;
        Ok(Self { options })
    }

    async fn connect(&self, timeout: Duration) -> Result<MySqlConnection> {
        match tokio::time::timeout(timeout, self.options.connect()).await {
            Ok(Ok(conn)) => Ok(conn),
            Ok(Err(e)) => Err(QueryError::connection(format!(
                "MySQL connection failed: {}",
                e
            ))),
            Err(_) => Err(QueryError::connection(format!(
                "MySQL connection timed out after {}ms",
                timeout.as_millis()
            ))),
        }
    }

    async fn run(conn: &mut MySqlConnection, sql: &str, timeout_ms: u64) -> Result<Vec<MySqlRow>> {
        let set_timeout = format!("SET SESSION max_execution_time = {}", timeout_ms);
        Executor::execute(&mut *conn, sqlx::raw_sql(&set_timeout))
            .await
            .map_err(|e| Self::map_error(e, timeout_ms))?;

        Executor::fetch_all(&mut *conn, sqlx::raw_sql(sql))
            .await
            .map_err(|e| Self::map_error(e, timeout_ms))
    }

    fn map_error(e: sqlx::Error, timeout_ms: u64) -> QueryError {
        match e {
            sqlx::Error::Database(db_error) => {
                let number = db_error
                    .try_downcast_ref::<MySqlDatabaseError>()
                    .map(|mysql| mysql.number());
                if is_timeout(number) {
                    QueryError::Timeout(timeout_ms)
                } else {
                    QueryError::execution(db_error.message())
                }
            }
            sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::Protocol(_) => {
                QueryError::connection(e.to_string())
            }
            other => QueryError::execution(other.to_string()),
        }
    }

    fn catalog_column(row: &MySqlRow) -> (Option<String>, String, ColumnInfo) {
        let text = |idx: usize| {
            row.try_get_unchecked::<Vec<u8>, _>(idx)
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
                .unwrap_or_default()
        };

        let column = ColumnInfo::new(text(1), text(2), text(3) == "YES").with_key(text(4));
        (None, text(0), column)
    }

    /// Convert MySQL row to DataRow
    fn row_to_datarow(row: &MySqlRow) -> DataRow {
        let mut data_row = DataRow::new();

        for (idx, column) in row.columns().iter().enumerate() {
            data_row.insert(column.name().to_string(), Self::extract_value(row, idx));
        }

        data_row
    }

    /// Extract value from MySQL row
    fn extract_value(row: &MySqlRow, idx: usize) -> Value {
        match row.try_get_raw(idx) {
            Ok(raw) if raw.is_null() => return Value::Null,
            Ok(_) => {}
            Err(_) => return Value::Null,
        }

        let type_name = row.columns()[idx].type_info().name().to_string();

        let value = match type_name.as_str() {
            "BOOLEAN" => row.try_get::<bool, _>(idx).ok().map(Value::Bool),
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
                row.try_get::<i64, _>(idx).ok().map(|v| Value::Number(v.into()))
            }
            "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
            | "BIGINT UNSIGNED" => row.try_get::<u64, _>(idx).ok().map(|v| Value::Number(v.into())),
            "FLOAT" => row
                .try_get::<f32, _>(idx)
                .ok()
                .and_then(|v| float_value(v as f64)),
            "DOUBLE" => row.try_get::<f64, _>(idx).ok().and_then(float_value),
            // Exact decimal text, no float rounding
            "DECIMAL" => row.try_get_unchecked::<String, _>(idx).ok().map(Value::String),
            "JSON" => row.try_get::<Value, _>(idx).ok(),
            "DATE" => row
                .try_get::<chrono::NaiveDate, _>(idx)
                .ok()
                .map(|v| Value::String(v.to_string())),
            "TIME" => row
                .try_get::<chrono::NaiveTime, _>(idx)
                .ok()
                .map(|v| Value::String(v.to_string())),
            "DATETIME" => row
                .try_get::<chrono::NaiveDateTime, _>(idx)
                .ok()
                .map(naive_timestamp_value),
            "TIMESTAMP" => row
                .try_get::<chrono::DateTime<chrono::Utc>, _>(idx)
                .ok()
                .map(|v| Value::String(v.to_rfc3339())),
            "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => row
                .try_get::<Vec<u8>, _>(idx)
                .ok()
                .map(|v| Value::String(hex::encode(v))),
            "CHAR" | "VARCHAR" | "TINYTEXT" | "TEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" => {
                row.try_get::<String, _>(idx).ok().map(Value::String)
            }
            _ => None,
        };

        // Unknown or undecodable column types fall back to their raw text.
        value
            .or_else(|| {
                row.try_get_unchecked::<Vec<u8>, _>(idx)
                    .ok()
                    .map(bytes_value)
            })
            .unwrap_or(Value::Null)
    }
}

fn is_timeout(number: Option<u16>) -> bool {
    number == Some(ER_QUERY_TIMEOUT)
}

fn float_value(v: f64) -> Option<Value> {
    serde_json::Number::from_f64(v).map(Value::Number)
}

fn naive_timestamp_value(v: chrono::NaiveDateTime) -> Value {
    Value::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

/// UTF-8 payloads as text, anything else as hex
fn bytes_value(bytes: Vec<u8>) -> Value {
    match String::from_utf8(bytes) {
        Ok(text) => Value::String(text),
        Err(e) => Value::String(hex::encode(e.into_bytes())),
    }
}

#[async_trait]
impl BackendAdapter for MySqlAdapter {
    fn backend(&self) -> Backend {
        Backend::MySql
    }

    async fn execute(&self, query: &ValidatedQuery, timeout: Duration) -> Result<ResultSet> {
        let statement = match query.operation() {
            Operation::Sql(statement) => statement,
            Operation::Document(_) => {
                return Err(QueryError::invalid_format(
                    "mysql expects SQL text, got a document query",
                ))
            }
        };
        let timeout_ms = (timeout.as_millis() as u64).max(1);

        let mut conn = self.connect(timeout).await?;

        debug!(request_id = %query.request_id(), "Executing SQL: {}", statement.text());

        let outcome = Self::run(&mut conn, statement.text(), timeout_ms).await;
        if let Err(e) = conn.close().await {
            debug!("MySQL connection close failed: {}", e);
        }

        let rows = outcome.map_err(|e| {
            error!(request_id = %query.request_id(), "MySQL execution failed: {}", e);
            e
        })?;

        let data_rows: Vec<DataRow> = rows.iter().map(Self::row_to_datarow).collect();
        debug!("SQL returned {} rows", data_rows.len());

        Ok(ResultSet::new(data_rows))
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.connect(Duration::from_secs(5)).await?;
        let outcome = conn.ping().await;
        if let Err(e) = conn.close().await {
            debug!("MySQL connection close failed: {}", e);
        }
        outcome.map_err(|e| QueryError::connection(e.to_string()))
    }

    async fn introspect(&self, timeout: Duration) -> Result<SchemaInfo> {
        let timeout_ms = (timeout.as_millis() as u64).max(1);
        let mut conn = self.connect(timeout).await?;
        let outcome = Self::run(&mut conn, INTROSPECT_SQL, timeout_ms).await;
        if let Err(e) = conn.close().await {
            debug!("MySQL connection close failed: {}", e);
        }

        let rows = outcome?;
        let schema = SchemaInfo::new(group_columns(rows.iter().map(Self::catalog_column)));
        debug!("Introspected {} MySQL tables", schema.table_count());
        Ok(schema)
    }
}

/// Factory for MySQL adapters
pub struct MySqlFactory;

#[async_trait]
impl AdapterFactory for MySqlFactory {
    fn backend(&self) -> Backend {
        Backend::MySql
    }

    async fn create(&self, config: &ConnectionConfig) -> Result<Arc<dyn BackendAdapter>> {
        Ok(Arc::new(MySqlAdapter::new(&config.url)?))
    }
}
