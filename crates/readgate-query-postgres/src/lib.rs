//! PostgreSQL adapter for readgate-query
//!
//! Opens one connection per request, bounds the statement with
//! `statement_timeout`, and converts rows into JSON objects keyed by column
//! name in column order.

mod numeric;
mod scalar;

pub use numeric::PgNumeric;
pub use scalar::PgText;

use async_trait::async_trait;
use readgate_query::schema::group_columns;
use readgate_query::{
    AdapterFactory, Backend, BackendAdapter, ColumnInfo, ConnectionConfig, DataRow, Operation,
    QueryError, ResultSet, Result, SchemaInfo, ValidatedQuery,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::{Client, Config, NoTls, Row};
use tracing::{debug, error};

/// Base tables outside the system catalogs, one row per column
const INTROSPECT_SQL: &str = "\
    SELECT c.table_schema::text, c.table_name::text, c.column_name::text, c.data_type::text, \
           c.is_nullable = 'YES' AS nullable, \
           EXISTS ( \
               SELECT 1 FROM information_schema.table_constraints tc \
               JOIN information_schema.key_column_usage k \
                 ON k.constraint_schema = tc.constraint_schema \
                AND k.constraint_name = tc.constraint_name \
               WHERE tc.constraint_type = 'PRIMARY KEY' \
                 AND k.table_schema = c.table_schema \
                 AND k.table_name = c.table_name \
                 AND k.column_name = c.column_name \
           ) AS is_primary \
    FROM information_schema.columns c \
    JOIN information_schema.tables t \
      ON t.table_schema = c.table_schema AND t.table_name = c.table_name \
    WHERE t.table_type = 'BASE TABLE' \
      AND c.table_schema NOT IN ('pg_catalog', 'information_schema') \
    ORDER BY c.table_schema, c.table_name, c.ordinal_position";

/// PostgreSQL adapter
pub struct PostgresAdapter {
    config: Config,
}

impl PostgresAdapter {
    /// Build an adapter from a `postgresql://` URL or a key-value string.
    /// Does not connect.
    pub fn new(url: &str) -> Result<Self> {
        let config = Config::from_str(url).map_err(|e| {
            QueryError::connection(format!("Invalid PostgreSQL connection string: {}", e))
        })?;
        Ok(Self { config })
    }

    /// Open a dedicated connection. The connection task ends when the
    /// returned client is dropped.
    async fn connect(&self, timeout: Duration) -> Result<Client> {
        let mut config = self.config.clone();
        config.connect_timeout(timeout);

        let (client, connection) = config.connect(NoTls).await.map_err(|e| {
            QueryError::connection(format!("PostgreSQL connection failed: {}", e))
        })?;

        // Spawn connection handler
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                debug!("PostgreSQL connection closed with error: {}", e);
            }
        });

        Ok(client)
    }

    async fn run(client: &Client, sql: &str, timeout_ms: u64) -> Result<Vec<Row>> {
        client
            .batch_execute(&format!("SET statement_timeout = {}", timeout_ms))
            .await
            .map_err(|e| Self::map_error(e, timeout_ms))?;

        client
            .query(sql, &[])
            .await
            .map_err(|e| Self::map_error(e, timeout_ms))
    }

    fn map_error(e: tokio_postgres::Error, timeout_ms: u64) -> QueryError {
        if e.code() == Some(&SqlState::QUERY_CANCELED) {
            return QueryError::Timeout(timeout_ms);
        }

        match e.as_db_error() {
            Some(db_error) => QueryError::execution(db_error.message()),
            None if e.is_closed() => QueryError::connection(e.to_string()),
            None => QueryError::execution(e.to_string()),
        }
    }

    fn catalog_column(
        row: &Row,
    ) -> std::result::Result<(Option<String>, String, ColumnInfo), tokio_postgres::Error> {
        let mut column = ColumnInfo::new(
            row.try_get::<_, String>(2)?,
            row.try_get::<_, String>(3)?,
            row.try_get::<_, bool>(4)?,
        );
        if row.try_get::<_, bool>(5)? {
            column = column.with_key("PRI");
        }
        Ok((
            Some(row.try_get::<_, String>(0)?),
            row.try_get::<_, String>(1)?,
            column,
        ))
    }

    /// Convert PostgreSQL row to DataRow
    fn row_to_datarow(row: &Row) -> DataRow {
        let mut data_row = DataRow::new();

        for (idx, column) in row.columns().iter().enumerate() {
            data_row.insert(column.name().to_string(), Self::extract_value(row, idx));
        }

        data_row
    }

    /// Extract value from PostgreSQL row
    fn extract_value(row: &Row, idx: usize) -> serde_json::Value {
        use serde_json::Value;

        let column = &row.columns()[idx];
        let type_name = column.type_().name();

        fn get<'a, T: tokio_postgres::types::FromSql<'a>>(row: &'a Row, idx: usize) -> Option<T> {
            row.try_get::<_, Option<T>>(idx).ok().flatten()
        }

        match type_name {
            "bool" => get::<bool>(row, idx).map(Value::Bool),
            "int2" => get::<i16>(row, idx).map(|v| Value::Number(v.into())),
            "int4" => get::<i32>(row, idx).map(|v| Value::Number(v.into())),
            "int8" => get::<i64>(row, idx).map(|v| Value::Number(v.into())),
            "oid" => get::<u32>(row, idx).map(|v| Value::Number(v.into())),
            "float4" => get::<f32>(row, idx).and_then(|v| float_value(v as f64)),
            "float8" => get::<f64>(row, idx).and_then(float_value),
            "numeric" => get::<PgNumeric>(row, idx).map(|v| Value::String(v.0)),
            "char" => get::<i8>(row, idx).map(|v| Value::String(((v as u8) as char).to_string())),
            "json" | "jsonb" => get::<Value>(row, idx),
            "uuid" => get::<uuid::Uuid>(row, idx).map(|v| Value::String(v.to_string())),
            "date" => get::<chrono::NaiveDate>(row, idx).map(|v| Value::String(v.to_string())),
            "time" => get::<chrono::NaiveTime>(row, idx).map(|v| Value::String(v.to_string())),
            "timestamp" => get::<chrono::NaiveDateTime>(row, idx).map(naive_timestamp_value),
            "timestamptz" => get::<chrono::DateTime<chrono::Utc>>(row, idx)
                .map(|v| Value::String(v.to_rfc3339())),
            "bytea" => get::<Vec<u8>>(row, idx).map(|v| Value::String(hex::encode(v))),
            "interval" | "timetz" | "money" | "inet" | "cidr" => {
                get::<PgText>(row, idx).map(|v| Value::String(v.0))
            }
            "_text" | "_varchar" | "_bpchar" | "_name" => {
                array::<String>(row, idx, Value::String)
            }
            "_bool" => array::<bool>(row, idx, Value::Bool),
            "_int2" => array::<i16>(row, idx, |v| Value::Number(v.into())),
            "_int4" => array::<i32>(row, idx, |v| Value::Number(v.into())),
            "_int8" => array::<i64>(row, idx, |v| Value::Number(v.into())),
            "_float4" => array::<f32>(row, idx, |v| float_value(v as f64).unwrap_or(Value::Null)),
            "_float8" => array::<f64>(row, idx, |v| float_value(v).unwrap_or(Value::Null)),
            "_numeric" => array::<PgNumeric>(row, idx, |v| Value::String(v.0)),
            "_uuid" => array::<uuid::Uuid>(row, idx, |v| Value::String(v.to_string())),
            // Text-likes (varchar, text, bpchar, name, citext) and enum
            // labels; anything else that does not decode as text becomes null.
            _ => get::<String>(row, idx)
                .or_else(|| get::<PgText>(row, idx).map(|v| v.0))
                .map(Value::String),
        }
        .unwrap_or(Value::Null)
    }
}

/// One-dimensional array with SQL NULL elements kept as JSON null
fn array<'a, T>(
    row: &'a Row,
    idx: usize,
    convert: impl Fn(T) -> serde_json::Value,
) -> Option<serde_json::Value>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get::<_, Option<Vec<Option<T>>>>(idx)
        .ok()
        .flatten()
        .map(|items| {
            serde_json::Value::Array(
                items
                    .into_iter()
                    .map(|item| item.map(&convert).unwrap_or(serde_json::Value::Null))
                    .collect(),
            )
        })
}

fn float_value(v: f64) -> Option<serde_json::Value> {
    serde_json::Number::from_f64(v).map(serde_json::Value::Number)
}

fn naive_timestamp_value(v: chrono::NaiveDateTime) -> serde_json::Value {
    serde_json::Value::String(v.format("%Y-%m-%dT%H:%M:%S%.f").to_string())
}

#[async_trait]
impl BackendAdapter for PostgresAdapter {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    async fn execute(&self, query: &ValidatedQuery, timeout: Duration) -> Result<ResultSet> {
        let statement = match query.operation() {
            Operation::Sql(statement) => statement,
            Operation::Document(_) => {
                return Err(QueryError::invalid_format(
                    "postgresql expects SQL text, got a document query",
                ))
            }
        };
        let timeout_ms = (timeout.as_millis() as u64).max(1);

        let client = self.connect(timeout).await?;

        debug!(request_id = %query.request_id(), "Executing SQL: {}", statement.text());

        let outcome = Self::run(&client, statement.text(), timeout_ms).await;
        drop(client);

        let rows = outcome.map_err(|e| {
            error!(request_id = %query.request_id(), "PostgreSQL execution failed: {}", e);
            e
        })?;

        let data_rows: Vec<DataRow> = rows.iter().map(Self::row_to_datarow).collect();
        debug!("SQL returned {} rows", data_rows.len());

        Ok(ResultSet::new(data_rows))
    }

    async fn ping(&self) -> Result<()> {
        let client = self.connect(Duration::from_secs(5)).await?;
        let outcome = client.simple_query("SELECT 1").await;
        drop(client);
        outcome
            .map(|_| ())
            .map_err(|e| QueryError::connection(e.to_string()))
    }

    async fn introspect(&self, timeout: Duration) -> Result<SchemaInfo> {
        let timeout_ms = (timeout.as_millis() as u64).max(1);
        let client = self.connect(timeout).await?;
        let outcome = Self::run(&client, INTROSPECT_SQL, timeout_ms).await;
        drop(client);

        let rows = outcome?;
        let columns = rows
            .iter()
            .map(Self::catalog_column)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| QueryError::execution(format!("Unexpected catalog row: {}", e)))?;

        let schema = SchemaInfo::new(group_columns(columns));
        debug!("Introspected {} PostgreSQL tables", schema.table_count());
        Ok(schema)
    }
}

/// Factory for PostgreSQL adapters
pub struct PostgresFactory;

#[async_trait]
impl AdapterFactory for PostgresFactory {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

    async fn create(&self, config: &ConnectionConfig) -> Result<Arc<dyn BackendAdapter>> {
        Ok(Arc::new(PostgresAdapter::new(&config.url)?))
    }
}
