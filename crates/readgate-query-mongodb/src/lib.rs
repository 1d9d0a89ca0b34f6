//! MongoDB adapter for readgate-query
//!
//! Client options are parsed once when the adapter is built. Each request
//! gets its own client, bounded by the request timeout for server selection
//! and by `maxTimeMS` on the operation, and the client is shut down before
//! the result is returned.
//!
//! ## Example
//!
//! ```rust,no_run
//! use readgate_query::BackendAdapter;
//! use readgate_query_mongodb::MongoAdapter;
//!
//! # async fn example() -> readgate_query::Result<()> {
//! let adapter = MongoAdapter::new("mongodb://localhost:27017/app").await?;
//! adapter.ping().await?;
//! # Ok(())
//! # }
//! ```

pub mod convert;

use async_trait::async_trait;
use bson::{doc, Document};
use futures::TryStreamExt;
use mongodb::error::ErrorKind;
use mongodb::options::ClientOptions;
use mongodb::{Client, Collection};
use readgate_query::{
    AdapterFactory, Backend, BackendAdapter, ConnectionConfig, DataRow, DocumentOperation,
    DocumentOptions, DocumentQuery, Operation, QueryError, ResultSet, Result, SchemaInfo,
    TableInfo, ValidatedQuery,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

use crate::convert::{document_to_row, json_to_document, json_to_pipeline, sample_columns};

/// Row cap for `find` when the caller gives no `options.limit`
pub const DEFAULT_FIND_LIMIT: i64 = 100;

/// `MaxTimeMSExpired`
const MAX_TIME_EXPIRED: i32 = 50;

/// MongoDB adapter
pub struct MongoAdapter {
    options: ClientOptions,
    database: String,
}

impl MongoAdapter {
    /// Parse the connection string. The string must name a default
    /// database. Does not connect.
    pub async fn new(url: &str) -> Result<Self> {
        let options = ClientOptions::parse(url).await.map_err(|e| {
            error!("Failed to parse MongoDB URL: {}", e);
            QueryError::connection(format!("Failed to parse MongoDB URL: {}", e))
        })?;

        let database = options.default_database.clone().ok_or_else(|| {
            QueryError::connection("MongoDB connection string must name a default database")
        })?;

        Ok(Self { options, database })
    }

    /// Database reads run against
    pub fn database(&self) -> &str {
        &self.database
    }

    fn client(&self, timeout: Duration) -> Result<Client> {
        let mut options = self.options.clone();
        options.server_selection_timeout = Some(timeout);
        options.connect_timeout = Some(timeout);

        Client::with_options(options).map_err(|e| {
            QueryError::connection(format!("Failed to create MongoDB client: {}", e))
        })
    }

    async fn run(
        client: &Client,
        database: &str,
        query: &DocumentQuery,
        timeout: Duration,
    ) -> Result<Vec<DataRow>> {
        let collection: Collection<Document> =
            client.database(database).collection(query.collection());
        let timeout_ms = timeout.as_millis() as u64;
        let map_err = |e: mongodb::error::Error| Self::map_error(e, timeout_ms);

        match query.operation() {
            DocumentOperation::Find => {
                let filter = json_to_document(query.filter(), "filter")?;
                let options = query.options();
                let mut find = collection
                    .find(filter)
                    .limit(find_limit(options))
                    .max_time(timeout);
                if let Some(skip) = options.skip {
                    find = find.skip(skip);
                }
                if let Some(sort) = &options.sort {
                    find = find.sort(json_to_document(sort, "sort")?);
                }
                if let Some(projection) = &options.projection {
                    find = find.projection(json_to_document(projection, "projection")?);
                }

                let docs: Vec<Document> = find
                    .await
                    .map_err(map_err)?
                    .try_collect()
                    .await
                    .map_err(map_err)?;
                Ok(docs.into_iter().map(document_to_row).collect())
            }
            DocumentOperation::FindOne => {
                let filter = json_to_document(query.filter(), "filter")?;
                let mut find_one = collection.find_one(filter).max_time(timeout);
                if let Some(projection) = &query.options().projection {
                    find_one = find_one.projection(json_to_document(projection, "projection")?);
                }

                let found = find_one.await.map_err(map_err)?;
                Ok(found.into_iter().map(document_to_row).collect())
            }
            DocumentOperation::Count | DocumentOperation::CountDocuments => {
                let filter = json_to_document(query.filter(), "filter")?;
                let count = collection
                    .count_documents(filter)
                    .max_time(timeout)
                    .await
                    .map_err(map_err)?;

                let mut row = DataRow::new();
                row.insert("count".to_string(), serde_json::Value::Number(count.into()));
                Ok(vec![row])
            }
            DocumentOperation::Aggregate => {
                let pipeline = json_to_pipeline(query.filter())?;
                let docs: Vec<Document> = collection
                    .aggregate(pipeline)
                    .max_time(timeout)
                    .await
                    .map_err(map_err)?
                    .try_collect()
                    .await
                    .map_err(map_err)?;
                Ok(docs.into_iter().map(document_to_row).collect())
            }
        }
    }

    /// Every user collection with its document count and the fields of one
    /// sampled document
    async fn describe(client: &Client, database: &str, timeout: Duration) -> Result<Vec<TableInfo>> {
        let db = client.database(database);
        let map_err = |e: mongodb::error::Error| Self::map_error(e, timeout.as_millis() as u64);

        let mut names = db.list_collection_names().await.map_err(map_err)?;
        names.retain(|name| !name.starts_with("system."));
        names.sort();

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let collection: Collection<Document> = db.collection(&name);
            let sample = collection
                .find_one(doc! {})
                .max_time(timeout)
                .await
                .map_err(map_err)?;
            let count = collection
                .count_documents(doc! {})
                .max_time(timeout)
                .await
                .map_err(map_err)?;

            let mut table = TableInfo::new(name);
            table.document_count = Some(count);
            if let Some(sample) = sample {
                let row = document_to_row(sample);
                table.columns = sample_columns(&row);
                table.sample = Some(row);
            }
            tables.push(table);
        }
        Ok(tables)
    }

    fn map_error(e: mongodb::error::Error, timeout_ms: u64) -> QueryError {
        match *e.kind {
            ErrorKind::Command(ref command) if command.code == MAX_TIME_EXPIRED => {
                QueryError::Timeout(timeout_ms)
            }
            ErrorKind::Command(ref command) => QueryError::execution(command.message.clone()),
            ErrorKind::ServerSelection { .. }
            | ErrorKind::Io(_)
            | ErrorKind::DnsResolve { .. }
            | ErrorKind::Authentication { .. }
            | ErrorKind::ConnectionPoolCleared { .. } => QueryError::connection(e.to_string()),
            _ => QueryError::execution(e.to_string()),
        }
    }
}

/// `find` row cap: the caller's limit, or the default
fn find_limit(options: &DocumentOptions) -> i64 {
    options.limit.unwrap_or(DEFAULT_FIND_LIMIT)
}

#[async_trait]
impl BackendAdapter for MongoAdapter {
    fn backend(&self) -> Backend {
        Backend::MongoDb
    }

    async fn execute(&self, query: &ValidatedQuery, timeout: Duration) -> Result<ResultSet> {
        let document_query = match query.operation() {
            Operation::Document(document_query) => document_query,
            Operation::Sql(_) => {
                return Err(QueryError::invalid_format(
                    "mongodb expects a document query, got SQL text",
                ))
            }
        };

        let client = self.client(timeout)?;

        debug!(
            request_id = %query.request_id(),
            "Running {} on collection {}",
            document_query.operation(),
            document_query.collection()
        );

        let outcome = Self::run(&client, &self.database, document_query, timeout).await;
        client.shutdown().await;

        let rows = outcome.map_err(|e| {
            error!(request_id = %query.request_id(), "MongoDB execution failed: {}", e);
            e
        })?;

        debug!("MongoDB returned {} documents", rows.len());
        Ok(ResultSet::new(rows))
    }

    async fn ping(&self) -> Result<()> {
        let client = self.client(Duration::from_secs(5))?;
        let outcome = client
            .database(&self.database)
            .run_command(doc! { "ping": 1 })
            .await;
        client.shutdown().await;
        outcome
            .map(|_| ())
            .map_err(|e| QueryError::connection(e.to_string()))
    }

    async fn introspect(&self, timeout: Duration) -> Result<SchemaInfo> {
        let client = self.client(timeout)?;
        let outcome = Self::describe(&client, &self.database, timeout).await;
        client.shutdown().await;

        let schema = SchemaInfo::new(outcome?);
        debug!(
            "Introspected {} MongoDB collections in {}",
            schema.table_count(),
            self.database
        );
        Ok(schema)
    }
}

/// Factory for MongoDB adapters
pub struct MongoFactory;

#[async_trait]
impl AdapterFactory for MongoFactory {
    fn backend(&self) -> Backend {
        Backend::MongoDb
    }

    async fn create(&self, config: &ConnectionConfig) -> Result<Arc<dyn BackendAdapter>> {
        Ok(Arc::new(MongoAdapter::new(&config.url).await?))
    }
}
