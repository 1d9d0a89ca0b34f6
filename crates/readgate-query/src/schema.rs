//! Read-only schema description returned by `BackendAdapter::introspect`.

use serde::Serialize;
use std::fmt::Write;

use crate::types::{Backend, DataRow};

/// A column, or a top-level document field
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
    /// Index role as reported by the backend (`PRI`, `UNI`, `MUL`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            key: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.key = (!key.is_empty()).then_some(key);
        self
    }

    pub fn is_primary_key(&self) -> bool {
        self.key.as_deref() == Some("PRI")
    }
}

/// A table, or a collection for document backends
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableInfo {
    pub name: String,
    /// Namespace the table lives in, when the backend has several
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub columns: Vec<ColumnInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_count: Option<u64>,
    /// One document the field list was inferred from
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sample: Option<DataRow>,
}

impl TableInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            columns: Vec::new(),
            document_count: None,
            sample: None,
        }
    }

    pub fn in_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// `schema.table`, or the bare name
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }
}

/// Every table (or collection) visible to the connector's credential
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct SchemaInfo {
    tables: Vec<TableInfo>,
}

impl SchemaInfo {
    pub fn new(tables: Vec<TableInfo>) -> Self {
        Self { tables }
    }

    pub fn tables(&self) -> &[TableInfo] {
        &self.tables
    }

    pub fn table_count(&self) -> usize {
        self.tables.len()
    }

    pub fn into_tables(self) -> Vec<TableInfo> {
        self.tables
    }

    /// Plain-text rendering, one block per table
    pub fn to_text(&self, backend: Backend) -> String {
        let (title, entity) = match backend {
            Backend::Postgres => ("PostgreSQL", "Table"),
            Backend::MySql => ("MySQL", "Table"),
            Backend::MongoDb => ("MongoDB", "Collection"),
        };

        let mut text = format!("{} Database Schema\n\n", title);
        for table in &self.tables {
            let _ = write!(text, "{}: {}", entity, table.qualified_name());
            if let Some(count) = table.document_count {
                let _ = write!(text, " ({} documents)", count);
            }
            text.push('\n');

            for column in &table.columns {
                let _ = write!(text, "  - {}: {}", column.name, column.data_type);
                if backend.is_relational() {
                    text.push_str(if column.nullable { " NULL" } else { " NOT NULL" });
                    if column.is_primary_key() {
                        text.push_str(" PRIMARY KEY");
                    }
                }
                text.push('\n');
            }
            text.push('\n');
        }
        text
    }
}

/// Group `(table, column)` rows that arrive ordered by table into
/// `TableInfo`s, keeping first-seen order.
pub fn group_columns<I>(rows: I) -> Vec<TableInfo>
where
    I: IntoIterator<Item = (Option<String>, String, ColumnInfo)>,
{
    let mut tables: Vec<TableInfo> = Vec::new();
    for (schema, table, column) in rows {
        match tables.last_mut() {
            Some(last) if last.name == table && last.schema == schema => last.columns.push(column),
            _ => {
                let mut info = TableInfo::new(table);
                info.schema = schema;
                info.columns.push(column);
                tables.push(info);
            }
        }
    }
    tables
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample_schema() -> SchemaInfo {
        SchemaInfo::new(group_columns(vec![
            (
                Some("public".to_string()),
                "customers".to_string(),
                ColumnInfo::new("id", "integer", false).with_key("PRI"),
            ),
            (
                Some("public".to_string()),
                "customers".to_string(),
                ColumnInfo::new("email", "text", true),
            ),
            (
                Some("public".to_string()),
                "orders".to_string(),
                ColumnInfo::new("id", "bigint", false).with_key(""),
            ),
        ]))
    }

    #[test]
    fn test_group_columns_keeps_table_order() {
        let schema = sample_schema();
        assert_eq!(schema.table_count(), 2);
        assert_eq!(schema.tables()[0].qualified_name(), "public.customers");
        assert_eq!(schema.tables()[0].columns.len(), 2);
        assert_eq!(schema.tables()[1].columns[0].key, None);
    }

    #[test]
    fn test_relational_text() {
        let text = sample_schema().to_text(Backend::Postgres);
        assert!(text.starts_with("PostgreSQL Database Schema\n\n"));
        assert!(text.contains("Table: public.customers\n  - id: integer NOT NULL PRIMARY KEY\n"));
        assert!(text.contains("  - email: text NULL\n"));
    }

    #[test]
    fn test_document_text_and_shape() {
        let mut users = TableInfo::new("users");
        users.document_count = Some(12);
        users.columns.push(ColumnInfo::new("_id", "string", true));

        let schema = SchemaInfo::new(vec![users]);
        assert_eq!(
            schema.to_text(Backend::MongoDb),
            "MongoDB Database Schema\n\nCollection: users (12 documents)\n  - _id: string\n\n"
        );
        assert_eq!(
            serde_json::to_value(&schema).unwrap(),
            json!([{
                "name": "users",
                "columns": [{ "name": "_id", "data_type": "string", "nullable": true }],
                "document_count": 12,
            }])
        );
    }
}
