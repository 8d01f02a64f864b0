mod connection;

pub use connection::DatabaseConnection;

use serde::{Deserialize, Serialize};

/// Logical column type derived from the driver's result-set metadata.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    #[default]
    Text,
    Number,
    Float,
    Boolean,
    Date,
    DateTime,
    Blob,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DbColumn {
    pub name: String,
    pub label: String,
    pub kind: ColumnKind,
    /// Widest rendered cell in the batch, in characters. Display hint only.
    pub display_size: usize,
}

/// One result row: zero-based index plus ordered stringified cells.
/// `None` is SQL NULL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DbRow {
    pub index: usize,
    pub values: Vec<Option<String>>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QueryBatch {
    pub columns: Vec<DbColumn>,
    pub rows: Vec<DbRow>,
}

impl QueryBatch {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerInfo {
    pub product_name: String,
    pub product_version: String,
}

/// Appends LIMIT/OFFSET clauses to a query. All supported vendors accept
/// the same suffix form. A trailing semicolon in the user's query would
/// otherwise end the statement early, so strip it first.
pub fn build_limit_query(limit: Option<u64>, offset: Option<u64>, query: &str) -> String {
    let mut sql = query.trim().trim_end_matches(';').to_string();
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }
    if let Some(offset) = offset {
        sql.push_str(&format!(" OFFSET {offset}"));
    }
    sql
}
