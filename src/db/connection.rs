use std::time::Duration;

use sqlx::mysql::{MySqlPoolOptions, MySqlRow};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use tracing::debug;

use super::{ColumnKind, DbColumn, DbRow, QueryBatch, ServerInfo};
use crate::config::{DatabaseConfig, DatabaseVendor};
use crate::error::ConnectorError;

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(10);

/// One open connection to a source database. The underlying pool is capped
/// at a single connection, so statements on the same handle are serialized.
pub enum DatabaseConnection {
    Postgres(sqlx::PgPool),
    MySql(sqlx::MySqlPool),
    Sqlite(sqlx::SqlitePool),
}

impl DatabaseConnection {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, ConnectorError> {
        let url = config.connection_url();
        debug!(vendor = config.vendor.label(), host = %config.host, "opening connection");
        match config.vendor {
            DatabaseVendor::Postgres => {
                let pool = PgPoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(ACQUIRE_TIMEOUT)
                    .connect(&url)
                    .await?;
                Ok(Self::Postgres(pool))
            }
            DatabaseVendor::MySql => {
                let pool = MySqlPoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(ACQUIRE_TIMEOUT)
                    .connect(&url)
                    .await?;
                Ok(Self::MySql(pool))
            }
            DatabaseVendor::Sqlite => {
                let pool = SqlitePoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(ACQUIRE_TIMEOUT)
                    .connect(&url)
                    .await?;
                Ok(Self::Sqlite(pool))
            }
        }
    }

    pub fn vendor(&self) -> DatabaseVendor {
        match self {
            Self::Postgres(_) => DatabaseVendor::Postgres,
            Self::MySql(_) => DatabaseVendor::MySql,
            Self::Sqlite(_) => DatabaseVendor::Sqlite,
        }
    }

    /// Cheap liveness probe used by test-connection requests.
    pub async fn ping(&self) -> Result<(), ConnectorError> {
        match self {
            Self::Postgres(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            Self::MySql(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            Self::Sqlite(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
        }
        Ok(())
    }

    pub async fn server_info(&self) -> Result<ServerInfo, ConnectorError> {
        let product_version = match self {
            Self::Postgres(pool) => {
                sqlx::query_scalar::<_, String>("SELECT current_setting('server_version')")
                    .fetch_one(pool)
                    .await?
            }
            Self::MySql(pool) => {
                sqlx::query_scalar::<_, String>("SELECT VERSION()")
                    .fetch_one(pool)
                    .await?
            }
            Self::Sqlite(pool) => {
                sqlx::query_scalar::<_, String>("SELECT sqlite_version()")
                    .fetch_one(pool)
                    .await?
            }
        };
        Ok(ServerInfo {
            product_name: self.vendor().label().to_string(),
            product_version,
        })
    }

    /// Runs the query and copies the full result set into a batch of
    /// stringified rows plus column descriptors.
    pub async fn execute(&self, sql: &str) -> Result<QueryBatch, ConnectorError> {
        match self {
            Self::Postgres(pool) => {
                let rows = sqlx::query(sql).fetch_all(pool).await?;
                Ok(pg_batch(&rows))
            }
            Self::MySql(pool) => {
                let rows = sqlx::query(sql).fetch_all(pool).await?;
                Ok(mysql_batch(&rows))
            }
            Self::Sqlite(pool) => {
                let rows = sqlx::query(sql).fetch_all(pool).await?;
                Ok(sqlite_batch(&rows))
            }
        }
    }

    /// Column descriptors only. The query still runs; only the metadata of
    /// its result set is kept.
    pub async fn query_columns(&self, sql: &str) -> Result<Vec<DbColumn>, ConnectorError> {
        Ok(self.execute(sql).await?.columns)
    }

    pub async fn query_rows(&self, sql: &str) -> Result<Vec<DbRow>, ConnectorError> {
        Ok(self.execute(sql).await?.rows)
    }

    pub fn is_closed(&self) -> bool {
        match self {
            Self::Postgres(pool) => pool.is_closed(),
            Self::MySql(pool) => pool.is_closed(),
            Self::Sqlite(pool) => pool.is_closed(),
        }
    }

    pub async fn close(&self) {
        match self {
            Self::Postgres(pool) => pool.close().await,
            Self::MySql(pool) => pool.close().await,
            Self::Sqlite(pool) => pool.close().await,
        }
    }
}

fn column_descriptor(name: &str, kind: ColumnKind) -> DbColumn {
    DbColumn {
        name: name.to_string(),
        label: name.to_string(),
        kind,
        display_size: 0,
    }
}

fn size_columns(mut batch: QueryBatch) -> QueryBatch {
    for (idx, column) in batch.columns.iter_mut().enumerate() {
        let widest = batch
            .rows
            .iter()
            .filter_map(|row| row.values.get(idx).and_then(|v| v.as_deref()))
            .map(|v| v.chars().count())
            .max()
            .unwrap_or(0);
        column.display_size = widest.max(column.label.chars().count());
    }
    batch
}

fn pg_batch(rows: &[PgRow]) -> QueryBatch {
    let Some(first) = rows.first() else {
        return QueryBatch::default();
    };
    let columns: Vec<DbColumn> = first
        .columns()
        .iter()
        .map(|c| column_descriptor(c.name(), pg_column_kind(c.type_info().name())))
        .collect();
    let data = rows
        .iter()
        .enumerate()
        .map(|(index, row)| DbRow {
            index,
            values: (0..columns.len()).map(|idx| pg_cell(row, idx)).collect(),
        })
        .collect();
    size_columns(QueryBatch {
        columns,
        rows: data,
    })
}

fn mysql_batch(rows: &[MySqlRow]) -> QueryBatch {
    let Some(first) = rows.first() else {
        return QueryBatch::default();
    };
    let columns: Vec<DbColumn> = first
        .columns()
        .iter()
        .map(|c| column_descriptor(c.name(), mysql_column_kind(c.type_info().name())))
        .collect();
    let data = rows
        .iter()
        .enumerate()
        .map(|(index, row)| DbRow {
            index,
            values: (0..columns.len()).map(|idx| mysql_cell(row, idx)).collect(),
        })
        .collect();
    size_columns(QueryBatch {
        columns,
        rows: data,
    })
}

fn sqlite_batch(rows: &[SqliteRow]) -> QueryBatch {
    let Some(first) = rows.first() else {
        return QueryBatch::default();
    };
    let columns: Vec<DbColumn> = first
        .columns()
        .iter()
        .map(|c| column_descriptor(c.name(), sqlite_column_kind(c.type_info().name())))
        .collect();
    let data = rows
        .iter()
        .enumerate()
        .map(|(index, row)| DbRow {
            index,
            values: (0..columns.len())
                .map(|idx| sqlite_cell(row, idx))
                .collect(),
        })
        .collect();
    size_columns(QueryBatch {
        columns,
        rows: data,
    })
}

fn pg_column_kind(type_name: &str) -> ColumnKind {
    match type_name {
        "BOOL" => ColumnKind::Boolean,
        "INT2" | "SMALLINT" | "SMALLSERIAL" | "INT4" | "INT" | "INTEGER" | "SERIAL" | "INT8"
        | "BIGINT" | "BIGSERIAL" => ColumnKind::Number,
        "FLOAT4" | "REAL" | "FLOAT8" | "DOUBLE PRECISION" | "NUMERIC" | "DECIMAL" => {
            ColumnKind::Float
        }
        "DATE" => ColumnKind::Date,
        "TIME" | "TIMETZ" | "TIMESTAMP" | "TIMESTAMPTZ" => ColumnKind::DateTime,
        "BYTEA" => ColumnKind::Blob,
        _ => ColumnKind::Text,
    }
}

fn mysql_column_kind(type_name: &str) -> ColumnKind {
    match type_name {
        "BOOLEAN" | "TINYINT(1)" => ColumnKind::Boolean,
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "TINYINT UNSIGNED"
        | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED" | "BIGINT UNSIGNED" => {
            ColumnKind::Number
        }
        "FLOAT" | "DOUBLE" | "DECIMAL" => ColumnKind::Float,
        "DATE" => ColumnKind::Date,
        "TIME" | "DATETIME" | "TIMESTAMP" => ColumnKind::DateTime,
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => {
            ColumnKind::Blob
        }
        _ => ColumnKind::Text,
    }
}

fn sqlite_column_kind(type_name: &str) -> ColumnKind {
    match type_name {
        "INTEGER" => ColumnKind::Number,
        "REAL" => ColumnKind::Float,
        "BOOLEAN" => ColumnKind::Boolean,
        "DATE" => ColumnKind::Date,
        "DATETIME" | "TIMESTAMP" => ColumnKind::DateTime,
        "BLOB" => ColumnKind::Blob,
        _ => ColumnKind::Text,
    }
}

fn pg_cell(row: &PgRow, idx: usize) -> Option<String> {
    let raw = row.try_get_raw(idx).ok()?;
    if raw.is_null() {
        return None;
    }
    let type_info = raw.type_info().into_owned();
    let decoded = match type_info.name() {
        "BOOL" => row.try_get::<bool, _>(idx).ok().map(|v| v.to_string()),
        "INT2" | "SMALLINT" | "SMALLSERIAL" => {
            row.try_get::<i16, _>(idx).ok().map(|v| v.to_string())
        }
        "INT4" | "INT" | "INTEGER" | "SERIAL" => {
            row.try_get::<i32, _>(idx).ok().map(|v| v.to_string())
        }
        "INT8" | "BIGINT" | "BIGSERIAL" => row.try_get::<i64, _>(idx).ok().map(|v| v.to_string()),
        "FLOAT4" | "REAL" => row.try_get::<f32, _>(idx).ok().map(|v| v.to_string()),
        "FLOAT8" | "DOUBLE PRECISION" => row.try_get::<f64, _>(idx).ok().map(|v| v.to_string()),
        "NUMERIC" | "DECIMAL" => row
            .try_get::<sqlx::types::BigDecimal, _>(idx)
            .ok()
            .map(|v| v.to_string())
            .or_else(|| row.try_get::<f64, _>(idx).ok().map(|v| v.to_string())),
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => row.try_get::<String, _>(idx).ok(),
        "UUID" => row
            .try_get::<sqlx::types::Uuid, _>(idx)
            .ok()
            .map(|v| v.to_string()),
        "DATE" => row
            .try_get::<sqlx::types::chrono::NaiveDate, _>(idx)
            .ok()
            .map(|v| v.to_string()),
        "TIME" | "TIMETZ" => row
            .try_get::<sqlx::types::chrono::NaiveTime, _>(idx)
            .ok()
            .map(|v| v.to_string()),
        "TIMESTAMP" => row
            .try_get::<sqlx::types::chrono::NaiveDateTime, _>(idx)
            .ok()
            .map(|v| v.to_string()),
        "TIMESTAMPTZ" => row
            .try_get::<sqlx::types::chrono::DateTime<sqlx::types::chrono::Utc>, _>(idx)
            .ok()
            .map(|v| v.to_string()),
        "JSON" | "JSONB" => row
            .try_get::<sqlx::types::JsonValue, _>(idx)
            .ok()
            .map(|v| v.to_string()),
        "BYTEA" => row
            .try_get::<Vec<u8>, _>(idx)
            .ok()
            .map(|v| format!("\\x{}", hex::encode(v))),
        _ => None,
    };
    decoded.or_else(|| pg_fallback(row, idx))
}

fn pg_fallback(row: &PgRow, idx: usize) -> Option<String> {
    row.try_get::<String, _>(idx)
        .ok()
        .or_else(|| row.try_get::<i64, _>(idx).ok().map(|v| v.to_string()))
        .or_else(|| row.try_get::<i32, _>(idx).ok().map(|v| v.to_string()))
        .or_else(|| row.try_get::<f64, _>(idx).ok().map(|v| v.to_string()))
        .or_else(|| row.try_get::<bool, _>(idx).ok().map(|v| v.to_string()))
}

fn mysql_cell(row: &MySqlRow, idx: usize) -> Option<String> {
    let raw = row.try_get_raw(idx).ok()?;
    if raw.is_null() {
        return None;
    }
    let type_info = raw.type_info().into_owned();
    let decoded = match type_info.name() {
        "BOOLEAN" | "TINYINT(1)" => row.try_get::<bool, _>(idx).ok().map(|v| v.to_string()),
        "TINYINT" => row.try_get::<i8, _>(idx).ok().map(|v| v.to_string()),
        "SMALLINT" => row.try_get::<i16, _>(idx).ok().map(|v| v.to_string()),
        "INT" | "MEDIUMINT" => row.try_get::<i32, _>(idx).ok().map(|v| v.to_string()),
        "BIGINT" => row.try_get::<i64, _>(idx).ok().map(|v| v.to_string()),
        "TINYINT UNSIGNED" => row.try_get::<u8, _>(idx).ok().map(|v| v.to_string()),
        "SMALLINT UNSIGNED" => row.try_get::<u16, _>(idx).ok().map(|v| v.to_string()),
        "INT UNSIGNED" | "MEDIUMINT UNSIGNED" => {
            row.try_get::<u32, _>(idx).ok().map(|v| v.to_string())
        }
        "BIGINT UNSIGNED" => row.try_get::<u64, _>(idx).ok().map(|v| v.to_string()),
        "FLOAT" => row.try_get::<f32, _>(idx).ok().map(|v| v.to_string()),
        "DOUBLE" => row.try_get::<f64, _>(idx).ok().map(|v| v.to_string()),
        "DECIMAL" => row
            .try_get::<sqlx::types::BigDecimal, _>(idx)
            .ok()
            .map(|v| v.to_string()),
        "VARCHAR" | "CHAR" | "TEXT" | "TINYTEXT" | "MEDIUMTEXT" | "LONGTEXT" | "ENUM" | "SET" => {
            row.try_get::<String, _>(idx).ok()
        }
        "DATE" => row
            .try_get::<sqlx::types::chrono::NaiveDate, _>(idx)
            .ok()
            .map(|v| v.to_string()),
        "TIME" => row
            .try_get::<sqlx::types::chrono::NaiveTime, _>(idx)
            .ok()
            .map(|v| v.to_string()),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<sqlx::types::chrono::NaiveDateTime, _>(idx)
            .ok()
            .map(|v| v.to_string()),
        "JSON" => row
            .try_get::<sqlx::types::JsonValue, _>(idx)
            .ok()
            .map(|v| v.to_string()),
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" => row
            .try_get::<Vec<u8>, _>(idx)
            .ok()
            .map(|v| format!("0x{}", hex::encode(v))),
        _ => None,
    };
    decoded.or_else(|| mysql_fallback(row, idx))
}

fn mysql_fallback(row: &MySqlRow, idx: usize) -> Option<String> {
    row.try_get::<String, _>(idx)
        .ok()
        .or_else(|| row.try_get::<i64, _>(idx).ok().map(|v| v.to_string()))
        .or_else(|| row.try_get::<u64, _>(idx).ok().map(|v| v.to_string()))
        .or_else(|| row.try_get::<f64, _>(idx).ok().map(|v| v.to_string()))
        .or_else(|| row.try_get::<bool, _>(idx).ok().map(|v| v.to_string()))
}

fn sqlite_cell(row: &SqliteRow, idx: usize) -> Option<String> {
    let raw = row.try_get_raw(idx).ok()?;
    if raw.is_null() {
        return None;
    }
    let type_info = raw.type_info().into_owned();
    let decoded = match type_info.name() {
        "INTEGER" => row.try_get::<i64, _>(idx).ok().map(|v| v.to_string()),
        "REAL" => row.try_get::<f64, _>(idx).ok().map(|v| v.to_string()),
        "TEXT" => row.try_get::<String, _>(idx).ok(),
        "BOOLEAN" => row.try_get::<bool, _>(idx).ok().map(|v| v.to_string()),
        "DATE" => row
            .try_get::<sqlx::types::chrono::NaiveDate, _>(idx)
            .ok()
            .map(|v| v.to_string())
            .or_else(|| row.try_get::<String, _>(idx).ok()),
        "DATETIME" | "TIMESTAMP" => row
            .try_get::<sqlx::types::chrono::NaiveDateTime, _>(idx)
            .ok()
            .map(|v| v.to_string())
            .or_else(|| row.try_get::<String, _>(idx).ok()),
        "BLOB" => row
            .try_get::<Vec<u8>, _>(idx)
            .ok()
            .map(|v| format!("X'{}'", hex::encode(v))),
        _ => None,
    };
    decoded.or_else(|| sqlite_fallback(row, idx))
}

fn sqlite_fallback(row: &SqliteRow, idx: usize) -> Option<String> {
    row.try_get::<String, _>(idx)
        .ok()
        .or_else(|| row.try_get::<i64, _>(idx).ok().map(|v| v.to_string()))
        .or_else(|| row.try_get::<f64, _>(idx).ok().map(|v| v.to_string()))
        .or_else(|| row.try_get::<bool, _>(idx).ok().map(|v| v.to_string()))
        .or_else(|| {
            row.try_get::<Vec<u8>, _>(idx)
                .ok()
                .map(|v| format!("X'{}'", hex::encode(v)))
        })
}
