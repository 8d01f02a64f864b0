pub mod config;
pub mod controller;
pub mod db;
pub mod error;
pub mod importer;
pub mod job;
pub mod manager;
pub mod project;
pub mod storage;

pub use config::{DatabaseConfig, DatabaseVendor, QueryInfo};
pub use controller::ImportController;
pub use db::{ColumnKind, DatabaseConnection, DbColumn, DbRow, QueryBatch, ServerInfo};
pub use error::ConnectorError;
pub use manager::ConnectionManager;
