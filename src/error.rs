use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConnectorError {
    /// Error reported by the database server itself. `sqlstate` carries the
    /// SQLSTATE and `code` the vendor's numeric error code, where the driver
    /// exposes them.
    #[error("database error: {message}")]
    Service {
        sqlstate: Option<String>,
        code: Option<i64>,
        message: String,
    },

    #[error("connection error: {0}")]
    Connection(String),

    #[error("{0} is not a supported database type")]
    UnsupportedVendor(String),

    #[error("missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("invalid value for parameter: {0}")]
    InvalidParameter(&'static str),

    #[error("invalid import options: {0}")]
    InvalidOptions(String),

    #[error("no such import job: {0}")]
    NoSuchJob(String),

    #[error("storage error: {0}")]
    Storage(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<sqlx::Error> for ConnectorError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db) => {
                // Only the MySQL driver carries a numeric error code;
                // PostgreSQL and SQLite report through the SQLSTATE string.
                let code = db
                    .try_downcast_ref::<sqlx::mysql::MySqlDatabaseError>()
                    .map(|e| i64::from(e.number()));
                Self::Service {
                    sqlstate: db.code().map(|c| c.to_string()),
                    code,
                    message: db.message().to_string(),
                }
            }
            other => Self::Connection(other.to_string()),
        }
    }
}
