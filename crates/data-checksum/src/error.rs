//! Error types for the checksum library.

use thiserror::Error;

/// Main error type for checksum operations.
///
/// A data mismatch is never an error: unequal chunks and tables are reported
/// through result types. Errors here mean a comparison could not be computed.
#[derive(Error, Debug)]
pub enum ChecksumError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Database query or connection error reported by the driver
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// Schema metadata could not be read or is unusable
    #[error("Schema error for table {table}: {message}")]
    Schema { table: String, message: String },

    /// Table has no unique index usable for chunking
    #[error("Table {0} has no unique key - chunked comparison requires a unique, non-nullable key")]
    NoUniqueKey(String),

    /// Best unique index contains a nullable column
    #[error("Table {table} got unique key {index} with nullable columns - cannot be used for chunking")]
    NullableUniqueKey { table: String, index: String },

    /// A query returned a result the engine cannot interpret
    #[error("Query failed for table {table}: {message}")]
    Query { table: String, message: String },

    /// Job tracker error
    #[error("Tracking error: {0}")]
    Tracking(String),

    /// Config hash mismatch on resume
    #[error("Config has changed since the job was started - cannot resume. Start a new job instead.")]
    ConfigChanged,

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid table name pattern
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    /// Run was cancelled (SIGINT, etc.)
    #[error("Checksum run cancelled")]
    Cancelled,
}

pub const EXIT_CONFIG_ERROR: u8 = 1;
pub const EXIT_DATABASE_ERROR: u8 = 2;
pub const EXIT_SCHEMA_ERROR: u8 = 3;
pub const EXIT_TRACKING_ERROR: u8 = 5;
pub const EXIT_IO_ERROR: u8 = 7;
pub const EXIT_CANCELLED: u8 = 130;

impl ChecksumError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl std::fmt::Display, context: impl Into<String>) -> Self {
        ChecksumError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create a Schema error
    pub fn schema(table: impl Into<String>, message: impl Into<String>) -> Self {
        ChecksumError::Schema {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Query error
    pub fn query(table: impl Into<String>, message: impl Into<String>) -> Self {
        ChecksumError::Query {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create a Tracking error from any displayable cause
    pub fn tracking(message: impl std::fmt::Display, context: &str) -> Self {
        ChecksumError::Tracking(format!("{}: {}", context, message))
    }

    /// Errors that make one table pair unusable without affecting the others.
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            ChecksumError::Schema { .. }
                | ChecksumError::NoUniqueKey(_)
                | ChecksumError::NullableUniqueKey { .. }
        )
    }

    /// Errors worth retrying at the table-pair level (network, timeouts, lock waits).
    pub fn is_transient(&self) -> bool {
        matches!(self, ChecksumError::Database(_) | ChecksumError::Pool { .. })
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            ChecksumError::Config(_)
            | ChecksumError::ConfigChanged
            | ChecksumError::Yaml(_)
            | ChecksumError::Json(_)
            | ChecksumError::Regex(_) => EXIT_CONFIG_ERROR,
            ChecksumError::Database(_) | ChecksumError::Pool { .. } | ChecksumError::Query { .. } => {
                EXIT_DATABASE_ERROR
            }
            ChecksumError::Schema { .. }
            | ChecksumError::NoUniqueKey(_)
            | ChecksumError::NullableUniqueKey { .. } => EXIT_SCHEMA_ERROR,
            ChecksumError::Tracking(_) => EXIT_TRACKING_ERROR,
            ChecksumError::Io(_) => EXIT_IO_ERROR,
            ChecksumError::Cancelled => EXIT_CANCELLED,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for checksum operations.
pub type Result<T> = std::result::Result<T, ChecksumError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_errors_are_classified() {
        assert!(ChecksumError::NoUniqueKey("db.t".into()).is_schema_error());
        assert!(ChecksumError::NullableUniqueKey {
            table: "db.t".into(),
            index: "uk".into()
        }
        .is_schema_error());
        assert!(ChecksumError::schema("db.t", "no columns").is_schema_error());
        assert!(!ChecksumError::Cancelled.is_schema_error());
    }

    #[test]
    fn test_transient_errors() {
        assert!(ChecksumError::pool("timeout", "acquiring connection").is_transient());
        assert!(!ChecksumError::query("db.t", "bad arity").is_transient());
        assert!(!ChecksumError::Config("x".into()).is_transient());
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ChecksumError::Config("x".into()).exit_code(), EXIT_CONFIG_ERROR);
        assert_eq!(
            ChecksumError::Io(std::io::Error::new(std::io::ErrorKind::NotFound, "x")).exit_code(),
            EXIT_IO_ERROR
        );
        assert_eq!(ChecksumError::NoUniqueKey("t".into()).exit_code(), EXIT_SCHEMA_ERROR);
        assert_eq!(ChecksumError::Cancelled.exit_code(), EXIT_CANCELLED);
    }

    #[test]
    fn test_format_detailed_includes_message() {
        let err = ChecksumError::pool("connection refused", "creating source pool");
        let detailed = err.format_detailed();
        assert!(detailed.contains("connection refused"));
        assert!(detailed.contains("creating source pool"));
    }
}
