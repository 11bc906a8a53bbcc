use rusqlite;
use serde_json::Value as JsonValue;
use thiserror::Error;
use tracing::{error, warn};

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
        details: Option<JsonValue>,
    },

    #[error("authentication required: {message}")]
    AuthenticationRequired { message: String },

    #[error("remote {operation} timed out after {timeout_ms} ms")]
    RemoteTimeout {
        operation: String,
        timeout_ms: u64,
    },

    #[error("duplicate record: {message}")]
    DuplicateConflict { message: String },

    #[error("remote persistence failed: {message}")]
    PersistenceFailure {
        status: Option<u16>,
        message: String,
    },

    #[error("database error: {message}")]
    Database { message: String },

    #[error("record not found")]
    NotFound,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::validation", %message, "validation error");
        AppError::Validation {
            message,
            source: None,
            details: None,
        }
    }

    pub fn validation_with_details(message: impl Into<String>, details: JsonValue) -> Self {
        let message = message.into();
        warn!(
            target: "app::validation",
            %message,
            details = %details,
            "validation error with details"
        );
        AppError::Validation {
            message,
            source: None,
            details: Some(details),
        }
    }

    pub fn authentication_required(message: impl Into<String>) -> Self {
        let message = message.into();
        warn!(target: "app::auth", %message, "authentication required");
        AppError::AuthenticationRequired { message }
    }

    pub fn remote_timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        let operation = operation.into();
        let timeout_ms = timeout.as_millis() as u64;
        warn!(target: "app::remote", %operation, timeout_ms, "remote call timed out");
        AppError::RemoteTimeout {
            operation,
            timeout_ms,
        }
    }

    pub fn duplicate_conflict(message: impl Into<String>) -> Self {
        let message = message.into();
        // Expected on same-day retakes; callers recover by updating.
        warn!(target: "app::conflict", %message, "duplicate key conflict");
        AppError::DuplicateConflict { message }
    }

    pub fn persistence_failure(status: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::remote", status = ?status, %message, "remote persistence failure");
        AppError::PersistenceFailure { status, message }
    }

    pub fn not_found() -> Self {
        warn!(target: "app::database", "resource not found");
        AppError::NotFound
    }

    pub fn database(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::database", %message, "database error");
        AppError::Database { message }
    }

    pub fn other(message: impl Into<String>) -> Self {
        let message = message.into();
        error!(target: "app::other", %message, "other error");
        AppError::Other(message)
    }

    pub fn is_duplicate_conflict(&self) -> bool {
        matches!(self, AppError::DuplicateConflict { .. })
    }

    pub fn is_authentication_required(&self) -> bool {
        matches!(self, AppError::AuthenticationRequired { .. })
    }

    pub fn is_remote_timeout(&self) -> bool {
        matches!(self, AppError::RemoteTimeout { .. })
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(error: rusqlite::Error) -> Self {
        use rusqlite::Error::{QueryReturnedNoRows, SqliteFailure};
        use rusqlite::ErrorCode;

        match &error {
            QueryReturnedNoRows => AppError::not_found(),
            SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
                AppError::duplicate_conflict("unique or check constraint violated")
            }
            _ => {
                error!(target: "app::database", error = ?error, "sqlite error");
                AppError::database(error.to_string())
            }
        }
    }
}
