/// Unified error handling for CogniSpark
///
/// This module provides a centralized error type covering the offline store,
/// the remote request helper and the voice layer. Using `thiserror`, we derive the
/// Error trait and provide clean, descriptive error messages.
///
/// Speech errors normally travel as observable state (see `speech::SpeechError`);
/// the speech variants here are only returned for permission requests and for
/// callers that want to escalate an observed error.

use thiserror::Error;

/// Main error type for all CogniSpark operations
#[derive(Error, Debug)]
pub enum CogniError {
    /// A browser/platform capability is absent (recognition or synthesis)
    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Microphone permission denied or unobtainable
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// The recognition engine threw when asked to start
    #[error("Speech engine failed to start: {0}")]
    EngineStartFailure(String),

    /// Engine-level error code passed through verbatim (`no-speech`, `network`, ...)
    #[error("Speech engine error '{code}': {message}")]
    EngineRuntime { code: String, message: String },

    /// Another connection holds the store locked while an upgrade is needed
    #[error("Storage connection blocked: {0}")]
    StorageConnectionBlocked(String),

    /// Lower-level failure while opening or upgrading the store
    #[error("Storage connection error: {0}")]
    StorageConnectionError(String),

    /// Duplicate primary key or unique index violation
    #[error("Storage constraint violation: {0}")]
    StorageConstraintViolation(String),

    /// Record lookup by primary key found nothing
    #[error("Storage record not found: {0}")]
    StorageNotFound(String),

    /// Other database errors (SQLite operations, row decoding)
    #[error("Database error: {0}")]
    Database(String),

    /// Remote request returned a non-success status
    #[error("Network request failed: {0}")]
    NetworkRequestFailure(String),

    /// Configuration and settings errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors (database directory, settings file)
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Generic errors for edge cases
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CogniError>;

impl From<rusqlite::Error> for CogniError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(ref code, _)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                CogniError::StorageConstraintViolation(err.to_string())
            }
            rusqlite::Error::SqliteFailure(ref code, _)
                if matches!(
                    code.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                CogniError::StorageConnectionBlocked(err.to_string())
            }
            other => CogniError::Database(other.to_string()),
        }
    }
}

/// Helper trait to convert external error types to CogniError
pub trait IntoCogniError<T> {
    fn map_cogni_err<F>(self, f: F) -> Result<T>
    where
        F: FnOnce(String) -> CogniError;
}

impl<T, E: std::fmt::Display> IntoCogniError<T> for std::result::Result<T, E> {
    fn map_cogni_err<F>(self, f: F) -> Result<T>
    where
        F: FnOnce(String) -> CogniError,
    {
        self.map_err(|e| f(e.to_string()))
    }
}

/// Implement Serialize for CogniError so a UI layer can render it
impl serde::Serialize for CogniError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CogniError::StorageNotFound("action a1".to_string());
        assert_eq!(err.to_string(), "Storage record not found: action a1");

        let err = CogniError::EngineRuntime {
            code: "no-speech".to_string(),
            message: "No speech was detected".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Speech engine error 'no-speech': No speech was detected"
        );
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: CogniError = io_err.into();
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_constraint_violation_is_classified() {
        let conn = rusqlite::Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id TEXT PRIMARY KEY); INSERT INTO t VALUES ('a');")
            .unwrap();
        let err: CogniError = conn
            .execute("INSERT INTO t VALUES ('a')", [])
            .unwrap_err()
            .into();
        assert!(matches!(err, CogniError::StorageConstraintViolation(_)));
    }

    #[test]
    fn test_map_cogni_err() {
        let res: std::result::Result<(), &str> = Err("bad port");
        let err = res.map_cogni_err(CogniError::Config).unwrap_err();
        assert_eq!(err.to_string(), "Configuration error: bad port");
    }

    #[test]
    fn test_serialize_as_string() {
        let err = CogniError::NetworkRequestFailure("GET request failed".to_string());
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(json, "\"Network request failed: GET request failed\"");
    }
}
