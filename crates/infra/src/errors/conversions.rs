//! Conversions from external infrastructure errors into domain errors.

use crawlsync_domain::CrawlSyncError;
use reqwest::Error as HttpError;
use rusqlite::Error as SqlError;

/// Error newtype that keeps conversions on the infrastructure side and can be
/// converted back into the domain error.
#[derive(Debug)]
pub struct InfraError(pub CrawlSyncError);

impl From<InfraError> for CrawlSyncError {
    fn from(value: InfraError) -> Self {
        value.0
    }
}

impl From<CrawlSyncError> for InfraError {
    fn from(value: CrawlSyncError) -> Self {
        Self(value)
    }
}

/// Extension trait to make the conversion logic explicit in tests and within
/// this module.
trait IntoCrawlSyncError {
    fn into_crawlsync(self) -> CrawlSyncError;
}

/* -------------------------------------------------------------------------- */
/* rusqlite::Error → CrawlSyncError */
/* -------------------------------------------------------------------------- */

impl IntoCrawlSyncError for SqlError {
    fn into_crawlsync(self) -> CrawlSyncError {
        use rusqlite::ffi::ErrorCode;
        use rusqlite::Error as RE;

        match self {
            RE::SqliteFailure(err, maybe_message) => {
                let message = maybe_message.unwrap_or_default();
                match (err.code, err.extended_code) {
                    (ErrorCode::DatabaseBusy, _) => {
                        CrawlSyncError::Database("database is busy".into())
                    }
                    (ErrorCode::DatabaseLocked, _) => {
                        CrawlSyncError::Database("database is locked".into())
                    }
                    (ErrorCode::ConstraintViolation, 2067 | 1555) => {
                        CrawlSyncError::Database("unique constraint violation".into())
                    }
                    (ErrorCode::ConstraintViolation, 1299) => {
                        CrawlSyncError::Database("not null constraint violation".into())
                    }
                    _ => CrawlSyncError::Database(format!(
                        "sqlite failure {:?} (code {}): {}",
                        err.code, err.extended_code, message
                    )),
                }
            }
            RE::QueryReturnedNoRows => CrawlSyncError::NotFound("no rows returned by query".into()),
            RE::FromSqlConversionFailure(_, _, cause) => {
                CrawlSyncError::Database(format!("failed to convert sqlite value: {cause}"))
            }
            RE::InvalidColumnType(_, _, ty) => {
                CrawlSyncError::Database(format!("invalid column type: {ty}"))
            }
            RE::Utf8Error(_) => {
                CrawlSyncError::Database("invalid UTF-8 returned from sqlite".into())
            }
            RE::InvalidParameterName(parameter_name) => {
                CrawlSyncError::Database(format!("invalid parameter name: {parameter_name}"))
            }
            RE::InvalidPath(path) => CrawlSyncError::Database(format!(
                "invalid database path: {}",
                path.to_string_lossy()
            )),
            RE::InvalidQuery => CrawlSyncError::Database("invalid SQL query".into()),
            other => CrawlSyncError::Database(other.to_string()),
        }
    }
}

impl From<SqlError> for InfraError {
    fn from(value: SqlError) -> Self {
        Self(value.into_crawlsync())
    }
}

/* -------------------------------------------------------------------------- */
/* r2d2::Error → CrawlSyncError */
/* -------------------------------------------------------------------------- */

impl IntoCrawlSyncError for r2d2::Error {
    fn into_crawlsync(self) -> CrawlSyncError {
        CrawlSyncError::Database(format!("connection pool error: {self}"))
    }
}

impl From<r2d2::Error> for InfraError {
    fn from(value: r2d2::Error) -> Self {
        Self(value.into_crawlsync())
    }
}

/* -------------------------------------------------------------------------- */
/* reqwest::Error → CrawlSyncError */
/* -------------------------------------------------------------------------- */

impl IntoCrawlSyncError for HttpError {
    fn into_crawlsync(self) -> CrawlSyncError {
        if self.is_timeout() {
            return CrawlSyncError::Network("HTTP request timed out".into());
        }

        if self.is_connect() {
            return CrawlSyncError::Network("HTTP connection failure".into());
        }

        if self.is_decode() {
            return CrawlSyncError::Serialization(format!("HTTP body could not be decoded: {self}"));
        }

        if let Some(status) = self.status() {
            let code = status.as_u16();
            let message =
                format!("HTTP {} {}", code, status.canonical_reason().unwrap_or("unknown status"));

            return match code {
                401 | 403 => CrawlSyncError::Auth(message),
                404 => CrawlSyncError::NotFound(message),
                400..=499 if code != 429 => CrawlSyncError::InvalidInput(message),
                _ => CrawlSyncError::Network(message),
            };
        }

        if self.is_builder() {
            return CrawlSyncError::InvalidInput(format!("invalid HTTP request: {self}"));
        }

        CrawlSyncError::Network(self.to_string())
    }
}

impl From<HttpError> for InfraError {
    fn from(value: HttpError) -> Self {
        Self(value.into_crawlsync())
    }
}

/* -------------------------------------------------------------------------- */
/* Tests */
/* -------------------------------------------------------------------------- */
