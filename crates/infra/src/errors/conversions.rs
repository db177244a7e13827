//! Conversions from external error types into [`BooklineError`].
//!
//! External crates cannot implement `From` for `BooklineError` directly
//! (orphan rule), so the infra layer funnels everything through the
//! [`InfraError`] newtype. Call sites write `map_err(InfraError::from)?`
//! and get a correctly classified domain error back.

use bookline_domain::BooklineError;

/// Newtype wrapper that carries a classified domain error across the
/// orphan-rule boundary.
#[derive(Debug)]
pub struct InfraError(pub BooklineError);

impl From<InfraError> for BooklineError {
    fn from(err: InfraError) -> Self {
        err.0
    }
}

impl From<BooklineError> for InfraError {
    fn from(err: BooklineError) -> Self {
        Self(err)
    }
}

impl std::fmt::Display for InfraError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::error::Error for InfraError {}

/// Internal extension trait so each external error gets exactly one
/// classification site.
trait IntoBooklineError {
    fn into_bookline(self) -> BooklineError;
}

/* ---------------------------------------------------------------- */
/* rusqlite                                                         */
/* ---------------------------------------------------------------- */

impl IntoBooklineError for rusqlite::Error {
    fn into_bookline(self) -> BooklineError {
        use rusqlite::ErrorCode;

        match self {
            rusqlite::Error::QueryReturnedNoRows => {
                BooklineError::NotFound("no matching row".into())
            }
            rusqlite::Error::SqliteFailure(e, msg) => {
                let detail = msg.unwrap_or_else(|| e.to_string());
                match (e.code, e.extended_code) {
                    // SQLITE_CONSTRAINT_UNIQUE
                    (ErrorCode::ConstraintViolation, 2067) => {
                        BooklineError::InvalidInput(format!("unique constraint violated: {detail}"))
                    }
                    // SQLITE_CONSTRAINT_FOREIGNKEY
                    (ErrorCode::ConstraintViolation, 787) => {
                        BooklineError::InvalidInput(format!("referenced row missing: {detail}"))
                    }
                    (ErrorCode::ConstraintViolation, _) => {
                        BooklineError::InvalidInput(format!("constraint violated: {detail}"))
                    }
                    (ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked, _) => {
                        BooklineError::Database(format!("database busy: {detail}"))
                    }
                    _ => BooklineError::Database(detail),
                }
            }
            rusqlite::Error::FromSqlConversionFailure(idx, _, err) => {
                BooklineError::Database(format!("column {idx} holds unreadable data: {err}"))
            }
            other => BooklineError::Database(other.to_string()),
        }
    }
}

impl From<rusqlite::Error> for InfraError {
    fn from(err: rusqlite::Error) -> Self {
        Self(err.into_bookline())
    }
}

/* ---------------------------------------------------------------- */
/* r2d2                                                             */
/* ---------------------------------------------------------------- */

impl IntoBooklineError for r2d2::Error {
    fn into_bookline(self) -> BooklineError {
        BooklineError::Database(format!("connection pool exhausted: {self}"))
    }
}

impl From<r2d2::Error> for InfraError {
    fn from(err: r2d2::Error) -> Self {
        Self(err.into_bookline())
    }
}

/* ---------------------------------------------------------------- */
/* reqwest                                                          */
/* ---------------------------------------------------------------- */

impl IntoBooklineError for reqwest::Error {
    fn into_bookline(self) -> BooklineError {
        if self.is_timeout() {
            return BooklineError::Network(format!("request timed out: {self}"));
        }
        if self.is_connect() {
            return BooklineError::Network(format!("connection failed: {self}"));
        }

        if let Some(status) = self.status() {
            return match status.as_u16() {
                401 | 403 => BooklineError::Auth(format!("remote rejected credentials: {self}")),
                404 => BooklineError::NotFound(format!("remote resource missing: {self}")),
                429 => BooklineError::Network(format!("remote rate limit: {self}")),
                400..=499 => BooklineError::InvalidInput(format!("remote rejected request: {self}")),
                500..=599 => BooklineError::Network(format!("remote server error: {self}")),
                _ => BooklineError::Network(self.to_string()),
            };
        }

        BooklineError::Network(self.to_string())
    }
}

impl From<reqwest::Error> for InfraError {
    fn from(err: reqwest::Error) -> Self {
        Self(err.into_bookline())
    }
}

/* ---------------------------------------------------------------- */
/* serde_json / url                                                 */
/* ---------------------------------------------------------------- */

impl IntoBooklineError for serde_json::Error {
    fn into_bookline(self) -> BooklineError {
        BooklineError::Internal(format!("serialization failed: {self}"))
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(err: serde_json::Error) -> Self {
        Self(err.into_bookline())
    }
}

impl IntoBooklineError for url::ParseError {
    fn into_bookline(self) -> BooklineError {
        BooklineError::Config(format!("invalid URL: {self}"))
    }
}

impl From<url::ParseError> for InfraError {
    fn from(err: url::ParseError) -> Self {
        Self(err.into_bookline())
    }
}
