//! Mapping of sqlx / `PostgreSQL` errors onto [`StoreErrorKind`].
//!
//! Classification is on SQLSTATE codes, never on message text.

use seat_arbiter_core::{StoreError, StoreErrorKind};

/// `lock_not_available`, raised by `FOR UPDATE NOWAIT`.
pub const LOCK_NOT_AVAILABLE: &str = "55P03";
/// `serialization_failure`
pub const SERIALIZATION_FAILURE: &str = "40001";
/// `deadlock_detected`
pub const DEADLOCK_DETECTED: &str = "40P01";
/// `unique_violation`
pub const UNIQUE_VIOLATION: &str = "23505";
/// `query_canceled`, raised when `statement_timeout` fires.
pub const QUERY_CANCELED: &str = "57014";

/// Kind for a SQLSTATE code.
#[must_use]
pub fn kind_for_sqlstate(code: &str) -> StoreErrorKind {
    match code {
        LOCK_NOT_AVAILABLE => StoreErrorKind::LockNotAvailable,
        SERIALIZATION_FAILURE => StoreErrorKind::SerializationFailure,
        DEADLOCK_DETECTED => StoreErrorKind::Deadlock,
        UNIQUE_VIOLATION => StoreErrorKind::UniqueViolation,
        QUERY_CANCELED => StoreErrorKind::Timeout,
        // Class 08: connection exception
        c if c.starts_with("08") => StoreErrorKind::Connection,
        _ => StoreErrorKind::Database,
    }
}

/// Kind for any sqlx error.
#[must_use]
pub fn classify(err: &sqlx::Error) -> StoreErrorKind {
    match err {
        sqlx::Error::Database(db_err) => db_err
            .code()
            .as_deref()
            .map_or(StoreErrorKind::Database, kind_for_sqlstate),
        sqlx::Error::PoolTimedOut => StoreErrorKind::Timeout,
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed => {
            StoreErrorKind::Connection
        }
        _ => StoreErrorKind::Database,
    }
}

/// Wrap a sqlx error with what was being done.
#[must_use]
pub fn store_error(context: &str, err: &sqlx::Error) -> StoreError {
    StoreError::new(classify(err), format!("{context}: {err}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contention_codes() {
        assert_eq!(kind_for_sqlstate("55P03"), StoreErrorKind::LockNotAvailable);
        assert_eq!(kind_for_sqlstate("40001"), StoreErrorKind::SerializationFailure);
        assert_eq!(kind_for_sqlstate("40P01"), StoreErrorKind::Deadlock);
    }

    #[test]
    fn test_other_codes() {
        assert_eq!(kind_for_sqlstate("23505"), StoreErrorKind::UniqueViolation);
        assert_eq!(kind_for_sqlstate("57014"), StoreErrorKind::Timeout);
        assert_eq!(kind_for_sqlstate("08006"), StoreErrorKind::Connection);
        assert_eq!(kind_for_sqlstate("42P01"), StoreErrorKind::Database);
        assert_eq!(kind_for_sqlstate("23503"), StoreErrorKind::Database);
    }

    #[test]
    fn test_non_database_errors() {
        assert_eq!(classify(&sqlx::Error::PoolTimedOut), StoreErrorKind::Timeout);
        assert_eq!(classify(&sqlx::Error::PoolClosed), StoreErrorKind::Connection);
        assert_eq!(classify(&sqlx::Error::RowNotFound), StoreErrorKind::Database);

        let err = store_error("begin", &sqlx::Error::PoolTimedOut);
        assert_eq!(err.kind, StoreErrorKind::Timeout);
        assert!(err.message.starts_with("begin: "));
    }
}
