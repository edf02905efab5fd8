use thiserror::Error;

/// Domain failures raised by the store layer.
///
/// Store operations return `anyhow::Result`; when a failure is one of these,
/// it is the root cause and can be recovered with [`StoreError::of`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// Rejected before any write: bad category, out-of-range rating, empty field.
    #[error("validation error: {0}")]
    Validation(String),
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    /// A constraint enforced by SQLite itself (CHECK, FOREIGN KEY, NOT NULL).
    #[error("integrity error: {0}")]
    Integrity(String),
}

impl StoreError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    #[must_use]
    pub fn not_found(entity: &'static str, id: i64) -> Self {
        Self::NotFound { entity, id }
    }

    /// Find the `StoreError` at the root of an `anyhow` chain, if there is one.
    #[must_use]
    pub fn of(err: &anyhow::Error) -> Option<&StoreError> {
        err.chain().find_map(|cause| cause.downcast_ref::<StoreError>())
    }

    #[must_use]
    pub fn is_not_found(err: &anyhow::Error) -> bool {
        matches!(Self::of(err), Some(StoreError::NotFound { .. }))
    }
}

/// Turn a rusqlite error into an `anyhow::Error`, classifying constraint
/// violations as [`StoreError::Integrity`].
pub(crate) fn classify(err: rusqlite::Error) -> anyhow::Error {
    match err {
        rusqlite::Error::SqliteFailure(ref e, ref msg)
            if e.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            let detail = msg.clone().unwrap_or_else(|| e.to_string());
            StoreError::Integrity(detail).into()
        }
        other => other.into(),
    }
}
