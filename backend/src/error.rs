use thiserror::Error;

/// Error taxonomy for the matching/session core.
///
/// `Validation`, `Conflict`, `Forbidden` and `NotFound` are terminal and
/// surfaced to the caller as-is. `Store` covers network/database failures and
/// is the only retryable variant; nothing in this crate retries automatically,
/// the caller's next interaction does.
#[derive(Debug, Error)]
pub enum ConnectError {
    #[error("invalid input: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(&'static str),

    #[error("forbidden: {0}")]
    Forbidden(&'static str),

    #[error("not found: {0}")]
    NotFound(&'static str),

    #[error("store operation failed: {0}")]
    Store(#[from] anyhow::Error),
}

impl ConnectError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Whether the caller may usefully retry the same operation.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Store(_))
    }
}

impl From<sqlx::Error> for ConnectError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NotFound("row"),
            other => Self::Store(other.into()),
        }
    }
}

pub type ConnectResult<T> = Result<T, ConnectError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_store_errors_are_retryable() {
        assert!(ConnectError::Store(anyhow::anyhow!("connection reset")).is_retryable());
        assert!(!ConnectError::validation("empty nickname").is_retryable());
        assert!(!ConnectError::Conflict("already searching").is_retryable());
        assert!(!ConnectError::NotFound("request").is_retryable());
    }

    #[test]
    fn test_row_not_found_maps_to_not_found() {
        let err: ConnectError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, ConnectError::NotFound(_)));
    }
}
