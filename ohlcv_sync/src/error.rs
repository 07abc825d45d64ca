//! Error type shared by every engine component.

use market_data_ingestor::providers::ProviderError;
use thiserror::Error;

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures of normalization, key resolution, and store interaction.
#[derive(Debug, Error)]
pub enum Error {
    /// The store could not be reached.
    #[error("store unreachable: {message}")]
    Connection { message: String },

    /// A bar field is missing or cannot be coerced into its schema type.
    #[error("field `{field}`: {reason}")]
    SchemaMismatch { field: String, reason: String },

    /// A batch was aborted because one of its rows failed to normalize.
    #[error("{key}: row {row} rejected: {source}")]
    RowRejected {
        key: String,
        row: usize,
        #[source]
        source: Box<Error>,
    },

    /// The timeframe string does not match `<positive integer><unit>`.
    #[error("invalid timeframe {spec:?}: {reason}")]
    InvalidTimeframe { spec: String, reason: String },

    /// Invalid schema declaration, or record bytes that do not fit a schema.
    #[error("record layout: {message}")]
    RecordLayout { message: String },

    #[error("{key}: write failed: {message}")]
    StoreWrite { key: String, message: String },

    #[error("{key}: destroy failed: {message}")]
    StoreDestroy { key: String, message: String },

    #[error("{key}: query failed: {message}")]
    StoreQuery { key: String, message: String },

    /// The series was destroyed during a trim but the retained tail was not
    /// written back.
    #[error("{key}: trim left the series destroyed and not rewritten: {source}")]
    TrimDegraded {
        key: String,
        #[source]
        source: Box<Error>,
    },

    /// The market-data feed failed for one (symbol, timeframe) pair.
    #[error("feed request for {symbol}/{timeframe} failed: {source}")]
    Feed {
        symbol: String,
        timeframe: String,
        #[source]
        source: ProviderError,
    },
}

impl Error {
    /// Whether a store call that failed with this error may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Connection { .. } | Error::StoreWrite { .. })
    }

    pub(crate) fn layout(message: impl Into<String>) -> Self {
        Error::RecordLayout {
            message: message.into(),
        }
    }

    pub(crate) fn mismatch(field: &str, reason: impl Into<String>) -> Self {
        Error::SchemaMismatch {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_connection_and_write_failures_retry() {
        assert!(
            Error::Connection {
                message: "refused".into()
            }
            .is_retryable()
        );
        assert!(
            Error::StoreWrite {
                key: "A/1D/OHLCV".into(),
                message: "busy".into()
            }
            .is_retryable()
        );
        assert!(!Error::mismatch("Open", "missing").is_retryable());
        assert!(
            !Error::StoreQuery {
                key: "A/1D/OHLCV".into(),
                message: "x".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn row_rejection_names_key_and_position() {
        let err = Error::RowRejected {
            key: "SPY/1D/OHLCV".into(),
            row: 3,
            source: Box::new(Error::mismatch("Volume", "not integral")),
        };
        let msg = err.to_string();
        assert!(msg.contains("SPY/1D/OHLCV"));
        assert!(msg.contains("row 3"));
    }
}
