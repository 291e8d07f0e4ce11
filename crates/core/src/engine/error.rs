//! Error type for transform handles.

use std::path::Path;

use thiserror::Error;

use crate::config::ConfigError;
use crate::download::DownloadError;
use crate::store::RepositoryError;
use crate::vendor::ProviderError;

/// Terminal error of a transform handle.
///
/// `EmptyQueue` is not a failure: it tells the queue manager that a work
/// class has nothing left to issue.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransformError {
    #[error("No eligible order in queue")]
    EmptyQueue,

    #[error("Transform failed: {0}")]
    Transform(String),

    #[error("Source not found: {0}")]
    SourceNotFound(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("File system error: {0}")]
    FileSystem(String),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Transform cancelled")]
    Cancelled,
}

impl TransformError {
    pub fn is_empty_queue(&self) -> bool {
        matches!(self, TransformError::EmptyQueue)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TransformError::Cancelled)
    }

    /// Short label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            TransformError::EmptyQueue => "empty_queue",
            TransformError::Transform(_) => "transform",
            TransformError::SourceNotFound(_) => "source_not_found",
            TransformError::Parse(_) => "parse",
            TransformError::FileSystem(_) => "file_system",
            TransformError::Service(_) => "service",
            TransformError::Store(_) => "store",
            TransformError::Cancelled => "cancelled",
        }
    }

    pub(crate) fn fs(op: &str, path: &Path, error: std::io::Error) -> Self {
        TransformError::FileSystem(format!("{} {}: {}", op, path.display(), error))
    }
}

impl From<ProviderError> for TransformError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Cancelled => TransformError::Cancelled,
            other => TransformError::Service(other.to_string()),
        }
    }
}

impl From<RepositoryError> for TransformError {
    fn from(err: RepositoryError) -> Self {
        TransformError::Store(err.to_string())
    }
}

impl From<DownloadError> for TransformError {
    fn from(err: DownloadError) -> Self {
        match err {
            DownloadError::Cancelled => TransformError::Cancelled,
            DownloadError::Io { .. } => TransformError::FileSystem(err.to_string()),
            other => TransformError::Service(other.to_string()),
        }
    }
}

impl From<ConfigError> for TransformError {
    fn from(err: ConfigError) -> Self {
        TransformError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversions() {
        assert_eq!(
            TransformError::from(ProviderError::Cancelled),
            TransformError::Cancelled
        );
        assert!(matches!(
            TransformError::from(ProviderError::ApiError("boom".into())),
            TransformError::Service(_)
        ));
        assert_eq!(
            TransformError::from(DownloadError::Cancelled),
            TransformError::Cancelled
        );
        assert!(matches!(
            TransformError::from(DownloadError::Io {
                path: "/w/1.zip".into(),
                message: "disk full".into()
            }),
            TransformError::FileSystem(_)
        ));
        assert!(matches!(
            TransformError::from(RepositoryError::Closed),
            TransformError::Store(_)
        ));
    }

    #[test]
    fn test_kind_labels() {
        assert_eq!(TransformError::EmptyQueue.kind(), "empty_queue");
        assert!(TransformError::EmptyQueue.is_empty_queue());
        assert!(TransformError::Cancelled.is_cancelled());
        assert_eq!(TransformError::Parse("x".into()).kind(), "parse");
    }
}
