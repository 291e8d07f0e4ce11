//! Download subsystem.
//!
//! A `Downloader` starts a background transfer and hands back a
//! `DownloadHandle` that can be polled for throughput, awaited, or
//! cancelled. Downloads are never resumed: the target file is truncated on
//! every start.

mod config;
mod handle;
mod http;

pub use config::DownloadConfig;
pub use handle::{DownloadContext, DownloadHandle};
pub use http::HttpDownloader;

use std::path::Path;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Errors that can occur during a download.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DownloadError {
    #[error("Request failed: {0}")]
    Request(String),

    #[error("Server returned status {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("I/O error writing {path}: {message}")]
    Io { path: String, message: String },

    #[error("Download cancelled")]
    Cancelled,
}

impl DownloadError {
    pub(crate) fn io(path: &Path, error: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            message: error.to_string(),
        }
    }
}

/// Starts downloads.
pub trait Downloader: Send + Sync {
    /// Starts downloading `url` into `destination` and returns immediately.
    ///
    /// The transfer stops when `scope` (or the returned handle) is cancelled.
    fn start(&self, url: &str, destination: &Path, scope: &CancellationToken) -> DownloadHandle;
}
