//! Handle to a running download.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::DownloadError;

type Outcome = Option<Result<u64, DownloadError>>;

/// What a transfer future gets to work with.
pub struct DownloadContext {
    url: String,
    destination: PathBuf,
    cancel: CancellationToken,
    transferred: Arc<AtomicU64>,
}

impl DownloadContext {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Records `bytes` more bytes written to the destination.
    pub fn add_bytes(&self, bytes: u64) {
        self.transferred.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

struct Inner {
    url: String,
    destination: PathBuf,
    cancel: CancellationToken,
    transferred: Arc<AtomicU64>,
    started: Instant,
    outcome: watch::Receiver<Outcome>,
}

/// A download running on its own task.
///
/// Cheap to clone; all clones observe the same transfer.
#[derive(Clone)]
pub struct DownloadHandle {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for DownloadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DownloadHandle")
            .field("url", &self.inner.url)
            .field("destination", &self.inner.destination)
            .field("complete", &self.is_complete())
            .finish()
    }
}

impl DownloadHandle {
    /// Spawns `transfer` on the runtime.
    ///
    /// The transfer is dropped as soon as the handle's token (a child of
    /// `scope`) is cancelled, and the outcome becomes `Cancelled`.
    pub fn spawn<F, Fut>(url: &str, destination: &Path, scope: &CancellationToken, transfer: F) -> Self
    where
        F: FnOnce(DownloadContext) -> Fut,
        Fut: Future<Output = Result<u64, DownloadError>> + Send + 'static,
    {
        let cancel = scope.child_token();
        let transferred = Arc::new(AtomicU64::new(0));
        let (outcome_tx, outcome_rx) = watch::channel(None);

        let fut = transfer(DownloadContext {
            url: url.to_string(),
            destination: destination.to_path_buf(),
            cancel: cancel.clone(),
            transferred: Arc::clone(&transferred),
        });

        let token = cancel.clone();
        tokio::spawn(async move {
            let outcome = tokio::select! {
                biased;
                _ = token.cancelled() => Err(DownloadError::Cancelled),
                result = fut => result,
            };
            let _ = outcome_tx.send(Some(outcome));
        });

        Self {
            inner: Arc::new(Inner {
                url: url.to_string(),
                destination: destination.to_path_buf(),
                cancel,
                transferred,
                started: Instant::now(),
                outcome: outcome_rx,
            }),
        }
    }

    pub fn url(&self) -> &str {
        &self.inner.url
    }

    pub fn destination(&self) -> &Path {
        &self.inner.destination
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.inner.transferred.load(Ordering::Relaxed)
    }

    /// Average throughput since the download started.
    pub fn bytes_per_second(&self) -> u64 {
        let elapsed = self.inner.started.elapsed().as_secs_f64();
        if elapsed <= f64::EPSILON {
            return 0;
        }
        (self.bytes_transferred() as f64 / elapsed) as u64
    }

    pub fn is_complete(&self) -> bool {
        self.inner.outcome.borrow().is_some()
    }

    /// Waits for the transfer to finish and returns the byte count.
    pub async fn wait(&self) -> Result<u64, DownloadError> {
        let mut outcome = self.inner.outcome.clone();
        let result = match outcome.wait_for(Option::is_some).await {
            Ok(value) => value.clone().unwrap_or(Err(DownloadError::Cancelled)),
            // The task went away without reporting (runtime shutdown).
            Err(_) => Err(DownloadError::Cancelled),
        };
        result
    }

    /// Cancels the transfer and waits until it has stopped.
    pub async fn cancel(&self) {
        self.inner.cancel.cancel();
        let _ = self.wait().await;
    }
}
