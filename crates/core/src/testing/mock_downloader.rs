//! Mock downloader for testing.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::download::{DownloadError, DownloadHandle, Downloader};

#[derive(Debug, Default)]
struct State {
    payloads: HashMap<String, Vec<u8>>,
    started: Vec<String>,
    handles: Vec<DownloadHandle>,
}

/// Mock implementation of the Downloader trait.
///
/// Serves registered payloads by URL, writing them to the destination after
/// an optional delay. Unknown URLs fail with a 404 status.
#[derive(Debug, Clone, Default)]
pub struct MockDownloader {
    state: Arc<Mutex<State>>,
    delay: Duration,
}

impl MockDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every transfer sleeps this long before writing.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers the bytes served for `url`.
    pub fn serve(&self, url: &str, payload: Vec<u8>) {
        self.state().payloads.insert(url.to_string(), payload);
    }

    /// URLs of all started downloads, in order.
    pub fn started(&self) -> Vec<String> {
        self.state().started.clone()
    }

    /// Handles of all started downloads, in order.
    pub fn handles(&self) -> Vec<DownloadHandle> {
        self.state().handles.clone()
    }
}

impl Downloader for MockDownloader {
    fn start(&self, url: &str, destination: &Path, scope: &CancellationToken) -> DownloadHandle {
        let payload = self.state().payloads.get(url).cloned();
        let delay = self.delay;

        let handle = DownloadHandle::spawn(url, destination, scope, move |ctx| async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let Some(payload) = payload else {
                return Err(DownloadError::Status {
                    url: ctx.url().to_string(),
                    status: 404,
                });
            };
            tokio::fs::write(ctx.destination(), &payload)
                .await
                .map_err(|e| DownloadError::io(ctx.destination(), e))?;
            ctx.add_bytes(payload.len() as u64);
            Ok(payload.len() as u64)
        });

        let mut state = self.state();
        state.started.push(url.to_string());
        state.handles.push(handle.clone());
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_serves_registered_payload() {
        let dir = TempDir::new().unwrap();
        let downloader = MockDownloader::new();
        downloader.serve("mock://a.zip", b"abc".to_vec());

        let target = dir.path().join("a.zip");
        let handle = downloader.start("mock://a.zip", &target, &CancellationToken::new());

        assert_eq!(handle.wait().await, Ok(3));
        assert_eq!(std::fs::read(&target).unwrap(), b"abc");
        assert_eq!(downloader.started(), vec!["mock://a.zip".to_string()]);
    }

    #[tokio::test]
    async fn test_unknown_url_is_not_found() {
        let dir = TempDir::new().unwrap();
        let downloader = MockDownloader::new();
        let handle = downloader.start(
            "mock://missing.zip",
            &dir.path().join("m.zip"),
            &CancellationToken::new(),
        );
        assert!(matches!(
            handle.wait().await,
            Err(DownloadError::Status { status: 404, .. })
        ));
    }
}
