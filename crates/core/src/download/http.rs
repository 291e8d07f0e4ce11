//! HTTP downloader built on reqwest.

use std::path::Path;
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::config::DownloadConfig;
use super::handle::{DownloadContext, DownloadHandle};
use super::{DownloadError, Downloader};
use crate::metrics;

/// Streams archives over HTTP(S) into local files.
#[derive(Clone)]
pub struct HttpDownloader {
    client: reqwest::Client,
}

impl HttpDownloader {
    pub fn new(config: &DownloadConfig) -> Result<Self, DownloadError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| DownloadError::Request(e.to_string()))?;
        Ok(Self { client })
    }

    async fn transfer(client: reqwest::Client, ctx: DownloadContext) -> Result<u64, DownloadError> {
        let url = ctx.url().to_string();
        let destination = ctx.destination().to_path_buf();

        let mut response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| DownloadError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url,
                status: status.as_u16(),
            });
        }

        // Always start from scratch; partial files are never resumed.
        let file = File::create(&destination)
            .await
            .map_err(|e| DownloadError::io(&destination, e))?;
        let mut writer = BufWriter::new(file);
        let mut total = 0u64;

        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| DownloadError::Request(e.to_string()))?
        {
            if ctx.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| DownloadError::io(&destination, e))?;
            total += chunk.len() as u64;
            ctx.add_bytes(chunk.len() as u64);
            metrics::DOWNLOAD_BYTES.inc_by(chunk.len() as u64);
        }

        writer
            .flush()
            .await
            .map_err(|e| DownloadError::io(&destination, e))?;

        info!("Downloaded {} bytes from {} to {:?}", total, url, destination);
        Ok(total)
    }
}

impl Downloader for HttpDownloader {
    fn start(&self, url: &str, destination: &Path, scope: &CancellationToken) -> DownloadHandle {
        debug!("Starting download of {} into {:?}", url, destination);
        let client = self.client.clone();
        DownloadHandle::spawn(url, destination, scope, move |ctx| {
            Self::transfer(client, ctx)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builds_with_default_config() {
        assert!(HttpDownloader::new(&DownloadConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_host_reports_request_error() {
        let temp = TempDir::new().unwrap();
        let downloader = HttpDownloader::new(&DownloadConfig {
            connect_timeout_secs: 1,
            ..Default::default()
        })
        .unwrap();

        let handle = downloader.start(
            "http://127.0.0.1:9/archive.zip",
            &temp.path().join("archive.zip"),
            &CancellationToken::new(),
        );

        let err = handle.wait().await.unwrap_err();
        assert!(matches!(err, DownloadError::Request(_)));
        assert!(!temp.path().join("archive.zip").exists());
    }
}
