//! HTTP Download Manager
//!
//! Streams an artifact to the staging directory while hashing it in the
//! same pass. Bytes land in `<staged>.partial` and are renamed into place
//! only once the transfer completed, so a failed download never leaves a
//! half-written artifact at the staged path.

use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use super::component::ComponentId;
use super::error::UpdateError;
use crate::engine::config::UpdateSettings;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Downloading,
    Verifying,
    Installing,
    Complete,
    Error,
}

/// Transfer state of a single artifact. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    pub component: ComponentId,
    pub bytes_downloaded: u64,
    /// Zero when the server did not send a content length
    pub total_bytes: u64,
    pub percent_complete: u8,
    pub speed_mbps: f64,
    pub eta_seconds: u64,
    pub status: DownloadStatus,
    pub error: Option<String>,
}

impl DownloadProgress {
    pub fn new(component: ComponentId) -> Self {
        Self {
            component,
            bytes_downloaded: 0,
            total_bytes: 0,
            percent_complete: 0,
            speed_mbps: 0.0,
            eta_seconds: 0,
            status: DownloadStatus::Downloading,
            error: None,
        }
    }

    /// Update counters from the transfer so far
    pub fn record(&mut self, downloaded: u64, total: u64, elapsed: Duration) {
        self.bytes_downloaded = downloaded;
        self.total_bytes = total;

        if total > 0 {
            self.percent_complete = ((downloaded.min(total) * 100) / total) as u8;
        }

        let secs = elapsed.as_secs_f64();
        if secs > 0.0 {
            let bytes_per_sec = downloaded as f64 / secs;
            self.speed_mbps = bytes_per_sec / BYTES_PER_MB;
            if total > downloaded && bytes_per_sec > 0.0 {
                self.eta_seconds = ((total - downloaded) as f64 / bytes_per_sec).ceil() as u64;
            } else {
                self.eta_seconds = 0;
            }
        }
    }

    pub fn fail(&mut self, error: &UpdateError) {
        self.status = DownloadStatus::Error;
        self.error = Some(error.to_string());
    }
}

/// Result of a completed transfer
#[derive(Debug, Clone)]
pub struct DownloadReport {
    pub path: PathBuf,
    pub bytes_downloaded: u64,
    pub total_bytes: u64,
    pub elapsed: Duration,
    /// SHA-256 of exactly the bytes written to `path`
    pub digest: [u8; 32],
}

impl DownloadReport {
    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }
}

/// Download manager for update artifacts
pub struct Downloader {
    client: reqwest::Client,
}

impl Downloader {
    /// Create a downloader with the long, minutes-scale transfer timeout
    pub fn new(settings: &UpdateSettings) -> Self {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.as_str())
            .timeout(settings.download_timeout())
            .build()
            .unwrap_or_default();
        Self { client }
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Download `url` to `dest`, calling `on_progress(downloaded, total, elapsed)`
    /// after every chunk.
    pub async fn download<F>(
        &self,
        url: &str,
        dest: &Path,
        mut on_progress: F,
    ) -> Result<DownloadReport, UpdateError>
    where
        F: FnMut(u64, u64, Duration),
    {
        info!(url, dest = %dest.display(), "Starting download");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(UpdateError::from_request)?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(UpdateError::HttpStatus {
                status: status.as_u16(),
            });
        }

        let total_bytes = response.content_length().unwrap_or(0);
        debug!(total_bytes, "Download size");

        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent).await?;
        }
        let partial_path = dest.with_extension("partial");
        let file = File::create(&partial_path).await?;

        let started = Instant::now();
        let streamed = stream_to_file(response, file, total_bytes, |downloaded| {
            on_progress(downloaded, total_bytes, started.elapsed())
        })
        .await;

        let (bytes_downloaded, digest) = match streamed {
            Ok(result) => result,
            Err(e) => {
                warn!(error = %e, "Download failed, removing partial file");
                discard(&partial_path).await;
                return Err(e);
            }
        };

        if fs::try_exists(dest).await? {
            fs::remove_file(dest).await?;
        }
        if let Err(e) = fs::rename(&partial_path, dest).await {
            discard(&partial_path).await;
            return Err(e.into());
        }

        let elapsed = started.elapsed();
        info!(
            bytes = bytes_downloaded,
            secs = elapsed.as_secs_f64(),
            "Download complete"
        );

        Ok(DownloadReport {
            path: dest.to_path_buf(),
            bytes_downloaded,
            total_bytes,
            elapsed,
            digest,
        })
    }
}

/// Copy the body into `file`, feeding the hasher with the same chunks.
async fn stream_to_file<F>(
    response: reqwest::Response,
    mut file: File,
    total_bytes: u64,
    mut on_chunk: F,
) -> Result<(u64, [u8; 32]), UpdateError>
where
    F: FnMut(u64),
{
    let mut hasher = Sha256::new();
    let mut downloaded: u64 = 0;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| UpdateError::DownloadInterrupted(e.to_string()))?;
        file.write_all(&chunk)
            .await
            .map_err(|e| UpdateError::DownloadInterrupted(e.to_string()))?;
        hasher.update(&chunk);
        downloaded += chunk.len() as u64;
        on_chunk(downloaded);
    }

    file.flush()
        .await
        .map_err(|e| UpdateError::DownloadInterrupted(e.to_string()))?;
    file.sync_all()
        .await
        .map_err(|e| UpdateError::DownloadInterrupted(e.to_string()))?;

    if total_bytes > 0 && downloaded != total_bytes {
        return Err(UpdateError::DownloadInterrupted(format!(
            "received {} of {} bytes",
            downloaded, total_bytes
        )));
    }

    Ok((downloaded, hasher.finalize().into()))
}

async fn discard(path: &Path) {
    if let Err(e) = fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %e, "Could not remove partial download");
        }
    }
}
