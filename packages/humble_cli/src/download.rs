use crate::config::Settings;

use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use reqwest::header::{CONTENT_LENGTH, RANGE};
use reqwest::{Client, Response, StatusCode};
use std::io;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

/// Size of the write buffer between the network stream and the file
pub const CHUNK_SIZE: usize = 32 * 1024;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, including the first one
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        Self {
            attempts: settings.retry_attempts.max(1),
            delay: settings.retry_delay(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("server answered with status {0}")]
    Status(StatusCode),

    #[error("transfer error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("download failed after {attempts} attempt(s): {source}")]
    Failed {
        attempts: u32,
        #[source]
        source: Box<DownloadError>,
    },
}

impl DownloadError {
    /// Whether another attempt may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status(status) => status_is_retryable(*status),
            Self::Transport(e) => match e.status() {
                Some(status) => status_is_retryable(status),
                None => !e.is_builder(),
            },
            Self::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::Interrupted
                    | io::ErrorKind::TimedOut
                    | io::ErrorKind::WouldBlock
                    | io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
                    | io::ErrorKind::BrokenPipe
            ),
            Self::Failed { .. } => false,
        }
    }
}

fn status_is_retryable(status: StatusCode) -> bool {
    !status.is_client_error()
        || matches!(
            status,
            StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS
        )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The local file was already complete
    Skipped,
    /// `bytes` were written by the successful attempt
    Completed { bytes: u64 },
}

/// Transfers remote files to disk, resuming partial files and retrying failures
#[derive(Debug, Clone)]
pub struct Downloader {
    client: Client,
    policy: RetryPolicy,
    size_timeout: Duration,
}

impl Downloader {
    /// Creates a downloader
    ///
    /// # Arguments
    /// * `settings` - Read timeout, size lookup timeout and retry policy
    pub fn new(settings: &Settings) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .read_timeout(settings.download_read_timeout())
            .build()?;
        Ok(Self {
            client,
            policy: RetryPolicy::from_settings(settings),
            size_timeout: settings.size_timeout(),
        })
    }

    /// Downloads `url` into `path`, resuming a partial file
    ///
    /// # Arguments
    /// * `url` - Remote file
    /// * `path` - Local file, created if missing
    /// * `label` - Name shown next to the progress bar
    /// * `expected_size` - Size of the complete file; 0 means unknown and is looked up first
    ///
    /// # Returns
    /// Whether the file was already complete or how many bytes were written.
    /// Partial files are left in place on failure so a later call can resume them.
    pub async fn download(
        &self,
        url: &str,
        path: &Path,
        label: &str,
        expected_size: u64,
    ) -> Result<DownloadOutcome, DownloadError> {
        let expected_size = match expected_size {
            0 => self.lookup_size(url).await.unwrap_or(0),
            n => n,
        };

        let mut attempt = 1;
        loop {
            match self.try_download(url, path, label, expected_size).await {
                Ok(outcome) => return Ok(outcome),
                Err(e) if e.is_retryable() && attempt < self.policy.attempts => {
                    warn!(
                        "Attempt {}/{} for '{}' failed: {}",
                        attempt, self.policy.attempts, label, e
                    );
                    println!("  Will retry in {} seconds...", self.policy.delay.as_secs());
                    tokio::time::sleep(self.policy.delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    return Err(DownloadError::Failed {
                        attempts: attempt,
                        source: Box::new(e),
                    });
                }
            }
        }
    }

    async fn try_download(
        &self,
        url: &str,
        path: &Path,
        label: &str,
        expected_size: u64,
    ) -> Result<DownloadOutcome, DownloadError> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .await?;
        let local_size = file.metadata().await?.len();

        if expected_size > 0 && local_size >= expected_size {
            info!("{} is complete ({} bytes), skipping", path.display(), local_size);
            println!("  Nothing to do. File already exists.");
            return Ok(DownloadOutcome::Skipped);
        }

        let mut request = self.client.get(url);
        if local_size > 0 {
            debug!("Resuming {} from byte {}", path.display(), local_size);
            request = request.header(RANGE, format!("bytes={local_size}-"));
        }
        let response = request.send().await?;
        let status = response.status();

        // Without a known size, an unsatisfiable range means nothing is left to fetch
        if local_size > 0 && expected_size == 0 && status == StatusCode::RANGE_NOT_SATISFIABLE {
            println!("  Nothing to do. File already exists.");
            return Ok(DownloadOutcome::Skipped);
        }
        if !status.is_success() {
            return Err(DownloadError::Status(status));
        }

        let mut offset = local_size;
        if local_size > 0 && status != StatusCode::PARTIAL_CONTENT {
            warn!(
                "Server ignored the range request for {}, starting over",
                path.display()
            );
            file.set_len(0).await?;
            offset = 0;
        }

        let total = match expected_size {
            0 => offset + response.content_length().unwrap_or(0),
            n => n,
        };
        let pb = progress_bar(total, offset, label);

        let mut writer = BufWriter::with_capacity(CHUNK_SIZE, file);
        let transferred = write_body(response, &mut writer, &pb).await;
        let flushed = writer.flush().await;
        pb.finish_and_clear();
        let written = transferred?;
        flushed?;

        if expected_size > 0 && offset + written != expected_size {
            warn!(
                "{} has {} bytes, expected {}",
                path.display(),
                offset + written,
                expected_size
            );
        }

        println!("  Downloaded {label}");
        Ok(DownloadOutcome::Completed { bytes: written })
    }

    /// Learns the size of a remote file from its headers
    async fn lookup_size(&self, url: &str) -> Option<u64> {
        let head = self
            .client
            .head(url)
            .timeout(self.size_timeout)
            .send()
            .await;
        if let Some(size) = head.ok().and_then(|r| declared_length(&r)) {
            return Some(size);
        }

        debug!("HEAD gave no size for {url}, trying GET");
        let get = self
            .client
            .get(url)
            .timeout(self.size_timeout)
            .send()
            .await;
        get.ok().and_then(|r| declared_length(&r))
    }
}

fn declared_length(response: &Response) -> Option<u64> {
    if !response.status().is_success() {
        return None;
    }
    response
        .headers()
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
        .filter(|&n| n > 0)
}

/// Streams the body into `writer`, returning the number of bytes written
async fn write_body<W: AsyncWrite + Unpin>(
    response: Response,
    writer: &mut W,
    pb: &ProgressBar,
) -> Result<u64, DownloadError> {
    let mut stream = response.bytes_stream();
    let mut written: u64 = 0;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        writer.write_all(&chunk).await?;
        written += chunk.len() as u64;
        pb.inc(chunk.len() as u64);
    }
    Ok(written)
}

fn progress_bar(total: u64, position: u64, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(
                "  {msg}\n  {spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.set_message(format!("Downloading {label}"));
    pb.set_position(position);
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn downloader(attempts: u32) -> Downloader {
        let settings = Settings {
            retry_attempts: attempts,
            retry_delay_secs: 0,
            ..Settings::default()
        };
        Downloader::new(&settings).unwrap()
    }

    fn target(dir: &tempfile::TempDir, content: Option<&str>) -> std::path::PathBuf {
        let path = dir.path().join("book.pdf");
        if let Some(content) = content {
            std::fs::write(&path, content).unwrap();
        }
        path
    }

    #[tokio::test]
    async fn complete_file_makes_no_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = target(&dir, Some("hello world"));
        let url = format!("{}/book.pdf", server.uri());

        let outcome = downloader(3).download(&url, &file, "book.pdf", 11).await.unwrap();
        assert_eq!(outcome, DownloadOutcome::Skipped);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "hello world");
    }

    #[tokio::test]
    async fn fresh_download_has_no_range_header() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/book.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello world"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = target(&dir, None);
        let url = format!("{}/book.pdf", server.uri());

        let outcome = downloader(3).download(&url, &file, "book.pdf", 11).await.unwrap();
        assert_eq!(outcome, DownloadOutcome::Completed { bytes: 11 });
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "hello world");

        let requests = server.received_requests().await.unwrap();
        assert!(requests[0].headers.get("range").is_none());
    }

    #[tokio::test]
    async fn partial_file_resumes_from_its_size() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/book.pdf"))
            .and(header("range", "bytes=6-"))
            .respond_with(ResponseTemplate::new(206).set_body_string("world"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = target(&dir, Some("hello "));
        let url = format!("{}/book.pdf", server.uri());

        let outcome = downloader(3).download(&url, &file, "book.pdf", 11).await.unwrap();
        assert_eq!(outcome, DownloadOutcome::Completed { bytes: 5 });
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "hello world");
    }

    #[tokio::test]
    async fn ignored_range_restarts_from_scratch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello world"))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = target(&dir, Some("stale"));
        let url = format!("{}/book.pdf", server.uri());

        downloader(3).download(&url, &file, "book.pdf", 11).await.unwrap();
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "hello world");
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = target(&dir, None);
        let url = format!("{}/book.pdf", server.uri());

        let err = downloader(3).download(&url, &file, "book.pdf", 11).await.unwrap_err();
        assert!(matches!(err, DownloadError::Failed { attempts: 1, .. }));
        assert!(file.exists());
    }

    #[tokio::test]
    async fn server_errors_use_every_attempt() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(3)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = target(&dir, Some("partial"));
        let url = format!("{}/book.pdf", server.uri());

        let err = downloader(3).download(&url, &file, "book.pdf", 11).await.unwrap_err();
        let DownloadError::Failed { attempts, source } = err else {
            panic!("expected a terminal failure");
        };
        assert_eq!(attempts, 3);
        assert!(matches!(*source, DownloadError::Status(StatusCode::INTERNAL_SERVER_ERROR)));
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "partial");
    }

    #[tokio::test]
    async fn transient_failure_then_success() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello world"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = target(&dir, None);
        let url = format!("{}/book.pdf", server.uri());

        let outcome = downloader(3).download(&url, &file, "book.pdf", 11).await.unwrap();
        assert_eq!(outcome, DownloadOutcome::Completed { bytes: 11 });
    }

    #[tokio::test]
    async fn unknown_size_is_looked_up() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(405))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_string("hello world"))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = target(&dir, Some("hello world"));
        let url = format!("{}/book.pdf", server.uri());

        let outcome = downloader(3).download(&url, &file, "book.pdf", 0).await.unwrap();
        assert_eq!(outcome, DownloadOutcome::Skipped);
    }

    #[tokio::test]
    async fn unsatisfiable_range_with_unknown_size_is_complete() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(header("range", "bytes=5-"))
            .respond_with(ResponseTemplate::new(416))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let file = target(&dir, Some("whole"));
        let url = format!("{}/book.pdf", server.uri());

        let outcome = downloader(3).download(&url, &file, "book.pdf", 0).await.unwrap();
        assert_eq!(outcome, DownloadOutcome::Skipped);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), "whole");
    }

    #[test]
    fn retry_classification() {
        assert!(DownloadError::Status(StatusCode::BAD_GATEWAY).is_retryable());
        assert!(DownloadError::Status(StatusCode::REQUEST_TIMEOUT).is_retryable());
        assert!(!DownloadError::Status(StatusCode::FORBIDDEN).is_retryable());
        assert!(DownloadError::Io(io::ErrorKind::TimedOut.into()).is_retryable());
        assert!(!DownloadError::Io(io::ErrorKind::PermissionDenied.into()).is_retryable());
    }
}
