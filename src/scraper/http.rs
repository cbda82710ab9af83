//! HTTP plumbing shared by the scanner and the batch downloader.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use futures_util::StreamExt;
use log::debug;
use reqwest::{Client, StatusCode};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self, DownloadError> {
        let client = Client::builder()
            .use_rustls_tls()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self { client })
    }

    /// Fetches a page as text. A non-2xx response is an error.
    pub async fn fetch_text(&self, url: &str) -> Result<String, DownloadError> {
        debug!("Fetching {url}");
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(DownloadError::Status(response.status()));
        }

        Ok(response.text().await?)
    }

    /// Streams the response body for `url` into `destination`.
    ///
    /// The body goes to a `.part` sibling first and is renamed onto
    /// `destination` once complete, so an interrupted write never leaves a
    /// partial file at the final path. The temp file is removed on failure.
    pub async fn download_to_path(&self, url: &str, destination: &Path) -> Result<(), DownloadError> {
        debug!("Downloading {url} to {destination:?}");
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(DownloadError::Status(response.status()));
        }

        let part_path = part_path(destination);
        match write_body(response, &part_path).await {
            Ok(()) => {
                tokio::fs::rename(&part_path, destination).await?;
                Ok(())
            }
            Err(e) => {
                let _ = tokio::fs::remove_file(&part_path).await;
                Err(e)
            }
        }
    }
}

fn part_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".part");
    destination.with_file_name(name)
}

async fn write_body(response: reqwest::Response, path: &Path) -> Result<(), DownloadError> {
    let mut file = File::create(path).await?;
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        file.write_all(&chunk).await?;
    }

    file.flush().await?;
    Ok(())
}

/// Per-task failure causes. The batch downloader treats all of them the
/// same way: log, mark the task failed, move on.
#[derive(Debug)]
pub enum DownloadError {
    Status(StatusCode),
    Transport(reqwest::Error),
    Io(io::Error),
}

impl From<reqwest::Error> for DownloadError {
    fn from(error: reqwest::Error) -> Self {
        DownloadError::Transport(error)
    }
}

impl From<io::Error> for DownloadError {
    fn from(error: io::Error) -> Self {
        DownloadError::Io(error)
    }
}

impl fmt::Display for DownloadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DownloadError::Status(code) => write!(f, "HTTP error: {code}"),
            DownloadError::Transport(err) => write!(f, "Request error: {err}"),
            DownloadError::Io(err) => write!(f, "IO error: {err}"),
        }
    }
}

impl std::error::Error for DownloadError {}
