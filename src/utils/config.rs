use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::scraper::throttle::ThrottlePolicy;

/// Everything the run needs, in one explicit value. Defaults reproduce the
/// behavior the tool shipped with; a JSON config file can override any
/// subset of fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub search: SearchConfig,
    pub download: DownloadConfig,
    pub throttle: ThrottleConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Keyword plus inclusion/exclusion terms, passed to the search feed.
    pub query: String,
    /// Stop scanning once this many unique images have been found.
    pub target_count: usize,
    /// CORS proxy prefix the upstream search URL is appended to.
    pub proxy_base: String,
    /// Upstream search URL with `{query}` and `{page}` placeholders.
    pub search_url_template: String,
    /// Shape of the media URLs to pull out of the raw page text.
    pub media_pattern: String,
    /// Suffix appended to a matched URL to request the full-size variant.
    pub full_size_suffix: String,
    /// Hard cap on page fetches, counting failed ones.
    pub max_page_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Flat directory the images land in.
    pub out_dir: PathBuf,
    /// Where to write the manifest; `None` skips it in scan mode.
    pub manifest_path: Option<PathBuf>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThrottleConfig {
    /// Pause after each download attempt.
    pub request_delay_ms: u64,
    /// Pause between feed pages.
    pub page_delay_ms: u64,
    /// Operations per batch; a batch completion earns the longer pause.
    pub batch_size: usize,
    /// The longer pause.
    pub batch_pause_ms: u64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            query: "monad (LFG OR GM OR bullish OR momentum OR cult OR parallel) -FUD -scam filter:images"
                .to_string(),
            target_count: 500,
            proxy_base: "https://api.allorigins.win/raw?url=".to_string(),
            search_url_template: "https://x.com/search?f=live&q={query}&src=typed_query&page={page}"
                .to_string(),
            media_pattern: r"https://pbs\.twimg\.com/media/[A-Za-z0-9_\-]+\.(?:jpg|png)".to_string(),
            full_size_suffix: ":orig".to_string(),
            max_page_attempts: 40,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("feed_images"),
            manifest_path: None,
            timeout_secs: 10,
        }
    }
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            request_delay_ms: 1000,
            page_delay_ms: 4000,
            batch_size: 50,
            batch_pause_ms: 3000,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            search: SearchConfig::default(),
            download: DownloadConfig::default(),
            throttle: ThrottleConfig::default(),
        }
    }
}

impl AppConfig {
    /// Loads a config file. Any field left out falls back to its default.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;

        serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))
    }
}

impl DownloadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ThrottleConfig {
    /// Pacing for the batch downloader: per-attempt delay, longer pause per
    /// completed batch.
    pub fn download_policy(&self) -> ThrottlePolicy {
        ThrottlePolicy::new(
            Duration::from_millis(self.request_delay_ms),
            self.batch_size,
            Duration::from_millis(self.batch_pause_ms),
        )
    }

    /// Pacing for the feed scanner: the delay applies between pages, the
    /// batch pause after every `batch_size` yielded images.
    pub fn scan_policy(&self) -> ThrottlePolicy {
        ThrottlePolicy::new(
            Duration::from_millis(self.page_delay_ms),
            self.batch_size,
            Duration::from_millis(self.batch_pause_ms),
        )
    }
}
