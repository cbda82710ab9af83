use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use log::{debug, info, warn};

use crate::scraper::http::HttpFetcher;
use crate::scraper::models::{DownloadRecord, DownloadTask};
use crate::scraper::throttle::ThrottlePolicy;

/// Best-effort sequential batch downloader.
///
/// Tasks are processed strictly in order, one fetch at a time, with the
/// throttle policy pacing the network attempts. There is no retry within a
/// run; a later run picks up whatever is missing.
pub struct BatchDownloader {
    throttle: ThrottlePolicy,
}

impl BatchDownloader {
    pub fn new(throttle: ThrottlePolicy) -> Self {
        Self { throttle }
    }

    /// Downloads every task, producing one record per task in input order.
    ///
    /// A task whose target file already exists, or whose id was already
    /// processed this run, is reported as successful without a network
    /// request. Fetch and write failures are logged and recorded, never
    /// propagated; only an uncreatable output directory is fatal.
    pub async fn run(
        &self,
        fetcher: &HttpFetcher,
        out_dir: &Path,
        tasks: Vec<DownloadTask>,
    ) -> Result<Vec<DownloadRecord>> {
        tokio::fs::create_dir_all(out_dir)
            .await
            .with_context(|| format!("failed to create output directory {}", out_dir.display()))?;

        let total = tasks.len();
        let mut records = Vec::with_capacity(total);
        let mut seen_ids: HashSet<String> = HashSet::new();
        let mut attempts = 0usize;
        let mut downloaded = 0usize;

        for task in tasks {
            let first_time = seen_ids.insert(task.id.clone());
            if !first_time || task.local_path.exists() {
                debug!("{} already present, skipping", task.id);
                let path = task.local_path.clone();
                records.push(DownloadRecord {
                    task,
                    success: true,
                    resolved_local_path: Some(path),
                });
                continue;
            }

            let outcome = fetcher.download_to_path(&task.source_url, &task.local_path).await;
            let index = attempts;
            attempts += 1;

            let record = match outcome {
                Ok(()) => {
                    downloaded += 1;
                    info!("{}/{total} {}", records.len() + 1, task.id);
                    let path = task.local_path.clone();
                    DownloadRecord {
                        task,
                        success: true,
                        resolved_local_path: Some(path),
                    }
                }
                Err(e) => {
                    warn!("Failed to download {}: {e}", task.source_url);
                    DownloadRecord {
                        task,
                        success: false,
                        resolved_local_path: None,
                    }
                }
            };
            records.push(record);

            self.throttle.pause_after(index).await;
        }

        info!("{downloaded} of {total} tasks downloaded, rest skipped or failed");
        Ok(records)
    }
}
