mod scraper;
mod utils;

use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use log::{error, info};

use crate::scraper::models::{DownloadTask, MediaRecord};
use crate::scraper::{BatchDownloader, FeedScanner, HttpFetcher, manifest};
use crate::utils::AppConfig;

enum Mode {
    /// Scan the feed for images and download them.
    Scan,
    /// Download a caller-supplied JSON array of records.
    Records(PathBuf),
}

fn print_usage() {
    println!("Usage: feedgrab [config.json]");
    println!("       feedgrab -records <records.json> [config.json]");
    println!();
    println!("Scans a search feed for images and downloads each one once, or");
    println!("downloads a fixed list of records and writes a manifest of the");
    println!("successful ones. RUST_LOG controls verbosity.");
}

fn parse_args() -> Result<(Mode, Option<PathBuf>)> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    let mut mode = Mode::Scan;
    let mut config_path = None;
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-records" => {
                let path = args
                    .get(i + 1)
                    .ok_or_else(|| anyhow::anyhow!("-records requires a file path"))?;
                mode = Mode::Records(PathBuf::from(path));
                i += 2;
            }
            "-h" | "--help" => {
                print_usage();
                process::exit(0);
            }
            other => {
                config_path = Some(PathBuf::from(other));
                i += 1;
            }
        }
    }

    Ok((mode, config_path))
}

async fn run() -> Result<()> {
    let (mode, config_path) = parse_args()?;
    let config = match config_path {
        Some(path) => AppConfig::load(&path)?,
        None => AppConfig::default(),
    };

    let fetcher =
        HttpFetcher::new(config.download.timeout()).context("failed to build HTTP client")?;

    // Records mode always writes a manifest; scan mode only when asked to.
    let manifest_path = match &mode {
        Mode::Records(_) => Some(
            config
                .download
                .manifest_path
                .clone()
                .unwrap_or_else(|| PathBuf::from("manifest.json")),
        ),
        Mode::Scan => config.download.manifest_path.clone(),
    };

    let (records, tasks): (Vec<MediaRecord>, Vec<DownloadTask>) = match mode {
        Mode::Scan => {
            info!("Scanning feed for up to {} images", config.search.target_count);
            let scanner = FeedScanner::new(&config.search, config.throttle.scan_policy())?;
            let found = scanner.scan(&fetcher).await;
            info!("Feed scan found {} images", found.len());

            let records = found
                .iter()
                .map(|m| MediaRecord {
                    id: m.file_name.clone(),
                    url: m.fetch_url.clone(),
                    extra: serde_json::Map::new(),
                })
                .collect();
            let tasks = found
                .iter()
                .map(|m| DownloadTask::for_media(&m.file_name, &m.fetch_url, &config.download.out_dir))
                .collect();
            (records, tasks)
        }
        Mode::Records(path) => {
            let records = manifest::load_records(&path).await?;
            info!("Loaded {} records from {}", records.len(), path.display());

            let tasks = records
                .iter()
                .map(|r| DownloadTask::for_record(r, &config.download.out_dir))
                .collect();
            (records, tasks)
        }
    };

    let downloader = BatchDownloader::new(config.throttle.download_policy());
    let results = downloader
        .run(&fetcher, &config.download.out_dir, tasks)
        .await?;

    if let Some(path) = manifest_path {
        let entries = manifest::successful_entries(&records, &results);
        manifest::write_manifest(&path, &entries).await?;
        info!("Manifest with {} entries written to {}", entries.len(), path.display());
    }

    let succeeded = results.iter().filter(|r| r.success).count();
    info!("Done: {succeeded}/{} tasks succeeded", results.len());
    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::init();

    if let Err(e) = run().await {
        error!("{e:#}");
        process::exit(1);
    }
}
