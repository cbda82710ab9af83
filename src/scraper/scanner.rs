use std::collections::HashSet;
use std::future::Future;

use anyhow::{Context, Result};
use log::{debug, info, warn};
use regex::Regex;

use crate::scraper::http::HttpFetcher;
use crate::scraper::models::{FoundMedia, sanitize_file_name};
use crate::scraper::throttle::ThrottlePolicy;
use crate::utils::config::SearchConfig;

/// Scans a proxied search feed page by page for media URLs.
///
/// URLs are deduplicated by derived file name across the whole run. The
/// scan stops once the target count is reached, once a page yields nothing
/// new (end of results), or once the page-attempt cap is hit.
pub struct FeedScanner {
    config: SearchConfig,
    pattern: Regex,
    throttle: ThrottlePolicy,
}

impl FeedScanner {
    pub fn new(config: &SearchConfig, throttle: ThrottlePolicy) -> Result<Self> {
        let pattern = Regex::new(&config.media_pattern)
            .with_context(|| format!("invalid media pattern {:?}", config.media_pattern))?;

        Ok(Self {
            config: config.clone(),
            pattern,
            throttle,
        })
    }

    /// URL requested for one page of search results: the upstream search
    /// URL with the percent-encoded query, wrapped into the proxy.
    pub fn page_url(&self, page: u32) -> String {
        let search = self
            .config
            .search_url_template
            .replace("{query}", &urlencoding::encode(&self.config.query))
            .replace("{page}", &page.to_string());
        format!("{}{}", self.config.proxy_base, urlencoding::encode(&search))
    }

    /// Runs the scan against the live feed.
    pub async fn scan(&self, fetcher: &HttpFetcher) -> Vec<FoundMedia> {
        self.scan_with(|page| {
            let url = self.page_url(page);
            async move { fetcher.fetch_text(&url).await.map_err(anyhow::Error::from) }
        })
        .await
    }

    /// Drives the page loop with an arbitrary page source. `scan` supplies
    /// the HTTP-backed source; tests inject canned pages.
    pub async fn scan_with<F, Fut>(&self, fetch_page: F) -> Vec<FoundMedia>
    where
        F: Fn(u32) -> Fut,
        Fut: Future<Output = Result<String>>,
    {
        let target = self.config.target_count;
        let mut found: Vec<FoundMedia> = Vec::new();
        let mut seen_names: HashSet<String> = HashSet::new();
        let mut attempts: u32 = 0;

        while found.len() < target {
            if attempts >= self.config.max_page_attempts {
                warn!(
                    "Giving up after {attempts} page attempts with {}/{target} images found",
                    found.len()
                );
                break;
            }
            attempts += 1;
            let page = attempts;

            let body = match fetch_page(page).await {
                Ok(body) => body,
                Err(e) => {
                    warn!("Page {page} fetch failed: {e:#}");
                    self.throttle.politeness().await;
                    continue;
                }
            };

            let fresh = self.extract_new(&body, &mut seen_names, target - found.len());
            if fresh.is_empty() {
                info!("Page {page} had no new images, stopping");
                break;
            }
            debug!("Page {page}: {} new images", fresh.len());

            let before = found.len();
            found.extend(fresh);

            if found.len() >= target {
                break;
            }
            if self.throttle.crossed_batch(before, found.len()) {
                info!("{} images found, taking a longer break", found.len());
                self.throttle.long_pause().await;
            }
            self.throttle.politeness().await;
        }

        found
    }

    /// All matches in `body` whose derived file name has not been seen yet,
    /// capped at `limit`.
    fn extract_new(
        &self,
        body: &str,
        seen_names: &mut HashSet<String>,
        limit: usize,
    ) -> Vec<FoundMedia> {
        let mut fresh = Vec::new();

        for m in self.pattern.find_iter(body) {
            if fresh.len() >= limit {
                break;
            }

            let url = m.as_str();
            let basename = url.rsplit('/').next().unwrap_or(url);
            let file_name = sanitize_file_name(basename);
            if file_name.is_empty() {
                continue;
            }

            if seen_names.insert(file_name.clone()) {
                fresh.push(FoundMedia {
                    file_name,
                    fetch_url: format!("{url}{}", self.config.full_size_suffix),
                });
            }
        }

        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn scanner(target_count: usize, max_page_attempts: u32) -> FeedScanner {
        let config = SearchConfig {
            target_count,
            max_page_attempts,
            ..SearchConfig::default()
        };
        FeedScanner::new(&config, ThrottlePolicy::none()).unwrap()
    }

    fn media(name: &str) -> String {
        format!("https://pbs.twimg.com/media/{name}")
    }

    #[tokio::test]
    async fn duplicate_url_in_one_page_yields_once() {
        let scanner = scanner(10, 10);
        let page_one = format!("<a href={0}></a> <img src={0}>", media("AAA.jpg"));

        let found = scanner
            .scan_with(|page| {
                let body = if page == 1 { page_one.clone() } else { String::new() };
                async move { Ok::<_, anyhow::Error>(body) }
            })
            .await;

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].file_name, "AAA.jpg");
        assert_eq!(found[0].fetch_url, format!("{}:orig", media("AAA.jpg")));
    }

    #[tokio::test]
    async fn stops_after_first_page_with_nothing_new() {
        let fetches = AtomicU32::new(0);
        let scanner = scanner(100, 100);
        let page_one = media("AAA.jpg");

        let found = scanner
            .scan_with(|_page| {
                fetches.fetch_add(1, Ordering::SeqCst);
                let body = page_one.clone();
                async move { Ok::<_, anyhow::Error>(body) }
            })
            .await;

        // Every page repeats page one, so page two yields nothing new.
        assert_eq!(found.len(), 1);
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn reaching_the_target_skips_further_pages() {
        let fetches = AtomicU32::new(0);
        let scanner = scanner(3, 100);
        let page_one = format!("{} {}", media("AAA.jpg"), media("BBB.png"));
        let page_two = format!("{} {}", media("AAA.jpg"), media("CCC.jpg"));

        let found = scanner
            .scan_with(|page| {
                fetches.fetch_add(1, Ordering::SeqCst);
                let body = if page == 1 { page_one.clone() } else { page_two.clone() };
                async move { Ok::<_, anyhow::Error>(body) }
            })
            .await;

        let names: Vec<&str> = found.iter().map(|m| m.file_name.as_str()).collect();
        assert_eq!(names, ["AAA.jpg", "BBB.png", "CCC.jpg"]);
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn page_attempts_are_bounded_under_persistent_failure() {
        let fetches = AtomicU32::new(0);
        let scanner = scanner(10, 5);

        let found = scanner
            .scan_with(|_page| {
                fetches.fetch_add(1, Ordering::SeqCst);
                async move { Err::<String, _>(anyhow::anyhow!("connection refused")) }
            })
            .await;

        assert!(found.is_empty());
        assert_eq!(fetches.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn failed_pages_do_not_end_the_scan() {
        let fetches = AtomicU32::new(0);
        let scanner = scanner(1, 10);
        let page_two = media("AAA.jpg");

        let found = scanner
            .scan_with(|page| {
                fetches.fetch_add(1, Ordering::SeqCst);
                let body = if page == 1 { None } else { Some(page_two.clone()) };
                async move {
                    body.ok_or_else(|| anyhow::anyhow!("proxy hiccup"))
                }
            })
            .await;

        assert_eq!(found.len(), 1);
        assert_eq!(fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn a_page_can_satisfy_only_the_remaining_target() {
        let scanner = scanner(2, 10);
        let page_one = format!("{} {} {}", media("AAA.jpg"), media("BBB.jpg"), media("CCC.jpg"));

        let found = scanner
            .scan_with(|_page| {
                let body = page_one.clone();
                async move { Ok::<_, anyhow::Error>(body) }
            })
            .await;

        let names: Vec<&str> = found.iter().map(|m| m.file_name.as_str()).collect();
        assert_eq!(names, ["AAA.jpg", "BBB.jpg"]);
    }

    #[test]
    fn page_url_encodes_the_search_url_into_the_proxy() {
        let config = SearchConfig {
            query: "monad filter:images".to_string(),
            proxy_base: "https://proxy.example/raw?url=".to_string(),
            search_url_template: "https://x.com/search?q={query}&page={page}".to_string(),
            ..SearchConfig::default()
        };
        let scanner = FeedScanner::new(&config, ThrottlePolicy::none()).unwrap();

        let url = scanner.page_url(2);
        assert!(url.starts_with("https://proxy.example/raw?url=https%3A%2F%2Fx.com%2Fsearch"));
        assert!(url.contains("monad%2520filter%253Aimages"));
        assert!(url.ends_with("%26page%3D2"));
    }

    #[test]
    fn rejects_an_invalid_media_pattern() {
        let config = SearchConfig {
            media_pattern: "(unclosed".to_string(),
            ..SearchConfig::default()
        };
        assert!(FeedScanner::new(&config, ThrottlePolicy::none()).is_err());
    }
}
