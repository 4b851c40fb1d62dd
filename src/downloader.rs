use async_trait::async_trait;
use colored::*;
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{AcquireError, FetchError};

/// Number of consecutive misses that signals the end of the document.
///
/// The tile service numbers pages contiguously but the final page is
/// unknown in advance. A single 404 can be a blank/unscanned page, so only
/// a run of misses terminates the loop. Known limitation kept on purpose:
/// a document with an internal gap of 5 or more missing pages is
/// truncated at the gap.
pub const STOP_THRESHOLD: u32 = 5;

const REQUEST_DELAY: Duration = Duration::from_millis(500);
const FETCH_TIMEOUT: Duration = Duration::from_secs(30);
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Maps a 1-based page number to the URL it lives at.
///
/// The pattern must contain a literal `{page}` placeholder, replaced with
/// the page number zero-padded to six digits (the tile service lays pages
/// out as `ca000001.jp2`, `ca000002.jp2`, ...).
#[derive(Debug, Clone)]
pub struct PageUrlTemplate {
    base: String,
    pattern: String,
}

impl PageUrlTemplate {
    pub fn new(base: &str, pattern: &str) -> Result<Self, AcquireError> {
        Url::parse(base).map_err(|source| AcquireError::InvalidBaseUrl {
            url: base.to_string(),
            source,
        })?;
        if !pattern.contains("{page}") {
            return Err(AcquireError::MissingPagePlaceholder {
                pattern: pattern.to_string(),
            });
        }
        Ok(Self {
            base: base.to_string(),
            pattern: pattern.to_string(),
        })
    }

    pub fn url_for(&self, page: u32) -> String {
        let name = self.pattern.replace("{page}", &format!("{page:06}"));
        format!("{}{}", self.base, name)
    }

    /// File extension the service delivers, taken from the pattern.
    pub fn file_extension(&self) -> &str {
        Path::new(&self.pattern)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("img")
    }
}

/// The fetch capability the download loop runs against.
///
/// Production uses [`HttpFetcher`]; tests drive the loop with a scripted
/// in-memory implementation so stop detection is checked without a network.
#[async_trait]
pub trait PageFetcher {
    /// Fetch one page. `Ok` carries a non-empty image body.
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}

/// [`PageFetcher`] backed by a reqwest client with a fixed timeout and
/// User-Agent.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, AcquireError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .user_agent(USER_AGENT)
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Transient("request timed out".to_string())
            } else {
                FetchError::Transient(e.to_string())
            }
        })?;

        match response.status() {
            StatusCode::NOT_FOUND => Err(FetchError::NotFound),
            status if status.is_success() => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|e| FetchError::Transient(e.to_string()))?;
                if body.is_empty() {
                    return Err(FetchError::Transient("empty response body".to_string()));
                }
                Ok(body.to_vec())
            }
            status => Err(FetchError::Transient(format!("unexpected status {status}"))),
        }
    }
}

/// What a completed download run looked like.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcquireSummary {
    pub pages_saved: usize,
    pub requests: usize,
}

/// Sequential page acquirer: fetches page 1, 2, 3, ... and stops after
/// [`STOP_THRESHOLD`] consecutive misses. All loop state lives here, one
/// run at a time; the only durable output is the files it writes.
pub struct Downloader {
    out_dir: PathBuf,
    template: PageUrlTemplate,
    stop_threshold: u32,
    request_delay: Duration,
}

impl Downloader {
    pub fn new(out_dir: PathBuf, template: PageUrlTemplate) -> Self {
        Self {
            out_dir,
            template,
            stop_threshold: STOP_THRESHOLD,
            request_delay: REQUEST_DELAY,
        }
    }

    pub async fn run<F: PageFetcher + ?Sized>(
        &self,
        fetcher: &F,
    ) -> Result<AcquireSummary, AcquireError> {
        fs::create_dir_all(&self.out_dir)
            .await
            .map_err(|source| AcquireError::CreateDir {
                path: self.out_dir.clone(),
                source,
            })?;

        info!(
            "Downloading from page 1 into \"{}\", stopping after {} consecutive misses",
            self.out_dir.display().to_string().blue(),
            self.stop_threshold
        );

        let mut consecutive_failures: u32 = 0;
        let mut page: u32 = 1;
        let mut pages_saved = 0;
        let mut requests = 0;

        while consecutive_failures < self.stop_threshold {
            let url = self.template.url_for(page);
            debug!("Requesting {}", url);
            requests += 1;

            match fetcher.fetch(&url).await {
                Ok(bytes) => {
                    let name = stored_filename(page, self.template.file_extension());
                    let path = self.out_dir.join(name);
                    fs::write(&path, &bytes)
                        .await
                        .map_err(|source| AcquireError::WriteImage { path, source })?;
                    pages_saved += 1;
                    consecutive_failures = 0;
                    info!("Page {}: {} ({} total)", page, "saved".green(), pages_saved);
                }
                Err(FetchError::NotFound) => {
                    consecutive_failures += 1;
                    info!(
                        "Page {}: not found ({}/{} consecutive)",
                        page, consecutive_failures, self.stop_threshold
                    );
                }
                Err(FetchError::Transient(reason)) => {
                    consecutive_failures += 1;
                    warn!(
                        "Page {}: fetch failed ({}/{} consecutive): {}",
                        page, consecutive_failures, self.stop_threshold, reason
                    );
                }
            }

            page += 1;

            // Politeness delay toward the tile service, skipped once the
            // loop has decided to stop.
            if consecutive_failures < self.stop_threshold && self.request_delay > Duration::ZERO {
                tokio::time::sleep(self.request_delay).await;
            }
        }

        info!(
            "Download complete: {} pages saved over {} requests",
            pages_saved.to_string().green(),
            requests
        );

        Ok(AcquireSummary {
            pages_saved,
            requests,
        })
    }
}

/// Page files are named so the page number is recoverable and a numeric
/// sort reproduces page order.
pub(crate) fn stored_filename(page: u32, ext: &str) -> String {
    format!("page_{page:06}.{ext}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tempfile::tempdir;

    /// Replays a fixed script of fetch outcomes; anything past the end of
    /// the script is a miss.
    struct ScriptedFetcher {
        script: Mutex<Vec<Result<Vec<u8>, FetchError>>>,
    }

    impl ScriptedFetcher {
        fn new(script: Vec<Result<Vec<u8>, FetchError>>) -> Self {
            Self {
                script: Mutex::new(script),
            }
        }
    }

    #[async_trait]
    impl PageFetcher for ScriptedFetcher {
        async fn fetch(&self, _url: &str) -> Result<Vec<u8>, FetchError> {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Err(FetchError::NotFound)
            } else {
                script.remove(0)
            }
        }
    }

    fn ok() -> Result<Vec<u8>, FetchError> {
        Ok(vec![0xde, 0xad, 0xbe, 0xef])
    }

    fn missing() -> Result<Vec<u8>, FetchError> {
        Err(FetchError::NotFound)
    }

    fn transient() -> Result<Vec<u8>, FetchError> {
        Err(FetchError::Transient("connection reset".to_string()))
    }

    fn test_downloader(dir: &Path) -> Downloader {
        let template = PageUrlTemplate::new("https://example.com/scans/", "pg{page}.jp2")
            .expect("valid template");
        let mut downloader = Downloader::new(dir.to_path_buf(), template);
        downloader.request_delay = Duration::ZERO;
        downloader
    }

    fn saved_files(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn stops_after_threshold_consecutive_misses() {
        let dir = tempdir().unwrap();
        let mut script: Vec<_> = (0..12).map(|_| ok()).collect();
        script.extend((0..5).map(|_| missing()));
        let fetcher = ScriptedFetcher::new(script);

        let summary = test_downloader(dir.path()).run(&fetcher).await.unwrap();

        assert_eq!(summary.pages_saved, 12);
        assert_eq!(summary.requests, 17);
        assert_eq!(saved_files(dir.path()).len(), 12);
    }

    #[tokio::test]
    async fn isolated_miss_does_not_stop_the_run() {
        let dir = tempdir().unwrap();
        let fetcher = ScriptedFetcher::new(vec![ok(), ok(), missing(), ok()]);

        let summary = test_downloader(dir.path()).run(&fetcher).await.unwrap();

        // Pages 1, 2, 4 saved; page 3 missed; pages 5-9 end the run.
        assert_eq!(summary.pages_saved, 3);
        assert_eq!(summary.requests, 9);
        assert_eq!(
            saved_files(dir.path()),
            vec!["page_000001.jp2", "page_000002.jp2", "page_000004.jp2"]
        );
    }

    #[tokio::test]
    async fn transient_failures_count_toward_stop_detection() {
        let dir = tempdir().unwrap();
        let fetcher = ScriptedFetcher::new(vec![
            missing(),
            transient(),
            missing(),
            transient(),
            missing(),
        ]);

        let summary = test_downloader(dir.path()).run(&fetcher).await.unwrap();

        assert_eq!(summary.pages_saved, 0);
        assert_eq!(summary.requests, 5);
        assert!(saved_files(dir.path()).is_empty());
    }

    #[tokio::test]
    async fn success_resets_the_failure_counter() {
        let dir = tempdir().unwrap();
        let fetcher = ScriptedFetcher::new(vec![
            missing(),
            missing(),
            missing(),
            missing(),
            ok(), // one short of the threshold; counter resets here
        ]);

        let summary = test_downloader(dir.path()).run(&fetcher).await.unwrap();

        assert_eq!(summary.pages_saved, 1);
        assert_eq!(summary.requests, 10);
        assert_eq!(saved_files(dir.path()), vec!["page_000005.jp2"]);
    }

    #[test]
    fn template_builds_zero_padded_urls() {
        let template = PageUrlTemplate::new("https://example.com/scans/", "ca{page}.jp2").unwrap();
        assert_eq!(template.url_for(3), "https://example.com/scans/ca000003.jp2");
        assert_eq!(
            template.url_for(123456),
            "https://example.com/scans/ca123456.jp2"
        );
        assert_eq!(template.file_extension(), "jp2");
    }

    #[test]
    fn template_rejects_bad_configuration() {
        assert!(matches!(
            PageUrlTemplate::new("not a url", "ca{page}.jp2"),
            Err(AcquireError::InvalidBaseUrl { .. })
        ));
        assert!(matches!(
            PageUrlTemplate::new("https://example.com/", "ca0001.jp2"),
            Err(AcquireError::MissingPagePlaceholder { .. })
        ));
    }

    #[test]
    fn stored_filenames_sort_in_page_order() {
        let mut names = vec![
            stored_filename(10, "jp2"),
            stored_filename(2, "jp2"),
            stored_filename(1, "jp2"),
        ];
        names.sort();
        assert_eq!(
            names,
            vec!["page_000001.jp2", "page_000002.jp2", "page_000010.jp2"]
        );
    }
}
