//! Disk-backed cache of page title/description.
//!
//! One JSON file per URL, named by the percent-encoded URL. Entries are never
//! expired; a refetch overwrites. Concurrent misses for the same URL may both
//! fetch and write, and the last write wins.

use crate::config::GuardLimits;
use crate::error::CacheIoError;
use crate::guard::InputGuard;
use crate::metadata::fetch::PageFetcher;
use crate::metadata::html;
use crate::metadata::url::{add_https_protocol, add_https_protocol_and_www};
use crate::telemetry::{kinds, Telemetry};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const RESTRICTED_TITLE: &str = "Restricted Content";
pub const RESTRICTED_DESCRIPTION: &str = "This content is behind a login wall.";

/// Cached page metadata. Both fields are optional and capped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub title: Option<String>,
    pub description: Option<String>,
}

impl Metadata {
    /// Returned for pages behind authentication. Never cached.
    pub fn restricted() -> Self {
        Self {
            title: Some(RESTRICTED_TITLE.to_string()),
            description: Some(RESTRICTED_DESCRIPTION.to_string()),
        }
    }

    /// Returned when neither URL variant could be fetched. Never cached.
    pub fn unavailable() -> Self {
        Self {
            title: Some(String::new()),
            description: Some(String::new()),
        }
    }

    fn has_content(&self) -> bool {
        let present = |f: &Option<String>| f.as_deref().is_some_and(|s| !s.is_empty());
        present(&self.title) || present(&self.description)
    }
}

enum FetchOutcome {
    Page(String),
    Restricted,
    Unavailable,
}

pub struct MetadataCache {
    dir: PathBuf,
    fetcher: Arc<dyn PageFetcher>,
    guard: InputGuard,
    limits: GuardLimits,
    telemetry: Arc<dyn Telemetry>,
}

impl MetadataCache {
    pub fn new(
        dir: impl Into<PathBuf>,
        fetcher: Arc<dyn PageFetcher>,
        guard: InputGuard,
        limits: GuardLimits,
        telemetry: Arc<dyn Telemetry>,
    ) -> Self {
        Self {
            dir: dir.into(),
            fetcher,
            guard,
            limits,
            telemetry,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// The cache file for `url`.
    pub fn cache_path(&self, url: &str) -> PathBuf {
        self.dir.join(cache_file_name(url))
    }

    /// Title and description for `url`, from disk when cached.
    pub async fn get_metadata(&self, url: &str) -> Metadata {
        let path = self.cache_path(url);
        if let Some(hit) = self.read_cached(&path).await {
            debug!("Metadata cache hit for {}", url);
            return hit;
        }

        let html = match self.fetch_page(url).await {
            FetchOutcome::Page(html) => html,
            FetchOutcome::Restricted => {
                info!("{} is behind a login wall", url);
                return Metadata::restricted();
            }
            FetchOutcome::Unavailable => return Metadata::unavailable(),
        };

        let metadata = self.summarize(&html);
        if metadata.has_content() {
            self.write_cached(&path, &metadata).await;
        }
        metadata
    }

    /// Cache lookup only; never fetches.
    pub async fn lookup(&self, url: &str) -> Option<Metadata> {
        self.read_cached(&self.cache_path(url)).await
    }

    /// URLs with an entry on disk, sorted. No cache directory means no entries.
    pub async fn cached_urls(&self) -> Result<Vec<String>, CacheIoError> {
        let read_err = |source| CacheIoError::Read {
            path: self.dir.clone(),
            source,
        };
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => return Err(read_err(source)),
        };

        let mut urls = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
            if let Some(url) = entry.file_name().to_str().and_then(url_from_cache_file_name) {
                urls.push(url);
            }
        }
        urls.sort();
        Ok(urls)
    }

    fn summarize(&self, html: &str) -> Metadata {
        let summary = html::extract(html);
        let title = summary
            .title
            .map(|t| truncate_chars(&t, self.limits.metadata_title));
        let description = summary
            .description
            .map(|d| truncate_chars(&d, self.limits.metadata_description));

        Metadata {
            title: self
                .guard
                .sanitize_field(title.as_deref())
                .map(|t| truncate_chars(&t, self.limits.metadata_title)),
            description: self
                .guard
                .sanitize_field(description.as_deref())
                .map(|d| truncate_chars(&d, self.limits.metadata_description)),
        }
    }

    async fn fetch_page(&self, url: &str) -> FetchOutcome {
        let primary = add_https_protocol(url);
        match self.fetcher.fetch(&primary).await {
            Ok(page) if page.is_restricted() => return FetchOutcome::Restricted,
            Ok(page) if page.is_success() => return FetchOutcome::Page(page.body),
            Ok(page) => debug!("{} returned {}, trying www variant", primary, page.status),
            Err(e) => debug!("{} failed ({}), trying www variant", primary, e),
        }

        let fallback = add_https_protocol_and_www(url);
        match self.fetcher.fetch(&fallback).await {
            Ok(page) if page.is_restricted() => FetchOutcome::Restricted,
            Ok(page) if page.is_success() => FetchOutcome::Page(page.body),
            Ok(page) => {
                debug!("{} returned {}", fallback, page.status);
                FetchOutcome::Unavailable
            }
            Err(e) => {
                debug!("{} failed: {}", fallback, e);
                FetchOutcome::Unavailable
            }
        }
    }

    async fn read_cached(&self, path: &Path) -> Option<Metadata> {
        let raw = match tokio::fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(source) => {
                self.report(CacheIoError::Read {
                    path: path.to_path_buf(),
                    source,
                });
                return None;
            }
        };

        match serde_json::from_str(&raw) {
            Ok(metadata) => Some(metadata),
            Err(source) => {
                self.report(CacheIoError::Corrupt {
                    path: path.to_path_buf(),
                    source,
                });
                None
            }
        }
    }

    async fn write_cached(&self, path: &Path, metadata: &Metadata) {
        let result = async {
            tokio::fs::create_dir_all(&self.dir).await?;
            let body = serde_json::to_string(metadata).map_err(std::io::Error::other)?;
            tokio::fs::write(path, body).await
        }
        .await;

        if let Err(source) = result {
            self.report(CacheIoError::Write {
                path: path.to_path_buf(),
                source,
            });
        }
    }

    fn report(&self, err: CacheIoError) {
        warn!("Metadata cache: {}", err);
        self.telemetry.record_event(
            kinds::CACHE_IO_ERROR,
            json!({ "error": err.to_string() }),
        );
    }
}

/// File name for a URL: the percent-encoded URL plus `.json`.
pub fn cache_file_name(url: &str) -> String {
    format!("{}.json", urlencoding::encode(url))
}

/// The URL a cache file name was derived from.
pub fn url_from_cache_file_name(name: &str) -> Option<String> {
    let encoded = name.strip_suffix(".json")?;
    urlencoding::decode(encoded).ok().map(|u| u.into_owned())
}

fn truncate_chars(text: &str, cap: usize) -> String {
    match text.char_indices().nth(cap) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}
