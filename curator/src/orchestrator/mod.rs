//! Bounded-parallel ingest: fetch every enabled source concurrently (capped
//! by a semaphore), normalize raw items, dedup in-batch and cross-source,
//! persist, snapshot, and record per-source status — mirroring the
//! teacher's `crawler.rs` fan-out shape (`buffer_unordered` over a stream of
//! per-source futures) generalized from "crawl one feed" to "run one
//! connector under a deadline".

pub mod snapshot;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::config::{Config, SourceConfig};
use crate::connectors::{Connector, ContentExtractor, RawItem};
use crate::denoise::canonicalize_url;
use crate::error::{CuratorError, Result};
use crate::store::{IngestResult, IngestSummary, Item, Source, Store};

use snapshot::SnapshotManager;

pub struct Orchestrator {
    store: Arc<Store>,
    snapshots: SnapshotManager,
    sources: Vec<SourceConfig>,
    max_concurrent: usize,
    request_timeout: Duration,
    fetch_content: bool,
    content_extractor: tokio::sync::OnceCell<ContentExtractor>,
}

impl Orchestrator {
    pub fn new(store: Arc<Store>, config: &Config) -> Self {
        Orchestrator {
            store,
            snapshots: SnapshotManager::new(config.storage.snapshot_root.clone()),
            sources: config.sources.clone(),
            max_concurrent: config.performance.max_concurrent_sources,
            request_timeout: Duration::from_secs(config.performance.request_timeout_seconds),
            fetch_content: config.performance.fetch_content,
            content_extractor: tokio::sync::OnceCell::new(),
        }
    }

    /// Lazily build the shared `ContentExtractor` on first use; cheap to
    /// skip entirely when `performance.fetch_content` is off.
    async fn extractor(&self) -> &ContentExtractor {
        self.content_extractor
            .get_or_init(|| async { ContentExtractor::new(reqwest::Client::new()).await })
            .await
    }

    /// Run the per-source pipeline for every selected, enabled source.
    /// `source_ids`: `None` means all enabled sources.
    #[instrument(skip(self))]
    pub async fn ingest(&self, source_ids: Option<&[String]>) -> IngestSummary {
        let overall_start = Instant::now();
        let selected: Vec<&SourceConfig> = self
            .sources
            .iter()
            .filter(|s| s.enabled)
            .filter(|s| source_ids.map(|ids| ids.iter().any(|id| id == &s.id)).unwrap_or(true))
            .collect();

        let results: Vec<IngestResult> = stream::iter(selected)
            .map(|source| async move { self.ingest_one(source).await })
            .buffer_unordered(self.max_concurrent.max(1))
            .collect()
            .await;

        let mut summary = IngestSummary::default();
        for result in results {
            summary.add(result);
        }
        summary.duration_seconds = overall_start.elapsed().as_secs_f64();
        info!(
            inserted = summary.total_inserted,
            duplicates = summary.total_duplicates,
            errors = summary.total_errors,
            "ingest run complete"
        );
        summary
    }

    #[instrument(skip(self, source), fields(source_id = %source.id))]
    async fn ingest_one(&self, source: &SourceConfig) -> IngestResult {
        let started = Instant::now();
        let mut result = IngestResult {
            source_id: source.id.clone(),
            ..Default::default()
        };

        let connector = match Connector::build(source) {
            Ok(c) => c,
            Err(err) => return self.fail(result, started, err).await,
        };

        let fetch = connector.fetch(&source.id);
        let raw_items = match tokio::time::timeout(self.request_timeout, fetch).await {
            Ok(Ok(items)) => items,
            Ok(Err(err)) => return self.fail(result, started, err).await,
            Err(_) => {
                return self
                    .fail(result, started, CuratorError::Parse("per-source fetch timed out".into()))
                    .await
            }
        };
        result.fetched = raw_items.len() as u64;

        let now = Utc::now();
        let today = now.date_naive();
        let mut seen_in_batch: HashSet<String> = HashSet::new();
        let mut items = Vec::with_capacity(raw_items.len());

        for raw in raw_items {
            if raw.url.trim().is_empty() {
                continue;
            }
            let mut item = normalize(source, &raw, now);
            if self.fetch_content && item.content.as_deref().unwrap_or("").is_empty() {
                match self.extractor().await.extract(&item.url).await {
                    Ok(Some(body)) => item.content = Some(body),
                    Ok(None) => {}
                    Err(err) => warn!(source_id = %source.id, %err, "content extraction failed"),
                }
            }
            if item.content.as_deref().is_some_and(|c| !c.is_empty()) {
                let path = self.snapshots.path_for(&source.id, today, &item.url);
                item.snapshot_path = Some(path.to_string_lossy().into_owned());
            }
            if !seen_in_batch.insert(item.url_canonical.clone()) {
                result.duplicates += 1;
                continue;
            }
            match self.store.url_canonical_exists(&item.url_canonical).await {
                Ok(true) => {
                    result.duplicates += 1;
                    continue;
                }
                Ok(false) => {}
                Err(err) => return self.fail(result, started, err).await,
            }
            items.push(item);
        }

        let inserted = match self.store.batch_insert_items(items.clone()).await {
            Ok(n) => n,
            Err(err) => return self.fail(result, started, err).await,
        };
        result.inserted = inserted;

        for item in &items {
            if let Some(content) = &item.content {
                if !content.is_empty() && !self.snapshots.exists(&source.id, today, &item.url) {
                    if let Err(err) = self.snapshots.save(&source.id, today, &item.url, content).await {
                        warn!(source_id = %source.id, %err, "snapshot write failed");
                    }
                }
            }
        }

        if let Err(err) = self.store.update_source_status(&source.id, Some(now), None, false).await {
            warn!(source_id = %source.id, %err, "failed to record source status");
        }

        result.duration_seconds = started.elapsed().as_secs_f64();
        result
    }

    async fn fail(&self, mut result: IngestResult, started: Instant, err: CuratorError) -> IngestResult {
        warn!(source_id = %result.source_id, %err, "source ingest failed");
        result.errors += 1;
        result.error_message = Some(err.to_string());
        result.duration_seconds = started.elapsed().as_secs_f64();
        let _ = self
            .store
            .update_source_status(&result.source_id, None, Some(err.to_string()), true)
            .await;
        result
    }

    /// Ensure every configured source has a row, preserving any existing
    /// runtime status (`upsert_source` is a plain replace on everything
    /// passed in, so callers must read-modify-write to preserve status).
    pub async fn sync_sources(&self) -> Result<()> {
        for source in &self.sources {
            let existing = self.store.get_source(&source.id).await?;
            let config_json: Value = serde_json::to_value(SourceConfigMirror::from(source))
                .map_err(|e| CuratorError::Storage(e.to_string()))?;
            let row = Source {
                id: source.id.clone(),
                config: config_json,
                last_fetch_at: existing.as_ref().and_then(|s| s.last_fetch_at),
                last_error: existing.as_ref().and_then(|s| s.last_error.clone()),
                error_count: existing.as_ref().map(|s| s.error_count).unwrap_or(0),
                enabled: source.enabled,
                created_at: existing.as_ref().and_then(|s| s.created_at).or(Some(Utc::now())),
            };
            self.store.upsert_source(row).await?;
        }
        Ok(())
    }
}

/// Round-trippable mirror of `SourceConfig` stored verbatim in `sources.config`.
#[derive(serde::Serialize)]
struct SourceConfigMirror {
    #[serde(rename = "type")]
    type_: String,
    url: String,
    category: &'static str,
    lang: String,
    authority: f64,
    refresh_hours: Option<u64>,
}

impl From<&SourceConfig> for SourceConfigMirror {
    fn from(s: &SourceConfig) -> Self {
        SourceConfigMirror {
            type_: s.type_.clone(),
            url: s.url.clone(),
            category: s.category.as_str(),
            lang: s.lang.clone(),
            authority: s.authority,
            refresh_hours: s.refresh_hours,
        }
    }
}

fn normalize(source: &SourceConfig, raw: &RawItem, now: DateTime<Utc>) -> Item {
    let url_canonical = canonicalize_url(&raw.url);
    let id = Item::make_id(&source.id, &raw.url);
    let published_at = raw
        .published_at
        .as_deref()
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or(now);

    Item {
        id,
        source_id: source.id.clone(),
        external_id: raw.external_id.clone(),
        url: raw.url.clone(),
        url_canonical,
        title: raw.title.clone().unwrap_or_else(|| "Untitled".to_string()),
        content: raw.content.clone(),
        author: raw.author.clone(),
        published_at,
        ingested_at: now,
        category: source.category,
        language: source.lang.clone(),
        metadata: raw.metadata.clone(),
        snapshot_path: None,
        cluster_id: None,
        is_representative: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn source() -> SourceConfig {
        SourceConfig {
            id: "s".into(),
            type_: "rss".into(),
            url: "https://example.com/feed".into(),
            params: HashMap::new(),
            headers: HashMap::new(),
            category: crate::config::Category::News,
            lang: "en".into(),
            authority: 0.7,
            refresh_hours: None,
            enabled: true,
        }
    }

    #[test]
    fn normalize_falls_back_to_now_on_unparseable_date() {
        let now = Utc::now();
        let raw = RawItem {
            url: "https://example.com/a".into(),
            title: Some("A".into()),
            content: None,
            author: None,
            published_at: Some("not a date".into()),
            metadata: HashMap::new(),
            external_id: None,
        };
        let item = normalize(&source(), &raw, now);
        assert_eq!(item.published_at, now);
    }

    #[test]
    fn normalize_computes_reproducible_id() {
        let now = Utc::now();
        let raw = RawItem {
            url: "https://example.com/a".into(),
            title: None,
            content: None,
            author: None,
            published_at: None,
            metadata: HashMap::new(),
            external_id: None,
        };
        let item = normalize(&source(), &raw, now);
        assert_eq!(item.id, Item::make_id("s", "https://example.com/a"));
    }
}
