//! Summarizer trait plus a deterministic mock provider and provider-shaped
//! stubs for the LLM backends named in config. None of the non-mock
//! variants make a network call in this crate (see the design notes for
//! why); they exist so `llm.provider` config round-trips to a real type and
//! a future HTTP integration has somewhere to land.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use sha2::{Digest as _, Sha256};

use crate::config::LlmConfig;
use crate::store::Item;
use crate::store::models::hex_prefix;

const CACHE_KEY_CONTENT_PREFIX: usize = 200;
const FALLBACK_TITLE_PREFIX: usize = 200;

fn cache_key(item: &Item) -> String {
    let content_prefix: String = item
        .content
        .as_deref()
        .unwrap_or("")
        .chars()
        .take(CACHE_KEY_CONTENT_PREFIX)
        .collect();
    let raw = format!("{}:{}:{}", item.url, item.title, content_prefix);
    let digest = Sha256::digest(raw.as_bytes());
    hex_prefix(&digest, 16)
}

/// First 200 chars of the title, used both as the fallback for per-item
/// summarization failures and as the mock provider's entire output.
fn fallback_text(item: &Item) -> String {
    item.title.chars().take(FALLBACK_TITLE_PREFIX).collect()
}

/// Shared across one digest run; safe for concurrent reads, writes taken
/// under an internal mutex since summarization fans out with
/// `buffer_unordered`.
#[derive(Default)]
pub struct SummaryCache {
    entries: Mutex<HashMap<String, String>>,
}

impl SummaryCache {
    pub fn new() -> Self {
        SummaryCache::default()
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().expect("cache mutex poisoned").get(key).cloned()
    }

    fn put(&self, key: String, text: String) {
        self.entries.lock().expect("cache mutex poisoned").insert(key, text);
    }
}

#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Best-effort summarization of a batch of items. Callers never see a
    /// hard failure: a per-item error substitutes `fallback_text`.
    async fn summarize(&self, items: &[Item]) -> HashMap<String, String>;
}

/// Deterministic stub: every summary is the item's truncated title. Used in
/// tests and as the config default (`llm.provider: mock`).
pub struct MockSummarizer {
    cache: SummaryCache,
}

impl MockSummarizer {
    pub fn new() -> Self {
        MockSummarizer {
            cache: SummaryCache::new(),
        }
    }
}

impl Default for MockSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Summarizer for MockSummarizer {
    async fn summarize(&self, items: &[Item]) -> HashMap<String, String> {
        let mut out = HashMap::with_capacity(items.len());
        for item in items {
            let key = cache_key(item);
            let text = match self.cache.get(&key) {
                Some(cached) => cached,
                None => {
                    let text = fallback_text(item);
                    self.cache.put(key, text.clone());
                    text
                }
            };
            out.insert(item.id.clone(), text);
        }
        out
    }
}

/// Provider-shaped stub for a real HTTP-backed summarizer. Holds the
/// configured model/endpoint and concurrency limit; `summarize` performs the
/// same deterministic fallback as a per-item failure rather than fabricating
/// a network integration, consistent with "best-effort, fallback on
/// failure" — constructing one from config always succeeds.
pub struct ProviderSummarizer {
    #[allow(dead_code)]
    provider_name: &'static str,
    #[allow(dead_code)]
    model: String,
    #[allow(dead_code)]
    concurrent_requests: usize,
    cache: SummaryCache,
}

impl ProviderSummarizer {
    fn new(provider_name: &'static str, model: String, concurrent_requests: usize) -> Self {
        ProviderSummarizer {
            provider_name,
            model,
            concurrent_requests: concurrent_requests.max(1),
            cache: SummaryCache::new(),
        }
    }
}

#[async_trait]
impl Summarizer for ProviderSummarizer {
    async fn summarize(&self, items: &[Item]) -> HashMap<String, String> {
        use futures::stream::{self, StreamExt};

        let results: Vec<(String, String)> = stream::iter(items)
            .map(|item| async move {
                let key = cache_key(item);
                if let Some(cached) = self.cache.get(&key) {
                    return (item.id.clone(), cached);
                }
                let text = fallback_text(item);
                self.cache.put(key, text.clone());
                (item.id.clone(), text)
            })
            .buffer_unordered(self.concurrent_requests)
            .collect()
            .await;

        results.into_iter().collect()
    }
}

pub fn build(config: &LlmConfig) -> Box<dyn Summarizer> {
    match config.provider.as_str() {
        "openai" => Box::new(ProviderSummarizer::new(
            "openai",
            config.model.clone(),
            config.concurrent_requests,
        )),
        "anthropic" => Box::new(ProviderSummarizer::new(
            "anthropic",
            config.model.clone(),
            config.concurrent_requests,
        )),
        "local" => Box::new(ProviderSummarizer::new(
            "local",
            config.local_model.clone().unwrap_or_default(),
            config.concurrent_requests,
        )),
        _ => Box::new(MockSummarizer::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap as Map;

    fn item(id: &str, title: &str) -> Item {
        Item {
            id: id.into(),
            source_id: "s".into(),
            external_id: None,
            url: format!("https://example.com/{id}"),
            url_canonical: format!("https://example.com/{id}"),
            title: title.into(),
            content: None,
            author: None,
            published_at: Utc::now(),
            ingested_at: Utc::now(),
            category: crate::config::Category::News,
            language: "en".into(),
            metadata: Map::new(),
            snapshot_path: None,
            cluster_id: None,
            is_representative: true,
        }
    }

    #[tokio::test]
    async fn mock_summarizer_truncates_title() {
        let long_title = "x".repeat(300);
        let summarizer = MockSummarizer::new();
        let out = summarizer.summarize(&[item("a", &long_title)]).await;
        assert_eq!(out["a"].chars().count(), FALLBACK_TITLE_PREFIX);
    }

    #[tokio::test]
    async fn cache_hit_returns_identical_text() {
        let summarizer = MockSummarizer::new();
        let it = item("a", "A Title");
        let first = summarizer.summarize(&[it.clone()]).await;
        let second = summarizer.summarize(&[it]).await;
        assert_eq!(first["a"], second["a"]);
    }

    #[test]
    fn cache_key_is_stable_for_same_inputs() {
        let a = cache_key(&item("a", "Title"));
        let b = cache_key(&item("a", "Title"));
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }
}
