use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest as _, Sha256};

use crate::config::Category;

/// A configured feed and its runtime status. `config` is the source's
/// original YAML entry round-tripped as JSON so fields the Store doesn't
/// otherwise model (params, headers, refresh_hours, ...) survive a reload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Source {
    pub id: String,
    pub config: Value,
    pub last_fetch_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
    pub error_count: i64,
    pub enabled: bool,
    pub created_at: Option<DateTime<Utc>>,
}

/// A single content item. Never mutated after insert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Item {
    pub id: String,
    pub source_id: String,
    pub external_id: Option<String>,
    pub url: String,
    pub url_canonical: String,
    pub title: String,
    pub content: Option<String>,
    pub author: Option<String>,
    pub published_at: DateTime<Utc>,
    pub ingested_at: DateTime<Utc>,
    pub category: Category,
    pub language: String,
    pub metadata: HashMap<String, Value>,
    pub snapshot_path: Option<String>,

    /// Populated only in-memory during denoise; never persisted as its own
    /// item column (it lives in the `metrics` table once computed).
    #[serde(default)]
    pub cluster_id: Option<String>,
    #[serde(default)]
    pub is_representative: bool,
}

impl Item {
    /// First 16 hex chars of sha256(`source_id:url`).
    pub fn make_id(source_id: &str, url: &str) -> String {
        let raw = format!("{source_id}:{url}");
        let digest = Sha256::digest(raw.as_bytes());
        hex_prefix(&digest, 16)
    }
}

pub fn hex_prefix(bytes: &[u8], hex_chars: usize) -> String {
    let mut s = String::with_capacity(hex_chars);
    for b in bytes {
        if s.len() >= hex_chars {
            break;
        }
        s.push_str(&format!("{b:02x}"));
    }
    s.truncate(hex_chars);
    s
}

/// Per-item scoring breakdown, one row per item per digest run (replace
/// semantics on `item_id`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Metric {
    pub item_id: String,
    pub score: f64,
    pub score_authority: f64,
    pub score_recency: f64,
    pub score_popularity: f64,
    pub score_relevance: f64,
    pub dup_penalty: f64,
    pub cluster_id: Option<String>,
    pub summary: Option<String>,
    pub computed_at: DateTime<Utc>,
}

/// One row per `(date, section)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Digest {
    pub id: Option<i64>,
    pub date: String,
    pub section: Category,
    pub content_markdown: String,
    pub content_json: Value,
    pub generated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestResult {
    pub source_id: String,
    pub fetched: u64,
    pub inserted: u64,
    pub duplicates: u64,
    pub errors: u64,
    pub duration_seconds: f64,
    pub error_message: Option<String>,
}

impl IngestResult {
    pub fn success(&self) -> bool {
        self.error_message.is_none()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestSummary {
    pub results: Vec<IngestResult>,
    pub total_fetched: u64,
    pub total_inserted: u64,
    pub total_duplicates: u64,
    pub total_errors: u64,
    pub duration_seconds: f64,
}

impl IngestSummary {
    pub fn add(&mut self, result: IngestResult) {
        self.total_fetched += result.fetched;
        self.total_inserted += result.inserted;
        self.total_duplicates += result.duplicates;
        self.total_errors += result.errors;
        self.results.push(result);
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub total_items: i64,
    pub total_sources: i64,
    pub by_category: HashMap<String, i64>,
    pub by_source: HashMap<String, i64>,
    pub size_bytes: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_id_is_reproducible() {
        let a = Item::make_id("hn", "https://example.com/a");
        let b = Item::make_id("hn", "https://example.com/a");
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn item_id_varies_with_source() {
        let a = Item::make_id("hn", "https://example.com/a");
        let b = Item::make_id("lobsters", "https://example.com/a");
        assert_ne!(a, b);
    }
}
