//! Multi-factor weighted scoring. A `Scorer` is built fresh per digest run
//! with an injected `now` so recency stays deterministic in tests.

use chrono::{DateTime, Utc};
use regex::Regex;

use crate::config::{SourceConfig, Weights};
use crate::store::{Item, Metric};

const RECENCY_FALLBACK_DAYS: f64 = 30.0;
const RECENCY_HALFLIFE_DAYS: f64 = 7.0;
const POPULARITY_FALLBACK_MAX: f64 = 1000.0;
const RELEVANCE_SATURATION: f64 = 3.0;
const DEFAULT_POPULARITY_KEYS: &[&str] = &["points", "score", "stars", "likes_count", "likes"];
const RELEVANCE_CONTENT_PREFIX: usize = 1000;

fn relevance_keywords() -> Vec<&'static str> {
    vec![
        "\\bllm\\b",
        "\\blarge language model\\b",
        "\\bgpt\\b",
        "\\btransformer\\b",
        "\\brag\\b",
        "\\bretrieval.augmented\\b",
        "\\bagent\\b",
        "\\bfine.?tun",
        "\\bembedding\\b",
        "\\bvector\\b",
        "\\bmultimodal\\b",
        "\\bdiffusion\\b",
        "\\breinforcement learning\\b",
        "\\bneural\\b",
        "\\bdeep learning\\b",
        "\\bprompt\\b",
        "\\bclaude\\b",
        "\\bopenai\\b",
        "\\banthrop",
        "\\bmcp\\b",
        "\\bai\\b",
        "\\bmachine learning\\b",
    ]
}

pub struct Scorer {
    now: DateTime<Utc>,
    weights: Weights,
    source_authority: std::collections::HashMap<String, f64>,
    source_popularity_key: std::collections::HashMap<String, String>,
    relevance_patterns: Vec<Regex>,
}

impl Scorer {
    pub fn new(now: DateTime<Utc>, weights: Weights, sources: &[SourceConfig]) -> Self {
        let source_authority = sources.iter().map(|s| (s.id.clone(), s.authority)).collect();
        let relevance_patterns = relevance_keywords()
            .into_iter()
            .map(|kw| Regex::new(&format!("(?i){kw}")).expect("static pattern"))
            .collect();
        Scorer {
            now,
            weights,
            source_authority,
            source_popularity_key: std::collections::HashMap::new(),
            relevance_patterns,
        }
    }

    /// Declare which metadata key holds the popularity signal for a source,
    /// overriding the fixed fallback list.
    pub fn with_popularity_key(mut self, source_id: &str, key: &str) -> Self {
        self.source_popularity_key
            .insert(source_id.to_string(), key.to_string());
        self
    }

    pub fn score_batch(&self, items: &[Item]) -> Vec<Metric> {
        let batch_max = self.per_source_popularity_max(items);
        items
            .iter()
            .map(|item| self.score_one(item, &batch_max))
            .collect()
    }

    fn score_one(&self, item: &Item, batch_max: &std::collections::HashMap<String, f64>) -> Metric {
        let authority = self.authority(item);
        let recency = self.recency(item);
        let popularity = self.popularity(item, batch_max);
        let relevance = self.relevance(item);
        let dup_penalty = if item.is_representative || item.cluster_id.is_none() {
            0.0
        } else {
            1.0
        };

        let total = self.weights.authority * authority + self.weights.recency * recency
            + self.weights.popularity * popularity
            + self.weights.relevance * relevance
            - self.weights.dup_penalty * dup_penalty;

        Metric {
            item_id: item.id.clone(),
            score: total.clamp(0.0, 1.0),
            score_authority: authority,
            score_recency: recency,
            score_popularity: popularity,
            score_relevance: relevance,
            dup_penalty,
            cluster_id: item.cluster_id.clone(),
            summary: None,
            computed_at: self.now,
        }
    }

    fn authority(&self, item: &Item) -> f64 {
        self.source_authority
            .get(&item.source_id)
            .copied()
            .unwrap_or(0.5)
    }

    fn recency(&self, item: &Item) -> f64 {
        let days = (self.now - item.published_at).num_seconds() as f64 / 86_400.0;
        let days = if days.is_finite() { days } else { RECENCY_FALLBACK_DAYS };
        (-days.max(0.0) / RECENCY_HALFLIFE_DAYS).exp()
    }

    fn popularity_key<'a>(&'a self, source_id: &str) -> Option<&'a str> {
        self.source_popularity_key.get(source_id).map(String::as_str)
    }

    fn raw_popularity(&self, item: &Item) -> Option<f64> {
        if let Some(key) = self.popularity_key(&item.source_id) {
            if let Some(v) = item.metadata.get(key).and_then(|v| v.as_f64()) {
                return Some(v);
            }
        }
        DEFAULT_POPULARITY_KEYS
            .iter()
            .find_map(|k| item.metadata.get(*k).and_then(|v| v.as_f64()))
    }

    fn per_source_popularity_max(&self, items: &[Item]) -> std::collections::HashMap<String, f64> {
        let mut maxima: std::collections::HashMap<String, f64> = std::collections::HashMap::new();
        for item in items {
            if let Some(raw) = self.raw_popularity(item) {
                let entry = maxima.entry(item.source_id.clone()).or_insert(0.0);
                if raw > *entry {
                    *entry = raw;
                }
            }
        }
        maxima
    }

    /// `log1p(raw) / log1p(max)`. When `raw > 0` but the batch has no usable
    /// per-source maximum, falls back to a fixed reference max of 1000.0
    /// rather than emitting 0 (see the design notes for why).
    fn popularity(&self, item: &Item, batch_max: &std::collections::HashMap<String, f64>) -> f64 {
        let Some(raw) = self.raw_popularity(item) else {
            return 0.0;
        };
        if raw <= 0.0 {
            return 0.0;
        }
        let max = batch_max
            .get(&item.source_id)
            .copied()
            .filter(|&m| m >= 1.0)
            .unwrap_or(POPULARITY_FALLBACK_MAX);
        (raw.ln_1p() / max.ln_1p()).clamp(0.0, 1.0)
    }

    fn relevance(&self, item: &Item) -> f64 {
        let content_prefix: String = item
            .content
            .as_deref()
            .unwrap_or("")
            .chars()
            .take(RELEVANCE_CONTENT_PREFIX)
            .collect();
        let haystack = format!("{} {}", item.title, content_prefix);
        let matches = self
            .relevance_patterns
            .iter()
            .filter(|re| re.is_match(&haystack))
            .count();
        (matches as f64 / RELEVANCE_SATURATION).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashMap as Map;

    fn item(source_id: &str, published_at: DateTime<Utc>) -> Item {
        Item {
            id: "x".into(),
            source_id: source_id.into(),
            external_id: None,
            url: "https://example.com".into(),
            url_canonical: "https://example.com".into(),
            title: "Title".into(),
            content: None,
            author: None,
            published_at,
            ingested_at: published_at,
            category: crate::config::Category::News,
            language: "en".into(),
            metadata: Map::new(),
            snapshot_path: None,
            cluster_id: None,
            is_representative: true,
        }
    }

    #[test]
    fn recency_at_zero_days_is_one() {
        let now = Utc::now();
        let scorer = Scorer::new(now, Weights::default(), &[]);
        let r = scorer.recency(&item("s", now));
        assert!((r - 1.0).abs() < 1e-9);
    }

    #[test]
    fn recency_at_seven_days_matches_exp_decay() {
        let now = Utc::now();
        let scorer = Scorer::new(now, Weights::default(), &[]);
        let r = scorer.recency(&item("s", now - Duration::days(7)));
        assert!((r - std::f64::consts::E.recip()).abs() < 1e-6);
    }

    #[test]
    fn popularity_falls_back_to_reference_max_without_batch_maximum() {
        let now = Utc::now();
        let scorer = Scorer::new(now, Weights::default(), &[]);
        let mut it = item("s", now);
        it.metadata.insert("points".to_string(), serde_json::json!(50));
        let empty_max = std::collections::HashMap::new();
        let p = scorer.popularity(&it, &empty_max);
        assert!((p - (50f64.ln_1p() / 1000f64.ln_1p())).abs() < 1e-9);
    }

    #[test]
    fn score_is_clamped_to_unit_interval() {
        let now = Utc::now();
        let scorer = Scorer::new(now, Weights::default(), &[]);
        let it = item("s", now);
        let metrics = scorer.score_batch(&[it]);
        assert!(metrics[0].score >= 0.0 && metrics[0].score <= 1.0);
    }

    #[test]
    fn non_representative_clustered_item_gets_dup_penalty() {
        let now = Utc::now();
        let scorer = Scorer::new(now, Weights::default(), &[]);
        let mut it = item("s", now);
        it.cluster_id = Some("c1".to_string());
        it.is_representative = false;
        let metrics = scorer.score_batch(&[it]);
        assert_eq!(metrics[0].dup_penalty, 1.0);
    }
}
