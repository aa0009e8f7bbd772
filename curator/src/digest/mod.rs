//! Composes the denoise pipeline (D -> E -> F -> G) with summarization into
//! a single [`Digest`] artifact per date, mirroring the per-section shape
//! the Store persists.

pub mod summarizer;

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::json;
use tracing::{info, instrument};

use crate::config::{Category, Config};
use crate::denoise::{DedupClusterer, HardFilter, QuotaManager, Scorer};
use crate::store::{Digest, Item, Metric};

pub use summarizer::{MockSummarizer, Summarizer, SummaryCache};

/// One admitted item plus its score breakdown and summary, in final
/// per-category admission order.
pub struct DigestEntry {
    pub item: Item,
    pub metric: Metric,
    pub summary: String,
}

pub struct DigestGenerator<'a> {
    config: &'a Config,
    now: DateTime<Utc>,
    summarizer: &'a dyn Summarizer,
}

impl<'a> DigestGenerator<'a> {
    pub fn new(config: &'a Config, now: DateTime<Utc>, summarizer: &'a dyn Summarizer) -> Self {
        DigestGenerator {
            config,
            now,
            summarizer,
        }
    }

    /// Run D -> E -> F -> G -> Summarizer over `items` and build one
    /// [`Digest`] row per section, plus the metrics that back them.
    #[instrument(skip(self, items), fields(date = %date, n_items = items.len()))]
    pub async fn generate(&self, items: Vec<Item>, date: &str) -> (Vec<Digest>, Vec<Metric>) {
        let filter = HardFilter::new(&self.config.scoring, &self.config.sources);
        let filtered = filter.apply_all(items);

        let clusterer = DedupClusterer::new(self.config.performance.similarity_threshold);
        let clustered = clusterer.cluster(filtered);

        let scorer = Scorer::new(self.now, self.config.scoring.weights.clone(), &self.config.sources);
        let metrics = scorer.score_batch(&clustered);
        let metric_by_id: HashMap<String, Metric> =
            metrics.iter().cloned().map(|m| (m.item_id.clone(), m)).collect();

        let mut scored_items = clustered;
        scored_items.sort_by(|a, b| {
            let score_a = metric_by_id.get(&a.id).map(|m| m.score).unwrap_or(0.0);
            let score_b = metric_by_id.get(&b.id).map(|m| m.score).unwrap_or(0.0);
            score_b
                .partial_cmp(&score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        let quota = QuotaManager::new(&self.config.scoring, &self.config.digest.limits);
        let admitted = quota.apply(scored_items);

        let summaries = self.summarizer.summarize(&admitted).await;

        let mut by_section: HashMap<Category, Vec<DigestEntry>> = HashMap::new();
        let mut final_metrics = Vec::with_capacity(admitted.len());
        for item in admitted {
            let mut metric = metric_by_id
                .get(&item.id)
                .cloned()
                .unwrap_or_else(|| zero_metric(&item, self.now));
            let summary = summaries
                .get(&item.id)
                .cloned()
                .unwrap_or_else(|| item.title.chars().take(200).collect());
            metric.summary = Some(summary.clone());
            final_metrics.push(metric.clone());
            by_section.entry(item.category).or_default().push(DigestEntry {
                item,
                metric,
                summary,
            });
        }

        let digests: Vec<Digest> = [Category::News, Category::Tips, Category::Paper]
            .into_iter()
            .map(|section| {
                let entries = by_section.remove(&section).unwrap_or_default();
                render_digest(date, section, &entries, self.now)
            })
            .collect();

        info!(
            total_admitted = final_metrics.len(),
            "digest generated"
        );

        (digests, final_metrics)
    }
}

fn zero_metric(item: &Item, now: DateTime<Utc>) -> Metric {
    Metric {
        item_id: item.id.clone(),
        score: 0.0,
        score_authority: 0.0,
        score_recency: 0.0,
        score_popularity: 0.0,
        score_relevance: 0.0,
        dup_penalty: 0.0,
        cluster_id: item.cluster_id.clone(),
        summary: None,
        computed_at: now,
    }
}

fn render_digest(date: &str, section: Category, entries: &[DigestEntry], now: DateTime<Utc>) -> Digest {
    let mut markdown = format!("# {} digest — {date}\n\n", section_title(section));
    if entries.is_empty() {
        markdown.push_str("_No items today._\n");
    }
    for entry in entries {
        markdown.push_str(&format!(
            "## [{}]({})\n\nscore: {:.3} · {}\n\n",
            entry.item.title, entry.item.url, entry.metric.score, entry.summary
        ));
    }

    let json_entries: Vec<_> = entries
        .iter()
        .map(|entry| {
            json!({
                "id": entry.item.id,
                "title": entry.item.title,
                "url": entry.item.url,
                "source_id": entry.item.source_id,
                "published_at": entry.item.published_at,
                "score": entry.metric.score,
                "score_breakdown": {
                    "authority": entry.metric.score_authority,
                    "recency": entry.metric.score_recency,
                    "popularity": entry.metric.score_popularity,
                    "relevance": entry.metric.score_relevance,
                    "dup_penalty": entry.metric.dup_penalty,
                },
                "cluster_id": entry.item.cluster_id,
                "is_representative": entry.item.is_representative,
                "summary": entry.summary,
            })
        })
        .collect();

    Digest {
        id: None,
        date: date.to_string(),
        section,
        content_markdown: markdown,
        content_json: json!({ "date": date, "section": section.as_str(), "items": json_entries }),
        generated_at: Some(now),
    }
}

fn section_title(section: Category) -> &'static str {
    match section {
        Category::News => "News",
        Category::Tips => "Tips",
        Category::Paper => "Papers",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, SourceConfig};
    use std::collections::HashMap as Map;

    fn config_with_source() -> Config {
        Config {
            sources: vec![SourceConfig {
                id: "s".into(),
                type_: "rss".into(),
                url: "https://example.com/feed".into(),
                params: Map::new(),
                headers: Map::new(),
                category: Category::News,
                lang: "en".into(),
                authority: 0.6,
                refresh_hours: None,
                enabled: true,
            }],
            scoring: Default::default(),
            performance: Default::default(),
            digest: Default::default(),
            llm: Default::default(),
            storage: Default::default(),
            logging: Default::default(),
        }
    }

    fn item(id: &str, title: &str) -> Item {
        Item {
            id: id.into(),
            source_id: "s".into(),
            external_id: None,
            url: format!("https://example.com/{id}"),
            url_canonical: format!("https://example.com/{id}"),
            title: title.into(),
            content: Some("Some body content about the topic at hand.".into()),
            author: None,
            published_at: Utc::now(),
            ingested_at: Utc::now(),
            category: Category::News,
            language: "en".into(),
            metadata: Map::new(),
            snapshot_path: None,
            cluster_id: None,
            is_representative: false,
        }
    }

    #[tokio::test]
    async fn generate_produces_three_sections_with_one_scored_item() {
        let config = config_with_source();
        let now = Utc::now();
        let summarizer = MockSummarizer::new();
        let generator = DigestGenerator::new(&config, now, &summarizer);
        let items = vec![item("a", "A title about Rust")];
        let (digests, metrics) = generator.generate(items, "2026-07-28").await;

        assert_eq!(digests.len(), 3);
        assert_eq!(metrics.len(), 1);
        let news = digests.iter().find(|d| d.section == Category::News).unwrap();
        assert!(news.content_markdown.contains("A title about Rust"));
    }
}
