use std::collections::HashMap;

use chrono::Utc;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use curator::config::Category;
use curator::denoise::DedupClusterer;
use curator::store::Item;
use rand::Rng;

pub fn criterion_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("dedup_cluster");
    for n in [10, 100, 1000, 5000].iter() {
        let items = generate_items(*n);
        group.bench_function(BenchmarkId::new("minhash_lsh", n), |b| {
            b.iter(|| {
                let clusterer = DedupClusterer::new(0.85);
                clusterer.cluster(items.clone())
            })
        });
    }
    group.finish();
}

/// A mix of exact near-duplicates (same topic, reworded title) and distinct
/// items, so the banded MinHash pass actually has candidate pairs to check
/// rather than degenerating into all-singleton clusters.
fn generate_items(n: usize) -> Vec<Item> {
    let topics = [
        "OpenAI releases a new model",
        "Rust compiler gets a speedup",
        "Local sports team wins championship",
        "New study on climate patterns",
        "Startup raises a funding round",
    ];
    let mut rng = rand::rng();
    let mut items = Vec::with_capacity(n);
    for i in 0..n {
        let topic = topics[i % topics.len()];
        let variant: u32 = rng.random_range(0..3);
        let title = match variant {
            0 => topic.to_string(),
            1 => format!("{topic} today"),
            _ => format!("Report: {topic} according to sources"),
        };
        items.push(Item {
            id: format!("item-{i}"),
            source_id: "bench".into(),
            external_id: None,
            url: format!("https://example.com/article-{i}"),
            url_canonical: format!("https://example.com/article-{i}"),
            title,
            content: Some(format!("{topic} — extended coverage body text number {i}.")),
            author: None,
            published_at: Utc::now(),
            ingested_at: Utc::now(),
            category: Category::News,
            language: "en".into(),
            metadata: HashMap::new(),
            snapshot_path: None,
            cluster_id: None,
            is_representative: false,
        });
    }
    items
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
