//! Two sequential greedy passes over an already-score-sorted list: per-source
//! quota, then per-category cap. Both passes are stable — admitted items
//! keep their relative input order.

use std::collections::HashMap;

use crate::config::{Category, CategoryLimits, ScoringConfig};
use crate::store::Item;

pub struct QuotaManager<'a> {
    scoring: &'a ScoringConfig,
    limits: &'a CategoryLimits,
}

impl<'a> QuotaManager<'a> {
    pub fn new(scoring: &'a ScoringConfig, limits: &'a CategoryLimits) -> Self {
        QuotaManager { scoring, limits }
    }

    /// `scored` must already be sorted by score descending. Returns the
    /// admitted prefix in the same relative order.
    pub fn apply(&self, scored: Vec<Item>) -> Vec<Item> {
        let mut per_source_count: HashMap<String, u32> = HashMap::new();
        let after_source_quota: Vec<Item> = scored
            .into_iter()
            .filter(|item| {
                let count = per_source_count.entry(item.source_id.clone()).or_insert(0);
                let quota = self.scoring.quota_for(&item.source_id);
                if *count < quota {
                    *count += 1;
                    true
                } else {
                    false
                }
            })
            .collect();

        let mut per_category_count: HashMap<Category, usize> = HashMap::new();
        after_source_quota
            .into_iter()
            .filter(|item| {
                let count = per_category_count.entry(item.category).or_insert(0);
                let cap = self.limits.for_category(item.category);
                if *count < cap {
                    *count += 1;
                    true
                } else {
                    false
                }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap as Map;

    fn item(id: &str, source_id: &str) -> Item {
        Item {
            id: id.into(),
            source_id: source_id.into(),
            external_id: None,
            url: format!("https://example.com/{id}"),
            url_canonical: format!("https://example.com/{id}"),
            title: "Title".into(),
            content: None,
            author: None,
            published_at: Utc::now(),
            ingested_at: Utc::now(),
            category: Category::News,
            language: "en".into(),
            metadata: Map::new(),
            snapshot_path: None,
            cluster_id: None,
            is_representative: true,
        }
    }

    #[test]
    fn quota_then_cap_admits_expected_prefix() {
        let scoring = ScoringConfig {
            quotas: HashMap::from([("a".to_string(), 2), ("b".to_string(), 10)]),
            ..Default::default()
        };
        let limits = CategoryLimits {
            news: 3,
            tips: 20,
            paper: 10,
        };
        let items: Vec<Item> = (0..5)
            .map(|i| item(&format!("a{i}"), "a"))
            .chain((0..5).map(|i| item(&format!("b{i}"), "b")))
            .collect();
        let manager = QuotaManager::new(&scoring, &limits);
        let admitted = manager.apply(items);
        let ids: Vec<&str> = admitted.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["a0", "a1", "b0"]);
    }

    #[test]
    fn preserves_relative_order_among_admitted_items() {
        let scoring = ScoringConfig::default();
        let limits = CategoryLimits::default();
        let items = vec![item("x", "s1"), item("y", "s2"), item("z", "s1")];
        let manager = QuotaManager::new(&scoring, &limits);
        let admitted = manager.apply(items);
        let ids: Vec<&str> = admitted.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["x", "y", "z"]);
    }
}
