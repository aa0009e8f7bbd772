//! Three sequential, independently optional gates applied before clustering.

use std::collections::HashMap;

use regex::Regex;

use crate::config::{ScoringConfig, SourceConfig};
use crate::store::Item;

pub struct HardFilter {
    exclude_patterns: Vec<Regex>,
    source_languages: HashMap<String, String>,
    min_popularity: HashMap<String, HashMap<String, f64>>,
}

impl HardFilter {
    pub fn new(scoring: &ScoringConfig, sources: &[SourceConfig]) -> Self {
        let exclude_patterns = scoring
            .keywords_exclude
            .iter()
            .filter_map(|kw| Regex::new(&format!("(?i){}", regex::escape(kw))).ok())
            .collect();
        let source_languages = sources
            .iter()
            .map(|s| (s.id.clone(), s.lang.clone()))
            .collect();
        HardFilter {
            exclude_patterns,
            source_languages,
            min_popularity: scoring.min_popularity.clone(),
        }
    }

    pub fn apply_all(&self, items: Vec<Item>) -> Vec<Item> {
        items
            .into_iter()
            .filter(|item| !self.is_excluded_by_keyword(item))
            .filter(|item| !self.is_wrong_language(item))
            .filter(|item| !self.is_below_popularity_minimum(item))
            .collect()
    }

    fn is_excluded_by_keyword(&self, item: &Item) -> bool {
        if self.exclude_patterns.is_empty() {
            return false;
        }
        let haystack = format!("{} {}", item.title, item.content.as_deref().unwrap_or(""));
        self.exclude_patterns.iter().any(|re| re.is_match(&haystack))
    }

    fn is_wrong_language(&self, item: &Item) -> bool {
        match self.source_languages.get(&item.source_id) {
            Some(declared) => declared != &item.language,
            None => false,
        }
    }

    fn is_below_popularity_minimum(&self, item: &Item) -> bool {
        let Some(minima) = self.min_popularity.get(&item.source_id) else {
            return false;
        };
        for (key, min_val) in minima {
            let raw = item.metadata.get(key).and_then(|v| v.as_f64()).unwrap_or(0.0);
            if raw < *min_val {
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap as Map;

    fn item(source_id: &str, title: &str, lang: &str) -> Item {
        Item {
            id: "x".into(),
            source_id: source_id.into(),
            external_id: None,
            url: "https://example.com".into(),
            url_canonical: "https://example.com".into(),
            title: title.into(),
            content: None,
            author: None,
            published_at: Utc::now(),
            ingested_at: Utc::now(),
            category: crate::config::Category::News,
            language: lang.into(),
            metadata: Map::new(),
            snapshot_path: None,
            cluster_id: None,
            is_representative: false,
        }
    }

    #[test]
    fn drops_keyword_matches_case_insensitively() {
        let scoring = ScoringConfig {
            keywords_exclude: vec!["crypto".to_string()],
            ..Default::default()
        };
        let filter = HardFilter::new(&scoring, &[]);
        let items = vec![item("s", "New CRYPTO coin launches", "en")];
        assert!(filter.apply_all(items).is_empty());
    }

    #[test]
    fn drops_items_whose_language_mismatches_source() {
        let scoring = ScoringConfig::default();
        let source = SourceConfig {
            id: "s".into(),
            type_: "rss".into(),
            url: "https://example.com/feed".into(),
            params: Map::new(),
            headers: Map::new(),
            category: crate::config::Category::News,
            lang: "fr".into(),
            authority: 0.5,
            refresh_hours: None,
            enabled: true,
        };
        let filter = HardFilter::new(&scoring, &[source]);
        let items = vec![item("s", "Some title", "en")];
        assert!(filter.apply_all(items).is_empty());
    }

    #[test]
    fn drops_items_below_popularity_minimum() {
        let mut minima = Map::new();
        let mut per_source = Map::new();
        per_source.insert("points".to_string(), 50.0);
        minima.insert("s".to_string(), per_source);
        let scoring = ScoringConfig {
            min_popularity: minima,
            ..Default::default()
        };
        let filter = HardFilter::new(&scoring, &[]);
        let mut low = item("s", "Low popularity item", "en");
        low.metadata.insert("points".to_string(), serde_json::json!(10));
        assert!(filter.apply_all(vec![low]).is_empty());
    }

    #[test]
    fn drops_items_missing_the_popularity_metadata_key_entirely() {
        let mut minima = Map::new();
        let mut per_source = Map::new();
        per_source.insert("points".to_string(), 50.0);
        minima.insert("s".to_string(), per_source);
        let scoring = ScoringConfig {
            min_popularity: minima,
            ..Default::default()
        };
        let filter = HardFilter::new(&scoring, &[]);
        let missing = item("s", "No popularity metadata at all", "en");
        assert!(filter.apply_all(vec![missing]).is_empty());
    }
}
