//! URL canonicalization and MinHash-LSH near-duplicate clustering.
//!
//! Phase A groups items that share a canonical URL outright. Phase B treats
//! each URL-cluster's representative as one document and clusters those by
//! approximate Jaccard similarity over character shingles, using banded
//! MinHash so we never pay the full pairwise comparison cost.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use unicode_normalization::UnicodeNormalization;
use url::Url;

use crate::store::Item;

const MERSENNE_61: u64 = (1u64 << 61) - 1;
const PERMUTATIONS: usize = 128;
const MINHASH_SEED: u64 = 42;
const SHINGLE_SIZE: usize = 3;
const BANDS: usize = 16;
const ROWS_PER_BAND: usize = 8;
const SUMMARY_PREFIX_CHARS: usize = 500;

const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "ref",
    "source",
    "fbclid",
    "gclid",
];

/// Shared by the orchestrator (Item construction) and this clusterer so the
/// cross-source `url_canonical` uniqueness invariant can't silently diverge.
pub fn canonicalize_url(raw: &str) -> String {
    match Url::parse(raw) {
        Ok(mut url) => {
            let scheme = url.scheme().to_ascii_lowercase();
            let _ = url.set_scheme(&scheme);
            if let Some(host) = url.host_str() {
                let mut host = host.to_ascii_lowercase();
                if host.ends_with('.') {
                    host.pop();
                }
                let _ = url.set_host(Some(&host));
            }
            url.set_fragment(None);

            let path = url.path();
            let collapsed = if path.is_empty() {
                "/".to_string()
            } else if path.len() > 1 && path.ends_with('/') {
                path.trim_end_matches('/').to_string()
            } else {
                path.to_string()
            };
            url.set_path(&collapsed);

            let kept: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(k, _)| !TRACKING_PARAMS.contains(&k.to_ascii_lowercase().as_str()))
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            if kept.is_empty() {
                url.set_query(None);
            } else {
                url.query_pairs_mut().clear().extend_pairs(&kept);
            }
            url.to_string()
        }
        Err(_) => raw.trim().to_ascii_lowercase(),
    }
}

/// Normalized key string for content-similarity comparison: lowercase,
/// NFKC-normalized, whitespace-collapsed `title + first 500 chars of content`.
fn normalized_key(item: &Item) -> String {
    let content_prefix: String = item
        .content
        .as_deref()
        .unwrap_or("")
        .chars()
        .take(SUMMARY_PREFIX_CHARS)
        .collect();
    let raw = format!("{} {}", item.title, content_prefix);
    let lowered = raw.to_lowercase();
    let normalized: String = lowered.nfkc().collect();
    normalized.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn shingles(key: &str) -> Vec<u64> {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() < SHINGLE_SIZE {
        if chars.is_empty() {
            return Vec::new();
        }
        return vec![hash_str(key)];
    }
    chars
        .windows(SHINGLE_SIZE)
        .map(|w| hash_str(&w.iter().collect::<String>()))
        .collect()
}

fn hash_str(s: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

struct HashFamily {
    coeffs: Vec<(u64, u64)>,
}

impl HashFamily {
    fn new() -> Self {
        let mut rng = StdRng::seed_from_u64(MINHASH_SEED);
        let coeffs = (0..PERMUTATIONS)
            .map(|_| {
                let a = rng.random_range(1..=MERSENNE_61 - 1);
                let b = rng.random_range(0..=MERSENNE_61 - 1);
                (a, b)
            })
            .collect();
        HashFamily { coeffs }
    }

    /// MinHash signature over `shingles`. An empty shingle set yields a
    /// signature of all `u32::MAX`, matching sparse/empty documents.
    fn signature(&self, shingle_hashes: &[u64]) -> Vec<u32> {
        if shingle_hashes.is_empty() {
            return vec![u32::MAX; PERMUTATIONS];
        }
        self.coeffs
            .iter()
            .map(|&(a, b)| {
                shingle_hashes
                    .iter()
                    .map(|&x| {
                        let h = ((a as u128 * x as u128 + b as u128) % MERSENNE_61 as u128) as u64;
                        (h & 0xFFFF_FFFF) as u32
                    })
                    .min()
                    .unwrap()
            })
            .collect()
    }
}

fn jaccard_estimate(a: &[u32], b: &[u32]) -> f64 {
    let matching = a.iter().zip(b.iter()).filter(|(x, y)| x == y).count();
    matching as f64 / PERMUTATIONS as f64
}

fn band_buckets(signature: &[u32]) -> Vec<u64> {
    signature
        .chunks(ROWS_PER_BAND)
        .enumerate()
        .map(|(band_idx, chunk)| {
            let mut hasher = DefaultHasher::new();
            band_idx.hash(&mut hasher);
            chunk.hash(&mut hasher);
            hasher.finish()
        })
        .collect()
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        if self.parent[x] != x {
            self.parent[x] = self.find(self.parent[x]);
        }
        self.parent[x]
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.parent[ra] = rb;
        }
    }
}

/// `(content.len() DESC, published_at ASC, id ASC)` — see the design notes on
/// why this replaces the original's non-portable `hash(published_at)` key.
fn pick_representative(items: &[&Item]) -> usize {
    let mut best = 0;
    for (idx, item) in items.iter().enumerate().skip(1) {
        let candidate = items[best];
        let better = match item
            .content
            .as_deref()
            .unwrap_or("")
            .len()
            .cmp(&candidate.content.as_deref().unwrap_or("").len())
        {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => match item.published_at.cmp(&candidate.published_at) {
                std::cmp::Ordering::Less => true,
                std::cmp::Ordering::Greater => false,
                std::cmp::Ordering::Equal => item.id < candidate.id,
            },
        };
        if better {
            best = idx;
        }
    }
    best
}

pub struct DedupClusterer {
    similarity_threshold: f64,
    family: HashFamily,
}

impl DedupClusterer {
    pub fn new(similarity_threshold: f64) -> Self {
        DedupClusterer {
            similarity_threshold,
            family: HashFamily::new(),
        }
    }

    /// Cluster `items` in place, tagging each with `cluster_id` and
    /// `is_representative`, and return them flattened back into one list.
    pub fn cluster(&self, mut items: Vec<Item>) -> Vec<Item> {
        if items.is_empty() {
            return items;
        }

        // Phase A: group by canonical URL, in encounter order.
        let mut url_groups: Vec<Vec<usize>> = Vec::new();
        let mut group_index: HashMap<String, usize> = HashMap::new();
        for (idx, item) in items.iter().enumerate() {
            let key = item.url_canonical.clone();
            match group_index.get(&key) {
                Some(&gi) => url_groups[gi].push(idx),
                None => {
                    group_index.insert(key, url_groups.len());
                    url_groups.push(vec![idx]);
                }
            }
        }

        let representatives: Vec<usize> = url_groups
            .iter()
            .map(|group| {
                let refs: Vec<&Item> = group.iter().map(|&i| &items[i]).collect();
                group[pick_representative(&refs)]
            })
            .collect();

        // Phase B: MinHash-LSH over URL-cluster representatives.
        let signatures: Vec<Vec<u32>> = representatives
            .iter()
            .map(|&rep_idx| self.family.signature(&shingles(&normalized_key(&items[rep_idx]))))
            .collect();

        let mut buckets: HashMap<(usize, u64), Vec<usize>> = HashMap::new();
        for (rep_pos, sig) in signatures.iter().enumerate() {
            for (band, bucket) in band_buckets(sig).into_iter().enumerate() {
                buckets.entry((band, bucket)).or_default().push(rep_pos);
            }
        }

        let mut uf = UnionFind::new(url_groups.len());
        let mut already_checked: std::collections::HashSet<(usize, usize)> = Default::default();
        for members in buckets.values() {
            for i in 0..members.len() {
                for j in (i + 1)..members.len() {
                    let (a, b) = (members[i], members[j]);
                    let pair = if a < b { (a, b) } else { (b, a) };
                    if !already_checked.insert(pair) {
                        continue;
                    }
                    if uf.find(a) == uf.find(b) {
                        continue;
                    }
                    if jaccard_estimate(&signatures[a], &signatures[b]) >= self.similarity_threshold {
                        uf.union(a, b);
                    }
                }
            }
        }

        // Finalize: merge URL-clusters by union-find root.
        let mut merged: HashMap<usize, Vec<usize>> = HashMap::new();
        for group_pos in 0..url_groups.len() {
            let root = uf.find(group_pos);
            merged.entry(root).or_default().push(group_pos);
        }

        for group_positions in merged.values() {
            let member_item_indices: Vec<usize> = group_positions
                .iter()
                .flat_map(|&gp| url_groups[gp].iter().copied())
                .collect();
            let refs: Vec<&Item> = member_item_indices.iter().map(|&i| &items[i]).collect();
            let final_rep_idx = member_item_indices[pick_representative(&refs)];
            let cluster_id = items[final_rep_idx].id.clone();
            for &item_idx in &member_item_indices {
                items[item_idx].cluster_id = Some(cluster_id.clone());
                items[item_idx].is_representative = item_idx == final_rep_idx;
            }
        }

        items
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap as Map;

    fn item(id: &str, url_canonical: &str, title: &str, content: &str) -> Item {
        Item {
            id: id.into(),
            source_id: "s".into(),
            external_id: None,
            url: url_canonical.into(),
            url_canonical: url_canonical.into(),
            title: title.into(),
            content: Some(content.into()),
            author: None,
            published_at: Utc::now(),
            ingested_at: Utc::now(),
            category: crate::config::Category::News,
            language: "en".into(),
            metadata: Map::new(),
            snapshot_path: None,
            cluster_id: None,
            is_representative: false,
        }
    }

    #[test]
    fn canonicalize_drops_tracking_params_and_lowercases_host() {
        let canon = canonicalize_url("https://WWW.Example.com/a/?utm_source=x&keep=1");
        assert_eq!(canon, canonicalize_url("https://example.com/a?keep=1"));
    }

    #[test]
    fn canonicalize_is_idempotent() {
        let once = canonicalize_url("HTTPS://Example.com./a//?utm_campaign=y");
        let twice = canonicalize_url(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn canonicalize_falls_back_to_lowercase_trim_on_parse_failure() {
        let canon = canonicalize_url("  NOT A URL  ");
        assert_eq!(canon, "not a url");
    }

    #[test]
    fn same_canonical_url_forms_one_cluster_with_longer_content_representative() {
        let items = vec![
            item("a", "https://example.com/x", "Title", "short"),
            item("b", "https://example.com/x", "Title", "a much longer body of content here"),
        ];
        let clusterer = DedupClusterer::new(0.85);
        let out = clusterer.cluster(items);
        let cluster_ids: std::collections::HashSet<_> =
            out.iter().map(|i| i.cluster_id.clone()).collect();
        assert_eq!(cluster_ids.len(), 1);
        let reps: Vec<_> = out.iter().filter(|i| i.is_representative).collect();
        assert_eq!(reps.len(), 1);
        assert_eq!(reps[0].id, "b");
    }

    #[test]
    fn near_duplicate_titles_cluster_together() {
        let items = vec![
            item("a", "https://a.com/1", "OpenAI releases GPT-5 model", "announcement text body"),
            item(
                "b",
                "https://b.com/2",
                "OpenAI release of GPT-5 model announced",
                "announcement text body here too",
            ),
        ];
        let clusterer = DedupClusterer::new(0.85);
        let out = clusterer.cluster(items);
        assert_eq!(out[0].cluster_id, out[1].cluster_id);
        assert_eq!(out.iter().filter(|i| i.is_representative).count(), 1);
    }

    #[test]
    fn dissimilar_items_stay_in_separate_clusters() {
        let items = vec![
            item("a", "https://a.com/1", "Cooking recipes for dinner", "pasta and tomato sauce"),
            item("b", "https://b.com/2", "Quantum computing breakthrough", "qubit coherence time improves"),
        ];
        let clusterer = DedupClusterer::new(0.85);
        let out = clusterer.cluster(items);
        assert_ne!(out[0].cluster_id, out[1].cluster_id);
    }

    #[test]
    fn every_item_gets_exactly_one_representative_per_cluster() {
        let items = vec![
            item("a", "https://a.com/1", "Alpha story", "alpha content"),
            item("a2", "https://a.com/1", "Alpha story", "alpha content duplicate"),
            item("b", "https://b.com/2", "Beta story", "beta content"),
        ];
        let clusterer = DedupClusterer::new(0.85);
        let out = clusterer.cluster(items);
        let mut per_cluster: HashMap<String, usize> = HashMap::new();
        for i in &out {
            assert!(i.cluster_id.is_some());
            if i.is_representative {
                *per_cluster.entry(i.cluster_id.clone().unwrap()).or_default() += 1;
            }
        }
        assert!(per_cluster.values().all(|&c| c == 1));
    }
}
