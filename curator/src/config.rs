//! YAML configuration: one file, read once per run, deserialized with
//! `#[serde(default)]` on every optional section so a minimal file is valid.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CuratorError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    News,
    Tips,
    Paper,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::News => "news",
            Category::Tips => "tips",
            Category::Paper => "paper",
        }
    }
}

impl std::str::FromStr for Category {
    type Err = CuratorError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "news" => Ok(Category::News),
            "tips" => Ok(Category::Tips),
            "paper" => Ok(Category::Paper),
            other => Err(CuratorError::Config(format!("unknown category `{other}`"))),
        }
    }
}

/// Closed connector variant set. The factory defaults unknown `type` strings
/// to `Rss` rather than failing config load — see the source's own
/// compatibility fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectorType {
    Rss,
    Api,
    RssOrScrape,
    Scrape,
}

impl From<&str> for ConnectorType {
    fn from(s: &str) -> Self {
        match s {
            "api" => ConnectorType::Api,
            "rss_or_scrape" => ConnectorType::RssOrScrape,
            "scrape" => ConnectorType::Scrape,
            "rss" => ConnectorType::Rss,
            _ => ConnectorType::Rss,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub id: String,
    #[serde(rename = "type", default = "default_type")]
    pub type_: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub params: HashMap<String, String>,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    pub category: Category,
    #[serde(default = "default_lang")]
    pub lang: String,
    #[serde(default = "default_authority")]
    pub authority: f64,
    pub refresh_hours: Option<u64>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl SourceConfig {
    pub fn connector_type(&self) -> ConnectorType {
        ConnectorType::from(self.type_.as_str())
    }
}

fn default_type() -> String {
    "rss".to_string()
}
fn default_lang() -> String {
    "en".to_string()
}
fn default_authority() -> f64 {
    0.5
}
fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct Weights {
    #[serde(default = "w_auth")]
    pub authority: f64,
    #[serde(default = "w_rec")]
    pub recency: f64,
    #[serde(default = "w_pop")]
    pub popularity: f64,
    #[serde(default = "w_rel")]
    pub relevance: f64,
    #[serde(default = "w_dup")]
    pub dup_penalty: f64,
}

fn w_auth() -> f64 {
    0.30
}
fn w_rec() -> f64 {
    0.25
}
fn w_pop() -> f64 {
    0.20
}
fn w_rel() -> f64 {
    0.20
}
fn w_dup() -> f64 {
    0.05
}

impl Default for Weights {
    fn default() -> Self {
        Weights {
            authority: w_auth(),
            recency: w_rec(),
            popularity: w_pop(),
            relevance: w_rel(),
            dup_penalty: w_dup(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScoringConfig {
    #[serde(default)]
    pub weights: Weights,
    #[serde(default)]
    pub keywords_exclude: Vec<String>,
    #[serde(default)]
    pub min_popularity: HashMap<String, HashMap<String, f64>>,
    #[serde(default)]
    pub quotas: HashMap<String, u32>,
}

impl ScoringConfig {
    /// Quota for a source id, falling back to `quotas.default`, then 5.
    pub fn quota_for(&self, source_id: &str) -> u32 {
        self.quotas
            .get(source_id)
            .or_else(|| self.quotas.get("default"))
            .copied()
            .unwrap_or(5)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PerformanceConfig {
    #[serde(default = "default_concurrency")]
    pub max_concurrent_sources: usize,
    #[serde(default = "default_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_similarity")]
    pub similarity_threshold: f64,
    #[serde(default)]
    pub use_embeddings: bool,
    #[serde(default)]
    pub fetch_content: bool,
}

fn default_concurrency() -> usize {
    10
}
fn default_timeout() -> u64 {
    30
}
fn default_similarity() -> f64 {
    0.85
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        PerformanceConfig {
            max_concurrent_sources: default_concurrency(),
            request_timeout_seconds: default_timeout(),
            similarity_threshold: default_similarity(),
            use_embeddings: false,
            fetch_content: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CategoryLimits {
    #[serde(default = "limit_news")]
    pub news: usize,
    #[serde(default = "limit_tips")]
    pub tips: usize,
    #[serde(default = "limit_paper")]
    pub paper: usize,
}

fn limit_news() -> usize {
    20
}
fn limit_tips() -> usize {
    20
}
fn limit_paper() -> usize {
    10
}

impl Default for CategoryLimits {
    fn default() -> Self {
        CategoryLimits {
            news: limit_news(),
            tips: limit_tips(),
            paper: limit_paper(),
        }
    }
}

impl CategoryLimits {
    pub fn for_category(&self, c: Category) -> usize {
        match c {
            Category::News => self.news,
            Category::Tips => self.tips,
            Category::Paper => self.paper,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DigestConfig {
    #[serde(default)]
    pub limits: CategoryLimits,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_concurrent_requests")]
    pub concurrent_requests: usize,
    #[serde(default = "default_true")]
    pub cache_summaries: bool,
    pub local_url: Option<String>,
    pub local_model: Option<String>,
}

fn default_provider() -> String {
    "mock".to_string()
}
fn default_max_tokens() -> u32 {
    512
}
fn default_temperature() -> f64 {
    0.7
}
fn default_concurrent_requests() -> usize {
    4
}

impl Default for LlmConfig {
    fn default() -> Self {
        LlmConfig {
            provider: default_provider(),
            model: String::new(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            concurrent_requests: default_concurrent_requests(),
            cache_summaries: true,
            local_url: None,
            local_model: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_db_path")]
    pub db_path: String,
    #[serde(default = "default_snapshot_root")]
    pub snapshot_root: String,
    #[serde(default = "default_cache_size_kib")]
    pub cache_size_kib: i64,
}

fn default_db_path() -> String {
    "./data/curator.db".to_string()
}
fn default_snapshot_root() -> String {
    "./data/snapshots".to_string()
}
fn default_cache_size_kib() -> i64 {
    65536
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            db_path: default_db_path(),
            snapshot_root: default_snapshot_root(),
            cache_size_kib: default_cache_size_kib(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
}

fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: default_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub sources: Vec<SourceConfig>,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub digest: DigestConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Config> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CuratorError::Config(format!("reading config `{}`: {e}", path.display()))
        })?;
        let config: Config = serde_yaml::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for src in &self.sources {
            if src.id.trim().is_empty() {
                return Err(CuratorError::Config("source with empty `id`".into()));
            }
            if src.url.trim().is_empty() {
                return Err(CuratorError::Config(format!(
                    "source `{}` missing required `url`",
                    src.id
                )));
            }
            if !seen.insert(src.id.clone()) {
                return Err(CuratorError::Config(format!(
                    "duplicate source id `{}`",
                    src.id
                )));
            }
        }
        Ok(())
    }
}

/// Expand `${VAR}` in a header value from the process environment. Returns
/// `None` when the expanded result is empty (caller drops the header). The
/// bare-"bearer" check is scoped to the `Authorization` header only and
/// lives in the caller (`connectors::resolve_headers`), not here, since this
/// function has no notion of which header it's substituting for.
pub fn substitute_env(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let Some(end) = rest[start..].find('}') else {
            out.push_str(&rest[start..]);
            rest = "";
            break;
        };
        let var_name = &rest[start + 2..start + end];
        if let Ok(val) = std::env::var(var_name) {
            out.push_str(&val);
        }
        rest = &rest[start + end + 1..];
    }
    out.push_str(rest);

    if out.trim().is_empty() {
        None
    } else {
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_var() {
        std::env::set_var("CURATOR_TEST_TOKEN", "abc123");
        assert_eq!(
            substitute_env("Bearer ${CURATOR_TEST_TOKEN}"),
            Some("Bearer abc123".to_string())
        );
    }

    #[test]
    fn drops_empty_result() {
        std::env::remove_var("CURATOR_TEST_MISSING");
        assert_eq!(substitute_env("${CURATOR_TEST_MISSING}"), None);
    }

    #[test]
    fn keeps_bare_bearer_substitute_env_has_no_header_key() {
        // Scoping the bare-"bearer" drop to `Authorization` happens in
        // `connectors::resolve_headers`, which knows the header key; this
        // function must not drop it on behalf of a header it can't identify.
        assert_eq!(substitute_env("bearer"), Some("bearer".to_string()));
    }

    #[test]
    fn quota_falls_back_to_default_then_five() {
        let scoring = ScoringConfig {
            quotas: HashMap::from([("default".to_string(), 7)]),
            ..Default::default()
        };
        assert_eq!(scoring.quota_for("unknown-source"), 7);
        let empty = ScoringConfig::default();
        assert_eq!(empty.quota_for("unknown-source"), 5);
    }
}
