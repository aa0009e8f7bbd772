//! Per-source protocol adapters. A connector is anything that can turn a
//! [`Source`] into a batch of [`RawItem`]s; the variant set is closed (an
//! enum, not a trait object) since the factory only ever dispatches on a
//! small, known `type` string from config.

mod api;
mod content_extractor;
mod rss;
mod scrape;

pub use content_extractor::ContentExtractor;

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use serde_json::Value;
use tracing::warn;

use crate::config::{substitute_env, ConnectorType, SourceConfig};
use crate::error::{CuratorError, Result};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const MAX_ATTEMPTS: u32 = 3;
const MIN_BACKOFF: Duration = Duration::from_secs(2);
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// A single normalized-ish piece of content as handed back by a connector,
/// before the orchestrator turns it into a persisted [`crate::store::Item`].
#[derive(Debug, Clone, Default)]
pub struct RawItem {
    pub url: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<String>,
    pub metadata: HashMap<String, Value>,
    pub external_id: Option<String>,
}

/// Closed connector variant set, matching the `type` field in source config.
pub enum Connector {
    Rss(rss::RssConnector),
    Api(api::ApiConnector),
    RssOrScrape(rss::RssConnector, scrape::ScrapeConnector),
    Scrape(scrape::ScrapeConnector),
}

impl Connector {
    /// Build the connector named by `config.connector_type()`. Unknown `type`
    /// strings already default to `rss` in [`ConnectorType::from`], so this
    /// factory never fails to produce something.
    pub fn build(config: &SourceConfig) -> Result<Self> {
        let client = build_client()?;
        Ok(match config.connector_type() {
            ConnectorType::Rss => Connector::Rss(rss::RssConnector::new(client, config)),
            ConnectorType::Api => Connector::Api(api::ApiConnector::new(client, config)?),
            ConnectorType::RssOrScrape => Connector::RssOrScrape(
                rss::RssConnector::new(client.clone(), config),
                scrape::ScrapeConnector::new(client, config),
            ),
            ConnectorType::Scrape => Connector::Scrape(scrape::ScrapeConnector::new(client, config)),
        })
    }

    /// Fetch raw items for `source`. `source_id` is used only for log context.
    pub async fn fetch(&self, source_id: &str) -> Result<Vec<RawItem>> {
        match self {
            Connector::Rss(c) => c.fetch().await,
            Connector::Api(c) => c.fetch(source_id).await,
            Connector::Scrape(c) => c.fetch().await,
            Connector::RssOrScrape(rss, scrape) => match rss.fetch().await {
                Ok(items) if !items.is_empty() => Ok(items),
                Ok(_) => {
                    warn!(source_id, "RSS returned no entries, falling back to scrape");
                    scrape.fetch().await
                }
                Err(err) => {
                    warn!(source_id, %err, "RSS failed, falling back to scrape");
                    scrape.fetch().await
                }
            },
        }
    }
}

fn build_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(DEFAULT_USER_AGENT)
        .build()
        .map_err(CuratorError::Transport)
}

/// Resolve `${VAR}` placeholders in configured header values, dropping
/// headers whose resolved value is empty or a bare "bearer" Authorization.
fn resolve_headers(raw: &HashMap<String, String>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    for (key, value) in raw {
        let Some(resolved) = substitute_env(value) else {
            continue;
        };
        if key.eq_ignore_ascii_case(AUTHORIZATION.as_str()) && resolved.trim().eq_ignore_ascii_case("bearer")
        {
            continue;
        }
        let (Ok(name), Ok(val)) = (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(&resolved),
        ) else {
            warn!(header = %key, "skipping unrepresentable header value");
            continue;
        };
        headers.insert(name, val);
    }
    headers
}

/// Retry `attempt` up to [`MAX_ATTEMPTS`] times with exponential backoff,
/// but only for transport-class failures (DNS, connect, TLS, timeout, 5xx).
/// 4xx responses and parse errors are never retried.
async fn retry_transport<F, Fut, T>(mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut delay = MIN_BACKOFF;
    let mut last_err = None;
    for attempt_no in 0..MAX_ATTEMPTS {
        match attempt().await {
            Ok(v) => return Ok(v),
            Err(err) if is_retryable(&err) => {
                last_err = Some(err);
                if attempt_no + 1 < MAX_ATTEMPTS {
                    tokio::time::sleep(delay).await;
                    delay = (delay * 2).min(MAX_BACKOFF);
                }
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err.expect("loop ran at least once"))
}

fn is_retryable(err: &CuratorError) -> bool {
    match err {
        CuratorError::Transport(e) => {
            e.is_connect()
                || e.is_timeout()
                || e.is_request()
                || e.status().map(|s| s.is_server_error()).unwrap_or(true)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_headers_drops_bare_bearer() {
        let mut raw = HashMap::new();
        raw.insert("Authorization".to_string(), "bearer".to_string());
        raw.insert("X-Custom".to_string(), "value".to_string());
        let headers = resolve_headers(&raw);
        assert!(!headers.contains_key(AUTHORIZATION));
        assert!(headers.contains_key("x-custom"));
    }

    #[test]
    fn resolve_headers_keeps_non_authorization_header_with_literal_bearer_value() {
        let mut raw = HashMap::new();
        raw.insert("X-Auth-Type".to_string(), "Bearer".to_string());
        let headers = resolve_headers(&raw);
        assert_eq!(headers.get("x-auth-type").unwrap(), "Bearer");
    }
}
