//! Best-effort full-text extraction for sources that only give us a link.
//! Gated behind `performance.fetch_content`; when it's off the orchestrator
//! never constructs one of these and items keep whatever content the
//! connector already returned (often none, for scrape-based sources).

use article_scraper::{ArticleScraper, Readability};
use url::Url;

use crate::error::{CuratorError, Result};

/// Thin wrapper around `article_scraper`'s readability port. Not a from-
/// scratch heuristic: this is the same library and call shape the teacher
/// uses for its own "fetch and summarize a page" tool, reused here for
/// backfilling article bodies for scrape/link-list sources that didn't come
/// with one.
pub struct ContentExtractor {
    client: reqwest::Client,
    scraper: ArticleScraper,
}

impl ContentExtractor {
    pub async fn new(client: reqwest::Client) -> Self {
        ContentExtractor {
            client,
            scraper: ArticleScraper::new(None).await,
        }
    }

    pub async fn extract(&self, url: &str) -> Result<Option<String>> {
        let parsed = Url::parse(url).map_err(|e| CuratorError::Parse(e.to_string()))?;
        let article = self
            .scraper
            .parse(&parsed, false, &self.client, None)
            .await
            .map_err(|e| CuratorError::Parse(e.to_string()))?;

        let Some(html) = article.html else {
            return Ok(None);
        };
        let text = Readability::extract(&html, None)
            .await
            .map_err(|e| CuratorError::Parse(e.to_string()))?;
        let trimmed = text.trim();
        Ok(if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        })
    }
}
