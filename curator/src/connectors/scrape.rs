//! Fallback HTML-scrape connector. Used directly for `type: scrape` sources
//! and as the fallback leg of `rss_or_scrape`. Pulls anchor tags off the
//! page, drops anything that looks like chrome (nav, footer, pagination)
//! rather than an article link.

use scraper::{Html, Selector};
use url::Url;

use crate::config::SourceConfig;
use crate::error::Result;

use super::{retry_transport, RawItem, DEFAULT_USER_AGENT};

const MAX_LINKS: usize = 100;
const MIN_TITLE_LEN: usize = 8;

const NOISE_WORDS: &[&str] = &[
    "login", "signin", "sign-in", "signup", "sign-up", "subscribe", "about", "contact",
    "privacy", "terms", "cookie", "advertise", "careers", "rss", "feed", "archive",
    "category", "tag", "page/", "next", "previous", "home",
];

pub struct ScrapeConnector {
    client: reqwest::Client,
    url: String,
}

impl ScrapeConnector {
    pub fn new(client: reqwest::Client, config: &SourceConfig) -> Self {
        ScrapeConnector {
            client,
            url: config.url.clone(),
        }
    }

    pub async fn fetch(&self) -> Result<Vec<RawItem>> {
        if self.url.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.url.clone();
        let client = self.client.clone();
        retry_transport(|| {
            let url = url.clone();
            let client = client.clone();
            async move { fetch_once(&client, &url).await }
        })
        .await
    }
}

async fn fetch_once(client: &reqwest::Client, url: &str) -> Result<Vec<RawItem>> {
    let resp = client
        .get(url)
        .header(reqwest::header::USER_AGENT, DEFAULT_USER_AGENT)
        .send()
        .await?;
    let resp = resp.error_for_status()?;
    let base = resp.url().clone();
    let body = resp.text().await?;

    let base_str = base.to_string();
    Ok(tokio::task::spawn_blocking(move || extract_links(&body, &base_str))
        .await
        .unwrap_or_default())
}

fn extract_links(html: &str, base_url: &str) -> Vec<RawItem> {
    let base = match Url::parse(base_url) {
        Ok(u) => u,
        Err(_) => return Vec::new(),
    };
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").expect("static selector");

    let mut seen = std::collections::HashSet::new();
    let mut items = Vec::new();

    for el in document.select(&selector) {
        if items.len() >= MAX_LINKS {
            break;
        }
        let Some(href) = el.value().attr("href") else {
            continue;
        };
        let Ok(resolved) = base.join(href) else {
            continue;
        };
        if resolved.scheme() != "http" && resolved.scheme() != "https" {
            continue;
        }
        let title: String = el.text().collect::<String>().trim().to_string();
        if title.chars().count() < MIN_TITLE_LEN {
            continue;
        }
        if is_noise(&title, resolved.as_str()) {
            continue;
        }
        let absolute = resolved.to_string();
        if !seen.insert(absolute.clone()) {
            continue;
        }
        items.push(RawItem {
            url: absolute,
            title: Some(title),
            content: None,
            author: None,
            published_at: None,
            metadata: Default::default(),
            external_id: None,
        });
    }
    items
}

fn is_noise(title: &str, href: &str) -> bool {
    let lower_title = title.to_ascii_lowercase();
    let lower_href = href.to_ascii_lowercase();
    NOISE_WORDS
        .iter()
        .any(|w| lower_title.contains(w) || lower_href.contains(w))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filters_noise_links_and_caps_length() {
        let html = r#"
            <html><body>
                <a href="/posts/rust-async-deep-dive">Rust Async Deep Dive</a>
                <a href="/login">Sign in to your account</a>
                <a href="/about">About us</a>
                <a href="/x">hi</a>
            </body></html>
        "#;
        let items = extract_links(html, "https://example.com/");
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].url, "https://example.com/posts/rust-async-deep-dive");
    }

    #[test]
    fn dedupes_repeated_links() {
        let html = r#"
            <html><body>
                <a href="/posts/one">A Real Article Title</a>
                <a href="/posts/one">A Real Article Title Again</a>
            </body></html>
        "#;
        let items = extract_links(html, "https://example.com/");
        assert_eq!(items.len(), 1);
    }
}
