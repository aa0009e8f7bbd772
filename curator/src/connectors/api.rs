//! Generic JSON API connector. GETs a URL with configured params/headers and
//! normalizes the response by detecting its shape (HN-Algolia, GitHub
//! repo-list, Atom-as-JSON, or a flat blog-like list) — see the shape table
//! in the design notes. arXiv is special-cased: its API returns Atom XML
//! even though it's reached the same way as the other JSON sources.

use std::collections::HashMap;

use reqwest::header::HeaderMap;
use serde_json::Value;

use crate::config::SourceConfig;
use crate::error::{CuratorError, Result};

use super::{resolve_headers, retry_transport, RawItem, DEFAULT_USER_AGENT};

pub struct ApiConnector {
    client: reqwest::Client,
    url: String,
    params: HashMap<String, String>,
    headers: HeaderMap,
}

impl ApiConnector {
    pub fn new(client: reqwest::Client, config: &SourceConfig) -> Result<Self> {
        let mut headers = resolve_headers(&config.headers);
        if !headers.contains_key(reqwest::header::USER_AGENT) {
            headers.insert(
                reqwest::header::USER_AGENT,
                reqwest::header::HeaderValue::from_static(DEFAULT_USER_AGENT),
            );
        }
        Ok(ApiConnector {
            client,
            url: config.url.clone(),
            params: config.params.clone(),
            headers,
        })
    }

    pub async fn fetch(&self, source_id: &str) -> Result<Vec<RawItem>> {
        if self.url.is_empty() {
            return Ok(Vec::new());
        }
        let url = self.url.clone();
        let is_arxiv = url.to_ascii_lowercase().contains("arxiv");
        let client = self.client.clone();
        let headers = self.headers.clone();
        let params: Vec<(String, String)> = self.params.clone().into_iter().collect();

        let maybe_empty = retry_transport(|| {
            let client = client.clone();
            let headers = headers.clone();
            let params = params.clone();
            let url = url.clone();
            async move { fetch_once(&client, &url, &params, headers, source_id, is_arxiv).await }
        })
        .await;

        maybe_empty
    }
}

/// `Ok(None)` signals the 401/403 auth-degraded path: logged, not an error,
/// caller treats it as zero items.
async fn fetch_once(
    client: &reqwest::Client,
    url: &str,
    params: &[(String, String)],
    headers: HeaderMap,
    source_id: &str,
    is_arxiv: bool,
) -> Result<Vec<RawItem>> {
    let resp = client
        .get(url)
        .query(params)
        .headers(headers)
        .send()
        .await?;

    if resp.status() == reqwest::StatusCode::UNAUTHORIZED || resp.status() == reqwest::StatusCode::FORBIDDEN {
        tracing::warn!(source_id, status = %resp.status(), "auth degraded, returning empty");
        return Ok(Vec::new());
    }
    let resp = resp.error_for_status()?;

    if is_arxiv {
        let text = resp.text().await?;
        return tokio::task::spawn_blocking(move || parse_arxiv_atom(&text))
            .await
            .map_err(|e| CuratorError::Parse(e.to_string()))?;
    }

    let body: Value = resp.json().await?;
    Ok(normalize_response(&body))
}

fn parse_arxiv_atom(xml: &str) -> Result<Vec<RawItem>> {
    let feed = feed_rs::parser::parse(xml.as_bytes()).map_err(|e| CuratorError::Parse(e.to_string()))?;
    let items = feed
        .entries
        .into_iter()
        .filter_map(|entry| {
            let link = entry.links.first()?.href.clone();
            let title = entry.title.map(|t| t.content).unwrap_or_else(|| "Untitled".to_string());
            let content = entry.summary.map(|s| s.content).unwrap_or_default();
            let author = entry.authors.first().map(|a| a.name.clone());
            let published_at = entry.published.or(entry.updated).map(|dt| dt.to_rfc3339());
            let external_id = Some(if entry.id.is_empty() { link.clone() } else { entry.id });
            Some(RawItem {
                url: link,
                title: Some(title),
                content: Some(content),
                author,
                published_at,
                metadata: Default::default(),
                external_id,
            })
        })
        .collect();
    Ok(items)
}

fn normalize_response(data: &Value) -> Vec<RawItem> {
    if let Some(hits) = data.get("hits").and_then(Value::as_array) {
        return normalize_hn_algolia(hits);
    }
    if let Some(items) = data.get("items").and_then(Value::as_array) {
        if items.first().and_then(|v| v.get("html_url")).is_some() {
            return normalize_github_repos(items);
        }
    }
    if let Some(entries) = data.get("feed").and_then(|f| f.get("entry")) {
        return normalize_atom_json(entries);
    }
    if let Some(list) = data.as_array() {
        if list
            .first()
            .map(|v| v.get("url").is_some() && v.get("title").is_some())
            .unwrap_or(false)
        {
            return normalize_blog_list(list);
        }
    }
    Vec::new()
}

fn normalize_hn_algolia(hits: &[Value]) -> Vec<RawItem> {
    hits.iter()
        .filter_map(|h| {
            let object_id = h.get("objectID").and_then(Value::as_str);
            let url = h
                .get("url")
                .and_then(Value::as_str)
                .map(str::to_string)
                .or_else(|| object_id.map(|id| format!("https://news.ycombinator.com/item?id={id}")))?;
            let mut metadata = HashMap::new();
            metadata.insert(
                "points".to_string(),
                h.get("points").cloned().unwrap_or(Value::from(0)),
            );
            Some(RawItem {
                url,
                title: h.get("title").and_then(Value::as_str).map(str::to_string).or(Some("Untitled".to_string())),
                content: h
                    .get("story_text")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                author: h.get("author").and_then(Value::as_str).map(str::to_string),
                published_at: h.get("created_at").and_then(Value::as_str).map(str::to_string),
                metadata,
                external_id: object_id.map(str::to_string),
            })
        })
        .collect()
}

fn normalize_github_repos(items: &[Value]) -> Vec<RawItem> {
    items
        .iter()
        .filter_map(|r| {
            let url = r.get("html_url").and_then(Value::as_str)?.to_string();
            let title = r
                .get("full_name")
                .or_else(|| r.get("name"))
                .and_then(Value::as_str)
                .unwrap_or("Untitled")
                .to_string();
            let author = r
                .get("owner")
                .and_then(|o| o.get("login"))
                .and_then(Value::as_str)
                .map(str::to_string);
            let mut metadata = HashMap::new();
            metadata.insert(
                "stars".to_string(),
                r.get("stargazers_count").cloned().unwrap_or(Value::from(0)),
            );
            Some(RawItem {
                url,
                title: Some(title),
                content: r.get("description").and_then(Value::as_str).map(str::to_string),
                author,
                published_at: r.get("created_at").and_then(Value::as_str).map(str::to_string),
                metadata,
                external_id: r.get("id").map(|v| v.to_string()),
            })
        })
        .collect()
}

fn normalize_atom_json(entries: &Value) -> Vec<RawItem> {
    let entries: Vec<&Value> = match entries {
        Value::Array(arr) => arr.iter().collect(),
        other => vec![other],
    };
    entries
        .into_iter()
        .filter_map(|e| {
            let link = e
                .get("link")
                .and_then(|l| match l {
                    Value::Array(arr) => arr.iter().find_map(|v| v.get("href").and_then(Value::as_str)),
                    Value::Object(_) => l.get("href").and_then(Value::as_str),
                    _ => None,
                })
                .map(str::to_string)?;
            let title = e.get("title").and_then(Value::as_str).unwrap_or("Untitled").to_string();
            let content = e.get("summary").and_then(Value::as_str).map(str::to_string);
            Some(RawItem {
                url: link.clone(),
                title: Some(title),
                content,
                author: None,
                published_at: e.get("published").and_then(Value::as_str).map(str::to_string),
                metadata: Default::default(),
                external_id: Some(e.get("id").and_then(Value::as_str).map(str::to_string).unwrap_or(link)),
            })
        })
        .collect()
}

fn normalize_blog_list(list: &[Value]) -> Vec<RawItem> {
    list.iter()
        .filter_map(|it| {
            let url = it.get("url").and_then(Value::as_str)?.to_string();
            let mut metadata = HashMap::new();
            if let Some(likes) = it.get("likes_count") {
                metadata.insert("likes_count".to_string(), likes.clone());
            }
            Some(RawItem {
                url,
                title: it.get("title").and_then(Value::as_str).map(str::to_string),
                content: it.get("body").and_then(Value::as_str).map(str::to_string),
                author: it
                    .get("user")
                    .and_then(|u| u.get("id"))
                    .and_then(Value::as_str)
                    .map(str::to_string),
                published_at: it.get("created_at").and_then(Value::as_str).map(str::to_string),
                metadata,
                external_id: it.get("id").map(|v| v.to_string()),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_hn_algolia_shape() {
        let body = serde_json::json!({
            "hits": [{"objectID": "123", "title": "Show HN", "points": 42}]
        });
        let items = normalize_response(&body);
        assert_eq!(items.len(), 1);
        assert!(items[0].url.contains("item?id=123"));
        assert_eq!(items[0].metadata.get("points").unwrap(), 42);
    }

    #[test]
    fn detects_github_repo_shape() {
        let body = serde_json::json!({
            "items": [{"html_url": "https://github.com/a/b", "full_name": "a/b", "stargazers_count": 10}]
        });
        let items = normalize_response(&body);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].metadata.get("stars").unwrap(), 10);
    }
}
