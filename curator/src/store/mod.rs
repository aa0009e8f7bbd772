//! Embedded relational store: single SQLite file, WAL journaling, FTS5 full
//! text search, one logical writer at a time (an async mutex guards the
//! write path) while pooled connections serve concurrent reads.

pub mod migrations;
pub mod models;
pub mod schema;

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tokio::sync::Mutex;
use tracing::info;

use crate::config::Category;
use crate::error::{CuratorError, Result};

pub use models::{Digest, IngestResult, IngestSummary, Item, Metric, Source, StoreStats};

const BATCH_SIZE: usize = 1000;
const DEFAULT_SEARCH_LIMIT: i64 = 50;

#[derive(Debug, Default, Clone)]
pub struct SearchFilters {
    pub category: Option<Category>,
    pub language: Option<String>,
    pub source_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: i64,
    pub offset: i64,
}

pub struct Store {
    pool: Pool<SqliteConnectionManager>,
    write_lock: Mutex<()>,
    db_path: PathBuf,
}

impl Store {
    /// Open (creating if absent) the database at `db_path`, run migrations,
    /// and configure the performance pragmas from the design.
    pub async fn open(db_path: &Path, cache_size_kib: i64) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let path = db_path.to_path_buf();
        let path_for_migrate = path.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            let mut conn = Connection::open(&path_for_migrate)?;
            apply_pragmas(&conn, cache_size_kib)?;
            migrations::apply_migrations(&mut conn)?;
            Ok(())
        })
        .await
        .map_err(|e| CuratorError::Storage(e.to_string()))??;

        let manager = SqliteConnectionManager::file(&path).with_init(move |c| {
            apply_pragmas(c, cache_size_kib).map_err(|_| {
                rusqlite::Error::InvalidParameterName("pragma setup failed".to_string())
            })
        });
        let pool = Pool::builder().max_size(8).build(manager)?;

        info!(path = %path.display(), "store opened");
        Ok(Store {
            pool,
            write_lock: Mutex::new(()),
            db_path: path,
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }

    async fn run_blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            f(&conn)
        })
        .await
        .map_err(|e| CuratorError::Storage(e.to_string()))?
    }

    /// Run `f` on a pooled connection after acquiring the process-wide write
    /// token, wrapped in a `BEGIN IMMEDIATE` transaction.
    async fn run_write<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let _permit = self.write_lock.lock().await;
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            let tx = conn.transaction()?;
            let result = f(&tx)?;
            tx.commit()?;
            Ok(result)
        })
        .await
        .map_err(|e| CuratorError::Storage(e.to_string()))?
    }

    // ---------------------------------------------------------------- sources

    pub async fn upsert_source(&self, source: Source) -> Result<()> {
        self.run_write(move |conn| {
            let config_json = serde_json::to_string(&source.config)
                .map_err(|e| CuratorError::Storage(e.to_string()))?;
            conn.execute(
                "INSERT INTO sources (id, config, last_fetch_at, last_error, error_count, enabled)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(id) DO UPDATE SET
                    config=excluded.config,
                    last_fetch_at=excluded.last_fetch_at,
                    last_error=excluded.last_error,
                    error_count=excluded.error_count,
                    enabled=excluded.enabled",
                params![
                    source.id,
                    config_json,
                    source.last_fetch_at.map(|t| t.to_rfc3339()),
                    source.last_error,
                    source.error_count,
                    source.enabled as i64,
                ],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_source(&self, id: &str) -> Result<Option<Source>> {
        let id = id.to_string();
        self.run_blocking(move |conn| {
            Ok(conn
                .query_row("SELECT * FROM sources WHERE id = ?1", params![id], source_from_row)
                .optional()?)
        })
        .await
    }

    pub async fn list_enabled_sources(&self) -> Result<Vec<Source>> {
        self.run_blocking(|conn| {
            let mut stmt = conn.prepare("SELECT * FROM sources WHERE enabled = 1")?;
            let rows = stmt.query_map([], source_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
                .into_iter()
                .collect()
        })
        .await
    }

    pub async fn get_disabled_source_ids(&self) -> Result<Vec<String>> {
        self.run_blocking(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM sources WHERE enabled = 0")?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
        .await
    }

    pub async fn update_source_status(
        &self,
        id: &str,
        last_fetch_at: Option<DateTime<Utc>>,
        last_error: Option<String>,
        increment_errors: bool,
    ) -> Result<()> {
        let id = id.to_string();
        self.run_write(move |conn| {
            let fetch_at = last_fetch_at.map(|t| t.to_rfc3339());
            match last_error {
                Some(err) if increment_errors => {
                    conn.execute(
                        "UPDATE sources SET last_error = ?1, error_count = error_count + 1,
                         last_fetch_at = COALESCE(?2, last_fetch_at) WHERE id = ?3",
                        params![err, fetch_at, id],
                    )?;
                }
                Some(err) => {
                    conn.execute(
                        "UPDATE sources SET last_error = ?1, last_fetch_at = ?2 WHERE id = ?3",
                        params![err, fetch_at, id],
                    )?;
                }
                None => {
                    conn.execute(
                        "UPDATE sources SET last_fetch_at = ?1, last_error = NULL, error_count = 0
                         WHERE id = ?2",
                        params![fetch_at, id],
                    )?;
                }
            }
            Ok(())
        })
        .await
    }

    // ------------------------------------------------------------------ items

    pub async fn batch_insert_items(&self, items: Vec<Item>) -> Result<u64> {
        if items.is_empty() {
            return Ok(0);
        }
        self.run_write(move |conn| {
            let mut inserted = 0u64;
            for chunk in items.chunks(BATCH_SIZE) {
                let mut stmt = conn.prepare_cached(
                    "INSERT OR IGNORE INTO items
                     (id, source_id, external_id, url, url_canonical, title, content,
                      author, published_at, ingested_at, category, language, metadata,
                      snapshot_path)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14)",
                )?;
                for item in chunk {
                    let metadata_json = if item.metadata.is_empty() {
                        None
                    } else {
                        Some(
                            serde_json::to_string(&item.metadata)
                                .map_err(|e| CuratorError::Storage(e.to_string()))?,
                        )
                    };
                    let n = stmt.execute(params![
                        item.id,
                        item.source_id,
                        item.external_id,
                        item.url,
                        item.url_canonical,
                        item.title,
                        item.content,
                        item.author,
                        item.published_at.to_rfc3339(),
                        item.ingested_at.to_rfc3339(),
                        item.category.as_str(),
                        item.language,
                        metadata_json,
                        item.snapshot_path,
                    ])?;
                    inserted += n as u64;
                }
            }
            Ok(inserted)
        })
        .await
    }

    pub async fn item_exists(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.run_blocking(move |conn| {
            Ok(conn
                .query_row("SELECT 1 FROM items WHERE id = ?1", params![id], |_| Ok(()))
                .optional()?
                .is_some())
        })
        .await
    }

    pub async fn url_canonical_exists(&self, url_canonical: &str) -> Result<bool> {
        let url = url_canonical.to_string();
        self.run_blocking(move |conn| {
            Ok(conn
                .query_row(
                    "SELECT 1 FROM items WHERE url_canonical = ?1",
                    params![url],
                    |_| Ok(()),
                )
                .optional()?
                .is_some())
        })
        .await
    }

    pub async fn get_items_by_source(
        &self,
        source_id: &str,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Item>> {
        let source_id = source_id.to_string();
        self.run_blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM items WHERE source_id = ?1
                 ORDER BY published_at DESC, id ASC LIMIT ?2 OFFSET ?3",
            )?;
            let rows = stmt.query_map(params![source_id, limit, offset], item_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
                .into_iter()
                .collect()
        })
        .await
    }

    pub async fn get_items_by_category(
        &self,
        category: Category,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<Item>> {
        self.run_blocking(move |conn| {
            let cat = category.as_str();
            let rows_result = if let Some(since) = since {
                let mut stmt = conn.prepare(
                    "SELECT * FROM items WHERE category = ?1 AND published_at >= ?2
                     ORDER BY published_at DESC, id ASC LIMIT ?3",
                )?;
                let rows =
                    stmt.query_map(params![cat, since.to_rfc3339(), limit], item_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            } else {
                let mut stmt = conn.prepare(
                    "SELECT * FROM items WHERE category = ?1
                     ORDER BY published_at DESC, id ASC LIMIT ?2",
                )?;
                let rows = stmt.query_map(params![cat, limit], item_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
            };
            rows_result.into_iter().collect()
        })
        .await
    }

    pub async fn get_items_for_date(&self, date_str: &str) -> Result<Vec<Item>> {
        let start = format!("{date_str}T00:00:00");
        let end = format!("{date_str}T23:59:59.999999");
        self.run_blocking(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT * FROM items WHERE published_at >= ?1 AND published_at <= ?2
                 ORDER BY published_at DESC, id ASC",
            )?;
            let rows = stmt.query_map(params![start, end], item_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
                .into_iter()
                .collect()
        })
        .await
    }

    // ---------------------------------------------------------------- search

    pub async fn search(&self, query: &str, filters: SearchFilters) -> Result<Vec<Item>> {
        let query = query.to_string();
        self.run_blocking(move |conn| {
            let mut conditions = vec!["items_fts MATCH ?1".to_string()];
            let mut idx = 2;
            let mut push = |cond: &str| {
                conditions.push(cond.replace("{n}", &idx.to_string()));
                idx += 1;
            };
            if filters.category.is_some() {
                push("i.category = ?{n}");
            }
            if filters.language.is_some() {
                push("i.language = ?{n}");
            }
            if filters.source_id.is_some() {
                push("i.source_id = ?{n}");
            }
            if filters.since.is_some() {
                push("i.published_at >= ?{n}");
            }
            let where_clause = conditions.join(" AND ");
            let limit_idx = idx;
            let offset_idx = idx + 1;
            let sql = format!(
                "SELECT i.*, bm25(items_fts, 1.0, 0.5) AS rank
                 FROM items_fts JOIN items i ON i.rowid = items_fts.rowid
                 WHERE {where_clause}
                 ORDER BY rank ASC, i.id ASC
                 LIMIT ?{limit_idx} OFFSET ?{offset_idx}"
            );

            let mut stmt = conn.prepare(&sql)?;
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(query)];
            if let Some(c) = filters.category {
                params_vec.push(Box::new(c.as_str().to_string()));
            }
            if let Some(l) = filters.language {
                params_vec.push(Box::new(l));
            }
            if let Some(s) = filters.source_id {
                params_vec.push(Box::new(s));
            }
            if let Some(since) = filters.since {
                params_vec.push(Box::new(since.to_rfc3339()));
            }
            let limit = if filters.limit > 0 {
                filters.limit
            } else {
                DEFAULT_SEARCH_LIMIT
            };
            params_vec.push(Box::new(limit));
            params_vec.push(Box::new(filters.offset));

            let param_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|b| b.as_ref()).collect();
            let rows = stmt.query_map(param_refs.as_slice(), item_from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
                .into_iter()
                .collect()
        })
        .await
    }

    pub async fn search_count(&self, query: &str) -> Result<i64> {
        let query = query.to_string();
        self.run_blocking(move |conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM items_fts WHERE items_fts MATCH ?1",
                params![query],
                |row| row.get(0),
            )?)
        })
        .await
    }

    // -------------------------------------------------------------- metrics

    pub async fn upsert_metrics(&self, metrics: Vec<Metric>) -> Result<u64> {
        if metrics.is_empty() {
            return Ok(0);
        }
        self.run_write(move |conn| {
            let mut inserted = 0u64;
            for chunk in metrics.chunks(BATCH_SIZE) {
                let mut stmt = conn.prepare_cached(
                    "INSERT OR REPLACE INTO metrics
                     (item_id, score, score_authority, score_recency, score_popularity,
                      score_relevance, dup_penalty, cluster_id, summary, computed_at)
                     VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
                )?;
                for m in chunk {
                    let n = stmt.execute(params![
                        m.item_id,
                        m.score,
                        m.score_authority,
                        m.score_recency,
                        m.score_popularity,
                        m.score_relevance,
                        m.dup_penalty,
                        m.cluster_id,
                        m.summary,
                        m.computed_at.to_rfc3339(),
                    ])?;
                    inserted += n as u64;
                }
            }
            Ok(inserted)
        })
        .await
    }

    pub async fn get_top_items(
        &self,
        category: Option<Category>,
        since: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<(Item, Metric)>> {
        self.run_blocking(move |conn| {
            let mut conditions = vec!["m.score IS NOT NULL".to_string()];
            if category.is_some() {
                conditions.push("i.category = ?1".to_string());
            }
            if since.is_some() {
                let n = if category.is_some() { 2 } else { 1 };
                conditions.push(format!("i.published_at >= ?{n}"));
            }
            let where_clause = conditions.join(" AND ");
            let limit_idx = if category.is_some() && since.is_some() {
                3
            } else if category.is_some() || since.is_some() {
                2
            } else {
                1
            };
            let sql = format!(
                "SELECT i.*, m.score, m.score_authority, m.score_recency,
                        m.score_popularity, m.score_relevance, m.dup_penalty,
                        m.cluster_id, m.summary, m.computed_at
                 FROM items i JOIN metrics m ON m.item_id = i.id
                 WHERE {where_clause}
                 ORDER BY m.score DESC, i.id ASC
                 LIMIT ?{limit_idx}"
            );
            let mut stmt = conn.prepare(&sql)?;
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
            if let Some(c) = category {
                params_vec.push(Box::new(c.as_str().to_string()));
            }
            if let Some(since) = since {
                params_vec.push(Box::new(since.to_rfc3339()));
            }
            params_vec.push(Box::new(limit));
            let param_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|b| b.as_ref()).collect();

            let rows = stmt.query_map(param_refs.as_slice(), |row| {
                let item = item_from_row(row)?;
                let metric = Metric {
                    item_id: item.id.clone(),
                    score: row.get("score")?,
                    score_authority: row.get("score_authority")?,
                    score_recency: row.get("score_recency")?,
                    score_popularity: row.get("score_popularity")?,
                    score_relevance: row.get("score_relevance")?,
                    dup_penalty: row.get("dup_penalty")?,
                    cluster_id: row.get("cluster_id")?,
                    summary: row.get("summary")?,
                    computed_at: parse_dt(&row.get::<_, String>("computed_at")?),
                };
                Ok((item, metric))
            })?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
                .into_iter()
                .collect()
        })
        .await
    }

    // -------------------------------------------------------------- digests

    pub async fn save_digest(&self, digest: Digest) -> Result<i64> {
        self.run_write(move |conn| {
            let content_json = serde_json::to_string(&digest.content_json)
                .map_err(|e| CuratorError::Storage(e.to_string()))?;
            conn.execute(
                "INSERT INTO digests (date, section, content_markdown, content_json, generated_at)
                 VALUES (?1, ?2, ?3, ?4, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                 ON CONFLICT(date, section) DO UPDATE SET
                    content_markdown=excluded.content_markdown,
                    content_json=excluded.content_json,
                    generated_at=strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![digest.date, digest.section.as_str(), digest.content_markdown, content_json],
            )?;
            Ok(conn.last_insert_rowid())
        })
        .await
    }

    pub async fn get_digest(&self, date: &str, section: Option<Category>) -> Result<Vec<Digest>> {
        let date = date.to_string();
        self.run_blocking(move |conn| {
            if let Some(section) = section {
                let mut stmt =
                    conn.prepare("SELECT * FROM digests WHERE date = ?1 AND section = ?2")?;
                let rows = stmt.query_map(params![date, section.as_str()], digest_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
                    .into_iter()
                    .collect()
            } else {
                let mut stmt =
                    conn.prepare("SELECT * FROM digests WHERE date = ?1 ORDER BY section")?;
                let rows = stmt.query_map(params![date], digest_from_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()?
                    .into_iter()
                    .collect()
            }
        })
        .await
    }

    // ----------------------------------------------------------- maintenance

    pub async fn vacuum(&self) -> Result<()> {
        self.run_write(|conn| {
            conn.execute_batch("VACUUM")?;
            Ok(())
        })
        .await
    }

    pub async fn optimize_fts(&self) -> Result<()> {
        self.run_write(|conn| {
            conn.execute("INSERT INTO items_fts(items_fts) VALUES ('optimize')", [])?;
            Ok(())
        })
        .await
    }

    pub async fn integrity_check(&self) -> Result<bool> {
        self.run_blocking(|conn| {
            let result: String = conn.query_row("PRAGMA integrity_check", [], |r| r.get(0))?;
            Ok(result == "ok")
        })
        .await
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        self.run_blocking(|conn| {
            let total_items: i64 = conn.query_row("SELECT COUNT(*) FROM items", [], |r| r.get(0))?;
            let total_sources: i64 =
                conn.query_row("SELECT COUNT(*) FROM sources", [], |r| r.get(0))?;

            let mut by_category = HashMap::new();
            let mut stmt =
                conn.prepare("SELECT category, COUNT(*) FROM items GROUP BY category")?;
            let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
            for row in rows {
                let (k, v) = row?;
                by_category.insert(k, v);
            }

            let mut by_source = HashMap::new();
            let mut stmt =
                conn.prepare("SELECT source_id, COUNT(*) FROM items GROUP BY source_id")?;
            let rows = stmt.query_map([], |r| Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?)))?;
            for row in rows {
                let (k, v) = row?;
                by_source.insert(k, v);
            }

            let size_bytes: i64 = conn.query_row(
                "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
                [],
                |r| r.get(0),
            )?;

            Ok(StoreStats {
                total_items,
                total_sources,
                by_category,
                by_source,
                size_bytes,
            })
        })
        .await
    }

    /// Drop and recreate every table. Destructive; used only by tests and an
    /// explicit opt-in CLI flag, never by normal ingest/digest operation.
    pub async fn reset_database(&self) -> Result<()> {
        self.run_write(|conn| {
            conn.execute_batch(
                "DROP TABLE IF EXISTS items_fts;
                 DROP TABLE IF EXISTS metrics;
                 DROP TABLE IF EXISTS digests;
                 DROP TABLE IF EXISTS items;
                 DROP TABLE IF EXISTS sources;
                 DROP TABLE IF EXISTS schema_version;",
            )?;
            Ok(())
        })
        .await?;
        let mut conn = self.conn()?;
        migrations::apply_migrations(&mut conn)
    }
}

fn apply_pragmas(conn: &Connection, cache_size_kib: i64) -> Result<()> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "cache_size", -cache_size_kib)?;
    conn.pragma_update(None, "mmap_size", 268_435_456i64)?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    Ok(())
}

fn parse_dt(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn source_from_row(row: &Row) -> rusqlite::Result<Source> {
    let config_raw: String = row.get("config")?;
    let config = serde_json::from_str(&config_raw).unwrap_or(serde_json::Value::Null);
    let last_fetch_at: Option<String> = row.get("last_fetch_at")?;
    let created_at: Option<String> = row.get("created_at")?;
    Ok(Source {
        id: row.get("id")?,
        config,
        last_fetch_at: last_fetch_at.map(|s| parse_dt(&s)),
        last_error: row.get("last_error")?,
        error_count: row.get("error_count")?,
        enabled: row.get::<_, i64>("enabled")? != 0,
        created_at: created_at.map(|s| parse_dt(&s)),
    })
}

fn item_from_row(row: &Row) -> rusqlite::Result<Item> {
    let metadata_raw: Option<String> = row.get("metadata")?;
    let metadata = metadata_raw
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();
    let category_raw: String = row.get("category")?;
    let category = category_raw.parse().unwrap_or(Category::News);
    Ok(Item {
        id: row.get("id")?,
        source_id: row.get("source_id")?,
        external_id: row.get("external_id")?,
        url: row.get("url")?,
        url_canonical: row.get("url_canonical")?,
        title: row.get("title")?,
        content: row.get("content")?,
        author: row.get("author")?,
        published_at: parse_dt(&row.get::<_, String>("published_at")?),
        ingested_at: parse_dt(&row.get::<_, String>("ingested_at")?),
        category,
        language: row.get("language")?,
        metadata,
        snapshot_path: row.get("snapshot_path")?,
        cluster_id: None,
        is_representative: false,
    })
}

fn digest_from_row(row: &Row) -> rusqlite::Result<Digest> {
    let content_raw: String = row.get("content_json")?;
    let content_json = serde_json::from_str(&content_raw).unwrap_or(serde_json::Value::Null);
    let section_raw: String = row.get("section")?;
    let generated_at: Option<String> = row.get("generated_at")?;
    Ok(Digest {
        id: row.get("id")?,
        date: row.get("date")?,
        section: section_raw.parse().unwrap_or(Category::News),
        content_markdown: row.get("content_markdown")?,
        content_json,
        generated_at: generated_at.map(|s| parse_dt(&s)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Category;
    use std::collections::HashMap;

    async fn open_tmp() -> (Store, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.db");
        let store = Store::open(&path, 4096).await.unwrap();
        (store, dir)
    }

    fn sample_item(source_id: &str, url: &str, url_canonical: &str) -> Item {
        Item {
            id: Item::make_id(source_id, url),
            source_id: source_id.to_string(),
            external_id: None,
            url: url.to_string(),
            url_canonical: url_canonical.to_string(),
            title: "Title".to_string(),
            content: Some("Body content".to_string()),
            author: None,
            published_at: Utc::now(),
            ingested_at: Utc::now(),
            category: Category::News,
            language: "en".to_string(),
            metadata: HashMap::new(),
            snapshot_path: None,
            cluster_id: None,
            is_representative: false,
        }
    }

    #[tokio::test]
    async fn batch_insert_rejects_duplicate_canonical_url() {
        let (store, _dir) = open_tmp().await;
        let a = sample_item("s1", "https://example.com/a?x=1", "https://example.com/a");
        let b = sample_item("s2", "https://example.com/a", "https://example.com/a");
        let inserted_a = store.batch_insert_items(vec![a]).await.unwrap();
        let inserted_b = store.batch_insert_items(vec![b]).await.unwrap();
        assert_eq!(inserted_a, 1);
        assert_eq!(inserted_b, 0);
        assert!(store.url_canonical_exists("https://example.com/a").await.unwrap());
    }

    #[tokio::test]
    async fn search_finds_matching_title() {
        let (store, _dir) = open_tmp().await;
        let mut item = sample_item("s1", "https://example.com/llm", "https://example.com/llm");
        item.title = "Large Language Models".to_string();
        item.content = Some("A survey of transformer architectures".to_string());
        store.batch_insert_items(vec![item]).await.unwrap();

        let results = store
            .search("language models", SearchFilters::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(store.search_count("language models").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn reset_database_clears_items() {
        let (store, _dir) = open_tmp().await;
        let item = sample_item("s1", "https://example.com/a", "https://example.com/a");
        store.batch_insert_items(vec![item]).await.unwrap();
        store.reset_database().await.unwrap();
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.total_items, 0);
    }
}
