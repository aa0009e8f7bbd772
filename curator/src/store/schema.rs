//! DDL and migration list for the curator database.
//!
//! The companion `schema.sql` the original loads at startup isn't part of
//! this project's source material, so the DDL below is authored directly
//! from the column usage in the store contract and a standard FTS5
//! sync-trigger setup (mirrors the `chunks`/`doc_metadata` pair in
//! `docstore_core`, generalized to five content+FTS tables).

pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// `(version, description, statements)`. Each migration runs in its own
/// transaction; `schema_version` records the version on success.
pub const MIGRATIONS: &[(i64, &str, &[&str])] = &[(1, "initial schema", &V1_STATEMENTS)];

const V1_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS sources (
        id              TEXT PRIMARY KEY,
        config          TEXT NOT NULL,
        last_fetch_at   TEXT,
        last_error      TEXT,
        error_count     INTEGER NOT NULL DEFAULT 0,
        enabled         INTEGER NOT NULL DEFAULT 1,
        created_at      TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS items (
        id              TEXT PRIMARY KEY,
        source_id       TEXT NOT NULL REFERENCES sources(id),
        external_id     TEXT,
        url             TEXT NOT NULL,
        url_canonical   TEXT NOT NULL UNIQUE,
        title           TEXT NOT NULL DEFAULT '',
        content         TEXT,
        author          TEXT,
        published_at    TEXT NOT NULL,
        ingested_at     TEXT NOT NULL,
        category        TEXT NOT NULL,
        language        TEXT NOT NULL DEFAULT 'en',
        metadata        TEXT,
        snapshot_path   TEXT,
        UNIQUE(source_id, external_id)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_items_source ON items(source_id)",
    "CREATE INDEX IF NOT EXISTS idx_items_category ON items(category)",
    "CREATE INDEX IF NOT EXISTS idx_items_published_at ON items(published_at)",
    r#"
    CREATE TABLE IF NOT EXISTS metrics (
        item_id         TEXT PRIMARY KEY REFERENCES items(id),
        score           REAL NOT NULL,
        score_authority REAL NOT NULL DEFAULT 0,
        score_recency   REAL NOT NULL DEFAULT 0,
        score_popularity REAL NOT NULL DEFAULT 0,
        score_relevance REAL NOT NULL DEFAULT 0,
        dup_penalty     REAL NOT NULL DEFAULT 0,
        cluster_id      TEXT,
        summary         TEXT,
        computed_at     TEXT NOT NULL
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_metrics_score ON metrics(score)",
    r#"
    CREATE TABLE IF NOT EXISTS digests (
        id                INTEGER PRIMARY KEY AUTOINCREMENT,
        date              TEXT NOT NULL,
        section           TEXT NOT NULL,
        content_markdown  TEXT NOT NULL,
        content_json      TEXT NOT NULL,
        generated_at      TEXT NOT NULL,
        UNIQUE(date, section)
    )
    "#,
    r#"
    CREATE VIRTUAL TABLE IF NOT EXISTS items_fts USING fts5(
        title,
        content,
        content='items',
        content_rowid='rowid',
        tokenize='unicode61 remove_diacritics 2'
    )
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS items_ai AFTER INSERT ON items BEGIN
        INSERT INTO items_fts(rowid, title, content) VALUES (new.rowid, new.title, new.content);
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS items_ad AFTER DELETE ON items BEGIN
        INSERT INTO items_fts(items_fts, rowid, title, content) VALUES ('delete', old.rowid, old.title, old.content);
    END
    "#,
    r#"
    CREATE TRIGGER IF NOT EXISTS items_au AFTER UPDATE ON items BEGIN
        INSERT INTO items_fts(items_fts, rowid, title, content) VALUES ('delete', old.rowid, old.title, old.content);
        INSERT INTO items_fts(rowid, title, content) VALUES (new.rowid, new.title, new.content);
    END
    "#,
];

pub const SCHEMA_VERSION_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS schema_version (
        version     INTEGER PRIMARY KEY,
        description TEXT NOT NULL,
        applied_at  TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
    )
"#;
