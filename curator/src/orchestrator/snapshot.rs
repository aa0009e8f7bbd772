//! Snapshot filesystem layout: `{snapshot_root}/{source_id}/{date}/{hash}.html`.
//! Writes are idempotent overwrites; same URL, same source, same day always
//! resolves to the same path.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use sha2::{Digest as _, Sha256};

use crate::error::Result;
use crate::store::models::hex_prefix;

pub struct SnapshotManager {
    root: PathBuf,
}

impl SnapshotManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        SnapshotManager { root: root.into() }
    }

    pub fn path_for(&self, source_id: &str, date: NaiveDate, url: &str) -> PathBuf {
        let digest = Sha256::digest(url.as_bytes());
        let hash = hex_prefix(&digest, 12);
        self.root
            .join(source_id)
            .join(date.format("%Y-%m-%d").to_string())
            .join(format!("{hash}.html"))
    }

    pub fn exists(&self, source_id: &str, date: NaiveDate, url: &str) -> bool {
        self.path_for(source_id, date, url).is_file()
    }

    pub async fn save(&self, source_id: &str, date: NaiveDate, url: &str, html: &str) -> Result<PathBuf> {
        let path = self.path_for(source_id, date, url);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, html).await?;
        Ok(path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[tokio::test]
    async fn save_and_exists_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = SnapshotManager::new(dir.path());
        let date = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        assert!(!manager.exists("hn", date, "https://example.com/a"));
        manager
            .save("hn", date, "https://example.com/a", "<html></html>")
            .await
            .unwrap();
        assert!(manager.exists("hn", date, "https://example.com/a"));
    }

    #[test]
    fn path_is_stable_for_same_inputs() {
        let manager = SnapshotManager::new("/tmp/snapshots");
        let date = NaiveDate::from_ymd_opt(2026, 1, 15).unwrap();
        let a = manager.path_for("hn", date, "https://example.com/a");
        let b = manager.path_for("hn", date, "https://example.com/a");
        assert_eq!(a, b);
    }
}
