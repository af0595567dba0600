//! Per-URL ETag / Last-Modified store used to issue conditional GETs and
//! avoid re-downloading unchanged pages.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

const CACHE_VERSION: u32 = 1;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CacheEntry {
    etag: Option<String>,
    last_modified: Option<String>,
    last_seen: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheDocument {
    version: u32,
    data: HashMap<String, CacheEntry>,
}

pub struct ConditionalFetchCache {
    path: PathBuf,
    index: Mutex<HashMap<String, CacheEntry>>,
}

impl ConditionalFetchCache {
    pub async fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let index = match tokio::fs::read(&path).await {
            Ok(bytes) => match serde_json::from_slice::<CacheDocument>(&bytes) {
                Ok(doc) if doc.version == CACHE_VERSION => doc.data,
                _ => HashMap::new(),
            },
            Err(_) => HashMap::new(),
        };
        Self {
            path,
            index: Mutex::new(index),
        }
    }

    /// Headers to merge into the next request for `url`, if anything is known.
    pub async fn headers_for(&self, url: &str) -> Vec<(String, String)> {
        let index = self.index.lock().await;
        let mut headers = Vec::new();
        if let Some(entry) = index.get(url) {
            if let Some(etag) = &entry.etag {
                headers.push(("If-None-Match".to_string(), etag.clone()));
            }
            if let Some(last_modified) = &entry.last_modified {
                headers.push(("If-Modified-Since".to_string(), last_modified.clone()));
            }
        }
        headers
    }

    /// Replace the cached entry for `url` and persist the document. The
    /// write happens after releasing the lookup lock, never inside a fetch's
    /// critical section for more than this single I/O.
    pub async fn update(&self, url: &str, etag: Option<String>, last_modified: Option<String>) {
        {
            let mut index = self.index.lock().await;
            index.insert(
                url.to_string(),
                CacheEntry {
                    etag,
                    last_modified,
                    last_seen: Utc::now().timestamp(),
                },
            );
        }
        self.persist().await;
    }

    async fn persist(&self) {
        let data = self.index.lock().await.clone();
        let doc = CacheDocument {
            version: CACHE_VERSION,
            data,
        };
        if let Ok(bytes) = serde_json::to_vec_pretty(&doc) {
            if let Some(parent) = self.path.parent() {
                let _ = tokio::fs::create_dir_all(parent).await;
            }
            let _ = tokio::fs::write(&self.path, bytes).await;
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn headers_round_trip_after_update() {
        let dir = tempdir().expect("tempdir");
        let cache = ConditionalFetchCache::load(dir.path().join("conditional.json")).await;
        cache
            .update(
                "https://example.com/page",
                Some("\"abc123\"".to_string()),
                Some("Tue, 01 Jan 2030 00:00:00 GMT".to_string()),
            )
            .await;

        let headers = cache.headers_for("https://example.com/page").await;
        assert!(headers.contains(&("If-None-Match".to_string(), "\"abc123\"".to_string())));
        assert!(headers
            .iter()
            .any(|(k, v)| k == "If-Modified-Since" && v == "Tue, 01 Jan 2030 00:00:00 GMT"));
    }

    #[tokio::test]
    async fn reloads_persisted_cache_from_disk() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("conditional.json");
        {
            let cache = ConditionalFetchCache::load(&path).await;
            cache
                .update("https://example.com/", Some("\"v1\"".to_string()), None)
                .await;
        }
        let reloaded = ConditionalFetchCache::load(&path).await;
        let headers = reloaded.headers_for("https://example.com/").await;
        assert_eq!(headers, vec![("If-None-Match".to_string(), "\"v1\"".to_string())]);
    }

    #[tokio::test]
    async fn discards_incompatible_version() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("conditional.json");
        tokio::fs::write(&path, br#"{"version":99,"data":{}}"#)
            .await
            .unwrap();
        let cache = ConditionalFetchCache::load(&path).await;
        assert!(cache.headers_for("https://example.com/").await.is_empty());
    }
}
