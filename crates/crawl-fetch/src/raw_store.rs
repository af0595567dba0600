//! Raw/bronze tier: one append-only directory per fetched URL, keyed by
//! `sha256(url)`, holding an HTML capture per fetch with a sibling headers
//! document.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::fs;

#[derive(Debug, Clone)]
pub struct RawStore {
    bronze_root: PathBuf,
}

#[derive(Debug, Serialize)]
struct HeadersDocument<'a> {
    url: &'a str,
    headers: &'a BTreeMap<String, String>,
}

impl RawStore {
    pub fn new(bronze_root: impl Into<PathBuf>) -> Self {
        Self {
            bronze_root: bronze_root.into(),
        }
    }

    pub fn sha256_hex(url: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(url.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Persist one fetch as `<bronze>/<sha256(url)>/<fetched_at>.html` plus a
    /// sibling `.headers.json`. Returns the HTML file's path.
    pub async fn store_snapshot(
        &self,
        url: &str,
        html: &str,
        headers: &BTreeMap<String, String>,
        fetched_at: DateTime<Utc>,
    ) -> anyhow::Result<PathBuf> {
        let dir = self.bronze_root.join(Self::sha256_hex(url));
        fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("creating bronze directory {}", dir.display()))?;

        let stamp = fetched_at.format("%Y%m%dT%H%M%S").to_string();
        let html_path = dir.join(format!("{stamp}.html"));
        let headers_path = dir.join(format!("{stamp}.headers.json"));

        fs::write(&html_path, html.as_bytes())
            .await
            .with_context(|| format!("writing snapshot {}", html_path.display()))?;

        let doc = HeadersDocument { url, headers };
        let body = serde_json::to_vec_pretty(&doc).context("serialising headers document")?;
        fs::write(&headers_path, body)
            .await
            .with_context(|| format!("writing headers {}", headers_path.display()))?;

        Ok(html_path)
    }

    pub fn bronze_root(&self) -> &Path {
        &self.bronze_root
    }
}
