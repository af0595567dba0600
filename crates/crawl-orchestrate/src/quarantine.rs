//! Rejected-entity sink: every schema validation failure is persisted
//! alongside its reasons for later inspection.

use std::path::{Path, PathBuf};

use chrono::Utc;
use crawl_core::Entity;
use serde::Serialize;

#[derive(Serialize)]
struct RejectDocument<'a> {
    entity: &'a Entity,
    reason: &'a [String],
}

pub struct Quarantine {
    root: PathBuf,
}

impl Quarantine {
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn reject(&self, entity: &Entity, reason: &[String]) -> std::io::Result<PathBuf> {
        let timestamp = Utc::now().format("%Y%m%dT%H%M%S%6f").to_string();
        let path = self.root.join(format!("reject_{timestamp}.json"));
        let doc = RejectDocument { entity, reason };
        std::fs::write(&path, serde_json::to_vec_pretty(&doc)?)?;
        Ok(path)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}
