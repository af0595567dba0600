//! Bronze/silver/gold/manifests/checkpoints/metrics directory layout,
//! created eagerly so every downstream writer can assume its root exists.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct DataLayout {
    pub bronze: PathBuf,
    pub silver: PathBuf,
    pub gold: PathBuf,
    pub manifests: PathBuf,
    pub checkpoints: PathBuf,
    pub metrics: PathBuf,
    pub quarantine: PathBuf,
    pub queue: PathBuf,
}

impl DataLayout {
    pub fn new(data_root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let data_root = data_root.into();
        let layout = Self {
            bronze: data_root.join("bronze"),
            silver: data_root.join("silver"),
            gold: data_root.join("gold"),
            manifests: data_root.join("manifests"),
            checkpoints: data_root.join("checkpoints"),
            metrics: data_root.join("metrics"),
            quarantine: data_root.join("quarantine"),
            queue: data_root.join("queue"),
        };
        for path in [
            &layout.bronze,
            &layout.silver,
            &layout.gold,
            &layout.manifests,
            &layout.checkpoints,
            &layout.metrics,
            &layout.quarantine,
            &layout.queue,
        ] {
            std::fs::create_dir_all(path)?;
        }
        Ok(layout)
    }

    /// Single relational store shared by every entity type.
    pub fn gold_sqlite(&self) -> PathBuf {
        self.gold.join("events.db")
    }

    pub fn conditional_cache_path(&self) -> PathBuf {
        self.bronze.join("conditional.json")
    }
}

/// `run_id`'s UTC-day date token. A scheduler-prefixed `run_id`
/// (`{source_type}-YYYYMMDDTHHMMSS...`) is handled by taking the token
/// after the last `-`; a bare `run_id` is the token itself.
pub fn date_partition(run_id: &str) -> String {
    let token = run_id.rsplit('-').next().unwrap_or(run_id);
    let day = token.get(0..8).unwrap_or(token);
    if day.len() == 8 {
        format!("{}-{}-{}", &day[0..4], &day[4..6], &day[6..8])
    } else {
        day.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn new_creates_every_subdirectory() {
        let dir = tempdir().unwrap();
        let layout = DataLayout::new(dir.path()).unwrap();
        assert!(layout.bronze.exists());
        assert!(layout.gold.exists());
        assert!(layout.checkpoints.exists());
    }

    #[test]
    fn date_partition_from_bare_run_id() {
        assert_eq!(date_partition("20260305T120000"), "2026-03-05");
    }

    #[test]
    fn date_partition_from_scheduler_prefixed_run_id() {
        assert_eq!(date_partition("events-20260305T120000123456"), "2026-03-05");
    }
}
