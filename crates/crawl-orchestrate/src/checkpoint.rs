//! Per-run-id checkpoint file: fine-grained page-level resumability for a
//! job that is interrupted mid-run.

use std::path::{Path, PathBuf};

use crawl_core::JobCheckpoint;

fn checkpoint_path(root: &Path, run_id: &str) -> PathBuf {
    root.join(format!("{run_id}.json"))
}

pub fn save_checkpoint(root: &Path, run_id: &str, checkpoint: &JobCheckpoint) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(root)?;
    let path = checkpoint_path(root, run_id);
    std::fs::write(&path, serde_json::to_vec(checkpoint)?)?;
    Ok(path)
}

/// Returns `None` on an absent or corrupt file rather than erroring — a
/// damaged checkpoint just means the job restarts from page 0.
pub fn load_checkpoint(root: &Path, run_id: &str) -> Option<JobCheckpoint> {
    let path = checkpoint_path(root, run_id);
    let bytes = std::fs::read(path).ok()?;
    serde_json::from_slice(&bytes).ok()
}

pub fn clear_checkpoint(root: &Path, run_id: &str) {
    let path = checkpoint_path(root, run_id);
    let _ = std::fs::remove_file(path);
}
