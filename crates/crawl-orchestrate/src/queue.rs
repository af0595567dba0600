//! Bounded FIFO job queue with a crash-safe line-delimited mirror on disk.
//! Every mutation rewrites the mirror atomically within a lock; on
//! construction an existing mirror is replayed back into memory.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use crawl_core::Job;
use tokio::sync::Mutex;

use crate::error::Result;

pub struct JobQueue {
    path: PathBuf,
    state: Mutex<VecDeque<Job>>,
}

impl JobQueue {
    /// Load the queue from its mirror file, if any, replaying jobs in the
    /// order they were written.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let mut jobs = VecDeque::new();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if let Ok(contents) = tokio::fs::read_to_string(&path).await {
            for line in contents.lines() {
                if line.trim().is_empty() {
                    continue;
                }
                if let Ok(job) = serde_json::from_str::<Job>(line) {
                    jobs.push_back(job);
                }
            }
        }
        Ok(Self {
            path,
            state: Mutex::new(jobs),
        })
    }

    async fn persist(&self, jobs: &VecDeque<Job>) -> Result<()> {
        let mut body = String::new();
        for job in jobs {
            body.push_str(&serde_json::to_string(job)?);
            body.push('\n');
        }
        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, body.as_bytes()).await?;
        tokio::fs::rename(&tmp_path, &self.path).await?;
        Ok(())
    }

    pub async fn enqueue(&self, job: Job) -> Result<()> {
        let mut jobs = self.state.lock().await;
        jobs.push_back(job);
        self.persist(&jobs).await
    }

    /// Pop the next job if one is available without blocking. The
    /// orchestrator's worker loop polls this on a short interval so a
    /// worker can observe emptiness and exit.
    pub async fn try_dequeue(&self) -> Result<Option<Job>> {
        let mut jobs = self.state.lock().await;
        let job = jobs.pop_front();
        if job.is_some() {
            self.persist(&jobs).await?;
        }
        Ok(job)
    }

    pub async fn clear(&self) -> Result<()> {
        let mut jobs = self.state.lock().await;
        jobs.clear();
        self.persist(&jobs).await
    }

    pub async fn is_empty(&self) -> bool {
        self.state.lock().await.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawl_core::EntityType;
    use tempfile::tempdir;

    fn job(id: &str) -> Job {
        Job::new(id.to_string(), "src-1".to_string(), EntityType::Events, "https://example.com".to_string())
    }

    #[tokio::test]
    async fn enqueue_dequeue_round_trips_fifo_order() {
        let dir = tempdir().unwrap();
        let queue = JobQueue::open(dir.path().join("jobs.jsonl")).await.unwrap();
        queue.enqueue(job("j1")).await.unwrap();
        queue.enqueue(job("j2")).await.unwrap();
        assert_eq!(queue.try_dequeue().await.unwrap().unwrap().job_id, "j1");
        assert_eq!(queue.try_dequeue().await.unwrap().unwrap().job_id, "j2");
        assert!(queue.try_dequeue().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mirror_is_replayed_on_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jobs.jsonl");
        {
            let queue = JobQueue::open(&path).await.unwrap();
            queue.enqueue(job("j1")).await.unwrap();
        }
        let reopened = JobQueue::open(&path).await.unwrap();
        assert!(!reopened.is_empty().await);
        assert_eq!(reopened.try_dequeue().await.unwrap().unwrap().job_id, "j1");
    }

    #[tokio::test]
    async fn clear_truncates_mirror() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("jobs.jsonl");
        let queue = JobQueue::open(&path).await.unwrap();
        queue.enqueue(job("j1")).await.unwrap();
        queue.clear().await.unwrap();
        assert!(queue.is_empty().await);
        let reopened = JobQueue::open(&path).await.unwrap();
        assert!(reopened.is_empty().await);
    }
}
