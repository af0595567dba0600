//! Maps enabled sources × requested entity type to a bounded list of jobs,
//! preserving source order.

use crawl_core::{EntityType, Job, JobMetadata, Source};
use uuid::Uuid;

/// `entity_type` of `None` means "all" — every source type is planned.
pub fn plan_jobs(sources: &[Source], entity_type: Option<EntityType>, limit: usize) -> Vec<Job> {
    let mut jobs = Vec::new();
    for source in sources {
        if let Some(requested) = entity_type {
            if source.entity_type != requested {
                continue;
            }
        }
        let mut job = Job::new(
            Uuid::new_v4().to_string(),
            source.source_id.clone(),
            source.entity_type,
            source.base_url.clone(),
        );
        job.metadata = JobMetadata {
            css_rules_path: Some(source.css_rules_path.clone()),
            max_qps: Some(source.max_qps),
            concurrency: Some(source.concurrency),
        };
        jobs.push(job);
        if jobs.len() >= limit {
            break;
        }
    }
    jobs
}
