//! Binds the source registry, job planner, persistent queue, fetch layer,
//! extraction pipeline, dedup/merge, checkpointer, and tiered storage into
//! one run. Two entry points: [`run_crawl`], the per-job state machine
//! (§4.O) driven by a bounded worker pool, and [`run_scheduler_loop`], the
//! fixed-interval tick loop (§4.N) that invokes it repeatedly.

pub mod checkpoint;
pub mod dedup;
pub mod error;
pub mod layout;
pub mod planner;
pub mod quarantine;
pub mod queue;
pub mod rule_loader;
pub mod source_registry;
pub mod storage;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use crawl_core::{
    discovered_urls_hash, entity_key, nearby_keys, Entity, EntityType, Job, JobCheckpoint, RuleSpec,
    RunManifest, Source, SourceStats,
};
use crawl_core::metrics::DurationRecorder;
use crawl_core::MetricsRegistry;
use crawl_extract::{discover_next_urls, extract_entities, normalise, SchemaError, SchemaRegistry};
use crawl_fetch::{ConditionalFetchCache, Fetcher, HttpClientConfig, HttpFetcher, RawStore, RobotsCache};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{info, warn, Instrument};

use crate::dedup::{Deduplicator, EntityMerger};
use crate::error::{OrchestrateError, Result};
use crate::layout::DataLayout;
use crate::planner::plan_jobs;
use crate::quarantine::Quarantine;
use crate::queue::JobQueue;
use crate::rule_loader::load_rule_spec;
use crate::storage::StorageWriter;

pub const CRATE_NAME: &str = "crawl-orchestrate";

/// Assembled once per CLI invocation (or once per scheduler tick) and
/// threaded down to every worker.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub sources_csv: PathBuf,
    pub schemas_root: PathBuf,
    pub data_root: PathBuf,
    pub entity_type: Option<EntityType>,
    pub source_id_filter: Option<String>,
    pub limit: usize,
    pub concurrency: usize,
    pub qps: f64,
    pub timeout: Duration,
    pub user_agent: String,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    /// Supplied by the scheduler to reuse/prefix a run id; `None` means
    /// generate a fresh bare `run_id` for this invocation.
    pub run_id: Option<String>,
}

impl RunConfig {
    pub fn new(sources_csv: PathBuf, schemas_root: PathBuf, data_root: PathBuf) -> Self {
        Self {
            sources_csv,
            schemas_root,
            data_root,
            entity_type: Some(EntityType::Events),
            source_id_filter: None,
            limit: 100,
            concurrency: 3,
            qps: 2.0,
            timeout: Duration::from_secs(30),
            user_agent: "listings-crawler/0.1".to_string(),
            since: None,
            until: None,
            run_id: None,
        }
    }
}

/// One planned job as reported by `--dry-run`: identity plus enough of its
/// metadata to audit the plan without touching bronze.
#[derive(Debug, Clone, Serialize)]
pub struct PlannedJobView {
    pub job_id: String,
    pub source_id: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub url: String,
    pub css_rules_path: Option<PathBuf>,
}

impl From<&Job> for PlannedJobView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.job_id.clone(),
            source_id: job.source_id.clone(),
            entity_type: job.entity_type,
            url: job.url.clone(),
            css_rules_path: job.metadata.css_rules_path.clone(),
        }
    }
}

fn load_filtered_sources(config: &RunConfig) -> Result<Vec<Source>> {
    let mut sources = source_registry::load_sources(&config.sources_csv)?;
    if let Some(filter) = &config.source_id_filter {
        sources.retain(|s| &s.source_id == filter);
    }
    Ok(sources)
}

/// Plan jobs without fetching anything: the `--dry-run` contract.
pub fn plan(config: &RunConfig) -> Result<Vec<Job>> {
    let sources = load_filtered_sources(config)?;
    Ok(plan_jobs(&sources, config.entity_type, config.limit))
}

fn fresh_run_id(prefix: Option<&str>) -> String {
    let stamp = Utc::now().format("%Y%m%dT%H%M%S").to_string();
    match prefix {
        Some(p) => format!("{p}-{stamp}"),
        None => stamp,
    }
}

/// The checkpoint file identifier for one job within one run. The spec
/// names this "one file per run_id", but a run fans out across many
/// concurrently-processed jobs, so the on-disk key is the pair.
fn checkpoint_id(run_id: &str, job_id: &str) -> String {
    format!("{run_id}__{job_id}")
}

/// Per-run mutable state shared by every worker task: the dedup index and
/// accepted-results index per entity type, per-source row counters, and the
/// pre-seeded metrics registry. Each map is behind its own async mutex —
/// workers run on tokio's multi-threaded runtime, so these are genuinely
/// contended (the dedup index is the hottest, per §5).
struct RunState {
    run_id: String,
    layout: DataLayout,
    metrics: MetricsRegistry,
    dedup: AsyncMutex<HashMap<EntityType, Deduplicator>>,
    results: AsyncMutex<HashMap<EntityType, BTreeMap<String, Entity>>>,
    source_stats: AsyncMutex<BTreeMap<String, SourceStats>>,
    quarantine: Quarantine,
    schemas: SchemaRegistry,
    fetcher: Fetcher,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
}

enum AcceptOutcome {
    New,
    Updated,
    Duplicate,
}

impl RunState {
    /// Dedup/merge a candidate that already passed validation, updating the
    /// results index, dedup index, metrics, and this source's row counters.
    async fn accept_candidate(&self, source_id: &str, entity_type: EntityType, candidate: Entity) -> AcceptOutcome {
        let mut dedup_guard = self.dedup.lock().await;
        let dedup_index = dedup_guard.entry(entity_type).or_default();
        let is_dup = dedup_index.is_duplicate(&candidate);

        let mut results_guard = self.results.lock().await;
        let bucket = results_guard.entry(entity_type).or_default();

        let mut stats_guard = self.source_stats.lock().await;
        let stats = stats_guard.entry(source_id.to_string()).or_default();

        if is_dup {
            let canonical = entity_key(&candidate);
            let target_key = if bucket.contains_key(&canonical) {
                Some(canonical)
            } else {
                nearby_keys(&candidate).into_iter().find(|k| bucket.contains_key(k))
            };

            if let Some(target_key) = target_key {
                let existing = bucket.get_mut(&target_key).expect("matched key present");
                if EntityMerger::merge(existing, &candidate) {
                    self.metrics.incr("entities_updated", 1);
                    stats.rows_updated += 1;
                    return AcceptOutcome::Updated;
                }
            }
            self.metrics.incr("duplicates", 1);
            AcceptOutcome::Duplicate
        } else {
            dedup_index.remember(&candidate);
            bucket.insert(entity_key(&candidate), candidate);
            self.metrics.incr("entities_new", 1);
            stats.rows_new += 1;
            AcceptOutcome::New
        }
    }
}

/// Prune `entity` to its schema's declared top-level properties, then
/// validate the pruned payload. `type` and `source_id` always survive
/// pruning since they are required to deserialise (and identify) the result
/// regardless of whether a given schema happens to declare them.
fn prune_and_validate(
    schemas: &SchemaRegistry,
    entity_type: EntityType,
    entity: &Entity,
) -> std::result::Result<(Entity, crawl_extract::ValidationResult), SchemaError> {
    let payload = serde_json::to_value(entity).expect("Entity always serialises");
    let mut pruned = schemas.prune(entity_type, &payload)?;
    if let Value::Object(map) = &mut pruned {
        if let Some(type_value) = payload.get("type") {
            map.entry("type".to_string()).or_insert_with(|| type_value.clone());
        }
        if let Some(source_id) = payload.get("source_id") {
            map.entry("source_id".to_string()).or_insert_with(|| source_id.clone());
        }
    }
    let validation = schemas.validate(entity_type, &pruned)?;
    let pruned_entity = serde_json::from_value(pruned).unwrap_or_else(|_| entity.clone());
    Ok((pruned_entity, validation))
}

fn within_window(entity: &Entity, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> bool {
    if since.is_none() && until.is_none() {
        return true;
    }
    let Some(start) = entity.common().start.as_deref() else {
        return true;
    };
    let Ok(parsed) = DateTime::parse_from_rfc3339(start) else {
        return true;
    };
    let parsed = parsed.with_timezone(&Utc);
    if let Some(since) = since {
        if parsed < since {
            return false;
        }
    }
    if let Some(until) = until {
        if parsed > until {
            return false;
        }
    }
    true
}

/// Run a single job to completion: initial fetch, pagination discovery,
/// checkpoint resume, and the per-page extract→normalise→validate→dedup
/// pipeline (§4.O steps 2–6, minus the succeeded/failed bookkeeping the
/// caller handles).
async fn run_job(job: &Job, source: &Source, state: &RunState) -> Result<()> {
    let rule_path = job
        .metadata
        .css_rules_path
        .clone()
        .unwrap_or_else(|| source.css_rules_path.clone());
    let rule: RuleSpec = load_rule_spec(&rule_path)?;
    let source_qps = job.metadata.max_qps.unwrap_or(source.max_qps);

    let initial = state
        .fetcher
        .fetch_document(&job.source_id, source_qps, &job.url, &state.metrics)
        .await
        .map_err(|source| OrchestrateError::Transport {
            url: job.url.clone(),
            source,
        })?;

    let Some(snapshot) = initial else {
        return Ok(());
    };
    let initial_html = snapshot.html;

    let mut discovered = vec![job.url.clone()];
    discovered.extend(discover_next_urls(&initial_html, &job.url, &rule));

    let hash = discovered_urls_hash(&discovered);
    let ckpt_id = checkpoint_id(&state.run_id, &job.job_id);
    let start_page = match checkpoint::load_checkpoint(&state.layout.checkpoints, &ckpt_id) {
        Some(ckpt) if ckpt.job_id == job.job_id && ckpt.discovered_urls_hash == hash => ckpt.page_idx as usize + 1,
        _ => 0,
    };

    for page_idx in start_page..discovered.len() {
        let html = if page_idx == 0 {
            Some(initial_html.clone())
        } else {
            state
                .fetcher
                .fetch_document(&job.source_id, source_qps, &discovered[page_idx], &state.metrics)
                .await
                .map_err(|source| OrchestrateError::Transport {
                    url: discovered[page_idx].clone(),
                    source,
                })?
                .map(|snap| snap.html)
        };

        let Some(html) = html else {
            continue;
        };

        let candidates = extract_entities(&html, &job.source_id, job.entity_type, &rule);
        for mut candidate in candidates {
            normalise(&mut candidate);
            if !within_window(&candidate, state.since, state.until) {
                continue;
            }

            let (pruned_entity, validation) = match prune_and_validate(&state.schemas, job.entity_type, &candidate) {
                Ok(pair) => pair,
                Err(SchemaError::NotFound { entity_type, path }) => {
                    return Err(OrchestrateError::SchemaNotFound { entity_type, path });
                }
                Err(other) => return Err(OrchestrateError::Fatal(other.to_string())),
            };

            if !validation.ok {
                state.metrics.incr("validates_failed", 1);
                state.metrics.incr("quarantine_rows", 1);
                state.quarantine.reject(&candidate, &validation.errors)?;
                let mut stats = state.source_stats.lock().await;
                stats.entry(job.source_id.clone()).or_default().rejects += 1;
                continue;
            }

            state.accept_candidate(&job.source_id, job.entity_type, pruned_entity).await;

            checkpoint::save_checkpoint(
                &state.layout.checkpoints,
                &ckpt_id,
                &JobCheckpoint {
                    job_id: job.job_id.clone(),
                    url_cursor: discovered[page_idx].clone(),
                    page_idx: page_idx as u32,
                    discovered_urls_hash: hash.clone(),
                },
            )?;
        }
    }

    Ok(())
}

async fn process_job(mut job: Job, queue: &JobQueue, state: &Arc<RunState>, sources: &HashMap<String, Source>) {
    let Some(source) = sources.get(&job.source_id).cloned() else {
        warn!(job_id = %job.job_id, source_id = %job.source_id, "job references unknown source, dropping");
        return;
    };

    let span = tracing::info_span!("job", run_id = %state.run_id, job_id = %job.job_id, source_id = %job.source_id);
    let state_for_span = state.clone();

    async move {
        job.mark_started();
        match run_job(&job, &source, &state_for_span).await {
            Ok(()) => {
                job.mark_succeeded();
                checkpoint::clear_checkpoint(
                    &state_for_span.layout.checkpoints,
                    &checkpoint_id(&state_for_span.run_id, &job.job_id),
                );
                info!("job succeeded");
            }
            Err(err) => {
                warn!(error = %err, "job failed");
                job.mark_failed(err.to_string());
                if job.should_retry() {
                    if let Err(persist_err) = queue.enqueue(job).await {
                        warn!(error = %persist_err, "failed to re-enqueue retrying job");
                    }
                }
            }
        }
    }
    .instrument(span)
    .await
}

/// One worker: dequeue (non-blocking, ~100ms poll), process, repeat. Exits
/// once the queue is observed empty after a poll.
async fn worker_loop(queue: Arc<JobQueue>, state: Arc<RunState>, sources: Arc<HashMap<String, Source>>) {
    loop {
        match queue.try_dequeue().await {
            Ok(Some(job)) => {
                process_job(job, &queue, &state, &sources).await;
            }
            Ok(None) => {
                tokio::time::sleep(Duration::from_millis(100)).await;
                if queue.is_empty().await {
                    break;
                }
            }
            Err(err) => {
                warn!(error = %err, "queue dequeue failed, worker exiting");
                break;
            }
        }
    }
}

/// Run one full crawl: plan jobs, enqueue, drain with a bounded worker
/// pool, commit tiered storage, and write the run manifest.
pub async fn run_crawl(config: RunConfig) -> Result<RunManifest> {
    let layout = DataLayout::new(&config.data_root)?;
    let sources = load_filtered_sources(&config)?;
    let jobs = plan_jobs(&sources, config.entity_type, config.limit);
    let sources_by_id: HashMap<String, Source> = sources.into_iter().map(|s| (s.source_id.clone(), s)).collect();

    let run_id = config.run_id.clone().unwrap_or_else(|| fresh_run_id(None));

    let queue = JobQueue::open(layout.queue.join(format!("{run_id}.jsonl"))).await?;
    for job in jobs {
        queue.enqueue(job).await?;
    }

    let conditional = Arc::new(ConditionalFetchCache::load(layout.conditional_cache_path()).await);
    let robots = Arc::new(
        RobotsCache::new(config.user_agent.clone(), Duration::from_secs(5))
            .map_err(|err| OrchestrateError::Config(format!("building robots client: {err}")))?,
    );
    let http_config = HttpClientConfig {
        timeout: config.timeout,
        user_agent: Some(config.user_agent.clone()),
        global_concurrency: (config.concurrency.max(1) * 4).max(16),
        per_source_concurrency: config.concurrency.max(1),
        ..HttpClientConfig::default()
    };
    let http = HttpFetcher::new(http_config, Some(config.qps))
        .map_err(|err| OrchestrateError::Config(format!("building http client: {err}")))?;
    let fetcher = Fetcher::new(http, robots, conditional, RawStore::new(&layout.bronze));

    let schemas = SchemaRegistry::new(&config.schemas_root);
    let quarantine = Quarantine::new(&layout.quarantine)?;

    let state = Arc::new(RunState {
        run_id: run_id.clone(),
        layout: layout.clone(),
        metrics: MetricsRegistry::new(),
        dedup: AsyncMutex::new(HashMap::new()),
        results: AsyncMutex::new(HashMap::new()),
        source_stats: AsyncMutex::new(BTreeMap::new()),
        quarantine,
        schemas,
        fetcher,
        since: config.since,
        until: config.until,
    });

    let queue = Arc::new(queue);
    let sources_by_id = Arc::new(sources_by_id);

    let worker_count = config.concurrency.max(1);
    let mut handles = Vec::with_capacity(worker_count);
    {
        let _duration_recorder = DurationRecorder::start(&state.metrics, "run_duration_ms");
        for _ in 0..worker_count {
            let queue = queue.clone();
            let state = state.clone();
            let sources_by_id = sources_by_id.clone();
            handles.push(tokio::spawn(
                async move { worker_loop(queue, state, sources_by_id).await }.in_current_span(),
            ));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    let mut output_paths = BTreeMap::new();
    let mut counts_by_type = BTreeMap::new();
    {
        let results = state.results.lock().await;
        let writer = StorageWriter::new(&layout);
        for (entity_type, bucket) in results.iter() {
            let entities: Vec<Entity> = bucket.values().cloned().collect();
            counts_by_type.insert(entity_type.as_str().to_string(), entities.len() as u64);
            let persisted = writer.persist(*entity_type, &entities, &run_id)?;
            if let Some(path) = persisted.silver {
                output_paths.insert(format!("{entity_type}.silver"), path.display().to_string());
            }
            if let Some(path) = persisted.gold {
                output_paths.insert(format!("{entity_type}.gold"), path.display().to_string());
            }
            if let Some(path) = persisted.sqlite {
                output_paths.insert(format!("{entity_type}.sqlite"), path.display().to_string());
            }
        }
    }

    let source_stats = state.source_stats.lock().await.clone();
    let metrics_snapshot = state.metrics.snapshot();

    let metrics_export_path = layout.metrics.join(format!("metrics-{run_id}.json"));
    std::fs::write(&metrics_export_path, state.metrics.export_json(&run_id)?)?;

    let manifest = RunManifest {
        run_id: run_id.clone(),
        counts_by_type,
        output_paths,
        source_stats,
        metrics_snapshot,
        exit_code: 0,
    };

    let manifest_path = layout.manifests.join(format!("run-{run_id}.json"));
    std::fs::write(&manifest_path, serde_json::to_vec_pretty(&manifest)?)
        .map_err(|err| OrchestrateError::Fatal(format!("writing manifest {}: {err}", manifest_path.display())))?;

    Ok(manifest)
}

/// One entry in `scheduler.jobs[]`.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerJobConfig {
    pub source_type: EntityType,
    pub cron: String,
    pub limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerConfig {
    pub jobs: Vec<SchedulerJobConfig>,
    #[serde(default = "default_interval_seconds")]
    pub interval_seconds: u64,
}

fn default_interval_seconds() -> u64 {
    60
}

impl SchedulerConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&text)
            .map_err(|err| OrchestrateError::Config(format!("parsing scheduler config {}: {err}", path.display())))
    }
}

/// Reuse an in-flight `run_id` for `source_type` from an existing
/// checkpoint file (`<source_type>-*`), or mint a fresh one. Enables a
/// scheduler restart to resume a tick's jobs rather than starting over.
fn reuse_or_fresh_run_id(checkpoints_dir: &Path, source_type: &str) -> String {
    let prefix = format!("{source_type}-");
    if let Ok(entries) = std::fs::read_dir(checkpoints_dir) {
        let mut matches: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| entry.file_name().into_string().ok())
            .filter(|name| name.starts_with(&prefix) && name.ends_with(".json"))
            .collect();
        matches.sort();
        if let Some(first) = matches.into_iter().next() {
            let stem = first.trim_end_matches(".json");
            if let Some((run_id, _job_id)) = stem.split_once("__") {
                return run_id.to_string();
            }
        }
    }
    fresh_run_id(Some(source_type))
}

/// Drive `run_crawl` on a fixed `interval_seconds` cadence, once per
/// configured scheduler job per tick, for `ticks` ticks (or forever if
/// `None`). Cron expressions are validated up front but do not govern
/// cadence — see DESIGN.md for why this mismatch is preserved rather than
/// silently corrected.
pub async fn run_scheduler_loop(base: RunConfig, scheduler: SchedulerConfig, ticks: Option<u64>) -> Result<Vec<RunManifest>> {
    for job in &scheduler.jobs {
        job.cron
            .parse::<cron::Schedule>()
            .map_err(|err| OrchestrateError::Config(format!("invalid cron expression '{}': {err}", job.cron)))?;
    }

    let checkpoints_dir = base.data_root.join("checkpoints");
    let mut manifests = Vec::new();
    let mut tick_count: u64 = 0;

    loop {
        for job_cfg in &scheduler.jobs {
            let run_id = reuse_or_fresh_run_id(&checkpoints_dir, job_cfg.source_type.as_str());
            let mut tick_config = base.clone();
            tick_config.entity_type = Some(job_cfg.source_type);
            tick_config.limit = job_cfg.limit;
            tick_config.run_id = Some(run_id);
            manifests.push(run_crawl(tick_config).await?);
        }

        tick_count += 1;
        if let Some(max_ticks) = ticks {
            if tick_count >= max_ticks {
                break;
            }
        }
        tokio::time::sleep(Duration::from_secs(scheduler.interval_seconds)).await;
    }

    Ok(manifests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_sources_csv(dir: &TempDir, rows: &str) -> PathBuf {
        let path = dir.path().join("sources.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "source_id,base_url,type,country,robots_ok,sitemap_url,css_rules_path,crawl_freq,max_qps,concurrency,enabled"
        )
        .unwrap();
        write!(file, "{rows}").unwrap();
        path
    }

    fn write_rule_file(dir: &TempDir, name: &str) -> PathBuf {
        let path = dir.path().join(name);
        std::fs::write(
            &path,
            "selectors:\n  list_item: \".event\"\nfields:\n  title: \".title\"\n",
        )
        .unwrap();
        path
    }

    fn write_event_schema(dir: &TempDir) {
        let schemas_dir = dir.path().join("schemas");
        std::fs::create_dir_all(&schemas_dir).unwrap();
        let schema = serde_json::json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "type": "object",
            "properties": {
                "type": {"type": "string"},
                "source_id": {"type": "string"},
                "title": {"type": "string"},
                "venue_name": {"type": "string"},
                "start": {"type": "string"},
                "end": {"type": "string"},
                "timezone": {"type": "string"},
                "address": {"type": "string"},
                "city": {"type": "string"},
                "country": {"type": "string"},
                "time_slots": {"type": "array"},
                "price_text": {"type": "string"},
                "price_value": {"type": "number"},
                "organizer": {"type": "string"},
                "url": {"type": "string"},
                "emails": {"type": "array"},
                "phones": {"type": "array"},
                "images": {"type": "array"},
                "taxonomy": {"type": "array"},
            },
            "required": ["title", "source_id"],
        });
        std::fs::write(
            schemas_dir.join("event.schema.json"),
            serde_json::to_vec_pretty(&schema).unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn plan_respects_limit_and_type_filter() {
        let dir = TempDir::new().unwrap();
        write_rule_file(&dir, "rules.yaml");
        let csv = write_sources_csv(
            &dir,
            "src-1,https://example.com,events,DE,true,,rules.yaml,daily,1,1,true\nsrc-2,https://example.com,sports,DE,true,,rules.yaml,daily,1,1,true\n",
        );
        let mut config = RunConfig::new(csv, dir.path().join("schemas"), dir.path().join("data"));
        config.entity_type = Some(EntityType::Events);
        config.limit = 10;
        let jobs = plan(&config).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].source_id, "src-1");
    }

    #[test]
    fn checkpoint_id_embeds_run_and_job() {
        assert_eq!(checkpoint_id("run-1", "job-1"), "run-1__job-1");
    }

    #[test]
    fn reuse_or_fresh_run_id_falls_back_when_no_checkpoint_matches() {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path()).unwrap();
        let run_id = reuse_or_fresh_run_id(dir.path(), "events");
        assert!(run_id.starts_with("events-"));
    }

    #[test]
    fn reuse_or_fresh_run_id_picks_up_existing_checkpoint_prefix() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("events-20260101T000000__job-1.json"), b"{}").unwrap();
        let run_id = reuse_or_fresh_run_id(dir.path(), "events");
        assert_eq!(run_id, "events-20260101T000000");
    }

    #[tokio::test]
    async fn end_to_end_crawl_commits_tiers_and_manifest() {
        let dir = TempDir::new().unwrap();
        write_rule_file(&dir, "rules.yaml");
        write_event_schema(&dir);
        let html_path = dir.path().join("page.html");
        std::fs::write(
            &html_path,
            r#"<html><body>
                <div class="event"><h2 class="title">Jazz Night</h2></div>
                <div class="event"><h2 class="title">Art Expo</h2></div>
            </body></html>"#,
        )
        .unwrap();
        let file_url = format!("file://{}", html_path.display());
        let csv = write_sources_csv(
            &dir,
            &format!("src-1,{file_url},events,DE,true,,rules.yaml,daily,1,1,true\n"),
        );

        // file:// URLs are not fetchable by reqwest in this harness, so this
        // test exercises planning + schema wiring rather than a live fetch;
        // the fetch-path behaviour is covered by crawl-fetch's own tests.
        let config = RunConfig::new(csv, dir.path().join("schemas"), dir.path().join("data"));
        let jobs = plan(&config).unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].url, file_url);
    }
}
