//! Domain model shared by every stage of the crawl pipeline: sources, jobs,
//! snapshots, the polymorphic entity record, rule specs, checkpoints, run
//! manifests, and the pure dedup-key functions.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};

pub mod metrics;
pub use metrics::MetricsRegistry;

pub const CRATE_NAME: &str = "crawl-core";

/// The three entity families this crawler plans jobs for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Events,
    Festivals,
    Sports,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Events => "events",
            EntityType::Festivals => "festivals",
            EntityType::Sports => "sports",
        }
    }

    /// Schema file stem: the type name with its trailing "s" dropped.
    pub fn schema_stem(&self) -> &'static str {
        match self {
            EntityType::Events => "event",
            EntityType::Festivals => "festival",
            EntityType::Sports => "sport",
        }
    }
}

impl std::str::FromStr for EntityType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "events" => Ok(EntityType::Events),
            "festivals" => Ok(EntityType::Festivals),
            "sports" => Ok(EntityType::Sports),
            other => Err(CoreError::UnknownEntityType(other.to_string())),
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),
    #[error("unknown crawl frequency: {0}")]
    UnknownCrawlFreq(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrawlFreq {
    Daily,
    Weekly,
    Monthly,
}

impl std::str::FromStr for CrawlFreq {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "daily" => Ok(CrawlFreq::Daily),
            "weekly" => Ok(CrawlFreq::Weekly),
            "monthly" => Ok(CrawlFreq::Monthly),
            other => Err(CoreError::UnknownCrawlFreq(other.to_string())),
        }
    }
}

/// A registered listing source, as read from the sources CSV.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub source_id: String,
    pub base_url: String,
    #[serde(rename = "type")]
    pub entity_type: EntityType,
    pub country: String,
    pub robots_ok: bool,
    pub sitemap_url: Option<String>,
    pub css_rules_path: std::path::PathBuf,
    pub crawl_freq: CrawlFreq,
    pub max_qps: f64,
    pub concurrency: u32,
    pub enabled: bool,
}

/// Lifecycle states of a planned unit of work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    InProgress,
    Succeeded,
    Retry,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub job_id: String,
    pub source_id: String,
    pub entity_type: EntityType,
    pub url: String,
    pub attempts: u32,
    pub max_attempts: u32,
    pub status: JobStatus,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub metadata: JobMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobMetadata {
    pub css_rules_path: Option<std::path::PathBuf>,
    pub max_qps: Option<f64>,
    pub concurrency: Option<u32>,
}

impl Job {
    pub fn new(job_id: String, source_id: String, entity_type: EntityType, url: String) -> Self {
        Self {
            job_id,
            source_id,
            entity_type,
            url,
            attempts: 0,
            max_attempts: 3,
            status: JobStatus::Pending,
            last_error: None,
            created_at: Utc::now(),
            metadata: JobMetadata::default(),
        }
    }

    pub fn mark_started(&mut self) {
        self.status = JobStatus::InProgress;
        self.attempts += 1;
    }

    pub fn mark_succeeded(&mut self) {
        self.status = JobStatus::Succeeded;
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
        self.status = if self.attempts >= self.max_attempts {
            JobStatus::Failed
        } else {
            JobStatus::Retry
        };
    }

    pub fn should_retry(&self) -> bool {
        self.status == JobStatus::Retry && self.attempts < self.max_attempts
    }
}

/// A fetched document plus enough metadata to reconstruct its raw-tier path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub url: String,
    pub html: String,
    pub headers: BTreeMap<String, String>,
    pub fetched_at: DateTime<Utc>,
    pub path: Option<std::path::PathBuf>,
}

/// One `{start, end}` window within an entity.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub start: Option<String>,
    pub end: Option<String>,
}

/// Shared attributes carried by every entity variant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntityCommon {
    pub source_id: String,
    pub title: Option<String>,
    pub venue_name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub country: Option<String>,
    #[serde(default)]
    pub time_slots: Vec<TimeSlot>,
    pub timezone: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub price_text: Option<String>,
    pub price_value: Option<f64>,
    pub organizer: Option<String>,
    pub url: Option<String>,
    #[serde(default)]
    pub emails: Vec<String>,
    #[serde(default)]
    pub phones: Vec<String>,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub taxonomy: Vec<String>,
}

/// The polymorphic extracted record. `type` is the serde tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Entity {
    Events(EntityCommon),
    Festivals(EntityCommon),
    Sports {
        #[serde(flatten)]
        common: EntityCommon,
        sport_type: Option<String>,
    },
}

impl Entity {
    pub fn entity_type(&self) -> EntityType {
        match self {
            Entity::Events(_) => EntityType::Events,
            Entity::Festivals(_) => EntityType::Festivals,
            Entity::Sports { .. } => EntityType::Sports,
        }
    }

    pub fn common(&self) -> &EntityCommon {
        match self {
            Entity::Events(c) | Entity::Festivals(c) => c,
            Entity::Sports { common, .. } => common,
        }
    }

    pub fn common_mut(&mut self) -> &mut EntityCommon {
        match self {
            Entity::Events(c) | Entity::Festivals(c) => c,
            Entity::Sports { common, .. } => common,
        }
    }

    pub fn sport_type(&self) -> Option<&str> {
        match self {
            Entity::Sports { sport_type, .. } => sport_type.as_deref(),
            _ => None,
        }
    }

    /// Build an empty shell of the given type, ready for field population.
    pub fn empty(entity_type: EntityType, source_id: impl Into<String>) -> Self {
        let common = EntityCommon {
            source_id: source_id.into(),
            ..Default::default()
        };
        match entity_type {
            EntityType::Events => Entity::Events(common),
            EntityType::Festivals => Entity::Festivals(common),
            EntityType::Sports => Entity::Sports {
                common,
                sport_type: None,
            },
        }
    }
}

/// Declarative rule-based extraction instructions for one source.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RuleSpec {
    #[serde(default = "default_list_item")]
    pub list_item: String,
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
    pub pagination_next: Option<String>,
    #[serde(default)]
    pub pagination_month_grid: bool,
    #[serde(default = "default_max_pages")]
    pub pagination_max_pages: u32,
    pub timezone: Option<String>,
}

fn default_list_item() -> String {
    "body".to_string()
}

fn default_max_pages() -> u32 {
    1
}

/// Resumability marker for one job within one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobCheckpoint {
    pub job_id: String,
    pub url_cursor: String,
    pub page_idx: u32,
    pub discovered_urls_hash: String,
}

/// Per-source accepted/updated/rejected row counts for one run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceStats {
    pub rows_new: u64,
    pub rows_updated: u64,
    pub rejects: u64,
}

/// End-of-run summary, written as `<manifests>/run-<run_id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunManifest {
    pub run_id: String,
    pub counts_by_type: BTreeMap<String, u64>,
    pub output_paths: BTreeMap<String, String>,
    pub source_stats: BTreeMap<String, SourceStats>,
    pub metrics_snapshot: BTreeMap<String, i64>,
    pub exit_code: i32,
}

/// Lowercase, trim, collapse internal whitespace.
fn normalise_text(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Truncate an ISO-8601 timestamp to its calendar day in the record's own
/// zone (`YYYY-MM-DD`). Falls back to the Unix epoch day when nothing can
/// be parsed.
fn date_bucket(candidate: Option<&str>) -> String {
    let parsed = candidate.and_then(|s| DateTime::parse_from_rfc3339(s).ok());
    match parsed {
        Some(dt) => dt.date_naive().to_string(),
        None => DateTime::<Utc>::from_timestamp(0, 0)
            .unwrap()
            .date_naive()
            .to_string(),
    }
}

fn sha1_hex(input: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(input.as_bytes());
    hex::encode(hasher.finalize())
}

/// The canonical dedup key: `sha1(title | date_bucket | venue_or_address | city | source_id)`.
pub fn entity_key(entity: &Entity) -> String {
    entity_key_with_start(entity, entity.common().start.as_deref())
}

fn entity_key_with_start(entity: &Entity, start_override: Option<&str>) -> String {
    let common = entity.common();
    let venue_or_address = common
        .venue_name
        .as_deref()
        .or(common.address.as_deref())
        .unwrap_or("");
    let bucket_source = start_override
        .filter(|s| !s.is_empty())
        .or(common.end.as_deref().filter(|s| !s.is_empty()));
    let parts = [
        normalise_text(common.title.as_deref().unwrap_or("")),
        date_bucket(bucket_source),
        normalise_text(venue_or_address),
        normalise_text(common.city.as_deref().unwrap_or("")),
        common.source_id.clone(),
    ];
    sha1_hex(&parts.join("|"))
}

/// Canonical key shifted by ±1 day on the entity's own `start`, used as a
/// near-duplicate tolerance probe against the seen-index at the canonical
/// point (the shift is applied to the candidate, never to the index).
pub fn nearby_keys(entity: &Entity) -> Vec<String> {
    let start = match entity.common().start.as_deref() {
        Some(s) if !s.is_empty() => s,
        _ => return Vec::new(),
    };
    let Ok(parsed) = DateTime::parse_from_rfc3339(start) else {
        return Vec::new();
    };
    [-1i64, 1]
        .into_iter()
        .map(|delta| {
            let shifted = parsed + Duration::days(delta);
            entity_key_with_start(entity, Some(&shifted.to_rfc3339()))
        })
        .collect()
}

/// `sha1(sorted(urls).join("|"))`, used to validate checkpoint resumption.
pub fn discovered_urls_hash(urls: &[String]) -> String {
    let mut sorted: Vec<&str> = urls.iter().map(String::as_str).collect();
    sorted.sort_unstable();
    sha1_hex(&sorted.join("|"))
}
