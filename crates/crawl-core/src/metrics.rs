//! Named integer counters shared by the fetcher and the orchestrator.

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::Instant;

use chrono::Utc;
use serde::Serialize;

const DEFAULT_COUNTERS: &[&str] = &[
    "pages_fetched",
    "http_2xx",
    "http_3xx",
    "http_4xx",
    "http_5xx",
    "robots_disallow",
    "retries",
    "unchanged_skips",
    "parse_failures",
    "validates_failed",
    "entities_new",
    "entities_updated",
    "quarantine_rows",
    "duplicates",
    "run_duration_ms",
];

/// A pre-seeded, thread-safe map of monotonically-incrementing counters.
#[derive(Debug, Default)]
pub struct MetricsRegistry {
    counters: Mutex<BTreeMap<String, i64>>,
}

#[derive(Debug, Serialize)]
struct MetricsExport<'a> {
    run_id: &'a str,
    counters: BTreeMap<String, i64>,
    generated_at: String,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        let mut counters = BTreeMap::new();
        for name in DEFAULT_COUNTERS {
            counters.insert((*name).to_string(), 0);
        }
        Self {
            counters: Mutex::new(counters),
        }
    }

    pub fn incr(&self, name: &str, value: i64) {
        let mut counters = self.counters.lock().expect("metrics mutex poisoned");
        *counters.entry(name.to_string()).or_insert(0) += value;
    }

    pub fn get(&self, name: &str) -> i64 {
        let counters = self.counters.lock().expect("metrics mutex poisoned");
        *counters.get(name).unwrap_or(&0)
    }

    pub fn snapshot(&self) -> BTreeMap<String, i64> {
        self.counters.lock().expect("metrics mutex poisoned").clone()
    }

    pub fn export_json(&self, run_id: &str) -> anyhow::Result<String> {
        let export = MetricsExport {
            run_id,
            counters: self.snapshot(),
            generated_at: Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string(),
        };
        Ok(serde_json::to_string_pretty(&export)?)
    }
}

/// Scoped timer: adds elapsed milliseconds to `metric` when dropped.
pub struct DurationRecorder<'a> {
    registry: &'a MetricsRegistry,
    metric: &'static str,
    started: Instant,
}

impl<'a> DurationRecorder<'a> {
    pub fn start(registry: &'a MetricsRegistry, metric: &'static str) -> Self {
        Self {
            registry,
            metric,
            started: Instant::now(),
        }
    }
}

impl Drop for DurationRecorder<'_> {
    fn drop(&mut self) {
        let elapsed_ms = self.started.elapsed().as_millis() as i64;
        self.registry.incr(self.metric, elapsed_ms);
    }
}
