//! Cross-cutting scenario tests (scenarios 1, 2 (partial), 3, 4, 6) exercised
//! without live network access — a `wiremock` server stands in for a real
//! listings site.

use std::io::Write;
use std::path::PathBuf;

use crawl_orchestrate::{plan, run_crawl, RunConfig};
use rusqlite::Connection;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn write_file(dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = dir.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    write!(file, "{body}").unwrap();
    path
}

fn write_sources_csv(dir: &TempDir, base_url: &str) -> PathBuf {
    write_file(
        dir,
        "sources.csv",
        &format!(
            "source_id,base_url,type,country,robots_ok,sitemap_url,css_rules_path,crawl_freq,max_qps,concurrency,enabled\nsrc-1,{base_url}/listing,events,DE,true,,rules.yaml,daily,10,1,true\n"
        ),
    )
}

fn write_rule_file(dir: &TempDir) {
    write_file(dir, "rules.yaml", "fields: {}\n");
}

fn write_event_schema(dir: &TempDir, require_venue: bool) {
    let schemas_dir = dir.path().join("schemas");
    std::fs::create_dir_all(&schemas_dir).unwrap();
    let mut required = vec!["title", "source_id"];
    if require_venue {
        required.push("venue_name");
    }
    let schema = serde_json::json!({
        "$schema": "https://json-schema.org/draft/2020-12/schema",
        "type": "object",
        "properties": {
            "type": {"type": "string"},
            "source_id": {"type": "string"},
            "title": {"type": "string"},
            "venue_name": {"type": "string"},
            "address": {"type": "string"},
            "city": {"type": "string"},
            "country": {"type": "string"},
            "start": {"type": "string"},
            "end": {"type": "string"},
            "timezone": {"type": "string"},
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
        "required": required,
    });
    std::fs::write(
        schemas_dir.join("event.schema.json"),
        serde_json::to_vec_pretty(&schema).unwrap(),
    )
    .unwrap();
}

const TWO_EVENTS_HTML: &str = r#"
    <html><head>
    <script type="application/ld+json">
    {
      "@context": "https://schema.org",
      "@graph": [
        {
          "@type": "Event",
          "name": "Jazz Night",
          "startDate": "2026-03-05T20:00:00Z",
          "location": {"name": "The Venue", "address": {"addressLocality": "Berlin", "addressCountry": "DE"}},
          "offers": {"price": "12.50"},
          "url": "https://example.com/jazz"
        },
        {
          "@type": "Event",
          "name": "Art Expo",
          "startDate": "2026-03-06T10:00:00Z",
          "location": {"name": "Gallery", "address": {"addressLocality": "Berlin", "addressCountry": "DE"}},
          "url": "https://example.com/art"
        }
      ]
    }
    </script>
    </head><body></body></html>
"#;

const VENUELESS_EVENT_HTML: &str = r#"
    <html><head>
    <script type="application/ld+json">
    {"@type":"Event","name":"Mystery Night","startDate":"2026-03-05T20:00:00Z"}
    </script>
    </head><body></body></html>
"#;

// Scenario 1: crawl a two-event structured-data page against
// --type events --limit 1.
#[tokio::test]
async fn scenario_1_two_event_page_is_fully_committed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listing"))
        .respond_with(ResponseTemplate::new(200).set_body_string(TWO_EVENTS_HTML))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    write_rule_file(&dir);
    write_event_schema(&dir, false);
    let csv = write_sources_csv(&dir, &server.uri());

    let mut config = RunConfig::new(csv, dir.path().join("schemas"), dir.path().join("data"));
    config.limit = 1;

    let manifest = run_crawl(config).await.expect("crawl succeeds");

    assert_eq!(manifest.counts_by_type.get("events"), Some(&2));
    let stats = manifest.source_stats.get("src-1").expect("source stats present");
    assert_eq!(stats.rows_new, 2);

    let gold_path = PathBuf::from(manifest.output_paths.get("events.gold").unwrap());
    assert!(gold_path.exists());

    let sqlite_path = manifest.output_paths.get("events.sqlite").unwrap();
    let conn = Connection::open(sqlite_path).unwrap();
    let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0)).unwrap();
    assert_eq!(count, 2);
}

// Scenario 2 (partial): re-crawling a source whose page now answers 304
// bumps pages_fetched/http_3xx/unchanged_skips instead of dropping the
// fetch from the counters entirely.
#[tokio::test]
async fn scenario_2_not_modified_response_counts_as_http_3xx() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listing"))
        .respond_with(ResponseTemplate::new(200).set_body_string(TWO_EVENTS_HTML))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/listing"))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    write_rule_file(&dir);
    write_event_schema(&dir, false);
    let csv = write_sources_csv(&dir, &server.uri());
    let data_root = dir.path().join("data");

    let mut first = RunConfig::new(csv.clone(), dir.path().join("schemas"), data_root.clone());
    first.limit = 1;
    run_crawl(first).await.expect("first crawl succeeds");

    let mut second = RunConfig::new(csv, dir.path().join("schemas"), data_root);
    second.limit = 1;
    let manifest = run_crawl(second).await.expect("second crawl succeeds");

    assert_eq!(*manifest.metrics_snapshot.get("http_3xx").unwrap(), 1);
    assert_eq!(*manifest.metrics_snapshot.get("pages_fetched").unwrap(), 1);
    assert_eq!(*manifest.metrics_snapshot.get("unchanged_skips").unwrap(), 1);
}

// Scenario 3: a mixed registry with one enabled row pointing at a missing
// rule file fails strict loading, and validate-sources reports that row as
// a failure without raising.
#[tokio::test]
async fn scenario_3_mixed_registry_strict_raises_validate_reports_fail() {
    let dir = TempDir::new().unwrap();
    write_rule_file(&dir);
    let csv_path = write_file(
        &dir,
        "sources.csv",
        "source_id,base_url,type,country,robots_ok,sitemap_url,css_rules_path,crawl_freq,max_qps,concurrency,enabled\n\
         src-ok,https://example.com,events,DE,true,,rules.yaml,daily,1,1,true\n\
         src-broken,https://example.com,events,DE,true,,missing.yaml,daily,1,1,true\n\
         src-off,https://example.com,events,DE,true,,rules.yaml,daily,1,1,false\n",
    );

    assert!(crawl_orchestrate::source_registry::load_sources(&csv_path).is_err());

    let results = crawl_orchestrate::source_registry::validate_sources(&csv_path).unwrap();
    assert_eq!(results.len(), 3);
    let broken = results.iter().find(|r| r.source_id == "src-broken").unwrap();
    assert!(!broken.ok);
}

// Scenario 4: dry-run emits the planned jobs and never touches bronze.
#[tokio::test]
async fn scenario_4_dry_run_plans_without_touching_bronze() {
    let dir = TempDir::new().unwrap();
    write_rule_file(&dir);
    let csv = write_sources_csv(&dir, "https://example.com");
    let data_root = dir.path().join("data");

    let config = RunConfig::new(csv, dir.path().join("schemas"), data_root.clone());
    let jobs = plan(&config).unwrap();

    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0].source_id, "src-1");
    assert!(!data_root.exists());
}

// Scenario 6: an entity missing a schema-required field is quarantined and
// never reaches any storage tier.
#[tokio::test]
async fn scenario_6_schema_rejecting_entity_is_quarantined_only() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/listing"))
        .respond_with(ResponseTemplate::new(200).set_body_string(VENUELESS_EVENT_HTML))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    write_rule_file(&dir);
    write_event_schema(&dir, true);
    let csv = write_sources_csv(&dir, &server.uri());

    let config = RunConfig::new(csv, dir.path().join("schemas"), dir.path().join("data"));
    let manifest = run_crawl(config).await.expect("crawl succeeds even with a rejected entity");

    assert!(manifest.counts_by_type.get("events").is_none());
    assert_eq!(*manifest.metrics_snapshot.get("validates_failed").unwrap(), 1);
    assert_eq!(*manifest.metrics_snapshot.get("quarantine_rows").unwrap(), 1);

    let quarantine_dir = dir.path().join("data").join("quarantine");
    let rejects: Vec<_> = std::fs::read_dir(&quarantine_dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .collect();
    assert_eq!(rejects.len(), 1);
    let contents = std::fs::read_to_string(rejects[0].path()).unwrap();
    assert!(contents.contains("venue_name"));
}
