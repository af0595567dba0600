//! Reads the sources CSV once per run: coerces loosely-typed columns,
//! resolves rule-file paths relative to the CSV's own directory, and offers
//! both a strict loader (raises on any invalid enabled row) and a lenient
//! validator (reports per-row status without raising).

use std::path::{Path, PathBuf};

use crawl_core::{CrawlFreq, EntityType, Source};

use crate::error::{OrchestrateError, Result};

const TRUTHY: &[&str] = &["1", "true", "yes", "y"];

fn coerce_bool(value: Option<&str>, default: bool) -> bool {
    match value.map(str::trim) {
        None | Some("") => default,
        Some(v) => TRUTHY.contains(&v.to_ascii_lowercase().as_str()),
    }
}

fn coerce_float(value: Option<&str>, default: f64) -> std::result::Result<f64, String> {
    match value.map(str::trim) {
        None | Some("") => Ok(default),
        Some(v) => v.parse().map_err(|_| format!("invalid float: {v}")),
    }
}

fn coerce_int(value: Option<&str>, default: u32) -> std::result::Result<u32, String> {
    match value.map(str::trim) {
        None | Some("") => Ok(default),
        Some(v) => v.parse().map_err(|_| format!("invalid int: {v}")),
    }
}

/// A row prepared from the CSV, before "does this row pass validation" is
/// decided. Carries the coerced and resolved fields a `Source` needs.
fn prepare_row(row: &csv::StringRecord, headers: &csv::StringRecord, base_dir: &Path) -> std::result::Result<Source, String> {
    let get = |name: &str| -> Option<&str> {
        headers.iter().position(|h| h == name).and_then(|idx| row.get(idx)).map(str::trim)
    };

    let source_id = get("source_id").filter(|s| !s.is_empty()).ok_or("missing source_id")?.to_string();
    let base_url = get("base_url").filter(|s| !s.is_empty()).ok_or("missing base_url")?.to_string();
    let entity_type: EntityType = get("type")
        .ok_or("missing type")?
        .parse()
        .map_err(|e: crawl_core::CoreError| e.to_string())?;
    let country = get("country").unwrap_or_default().to_string();
    let robots_ok = coerce_bool(get("robots_ok"), true);
    let enabled = coerce_bool(get("enabled"), true);
    let sitemap_url = get("sitemap_url").filter(|s| !s.is_empty()).map(str::to_string);
    let css_rules_raw = get("css_rules_path").unwrap_or_default();
    let css_rules_path = base_dir.join(css_rules_raw);
    let crawl_freq: CrawlFreq = get("crawl_freq")
        .ok_or("missing crawl_freq")?
        .parse()
        .map_err(|e: crawl_core::CoreError| e.to_string())?;
    let max_qps = coerce_float(get("max_qps"), 1.0)?;
    let concurrency = coerce_int(get("concurrency"), 1)?;

    Ok(Source {
        source_id,
        base_url,
        entity_type,
        country,
        robots_ok,
        sitemap_url,
        css_rules_path,
        crawl_freq,
        max_qps,
        concurrency,
        enabled,
    })
}

fn ensure_rules_exist(source: &Source) -> std::result::Result<(), String> {
    if !source.css_rules_path.exists() {
        return Err(format!("rule file not found: {}", source.css_rules_path.display()));
    }
    Ok(())
}

fn read_rows(csv_path: &Path) -> Result<(csv::StringRecord, Vec<csv::StringRecord>)> {
    let mut reader = csv::ReaderBuilder::new().has_headers(true).from_path(csv_path)?;
    let headers = reader.headers()?.clone();
    let rows = reader.records().collect::<std::result::Result<Vec<_>, _>>()?;
    Ok((headers, rows))
}

/// Strict load: every *enabled* row must parse and, if enabled, its rule
/// file must exist. Disabled rows are parsed but silently skipped. Any
/// failure aborts the whole load.
pub fn load_sources(csv_path: &Path) -> Result<Vec<Source>> {
    let base_dir = csv_path.parent().unwrap_or_else(|| Path::new("."));
    let (headers, rows) = read_rows(csv_path)?;

    let mut sources = Vec::new();
    for row in &rows {
        if row.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let source_id_for_error = headers
            .iter()
            .position(|h| h == "source_id")
            .and_then(|idx| row.get(idx))
            .unwrap_or("<unknown>")
            .to_string();

        let source = prepare_row(row, &headers, base_dir).map_err(|e| {
            OrchestrateError::Config(format!("invalid source row {source_id_for_error}: {e}"))
        })?;

        if !source.enabled {
            continue;
        }
        ensure_rules_exist(&source).map_err(|e| {
            OrchestrateError::Config(format!("invalid source row {}: {e}", source.source_id))
        })?;
        sources.push(source);
    }
    Ok(sources)
}

/// One validation outcome: `detail` is `"ok"`, `"disabled"`, or a
/// human-readable error.
pub struct SourceValidation {
    pub source_id: String,
    pub ok: bool,
    pub detail: String,
}

/// Lenient validate: every row is reported, nothing raises.
pub fn validate_sources(csv_path: &Path) -> Result<Vec<SourceValidation>> {
    let base_dir = csv_path.parent().unwrap_or_else(|| Path::new("."));
    let (headers, rows) = read_rows(csv_path)?;

    let mut results = Vec::new();
    for row in &rows {
        if row.iter().all(|field| field.trim().is_empty()) {
            continue;
        }
        let source_id = headers
            .iter()
            .position(|h| h == "source_id")
            .and_then(|idx| row.get(idx))
            .unwrap_or("<unknown>")
            .to_string();

        match prepare_row(row, &headers, base_dir) {
            Ok(source) => {
                if !source.enabled {
                    results.push(SourceValidation {
                        source_id,
                        ok: true,
                        detail: "disabled".to_string(),
                    });
                    continue;
                }
                match ensure_rules_exist(&source) {
                    Ok(()) => results.push(SourceValidation {
                        source_id,
                        ok: true,
                        detail: "ok".to_string(),
                    }),
                    Err(e) => results.push(SourceValidation {
                        source_id,
                        ok: false,
                        detail: e,
                    }),
                }
            }
            Err(e) => results.push(SourceValidation {
                source_id,
                ok: false,
                detail: e,
            }),
        }
    }
    Ok(results)
}
