//! Per-entity field normalisation: datetimes, contacts, price, URLs, and
//! taxonomy. Applied in order to every candidate that survives extraction,
//! before schema pruning and validation.

use chrono::{DateTime, FixedOffset, NaiveDateTime, Utc};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use regex::Regex;

use crawl_core::{Entity, TimeSlot};

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[A-Z0-9._%+-]+@[A-Z0-9.-]+\.[A-Z]{2,}").unwrap());
static PHONE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[+\d][\d\-().\s]{4,}").unwrap());
static PRICE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)(?:[.,](\d{2}))?").unwrap());
static NON_PHONE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^+\d]").unwrap());

const TAXONOMY_MAP: &[(&str, &str)] = &[
    ("jazz", "music"),
    ("art", "art"),
    ("football", "football"),
    ("running", "running"),
];

/// Run every normalisation pass over `entity` in the order the spec pins:
/// datetimes, contacts, price, URLs, taxonomy.
pub fn normalise(entity: &mut Entity) {
    normalise_datetimes(entity);
    normalise_contacts(entity);
    price_to_number(entity);
    normalise_urls(entity);
    map_taxonomy(entity);
}

fn resolve_named_zone(name: &str) -> Option<Tz> {
    name.parse::<Tz>().ok()
}

fn resolve_synthetic_offset(name: &str) -> Option<FixedOffset> {
    // `UTC+HH:MM` / `UTC-HH:MM`.
    if !name.starts_with("UTC") || name.len() < 6 {
        return None;
    }
    let sign = match name.as_bytes()[3] {
        b'+' => 1,
        b'-' => -1,
        _ => return None,
    };
    let hours: i32 = name.get(4..6)?.parse().ok()?;
    let minutes: i32 = if name.len() >= 9 { name.get(7..9)?.parse().ok()? } else { 0 };
    let total_secs = sign * (hours * 3600 + minutes * 60);
    FixedOffset::east_opt(total_secs)
}

fn parse_any(value: &str) -> Option<DateTime<FixedOffset>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt);
    }
    const NAIVE_FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d",
    ];
    for fmt in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, fmt) {
            return Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc).fixed_offset());
        }
        if *fmt == "%Y-%m-%d" {
            if let Ok(date) = chrono::NaiveDate::parse_from_str(value, fmt) {
                let naive = date.and_hms_opt(0, 0, 0).unwrap();
                return Some(DateTime::<Utc>::from_naive_utc_and_offset(naive, Utc).fixed_offset());
            }
        }
    }
    None
}

/// `(rendered_iso8601, backfilled_timezone_name)`. The timezone is only
/// returned when the entity did not already carry one and this conversion
/// discovered a zone worth recording.
fn convert_datetime(value: &str, timezone_hint: Option<&str>) -> Option<(String, Option<String>)> {
    let parsed = parse_any(value)?;

    if let Some(hint) = timezone_hint {
        if let Some(tz) = resolve_named_zone(hint) {
            let converted = parsed.with_timezone(&tz);
            return Some((converted.to_rfc3339(), None));
        }
        if let Some(offset) = resolve_synthetic_offset(hint) {
            let converted = parsed.with_timezone(&offset);
            return Some((converted.to_rfc3339(), None));
        }
        // Unknown hint: leave the value in its own offset.
        return Some((parsed.to_rfc3339(), None));
    }

    // No hint: the value already carries an explicit offset (rfc3339) or was
    // defaulted to UTC by `parse_any`. Backfill a synthesised zone name.
    let total_minutes = parsed.offset().local_minus_utc() / 60;
    let backfilled = if total_minutes == 0 {
        "UTC".to_string()
    } else {
        let sign = if total_minutes >= 0 { '+' } else { '-' };
        let (hours, minutes) = (total_minutes.abs() / 60, total_minutes.abs() % 60);
        format!("UTC{sign}{hours:02}:{minutes:02}")
    };
    Some((parsed.to_rfc3339(), Some(backfilled)))
}

/// Parse `start`, `end`, and every `time_slots[*]` entry as ISO-8601,
/// attaching or backfilling `timezone` per the entity-level rules. Slots
/// that cannot be converted are dropped rather than failing the entity.
pub fn normalise_datetimes(entity: &mut Entity) {
    let mut timezone_hint = entity.common().timezone.clone();

    if let Some(start) = entity.common().start.clone() {
        if let Some((iso, backfilled)) = convert_datetime(&start, timezone_hint.as_deref()) {
            entity.common_mut().start = Some(iso);
            if timezone_hint.is_none() {
                if let Some(tz) = backfilled {
                    entity.common_mut().timezone = Some(tz.clone());
                    timezone_hint = Some(tz);
                }
            }
        }
    }

    if let Some(end) = entity.common().end.clone() {
        if let Some((iso, _)) = convert_datetime(&end, timezone_hint.as_deref()) {
            entity.common_mut().end = Some(iso);
        }
    }

    let slots = std::mem::take(&mut entity.common_mut().time_slots);
    let mut normalised = Vec::with_capacity(slots.len());
    for slot in slots {
        let (Some(start), Some(end)) = (slot.start.as_deref(), slot.end.as_deref()) else {
            continue;
        };
        let (Some((start_iso, _)), Some((end_iso, _))) = (
            convert_datetime(start, timezone_hint.as_deref()),
            convert_datetime(end, timezone_hint.as_deref()),
        ) else {
            continue;
        };
        normalised.push(TimeSlot {
            start: Some(start_iso),
            end: Some(end_iso),
        });
    }
    entity.common_mut().time_slots = normalised;
}

/// Deduplicated, lowercased emails and `+`-digits-only phone numbers,
/// scraped from the concatenation of `price_text, organizer, address, title`.
pub fn normalise_contacts(entity: &mut Entity) {
    let common = entity.common();
    let pool = [
        common.price_text.as_deref(),
        common.organizer.as_deref(),
        common.address.as_deref(),
        common.title.as_deref(),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>()
    .join(" ");

    let mut emails: Vec<String> = EMAIL_RE
        .find_iter(&pool)
        .map(|m| m.as_str().to_ascii_lowercase())
        .collect();
    emails.sort();
    emails.dedup();

    let mut phones: Vec<String> = PHONE_RE
        .find_iter(&pool)
        .map(|m| NON_PHONE_CHARS.replace_all(m.as_str(), "").to_string())
        .filter(|p| !p.is_empty())
        .collect();
    phones.sort();
    phones.dedup();

    let common = entity.common_mut();
    common.emails = emails;
    common.phones = phones;
}

/// If `price_text` matches `(\d+)([.,]\d{2})?`, derive `price_value`.
pub fn price_to_number(entity: &mut Entity) {
    let common = entity.common_mut();
    let Some(price_text) = common.price_text.as_deref() else {
        return;
    };
    let Some(caps) = PRICE_RE.captures(price_text) else {
        return;
    };
    let Ok(major) = caps[1].parse::<f64>() else {
        return;
    };
    let minor = caps
        .get(2)
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .unwrap_or(0.0);
    common.price_value = Some(major + minor / 100.0);
}

/// Trim `url`; dedup+trim `images[]` preserving first-seen order.
pub fn normalise_urls(entity: &mut Entity) {
    let common = entity.common_mut();
    if let Some(url) = &common.url {
        common.url = Some(url.trim().to_string());
    }
    let mut seen = std::collections::HashSet::new();
    let mut deduped = Vec::with_capacity(common.images.len());
    for image in &common.images {
        let trimmed = image.trim().to_string();
        if trimmed.is_empty() {
            continue;
        }
        if seen.insert(trimmed.clone()) {
            deduped.push(trimmed);
        }
    }
    common.images = deduped;
}

/// Case-insensitive title substring mappings, plus the sport's own
/// `sport_type` lowercased for sports entities.
pub fn map_taxonomy(entity: &mut Entity) {
    let title_lower = entity
        .common()
        .title
        .as_deref()
        .unwrap_or("")
        .to_ascii_lowercase();
    let sport_type = entity.sport_type().map(|s| s.to_ascii_lowercase());

    let common = entity.common_mut();
    for (needle, category) in TAXONOMY_MAP {
        if title_lower.contains(needle) && !common.taxonomy.iter().any(|t| t == category) {
            common.taxonomy.push((*category).to_string());
        }
    }
    if let Some(sport_type) = sport_type {
        if !common.taxonomy.contains(&sport_type) {
            common.taxonomy.push(sport_type);
        }
    }
}
