//! Phase one of extraction: scan a page for schema.org-style linked-data
//! blocks, flatten nested graphs/lists, and map the declared `@type` to one
//! of this crawler's entity families.

use crawl_core::{Entity, EntityCommon, EntityType, TimeSlot};
use scraper::{Html, Selector};
use serde_json::Value;

fn normalised_type(value: &Value) -> Option<EntityType> {
    let type_field = value.get("@type")?;
    let candidates: Vec<String> = match type_field {
        Value::String(s) => vec![s.to_ascii_lowercase()],
        Value::Array(items) => items
            .iter()
            .filter_map(|v| v.as_str())
            .map(|s| s.to_ascii_lowercase())
            .collect(),
        _ => return None,
    };
    for label in candidates {
        match label.as_str() {
            "event" | "music event" | "musicevent" | "eventseries" => return Some(EntityType::Events),
            "festival" => return Some(EntityType::Festivals),
            "sportsevent" | "sports event" => return Some(EntityType::Sports),
            _ => continue,
        }
    }
    None
}

/// Recursively flatten `@graph` / `@list` wrappers into a flat candidate list.
fn flatten_graph(value: &Value, out: &mut Vec<Value>) {
    match value {
        Value::Object(map) => {
            if let Some(graph) = map.get("@graph") {
                flatten_graph(graph, out);
                return;
            }
            if let Some(list) = map.get("@list") {
                flatten_graph(list, out);
                return;
            }
            out.push(value.clone());
        }
        Value::Array(items) => {
            for item in items {
                flatten_graph(item, out);
            }
        }
        _ => {}
    }
}

fn first_str(value: &Value, keys: &[&str]) -> Option<String> {
    for key in keys {
        if let Some(found) = value.get(*key) {
            match found {
                Value::String(s) if !s.trim().is_empty() => return Some(s.trim().to_string()),
                Value::Object(_) => {
                    if let Some(name) = found.get("name").and_then(|n| n.as_str()) {
                        return Some(name.trim().to_string());
                    }
                }
                _ => {}
            }
        }
    }
    None
}

fn address_fields(value: &Value) -> (Option<String>, Option<String>, Option<String>, Option<String>) {
    let location = value.get("location");
    let venue_name = location
        .and_then(|l| l.get("name"))
        .and_then(|n| n.as_str())
        .map(|s| s.to_string());
    let address_node = location.and_then(|l| l.get("address"));
    let (street, city, country) = match address_node {
        Some(Value::Object(_)) => (
            address_node
                .and_then(|a| a.get("streetAddress"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            address_node
                .and_then(|a| a.get("addressLocality"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            address_node
                .and_then(|a| a.get("addressCountry"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
        ),
        Some(Value::String(s)) => (Some(s.clone()), None, None),
        _ => (None, None, None),
    };
    (venue_name, street, city, country)
}

fn offers_price(value: &Value) -> Option<String> {
    let offers = value.get("offers")?;
    let first = match offers {
        Value::Array(items) => items.first()?,
        other => other,
    };
    first
        .get("price")
        .and_then(|p| p.as_str().map(|s| s.to_string()).or_else(|| p.as_f64().map(|f| f.to_string())))
}

fn images(value: &Value) -> Vec<String> {
    match value.get("image") {
        Some(Value::String(s)) => vec![s.clone()],
        Some(Value::Array(items)) => items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
        Some(Value::Object(map)) => map.get("url").and_then(|v| v.as_str()).map(|s| vec![s.to_string()]).unwrap_or_default(),
        _ => Vec::new(),
    }
}

fn time_slots(value: &Value) -> Vec<TimeSlot> {
    let mut slots = Vec::new();
    let top_start = value.get("startDate").and_then(|v| v.as_str()).map(str::to_string);
    let top_end = value.get("endDate").and_then(|v| v.as_str()).map(str::to_string);
    if top_start.is_some() || top_end.is_some() {
        slots.push(TimeSlot {
            start: top_start,
            end: top_end,
        });
    }
    if let Some(Value::Array(sub_events)) = value.get("subEvent") {
        for sub in sub_events {
            let start = sub.get("startDate").and_then(|v| v.as_str()).map(str::to_string);
            let end = sub.get("endDate").and_then(|v| v.as_str()).map(str::to_string);
            if start.is_some() || end.is_some() {
                slots.push(TimeSlot { start, end });
            }
        }
    }
    slots
}

fn base_payload(value: &Value, source_id: &str, entity_type: EntityType) -> Entity {
    let (venue_name, address, city, country) = address_fields(value);
    let common = EntityCommon {
        source_id: source_id.to_string(),
        title: first_str(value, &["name", "headline"]),
        venue_name,
        address,
        city,
        country,
        time_slots: time_slots(value),
        timezone: None,
        start: value.get("startDate").and_then(|v| v.as_str()).map(str::to_string),
        end: value.get("endDate").and_then(|v| v.as_str()).map(str::to_string),
        price_text: offers_price(value),
        price_value: None,
        organizer: first_str(value, &["organizer"]),
        url: value.get("url").and_then(|v| v.as_str()).map(str::to_string),
        emails: Vec::new(),
        phones: Vec::new(),
        images: images(value),
        taxonomy: Vec::new(),
    };

    match entity_type {
        EntityType::Events => Entity::Events(common),
        EntityType::Festivals => Entity::Festivals(common),
        EntityType::Sports => {
            let sport_type = value
                .get("sport")
                .and_then(|v| v.as_str())
                .map(|s| s.to_ascii_lowercase());
            Entity::Sports { common, sport_type }
        }
    }
}

/// Scan `html` for `<script type="application/ld+json">` blocks whose
/// declared type maps to `requested`, returning one candidate entity per
/// matching node.
pub fn extract_structured(html: &str, source_id: &str, requested: EntityType) -> Vec<Entity> {
    let document = Html::parse_document(html);
    let selector = Selector::parse(r#"script[type="application/ld+json"]"#).expect("valid selector");

    let mut candidates = Vec::new();
    for script in document.select(&selector) {
        let text = script.text().collect::<String>();
        let Ok(parsed) = serde_json::from_str::<Value>(&text) else {
            continue;
        };
        let mut flattened = Vec::new();
        flatten_graph(&parsed, &mut flattened);

        for node in flattened {
            let Some(node_type) = normalised_type(&node) else {
                continue;
            };
            if node_type != requested {
                continue;
            }
            candidates.push(base_payload(&node, source_id, node_type));
        }
    }
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;

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
              "location": {"name": "The Venue", "address": {"streetAddress": "1 Main St", "addressLocality": "Berlin", "addressCountry": "DE"}},
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

    #[test]
    fn extracts_two_events_from_graph() {
        let entities = extract_structured(TWO_EVENTS_HTML, "src-1", EntityType::Events);
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].common().title.as_deref(), Some("Jazz Night"));
        assert_eq!(entities[1].common().title.as_deref(), Some("Art Expo"));
        assert_eq!(entities[0].common().price_text.as_deref(), Some("12.50"));
    }

    #[test]
    fn mismatched_type_is_discarded() {
        let entities = extract_structured(TWO_EVENTS_HTML, "src-1", EntityType::Sports);
        assert!(entities.is_empty());
    }

    #[test]
    fn sub_events_contribute_time_slots() {
        let html = r#"
            <script type="application/ld+json">
            {"@type":"Festival","name":"Summer Fest","startDate":"2026-06-01T09:00:00Z","endDate":"2026-06-03T22:00:00Z",
             "subEvent":[{"startDate":"2026-06-01T09:00:00Z","endDate":"2026-06-01T12:00:00Z"}]}
            </script>
        "#;
        let entities = extract_structured(html, "src-1", EntityType::Festivals);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].common().time_slots.len(), 2);
    }
}
