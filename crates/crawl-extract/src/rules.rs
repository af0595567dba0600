//! Phase two of extraction: declarative selector rules, used as a fallback
//! whenever structured data is absent or incomplete. Also the pagination
//! follow-up discovery that the orchestrator uses between pages.

use crawl_core::{Entity, EntityCommon, EntityType, RuleSpec, TimeSlot};
use scraper::{ElementRef, Html, Selector};
use url::Url;

/// A parsed field expression: `selector[@attr][|text][[]]`.
struct FieldExpr {
    selector: String,
    attr: Option<String>,
    multi: bool,
    text_fallback: bool,
}

fn parse_expression(expr: &str) -> FieldExpr {
    let mut rest = expr.trim();
    let mut multi = false;
    if let Some(stripped) = rest.strip_suffix("[]") {
        rest = stripped.trim();
        multi = true;
    }
    let mut text_fallback = false;
    if let Some(stripped) = rest.strip_suffix("|text") {
        rest = stripped.trim();
        text_fallback = true;
    }
    let mut attr = None;
    if let Some(idx) = rest.find("::attr(") {
        if let Some(end) = rest[idx..].find(')') {
            attr = Some(rest[idx + 7..idx + end].to_string());
            rest = rest[..idx].trim();
        }
    } else if let Some(idx) = rest.rfind('@') {
        attr = Some(rest[idx + 1..].to_string());
        rest = rest[..idx].trim();
    }
    FieldExpr {
        selector: rest.to_string(),
        attr,
        multi,
        text_fallback,
    }
}

fn element_text(el: &ElementRef) -> String {
    el.text().collect::<Vec<_>>().join(" ").trim().to_string()
}

fn value_from_element(el: &ElementRef, expr: &FieldExpr) -> Option<String> {
    match &expr.attr {
        Some(attr) => match el.value().attr(attr) {
            Some(value) if !value.is_empty() => Some(value.to_string()),
            _ if expr.text_fallback => {
                let text = element_text(el);
                (!text.is_empty()).then_some(text)
            }
            _ => None,
        },
        None => {
            let text = element_text(el);
            (!text.is_empty()).then_some(text)
        }
    }
}

fn values_for(root: &ElementRef, expr: &FieldExpr) -> Vec<String> {
    let Ok(selector) = Selector::parse(&expr.selector) else {
        return Vec::new();
    };
    let matches: Vec<String> = root
        .select(&selector)
        .filter_map(|el| value_from_element(&el, expr))
        .collect();
    if expr.multi {
        matches
    } else {
        matches.into_iter().take(1).collect()
    }
}

fn split_time_slot(raw: &str) -> TimeSlot {
    if let Some((start, end)) = raw.split_once('|') {
        return TimeSlot {
            start: Some(start.trim().to_string()),
            end: Some(end.trim().to_string()),
        };
    }
    if let Some((start, end)) = raw.split_once('-') {
        return TimeSlot {
            start: Some(start.trim().to_string()),
            end: Some(end.trim().to_string()),
        };
    }
    TimeSlot {
        start: Some(raw.trim().to_string()),
        end: None,
    }
}

fn single(values: &[String]) -> Option<String> {
    values.first().cloned()
}

/// Apply `rule`'s field expressions to each `list_item` root element found
/// in `html`, producing one candidate entity per root.
pub fn extract_with_rules(html: &str, source_id: &str, entity_type: EntityType, rule: &RuleSpec) -> Vec<Entity> {
    let document = Html::parse_document(html);
    let Ok(root_selector) = Selector::parse(&rule.list_item) else {
        return Vec::new();
    };

    let mut out = Vec::new();
    for root in document.select(&root_selector) {
        let mut field_values: std::collections::HashMap<&str, Vec<String>> = std::collections::HashMap::new();
        for (name, raw_expr) in &rule.fields {
            let expr = parse_expression(raw_expr);
            field_values.insert(name.as_str(), values_for(root, &expr));
        }

        let time_slots = field_values
            .get("time_slots")
            .map(|raw| raw.iter().map(|s| split_time_slot(s)).collect())
            .unwrap_or_default();

        let mut common = EntityCommon {
            source_id: source_id.to_string(),
            title: field_values.get("title").and_then(|v| single(v)),
            venue_name: field_values.get("venue_name").and_then(|v| single(v)),
            address: field_values.get("address").and_then(|v| single(v)),
            city: field_values.get("city").and_then(|v| single(v)),
            country: field_values.get("country").and_then(|v| single(v)),
            time_slots,
            timezone: field_values.get("timezone").and_then(|v| single(v)),
            start: field_values.get("start").and_then(|v| single(v)),
            end: field_values.get("end").and_then(|v| single(v)),
            price_text: field_values.get("price_text").and_then(|v| single(v)),
            price_value: None,
            organizer: field_values.get("organizer").and_then(|v| single(v)),
            url: field_values.get("url").and_then(|v| single(v)),
            emails: Vec::new(),
            phones: Vec::new(),
            images: field_values.get("images").cloned().unwrap_or_default(),
            taxonomy: Vec::new(),
        };

        if common.timezone.is_none() {
            common.timezone = rule.timezone.clone();
        }

        let entity = match entity_type {
            EntityType::Events => Entity::Events(common),
            EntityType::Festivals => Entity::Festivals(common),
            EntityType::Sports => {
                let sport_type = field_values.get("sport_type").and_then(|v| single(v));
                Entity::Sports { common, sport_type }
            }
        };
        out.push(entity);
    }
    out
}

/// Pagination follow-ups: a single `pagination_next` link, plus, when
/// `pagination_month_grid` is set, month-grid links — truncated to
/// `pagination_max_pages - 1` total.
pub fn discover_next_urls(html: &str, base_url: &str, rule: &RuleSpec) -> Vec<String> {
    if rule.pagination_max_pages <= 1 {
        return Vec::new();
    }
    let document = Html::parse_document(html);
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };

    let mut urls = Vec::new();

    if let Some(next_selector) = &rule.pagination_next {
        if let Ok(selector) = Selector::parse(next_selector) {
            if let Some(href) = document
                .select(&selector)
                .next()
                .and_then(|el| el.value().attr("href"))
            {
                if let Ok(resolved) = base.join(href) {
                    urls.push(resolved.to_string());
                }
            }
        }
    }

    if rule.pagination_month_grid {
        if let Ok(selector) = Selector::parse("a[rel='next'], a.month-next") {
            for el in document.select(&selector) {
                if let Some(href) = el.value().attr("href") {
                    if let Ok(resolved) = base.join(href) {
                        urls.push(resolved.to_string());
                    }
                }
            }
        }
    }

    urls.truncate((rule.pagination_max_pages - 1) as usize);
    urls
}
