//! Two-phase HTML extraction (structured data, then rule fallback), field
//! normalisation, pagination discovery, and schema validation/pruning.

mod normalize;
mod rules;
mod schema;
mod structured;

pub use normalize::normalise;
pub use rules::discover_next_urls;
pub use schema::{SchemaError, SchemaRegistry, ValidationResult};
pub use structured::extract_structured;

use crawl_core::{Entity, EntityType, RuleSpec};

pub const CRATE_NAME: &str = "crawl-extract";

/// Run both extraction phases over `html` and return every candidate,
/// structured-data matches first, rule-fallback matches after. Candidates
/// whose resolved `type` doesn't match `entity_type` never reach this point
/// (both phases only emit the requested type).
pub fn extract_entities(html: &str, source_id: &str, entity_type: EntityType, rule: &RuleSpec) -> Vec<Entity> {
    let mut candidates = structured::extract_structured(html, source_id, entity_type);
    candidates.extend(rules::extract_with_rules(html, source_id, entity_type, rule));
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn structured_candidates_precede_rule_candidates() {
        let html = r#"
            <script type="application/ld+json">
            {"@type":"Event","name":"Jazz Night","startDate":"2026-03-05T20:00:00Z"}
            </script>
            <div class="event"><h2 class="title">Art Expo</h2></div>
        "#;
        let rule = RuleSpec {
            list_item: ".event".to_string(),
            fields: BTreeMap::from([("title".to_string(), ".title".to_string())]),
            pagination_next: None,
            pagination_month_grid: false,
            pagination_max_pages: 1,
            timezone: None,
        };
        let entities = extract_entities(html, "src-1", EntityType::Events, &rule);
        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].common().title.as_deref(), Some("Jazz Night"));
        assert_eq!(entities[1].common().title.as_deref(), Some("Art Expo"));
    }

    #[test]
    fn mismatched_requested_type_yields_nothing() {
        let html = r#"<div class="event"><h2 class="title">Art Expo</h2></div>"#;
        let rule = RuleSpec {
            list_item: ".event".to_string(),
            fields: BTreeMap::from([("title".to_string(), ".title".to_string())]),
            pagination_next: None,
            pagination_month_grid: false,
            pagination_max_pages: 1,
            timezone: None,
        };
        // rules always tag with the requested type, so this only proves
        // structured-data mismatches are filtered (covered in structured.rs);
        // here we confirm the combinator still emits the rules side.
        let entities = extract_entities(html, "src-1", EntityType::Sports, &rule);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].entity_type(), EntityType::Sports);
    }
}
