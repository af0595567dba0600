//! In-memory dedup index and field-level merge, keyed by the canonical
//! `entity_key` with a ±1-day near-key tolerance probe.

use std::collections::HashMap;

use crawl_core::{entity_key, nearby_keys, Entity};

#[derive(Debug, Default)]
pub struct Deduplicator {
    seen: HashMap<String, ()>,
}

impl Deduplicator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn key_for(&self, entity: &Entity) -> String {
        entity_key(entity)
    }

    /// True when the canonical key or any ±1-day near-key is already known.
    pub fn is_duplicate(&self, entity: &Entity) -> bool {
        let primary = self.key_for(entity);
        if self.seen.contains_key(&primary) {
            return true;
        }
        nearby_keys(entity).iter().any(|k| self.seen.contains_key(k))
    }

    pub fn remember(&mut self, entity: &Entity) {
        let key = self.key_for(entity);
        self.seen.insert(key, ());
    }
}

fn is_empty_string(s: &Option<String>) -> bool {
    s.as_deref().map(str::is_empty).unwrap_or(true)
}

/// Overwrite a field on `existing` with `candidate`'s value only when the
/// candidate's value is present, non-empty, and differs. Returns whether
/// anything changed.
pub struct EntityMerger;

impl EntityMerger {
    pub fn merge(existing: &mut Entity, candidate: &Entity) -> bool {
        let mut mutated = false;
        let candidate_common = candidate.common().clone();
        let existing_common = existing.common_mut();

        macro_rules! merge_opt {
            ($field:ident) => {
                if !is_empty_string(&candidate_common.$field) && existing_common.$field != candidate_common.$field {
                    existing_common.$field = candidate_common.$field.clone();
                    mutated = true;
                }
            };
        }
        merge_opt!(title);
        merge_opt!(venue_name);
        merge_opt!(address);
        merge_opt!(city);
        merge_opt!(country);
        merge_opt!(timezone);
        merge_opt!(start);
        merge_opt!(end);
        merge_opt!(price_text);
        merge_opt!(organizer);
        merge_opt!(url);

        if candidate_common.price_value.is_some() && existing_common.price_value != candidate_common.price_value {
            existing_common.price_value = candidate_common.price_value;
            mutated = true;
        }

        macro_rules! merge_list {
            ($field:ident) => {
                if !candidate_common.$field.is_empty() && existing_common.$field != candidate_common.$field {
                    existing_common.$field = candidate_common.$field.clone();
                    mutated = true;
                }
            };
        }
        merge_list!(time_slots);
        merge_list!(emails);
        merge_list!(phones);
        merge_list!(images);
        merge_list!(taxonomy);

        if let (Entity::Sports { sport_type: existing_sport, .. }, Entity::Sports { sport_type: candidate_sport, .. }) =
            (&mut *existing, candidate)
        {
            if candidate_sport.is_some() && existing_sport != candidate_sport {
                *existing_sport = candidate_sport.clone();
                mutated = true;
            }
        }

        mutated
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawl_core::EntityCommon;

    fn sample(title: &str, start: &str) -> Entity {
        Entity::Events(EntityCommon {
            source_id: "src-1".to_string(),
            title: Some(title.to_string()),
            start: Some(start.to_string()),
            venue_name: Some("The Venue".to_string()),
            city: Some("Berlin".to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn remembers_and_flags_canonical_duplicate() {
        let mut dedup = Deduplicator::new();
        let a = sample("Jazz Night", "2026-03-05T20:00:00Z");
        assert!(!dedup.is_duplicate(&a));
        dedup.remember(&a);
        assert!(dedup.is_duplicate(&a));
    }

    #[test]
    fn flags_near_duplicate_shifted_by_one_day() {
        let mut dedup = Deduplicator::new();
        let a = sample("Jazz Night", "2026-03-05T20:00:00Z");
        dedup.remember(&a);
        let b = sample("Jazz Night", "2026-03-06T20:00:00Z");
        assert!(dedup.is_duplicate(&b));
    }

    #[test]
    fn merge_overwrites_only_changed_nonempty_fields() {
        let mut existing = sample("Jazz Night", "2026-03-05T20:00:00Z");
        let mut candidate = sample("Jazz Night", "2026-03-05T20:00:00Z");
        candidate.common_mut().price_text = Some("12.50".to_string());
        candidate.common_mut().venue_name = None;

        let mutated = EntityMerger::merge(&mut existing, &candidate);
        assert!(mutated);
        assert_eq!(existing.common().price_text.as_deref(), Some("12.50"));
        assert_eq!(existing.common().venue_name.as_deref(), Some("The Venue"));
    }

    #[test]
    fn merge_reports_no_mutation_when_nothing_changes() {
        let mut existing = sample("Jazz Night", "2026-03-05T20:00:00Z");
        let candidate = existing.clone();
        assert!(!EntityMerger::merge(&mut existing, &candidate));
    }
}
