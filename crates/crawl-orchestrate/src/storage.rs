//! Tiered commit: silver JSONL per run, gold CSV per date partition, and a
//! shared relational table per entity type with upsert-on-`dedup_key`
//! semantics. An entity type with nothing accepted is a no-op.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crawl_core::{entity_key, Entity, EntityType};
use rusqlite::{params, Connection};
use serde_json::Value;

use crate::error::Result;
use crate::layout::{date_partition, DataLayout};

#[derive(Debug, Clone, Default)]
pub struct PersistedPaths {
    pub silver: Option<PathBuf>,
    pub gold: Option<PathBuf>,
    pub sqlite: Option<PathBuf>,
}

pub struct StorageWriter<'a> {
    layout: &'a DataLayout,
}

impl<'a> StorageWriter<'a> {
    pub fn new(layout: &'a DataLayout) -> Self {
        Self { layout }
    }

    pub fn persist(&self, entity_type: EntityType, entities: &[Entity], run_id: &str) -> Result<PersistedPaths> {
        if entities.is_empty() {
            return Ok(PersistedPaths::default());
        }

        let silver = self.write_silver(entity_type, entities, run_id)?;
        let gold = self.write_gold(entity_type, entities, run_id)?;
        let sqlite = self.write_sqlite(entity_type, entities)?;

        Ok(PersistedPaths {
            silver: Some(silver),
            gold: Some(gold),
            sqlite: Some(sqlite),
        })
    }

    fn write_silver(&self, entity_type: EntityType, entities: &[Entity], run_id: &str) -> Result<PathBuf> {
        let path = self.layout.silver.join(format!("{entity_type}-{run_id}.jsonl"));
        let mut body = String::new();
        for entity in entities {
            body.push_str(&serde_json::to_string(entity)?);
            body.push('\n');
        }
        std::fs::write(&path, body)?;
        Ok(path)
    }

    fn write_gold(&self, entity_type: EntityType, entities: &[Entity], run_id: &str) -> Result<PathBuf> {
        let partition = date_partition(run_id);
        let dir = self.layout.gold.join(partition);
        std::fs::create_dir_all(&dir)?;
        let path = dir.join(format!("{entity_type}.csv"));

        let rows: Vec<BTreeMap<String, Value>> = entities
            .iter()
            .map(|entity| {
                let value = serde_json::to_value(entity).unwrap_or(Value::Null);
                match value {
                    Value::Object(map) => map.into_iter().collect(),
                    _ => BTreeMap::new(),
                }
            })
            .collect();

        let mut columns: Vec<String> = rows.iter().flat_map(|row| row.keys().cloned()).collect();
        columns.sort();
        columns.dedup();

        let mut writer = csv::Writer::from_path(&path)?;
        writer.write_record(&columns)?;
        for row in &rows {
            let record: Vec<String> = columns
                .iter()
                .map(|col| match row.get(col) {
                    Some(Value::String(s)) => s.clone(),
                    Some(other) => other.to_string(),
                    None => String::new(),
                })
                .collect();
            writer.write_record(&record)?;
        }
        writer.flush()?;
        Ok(path)
    }

    fn write_sqlite(&self, entity_type: EntityType, entities: &[Entity]) -> Result<PathBuf> {
        let path = self.layout.gold_sqlite();
        let conn = Connection::open(&path)?;
        let table = entity_type.as_str();

        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                source_id TEXT NOT NULL,
                title TEXT,
                start TEXT,
                end TEXT,
                timezone TEXT,
                venue_name TEXT,
                address TEXT,
                city TEXT,
                country TEXT,
                time_slots_json TEXT NOT NULL,
                price_text TEXT,
                price_value REAL,
                organizer TEXT,
                url TEXT,
                emails_json TEXT,
                phones_json TEXT,
                images_json TEXT,
                taxonomy_json TEXT,
                sport_type TEXT,
                dedup_key TEXT UNIQUE
            )"
        ))?;

        let insert_sql = format!(
            "INSERT INTO {table} (
                source_id, title, start, end, timezone,
                venue_name, address, city, country, time_slots_json,
                price_text, price_value, organizer, url,
                emails_json, phones_json, images_json, taxonomy_json, sport_type, dedup_key
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)
            ON CONFLICT(dedup_key) DO UPDATE SET
                start=excluded.start,
                end=excluded.end,
                timezone=excluded.timezone,
                price_text=excluded.price_text,
                price_value=excluded.price_value,
                organizer=excluded.organizer,
                url=excluded.url,
                emails_json=excluded.emails_json,
                phones_json=excluded.phones_json,
                images_json=excluded.images_json,
                taxonomy_json=excluded.taxonomy_json,
                sport_type=excluded.sport_type"
        );

        let mut stmt = conn.prepare(&insert_sql)?;
        for entity in entities {
            let common = entity.common();
            let dedup_key = entity_key(entity);
            stmt.execute(params![
                common.source_id,
                common.title,
                common.start,
                common.end,
                common.timezone,
                common.venue_name,
                common.address,
                common.city,
                common.country,
                serde_json::to_string(&common.time_slots)?,
                common.price_text,
                common.price_value,
                common.organizer,
                common.url,
                serde_json::to_string(&common.emails)?,
                serde_json::to_string(&common.phones)?,
                serde_json::to_string(&common.images)?,
                serde_json::to_string(&common.taxonomy)?,
                entity.sport_type(),
                dedup_key,
            ])?;
        }
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crawl_core::EntityCommon;
    use tempfile::tempdir;

    fn sample(title: &str) -> Entity {
        Entity::Events(EntityCommon {
            source_id: "src-1".to_string(),
            title: Some(title.to_string()),
            start: Some("2026-03-05T20:00:00Z".to_string()),
            venue_name: Some("The Venue".to_string()),
            city: Some("Berlin".to_string()),
            ..Default::default()
        })
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let dir = tempdir().unwrap();
        let layout = DataLayout::new(dir.path()).unwrap();
        let writer = StorageWriter::new(&layout);
        let result = writer.persist(EntityType::Events, &[], "20260305T120000").unwrap();
        assert!(result.silver.is_none());
    }

    #[test]
    fn persists_to_all_three_tiers() {
        let dir = tempdir().unwrap();
        let layout = DataLayout::new(dir.path()).unwrap();
        let writer = StorageWriter::new(&layout);
        let entities = vec![sample("Jazz Night"), sample("Art Expo")];
        let result = writer.persist(EntityType::Events, &entities, "20260305T120000").unwrap();

        let silver_path = result.silver.unwrap();
        assert!(silver_path.exists());
        assert_eq!(std::fs::read_to_string(&silver_path).unwrap().lines().count(), 2);

        let gold_path = result.gold.unwrap();
        assert!(gold_path.ends_with("2026-03-05/events.csv"));
        assert!(gold_path.exists());

        let sqlite_path = result.sqlite.unwrap();
        let conn = Connection::open(sqlite_path).unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0)).unwrap();
        assert_eq!(count, 2);
    }

    #[test]
    fn sqlite_upsert_does_not_duplicate_dedup_key() {
        let dir = tempdir().unwrap();
        let layout = DataLayout::new(dir.path()).unwrap();
        let writer = StorageWriter::new(&layout);
        let entity = sample("Jazz Night");
        writer.persist(EntityType::Events, &[entity.clone()], "20260305T120000").unwrap();
        writer.persist(EntityType::Events, &[entity], "20260306T120000").unwrap();

        let conn = Connection::open(layout.gold_sqlite()).unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0)).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn sqlite_upsert_preserves_source_id_title_venue_address_city() {
        let dir = tempdir().unwrap();
        let layout = DataLayout::new(dir.path()).unwrap();
        let writer = StorageWriter::new(&layout);
        let original = sample("Jazz Night");
        writer.persist(EntityType::Events, &[original.clone()], "20260305T120000").unwrap();

        let mut changed = original;
        changed.common_mut().title = Some("Renamed Night".to_string());
        changed.common_mut().price_text = Some("15.00".to_string());
        writer.persist(EntityType::Events, &[changed], "20260306T120000").unwrap();

        let conn = Connection::open(layout.gold_sqlite()).unwrap();
        let (title, price_text): (String, String) = conn
            .query_row("SELECT title, price_text FROM events", [], |row| Ok((row.get(0)?, row.get(1)?)))
            .unwrap();
        assert_eq!(title, "Jazz Night");
        assert_eq!(price_text, "15.00");
    }
}
