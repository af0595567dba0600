//! Lazily-loaded per-entity-type JSON Schema registry: validation against
//! the draft 2020-12 schema plus pruning of unknown top-level fields.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crawl_core::EntityType;
use jsonschema::Validator;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("schema not found for {entity_type}: {path}")]
    NotFound { entity_type: String, path: PathBuf },
    #[error("reading schema {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing schema {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("compiling schema {path}: {source}")]
    Compile {
        path: PathBuf,
        #[source]
        source: jsonschema::ValidationError<'static>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ValidationResult {
    pub ok: bool,
    pub errors: Vec<String>,
}

struct CachedSchema {
    validator: Validator,
    allowed: HashSet<String>,
}

/// Caches one compiled validator plus its allowed-top-level-keys set per
/// entity type, loaded on first use from `<root>/<type_singular>.schema.json`.
pub struct SchemaRegistry {
    root: PathBuf,
    cache: Mutex<BTreeMap<String, CachedSchema>>,
}

impl SchemaRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            cache: Mutex::new(BTreeMap::new()),
        }
    }

    fn schema_path(&self, entity_type: EntityType) -> PathBuf {
        self.root.join(format!("{}.schema.json", entity_type.schema_stem()))
    }

    fn ensure_loaded(&self, entity_type: EntityType) -> Result<(), SchemaError> {
        let key = entity_type.as_str().to_string();
        if self.cache.lock().unwrap().contains_key(&key) {
            return Ok(());
        }

        let path = self.schema_path(entity_type);
        if !path.exists() {
            return Err(SchemaError::NotFound {
                entity_type: key,
                path,
            });
        }

        let text = std::fs::read_to_string(&path).map_err(|source| SchemaError::Read {
            path: path.clone(),
            source,
        })?;
        let schema: Value = serde_json::from_str(&text).map_err(|source| SchemaError::Parse {
            path: path.clone(),
            source,
        })?;

        let allowed = schema
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().cloned().collect())
            .unwrap_or_default();

        let validator = jsonschema::draft202012::new(&schema).map_err(|err| SchemaError::Compile {
            path: path.clone(),
            source: err.to_owned(),
        })?;

        self.cache
            .lock()
            .unwrap()
            .insert(key, CachedSchema { validator, allowed });
        Ok(())
    }

    /// Validate `payload` against the entity type's schema, returning every
    /// `"<json_pointer>: <message>"` violation found.
    pub fn validate(&self, entity_type: EntityType, payload: &Value) -> Result<ValidationResult, SchemaError> {
        self.ensure_loaded(entity_type)?;
        let cache = self.cache.lock().unwrap();
        let cached = cache.get(entity_type.as_str()).expect("just loaded");
        let errors: Vec<String> = cached
            .validator
            .iter_errors(payload)
            .map(|err| format!("{}: {}", err.instance_path, err))
            .collect();
        Ok(ValidationResult {
            ok: errors.is_empty(),
            errors,
        })
    }

    /// Shallow-copy `payload`, keeping only keys the schema declares under
    /// `properties`.
    pub fn prune(&self, entity_type: EntityType, payload: &Value) -> Result<Value, SchemaError> {
        self.ensure_loaded(entity_type)?;
        let cache = self.cache.lock().unwrap();
        let cached = cache.get(entity_type.as_str()).expect("just loaded");
        let Value::Object(map) = payload else {
            return Ok(payload.clone());
        };
        let pruned: serde_json::Map<String, Value> = map
            .iter()
            .filter(|(key, _)| cached.allowed.contains(*key))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();
        Ok(Value::Object(pruned))
    }

    /// Path this registry would load a schema from, for diagnostics.
    pub fn path_for(&self, entity_type: EntityType) -> PathBuf {
        self.schema_path(entity_type)
    }

    pub fn preload_all(&self) -> Result<(), SchemaError> {
        for entity_type in [EntityType::Events, EntityType::Festivals, EntityType::Sports] {
            self.ensure_loaded(entity_type)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_schema(dir: &TempDir, stem: &str, schema: &Value) {
        let path = dir.path().join(format!("{stem}.schema.json"));
        let mut file = std::fs::File::create(path).unwrap();
        file.write_all(serde_json::to_vec(schema).unwrap().as_slice()).unwrap();
    }

    fn sample_schema() -> Value {
        json!({
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "type": "object",
            "properties": {
                "title": {"type": "string"},
                "source_id": {"type": "string"},
            },
            "required": ["title", "source_id"],
        })
    }

    #[test]
    fn missing_schema_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let registry = SchemaRegistry::new(dir.path());
        let err = registry.validate(EntityType::Events, &json!({})).unwrap_err();
        assert!(matches!(err, SchemaError::NotFound { .. }));
    }

    #[test]
    fn validate_reports_missing_required_field() {
        let dir = TempDir::new().unwrap();
        write_schema(&dir, "event", &sample_schema());
        let registry = SchemaRegistry::new(dir.path());
        let result = registry
            .validate(EntityType::Events, &json!({"title": "Jazz Night"}))
            .unwrap();
        assert!(!result.ok);
        assert!(!result.errors.is_empty());
    }

    #[test]
    fn validate_passes_complete_payload() {
        let dir = TempDir::new().unwrap();
        write_schema(&dir, "event", &sample_schema());
        let registry = SchemaRegistry::new(dir.path());
        let result = registry
            .validate(EntityType::Events, &json!({"title": "Jazz Night", "source_id": "src-1"}))
            .unwrap();
        assert!(result.ok);
        assert!(result.errors.is_empty());
    }

    #[test]
    fn prune_drops_unknown_top_level_keys() {
        let dir = TempDir::new().unwrap();
        write_schema(&dir, "event", &sample_schema());
        let registry = SchemaRegistry::new(dir.path());
        let pruned = registry
            .prune(
                EntityType::Events,
                &json!({"title": "Jazz Night", "source_id": "src-1", "extra_field": true}),
            )
            .unwrap();
        assert_eq!(
            pruned,
            json!({"title": "Jazz Night", "source_id": "src-1"})
        );
    }
}
