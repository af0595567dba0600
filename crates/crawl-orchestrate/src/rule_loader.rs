//! Loads the parsed shape of a source's rule file (§6 RuleSpec YAML). The
//! declarative schema itself — what selectors and pagination knobs mean —
//! is an external collaborator; this module only consumes its parsed shape
//! and flattens it into `crawl_core::RuleSpec`.

use std::collections::BTreeMap;
use std::path::Path;

use crawl_core::RuleSpec;
use serde::Deserialize;

use crate::error::{OrchestrateError, Result};

#[derive(Debug, Deserialize)]
struct RuleFileSelectors {
    #[serde(default = "default_list_item")]
    list_item: String,
}

fn default_list_item() -> String {
    "body".to_string()
}

#[derive(Debug, Default, Deserialize)]
struct RuleFilePagination {
    next_selector: Option<String>,
    #[serde(default)]
    month_grid: bool,
    #[serde(default = "default_max_pages")]
    max_pages: u32,
}

fn default_max_pages() -> u32 {
    1
}

#[derive(Debug, Default, Deserialize)]
struct RuleFileDateScopes {
    timezone: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    selectors: Option<RuleFileSelectors>,
    #[serde(default)]
    fields: BTreeMap<String, String>,
    #[serde(default)]
    pagination: RuleFilePagination,
    #[serde(default)]
    date_scopes: RuleFileDateScopes,
}

/// Read and flatten a rule YAML file into the pure `RuleSpec` shape the
/// extractor consumes.
pub fn load_rule_spec(path: &Path) -> Result<RuleSpec> {
    let text = std::fs::read_to_string(path)?;
    let file: RuleFile = serde_yaml::from_str(&text)
        .map_err(|err| OrchestrateError::Config(format!("parsing rule file {}: {err}", path.display())))?;

    Ok(RuleSpec {
        list_item: file
            .selectors
            .map(|s| s.list_item)
            .unwrap_or_else(default_list_item),
        fields: file.fields,
        pagination_next: file.pagination.next_selector,
        pagination_month_grid: file.pagination.month_grid,
        pagination_max_pages: file.pagination.max_pages.max(1),
        timezone: file.date_scopes.timezone,
    })
}
