//! Engine configuration
//!
//! A `CasConfig` can be built in code, parsed from YAML, or taken from the
//! defaults with environment variable overrides applied on top.

use crate::constants::{env, heap, indexes::ANNOTATION_INDEX, views};
use crate::error::{WeftError, WeftResult};
use crate::index_repository::IndexSpec;
use crate::view::validate_view_name;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Configuration for a `Cas` engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CasConfig {
    /// Record capacity reserved up front in the heap
    pub initial_heap_capacity: usize,
    /// Name of the view every engine starts with
    pub base_view_name: String,
    /// Move records within their indexes when a sort key is written
    pub auto_reindex: bool,
    /// Index definitions installed in addition to the annotation index
    pub indexes: Vec<IndexSpec>,
}

impl Default for CasConfig {
    fn default() -> Self {
        Self {
            initial_heap_capacity: heap::DEFAULT_CAPACITY,
            base_view_name: views::BASE_VIEW_NAME.to_string(),
            auto_reindex: true,
            indexes: Vec::new(),
        }
    }
}

impl CasConfig {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> WeftResult<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults with `WEFT_*` environment overrides applied
    pub fn from_env() -> WeftResult<Self> {
        Self::default().with_env_overrides()
    }

    /// Apply any `WEFT_*` environment variables that are set
    pub fn with_env_overrides(mut self) -> WeftResult<Self> {
        if let Ok(value) = std::env::var(env::HEAP_CAPACITY) {
            self.initial_heap_capacity = value.trim().parse().map_err(|_| {
                WeftError::configuration(
                    env::HEAP_CAPACITY,
                    format!("expected a record count, got {value:?}"),
                )
            })?;
        }

        if let Ok(value) = std::env::var(env::BASE_VIEW) {
            self.base_view_name = value;
        }

        if let Ok(value) = std::env::var(env::AUTO_REINDEX) {
            self.auto_reindex = parse_flag(&value).ok_or_else(|| {
                WeftError::configuration(
                    env::AUTO_REINDEX,
                    format!("expected true/false, got {value:?}"),
                )
            })?;
        }

        self.validate()?;
        Ok(self)
    }

    /// Check names without consulting a type system
    pub fn validate(&self) -> WeftResult<()> {
        validate_view_name(&self.base_view_name)
            .map_err(|err| WeftError::configuration("base_view_name", err.to_string()))?;

        let mut labels = HashSet::new();
        labels.insert(ANNOTATION_INDEX);
        for spec in &self.indexes {
            if spec.label.is_empty() {
                return Err(WeftError::configuration("indexes", "index label is empty"));
            }
            if !labels.insert(spec.label.as_str()) {
                return Err(WeftError::duplicate("index", spec.label.clone()));
            }
        }
        Ok(())
    }

    pub fn with_heap_capacity(mut self, capacity: usize) -> Self {
        self.initial_heap_capacity = capacity;
        self
    }

    pub fn with_base_view_name(mut self, name: impl Into<String>) -> Self {
        self.base_view_name = name.into();
        self
    }

    pub fn with_auto_reindex(mut self, enabled: bool) -> Self {
        self.auto_reindex = enabled;
        self
    }

    pub fn with_index(mut self, spec: IndexSpec) -> Self {
        self.indexes.push(spec);
        self
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
