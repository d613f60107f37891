//! Per-table hierarchy configuration.
//!
//! A [`HierarchyConfig`] names the columns the traversal engine reads
//! (local key, parent key) and the columns it synthesizes (depth, path and
//! any custom paths). It is built once, validated once by
//! [`HierarchyConfig::validate`], and then shared immutably.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

use crate::error::HierarchyError;

/// How the path column is encoded in SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PathEncoding {
    /// Separator-delimited text.
    #[default]
    Text,
    /// Separator-delimited binary string, for engines that cap text length
    /// during deep recursion.
    Binary,
    /// Native array of keys.
    Array,
}

/// An extra path accumulated over a column other than the local key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomPath {
    /// Source column whose values are chained.
    pub column: String,
    /// Output column name.
    pub name: String,
    #[serde(default = "default_separator")]
    pub separator: String,
}

impl CustomPath {
    #[must_use]
    pub fn new(column: &str, name: &str, separator: &str) -> Self {
        Self {
            column: column.to_string(),
            name: name.to_string(),
            separator: separator.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchyConfig {
    pub table: String,
    #[serde(default = "default_parent_key")]
    pub parent_key: String,
    #[serde(default = "default_local_key")]
    pub local_key: String,
    #[serde(default = "default_depth_name")]
    pub depth_name: String,
    #[serde(default = "default_path_name")]
    pub path_name: String,
    #[serde(default = "default_separator")]
    pub path_separator: String,
    #[serde(default)]
    pub path_encoding: PathEncoding,
    #[serde(default)]
    pub custom_paths: Vec<CustomPath>,
    #[serde(default = "default_expression_name")]
    pub expression_name: String,
    /// Stop a recursive step from revisiting a key already on its path.
    #[serde(default)]
    pub cycle_guard: bool,
}

impl HierarchyConfig {
    /// Defaults for `table`: `id` / `parent_id` keys, `depth` and `path`
    /// outputs joined with `.`.
    #[must_use]
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            parent_key: default_parent_key(),
            local_key: default_local_key(),
            depth_name: default_depth_name(),
            path_name: default_path_name(),
            path_separator: default_separator(),
            path_encoding: PathEncoding::default(),
            custom_paths: Vec::new(),
            expression_name: default_expression_name(),
            cycle_guard: false,
        }
    }

    #[must_use]
    pub fn with_parent_key(mut self, column: &str) -> Self {
        self.parent_key = column.to_string();
        self
    }

    #[must_use]
    pub fn with_local_key(mut self, column: &str) -> Self {
        self.local_key = column.to_string();
        self
    }

    #[must_use]
    pub fn with_depth_name(mut self, name: &str) -> Self {
        self.depth_name = name.to_string();
        self
    }

    #[must_use]
    pub fn with_path_name(mut self, name: &str) -> Self {
        self.path_name = name.to_string();
        self
    }

    #[must_use]
    pub fn with_separator(mut self, separator: &str) -> Self {
        self.path_separator = separator.to_string();
        self
    }

    #[must_use]
    pub const fn with_encoding(mut self, encoding: PathEncoding) -> Self {
        self.path_encoding = encoding;
        self
    }

    #[must_use]
    pub fn with_custom_path(mut self, path: CustomPath) -> Self {
        self.custom_paths.push(path);
        self
    }

    #[must_use]
    pub fn with_expression_name(mut self, name: &str) -> Self {
        self.expression_name = name.to_string();
        self
    }

    #[must_use]
    pub const fn with_cycle_guard(mut self, enabled: bool) -> Self {
        self.cycle_guard = enabled;
        self
    }

    /// Check that every name is usable and that synthesized output columns
    /// do not collide with each other.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError::InvalidConfig`] describing the first
    /// problem found.
    pub fn validate(&self) -> Result<(), HierarchyError> {
        let required = [
            ("table", &self.table),
            ("parent_key", &self.parent_key),
            ("local_key", &self.local_key),
            ("depth_name", &self.depth_name),
            ("path_name", &self.path_name),
            ("path_separator", &self.path_separator),
            ("expression_name", &self.expression_name),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(HierarchyError::InvalidConfig(format!("{field} must not be empty")));
            }
        }

        if self.parent_key == self.local_key {
            return Err(HierarchyError::InvalidConfig(format!(
                "parent_key and local_key are both '{}'",
                self.local_key
            )));
        }

        if self.expression_name == self.table {
            return Err(HierarchyError::InvalidConfig(format!(
                "expression_name '{}' shadows the table",
                self.expression_name
            )));
        }

        let mut outputs: HashSet<&str> = HashSet::new();
        for name in [self.depth_name.as_str(), self.path_name.as_str()] {
            if !outputs.insert(name) {
                return Err(HierarchyError::InvalidConfig(format!(
                    "output column '{name}' is declared twice"
                )));
            }
        }
        for path in &self.custom_paths {
            if path.column.trim().is_empty() || path.name.trim().is_empty() {
                return Err(HierarchyError::InvalidConfig(
                    "custom path column and name must not be empty".to_string(),
                ));
            }
            if path.separator.is_empty() {
                return Err(HierarchyError::InvalidConfig(format!(
                    "custom path '{}' has an empty separator",
                    path.name
                )));
            }
            if !outputs.insert(path.name.as_str()) {
                return Err(HierarchyError::InvalidConfig(format!(
                    "output column '{}' is declared twice",
                    path.name
                )));
            }
        }

        Ok(())
    }
}

/// On-disk layout of `.canopy.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    hierarchy: Option<HierarchyConfig>,
}

/// Load the `[hierarchy]` table from a TOML file.
///
/// A missing file, or a file without a `[hierarchy]` table, yields
/// [`HierarchyConfig::new`] for `default_table`.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_hierarchy_config(path: &Path, default_table: &str) -> Result<HierarchyConfig> {
    if !path.exists() {
        return Ok(HierarchyConfig::new(default_table));
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let file = toml::from_str::<ConfigFile>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    Ok(file
        .hierarchy
        .unwrap_or_else(|| HierarchyConfig::new(default_table)))
}

fn default_parent_key() -> String {
    "parent_id".to_string()
}

fn default_local_key() -> String {
    "id".to_string()
}

fn default_depth_name() -> String {
    "depth".to_string()
}

fn default_path_name() -> String {
    "path".to_string()
}

fn default_separator() -> String {
    ".".to_string()
}

fn default_expression_name() -> String {
    "canopy_cte".to_string()
}
