pub mod completions;
pub mod relation;
pub mod root;
pub mod sql;
pub mod tree;

use anyhow::{Context as _, Result};
use canopy_core::{Dialect, Hierarchy, HierarchyConfig, HierarchyQuery, Node, Scope, SqlValue};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::output::{OutputMode, RowView};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = ".canopy.toml";

/// Table used when neither `--table` nor the config file names one.
pub const DEFAULT_TABLE: &str = "nodes";

/// Global options every data command shares.
#[derive(Debug, Clone)]
pub struct GlobalOptions {
    pub db: PathBuf,
    pub config: Option<PathBuf>,
    pub table: Option<String>,
    pub label: String,
    pub scopes: Vec<Scope>,
    pub output: OutputMode,
}

/// Resolve the hierarchy configuration: `--config` flag > `.canopy.toml`
/// in `cwd` > defaults, then `--table` on top.
pub fn resolve_config(opts: &GlobalOptions, cwd: &Path) -> Result<HierarchyConfig> {
    let path = opts
        .config
        .clone()
        .unwrap_or_else(|| cwd.join(DEFAULT_CONFIG_FILE));
    if opts.config.is_some() && !path.exists() {
        anyhow::bail!("config file {} does not exist", path.display());
    }

    let mut config = canopy_core::load_hierarchy_config(&path, DEFAULT_TABLE)?;
    if let Some(table) = &opts.table {
        config.table.clone_from(table);
    }
    debug!(table = %config.table, config = %path.display(), "resolved hierarchy config");
    Ok(config)
}

/// An open database plus the hierarchy it is queried through.
pub struct Session {
    pub conn: Connection,
    pub hierarchy: Hierarchy<Node>,
    pub opts: GlobalOptions,
}

impl Session {
    pub fn open(opts: &GlobalOptions, cwd: &Path) -> Result<Self> {
        let config = resolve_config(opts, cwd)?;
        let hierarchy = Hierarchy::new(config, Dialect::Sqlite)?;

        if !opts.db.exists() {
            anyhow::bail!("database {} does not exist", opts.db.display());
        }
        let conn = Connection::open_with_flags(&opts.db, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .with_context(|| format!("Failed to open {}", opts.db.display()))?;

        Ok(Self {
            conn,
            hierarchy,
            opts: opts.clone(),
        })
    }

    pub fn view(&self) -> RowView<'_> {
        RowView {
            config: self.hierarchy.config(),
            label: &self.opts.label,
        }
    }

    /// The row whose local key equals `key`.
    pub fn subject(&self, key: &str) -> Result<Node> {
        let mut query = self.hierarchy.query();
        let column = self.hierarchy.config().local_key.clone();
        query.query_mut().where_eq(&column, parse_key(key));
        query
            .first(&self.conn)?
            .with_context(|| format!("no row in {} with {column} = {key}", self.hierarchy.config().table))
    }

    /// Apply the global `--scope` flags.
    pub fn scoped(&self, mut query: HierarchyQuery<Node>) -> HierarchyQuery<Node> {
        query.scoped(&self.opts.scopes);
        query
    }
}

/// Integer keys bind as integers; anything else binds as text.
pub fn parse_key(raw: &str) -> SqlValue {
    raw.parse::<i64>()
        .map_or_else(|_| SqlValue::from(raw), SqlValue::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn opts() -> GlobalOptions {
        GlobalOptions {
            db: PathBuf::from("canopy.db"),
            config: None,
            table: None,
            label: "name".to_string(),
            scopes: Vec::new(),
            output: OutputMode::Text,
        }
    }

    #[test]
    fn keys_parse_as_integers_when_possible() {
        assert_eq!(parse_key("42"), SqlValue::Integer(42));
        assert_eq!(parse_key("-1"), SqlValue::Integer(-1));
        assert_eq!(parse_key("abc"), SqlValue::from("abc"));
    }

    #[test]
    fn config_defaults_without_file() {
        let dir = TempDir::new().expect("tempdir");
        let config = resolve_config(&opts(), dir.path()).expect("config");
        assert_eq!(config, HierarchyConfig::new(DEFAULT_TABLE));
    }

    #[test]
    fn config_file_in_cwd_then_table_flag() {
        let dir = TempDir::new().expect("tempdir");
        std::fs::write(
            dir.path().join(DEFAULT_CONFIG_FILE),
            "[hierarchy]\ntable = \"categories\"\nparent_key = \"up\"\n",
        )
        .expect("write config");

        let config = resolve_config(&opts(), dir.path()).expect("config");
        assert_eq!(config.table, "categories");
        assert_eq!(config.parent_key, "up");

        let mut flagged = opts();
        flagged.table = Some("other".to_string());
        let config = resolve_config(&flagged, dir.path()).expect("config");
        assert_eq!(config.table, "other");
        assert_eq!(config.parent_key, "up");
    }

    #[test]
    fn explicit_missing_config_is_an_error() {
        let dir = TempDir::new().expect("tempdir");
        let mut flagged = opts();
        flagged.config = Some(dir.path().join("missing.toml"));
        assert!(resolve_config(&flagged, dir.path()).is_err());
    }

    #[test]
    fn missing_database_is_reported() {
        let dir = TempDir::new().expect("tempdir");
        let mut flagged = opts();
        flagged.db = dir.path().join("absent.db");
        let err = Session::open(&flagged, dir.path()).err().expect("missing db");
        assert!(err.to_string().contains("does not exist"));
    }
}
