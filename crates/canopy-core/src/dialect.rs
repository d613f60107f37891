//! SQL dialect adapter.
//!
//! Everything that differs between engines when building a recursive
//! traversal lives here: identifier quoting, parameter placeholders, the
//! `WITH RECURSIVE` keyword, and the fragments that seed and extend the
//! path column. All functions are pure string builders; an encoding the
//! engine cannot represent is reported as
//! [`HierarchyError::UnsupportedDialectFeature`] before any SQL is emitted.
//!
//! | dialect    | text path                      | binary path      | array path |
//! |------------|--------------------------------|------------------|------------|
//! | SQLite     | `CAST(k AS TEXT)`, `\|\|`      | `BLOB`           | no         |
//! | PostgreSQL | `CAST(k AS TEXT)`, `\|\|`      | `bytea`          | `ARRAY[k]` |
//! | MySQL      | `CAST(k AS CHAR(65535))`, `CONCAT` | no           | no         |
//! | SQL Server | `VARCHAR(MAX)`, `CONCAT`       | `VARBINARY(MAX)` | no         |

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::config::PathEncoding;
use crate::error::{HierarchyError, Result};
use crate::query::Fragment;
use crate::value::SqlValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    #[default]
    Sqlite,
    Postgres,
    MySql,
    SqlServer,
}

impl Dialect {
    pub const ALL: [Self; 4] = [Self::Sqlite, Self::Postgres, Self::MySql, Self::SqlServer];

    /// Quote a possibly-qualified identifier (`table.column`). Each segment
    /// is quoted separately and a bare `*` segment is left as is.
    #[must_use]
    pub fn quote_identifier(self, identifier: &str) -> String {
        identifier
            .split('.')
            .map(|segment| {
                if segment == "*" {
                    segment.to_string()
                } else {
                    self.quote_segment(segment)
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    fn quote_segment(self, segment: &str) -> String {
        match self {
            Self::Sqlite | Self::Postgres => format!("\"{}\"", segment.replace('"', "\"\"")),
            Self::MySql => format!("`{}`", segment.replace('`', "``")),
            Self::SqlServer => format!("[{}]", segment.replace(']', "]]")),
        }
    }

    /// Positional placeholder for the `index`-th binding (1-based).
    #[must_use]
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Self::Sqlite | Self::MySql => "?".to_string(),
            Self::Postgres => format!("${index}"),
            Self::SqlServer => format!("@p{index}"),
        }
    }

    /// Keyword that introduces a recursive common table expression.
    #[must_use]
    pub const fn with_recursive(self) -> &'static str {
        match self {
            Self::SqlServer => "WITH",
            Self::Sqlite | Self::Postgres | Self::MySql => "WITH RECURSIVE",
        }
    }

    /// Whether row limits are written as `SELECT TOP n` instead of `LIMIT n`.
    #[must_use]
    pub const fn uses_top(self) -> bool {
        matches!(self, Self::SqlServer)
    }

    /// Fail fast if this dialect cannot store a path in `encoding`.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError::UnsupportedDialectFeature`] for binary paths
    /// on MySQL and array paths anywhere but PostgreSQL.
    pub fn check_encoding(self, encoding: PathEncoding) -> Result<()> {
        let supported = match encoding {
            PathEncoding::Text => true,
            PathEncoding::Binary => !matches!(self, Self::MySql),
            PathEncoding::Array => matches!(self, Self::Postgres),
        };
        if supported {
            Ok(())
        } else {
            Err(self.unsupported(match encoding {
                PathEncoding::Text => "text path encoding",
                PathEncoding::Binary => "binary path encoding",
                PathEncoding::Array => "array path encoding",
            }))
        }
    }

    /// Seed a path with a single segment: `column AS path_name`.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError::UnsupportedDialectFeature`] if `encoding`
    /// is not available on this dialect.
    pub fn initial_path(
        self,
        column: &str,
        path_name: &str,
        encoding: PathEncoding,
    ) -> Result<Fragment> {
        self.check_encoding(encoding)?;
        let col = self.quote_identifier(column);
        let expr = match (self, encoding) {
            (Self::Sqlite | Self::Postgres, PathEncoding::Text) => format!("CAST({col} AS TEXT)"),
            (Self::Sqlite, PathEncoding::Binary) => format!("CAST(CAST({col} AS TEXT) AS BLOB)"),
            (Self::Postgres, PathEncoding::Binary) => {
                format!("CONVERT_TO(CAST({col} AS TEXT), 'UTF8')")
            }
            (Self::Postgres, PathEncoding::Array) => format!("ARRAY[{col}]"),
            (Self::MySql, _) => format!("CAST({col} AS CHAR(65535))"),
            (Self::SqlServer, PathEncoding::Binary) => {
                format!("CAST(CAST({col} AS VARCHAR(MAX)) AS VARBINARY(MAX))")
            }
            (Self::SqlServer, _) => format!("CAST({col} AS VARCHAR(MAX))"),
            (Self::Sqlite, PathEncoding::Array) => return Err(self.unsupported("array path encoding")),
        };
        Ok(Fragment::sql(format!("{expr} AS {}", self.quote_identifier(path_name))))
    }

    /// Extend `previous` (the accumulated path, qualified with the recursive
    /// relation) with one `column` segment joined by `separator`.
    ///
    /// The separator is carried as a binding except for array paths, which
    /// need none.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError::UnsupportedDialectFeature`] if `encoding`
    /// is not available on this dialect.
    pub fn recursive_path(
        self,
        previous: &str,
        column: &str,
        path_name: &str,
        separator: &str,
        encoding: PathEncoding,
    ) -> Result<Fragment> {
        self.check_encoding(encoding)?;
        let prev = self.quote_identifier(previous);
        let col = self.quote_identifier(column);
        let sep = SqlValue::from(separator);

        let mut fragment = match (self, encoding) {
            (Self::Sqlite | Self::Postgres, PathEncoding::Text) => Fragment::sql(format!("{prev} || "))
                .with_bind(sep)
                .with_sql(format!(" || {col}")),
            (Self::Sqlite, PathEncoding::Binary) => Fragment::sql(format!("CAST({prev} || "))
                .with_bind(sep)
                .with_sql(format!(" || {col} AS BLOB)")),
            (Self::Postgres, PathEncoding::Binary) => {
                Fragment::sql(format!("{prev} || CONVERT_TO(CAST("))
                    .with_bind(sep)
                    .with_sql(format!(
                        " AS TEXT), 'UTF8') || CONVERT_TO(CAST({col} AS TEXT), 'UTF8')"
                    ))
            }
            (Self::Postgres, PathEncoding::Array) => Fragment::sql(format!("{prev} || {col}")),
            (Self::MySql, _) => Fragment::sql(format!("CONCAT({prev}, "))
                .with_bind(sep)
                .with_sql(format!(", {col})")),
            (Self::SqlServer, PathEncoding::Binary) => {
                Fragment::sql(format!("{prev} + CAST(CAST("))
                    .with_bind(sep)
                    .with_sql(format!(
                        " AS VARCHAR(MAX)) AS VARBINARY(MAX)) + CAST(CAST({col} AS VARCHAR(MAX)) AS VARBINARY(MAX))"
                    ))
            }
            (Self::SqlServer, _) => Fragment::sql(format!("CAST(CONCAT({prev}, "))
                .with_bind(sep)
                .with_sql(format!(", {col}) AS VARCHAR(MAX))")),
            (Self::Sqlite, PathEncoding::Array) => return Err(self.unsupported("array path encoding")),
        };
        fragment.push_sql(format!(" AS {}", self.quote_identifier(path_name)));
        Ok(fragment)
    }

    /// Predicate that holds when `column`'s value is not yet a segment of
    /// `previous`. Text paths are wrapped in separators on both sides so
    /// `1` does not match inside `11`.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError::UnsupportedDialectFeature`] for binary
    /// paths, where segment containment cannot be expressed portably.
    pub fn path_excludes(
        self,
        previous: &str,
        column: &str,
        separator: &str,
        encoding: PathEncoding,
    ) -> Result<Fragment> {
        self.check_encoding(encoding)?;
        let prev = self.quote_identifier(previous);
        let col = self.quote_identifier(column);
        let sep = || SqlValue::from(separator);

        match (self, encoding) {
            (_, PathEncoding::Binary) => Err(self.unsupported("cycle guard on binary paths")),
            (Self::Postgres, PathEncoding::Array) => Ok(Fragment::sql(format!("{col} <> ALL({prev})"))),
            (Self::Sqlite, _) => Ok(Fragment::sql("instr(")
                .with_bind(sep())
                .with_sql(format!(" || {prev} || "))
                .with_bind(sep())
                .with_sql(", ")
                .with_bind(sep())
                .with_sql(format!(" || {col} || "))
                .with_bind(sep())
                .with_sql(") = 0")),
            (Self::Postgres, _) => Ok(Fragment::sql("position(CAST(")
                .with_bind(sep())
                .with_sql(format!(" AS TEXT) || CAST({col} AS TEXT) || CAST("))
                .with_bind(sep())
                .with_sql(" AS TEXT) in CAST(")
                .with_bind(sep())
                .with_sql(format!(" AS TEXT) || {prev} || CAST("))
                .with_bind(sep())
                .with_sql(" AS TEXT)) = 0")),
            (Self::MySql | Self::SqlServer, _) => {
                let function = if self == Self::MySql { "LOCATE" } else { "CHARINDEX" };
                Ok(Fragment::sql(format!("{function}(CONCAT("))
                    .with_bind(sep())
                    .with_sql(format!(", {col}, "))
                    .with_bind(sep())
                    .with_sql("), CONCAT(")
                    .with_bind(sep())
                    .with_sql(format!(", {prev}, "))
                    .with_bind(sep())
                    .with_sql(")) = 0"))
            }
        }
    }

    const fn unsupported(self, feature: &'static str) -> HierarchyError {
        HierarchyError::UnsupportedDialectFeature {
            dialect: self,
            feature,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sqlite => f.write_str("sqlite"),
            Self::Postgres => f.write_str("postgres"),
            Self::MySql => f.write_str("mysql"),
            Self::SqlServer => f.write_str("sqlserver"),
        }
    }
}

impl FromStr for Dialect {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sqlite" | "sqlite3" => Ok(Self::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "mysql" | "mariadb" => Ok(Self::MySql),
            "sqlserver" | "mssql" | "sql-server" => Ok(Self::SqlServer),
            other => anyhow::bail!(
                "unknown dialect '{other}': expected one of sqlite, postgres, mysql, sqlserver"
            ),
        }
    }
}
