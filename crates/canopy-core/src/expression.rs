//! Recursive expression builder.
//!
//! Builds the two arms of a traversal CTE and registers their union on an
//! outer query:
//!
//! ```text
//! WITH RECURSIVE cte AS (
//!     SELECT t.*, <initial depth> AS depth, <seed path> AS path
//!     FROM t WHERE <seed constraint>
//!   UNION ALL
//!     SELECT t.*, cte.depth ± 1 AS depth, <path || sep || t.key> AS path
//!     FROM t INNER JOIN cte ON <direction-dependent join>
//!     [WHERE <depth bound>] [AND <cycle guard>]
//! )
//! SELECT * FROM cte ...
//! ```
//!
//! Rows are never deduplicated. Unless the cycle guard is enabled, a
//! parent-pointer cycle makes the recursion run until the engine's own
//! recursion limit stops it.

use tracing::trace;

use crate::config::HierarchyConfig;
use crate::dialect::Dialect;
use crate::error::Result;
use crate::query::{Fragment, SelectQuery, Source};

/// Which way a traversal walks the parent pointers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Toward the roots; depth decreases by one per step.
    Ascending,
    /// Toward the leaves; depth increases by one per step.
    Descending,
}

impl Direction {
    const fn step(self) -> &'static str {
        match self {
            Self::Ascending => "-",
            Self::Descending => "+",
        }
    }
}

/// Builds recursive traversal expressions for one configured table.
#[derive(Debug, Clone, Copy)]
pub struct ExpressionBuilder<'a> {
    config: &'a HierarchyConfig,
    dialect: Dialect,
}

impl<'a> ExpressionBuilder<'a> {
    #[must_use]
    pub const fn new(config: &'a HierarchyConfig, dialect: Dialect) -> Self {
        Self { config, dialect }
    }

    /// Register a recursive expression on `outer` and point `outer` at it.
    ///
    /// `constraint` narrows the seed rows. `from` replaces the configured
    /// table as the relation both arms read from. `max_depth` stops the
    /// recursive arm from producing rows at or beyond that distance from
    /// the seed; seed rows are always kept.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HierarchyError::UnsupportedDialectFeature`] if the
    /// configured path encoding or cycle guard cannot be expressed in this
    /// dialect. Nothing is registered on `outer` in that case.
    pub fn apply(
        &self,
        outer: &mut SelectQuery,
        direction: Direction,
        constraint: impl FnOnce(&mut SelectQuery),
        initial_depth: i64,
        from: Option<Source>,
        max_depth: Option<i64>,
    ) -> Result<()> {
        let from = from.unwrap_or_else(|| Source::table(&self.config.table));

        let mut expression = self.initial_query(constraint, initial_depth, &from)?;
        expression.union_all(self.recursive_query(direction, &from, max_depth)?);

        let name = &self.config.expression_name;
        trace!(
            expression = %name,
            ?direction,
            initial_depth,
            ?max_depth,
            "registering recursive expression"
        );

        outer
            .with_recursive_expression(name, expression)
            .set_source(Source::table(name));
        Ok(())
    }

    /// The seed arm: every source column, a literal depth and seed paths.
    ///
    /// # Errors
    ///
    /// Returns an error if a path cannot be encoded in this dialect.
    pub fn initial_query(
        &self,
        constraint: impl FnOnce(&mut SelectQuery),
        initial_depth: i64,
        from: &Source,
    ) -> Result<SelectQuery> {
        let config = self.config;
        let dialect = self.dialect;
        let table = from.reference();

        let mut query = SelectQuery::from_source(dialect, from.clone());
        query.select_all_from(table).select_raw(Fragment::sql(format!(
            "{initial_depth} AS {}",
            dialect.quote_identifier(&config.depth_name)
        )));

        query.select_raw(dialect.initial_path(
            &format!("{table}.{}", config.local_key),
            &config.path_name,
            config.path_encoding,
        )?);
        for path in &config.custom_paths {
            query.select_raw(dialect.initial_path(
                &format!("{table}.{}", path.column),
                &path.name,
                config.path_encoding,
            )?);
        }

        constraint(&mut query);
        Ok(query)
    }

    /// The recursive arm: joins the source against the expression itself.
    ///
    /// # Errors
    ///
    /// Returns an error if a path or the cycle guard cannot be encoded in
    /// this dialect.
    pub fn recursive_query(
        &self,
        direction: Direction,
        from: &Source,
        max_depth: Option<i64>,
    ) -> Result<SelectQuery> {
        let config = self.config;
        let dialect = self.dialect;
        let name = config.expression_name.as_str();
        let table = from.reference();
        let previous_depth = dialect.quote_identifier(&format!("{name}.{}", config.depth_name));

        let mut query = SelectQuery::from_source(dialect, from.clone());
        query.select_all_from(table).select_raw(Fragment::sql(format!(
            "{previous_depth} {} 1 AS {}",
            direction.step(),
            dialect.quote_identifier(&config.depth_name)
        )));

        query.select_raw(dialect.recursive_path(
            &format!("{name}.{}", config.path_name),
            &format!("{table}.{}", config.local_key),
            &config.path_name,
            &config.path_separator,
            config.path_encoding,
        )?);
        for path in &config.custom_paths {
            query.select_raw(dialect.recursive_path(
                &format!("{name}.{}", path.name),
                &format!("{table}.{}", path.column),
                &path.name,
                &path.separator,
                config.path_encoding,
            )?);
        }

        let (first, second) = match direction {
            Direction::Ascending => (
                format!("{name}.{}", config.parent_key),
                format!("{table}.{}", config.local_key),
            ),
            Direction::Descending => (
                format!("{name}.{}", config.local_key),
                format!("{table}.{}", config.parent_key),
            ),
        };
        query.join(Source::table(name), &first, &second);

        if let Some(max_depth) = max_depth {
            let bound = match direction {
                Direction::Ascending => Fragment::sql(format!("{previous_depth} - 1 > "))
                    .with_bind(max_depth.saturating_neg()),
                Direction::Descending => {
                    Fragment::sql(format!("{previous_depth} + 1 < ")).with_bind(max_depth)
                }
            };
            query.where_raw(bound);
        }

        if config.cycle_guard {
            query.where_raw(dialect.path_excludes(
                &format!("{name}.{}", config.path_name),
                &format!("{table}.{}", config.local_key),
                &config.path_separator,
                config.path_encoding,
            )?);
        }

        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CustomPath, PathEncoding};
    use crate::error::HierarchyError;
    use crate::value::SqlValue;

    fn descendants_of(config: &HierarchyConfig, dialect: Dialect, key: i64) -> SelectQuery {
        let mut outer = SelectQuery::new(dialect, &config.table);
        ExpressionBuilder::new(config, dialect)
            .apply(
                &mut outer,
                Direction::Descending,
                |seed| {
                    seed.where_eq("id", key);
                },
                0,
                None,
                None,
            )
            .expect("build expression");
        outer
    }

    #[test]
    fn descending_expression_sqlite() {
        let config = HierarchyConfig::new("nodes");
        let rendered = descendants_of(&config, Dialect::Sqlite, 1).render();
        assert_eq!(
            rendered.sql,
            "WITH RECURSIVE \"canopy_cte\" AS (\
             SELECT \"nodes\".*, 0 AS \"depth\", CAST(\"nodes\".\"id\" AS TEXT) AS \"path\" \
             FROM \"nodes\" WHERE \"id\" = ? \
             UNION ALL \
             SELECT \"nodes\".*, \"canopy_cte\".\"depth\" + 1 AS \"depth\", \
             \"canopy_cte\".\"path\" || ? || \"nodes\".\"id\" AS \"path\" \
             FROM \"nodes\" INNER JOIN \"canopy_cte\" ON \"canopy_cte\".\"id\" = \"nodes\".\"parent_id\"\
             ) SELECT * FROM \"canopy_cte\""
        );
        assert_eq!(
            rendered.bindings,
            vec![SqlValue::from(1), SqlValue::from(".")]
        );
    }

    #[test]
    fn ascending_expression_flips_join_and_step() {
        let config = HierarchyConfig::new("nodes");
        let mut outer = SelectQuery::new(Dialect::Postgres, "nodes");
        ExpressionBuilder::new(&config, Dialect::Postgres)
            .apply(
                &mut outer,
                Direction::Ascending,
                |seed| {
                    seed.where_eq("id", 4);
                },
                -1,
                None,
                None,
            )
            .expect("build expression");
        let sql = outer.render().sql;
        assert!(sql.contains("-1 AS \"depth\""));
        assert!(sql.contains("\"canopy_cte\".\"depth\" - 1 AS \"depth\""));
        assert!(sql.contains("ON \"canopy_cte\".\"parent_id\" = \"nodes\".\"id\""));
        assert!(sql.contains("WHERE \"id\" = $1"));
        assert!(sql.contains("|| $2 ||"));
    }

    #[test]
    fn max_depth_bounds_the_recursive_arm_only() {
        let config = HierarchyConfig::new("nodes");
        let builder = ExpressionBuilder::new(&config, Dialect::Sqlite);
        let from = Source::table("nodes");

        let seed = builder.initial_query(|_| {}, 0, &from).expect("seed");
        assert!(!seed.render().sql.contains("WHERE"));

        let step = builder
            .recursive_query(Direction::Descending, &from, Some(2))
            .expect("step");
        let rendered = step.render();
        assert!(rendered.sql.ends_with("WHERE \"canopy_cte\".\"depth\" + 1 < ?"));
        assert_eq!(rendered.bindings.last(), Some(&SqlValue::from(2)));
    }

    #[test]
    fn custom_paths_use_their_own_separator() {
        let config = HierarchyConfig::new("nodes").with_custom_path(CustomPath::new(
            "slug",
            "slug_path",
            "/",
        ));
        let rendered = descendants_of(&config, Dialect::MySql, 1).render();
        assert!(
            rendered
                .sql
                .contains("CAST(`nodes`.`slug` AS CHAR(65535)) AS `slug_path`")
        );
        assert!(
            rendered
                .sql
                .contains("CONCAT(`canopy_cte`.`slug_path`, ?, `nodes`.`slug`) AS `slug_path`")
        );
        assert_eq!(
            rendered.bindings,
            vec![SqlValue::from(1), SqlValue::from("."), SqlValue::from("/")]
        );
    }

    #[test]
    fn aliased_source_qualifies_both_arms() {
        let config = HierarchyConfig::new("nodes");
        let mut outer = SelectQuery::new(Dialect::Sqlite, "nodes");
        ExpressionBuilder::new(&config, Dialect::Sqlite)
            .apply(
                &mut outer,
                Direction::Descending,
                |_| {},
                0,
                Some(Source::aliased("nodes", "n")),
                None,
            )
            .expect("build expression");
        let sql = outer.render().sql;
        assert!(sql.contains("FROM \"nodes\" AS \"n\" INNER JOIN"));
        assert!(sql.contains("= \"n\".\"parent_id\""));
        assert!(sql.contains("SELECT \"n\".*, 0 AS \"depth\""));
    }

    #[test]
    fn unsupported_encoding_leaves_outer_untouched() {
        let config = HierarchyConfig::new("nodes").with_encoding(PathEncoding::Array);
        let mut outer = SelectQuery::new(Dialect::Sqlite, "nodes");
        let before = outer.clone();
        let err = ExpressionBuilder::new(&config, Dialect::Sqlite)
            .apply(&mut outer, Direction::Descending, |_| {}, 0, None, None)
            .expect_err("array unsupported on sqlite");
        assert!(matches!(
            err,
            HierarchyError::UnsupportedDialectFeature { .. }
        ));
        assert_eq!(outer, before);
    }

    #[test]
    fn cycle_guard_is_added_to_recursive_arm() {
        let config = HierarchyConfig::new("nodes").with_cycle_guard(true);
        let rendered = descendants_of(&config, Dialect::SqlServer, 1).render();
        assert!(rendered.sql.starts_with("WITH [canopy_cte] AS ("));
        assert!(rendered.sql.contains(
            "CHARINDEX(CONCAT(@p3, [nodes].[id], @p4), CONCAT(@p5, [canopy_cte].[path], @p6)) = 0"
        ));
    }
}
