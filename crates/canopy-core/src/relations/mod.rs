//! Relationship resolvers.
//!
//! [`Hierarchy`] binds a validated [`HierarchyConfig`] to a dialect and a
//! record type. Its per-record accessors (`ancestors`, `descendants`,
//! `siblings`, `root_ancestor`, ...) and table-level scopes (`tree`,
//! `tree_of`) each configure one recursive expression and hand back a
//! [`HierarchyQuery`]: a passthrough handle that accepts further predicates
//! before it is executed.
//!
//! Every call builds a fresh query. Nothing on the `Hierarchy` is mutated,
//! so one instance can serve any number of traversals.

mod ancestors;
mod descendants;
mod eager;
mod root_ancestor;
mod siblings;

pub use descendants::RelatedQuery;
pub use eager::EagerRelation;

use std::marker::PhantomData;
use std::sync::Arc;

use crate::config::HierarchyConfig;
use crate::dialect::Dialect;
use crate::error::{HierarchyError, Result};
use crate::executor::Executor;
use crate::expression::{Direction, ExpressionBuilder};
use crate::query::{SelectQuery, Source};
use crate::record::HierarchicalRecord;
use crate::tree;

/// Traversal entry point for one table and record type.
#[derive(Debug)]
pub struct Hierarchy<R> {
    config: Arc<HierarchyConfig>,
    dialect: Dialect,
    record: PhantomData<fn() -> R>,
}

impl<R> Clone for Hierarchy<R> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            dialect: self.dialect,
            record: PhantomData,
        }
    }
}

impl<R: HierarchicalRecord> Hierarchy<R> {
    /// Validate `config` for `dialect`.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError::InvalidConfig`] for unusable names and
    /// [`HierarchyError::UnsupportedDialectFeature`] if the path encoding
    /// (or the cycle guard over it) cannot be expressed in `dialect`.
    pub fn new(config: HierarchyConfig, dialect: Dialect) -> Result<Self> {
        config.validate()?;
        dialect.check_encoding(config.path_encoding)?;
        if config.cycle_guard {
            dialect.path_excludes(
                &config.path_name,
                &config.local_key,
                &config.path_separator,
                config.path_encoding,
            )?;
        }
        Ok(Self {
            config: Arc::new(config),
            dialect,
            record: PhantomData,
        })
    }

    #[must_use]
    pub fn config(&self) -> &HierarchyConfig {
        &self.config
    }

    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// A plain, non-recursive query over the configured table.
    #[must_use]
    pub fn query(&self) -> HierarchyQuery<R> {
        HierarchyQuery::new(
            Arc::clone(&self.config),
            SelectQuery::new(self.dialect, &self.config.table),
        )
    }

    /// Register a recursive expression on a fresh query and point the query
    /// at it.
    ///
    /// This is the building block every resolver uses; see
    /// [`ExpressionBuilder::apply`] for the meaning of each argument.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression cannot be expressed in this
    /// dialect.
    pub fn with_relationship_expression(
        &self,
        direction: Direction,
        constraint: impl FnOnce(&mut SelectQuery),
        initial_depth: i64,
        from: Option<Source>,
        max_depth: Option<i64>,
    ) -> Result<HierarchyQuery<R>> {
        let mut query = self.query();
        ExpressionBuilder::new(&self.config, self.dialect).apply(
            &mut query.query,
            direction,
            constraint,
            initial_depth,
            from,
            max_depth,
        )?;
        Ok(query)
    }

    /// The whole forest, rooted at every record whose parent key is null.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression cannot be expressed in this
    /// dialect.
    pub fn tree(&self, max_depth: Option<i64>) -> Result<HierarchyQuery<R>> {
        let parent_key = self.config.parent_key.clone();
        self.tree_of(
            move |seed| {
                let column = seed.qualify(&parent_key);
                seed.where_null(&column);
            },
            max_depth,
        )
    }

    /// A forest rooted at the rows `constraint` selects, at depth 0.
    ///
    /// # Errors
    ///
    /// Returns an error if the expression cannot be expressed in this
    /// dialect.
    pub fn tree_of(
        &self,
        constraint: impl FnOnce(&mut SelectQuery),
        max_depth: Option<i64>,
    ) -> Result<HierarchyQuery<R>> {
        self.with_relationship_expression(Direction::Descending, constraint, 0, None, max_depth)
    }

    /// Direct children: a plain `parent_key = subject.local_key` query.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError::MissingAttribute`] if `subject` lacks its
    /// local key.
    pub fn children(&self, subject: &R) -> Result<HierarchyQuery<R>> {
        let key = subject.key(&self.config.local_key)?;
        let mut query = self.query();
        query.query.where_eq(&self.config.parent_key, key);
        Ok(query)
    }

    /// The direct parent: a plain `local_key = subject.parent_key` query.
    /// Matches nothing for a root.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError::MissingAttribute`] if `subject` lacks its
    /// parent key column.
    pub fn parent(&self, subject: &R) -> Result<HierarchyQuery<R>> {
        let parent = subject.nullable_key(&self.config.parent_key)?;
        let mut query = self.query();
        match parent {
            Some(key) => query.query.where_eq(&self.config.local_key, key),
            None => query.query.where_in(&self.config.local_key, Vec::new()),
        };
        Ok(query)
    }

    /// Nest a flat result set. See [`tree::to_tree`].
    ///
    /// # Errors
    ///
    /// Returns an error if a record lacks a hierarchy column or the rows
    /// contain a parent cycle.
    pub fn to_tree(&self, records: &[R], relation: &str) -> Result<Vec<R>> {
        tree::to_tree(&self.config, records, relation)
    }

    /// First segment of `record`'s path: the traversal anchor's key.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError::MissingAttribute`] if the record carries no
    /// readable path.
    pub fn first_path_segment(&self, record: &R) -> Result<String> {
        let path = self.path_text(record)?;
        Ok(path
            .split(self.config.path_separator.as_str())
            .next()
            .unwrap_or_default()
            .to_string())
    }

    /// Whether `record`'s path has more than one segment.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError::MissingAttribute`] if the record carries no
    /// readable path.
    pub fn has_nested_path(&self, record: &R) -> Result<bool> {
        let path = self.path_text(record)?;
        Ok(path.contains(self.config.path_separator.as_str()))
    }

    fn path_text<'r>(&self, record: &'r R) -> Result<&'r str> {
        record
            .attribute(&self.config.path_name)
            .and_then(crate::value::SqlValue::as_text)
            .ok_or_else(|| HierarchyError::MissingAttribute(self.config.path_name.clone()))
    }
}

/// A traversal query that has not been executed yet.
#[derive(Debug, Clone)]
pub struct HierarchyQuery<R> {
    pub(crate) config: Arc<HierarchyConfig>,
    pub(crate) query: SelectQuery,
    record: PhantomData<fn() -> R>,
}

impl<R: HierarchicalRecord> HierarchyQuery<R> {
    pub(crate) const fn new(config: Arc<HierarchyConfig>, query: SelectQuery) -> Self {
        Self {
            config,
            query,
            record: PhantomData,
        }
    }

    #[must_use]
    pub fn config(&self) -> &HierarchyConfig {
        &self.config
    }

    /// The underlying query.
    #[must_use]
    pub const fn query(&self) -> &SelectQuery {
        &self.query
    }

    /// The underlying query, for predicates the scopes do not cover.
    pub const fn query_mut(&mut self) -> &mut SelectQuery {
        &mut self.query
    }

    /// Render without executing.
    #[must_use]
    pub fn to_sql(&self) -> crate::query::RenderedQuery {
        self.query.render()
    }

    /// Execute and map every row.
    ///
    /// # Errors
    ///
    /// Returns the executor's error, or the record's mapping error. No
    /// partial result is returned.
    pub fn get<E: Executor + ?Sized>(&self, executor: &E) -> Result<Vec<R>> {
        executor
            .fetch_all(&self.to_sql())?
            .into_iter()
            .map(R::from_attributes)
            .collect()
    }

    /// Execute with `LIMIT 1`.
    ///
    /// # Errors
    ///
    /// Same as [`HierarchyQuery::get`].
    pub fn first<E: Executor + ?Sized>(&self, executor: &E) -> Result<Option<R>> {
        let mut limited = self.clone();
        limited.query.limit(1);
        Ok(limited.get(executor)?.into_iter().next())
    }

    /// Execute and nest the rows under `relation`.
    ///
    /// # Errors
    ///
    /// Same as [`HierarchyQuery::get`] and [`tree::to_tree`].
    pub fn get_tree<E: Executor + ?Sized>(&self, executor: &E, relation: &str) -> Result<Vec<R>> {
        let rows = self.get(executor)?;
        tree::to_tree(&self.config, &rows, relation)
    }
}
