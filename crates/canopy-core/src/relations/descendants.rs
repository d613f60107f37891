//! Downward traversals and the related-table relation built on them.

use std::marker::PhantomData;

use crate::error::Result;
use crate::executor::Executor;
use crate::expression::{Direction, ExpressionBuilder};
use crate::query::{ComparisonOp, RenderedQuery, SelectQuery, Source};
use crate::record::HierarchicalRecord;
use crate::value::Key;

use super::{Hierarchy, HierarchyQuery};

impl<R: HierarchicalRecord> Hierarchy<R> {
    /// Every descendant of `subject`, children at depth 1.
    ///
    /// The expression is seeded on `subject` itself at depth 0 and the seed
    /// row is filtered out afterwards, so paths start with `subject`'s key.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HierarchyError::MissingAttribute`] if `subject`
    /// lacks its local key.
    pub fn descendants(&self, subject: &R) -> Result<HierarchyQuery<R>> {
        let mut query = self.descendants_from(subject.key(&self.config.local_key)?, None)?;
        query.where_depth(ComparisonOp::Gt, 0);
        Ok(query)
    }

    /// `subject` at depth 0 followed by its descendants.
    ///
    /// # Errors
    ///
    /// Same as [`Hierarchy::descendants`].
    pub fn descendants_and_self(&self, subject: &R) -> Result<HierarchyQuery<R>> {
        self.descendants_from(subject.key(&self.config.local_key)?, None)
    }

    /// `subject` and its direct children: descendants-and-self cut at
    /// depth 1.
    ///
    /// # Errors
    ///
    /// Same as [`Hierarchy::descendants`].
    pub fn children_and_self(&self, subject: &R) -> Result<HierarchyQuery<R>> {
        let mut query = self.descendants_from(subject.key(&self.config.local_key)?, Some(2))?;
        query.where_depth(ComparisonOp::Le, 1);
        Ok(query)
    }

    fn descendants_from(&self, anchor: Key, max_depth: Option<i64>) -> Result<HierarchyQuery<R>> {
        let local_key = self.config.local_key.clone();
        self.with_relationship_expression(
            Direction::Descending,
            move |seed| {
                let column = seed.qualify(&local_key);
                seed.where_eq(&column, anchor);
            },
            0,
            None,
            max_depth,
        )
    }

    /// Rows of `related_table` whose `foreign_key` points at one of
    /// `subject`'s descendants (or `subject` itself with `and_self`).
    ///
    /// The descendant expression is registered on the related query and
    /// consulted through `foreign_key IN (SELECT local_key FROM cte)`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HierarchyError::MissingAttribute`] if `subject`
    /// lacks its local key, or an error if the expression cannot be
    /// expressed in this dialect.
    pub fn has_many_of_descendants<T: HierarchicalRecord>(
        &self,
        subject: &R,
        related_table: &str,
        foreign_key: &str,
        and_self: bool,
    ) -> Result<RelatedQuery<T>> {
        let anchor = subject.key(&self.config.local_key)?;
        let local_key = self.config.local_key.clone();

        let mut query = SelectQuery::new(self.dialect, related_table);
        ExpressionBuilder::new(&self.config, self.dialect).apply(
            &mut query,
            Direction::Descending,
            move |seed| {
                let column = seed.qualify(&local_key);
                seed.where_eq(&column, anchor);
            },
            0,
            None,
            None,
        )?;
        query
            .set_source(Source::table(related_table))
            .select_all_from(related_table);

        let mut keys = SelectQuery::new(self.dialect, &self.config.expression_name);
        keys.select(&self.config.local_key);
        if !and_self {
            keys.where_cmp(&self.config.depth_name, ComparisonOp::Gt, 0);
        }
        query.where_in_query(&format!("{related_table}.{foreign_key}"), &keys);

        Ok(RelatedQuery {
            query,
            record: PhantomData,
        })
    }
}

/// Rows of another table, filtered through a hierarchy traversal.
#[derive(Debug, Clone)]
pub struct RelatedQuery<T> {
    query: SelectQuery,
    record: PhantomData<fn() -> T>,
}

impl<T: HierarchicalRecord> RelatedQuery<T> {
    #[must_use]
    pub const fn query(&self) -> &SelectQuery {
        &self.query
    }

    pub const fn query_mut(&mut self) -> &mut SelectQuery {
        &mut self.query
    }

    #[must_use]
    pub fn to_sql(&self) -> RenderedQuery {
        self.query.render()
    }

    /// Execute and map every row.
    ///
    /// # Errors
    ///
    /// Returns the executor's error or the record's mapping error.
    pub fn get<E: Executor + ?Sized>(&self, executor: &E) -> Result<Vec<T>> {
        executor
            .fetch_all(&self.to_sql())?
            .into_iter()
            .map(T::from_attributes)
            .collect()
    }
}
