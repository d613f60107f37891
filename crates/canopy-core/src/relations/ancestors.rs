//! Upward traversals.

use crate::error::Result;
use crate::expression::Direction;
use crate::query::ComparisonOp;
use crate::record::HierarchicalRecord;
use crate::value::{Key, SqlValue};

use super::{Hierarchy, HierarchyQuery};

impl<R: HierarchicalRecord> Hierarchy<R> {
    /// Every ancestor of `subject`, nearest first in depth terms: the parent
    /// at depth -1, the grandparent at -2, up to the root.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HierarchyError::MissingAttribute`] if `subject`
    /// lacks its parent key column.
    pub fn ancestors(&self, subject: &R) -> Result<HierarchyQuery<R>> {
        let anchor = subject.nullable_key(&self.config.parent_key)?;
        self.ancestors_from(anchor, -1, None)
    }

    /// `subject` at depth 0 followed by its ancestors.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HierarchyError::MissingAttribute`] if `subject`
    /// lacks its local key.
    pub fn ancestors_and_self(&self, subject: &R) -> Result<HierarchyQuery<R>> {
        let anchor = subject.key(&self.config.local_key)?;
        self.ancestors_from(Some(anchor), 0, None)
    }

    /// `subject` and its parent: ancestors-and-self cut at depth -1.
    ///
    /// # Errors
    ///
    /// Same as [`Hierarchy::ancestors_and_self`].
    pub fn parent_and_self(&self, subject: &R) -> Result<HierarchyQuery<R>> {
        let anchor = subject.key(&self.config.local_key)?;
        let mut query = self.ancestors_from(Some(anchor), 0, Some(2))?;
        query.where_depth(ComparisonOp::Ge, -1);
        Ok(query)
    }

    /// Ascending expression seeded on `anchor`. A missing anchor (the
    /// parent of a root) seeds nothing, so the expression yields no rows.
    fn ancestors_from(
        &self,
        anchor: Option<Key>,
        initial_depth: i64,
        max_depth: Option<i64>,
    ) -> Result<HierarchyQuery<R>> {
        let local_key = self.config.local_key.clone();
        self.with_relationship_expression(
            Direction::Ascending,
            move |seed| {
                let column = seed.qualify(&local_key);
                match anchor {
                    Some(key) => seed.where_eq(&column, key),
                    None => seed.where_in(&column, Vec::<SqlValue>::new()),
                };
            },
            initial_depth,
            None,
            max_depth,
        )
    }
}
