//! Rows sharing a parent with the subject.

use crate::error::Result;
use crate::expression::Direction;
use crate::query::ComparisonOp;
use crate::record::HierarchicalRecord;

use super::{Hierarchy, HierarchyQuery};

impl<R: HierarchicalRecord> Hierarchy<R> {
    /// Other children of `subject`'s parent. For a root: the other roots.
    ///
    /// # Errors
    ///
    /// Returns [`crate::HierarchyError::MissingAttribute`] if `subject`
    /// lacks its local or parent key column.
    pub fn siblings(&self, subject: &R) -> Result<HierarchyQuery<R>> {
        self.siblings_query(subject, false)
    }

    /// Siblings including `subject` itself.
    ///
    /// # Errors
    ///
    /// Same as [`Hierarchy::siblings`].
    pub fn siblings_and_self(&self, subject: &R) -> Result<HierarchyQuery<R>> {
        self.siblings_query(subject, true)
    }

    /// Non-roots expand their parent one level and keep depth 1. Roots take
    /// the depth-0 seed of a forest expression that never recurses.
    fn siblings_query(&self, subject: &R, and_self: bool) -> Result<HierarchyQuery<R>> {
        let own_key = subject.key(&self.config.local_key)?;
        let parent = subject.nullable_key(&self.config.parent_key)?;

        let mut query = match parent {
            Some(parent) => {
                let local_key = self.config.local_key.clone();
                let mut query = self.with_relationship_expression(
                    Direction::Descending,
                    move |seed| {
                        let column = seed.qualify(&local_key);
                        seed.where_eq(&column, parent);
                    },
                    0,
                    None,
                    Some(2),
                )?;
                query.where_depth(ComparisonOp::Eq, 1);
                query
            }
            None => self.tree(Some(1))?,
        };

        if !and_self {
            let column = query.query.qualify(&self.config.local_key);
            query.query.where_cmp(&column, ComparisonOp::Ne, own_key);
        }
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use crate::config::HierarchyConfig;
    use crate::dialect::Dialect;
    use crate::record::{HierarchicalRecord, Node};
    use crate::relations::Hierarchy;
    use crate::relations::fixtures::forest;

    fn setup() -> (rusqlite::Connection, Hierarchy<Node>) {
        let h = Hierarchy::new(HierarchyConfig::new("nodes"), Dialect::Sqlite).expect("hierarchy");
        (forest(), h)
    }

    fn node(h: &Hierarchy<Node>, conn: &rusqlite::Connection, id: i64) -> Node {
        let mut query = h.query();
        query.query_mut().where_eq("id", id);
        query.first(conn).expect("query").expect("node exists")
    }

    fn sorted_ids(rows: &[Node]) -> Vec<i64> {
        let mut ids: Vec<i64> = rows.iter().map(|n| n.integer("id").expect("id")).collect();
        ids.sort_unstable();
        ids
    }

    #[test]
    fn siblings_share_the_parent() {
        let (conn, h) = setup();
        let four = node(&h, &conn, 4);
        let rows = h.siblings(&four).expect("siblings").get(&conn).expect("rows");
        assert_eq!(sorted_ids(&rows), vec![5]);
        assert!(rows.iter().all(|n| n.integer("depth").expect("depth") == 1));

        let rows = h
            .siblings_and_self(&four)
            .expect("siblings")
            .get(&conn)
            .expect("rows");
        assert_eq!(sorted_ids(&rows), vec![4, 5]);
    }

    #[test]
    fn only_child_has_no_siblings() {
        let (conn, h) = setup();
        let seven = node(&h, &conn, 7);
        assert!(h.siblings(&seven).expect("siblings").get(&conn).expect("rows").is_empty());
    }

    #[test]
    fn root_siblings_are_the_other_roots() {
        let (conn, h) = setup();
        let one = node(&h, &conn, 1);
        let rows = h.siblings(&one).expect("siblings").get(&conn).expect("rows");
        assert_eq!(sorted_ids(&rows), vec![8]);

        let rows = h
            .siblings_and_self(&one)
            .expect("siblings")
            .get(&conn)
            .expect("rows");
        assert_eq!(sorted_ids(&rows), vec![1, 8]);
    }
}
