//! The topmost ancestor.

use crate::error::Result;
use crate::query::Order;
use crate::record::HierarchicalRecord;

use super::{Hierarchy, HierarchyQuery};

impl<R: HierarchicalRecord> Hierarchy<R> {
    /// The minimum-depth row of ancestors-and-self, limited to one row.
    /// A root is its own root ancestor. Fetch it with
    /// [`HierarchyQuery::first`].
    ///
    /// # Errors
    ///
    /// Returns [`crate::HierarchyError::MissingAttribute`] if `subject`
    /// lacks its local key.
    pub fn root_ancestor(&self, subject: &R) -> Result<HierarchyQuery<R>> {
        let mut query = self.ancestors_and_self(subject)?;
        let depth = query.query.qualify(&self.config.depth_name);
        query.query.order_by(&depth, Order::Asc).limit(1);
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

    #[test]
    fn deep_node_resolves_to_its_root() {
        let (conn, h) = setup();
        let seven = node(&h, &conn, 7);
        let root = h
            .root_ancestor(&seven)
            .expect("root_ancestor")
            .first(&conn)
            .expect("query")
            .expect("root");
        assert_eq!(root.integer("id").expect("id"), 1);
        assert_eq!(root.integer("depth").expect("depth"), -3);
    }

    #[test]
    fn root_is_its_own_root_ancestor() {
        let (conn, h) = setup();
        let eight = node(&h, &conn, 8);
        let root = h
            .root_ancestor(&eight)
            .expect("root_ancestor")
            .first(&conn)
            .expect("query")
            .expect("root");
        assert_eq!(root.integer("id").expect("id"), 8);
        assert_eq!(root.integer("depth").expect("depth"), 0);
    }

    #[test]
    fn sql_server_limits_with_top() {
        let h = Hierarchy::<Node>::new(HierarchyConfig::new("nodes"), Dialect::SqlServer)
            .expect("hierarchy");
        let subject = Node::from_pairs([("id", 3)]);
        let sql = h.root_ancestor(&subject).expect("root_ancestor").to_sql().sql;
        assert!(sql.starts_with("WITH [canopy_cte] AS ("));
        assert!(sql.contains(") SELECT TOP 1 * FROM [canopy_cte]"));
        assert!(sql.ends_with("ORDER BY [canopy_cte].[depth] ASC"));
    }
}
