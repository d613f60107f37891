use canopy_core::{
    CHILDREN, Dialect, HierarchicalRecord, Hierarchy, HierarchyConfig, Key, Node, SqlValue,
    count_nodes, to_tree,
};
use proptest::prelude::*;
use std::collections::BTreeSet;

use generators::*;

fn hierarchy() -> Hierarchy<Node> {
    Hierarchy::new(HierarchyConfig::new("nodes"), Dialect::Sqlite).expect("hierarchy")
}

fn fetch(h: &Hierarchy<Node>, conn: &rusqlite::Connection, id: i64) -> Node {
    let mut query = h.query();
    query.query_mut().where_eq("id", id);
    query.first(conn).expect("query").expect("row exists")
}

fn child_ids(node: &Node) -> Vec<i64> {
    node.children()
        .iter()
        .map(|c| c.integer("id").expect("id"))
        .collect()
}

fn check_children(forest: &Forest, nodes: &[Node]) -> Result<(), TestCaseError> {
    for node in nodes {
        let id = node.integer("id").expect("id");
        prop_assert_eq!(child_ids(node), forest.children_of(id));
        check_children(forest, node.children())?;
    }
    Ok(())
}

proptest! {
    #![proptest_config(proptest::test_runner::Config::with_cases(64))]

    #[test]
    fn to_tree_reaches_every_row_once(forest in arb_forest(40)) {
        let rows = forest.rows();
        let config = HierarchyConfig::new("nodes");
        let roots = to_tree(&config, &rows, CHILDREN).expect("acyclic");

        prop_assert_eq!(count_nodes(&roots, CHILDREN), rows.len());
        for root in &roots {
            prop_assert!(root.attribute("parent_id").is_some_and(SqlValue::is_null));
        }
        check_children(&forest, &roots)?;
    }

    #[test]
    fn descendants_match_in_memory_closure(forest in arb_forest(25), pick in any::<prop::sample::Index>()) {
        let conn = forest.seed();
        let h = hierarchy();
        let ids: Vec<i64> = forest.ids().collect();
        let subject_id = ids[pick.index(ids.len())];
        let subject = fetch(&h, &conn, subject_id);

        let rows = h.descendants(&subject).expect("descendants").get(&conn).expect("rows");
        let got: BTreeSet<(i64, i64)> = rows
            .iter()
            .map(|n| (n.integer("id").expect("id"), n.integer("depth").expect("depth")))
            .collect();
        prop_assert_eq!(rows.len(), got.len());
        prop_assert_eq!(got, forest.closure(subject_id));

        for row in &rows {
            let id = row.integer("id").expect("id");
            let expected_path = forest.path(subject_id, id);
            prop_assert_eq!(
                row.attribute("path").and_then(SqlValue::as_text),
                Some(expected_path.as_str())
            );
        }
    }

    #[test]
    fn ancestors_climb_one_level_per_step(forest in arb_forest(25), pick in any::<prop::sample::Index>()) {
        let conn = forest.seed();
        let h = hierarchy();
        let ids: Vec<i64> = forest.ids().collect();
        let subject_id = ids[pick.index(ids.len())];
        let subject = fetch(&h, &conn, subject_id);

        let rows = h.ancestors(&subject).expect("ancestors").get(&conn).expect("rows");
        let mut got: Vec<(i64, i64)> = rows
            .iter()
            .map(|n| (n.integer("id").expect("id"), n.integer("depth").expect("depth")))
            .collect();
        got.sort_by_key(|(_, depth)| -depth);
        prop_assert_eq!(got, forest.chain(subject_id));

        let root = h
            .root_ancestor(&subject)
            .expect("root_ancestor")
            .first(&conn)
            .expect("query")
            .expect("always one row");
        let expected_root = forest.chain(subject_id).last().map_or(subject_id, |(id, _)| *id);
        prop_assert_eq!(root.key("id").expect("id"), Key::Integer(expected_root));
    }

    #[test]
    fn siblings_share_parent_and_exclude_self(forest in arb_forest(25), pick in any::<prop::sample::Index>()) {
        let conn = forest.seed();
        let h = hierarchy();
        let ids: Vec<i64> = forest.ids().collect();
        let subject_id = ids[pick.index(ids.len())];
        let subject = fetch(&h, &conn, subject_id);

        let mut got: Vec<i64> = h
            .siblings(&subject)
            .expect("siblings")
            .get(&conn)
            .expect("rows")
            .iter()
            .map(|n| n.integer("id").expect("id"))
            .collect();
        got.sort_unstable();

        let parent = forest.parent_of(subject_id);
        let expected: Vec<i64> = forest
            .ids()
            .filter(|id| *id != subject_id && forest.parent_of(*id) == parent)
            .collect();
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn bounded_tree_never_reaches_max_depth(forest in arb_forest(30), max_depth in 1i64..4) {
        let conn = forest.seed();
        let rows = hierarchy()
            .tree(Some(max_depth))
            .expect("tree")
            .get(&conn)
            .expect("rows");
        prop_assert!(rows.iter().all(|n| n.integer("depth").expect("depth") < max_depth));

        let expected = forest.rows().iter().filter(|n| n.integer("depth").expect("depth") < max_depth).count();
        prop_assert_eq!(rows.len(), expected);
    }
}
