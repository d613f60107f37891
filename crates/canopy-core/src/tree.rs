//! Tree materialization: flat traversal rows to nested records.
//!
//! Rows are partitioned by parent key once. Every row then receives the
//! group keyed by its own local key as its children (an empty group for
//! leaves), and only rows at the minimum depth present are returned at the
//! top level. The minimum is taken from the rows rather than assumed to be
//! zero, so a sub-forest fetched with `tree_of` nests the same way as a
//! whole forest.

use std::collections::HashMap;
use tracing::debug;

use crate::config::HierarchyConfig;
use crate::error::{HierarchyError, Result};
use crate::record::HierarchicalRecord;
use crate::value::Key;

/// Default relation name nested records are attached under.
pub const CHILDREN: &str = "children";

/// A record whose children are still being nested.
struct Frame<R> {
    index: usize,
    cursor: usize,
    children: Vec<R>,
}

impl<R> Frame<R> {
    const fn new(index: usize) -> Self {
        Self {
            index,
            cursor: 0,
            children: Vec::new(),
        }
    }
}

/// Nest `records` under `relation` using the configured key and depth
/// columns. Sibling order follows input order.
///
/// Nesting walks an explicit stack, so chain depth is bounded by memory
/// rather than by the thread's stack.
///
/// # Errors
///
/// Returns [`HierarchyError::MissingAttribute`] if a record lacks its
/// depth, local key or parent key column, and
/// [`HierarchyError::CycleDetected`] if the rows' parent pointers loop
/// back onto a record already being nested.
pub fn to_tree<R: HierarchicalRecord>(
    config: &HierarchyConfig,
    records: &[R],
    relation: &str,
) -> Result<Vec<R>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    let mut depths = Vec::with_capacity(records.len());
    let mut local = Vec::with_capacity(records.len());
    let mut groups: HashMap<Key, Vec<usize>> = HashMap::new();

    for (i, record) in records.iter().enumerate() {
        depths.push(record.integer(&config.depth_name)?);
        local.push(record.key(&config.local_key)?);
        if let Some(parent) = record.nullable_key(&config.parent_key)? {
            groups.entry(parent).or_default().push(i);
        }
    }

    let min_depth = depths.iter().copied().min().unwrap_or_default();
    let children_of = |i: usize| groups.get(&local[i]).map_or(&[][..], Vec::as_slice);
    let mut on_path = vec![false; records.len()];
    let mut stack: Vec<Frame<R>> = Vec::new();
    let mut tree = Vec::new();

    for (root, depth) in depths.iter().enumerate() {
        if *depth != min_depth {
            continue;
        }
        on_path[root] = true;
        stack.push(Frame::new(root));

        while let Some(frame) = stack.last_mut() {
            if let Some(&child) = children_of(frame.index).get(frame.cursor) {
                frame.cursor += 1;
                if on_path[child] {
                    return Err(HierarchyError::CycleDetected(local[child].to_string()));
                }
                on_path[child] = true;
                stack.push(Frame::new(child));
                continue;
            }

            // Every child is nested; attach them and hand the record up.
            let Some(done) = stack.pop() else { break };
            on_path[done.index] = false;
            let mut record = records[done.index].clone();
            record.set_relation(relation, done.children);
            match stack.last_mut() {
                Some(parent) => parent.children.push(record),
                None => tree.push(record),
            }
        }
    }

    debug!(rows = records.len(), roots = tree.len(), min_depth, "materialized tree");
    Ok(tree)
}

/// Count every record reachable through `relation` from `roots`, roots
/// included.
#[must_use]
pub fn count_nodes<R: HierarchicalRecord>(roots: &[R], relation: &str) -> usize {
    let mut pending: Vec<&R> = roots.iter().collect();
    let mut count = 0;
    while let Some(node) = pending.pop() {
        count += 1;
        pending.extend(node.related(relation));
    }
    count
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Node;
    use crate::value::SqlValue;

    fn row(id: i64, parent: Option<i64>, depth: i64) -> Node {
        Node::from_pairs([
            ("id", SqlValue::from(id)),
            ("parent_id", SqlValue::from(parent)),
            ("depth", SqlValue::from(depth)),
        ])
    }

    fn ids(nodes: &[Node]) -> Vec<i64> {
        nodes
            .iter()
            .map(|n| n.attribute("id").and_then(SqlValue::as_i64).expect("id"))
            .collect()
    }

    #[test]
    fn empty_input_gives_empty_tree() {
        let config = HierarchyConfig::new("nodes");
        let tree = to_tree::<Node>(&config, &[], CHILDREN).expect("tree");
        assert!(tree.is_empty());
    }

    #[test]
    fn nests_the_reference_forest() {
        let config = HierarchyConfig::new("nodes");
        let rows = vec![
            row(1, None, 0),
            row(2, Some(1), 1),
            row(3, Some(1), 1),
            row(4, Some(2), 2),
        ];
        let tree = to_tree(&config, &rows, CHILDREN).expect("tree");

        assert_eq!(ids(&tree), vec![1]);
        let root = &tree[0];
        assert_eq!(ids(root.children()), vec![2, 3]);
        assert_eq!(ids(root.children()[0].children()), vec![4]);
        assert_eq!(root.children()[1].relation(CHILDREN), Some(&[][..]));
        assert_eq!(
            root.children()[0].children()[0].relation(CHILDREN),
            Some(&[][..])
        );
        assert_eq!(count_nodes(&tree, CHILDREN), 4);
    }

    #[test]
    fn sub_forest_roots_at_minimum_depth() {
        let config = HierarchyConfig::new("nodes");
        let rows = vec![row(4, Some(2), 2), row(2, Some(1), 1), row(3, Some(1), 1)];
        let tree = to_tree(&config, &rows, CHILDREN).expect("tree");
        assert_eq!(ids(&tree), vec![2, 3]);
        assert_eq!(ids(tree[0].children()), vec![4]);
    }

    #[test]
    fn ancestor_rows_with_negative_depth() {
        let config = HierarchyConfig::new("nodes");
        let rows = vec![row(2, Some(1), -1), row(1, None, -2)];
        let tree = to_tree(&config, &rows, "descendants").expect("tree");
        assert_eq!(ids(&tree), vec![1]);
        assert_eq!(
            ids(tree[0].relation("descendants").expect("relation")),
            vec![2]
        );
    }

    #[test]
    fn preserves_sibling_input_order() {
        let config = HierarchyConfig::new("nodes");
        let rows = vec![row(1, None, 0), row(9, Some(1), 1), row(5, Some(1), 1), row(7, Some(1), 1)];
        let tree = to_tree(&config, &rows, CHILDREN).expect("tree");
        assert_eq!(ids(tree[0].children()), vec![9, 5, 7]);
    }

    #[test]
    fn missing_depth_is_reported() {
        let config = HierarchyConfig::new("nodes");
        let rows = vec![Node::from_pairs([("id", SqlValue::from(1))])];
        let err = to_tree(&config, &rows, CHILDREN).expect_err("missing depth");
        assert!(matches!(err, HierarchyError::MissingAttribute(name) if name == "depth"));
    }

    #[test]
    fn in_memory_cycle_is_reported() {
        let config = HierarchyConfig::new("nodes");
        let rows = vec![row(1, Some(2), 0), row(2, Some(1), 1)];
        let err = to_tree(&config, &rows, CHILDREN).expect_err("cycle");
        assert!(matches!(err, HierarchyError::CycleDetected(_)));
    }

    #[test]
    fn deep_chain_nests_without_exhausting_the_stack() {
        const LEN: i64 = 60_000;
        let config = HierarchyConfig::new("nodes");
        let rows: Vec<Node> = (1..=LEN)
            .map(|id| row(id, (id > 1).then(|| id - 1), id - 1))
            .collect();

        let tree = to_tree(&config, &rows, CHILDREN).expect("tree");
        assert_eq!(ids(&tree), vec![1]);
        assert_eq!(count_nodes(&tree, CHILDREN), rows.len());

        let mut cursor = &tree[0];
        while let Some(next) = cursor.children().first() {
            cursor = next;
        }
        assert_eq!(cursor.attribute("id").and_then(SqlValue::as_i64), Some(LEN));
        assert_eq!(cursor.relation(CHILDREN), Some(&[][..]));
    }
}
