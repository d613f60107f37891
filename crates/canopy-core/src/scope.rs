//! Composable predicates and orderings for traversal queries.
//!
//! Each scope adds one clause to a [`HierarchyQuery`] and can be combined
//! with any other scope or raw predicate. `has_children` and `is_leaf` are
//! correlated subqueries against the base table, so they work on a plain
//! table query and on a recursive expression alike.

use std::fmt;
use std::str::FromStr;

use crate::query::{ComparisonOp, Fragment, Order, SelectQuery, Source};
use crate::record::HierarchicalRecord;
use crate::relations::HierarchyQuery;

/// A named scope, for callers that select scopes at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    HasChildren,
    HasParent,
    IsLeaf,
    IsRoot,
    BreadthFirst,
    DepthFirst,
    /// `depth <op> value`, written `depth<=2` and the like.
    WhereDepth(ComparisonOp, i64),
}

impl Scope {
    /// Add this scope to `query`.
    pub fn apply<R: HierarchicalRecord>(self, query: &mut HierarchyQuery<R>) {
        match self {
            Self::HasChildren => query.has_children(),
            Self::HasParent => query.has_parent(),
            Self::IsLeaf => query.is_leaf(),
            Self::IsRoot => query.is_root(),
            Self::BreadthFirst => query.breadth_first(),
            Self::DepthFirst => query.depth_first(),
            Self::WhereDepth(op, value) => query.where_depth(op, value),
        };
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HasChildren => f.write_str("has-children"),
            Self::HasParent => f.write_str("has-parent"),
            Self::IsLeaf => f.write_str("is-leaf"),
            Self::IsRoot => f.write_str("is-root"),
            Self::BreadthFirst => f.write_str("breadth-first"),
            Self::DepthFirst => f.write_str("depth-first"),
            Self::WhereDepth(op, value) => write!(f, "depth{op}{value}"),
        }
    }
}

impl FromStr for Scope {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        let trimmed = s.trim();
        let normalized: String = trimmed
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .flat_map(char::to_lowercase)
            .collect();
        match normalized.as_str() {
            "haschildren" => return Ok(Self::HasChildren),
            "hasparent" => return Ok(Self::HasParent),
            "isleaf" | "leaves" => return Ok(Self::IsLeaf),
            "isroot" | "roots" => return Ok(Self::IsRoot),
            "breadthfirst" | "bfs" => return Ok(Self::BreadthFirst),
            "depthfirst" | "dfs" => return Ok(Self::DepthFirst),
            _ => {}
        }

        let Some(rest) = trimmed.strip_prefix("depth") else {
            anyhow::bail!(
                "unknown scope '{trimmed}': expected has-children, has-parent, is-leaf, \
                 is-root, breadth-first, depth-first or depth<op><n>"
            );
        };
        let split = rest
            .find(|c: char| c == '-' || c.is_ascii_digit())
            .ok_or_else(|| anyhow::anyhow!("missing depth value in '{trimmed}'"))?;
        let (op, value) = rest.split_at(split);
        let op: ComparisonOp = op.parse()?;
        let value: i64 = value
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid depth value in '{trimmed}'"))?;
        Ok(Self::WhereDepth(op, value))
    }
}

impl<R: HierarchicalRecord> HierarchyQuery<R> {
    /// Rows whose parent key is set.
    pub fn has_parent(&mut self) -> &mut Self {
        let column = self.query.qualify(&self.config.parent_key);
        self.query.where_not_null(&column);
        self
    }

    /// Rows whose parent key is null.
    pub fn is_root(&mut self) -> &mut Self {
        let column = self.query.qualify(&self.config.parent_key);
        self.query.where_null(&column);
        self
    }

    /// Rows referenced by at least one other row's parent key.
    pub fn has_children(&mut self) -> &mut Self {
        let children = self.children_subquery();
        self.query.where_exists(&children);
        self
    }

    /// Rows no other row points at.
    pub fn is_leaf(&mut self) -> &mut Self {
        let children = self.children_subquery();
        self.query.where_not_exists(&children);
        self
    }

    /// `depth <op> value`. Only meaningful on a recursive query.
    pub fn where_depth(&mut self, op: ComparisonOp, value: i64) -> &mut Self {
        let column = self.query.qualify(&self.config.depth_name);
        self.query.where_cmp(&column, op, value);
        self
    }

    /// Order by depth ascending.
    pub fn breadth_first(&mut self) -> &mut Self {
        let column = self.query.qualify(&self.config.depth_name);
        self.query.order_by(&column, Order::Asc);
        self
    }

    /// Order by path ascending. With text paths this is lexicographic, so
    /// `1.10` sorts before `1.2`.
    pub fn depth_first(&mut self) -> &mut Self {
        let column = self.query.qualify(&self.config.path_name);
        self.query.order_by(&column, Order::Asc);
        self
    }

    /// Apply every scope in order.
    pub fn scoped(&mut self, scopes: &[Scope]) -> &mut Self {
        for scope in scopes {
            scope.apply(self);
        }
        self
    }

    fn children_subquery(&self) -> SelectQuery {
        let config = &self.config;
        let dialect = self.query.dialect();
        let alias = format!("{}_child", config.table);

        let mut children =
            SelectQuery::from_source(dialect, Source::aliased(&config.table, &alias));
        children.select_raw(Fragment::sql("1")).where_raw(Fragment::sql(format!(
            "{} = {}",
            dialect.quote_identifier(&format!("{alias}.{}", config.parent_key)),
            dialect.quote_identifier(&self.query.qualify(&config.local_key)),
        )));
        children
    }
}
