//! canopy-core library.
//!
//! Recursive traversals over adjacency-list hierarchies: a table where each
//! row stores the key of its parent. Every traversal is one recursive common
//! table expression annotated with a signed depth and a materialized path,
//! so ancestors, descendants, siblings and whole forests come back from a
//! single round trip and can be nested in memory with [`tree::to_tree`].
//!
//! ```no_run
//! use canopy_core::{Dialect, Hierarchy, HierarchyConfig, Node, CHILDREN};
//!
//! # fn main() -> canopy_core::Result<()> {
//! let conn = rusqlite::Connection::open("tree.db")?;
//! let hierarchy = Hierarchy::<Node>::new(HierarchyConfig::new("nodes"), Dialect::Sqlite)?;
//! let forest = hierarchy.tree(Some(3))?.get_tree(&conn, CHILDREN)?;
//! # let _ = forest;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod dialect;
pub mod error;
pub mod executor;
pub mod expression;
pub mod query;
pub mod record;
pub mod relations;
pub mod scope;
pub mod tree;
pub mod value;

/// # Conventions
///
/// - **Errors**: Traversal APIs return [`error::Result`]; configuration
///   loading and string parsing return `anyhow::Result`.
/// - **Logging**: Use `tracing` macros (`debug!`, `trace!`). Rendered SQL is
///   logged at `debug`, expression construction at `trace`.
pub use config::{CustomPath, HierarchyConfig, PathEncoding, load_hierarchy_config};
pub use dialect::Dialect;
pub use error::{ErrorCode, HierarchyError, Result};
pub use executor::Executor;
pub use expression::{Direction, ExpressionBuilder};
pub use query::{ComparisonOp, Fragment, Order, RenderedQuery, SelectQuery, Source};
pub use record::{HierarchicalRecord, Node};
pub use relations::{EagerRelation, Hierarchy, HierarchyQuery, RelatedQuery};
pub use scope::Scope;
pub use tree::{CHILDREN, count_nodes, to_tree};
pub use value::{Attributes, Key, SqlValue};
