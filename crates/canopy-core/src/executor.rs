//! Storage boundary.
//!
//! An [`Executor`] runs one rendered query synchronously and buffers the
//! whole result set. Timeouts, cancellation and recursion limits belong to
//! the underlying client.

use rusqlite::{Connection, params_from_iter};
use tracing::debug;

use crate::dialect::Dialect;
use crate::error::{HierarchyError, Result};
use crate::query::RenderedQuery;
use crate::value::{Attributes, SqlValue};

pub trait Executor {
    /// Dialect this executor's engine speaks.
    fn dialect(&self) -> Dialect;

    /// Run `query` and return every row keyed by column name.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError::DialectMismatch`] if `query` was rendered
    /// for another dialect, or the engine's own error.
    fn fetch_all(&self, query: &RenderedQuery) -> Result<Vec<Attributes>>;
}

impl Executor for Connection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn fetch_all(&self, query: &RenderedQuery) -> Result<Vec<Attributes>> {
        ensure_dialect(self, query)?;
        debug!(sql = %query.sql, bindings = query.bindings.len(), "executing traversal query");

        let mut stmt = self.prepare(&query.sql)?;
        let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

        let rows = stmt.query_map(params_from_iter(query.bindings.iter()), |row| {
            let mut attributes = Attributes::new();
            for (i, name) in names.iter().enumerate() {
                attributes.insert(name.clone(), SqlValue::from_value_ref(row.get_ref(i)?));
            }
            Ok(attributes)
        })?;

        let rows = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        debug!(rows = rows.len(), "traversal query returned");
        Ok(rows)
    }
}

/// Reject a query rendered for a dialect other than `executor`'s.
///
/// # Errors
///
/// Returns [`HierarchyError::DialectMismatch`] on mismatch.
pub fn ensure_dialect<E: Executor + ?Sized>(executor: &E, query: &RenderedQuery) -> Result<()> {
    if query.dialect == executor.dialect() {
        Ok(())
    } else {
        Err(HierarchyError::DialectMismatch {
            query: query.dialect,
            executor: executor.dialect(),
        })
    }
}
