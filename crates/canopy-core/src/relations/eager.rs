//! Eager loading: one traversal for many subjects.
//!
//! All anchors are seeded at once with `local_key IN (...)`. Each returned
//! row's path starts with the key of the anchor it was reached from, so the
//! first path segment routes the row back to its subject. Anchors whose
//! rendered key is not a single unambiguous segment are rejected up front.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;

use tracing::debug;

use crate::config::PathEncoding;
use crate::error::{HierarchyError, Result};
use crate::executor::Executor;
use crate::expression::Direction;
use crate::query::ComparisonOp;
use crate::record::HierarchicalRecord;
use crate::value::{Key, SqlValue};

use super::Hierarchy;

/// Relations that can be eager loaded for a batch of subjects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EagerRelation {
    Ancestors,
    AncestorsAndSelf,
    Descendants,
    DescendantsAndSelf,
}

impl EagerRelation {
    const fn direction(self) -> Direction {
        match self {
            Self::Ancestors | Self::AncestorsAndSelf => Direction::Ascending,
            Self::Descendants | Self::DescendantsAndSelf => Direction::Descending,
        }
    }

    /// Relation name the loaded rows are attached under.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Ancestors => "ancestors",
            Self::AncestorsAndSelf => "ancestors_and_self",
            Self::Descendants => "descendants",
            Self::DescendantsAndSelf => "descendants_and_self",
        }
    }
}

impl fmt::Display for EagerRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EagerRelation {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "ancestors" => Ok(Self::Ancestors),
            "ancestors_and_self" => Ok(Self::AncestorsAndSelf),
            "descendants" => Ok(Self::Descendants),
            "descendants_and_self" => Ok(Self::DescendantsAndSelf),
            other => anyhow::bail!("unknown eager relation '{other}'"),
        }
    }
}

impl<R: HierarchicalRecord> Hierarchy<R> {
    /// Load `relation` for every subject with a single query.
    ///
    /// The result is aligned with `subjects`: entry `i` holds subject `i`'s
    /// related rows in the order the engine returned them.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError::UnsupportedDialectFeature`] unless paths
    /// are text encoded or if an anchor key is real-valued,
    /// [`HierarchyError::InvalidConfig`] if an anchor key contains the path
    /// separator, [`HierarchyError::MissingAttribute`] if a subject lacks a
    /// key column, or the executor's error.
    pub fn eager_load<E: Executor + ?Sized>(
        &self,
        relation: EagerRelation,
        subjects: &[R],
        executor: &E,
    ) -> Result<Vec<Vec<R>>> {
        if self.config.path_encoding != PathEncoding::Text {
            return Err(HierarchyError::UnsupportedDialectFeature {
                dialect: self.dialect,
                feature: "eager loading over non-text paths",
            });
        }

        let anchors = subjects
            .iter()
            .map(|subject| match relation {
                EagerRelation::Ancestors => subject.nullable_key(&self.config.parent_key),
                _ => subject.key(&self.config.local_key).map(Some),
            })
            .collect::<Result<Vec<Option<Key>>>>()?;

        let distinct: BTreeSet<&Key> = anchors.iter().flatten().collect();
        for key in &distinct {
            self.check_routable(key)?;
        }
        let mut grouped: HashMap<String, Vec<R>> = HashMap::new();

        if !distinct.is_empty() {
            let seeds: Vec<SqlValue> = distinct.into_iter().cloned().map(SqlValue::from).collect();
            let initial_depth = match relation {
                EagerRelation::Ancestors => -1,
                _ => 0,
            };
            let local_key = self.config.local_key.clone();
            let mut query = self.with_relationship_expression(
                relation.direction(),
                move |seed| {
                    let column = seed.qualify(&local_key);
                    seed.where_in(&column, seeds);
                },
                initial_depth,
                None,
                None,
            )?;
            if relation == EagerRelation::Descendants {
                query.where_depth(ComparisonOp::Gt, 0);
            }

            let rows = query.get(executor)?;
            debug!(%relation, subjects = subjects.len(), rows = rows.len(), "eager loaded");
            for row in rows {
                let anchor = self.first_path_segment(&row)?;
                grouped.entry(anchor).or_default().push(row);
            }
        }

        Ok(anchors
            .iter()
            .map(|anchor| {
                anchor
                    .as_ref()
                    .and_then(|key| grouped.get(&key.to_string()))
                    .cloned()
                    .unwrap_or_default()
            })
            .collect())
    }

    /// An anchor's rows are matched by the key's text as the first path
    /// segment, so that text must survive the round trip through the path.
    fn check_routable(&self, key: &Key) -> Result<()> {
        if matches!(key, Key::Real(_)) {
            return Err(HierarchyError::UnsupportedDialectFeature {
                dialect: self.dialect,
                feature: "eager loading by real-valued keys",
            });
        }
        let separator = self.config.path_separator.as_str();
        if key.to_string().contains(separator) {
            return Err(HierarchyError::InvalidConfig(format!(
                "key '{key}' contains the path separator '{separator}' and cannot be eager loaded"
            )));
        }
        Ok(())
    }

    /// [`Hierarchy::eager_load`], attaching each subject's rows under the
    /// relation's name.
    ///
    /// # Errors
    ///
    /// Same as [`Hierarchy::eager_load`].
    pub fn eager_attach<E: Executor + ?Sized>(
        &self,
        relation: EagerRelation,
        subjects: &mut [R],
        executor: &E,
    ) -> Result<()> {
        let loaded = self.eager_load(relation, subjects, executor)?;
        for (subject, rows) in subjects.iter_mut().zip(loaded) {
            subject.set_relation(relation.name(), rows);
        }
        Ok(())
    }
}
