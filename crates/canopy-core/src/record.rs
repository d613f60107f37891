//! Records the traversal engine can read keys from and attach children to.

use serde::Serialize;
use serde::ser::{SerializeMap, Serializer};
use std::collections::BTreeMap;

use crate::error::{HierarchyError, Result};
use crate::value::{Attributes, Key, SqlValue};

/// Capability an entity type implements to take part in traversals.
///
/// The engine only needs attribute access by column name, a way to build
/// the record from one result row, and a way to hang a nested collection
/// off a record in memory.
pub trait HierarchicalRecord: Clone + Sized {
    /// Build a record from one result row.
    ///
    /// # Errors
    ///
    /// Returns an error if a column the record requires is missing or has
    /// the wrong type.
    fn from_attributes(attributes: Attributes) -> Result<Self>;

    /// The value of column `name`, or `None` if the record does not carry it.
    fn attribute(&self, name: &str) -> Option<&SqlValue>;

    /// Attach `children` under relation `relation`, replacing any previous
    /// collection under that name.
    fn set_relation(&mut self, relation: &str, children: Vec<Self>);

    /// Records attached under `relation`; empty if nothing was attached.
    fn related(&self, relation: &str) -> &[Self];

    /// The non-null key stored in column `name`.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError::MissingAttribute`] if the column is absent
    /// or `NULL`.
    fn key(&self, name: &str) -> Result<Key> {
        self.attribute(name)
            .and_then(SqlValue::as_key)
            .ok_or_else(|| HierarchyError::MissingAttribute(name.to_string()))
    }

    /// The key stored in column `name`, `None` when the column is `NULL`.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError::MissingAttribute`] if the column is absent.
    fn nullable_key(&self, name: &str) -> Result<Option<Key>> {
        self.attribute(name)
            .map(SqlValue::as_key)
            .ok_or_else(|| HierarchyError::MissingAttribute(name.to_string()))
    }

    /// The integer stored in column `name`.
    ///
    /// # Errors
    ///
    /// Returns [`HierarchyError::MissingAttribute`] if the column is absent
    /// or not an integer.
    fn integer(&self, name: &str) -> Result<i64> {
        self.attribute(name)
            .and_then(SqlValue::as_i64)
            .ok_or_else(|| HierarchyError::MissingAttribute(name.to_string()))
    }
}

/// A schemaless row: every selected column plus any attached relations.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Node {
    attributes: Attributes,
    relations: BTreeMap<String, Vec<Node>>,
}

impl Node {
    #[must_use]
    pub const fn new(attributes: Attributes) -> Self {
        Self {
            attributes,
            relations: BTreeMap::new(),
        }
    }

    /// Build a node from `(column, value)` pairs.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<SqlValue>,
    {
        Self::new(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    #[must_use]
    pub const fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn set_attribute(&mut self, name: &str, value: impl Into<SqlValue>) {
        self.attributes.insert(name.to_string(), value.into());
    }

    /// Records attached under `relation`, `None` if nothing was attached.
    #[must_use]
    pub fn relation(&self, relation: &str) -> Option<&[Self]> {
        self.relations.get(relation).map(Vec::as_slice)
    }

    /// Records attached under `children`; empty if nothing was attached.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        self.relation("children").unwrap_or_default()
    }
}

impl Drop for Node {
    /// Unlinks nested relations onto a heap stack before they drop, so a
    /// deep chain is not torn down one stack frame per level.
    fn drop(&mut self) {
        let mut pending: Vec<Self> = Vec::new();
        for children in self.relations.values_mut() {
            pending.append(children);
        }
        while let Some(mut node) = pending.pop() {
            for children in node.relations.values_mut() {
                pending.append(children);
            }
        }
    }
}

impl HierarchicalRecord for Node {
    fn from_attributes(attributes: Attributes) -> Result<Self> {
        Ok(Self::new(attributes))
    }

    fn attribute(&self, name: &str) -> Option<&SqlValue> {
        self.attributes.get(name)
    }

    fn set_relation(&mut self, relation: &str, children: Vec<Self>) {
        self.relations.insert(relation.to_string(), children);
    }

    fn related(&self, relation: &str) -> &[Self] {
        self.relation(relation).unwrap_or_default()
    }
}

impl Serialize for Node {
    /// Attributes and relations flattened into one map; relation names win
    /// over same-named columns.
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let shadowed = self
            .attributes
            .keys()
            .filter(|k| self.relations.contains_key(*k))
            .count();
        let mut map =
            serializer.serialize_map(Some(self.attributes.len() + self.relations.len() - shadowed))?;
        for (name, value) in &self.attributes {
            if !self.relations.contains_key(name) {
                map.serialize_entry(name, value)?;
            }
        }
        for (name, children) in &self.relations {
            map.serialize_entry(name, children)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_helpers_distinguish_missing_from_null() {
        let node = Node::from_pairs([
            ("id", SqlValue::from(2)),
            ("parent_id", SqlValue::Null),
        ]);
        assert_eq!(node.key("id").expect("id"), Key::Integer(2));
        assert_eq!(node.nullable_key("parent_id").expect("parent"), None);
        assert!(matches!(
            node.nullable_key("owner_id"),
            Err(HierarchyError::MissingAttribute(name)) if name == "owner_id"
        ));
        assert!(node.key("parent_id").is_err());
    }

    #[test]
    fn serializes_relations_next_to_attributes() {
        let mut root = Node::from_pairs([("id", SqlValue::from(1))]);
        root.set_relation("children", vec![Node::from_pairs([("id", SqlValue::from(2))])]);
        let value = serde_json::to_value(&root).expect("serialize");
        assert_eq!(value, json!({"id": 1, "children": [{"id": 2}]}));
    }

    #[test]
    fn dropping_a_deep_chain_is_flat() {
        let mut chain = Node::from_pairs([("id", SqlValue::from(0))]);
        for id in 1..100_000 {
            let mut parent = Node::from_pairs([("id", SqlValue::from(id))]);
            parent.set_relation("children", vec![chain]);
            chain = parent;
        }
        drop(chain);
    }

    #[test]
    fn children_default_to_empty() {
        let node = Node::from_pairs([("id", SqlValue::from(1))]);
        assert!(node.children().is_empty());
        assert!(node.relation("children").is_none());
    }
}
