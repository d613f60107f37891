//! `canopy ancestors|descendants|children|parent|siblings KEY`.

use anyhow::Result;
use canopy_core::{Hierarchy, HierarchyQuery, Node};
use clap::Args;
use std::path::Path;
use tracing::debug;

use super::{GlobalOptions, Session};
use crate::output;

#[derive(Args, Debug)]
pub struct RelationArgs {
    /// Local key of the subject row.
    pub key: String,

    /// Include the subject row itself.
    #[arg(long)]
    pub and_self: bool,
}

/// Per-record relations reachable from the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Ancestors,
    Descendants,
    Children,
    Parent,
    Siblings,
}

impl Relation {
    pub const fn name(self, and_self: bool) -> &'static str {
        match (self, and_self) {
            (Self::Ancestors, false) => "ancestors",
            (Self::Ancestors, true) => "ancestors and self",
            (Self::Descendants, false) => "descendants",
            (Self::Descendants, true) => "descendants and self",
            (Self::Children, false) => "children",
            (Self::Children, true) => "children and self",
            (Self::Parent, false) => "parent",
            (Self::Parent, true) => "parent and self",
            (Self::Siblings, false) => "siblings",
            (Self::Siblings, true) => "siblings and self",
        }
    }

    /// Build the query for `subject`.
    pub fn query(
        self,
        hierarchy: &Hierarchy<Node>,
        subject: &Node,
        and_self: bool,
    ) -> canopy_core::Result<HierarchyQuery<Node>> {
        match (self, and_self) {
            (Self::Ancestors, false) => hierarchy.ancestors(subject),
            (Self::Ancestors, true) => hierarchy.ancestors_and_self(subject),
            (Self::Descendants, false) => hierarchy.descendants(subject),
            (Self::Descendants, true) => hierarchy.descendants_and_self(subject),
            (Self::Children, false) => hierarchy.children(subject),
            (Self::Children, true) => hierarchy.children_and_self(subject),
            (Self::Parent, false) => hierarchy.parent(subject),
            (Self::Parent, true) => hierarchy.parent_and_self(subject),
            (Self::Siblings, false) => hierarchy.siblings(subject),
            (Self::Siblings, true) => hierarchy.siblings_and_self(subject),
        }
    }
}

pub fn run_relation(
    relation: Relation,
    args: &RelationArgs,
    opts: &GlobalOptions,
    cwd: &Path,
) -> Result<()> {
    let session = Session::open(opts, cwd)?;
    let subject = session.subject(&args.key)?;
    let query = session.scoped(relation.query(&session.hierarchy, &subject, args.and_self)?);
    let rows = query.get(&session.conn)?;
    debug!(relation = relation.name(args.and_self), rows = rows.len(), "relation loaded");

    let heading = format!("{} of {}", relation.name(args.and_self), args.key);
    output::to_stdout(|w| output::write_rows(w, opts.output, &heading, &rows, session.view()))
}
