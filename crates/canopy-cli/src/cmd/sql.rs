//! `canopy sql RELATION [KEY]`: print a traversal's SQL without running it.

use anyhow::{Context as _, Result};
use canopy_core::{Dialect, Hierarchy, HierarchyQuery, Node, SqlValue};
use clap::{Args, ValueEnum};
use std::path::Path;

use super::relation::Relation;
use super::{GlobalOptions, parse_key, resolve_config};
use crate::output;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum PreviewRelation {
    Tree,
    Ancestors,
    AncestorsAndSelf,
    Descendants,
    DescendantsAndSelf,
    Children,
    ChildrenAndSelf,
    Parent,
    ParentAndSelf,
    Siblings,
    SiblingsAndSelf,
    Root,
}

impl PreviewRelation {
    const fn per_record(self) -> Option<(Relation, bool)> {
        match self {
            Self::Tree | Self::Root => None,
            Self::Ancestors => Some((Relation::Ancestors, false)),
            Self::AncestorsAndSelf => Some((Relation::Ancestors, true)),
            Self::Descendants => Some((Relation::Descendants, false)),
            Self::DescendantsAndSelf => Some((Relation::Descendants, true)),
            Self::Children => Some((Relation::Children, false)),
            Self::ChildrenAndSelf => Some((Relation::Children, true)),
            Self::Parent => Some((Relation::Parent, false)),
            Self::ParentAndSelf => Some((Relation::Parent, true)),
            Self::Siblings => Some((Relation::Siblings, false)),
            Self::SiblingsAndSelf => Some((Relation::Siblings, true)),
        }
    }
}

#[derive(Args, Debug)]
pub struct SqlArgs {
    /// Relation to render.
    #[arg(value_enum)]
    pub relation: PreviewRelation,

    /// Local key of the subject row. Required for every relation but `tree`.
    pub key: Option<String>,

    /// Parent key of the subject row; omitted means the subject is a root.
    #[arg(long)]
    pub parent: Option<String>,

    /// Dialect to render for.
    #[arg(long, default_value = "sqlite")]
    pub dialect: Dialect,

    /// Depth bound for `tree`.
    #[arg(long)]
    pub max_depth: Option<i64>,
}

/// Build the preview query. The subject is synthesized from the key
/// arguments, so no database is needed.
pub fn preview_query(args: &SqlArgs, hierarchy: &Hierarchy<Node>) -> Result<HierarchyQuery<Node>> {
    if args.relation == PreviewRelation::Tree {
        return Ok(hierarchy.tree(args.max_depth)?);
    }

    let key = args
        .key
        .as_deref()
        .with_context(|| format!("{:?} needs a KEY", args.relation))?;
    let config = hierarchy.config();
    let subject = Node::from_pairs([
        (config.local_key.clone(), parse_key(key)),
        (
            config.parent_key.clone(),
            args.parent.as_deref().map_or(SqlValue::Null, parse_key),
        ),
    ]);

    let query = match args.relation.per_record() {
        Some((relation, and_self)) => relation.query(hierarchy, &subject, and_self)?,
        None => hierarchy.root_ancestor(&subject)?,
    };
    Ok(query)
}

pub fn run_sql(args: &SqlArgs, opts: &GlobalOptions, cwd: &Path) -> Result<()> {
    let config = resolve_config(opts, cwd)?;
    let hierarchy = Hierarchy::<Node>::new(config, args.dialect)?;
    let mut query = preview_query(args, &hierarchy)?;
    query.scoped(&opts.scopes);
    let rendered = query.to_sql();
    output::to_stdout(|w| output::write_sql(w, opts.output, &rendered))
}
