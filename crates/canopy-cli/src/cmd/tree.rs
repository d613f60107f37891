//! `canopy tree`: the whole forest, or the subtree under one key.

use anyhow::Result;
use canopy_core::CHILDREN;
use clap::Args;
use std::path::Path;
use tracing::debug;

use super::{GlobalOptions, Session, parse_key};
use crate::output;

#[derive(Args, Debug)]
pub struct TreeArgs {
    /// Stop expanding at this depth; rows at or beyond it are not returned.
    #[arg(long)]
    pub max_depth: Option<i64>,

    /// Root the tree at this key instead of at every parentless row.
    #[arg(long)]
    pub root_key: Option<String>,

    /// Print the traversal rows without nesting them.
    #[arg(long)]
    pub flat: bool,
}

pub fn run_tree(args: &TreeArgs, opts: &GlobalOptions, cwd: &Path) -> Result<()> {
    let session = Session::open(opts, cwd)?;
    let hierarchy = &session.hierarchy;

    let query = match &args.root_key {
        Some(key) => {
            let local_key = hierarchy.config().local_key.clone();
            let value = parse_key(key);
            hierarchy.tree_of(
                move |seed| {
                    let column = seed.qualify(&local_key);
                    seed.where_eq(&column, value);
                },
                args.max_depth,
            )?
        }
        None => hierarchy.tree(args.max_depth)?,
    };
    let query = session.scoped(query);

    if args.flat {
        let rows = query.get(&session.conn)?;
        return output::to_stdout(|w| {
            output::write_rows(w, opts.output, "tree", &rows, session.view())
        });
    }

    let roots = query.get_tree(&session.conn, CHILDREN)?;
    debug!(roots = roots.len(), "tree nested");
    output::to_stdout(|w| output::write_forest(w, opts.output, &roots, session.view()))
}
