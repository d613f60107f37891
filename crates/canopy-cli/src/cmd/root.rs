//! `canopy root KEY`: the topmost ancestor of one row.

use anyhow::{Context as _, Result};
use clap::Args;
use std::path::Path;

use super::{GlobalOptions, Session};
use crate::output;

#[derive(Args, Debug)]
pub struct RootArgs {
    /// Local key of the subject row.
    pub key: String,
}

pub fn run_root(args: &RootArgs, opts: &GlobalOptions, cwd: &Path) -> Result<()> {
    let session = Session::open(opts, cwd)?;
    let subject = session.subject(&args.key)?;
    let root = session
        .hierarchy
        .root_ancestor(&subject)?
        .first(&session.conn)?
        .context("root ancestor query returned no row")?;

    let heading = format!("root of {}", args.key);
    output::to_stdout(|w| {
        output::write_rows(w, opts.output, &heading, std::slice::from_ref(&root), session.view())
    })
}
