#![forbid(unsafe_code)]

mod cmd;
mod output;

use canopy_core::{HierarchyError, Scope};
use clap::{CommandFactory, Parser, Subcommand};
use cmd::GlobalOptions;
use cmd::relation::Relation;
use output::{CliError, OutputMode};
use std::env;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "canopy: recursive queries over adjacency-list hierarchies",
    long_about = None
)]
struct Cli {
    /// SQLite database to read.
    #[arg(long, global = true, env = "CANOPY_DB", default_value = "canopy.db")]
    db: PathBuf,

    /// Hierarchy config file (defaults to ./.canopy.toml when present).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Table to traverse, overriding the config file.
    #[arg(long, global = true)]
    table: Option<String>,

    /// Column shown as each row's label in human output.
    #[arg(long, global = true, default_value = "name")]
    label: String,

    /// Scope to apply to the query; repeatable (e.g. is-leaf, depth<=2).
    #[arg(long = "scope", global = true)]
    scopes: Vec<Scope>,

    /// Output format.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Emit JSON output (alias for --format json).
    #[arg(long, global = true, hide = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.format, self.json)
    }

    fn global_options(&self) -> GlobalOptions {
        GlobalOptions {
            db: self.db.clone(),
            config: self.config.clone(),
            table: self.table.clone(),
            label: self.label.clone(),
            scopes: self.scopes.clone(),
            output: self.output_mode(),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        next_help_heading = "Forest",
        about = "Print the forest",
        long_about = "Print every tree in the table, or the subtree under one key, nested by parent.",
        after_help = "EXAMPLES:\n    # Whole forest\n    canopy tree\n\n    # Two levels under key 5\n    canopy tree --root-key 5 --max-depth 2\n\n    # Leaves only, as rows\n    canopy tree --flat --scope is-leaf"
    )]
    Tree(cmd::tree::TreeArgs),

    #[command(
        next_help_heading = "Relations",
        about = "List ancestors of a row",
        after_help = "EXAMPLES:\n    canopy ancestors 7\n    canopy ancestors 7 --and-self --json"
    )]
    Ancestors(cmd::relation::RelationArgs),

    #[command(
        next_help_heading = "Relations",
        about = "List descendants of a row",
        after_help = "EXAMPLES:\n    canopy descendants 1\n    canopy descendants 1 --scope 'depth<=2' --scope breadth-first"
    )]
    Descendants(cmd::relation::RelationArgs),

    #[command(next_help_heading = "Relations", about = "List direct children of a row")]
    Children(cmd::relation::RelationArgs),

    #[command(next_help_heading = "Relations", about = "Show the parent of a row")]
    Parent(cmd::relation::RelationArgs),

    #[command(next_help_heading = "Relations", about = "List rows sharing a parent with a row")]
    Siblings(cmd::relation::RelationArgs),

    #[command(next_help_heading = "Relations", about = "Show the root ancestor of a row")]
    Root(cmd::root::RootArgs),

    #[command(
        next_help_heading = "Tooling",
        about = "Print the SQL for a traversal",
        long_about = "Render a traversal for any supported dialect without opening a database.",
        after_help = "EXAMPLES:\n    # Descendants of 1 on PostgreSQL\n    canopy sql descendants 1 --dialect postgres\n\n    # Siblings need the parent key\n    canopy sql siblings 4 --parent 2"
    )]
    Sql(cmd::sql::SqlArgs),

    #[command(
        next_help_heading = "Tooling",
        about = "Generate shell completion scripts",
        after_help = "EXAMPLES:\n    canopy completions bash\n    canopy completions zsh"
    )]
    Completions(cmd::completions::CompletionsArgs),
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("CANOPY_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if env::var("DEBUG").is_ok() {
            "canopy=debug,canopy_core=debug,info"
        } else {
            "canopy=info,warn"
        })
    });

    let format = env::var("CANOPY_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());
    let registry = tracing_subscriber::registry().with(filter);
    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let cwd = env::current_dir()?;
    let opts = cli.global_options();
    debug!(command = ?cli.command, output = ?opts.output, "dispatching");

    match &cli.command {
        Commands::Tree(args) => cmd::tree::run_tree(args, &opts, &cwd),
        Commands::Ancestors(args) => {
            cmd::relation::run_relation(Relation::Ancestors, args, &opts, &cwd)
        }
        Commands::Descendants(args) => {
            cmd::relation::run_relation(Relation::Descendants, args, &opts, &cwd)
        }
        Commands::Children(args) => {
            cmd::relation::run_relation(Relation::Children, args, &opts, &cwd)
        }
        Commands::Parent(args) => cmd::relation::run_relation(Relation::Parent, args, &opts, &cwd),
        Commands::Siblings(args) => {
            cmd::relation::run_relation(Relation::Siblings, args, &opts, &cwd)
        }
        Commands::Root(args) => cmd::root::run_root(args, &opts, &cwd),
        Commands::Sql(args) => cmd::sql::run_sql(args, &opts, &cwd),
        Commands::Completions(args) => {
            let mut command = Cli::command();
            cmd::completions::run_completions(args.shell, &mut command, &mut std::io::stdout())
        }
    }
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => Ok(()),
        Err(err) => match err.downcast_ref::<HierarchyError>() {
            Some(hierarchy_err) => {
                let mode = cli.output_mode();
                output::write_error(&mut std::io::stderr(), mode, &CliError::from(hierarchy_err))?;
                std::process::exit(1);
            }
            None => Err(err),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::ComparisonOp;

    #[test]
    fn global_flags_parse_after_subcommand() {
        let cli = Cli::parse_from(["canopy", "tree", "--db", "x.db", "--table", "cats", "--json"]);
        assert_eq!(cli.db, PathBuf::from("x.db"));
        assert_eq!(cli.table.as_deref(), Some("cats"));
        assert!(cli.json);
        assert!(cli.output_mode().is_json());
    }

    #[test]
    fn scopes_are_repeatable_and_parsed() {
        let cli = Cli::parse_from([
            "canopy",
            "--scope",
            "is-leaf",
            "descendants",
            "1",
            "--scope",
            "depth<=2",
        ]);
        assert_eq!(
            cli.scopes,
            vec![Scope::IsLeaf, Scope::WhereDepth(ComparisonOp::Le, 2)]
        );
        assert!(matches!(cli.command, Commands::Descendants(ref args) if args.key == "1"));
    }

    #[test]
    fn unknown_scope_is_rejected() {
        assert!(Cli::try_parse_from(["canopy", "tree", "--scope", "sideways"]).is_err());
    }

    #[test]
    fn format_flag_wins_over_json() {
        let cli = Cli::parse_from(["canopy", "--format", "text", "--json", "tree"]);
        assert_eq!(cli.output_mode(), OutputMode::Text);
    }

    #[test]
    fn completions_subcommand_parses() {
        let cli = Cli::parse_from(["canopy", "completions", "zsh"]);
        assert!(matches!(cli.command, Commands::Completions(_)));
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }
}
