//! Shared output layer for pretty/text/JSON parity across all CLI commands.
//!
//! Every command handler receives an [`OutputMode`] and formats its output
//! accordingly: indented trees for humans, tab-separated rows for pipes, or
//! stable JSON.
//!
//! # Output mode resolution
//!
//! Precedence (highest wins):
//! 1. `--format` / hidden `--json` flag
//! 2. `CANOPY_FORMAT` env var → `"pretty"` | `"text"` | `"json"`
//! 3. Default: [`OutputMode::Pretty`] if stdout is a TTY; [`OutputMode::Text`] if piped.

use canopy_core::{HierarchicalRecord, HierarchyConfig, HierarchyError, Node, RenderedQuery, SqlValue};
use clap::ValueEnum;
use serde::Serialize;
use std::io::{self, IsTerminal, Write};

/// Shared width for human pretty separators.
pub const PRETTY_RULE_WIDTH: usize = 72;

/// Write a horizontal separator used by pretty human output.
pub fn pretty_rule(w: &mut dyn Write) -> io::Result<()> {
    writeln!(w, "{:-<width$}", "", width = PRETTY_RULE_WIDTH)
}

/// Write a section heading followed by a separator.
pub fn pretty_section(w: &mut dyn Write, heading: &str) -> io::Result<()> {
    writeln!(w, "{heading}")?;
    pretty_rule(w)
}

/// The three output modes supported by the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputMode {
    /// Human-optimized output (indented trees, headings).
    Pretty,
    /// Tab-separated rows for scripts and pipes.
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputMode {
    /// Returns `true` if JSON output was requested.
    pub const fn is_json(self) -> bool {
        matches!(self, Self::Json)
    }
}

/// Core resolution logic, separated from I/O for testability.
fn resolve_output_mode_inner(
    format_flag: Option<OutputMode>,
    json_flag: bool,
    format_env: Option<&str>,
    is_tty: bool,
) -> OutputMode {
    if let Some(mode) = format_flag {
        return mode;
    }

    if json_flag {
        return OutputMode::Json;
    }

    if let Some(val) = format_env {
        match val.to_lowercase().as_str() {
            "json" => return OutputMode::Json,
            "text" => return OutputMode::Text,
            "pretty" => return OutputMode::Pretty,
            _ => {}
        }
    }

    if is_tty {
        OutputMode::Pretty
    } else {
        OutputMode::Text
    }
}

/// Resolve the output mode from CLI flags, environment, and TTY defaults.
pub fn resolve_output_mode(format_flag: Option<OutputMode>, json_flag: bool) -> OutputMode {
    let env_val = std::env::var("CANOPY_FORMAT").ok();
    let is_tty = io::stdout().is_terminal();
    resolve_output_mode_inner(format_flag, json_flag, env_val.as_deref(), is_tty)
}

/// Which columns a row is displayed with.
#[derive(Debug, Clone, Copy)]
pub struct RowView<'a> {
    pub config: &'a HierarchyConfig,
    /// Column shown as the row's human label.
    pub label: &'a str,
}

impl RowView<'_> {
    fn cell(&self, node: &Node, column: &str) -> String {
        node.attribute(column).map_or_else(|| "-".to_string(), display_value)
    }

    fn title(&self, node: &Node) -> String {
        let key = self.cell(node, &self.config.local_key);
        match node.attribute(self.label) {
            Some(label) if !label.is_null() => format!("{} ({key})", display_value(label)),
            _ => key,
        }
    }

    fn write_text_row(&self, w: &mut dyn Write, node: &Node) -> io::Result<()> {
        writeln!(
            w,
            "{}\t{}\t{}\t{}\t{}",
            self.cell(node, &self.config.local_key),
            self.cell(node, &self.config.parent_key),
            self.cell(node, &self.config.depth_name),
            self.cell(node, &self.config.path_name),
            self.cell(node, self.label),
        )
    }

    fn write_text_header(w: &mut dyn Write) -> io::Result<()> {
        writeln!(w, "KEY\tPARENT\tDEPTH\tPATH\tLABEL")
    }
}

/// Display form of one cell.
pub fn display_value(value: &SqlValue) -> String {
    match value {
        SqlValue::Null => "-".to_string(),
        SqlValue::Integer(n) => n.to_string(),
        SqlValue::Real(f) => f.to_string(),
        SqlValue::Text(s) => s.clone(),
        SqlValue::Blob(bytes) => value
            .as_text()
            .map_or_else(|| format!("<{} bytes>", bytes.len()), str::to_string),
    }
}

/// Write flat traversal rows.
pub fn write_rows(
    w: &mut dyn Write,
    mode: OutputMode,
    heading: &str,
    rows: &[Node],
    view: RowView<'_>,
) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => write_json(w, &rows)?,
        OutputMode::Text => {
            RowView::write_text_header(w)?;
            for row in rows {
                view.write_text_row(w, row)?;
            }
        }
        OutputMode::Pretty => {
            pretty_section(w, heading)?;
            if rows.is_empty() {
                writeln!(w, "(no rows)")?;
            }
            let base = rows
                .iter()
                .filter_map(|n| n.integer(&view.config.depth_name).ok())
                .min()
                .unwrap_or_default();
            for row in rows {
                let depth = row.integer(&view.config.depth_name).unwrap_or(base);
                let indent = usize::try_from(depth - base).unwrap_or_default();
                writeln!(
                    w,
                    "{:indent$}{}  [{}]",
                    "",
                    view.title(row),
                    view.cell(row, &view.config.path_name),
                    indent = indent * 2
                )?;
            }
        }
    }
    Ok(())
}

/// Write a nested forest.
pub fn write_forest(
    w: &mut dyn Write,
    mode: OutputMode,
    roots: &[Node],
    view: RowView<'_>,
) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => write_json(w, &roots)?,
        OutputMode::Text => {
            RowView::write_text_header(w)?;
            let mut stack: Vec<&Node> = roots.iter().rev().collect();
            while let Some(node) = stack.pop() {
                view.write_text_row(w, node)?;
                stack.extend(node.children().iter().rev());
            }
        }
        OutputMode::Pretty => {
            if roots.is_empty() {
                writeln!(w, "(empty forest)")?;
            }
            for root in roots {
                writeln!(w, "{}", view.title(root))?;
                write_branches(w, root.children(), view)?;
            }
        }
    }
    Ok(())
}

fn write_branches(w: &mut dyn Write, children: &[Node], view: RowView<'_>) -> io::Result<()> {
    // One sibling iterator per open level; `carries` holds the prefix piece
    // each open level contributes below the root.
    let mut levels = vec![children.iter()];
    let mut carries: Vec<&str> = Vec::new();
    while let Some(level) = levels.last_mut() {
        let Some(child) = level.next() else {
            levels.pop();
            carries.pop();
            continue;
        };
        let (branch, carry) = if level.as_slice().is_empty() {
            ("└── ", "    ")
        } else {
            ("├── ", "│   ")
        };
        writeln!(w, "{}{branch}{}", carries.concat(), view.title(child))?;
        levels.push(child.children().iter());
        carries.push(carry);
    }
    Ok(())
}

#[derive(Serialize)]
struct SqlPreview<'a> {
    dialect: String,
    sql: &'a str,
    bindings: &'a [SqlValue],
}

/// Write a rendered query and its bindings.
pub fn write_sql(w: &mut dyn Write, mode: OutputMode, rendered: &RenderedQuery) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => write_json(
            w,
            &SqlPreview {
                dialect: rendered.dialect.to_string(),
                sql: &rendered.sql,
                bindings: &rendered.bindings,
            },
        )?,
        OutputMode::Text => {
            writeln!(w, "{}", rendered.sql)?;
            for value in &rendered.bindings {
                writeln!(w, "{}", display_value(value))?;
            }
        }
        OutputMode::Pretty => {
            pretty_section(w, &format!("SQL ({})", rendered.dialect))?;
            writeln!(w, "{}", rendered.sql)?;
            writeln!(w)?;
            pretty_section(w, "Bindings")?;
            for (i, value) in rendered.bindings.iter().enumerate() {
                writeln!(w, "{:>3}  {}", i + 1, display_value(value))?;
            }
        }
    }
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(w: &mut dyn Write, value: &T) -> anyhow::Result<()> {
    serde_json::to_writer_pretty(&mut *w, value)?;
    writeln!(w)?;
    Ok(())
}

/// Run `f` against a locked stdout.
pub fn to_stdout(f: impl FnOnce(&mut dyn Write) -> anyhow::Result<()>) -> anyhow::Result<()> {
    let stdout = io::stdout();
    let mut out = stdout.lock();
    f(&mut out)
}

/// A structured error with optional suggestion and error code.
#[derive(Debug, Serialize)]
pub struct CliError {
    /// Human-readable error message.
    pub message: String,
    /// Optional suggestion for how to fix the error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Machine-readable error code (e.g. "E3002").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl From<&HierarchyError> for CliError {
    fn from(err: &HierarchyError) -> Self {
        let code = err.code();
        Self {
            message: err.to_string(),
            suggestion: code.hint().map(str::to_string),
            error_code: Some(code.code().to_string()),
        }
    }
}

/// Render an error to `w` in the requested format.
pub fn write_error(w: &mut dyn Write, mode: OutputMode, error: &CliError) -> anyhow::Result<()> {
    match mode {
        OutputMode::Json => write_json(w, &serde_json::json!({ "error": error }))?,
        OutputMode::Pretty | OutputMode::Text => {
            match &error.error_code {
                Some(code) => writeln!(w, "error[{code}]: {}", error.message)?,
                None => writeln!(w, "error: {}", error.message)?,
            }
            if let Some(ref suggestion) = error.suggestion {
                writeln!(w, "  suggestion: {suggestion}")?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use canopy_core::{CHILDREN, Dialect};

    fn node(id: i64, parent: Option<i64>, depth: i64, name: &str) -> Node {
        Node::from_pairs([
            ("id", SqlValue::from(id)),
            ("parent_id", SqlValue::from(parent)),
            ("depth", SqlValue::from(depth)),
            ("path", SqlValue::from(format!("1.{id}"))),
            ("name", SqlValue::from(name)),
        ])
    }

    fn as_string(buf: Vec<u8>) -> String {
        String::from_utf8(buf).expect("utf8 output")
    }

    #[test]
    fn resolve_format_flag_wins_over_json_and_env() {
        let mode = resolve_output_mode_inner(Some(OutputMode::Text), true, Some("pretty"), true);
        assert_eq!(mode, OutputMode::Text);
    }

    #[test]
    fn resolve_json_flag_wins_over_env() {
        let mode = resolve_output_mode_inner(None, true, Some("pretty"), true);
        assert_eq!(mode, OutputMode::Json);
    }

    #[test]
    fn resolve_format_env_case_insensitive() {
        let mode = resolve_output_mode_inner(None, false, Some("TEXT"), true);
        assert_eq!(mode, OutputMode::Text);
    }

    #[test]
    fn resolve_unknown_env_falls_through_to_tty() {
        assert_eq!(
            resolve_output_mode_inner(None, false, Some("fancy"), true),
            OutputMode::Pretty
        );
        assert_eq!(
            resolve_output_mode_inner(None, false, None, false),
            OutputMode::Text
        );
    }

    #[test]
    fn text_rows_are_tab_separated() {
        let config = HierarchyConfig::new("nodes");
        let view = RowView { config: &config, label: "name" };
        let mut buf = Vec::new();
        write_rows(&mut buf, OutputMode::Text, "rows", &[node(2, Some(1), 1, "b")], view)
            .expect("write");
        let out = as_string(buf);
        assert_eq!(out, "KEY\tPARENT\tDEPTH\tPATH\tLABEL\n2\t1\t1\t1.2\tb\n");
    }

    #[test]
    fn pretty_forest_draws_branches() {
        let config = HierarchyConfig::new("nodes");
        let view = RowView { config: &config, label: "name" };
        let mut root = node(1, None, 0, "a");
        root.set_relation(
            CHILDREN,
            vec![node(2, Some(1), 1, "b"), node(3, Some(1), 1, "c")],
        );
        let mut buf = Vec::new();
        write_forest(&mut buf, OutputMode::Pretty, &[root], view).expect("write");
        let out = as_string(buf);
        assert_eq!(out, "a (1)\n├── b (2)\n└── c (3)\n");
    }

    #[test]
    fn pretty_forest_carries_rails_below_open_siblings() {
        let config = HierarchyConfig::new("nodes");
        let view = RowView { config: &config, label: "name" };
        let mut deep = node(4, Some(2), 2, "d");
        deep.set_relation(CHILDREN, vec![node(5, Some(4), 3, "e")]);
        let mut child = node(2, Some(1), 1, "b");
        child.set_relation(CHILDREN, vec![deep]);
        let mut root = node(1, None, 0, "a");
        root.set_relation(CHILDREN, vec![child, node(3, Some(1), 1, "c")]);

        let mut buf = Vec::new();
        write_forest(&mut buf, OutputMode::Pretty, &[root], view).expect("write");
        assert_eq!(
            as_string(buf),
            "a (1)\n├── b (2)\n│   └── d (4)\n│       └── e (5)\n└── c (3)\n"
        );
    }

    #[test]
    fn text_forest_is_preorder() {
        let config = HierarchyConfig::new("nodes");
        let view = RowView { config: &config, label: "name" };
        let mut child = node(2, Some(1), 1, "b");
        child.set_relation(CHILDREN, vec![node(4, Some(2), 2, "d")]);
        let mut root = node(1, None, 0, "a");
        root.set_relation(CHILDREN, vec![child, node(3, Some(1), 1, "c")]);

        let mut buf = Vec::new();
        write_forest(&mut buf, OutputMode::Text, &[root], view).expect("write");
        let keys: Vec<String> = as_string(buf)
            .lines()
            .skip(1)
            .map(|line| line.split('\t').next().unwrap_or_default().to_string())
            .collect();
        assert_eq!(keys, vec!["1", "2", "4", "3"]);
    }

    #[test]
    fn json_sql_preview_includes_bindings() {
        let rendered = RenderedQuery {
            dialect: Dialect::Postgres,
            sql: "SELECT $1".to_string(),
            bindings: vec![SqlValue::from(7)],
        };
        let mut buf = Vec::new();
        write_sql(&mut buf, OutputMode::Json, &rendered).expect("write");
        let value: serde_json::Value = serde_json::from_slice(&buf).expect("json");
        assert_eq!(value["dialect"], "postgres");
        assert_eq!(value["bindings"][0], 7);
    }

    #[test]
    fn hierarchy_errors_carry_code_and_hint() {
        let err = HierarchyError::MissingAttribute("parent_id".to_string());
        let cli: CliError = (&err).into();
        assert_eq!(cli.error_code.as_deref(), Some("E2001"));
        assert!(cli.suggestion.is_some());

        let mut buf = Vec::new();
        write_error(&mut buf, OutputMode::Text, &cli).expect("write");
        assert!(as_string(buf).starts_with("error[E2001]:"));
    }

    #[test]
    fn blob_cells_decode_as_text() {
        assert_eq!(display_value(&SqlValue::Blob(b"1.2".to_vec())), "1.2");
        assert_eq!(display_value(&SqlValue::Blob(vec![0xff])), "<1 bytes>");
        assert_eq!(display_value(&SqlValue::Null), "-");
    }
}
