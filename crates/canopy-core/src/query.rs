//! Query context: a small SELECT builder with positional bindings.
//!
//! [`SelectQuery`] is the outer query object the traversal engine builds
//! on. It carries the active source relation explicitly, so redirecting a
//! query to a recursive expression is a field update on the query, never a
//! change to shared table state. Rendering walks the query once and emits
//! SQL text plus bindings in placeholder order.

use std::fmt;

use crate::dialect::Dialect;
use crate::value::SqlValue;

#[derive(Debug, Clone, PartialEq)]
enum Part {
    Sql(String),
    Bind(SqlValue),
}

/// A piece of SQL text interleaved with bound values.
///
/// Identifiers inside a fragment are already quoted; values are never
/// spliced into the text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Fragment {
    parts: Vec<Part>,
}

impl Fragment {
    #[must_use]
    pub fn sql(text: impl Into<String>) -> Self {
        Self {
            parts: vec![Part::Sql(text.into())],
        }
    }

    #[must_use]
    pub fn bind(value: impl Into<SqlValue>) -> Self {
        Self {
            parts: vec![Part::Bind(value.into())],
        }
    }

    #[must_use]
    pub fn with_sql(mut self, text: impl Into<String>) -> Self {
        self.push_sql(text);
        self
    }

    #[must_use]
    pub fn with_bind(mut self, value: impl Into<SqlValue>) -> Self {
        self.parts.push(Part::Bind(value.into()));
        self
    }

    pub fn push_sql(&mut self, text: impl Into<String>) {
        self.parts.push(Part::Sql(text.into()));
    }

    pub fn append(&mut self, other: Self) {
        self.parts.extend(other.parts);
    }

    /// Values bound by this fragment, in order.
    pub fn bindings(&self) -> impl Iterator<Item = &SqlValue> {
        self.parts.iter().filter_map(|part| match part {
            Part::Bind(value) => Some(value),
            Part::Sql(_) => None,
        })
    }

    /// Render with `dialect`'s placeholders, numbering bindings from 1.
    #[must_use]
    pub fn render(&self, dialect: Dialect) -> RenderedQuery {
        let mut sql = String::new();
        let mut bindings = Vec::new();
        for part in &self.parts {
            match part {
                Part::Sql(text) => sql.push_str(text),
                Part::Bind(value) => {
                    bindings.push(value.clone());
                    sql.push_str(&dialect.placeholder(bindings.len()));
                }
            }
        }
        RenderedQuery {
            dialect,
            sql,
            bindings,
        }
    }
}

/// SQL text ready for a storage client, with its bindings in order.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedQuery {
    pub dialect: Dialect,
    pub sql: String,
    pub bindings: Vec<SqlValue>,
}

impl fmt::Display for RenderedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// A relation in a FROM or JOIN clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Source {
    pub name: String,
    pub alias: Option<String>,
}

impl Source {
    #[must_use]
    pub fn table(name: &str) -> Self {
        Self {
            name: name.to_string(),
            alias: None,
        }
    }

    #[must_use]
    pub fn aliased(name: &str, alias: &str) -> Self {
        Self {
            name: name.to_string(),
            alias: Some(alias.to_string()),
        }
    }

    /// The name columns are qualified with: the alias if any.
    #[must_use]
    pub fn reference(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    fn render(&self, dialect: Dialect) -> String {
        match &self.alias {
            Some(alias) => format!(
                "{} AS {}",
                dialect.quote_identifier(&self.name),
                dialect.quote_identifier(alias)
            ),
            None => dialect.quote_identifier(&self.name),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Order {
    Asc,
    Desc,
}

impl Order {
    const fn keyword(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Comparison operator for column predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl ComparisonOp {
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    /// Evaluate the operator in memory, with the same meaning as in SQL.
    #[must_use]
    pub fn holds(self, left: i64, right: i64) -> bool {
        match self {
            Self::Eq => left == right,
            Self::Ne => left != right,
            Self::Lt => left < right,
            Self::Le => left <= right,
            Self::Gt => left > right,
            Self::Ge => left >= right,
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl std::str::FromStr for ComparisonOp {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.trim() {
            "=" | "==" | "eq" => Ok(Self::Eq),
            "!=" | "<>" | "ne" => Ok(Self::Ne),
            "<" | "lt" => Ok(Self::Lt),
            "<=" | "le" => Ok(Self::Le),
            ">" | "gt" => Ok(Self::Gt),
            ">=" | "ge" => Ok(Self::Ge),
            other => anyhow::bail!("unknown comparison operator '{other}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Join {
    source: Source,
    on: Fragment,
}

#[derive(Debug, Clone, PartialEq)]
struct RecursiveExpression {
    name: String,
    body: SelectQuery,
}

/// A SELECT statement under construction.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    dialect: Dialect,
    expressions: Vec<RecursiveExpression>,
    columns: Vec<Fragment>,
    source: Source,
    joins: Vec<Join>,
    wheres: Vec<Fragment>,
    unions: Vec<Self>,
    orders: Vec<Fragment>,
    limit: Option<u64>,
}

impl SelectQuery {
    #[must_use]
    pub fn new(dialect: Dialect, table: &str) -> Self {
        Self::from_source(dialect, Source::table(table))
    }

    #[must_use]
    pub const fn from_source(dialect: Dialect, source: Source) -> Self {
        Self {
            dialect,
            expressions: Vec::new(),
            columns: Vec::new(),
            source,
            joins: Vec::new(),
            wheres: Vec::new(),
            unions: Vec::new(),
            orders: Vec::new(),
            limit: None,
        }
    }

    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    #[must_use]
    pub const fn source(&self) -> &Source {
        &self.source
    }

    /// Name that columns of the active source are qualified with.
    #[must_use]
    pub fn source_name(&self) -> &str {
        self.source.reference()
    }

    /// Redirect the query to read from `source`.
    pub fn set_source(&mut self, source: Source) -> &mut Self {
        self.source = source;
        self
    }

    /// `column` qualified with the active source.
    #[must_use]
    pub fn qualify(&self, column: &str) -> String {
        format!("{}.{column}", self.source_name())
    }

    fn quote(&self, identifier: &str) -> String {
        self.dialect.quote_identifier(identifier)
    }

    pub fn select(&mut self, column: &str) -> &mut Self {
        let quoted = self.quote(column);
        self.columns.push(Fragment::sql(quoted));
        self
    }

    /// `SELECT relation.*`.
    pub fn select_all_from(&mut self, relation: &str) -> &mut Self {
        let quoted = self.quote(&format!("{relation}.*"));
        self.columns.push(Fragment::sql(quoted));
        self
    }

    pub fn select_raw(&mut self, expression: Fragment) -> &mut Self {
        self.columns.push(expression);
        self
    }

    /// `INNER JOIN source ON left = right`; both sides are column references.
    pub fn join(&mut self, source: Source, left: &str, right: &str) -> &mut Self {
        let on = Fragment::sql(format!("{} = {}", self.quote(left), self.quote(right)));
        self.joins.push(Join { source, on });
        self
    }

    pub fn where_raw(&mut self, predicate: Fragment) -> &mut Self {
        self.wheres.push(predicate);
        self
    }

    pub fn where_null(&mut self, column: &str) -> &mut Self {
        let predicate = Fragment::sql(format!("{} IS NULL", self.quote(column)));
        self.where_raw(predicate)
    }

    pub fn where_not_null(&mut self, column: &str) -> &mut Self {
        let predicate = Fragment::sql(format!("{} IS NOT NULL", self.quote(column)));
        self.where_raw(predicate)
    }

    pub fn where_cmp(
        &mut self,
        column: &str,
        op: ComparisonOp,
        value: impl Into<SqlValue>,
    ) -> &mut Self {
        let predicate = Fragment::sql(format!("{} {} ", self.quote(column), op.symbol()))
            .with_bind(value);
        self.where_raw(predicate)
    }

    pub fn where_eq(&mut self, column: &str, value: impl Into<SqlValue>) -> &mut Self {
        self.where_cmp(column, ComparisonOp::Eq, value)
    }

    /// `column = value`, or `column IS NULL` when `value` is `NULL`.
    pub fn where_eq_or_null(&mut self, column: &str, value: SqlValue) -> &mut Self {
        if value.is_null() {
            self.where_null(column)
        } else {
            self.where_eq(column, value)
        }
    }

    /// `column IN (...)`. An empty list matches nothing.
    pub fn where_in(&mut self, column: &str, values: Vec<SqlValue>) -> &mut Self {
        self.where_in_list(column, values, false)
    }

    /// `column NOT IN (...)`. An empty list matches everything.
    pub fn where_not_in(&mut self, column: &str, values: Vec<SqlValue>) -> &mut Self {
        self.where_in_list(column, values, true)
    }

    fn where_in_list(&mut self, column: &str, values: Vec<SqlValue>, negate: bool) -> &mut Self {
        if values.is_empty() {
            let always = if negate { "1 = 1" } else { "1 = 0" };
            return self.where_raw(Fragment::sql(always));
        }
        let keyword = if negate { "NOT IN" } else { "IN" };
        let mut predicate = Fragment::sql(format!("{} {keyword} (", self.quote(column)));
        for (i, value) in values.into_iter().enumerate() {
            if i > 0 {
                predicate.push_sql(", ");
            }
            predicate = predicate.with_bind(value);
        }
        predicate.push_sql(")");
        self.where_raw(predicate)
    }

    /// `column IN (subquery)`.
    pub fn where_in_query(&mut self, column: &str, subquery: &Self) -> &mut Self {
        let mut predicate = Fragment::sql(format!("{} IN (", self.quote(column)));
        predicate.append(subquery.to_fragment());
        predicate.push_sql(")");
        self.where_raw(predicate)
    }

    pub fn where_exists(&mut self, subquery: &Self) -> &mut Self {
        self.where_exists_inner(subquery, false)
    }

    pub fn where_not_exists(&mut self, subquery: &Self) -> &mut Self {
        self.where_exists_inner(subquery, true)
    }

    fn where_exists_inner(&mut self, subquery: &Self, negate: bool) -> &mut Self {
        let keyword = if negate { "NOT EXISTS (" } else { "EXISTS (" };
        let mut predicate = Fragment::sql(keyword);
        predicate.append(subquery.to_fragment());
        predicate.push_sql(")");
        self.where_raw(predicate)
    }

    pub fn order_by(&mut self, column: &str, order: Order) -> &mut Self {
        let fragment = Fragment::sql(format!("{} {}", self.quote(column), order.keyword()));
        self.orders.push(fragment);
        self
    }

    pub const fn limit(&mut self, limit: u64) -> &mut Self {
        self.limit = Some(limit);
        self
    }

    pub fn union_all(&mut self, query: Self) -> &mut Self {
        self.unions.push(query);
        self
    }

    /// Register `body` as a recursive common table expression named `name`.
    pub fn with_recursive_expression(&mut self, name: &str, body: Self) -> &mut Self {
        self.expressions.push(RecursiveExpression {
            name: name.to_string(),
            body,
        });
        self
    }

    /// Names of the recursive expressions registered on this query.
    pub fn expression_names(&self) -> impl Iterator<Item = &str> {
        self.expressions.iter().map(|e| e.name.as_str())
    }

    #[must_use]
    pub fn to_fragment(&self) -> Fragment {
        let mut out = Fragment::default();

        if !self.expressions.is_empty() {
            out.push_sql(format!("{} ", self.dialect.with_recursive()));
            for (i, expression) in self.expressions.iter().enumerate() {
                if i > 0 {
                    out.push_sql(", ");
                }
                out.push_sql(format!("{} AS (", self.quote(&expression.name)));
                out.append(expression.body.to_fragment());
                out.push_sql(") ");
            }
        }

        out.push_sql("SELECT ");
        if let (Some(limit), true) = (self.limit, self.dialect.uses_top()) {
            out.push_sql(format!("TOP {limit} "));
        }
        if self.columns.is_empty() {
            out.push_sql("*");
        }
        for (i, column) in self.columns.iter().enumerate() {
            if i > 0 {
                out.push_sql(", ");
            }
            out.append(column.clone());
        }

        out.push_sql(format!(" FROM {}", self.source.render(self.dialect)));

        for join in &self.joins {
            out.push_sql(format!(" INNER JOIN {} ON ", join.source.render(self.dialect)));
            out.append(join.on.clone());
        }

        for (i, predicate) in self.wheres.iter().enumerate() {
            out.push_sql(if i == 0 { " WHERE " } else { " AND " });
            out.append(predicate.clone());
        }

        for union in &self.unions {
            out.push_sql(" UNION ALL ");
            out.append(union.to_fragment());
        }

        for (i, order) in self.orders.iter().enumerate() {
            out.push_sql(if i == 0 { " ORDER BY " } else { ", " });
            out.append(order.clone());
        }

        if let (Some(limit), false) = (self.limit, self.dialect.uses_top()) {
            out.push_sql(format!(" LIMIT {limit}"));
        }

        out
    }

    #[must_use]
    pub fn render(&self) -> RenderedQuery {
        self.to_fragment().render(self.dialect)
    }
}
