//! Typed predicates and the single step that turns them into SQL.
//!
//! Search criteria are composed as [`Predicate`] values over catalog [`Column`]s.
//! Identifiers (tables, aliases, columns) only ever come from the static catalog,
//! while every value supplied by a caller is bound as a parameter by the renderer,
//! so quotes and other syntax in user text are always treated as data.

use std::fmt;

use rusqlite::types::Value;
use tracing::debug;

use crate::schema::Skeleton;

// ------------- Identifiers -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Column {
    pub alias: &'static str,
    pub name: &'static str,
}

impl Column {
    pub const fn new(alias: &'static str, name: &'static str) -> Self {
        Self { alias, name }
    }
}
impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.alias, self.name)
    }
}

/// A `LEFT OUTER JOIN table alias ON left = right` step of a join graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Join {
    pub table: &'static str,
    pub alias: &'static str,
    pub left: Column,
    pub right: Column,
}

impl Join {
    pub const fn new(table: &'static str, alias: &'static str, left: Column, right: Column) -> Self {
        Self {
            table,
            alias,
            left,
            right,
        }
    }
}
impl fmt::Display for Join {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LEFT OUTER JOIN {} {} ON {} = {}",
            self.table, self.alias, self.left, self.right
        )
    }
}

// ------------- Predicates -------------
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Comparison {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Comparison::Eq => "=",
            Comparison::Ne => "<>",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
        }
    }
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "=" | "==" => Some(Comparison::Eq),
            "!=" | "<>" => Some(Comparison::Ne),
            "<" => Some(Comparison::Lt),
            "<=" => Some(Comparison::Le),
            ">" => Some(Comparison::Gt),
            ">=" => Some(Comparison::Ge),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    Integer(i64),
    Text(String),
}

impl From<i64> for Operand {
    fn from(value: i64) -> Self {
        Operand::Integer(value)
    }
}
impl From<&str> for Operand {
    fn from(value: &str) -> Self {
        Operand::Text(value.to_string())
    }
}
impl From<String> for Operand {
    fn from(value: String) -> Self {
        Operand::Text(value)
    }
}
impl From<&Operand> for Value {
    fn from(operand: &Operand) -> Self {
        match operand {
            Operand::Integer(i) => Value::Integer(*i),
            Operand::Text(t) => Value::Text(t.clone()),
        }
    }
}

/// `alias.key` values of the rows in `table` satisfying `filter`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subquery {
    pub table: &'static str,
    pub alias: &'static str,
    pub key: &'static str,
    pub joins: Vec<Join>,
    pub filter: Box<Predicate>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// Case sensitive substring containment.
    Contains { column: Column, needle: String },
    Compare {
        column: Column,
        op: Comparison,
        value: Operand,
    },
    /// A boolean flag column holding 1.
    IsSet(Column),
    In { column: Column, subquery: Subquery },
    Not(Box<Predicate>),
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
}

impl Predicate {
    pub fn contains(column: Column, needle: &str) -> Self {
        Predicate::Contains {
            column,
            needle: needle.to_string(),
        }
    }
    pub fn equals(column: Column, value: impl Into<Operand>) -> Self {
        Predicate::Compare {
            column,
            op: Comparison::Eq,
            value: value.into(),
        }
    }
    pub fn negate(self) -> Self {
        Predicate::Not(Box::new(self))
    }
    /// Number of `IN (SELECT ...)` subqueries in this tree.
    pub fn subqueries(&self) -> usize {
        match self {
            Predicate::In { subquery, .. } => 1 + subquery.filter.subqueries(),
            Predicate::Not(inner) => inner.subqueries(),
            Predicate::All(ps) | Predicate::Any(ps) => ps.iter().map(Predicate::subqueries).sum(),
            _ => 0,
        }
    }
}

// ------------- Rendering -------------
#[derive(Default)]
struct Renderer {
    sql: String,
    params: Vec<Value>,
}

impl Renderer {
    fn bind(&mut self, value: Value) {
        self.params.push(value);
        self.sql.push_str(&format!("?{}", self.params.len()));
    }
    fn predicate(&mut self, predicate: &Predicate) {
        match predicate {
            Predicate::Contains { column, needle } => {
                // instr is case sensitive, unlike like
                self.sql.push_str(&format!("instr({column}, "));
                self.bind(Value::Text(needle.clone()));
                self.sql.push_str(") > 0");
            }
            Predicate::Compare { column, op, value } => {
                self.sql.push_str(&format!("{column} {} ", op.as_sql()));
                self.bind(Value::from(value));
            }
            Predicate::IsSet(column) => {
                self.sql.push_str(&format!("{column} = 1"));
            }
            Predicate::In { column, subquery } => {
                self.sql.push_str(&format!(
                    "{column} IN (SELECT {}.{} FROM {} {}",
                    subquery.alias, subquery.key, subquery.table, subquery.alias
                ));
                for join in &subquery.joins {
                    self.sql.push_str(&format!(" {join}"));
                }
                self.sql.push_str(" WHERE ");
                self.predicate(&subquery.filter);
                self.sql.push(')');
            }
            Predicate::Not(inner) => {
                self.sql.push_str("NOT (");
                self.predicate(inner);
                self.sql.push(')');
            }
            Predicate::All(ps) => self.group(ps, " AND ", "1"),
            Predicate::Any(ps) => self.group(ps, " OR ", "0"),
        }
    }
    fn group(&mut self, predicates: &[Predicate], separator: &str, empty: &str) {
        match predicates {
            [] => self.sql.push_str(empty),
            [single] => self.predicate(single),
            _ => {
                self.sql.push('(');
                for (i, p) in predicates.iter().enumerate() {
                    if i > 0 {
                        self.sql.push_str(separator);
                    }
                    self.predicate(p);
                }
                self.sql.push(')');
            }
        }
    }
}

/// Renders a predicate on its own, returning the SQL fragment and its parameters.
pub fn render(predicate: &Predicate) -> (String, Vec<Value>) {
    let mut renderer = Renderer::default();
    renderer.predicate(predicate);
    (renderer.sql, renderer.params)
}

// ------------- Queries -------------
/// A fully formed read statement together with its bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    sql: String,
    params: Vec<Value>,
}

impl Query {
    pub fn sql(&self) -> &str {
        &self.sql
    }
    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

/// Builder for a select over a catalog skeleton.
pub struct Select<'s> {
    skeleton: &'s Skeleton,
    columns: Vec<&'static str>,
    joins: Vec<Join>,
    filters: Vec<Predicate>,
    grouped: bool,
    distinct: bool,
    order_by: &'static str,
}

impl<'s> Select<'s> {
    pub fn from(skeleton: &'s Skeleton) -> Self {
        Self {
            skeleton,
            columns: Vec::new(),
            joins: Vec::new(),
            filters: Vec::new(),
            grouped: false,
            distinct: false,
            order_by: skeleton.order_by,
        }
    }
    pub fn column(mut self, expression: &'static str) -> Self {
        self.columns.push(expression);
        self
    }
    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }
    pub fn filter(mut self, predicate: Predicate) -> Self {
        self.filters.push(predicate);
        self
    }
    /// Collapse join fan-out using the skeleton's display grouping.
    pub fn grouped(mut self) -> Self {
        self.grouped = true;
        self
    }
    /// One row per record of the skeleton's own table.
    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }
    pub fn order_by(mut self, expression: &'static str) -> Self {
        self.order_by = expression;
        self
    }
    pub fn build(self) -> Query {
        let skeleton = self.skeleton;
        let mut renderer = Renderer::default();
        let columns: Vec<&str> = skeleton
            .columns
            .iter()
            .chain(self.columns.iter())
            .copied()
            .collect();
        renderer.sql.push_str(&format!(
            "SELECT {} FROM {} {}",
            columns.join(", "),
            skeleton.table,
            skeleton.alias
        ));
        for join in skeleton.joins.iter().chain(self.joins.iter()) {
            renderer.sql.push_str(&format!(" {join}"));
        }
        if !self.filters.is_empty() {
            renderer.sql.push_str(" WHERE ");
            renderer.group(&self.filters, " AND ", "1");
        }
        if self.grouped && !skeleton.group_by.is_empty() {
            renderer
                .sql
                .push_str(&format!(" GROUP BY {}", skeleton.group_by.join(", ")));
        } else if self.distinct {
            renderer.sql.push_str(&format!(" GROUP BY {}", skeleton.id()));
        }
        renderer.sql.push_str(&format!(" ORDER BY {}", self.order_by));
        debug!(sql = %renderer.sql, params = renderer.params.len(), "query built");
        Query {
            sql: renderer.sql,
            params: renderer.params,
        }
    }
}
