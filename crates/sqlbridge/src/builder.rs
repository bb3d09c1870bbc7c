//! Clause-checked SQL builder.
//!
//! [`QueryBuilder`] assembles one statement from fluent calls and keeps the
//! `?` values in placeholder order. Every clause method checks which clause
//! came before it; calling one out of order is a programming error and
//! panics at the call site.
//!
//! ```ignore
//! let users = svc
//!     .builder()
//!     .select(&["id", "name"])
//!     .from("users")
//!     .where_("active", Op::Eq, true)
//!     .order_by(&["name"])
//!     .limit(10, None)
//!     .run()
//!     .await?;
//! ```
//!
//! INSERT statements without an explicit column list ask the executor to
//! describe the target table, which is why [`QueryBuilder::values`] is async.

use crate::client::Executor;
use crate::driver::Driver;
use crate::error::BridgeResult;
use crate::row::ResultSet;
use crate::value::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// One row for [`QueryBuilder::values`], keyed by column name.
pub type Record = BTreeMap<String, Value>;

/// The clause the builder last emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Clause {
    Empty,
    Select,
    Where,
    GroupBy,
    Having,
    OrderBy,
    Limit,
    Insert,
    InsertInto,
    Values,
    Update,
    Set,
    Delete,
}

impl Clause {
    pub fn name(self) -> &'static str {
        match self {
            Clause::Empty => "empty",
            Clause::Select => "SELECT",
            Clause::Where => "WHERE",
            Clause::GroupBy => "GROUP BY",
            Clause::Having => "HAVING",
            Clause::OrderBy => "ORDER BY",
            Clause::Limit => "LIMIT",
            Clause::Insert => "INSERT",
            Clause::InsertInto => "INSERT INTO",
            Clause::Values => "VALUES",
            Clause::Update => "UPDATE",
            Clause::Set => "SET",
            Clause::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Comparison operator for WHERE / HAVING conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

impl Op {
    pub fn as_sql(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "!=",
            Op::Gt => ">",
            Op::Ge => ">=",
            Op::Lt => "<",
            Op::Le => "<=",
        }
    }
}

/// What `values()` does with a column the row does not supply.
///
/// A column holding [`Value::Null`] counts as not supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullPolicy {
    /// Panic: every row must supply every column.
    ThrowOnNull,
    /// Emit `DEFAULT` and bind nothing.
    DefaultOnNull,
    /// Emit `?` and bind NULL.
    NullOnNull,
}

#[derive(Debug, Clone, Default)]
struct InsertTarget {
    table: String,
    columns: Vec<String>,
}

const SELECT_LIKE: &[Clause] = &[
    Clause::Select,
    Clause::Where,
    Clause::GroupBy,
    Clause::Having,
    Clause::OrderBy,
];

#[track_caller]
fn require_fields(method: &str, fields: &[&str]) {
    if fields.iter().all(|f| f.is_empty()) {
        panic!("QueryBuilder::{method}() needs at least one field");
    }
}

#[track_caller]
fn missing_column(index: usize, column: &str) -> ! {
    panic!("QueryBuilder::values(): row {index} has no value for column `{column}`")
}

/// Every row carries a non-NULL value for every column.
#[track_caller]
fn require_present(columns: &[String], rows: &[Record]) {
    for (index, row) in rows.iter().enumerate() {
        if let Some(column) = columns
            .iter()
            .find(|c| row.get(*c).is_none_or(Value::is_null))
        {
            missing_column(index, column);
        }
    }
}

/// Fluent builder for one SQL statement.
///
/// Clause methods consume and return the builder. Accessors and
/// [`run`](Self::run) borrow it, so a built statement can be inspected and
/// executed more than once.
pub struct QueryBuilder<'e, E: Executor> {
    executor: &'e E,
    driver: Driver,
    clause: Clause,
    rollup: bool,
    sql: String,
    values: Vec<Value>,
    insert: Option<InsertTarget>,
}

impl<E: Executor> fmt::Debug for QueryBuilder<'_, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryBuilder")
            .field("clause", &self.clause)
            .field("rollup", &self.rollup)
            .field("sql", &self.sql)
            .field("values", &self.values.len())
            .finish()
    }
}

impl<'e, E: Executor> QueryBuilder<'e, E> {
    pub fn new(executor: &'e E) -> Self {
        Self {
            driver: executor.driver(),
            executor,
            clause: Clause::Empty,
            rollup: false,
            sql: String::new(),
            values: Vec::new(),
            insert: None,
        }
    }

    #[track_caller]
    fn require(&self, method: &str, allowed: &[Clause]) {
        if !allowed.contains(&self.clause) {
            let allowed: Vec<&str> = allowed.iter().map(|c| c.name()).collect();
            panic!(
                "QueryBuilder::{method}() cannot follow {}; it may only follow: {}",
                self.clause,
                allowed.join(", ")
            );
        }
    }

    fn enter(&mut self, clause: Clause) {
        self.clause = clause;
        self.rollup = false;
    }

    fn push_list(&mut self, fields: &[&str]) {
        self.sql.push_str(&fields.join(", "));
    }

    fn push_condition(&mut self, keyword: &str, field: &str, op: Op, value: Value) {
        self.sql.push(' ');
        self.sql.push_str(keyword);
        self.sql.push(' ');
        self.sql.push_str(field);
        self.sql.push_str(op.as_sql());
        self.sql.push('?');
        self.values.push(value);
    }

    /// `SELECT a, b`, or `SELECT *` when no non-empty field is given.
    #[track_caller]
    pub fn select(mut self, fields: &[&str]) -> Self {
        self.require("select", &[Clause::Empty]);
        self.sql.push_str("SELECT ");
        let fields: Vec<&str> = fields.iter().copied().filter(|f| !f.is_empty()).collect();
        if fields.is_empty() {
            self.sql.push('*');
        } else {
            self.push_list(&fields);
        }
        self.enter(Clause::Select);
        self
    }

    /// ` FROM table`. A plain (dotted) table name is quoted; anything else,
    /// such as `"users u"` or a join, is emitted as written.
    #[track_caller]
    pub fn from(mut self, table: &str) -> Self {
        self.require("from", &[Clause::Select]);
        self.sql.push_str(" FROM ");
        self.sql.push_str(&self.driver.quote_table_ref(table));
        self
    }

    /// ` WHERE field OP ?`, after SELECT, SET or DELETE.
    #[track_caller]
    pub fn where_(mut self, field: &str, op: Op, value: impl Into<Value>) -> Self {
        self.require("where_", &[Clause::Select, Clause::Set, Clause::Delete]);
        self.push_condition("WHERE", field, op, value.into());
        self.enter(Clause::Where);
        self
    }

    #[track_caller]
    fn connective(mut self, method: &str, keyword: &str, field: &str, op: Op, value: Value) -> Self {
        self.require(method, &[Clause::Where, Clause::Having]);
        self.push_condition(keyword, field, op, value);
        self
    }

    #[track_caller]
    pub fn and(self, field: &str, op: Op, value: impl Into<Value>) -> Self {
        self.connective("and", "AND", field, op, value.into())
    }

    #[track_caller]
    pub fn or(self, field: &str, op: Op, value: impl Into<Value>) -> Self {
        self.connective("or", "OR", field, op, value.into())
    }

    #[track_caller]
    pub fn xor(self, field: &str, op: Op, value: impl Into<Value>) -> Self {
        self.connective("xor", "XOR", field, op, value.into())
    }

    #[track_caller]
    pub fn group_by(mut self, fields: &[&str]) -> Self {
        self.require("group_by", &[Clause::Select, Clause::Where]);
        require_fields("group_by", fields);
        self.sql.push_str(" GROUP BY ");
        self.push_list(fields);
        self.enter(Clause::GroupBy);
        self
    }

    #[track_caller]
    pub fn having(mut self, field: &str, op: Op, value: impl Into<Value>) -> Self {
        self.require("having", &[Clause::Select, Clause::Where, Clause::GroupBy]);
        self.push_condition("HAVING", field, op, value.into());
        self.enter(Clause::Having);
        self
    }

    /// ` ORDER BY a, b`. Fields may carry a direction, e.g. `"name DESC"`.
    #[track_caller]
    pub fn order_by(mut self, fields: &[&str]) -> Self {
        self.require(
            "order_by",
            &[Clause::Select, Clause::Where, Clause::GroupBy, Clause::Having],
        );
        require_fields("order_by", fields);
        self.sql.push_str(" ORDER BY ");
        self.push_list(fields);
        self.enter(Clause::OrderBy);
        self
    }

    /// ` LIMIT offset, rows` or ` LIMIT rows`.
    #[track_caller]
    pub fn limit(mut self, rows: u64, offset: Option<u64>) -> Self {
        self.require("limit", SELECT_LIKE);
        match offset {
            Some(offset) => self.sql.push_str(&format!(" LIMIT {offset}, {rows}")),
            None => self.sql.push_str(&format!(" LIMIT {rows}")),
        }
        self.enter(Clause::Limit);
        self
    }

    /// Append ` WITH ROLLUP` to the current GROUP BY or ORDER BY.
    #[track_caller]
    pub fn with_rollup(mut self) -> Self {
        self.require("with_rollup", &[Clause::GroupBy, Clause::OrderBy]);
        if self.rollup {
            panic!(
                "QueryBuilder::with_rollup() called twice on the same {}",
                self.clause
            );
        }
        self.sql.push_str(" WITH ROLLUP");
        self.rollup = true;
        self
    }

    #[track_caller]
    pub fn insert(mut self, table: &str) -> Self {
        self.require("insert", &[Clause::Empty]);
        self.sql.push_str("INSERT INTO ");
        self.sql.push_str(&self.driver.quote_ident(table));
        self.insert = Some(InsertTarget {
            table: table.to_string(),
            columns: Vec::new(),
        });
        self.enter(Clause::Insert);
        self
    }

    /// Name the columns `values()` fills. An empty list leaves the column
    /// set to be described from the table.
    #[track_caller]
    pub fn col_names(mut self, columns: &[&str]) -> Self {
        self.require("col_names", &[Clause::Insert]);
        if !columns.is_empty() {
            let quoted: Vec<String> = columns
                .iter()
                .map(|c| self.driver.quote_ident(c))
                .collect();
            self.sql.push_str(" (");
            self.sql.push_str(&quoted.join(", "));
            self.sql.push(')');
            if let Some(target) = self.insert.as_mut() {
                target.columns = columns.iter().map(|c| c.to_string()).collect();
            }
        }
        self.enter(Clause::InsertInto);
        self
    }

    /// Append one value tuple per row, in resolved column order.
    ///
    /// When no column list was given, the columns of the target table are
    /// fetched with [`Executor::describe_columns`] first; a describe failure
    /// is returned as an error. Calling this again appends more tuples.
    ///
    /// # Panics
    ///
    /// At the call site: from the wrong clause, with no rows, or when a row
    /// misses a named column under [`NullPolicy::ThrowOnNull`].
    ///
    /// When the columns have to be described, the returned future panics
    /// when polled if the table resolves to no columns or a row misses one
    /// under [`NullPolicy::ThrowOnNull`].
    #[track_caller]
    pub fn values(
        mut self,
        policy: NullPolicy,
        rows: Vec<Record>,
    ) -> impl Future<Output = BridgeResult<Self>> + Send {
        self.require(
            "values",
            &[Clause::Insert, Clause::InsertInto, Clause::Values],
        );
        if rows.is_empty() {
            panic!("QueryBuilder::values() needs at least one row");
        }
        let target = self.insert.take().unwrap_or_default();
        if policy == NullPolicy::ThrowOnNull {
            require_present(&target.columns, &rows);
        }

        async move {
            let mut target = target;
            if target.columns.is_empty() {
                target.columns = self.executor.describe_columns(&target.table).await?;
            }
            if target.columns.is_empty() {
                panic!(
                    "QueryBuilder::values() could not resolve any column for table {}",
                    self.driver.quote_ident(&target.table)
                );
            }

            self.sql.push_str(if self.clause == Clause::Values {
                ", "
            } else {
                " VALUES "
            });

            let mut tuples = Vec::with_capacity(rows.len());
            for (index, row) in rows.into_iter().enumerate() {
                let mut slots = Vec::with_capacity(target.columns.len());
                for column in &target.columns {
                    match row.get(column).filter(|v| !v.is_null()) {
                        Some(value) => {
                            slots.push("?");
                            self.values.push(value.clone());
                        }
                        None => match policy {
                            NullPolicy::ThrowOnNull => missing_column(index, column),
                            NullPolicy::DefaultOnNull => slots.push("DEFAULT"),
                            NullPolicy::NullOnNull => {
                                slots.push("?");
                                self.values.push(Value::Null);
                            }
                        },
                    }
                }
                tuples.push(format!("({})", slots.join(", ")));
            }
            self.sql.push_str(&tuples.join(", "));

            self.insert = Some(target);
            self.enter(Clause::Values);
            Ok(self)
        }
    }

    #[track_caller]
    pub fn update(mut self, table: &str) -> Self {
        self.require("update", &[Clause::Empty]);
        self.sql.push_str("UPDATE ");
        self.sql.push_str(&self.driver.quote_ident(table));
        self.enter(Clause::Update);
        self
    }

    /// ` SET a=?, b=?` in iteration order.
    #[track_caller]
    pub fn set<K, V>(mut self, assignments: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.require("set", &[Clause::Update]);
        let mut parts = Vec::new();
        for (column, value) in assignments {
            parts.push(format!("{}=?", column.as_ref()));
            self.values.push(value.into());
        }
        if parts.is_empty() {
            panic!("QueryBuilder::set() needs at least one assignment");
        }
        self.sql.push_str(" SET ");
        self.sql.push_str(&parts.join(", "));
        self.enter(Clause::Set);
        self
    }

    #[track_caller]
    pub fn delete(mut self, table: &str) -> Self {
        self.require("delete", &[Clause::Empty]);
        self.sql.push_str("DELETE FROM ");
        self.sql.push_str(&self.driver.quote_ident(table));
        self.enter(Clause::Delete);
        self
    }

    /// Back to the empty state, dropping text, values and INSERT extras.
    pub fn reset(mut self) -> Self {
        self.sql.clear();
        self.values.clear();
        self.insert = None;
        self.enter(Clause::Empty);
        self
    }

    /// SQL text built so far.
    pub fn query_text(&self) -> &str {
        &self.sql
    }

    /// Values bound so far, in placeholder order.
    pub fn bound_values(&self) -> &[Value] {
        &self.values
    }

    pub fn clause(&self) -> Clause {
        self.clause
    }

    pub fn is_rolled_up(&self) -> bool {
        self.rollup
    }

    /// Execute the statement through the owning executor.
    ///
    /// # Panics
    ///
    /// On an empty builder.
    #[track_caller]
    pub fn run(&self) -> impl Future<Output = BridgeResult<Arc<ResultSet>>> + Send + '_ {
        if self.clause == Clause::Empty {
            panic!("QueryBuilder::run() called on an empty builder");
        }
        self.executor.query(&self.sql, &self.values)
    }
}
