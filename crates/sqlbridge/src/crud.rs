//! Table-level helpers on [`Service`].
//!
//! Each helper has a `*_query` twin that returns the prepared builder
//! without executing it.

use crate::builder::{NullPolicy, Op, QueryBuilder, Record};
use crate::client::{Executor, NativeHandle};
use crate::error::BridgeResult;
use crate::row::ResultSet;
use crate::service::Service;
use crate::value::Value;
use std::sync::Arc;

/// `column = value` pairs, joined with AND.
pub type Conditions<'a> = &'a [(&'a str, Value)];

fn where_all<'e, E: Executor>(
    query: QueryBuilder<'e, E>,
    conditions: Conditions<'_>,
) -> QueryBuilder<'e, E> {
    conditions
        .iter()
        .enumerate()
        .fold(query, |q, (i, (column, value))| {
            if i == 0 {
                q.where_(column, Op::Eq, value.clone())
            } else {
                q.and(column, Op::Eq, value.clone())
            }
        })
}

impl<H: NativeHandle> Service<H> {
    /// `SELECT columns FROM table`; an empty column list selects `*`.
    pub fn select_query(&self, columns: &[&str], table: &str) -> QueryBuilder<'_, Self> {
        self.builder().select(columns).from(table)
    }

    pub async fn select(&self, columns: &[&str], table: &str) -> BridgeResult<Arc<ResultSet>> {
        self.select_query(columns, table).run().await
    }

    /// Multi-row INSERT over the table's described columns. Columns a row
    /// leaves out get their `DEFAULT`.
    pub async fn insert_query(
        &self,
        table: &str,
        rows: Vec<Record>,
    ) -> BridgeResult<QueryBuilder<'_, Self>> {
        self.builder()
            .insert(table)
            .values(NullPolicy::DefaultOnNull, rows)
            .await
    }

    pub async fn insert(&self, table: &str, rows: Vec<Record>) -> BridgeResult<Arc<ResultSet>> {
        self.insert_query(table, rows).await?.run().await
    }

    pub fn update_query<K, V>(
        &self,
        table: &str,
        assignments: impl IntoIterator<Item = (K, V)>,
        conditions: Conditions<'_>,
    ) -> QueryBuilder<'_, Self>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        where_all(self.builder().update(table).set(assignments), conditions)
    }

    pub async fn update<K, V>(
        &self,
        table: &str,
        assignments: impl IntoIterator<Item = (K, V)>,
        conditions: Conditions<'_>,
    ) -> BridgeResult<Arc<ResultSet>>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        self.update_query(table, assignments, conditions).run().await
    }

    /// `DELETE FROM table`, with a WHERE clause only when conditions are given.
    pub fn delete_query(&self, table: &str, conditions: Conditions<'_>) -> QueryBuilder<'_, Self> {
        where_all(self.builder().delete(table), conditions)
    }

    pub async fn delete(&self, table: &str, conditions: Conditions<'_>) -> BridgeResult<Arc<ResultSet>> {
        self.delete_query(table, conditions).run().await
    }
}
