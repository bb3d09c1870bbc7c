//! Driver-facing traits.
//!
//! - [`NativeHandle`] is the raw connection a [`Service`](crate::Service)
//!   owns exclusively.
//! - [`Connector`] opens native handles for resolved data sources.
//! - [`Executor`] is what the query builder needs from its owner: run a
//!   statement and describe a table's columns.

use crate::builder::QueryBuilder;
use crate::config::ServiceOptions;
use crate::datasource::ResolvedDataSource;
use crate::driver::Driver;
use crate::error::{BridgeError, BridgeResult};
use crate::row::ResultSet;
use crate::value::{Bind, Value};
use std::future::Future;
use std::sync::Arc;

/// A live database connection.
///
/// Implementations should report database-side failures as
/// [`BridgeError::Execution`] so the native error info reaches the caller.
pub trait NativeHandle: Send + 'static {
    /// Driver this handle speaks.
    fn driver(&self) -> Driver;

    /// Validate `sql` with the server before execution.
    ///
    /// The default implementation accepts everything and leaves errors to
    /// [`NativeHandle::execute`].
    fn prepare(&mut self, sql: &str) -> impl Future<Output = BridgeResult<()>> + Send {
        let _ = sql;
        async { Ok(()) }
    }

    /// Execute `sql` with the given binds, in placeholder order.
    fn execute(
        &mut self,
        sql: &str,
        binds: &[Bind],
    ) -> impl Future<Output = BridgeResult<ResultSet>> + Send;

    fn begin(&mut self) -> impl Future<Output = BridgeResult<()>> + Send;

    fn commit(&mut self) -> impl Future<Output = BridgeResult<()>> + Send;

    fn rollback(&mut self) -> impl Future<Output = BridgeResult<()>> + Send;

    fn in_transaction(&self) -> bool;

    /// Release the connection.
    fn close(self) -> impl Future<Output = BridgeResult<()>> + Send
    where
        Self: Sized,
    {
        async { Ok(()) }
    }
}

/// Opens native handles.
pub trait Connector: Send + Sync + 'static {
    type Handle: NativeHandle;

    /// Drivers this runtime can open; descriptors naming other drivers are
    /// rejected during resolution.
    fn supported_drivers(&self) -> &[Driver];

    fn connect(
        &self,
        source: &ResolvedDataSource,
        options: &ServiceOptions,
    ) -> impl Future<Output = BridgeResult<Self::Handle>> + Send;
}

/// Something that can run statements on behalf of a [`QueryBuilder`].
pub trait Executor: Send + Sync {
    /// Dialect to render SQL with.
    fn driver(&self) -> Driver;

    /// Execute `sql` with `values` bound to its `?` placeholders.
    fn query(
        &self,
        sql: &str,
        values: &[Value],
    ) -> impl Future<Output = BridgeResult<Arc<ResultSet>>> + Send;

    /// Column names of `table`, in table order.
    ///
    /// The default implementation issues `SHOW COLUMNS FROM <table>` and
    /// reads the `Field` column.
    fn describe_columns(
        &self,
        table: &str,
    ) -> impl Future<Output = BridgeResult<Vec<String>>> + Send {
        async move {
            let sql = format!("SHOW COLUMNS FROM {}", self.driver().quote_ident(table));
            let result = self.query(&sql, &[]).await?;
            let fields = result.column("Field").ok_or_else(|| {
                BridgeError::decode("Field", format!("no Field column describing {table}"))
            })?;
            fields
                .into_iter()
                .map(|v| match v {
                    Value::Text(name) => Ok(name.clone()),
                    Value::Bytes(raw) => Ok(String::from_utf8_lossy(raw).into_owned()),
                    other => Err(BridgeError::decode(
                        "Field",
                        format!("unexpected column name value {other:?}"),
                    )),
                })
                .collect()
        }
    }

    /// Start a new query builder bound to this executor.
    fn builder(&self) -> QueryBuilder<'_, Self>
    where
        Self: Sized,
    {
        QueryBuilder::new(self)
    }
}
