//! The per-data-source service.
//!
//! A [`Service`] owns one native handle and brokers every statement that
//! runs on it:
//!
//! 1. string values are screened against injection signatures;
//! 2. values are coerced to their bind types;
//! 3. SELECTs go through the single-flight result cache, everything else
//!    executes directly;
//! 4. on failure, the native error info is recorded and an open transaction
//!    is rolled back before the error reaches the caller.
//!
//! ```ignore
//! let svc = registry.get_instance(&source, ServiceOptions::default()).await?;
//! let users = svc.query("SELECT * FROM `users` WHERE id=?", &[7.into()]).await?;
//! ```

use crate::builder::QueryBuilder;
use crate::cache::{CacheStats, Probe, ResultCache};
use crate::client::{Executor, NativeHandle};
use crate::config::{InjectionPolicy, ServiceOptions};
use crate::driver::Driver;
use crate::error::{BridgeError, BridgeResult, ErrorInfo};
use crate::inject;
use crate::row::ResultSet;
use crate::value::{Bind, Value};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// A prepared statement.
///
/// Statements carry only their text; the native handle keeps whatever
/// server-side state preparation created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    text: String,
}

impl Statement {
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Whether this statement reads rows with SELECT.
    pub fn is_select(&self) -> bool {
        is_select(&self.text)
    }
}

pub(crate) fn is_select(sql: &str) -> bool {
    sql.trim_start()
        .get(..6)
        .is_some_and(|head| head.eq_ignore_ascii_case("SELECT"))
}

/// Metadata statements that never change data.
pub(crate) fn is_read_only(sql: &str) -> bool {
    let head = sql
        .trim_start()
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or("");
    ["SHOW", "DESCRIBE", "DESC", "EXPLAIN"]
        .iter()
        .any(|kw| head.eq_ignore_ascii_case(kw))
}

fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

fn into_transaction_error(err: BridgeError) -> BridgeError {
    match err {
        BridgeError::Transaction(_) | BridgeError::Closed => err,
        other => BridgeError::transaction(other.to_string()),
    }
}

/// One database connection plus its result cache and bookkeeping.
pub struct Service<H: NativeHandle> {
    handle: tokio::sync::Mutex<Option<H>>,
    driver: Driver,
    options: ServiceOptions,
    cache: Option<ResultCache>,
    last_insert_id: Mutex<Option<u64>>,
    last_error: Mutex<Option<ErrorInfo>>,
}

impl<H: NativeHandle> std::fmt::Debug for Service<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("driver", &self.driver)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl<H: NativeHandle> Service<H> {
    /// Wrap an open native handle.
    pub fn new(handle: H, options: ServiceOptions) -> Self {
        let cache = options
            .result_cache
            .enabled
            .then(|| ResultCache::new(options.result_cache));
        Self {
            driver: handle.driver(),
            handle: tokio::sync::Mutex::new(Some(handle)),
            options,
            cache,
            last_insert_id: Mutex::new(None),
            last_error: Mutex::new(None),
        }
    }

    pub fn driver(&self) -> Driver {
        self.driver
    }

    pub fn options(&self) -> &ServiceOptions {
        &self.options
    }

    /// Start a query builder for this service's dialect.
    pub fn builder(&self) -> QueryBuilder<'_, Self> {
        QueryBuilder::new(self)
    }

    /// Prepare `text` on the native handle.
    pub async fn prepare(&self, text: &str) -> BridgeResult<Statement> {
        let mut guard = self.handle.lock().await;
        let handle = guard.as_mut().ok_or(BridgeError::Closed)?;

        match handle.prepare(text).await {
            Ok(()) => Ok(Statement {
                text: text.to_string(),
            }),
            Err(err) => Err(self.fail(handle, text, err).await),
        }
    }

    /// Prepare `text` and run it with `values` bound in placeholder order.
    pub async fn query(&self, text: &str, values: &[Value]) -> BridgeResult<Arc<ResultSet>> {
        let stmt = self.prepare(text).await?;
        self.query_prepared(&stmt, values).await
    }

    /// Run a prepared statement, inferring each value's bind type.
    pub async fn query_prepared(
        &self,
        stmt: &Statement,
        values: &[Value],
    ) -> BridgeResult<Arc<ResultSet>> {
        let binds: Vec<Bind> = values.iter().cloned().map(Bind::inferred).collect();
        self.query_binds(stmt, &binds).await
    }

    /// Run a prepared statement with explicitly typed binds.
    pub async fn query_binds(
        &self,
        stmt: &Statement,
        binds: &[Bind],
    ) -> BridgeResult<Arc<ResultSet>> {
        self.screen(binds)?;

        let binds = binds
            .iter()
            .map(|b| Ok(Bind::typed(b.coerced()?, b.ty)))
            .collect::<BridgeResult<Vec<_>>>()?;
        let sql = stmt.text();

        if stmt.is_select() {
            if let Some(cache) = &self.cache {
                let values: Vec<Value> = binds.iter().map(|b| b.value.clone()).collect();
                let key = self.driver.cache_key(sql, &values);
                let (result, probe) = cache
                    .get_or_execute(&key, || self.execute(sql, &binds))
                    .await;
                if probe == Probe::Hit {
                    tracing::trace!(target: "sqlbridge.cache", driver = %self.driver, "result cache hit");
                } else {
                    tracing::trace!(target: "sqlbridge.cache", driver = %self.driver, "result cache miss");
                }
                return result;
            }
            return self.execute(sql, &binds).await;
        }

        let result = self.execute(sql, &binds).await?;
        if self.options.invalidate_cache_on_write && !is_read_only(sql) {
            if let Some(cache) = &self.cache {
                cache.clear();
            }
        }
        Ok(result)
    }

    fn screen(&self, binds: &[Bind]) -> BridgeResult<()> {
        let values = binds.iter().map(|b| &b.value);
        match self.options.injection_policy {
            InjectionPolicy::Off => Ok(()),
            InjectionPolicy::Reject => inject::screen(values),
            InjectionPolicy::Warn => {
                for (index, value) in values.enumerate() {
                    if let Some(pattern) = value.as_str().and_then(inject::find_signature) {
                        tracing::warn!(
                            target: "sqlbridge.sql",
                            param = index + 1,
                            pattern,
                            "bound value matches an injection signature"
                        );
                    }
                }
                Ok(())
            }
        }
    }

    async fn execute(&self, sql: &str, binds: &[Bind]) -> BridgeResult<Arc<ResultSet>> {
        let mut guard = self.handle.lock().await;
        let handle = guard.as_mut().ok_or(BridgeError::Closed)?;

        self.log_statement(sql, binds.len());

        match handle.execute(sql, binds).await {
            Ok(result) => {
                if let Some(id) = result.last_insert_id() {
                    *lock(&self.last_insert_id) = Some(id);
                }
                *lock(&self.last_error) = None;
                Ok(Arc::new(result))
            }
            Err(err) => Err(self.fail(handle, sql, err).await),
        }
    }

    /// Record `err`, roll back any open transaction and hand the error back.
    async fn fail(&self, handle: &mut H, sql: &str, err: BridgeError) -> BridgeError {
        let info = err
            .info()
            .cloned()
            .unwrap_or_else(|| ErrorInfo::new(err.to_string()));
        *lock(&self.last_error) = Some(info);

        if handle.in_transaction() {
            match handle.rollback().await {
                Ok(()) => tracing::warn!(
                    target: "sqlbridge.sql",
                    sql = %self.shown_sql(sql),
                    "statement failed inside a transaction; rolled back"
                ),
                Err(rollback_err) => tracing::error!(
                    target: "sqlbridge.sql",
                    error = %rollback_err,
                    "rollback after failed statement also failed"
                ),
            }
        }

        tracing::debug!(target: "sqlbridge.sql", error = %err, "statement failed");
        err
    }

    fn shown_sql<'a>(&self, sql: &'a str) -> std::borrow::Cow<'a, str> {
        match self.options.max_logged_sql {
            Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(sql, max)).into(),
            _ => sql.into(),
        }
    }

    fn log_statement(&self, sql: &str, param_count: usize) {
        if !self.options.log_statements {
            return;
        }
        tracing::debug!(
            target: "sqlbridge.sql",
            driver = %self.driver,
            param_count,
            sql = %self.shown_sql(sql),
        );
    }

    /// Open a transaction. Only one may be open at a time.
    pub async fn begin_transaction(&self) -> BridgeResult<()> {
        let mut guard = self.handle.lock().await;
        let handle = guard.as_mut().ok_or(BridgeError::Closed)?;
        if handle.in_transaction() {
            return Err(BridgeError::transaction(
                "There is already an active transaction",
            ));
        }
        handle.begin().await.map_err(into_transaction_error)
    }

    pub async fn commit(&self) -> BridgeResult<()> {
        let mut guard = self.handle.lock().await;
        let handle = guard.as_mut().ok_or(BridgeError::Closed)?;
        if !handle.in_transaction() {
            return Err(BridgeError::transaction("There is no active transaction"));
        }
        handle.commit().await.map_err(into_transaction_error)
    }

    pub async fn roll_back(&self) -> BridgeResult<()> {
        let mut guard = self.handle.lock().await;
        let handle = guard.as_mut().ok_or(BridgeError::Closed)?;
        if !handle.in_transaction() {
            return Err(BridgeError::transaction("There is no active transaction"));
        }
        handle.rollback().await.map_err(into_transaction_error)
    }

    /// Whether a transaction is open. A closed service reports `false`.
    pub async fn in_transaction(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| h.in_transaction())
    }

    /// Auto-increment id produced by the most recent successful statement
    /// that generated one.
    pub fn last_insert_id(&self) -> Option<u64> {
        *lock(&self.last_insert_id)
    }

    /// Native error info of the last statement, if it failed.
    pub fn error_info(&self) -> Option<ErrorInfo> {
        lock(&self.last_error).clone()
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.as_ref().map(ResultCache::stats).unwrap_or_default()
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }

    pub async fn is_closed(&self) -> bool {
        self.handle.lock().await.is_none()
    }

    /// Roll back any open transaction and release the handle.
    ///
    /// Closing twice is a no-op. Every later statement fails with
    /// [`BridgeError::Closed`].
    pub async fn close(&self) -> BridgeResult<()> {
        let Some(mut handle) = self.handle.lock().await.take() else {
            return Ok(());
        };
        self.clear_cache();

        let rolled_back = if handle.in_transaction() {
            tracing::warn!(target: "sqlbridge.sql", "closing service with an open transaction; rolling back");
            handle.rollback().await.map_err(into_transaction_error)
        } else {
            Ok(())
        };
        let closed = handle.close().await;
        rolled_back.and(closed)
    }
}

impl<H: NativeHandle> Drop for Service<H> {
    fn drop(&mut self) {
        if self
            .handle
            .get_mut()
            .as_ref()
            .is_some_and(|h| h.in_transaction())
        {
            tracing::warn!(
                target: "sqlbridge.sql",
                driver = %self.driver,
                "service dropped with an open transaction; call close() to roll it back"
            );
        }
    }
}

impl<H: NativeHandle> Executor for Service<H> {
    fn driver(&self) -> Driver {
        self.driver
    }

    async fn query(&self, sql: &str, values: &[Value]) -> BridgeResult<Arc<ResultSet>> {
        Service::query(self, sql, values).await
    }
}
