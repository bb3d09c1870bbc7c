//! # sqlbridge
//!
//! A small MySQL data-access layer.
//!
//! ## Features
//!
//! - **One connection per data source**: a [`Registry`] hands out a single
//!   [`Service`] per resolved descriptor identity
//! - **Clause-checked builder**: [`QueryBuilder`] panics when clauses are
//!   called out of order and keeps `?` values in placeholder order
//! - **Cached reads**: identical SELECTs (same text, same values) return the
//!   same `Arc<ResultSet>` without executing again, even under concurrency
//! - **Injection screening**: string values matching known payload
//!   signatures are rejected before execution (configurable)
//! - **Transactions**: failed statements roll back the open transaction
//!   before the error is returned
//!
//! ## Quick start
//!
//! ```ignore
//! use sqlbridge::{DataSource, Credentials, Driver, Op, Registry, ServiceOptions};
//! use sqlbridge::mysql::MySqlConnector;
//!
//! let registry = Registry::new(MySqlConnector::new());
//! let source = DataSource::from_pairs(
//!     [("host", "127.0.0.1"), ("port", "3306"), ("database", "app")],
//!     Some(Credentials::interned(Some("app"), Some("secret"))),
//! );
//! let svc = registry
//!     .get_instance_for(source, Driver::MySql, ServiceOptions::default())
//!     .await?;
//!
//! let rows = svc
//!     .builder()
//!     .select(&["id", "name"])
//!     .from("users")
//!     .where_("id", Op::Eq, 7)
//!     .run()
//!     .await?;
//!
//! svc.update("users", [("name", "Ana")], &[("id", 7.into())]).await?;
//! registry.shutdown().await?;
//! ```
//!
//! ## Logging
//!
//! Events are emitted with `tracing` under the targets `sqlbridge.sql`,
//! `sqlbridge.cache` and `sqlbridge.registry`. Bound values and passwords
//! are never logged.

pub mod builder;
pub(crate) mod cache;
pub mod client;
pub mod config;
pub mod crud;
pub mod datasource;
pub mod driver;
pub mod error;
pub mod inject;
#[cfg(feature = "mysql")]
pub mod mysql;
pub mod registry;
pub mod row;
pub mod service;
pub mod value;

pub use builder::{Clause, NullPolicy, Op, QueryBuilder, Record};
pub use cache::CacheStats;
pub use client::{Connector, Executor, NativeHandle};
pub use config::{InjectionPolicy, ResultCacheConfig, ServiceOptions};
pub use crud::Conditions;
pub use datasource::{
    Credentials, DataSource, DataSourceConfig, DataSourceKey, Endpoint, ResolvedDataSource,
};
pub use driver::Driver;
pub use error::{BridgeError, BridgeResult, ErrorInfo};
pub use registry::Registry;
pub use row::{ResultSet, Row};
pub use service::{Service, Statement};
pub use value::{Bind, ParamType, Value};
