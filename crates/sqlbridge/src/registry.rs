//! One service per data source identity.

use crate::client::Connector;
use crate::config::ServiceOptions;
use crate::datasource::{DataSource, DataSourceKey, ResolvedDataSource};
use crate::driver::Driver;
use crate::error::BridgeResult;
use crate::service::Service;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Maps resolved data sources to their live [`Service`].
///
/// The application owns the registry, typically one per process, and calls
/// [`shutdown`](Self::shutdown) before exiting.
///
/// ```ignore
/// let registry = Registry::new(MySqlConnector::new());
/// let svc = registry
///     .get_instance_for(source, Driver::MySql, ServiceOptions::default())
///     .await?;
/// // ...
/// registry.shutdown().await?;
/// ```
pub struct Registry<C: Connector> {
    connector: C,
    services: Mutex<BTreeMap<DataSourceKey, Arc<Service<C::Handle>>>>,
}

impl<C: Connector> Registry<C> {
    pub fn new(connector: C) -> Self {
        Self {
            connector,
            services: Mutex::new(BTreeMap::new()),
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Resolve `source` for `driver` against the drivers the connector
    /// supports.
    pub fn resolve(&self, source: DataSource, driver: Driver) -> BridgeResult<ResolvedDataSource> {
        source.resolve(driver, self.connector.supported_drivers())
    }

    /// Resolve `source`, then return its service.
    pub async fn get_instance_for(
        &self,
        source: DataSource,
        driver: Driver,
        options: ServiceOptions,
    ) -> BridgeResult<Arc<Service<C::Handle>>> {
        let resolved = self.resolve(source, driver)?;
        self.get_instance(&resolved, options).await
    }

    /// The service for `source`, connecting on first use.
    ///
    /// The registry lock is held while connecting, so concurrent callers for
    /// one identity see a single connection. `options` only apply when this
    /// call creates the service.
    pub async fn get_instance(
        &self,
        source: &ResolvedDataSource,
        options: ServiceOptions,
    ) -> BridgeResult<Arc<Service<C::Handle>>> {
        let key = source.key();
        let mut services = self.services.lock().await;

        if let Some(existing) = services.get(&key) {
            tracing::trace!(target: "sqlbridge.registry", source = %source.describe(), "reusing service");
            return Ok(Arc::clone(existing));
        }

        let handle = self.connector.connect(source, &options).await?;
        tracing::info!(target: "sqlbridge.registry", source = %source.describe(), "connected");

        let service = Arc::new(Service::new(handle, options));
        services.insert(key, Arc::clone(&service));
        Ok(service)
    }

    pub async fn contains(&self, source: &ResolvedDataSource) -> bool {
        self.services.lock().await.contains_key(&source.key())
    }

    pub async fn keys(&self) -> Vec<DataSourceKey> {
        self.services.lock().await.keys().cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.services.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.services.lock().await.is_empty()
    }

    /// Close every service and empty the registry.
    ///
    /// All services are closed even if one fails; the first error is
    /// returned.
    pub async fn shutdown(&self) -> BridgeResult<()> {
        let services = std::mem::take(&mut *self.services.lock().await);
        let mut first_err = None;

        for (_, service) in services {
            if let Err(err) = service.close().await {
                tracing::warn!(target: "sqlbridge.registry", error = %err, "failed to close service");
                first_err.get_or_insert(err);
            }
        }
        tracing::info!(target: "sqlbridge.registry", "registry shut down");

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests;
