use super::*;
use crate::client::NativeHandle;
use crate::datasource::Credentials;
use crate::error::BridgeError;
use crate::row::ResultSet;
use crate::value::Bind;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Default)]
struct CountingConnector {
    connects: AtomicUsize,
    closes: Arc<AtomicUsize>,
    refuse: bool,
}

struct NullHandle {
    closes: Arc<AtomicUsize>,
    fail_close: bool,
}

impl NativeHandle for NullHandle {
    fn driver(&self) -> Driver {
        Driver::MySql
    }

    async fn execute(&mut self, _: &str, _: &[Bind]) -> BridgeResult<ResultSet> {
        Ok(ResultSet::default())
    }

    async fn begin(&mut self) -> BridgeResult<()> {
        Ok(())
    }

    async fn commit(&mut self) -> BridgeResult<()> {
        Ok(())
    }

    async fn rollback(&mut self) -> BridgeResult<()> {
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        false
    }

    async fn close(self) -> BridgeResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        if self.fail_close {
            return Err(BridgeError::Connection("socket already gone".into()));
        }
        Ok(())
    }
}

impl Connector for CountingConnector {
    type Handle = NullHandle;

    fn supported_drivers(&self) -> &[Driver] {
        Driver::ALL
    }

    async fn connect(
        &self,
        source: &ResolvedDataSource,
        _: &ServiceOptions,
    ) -> BridgeResult<NullHandle> {
        if self.refuse {
            return Err(BridgeError::Connection(format!(
                "cannot reach {}",
                source.describe()
            )));
        }
        self.connects.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        Ok(NullHandle {
            closes: Arc::clone(&self.closes),
            fail_close: source.database() == "flaky",
        })
    }
}

fn source(pairs: &[(&str, &str)]) -> DataSource {
    DataSource::from_pairs(
        pairs.iter().copied(),
        Some(Credentials::interned(Some("app"), Some("pw"))),
    )
}

#[tokio::test]
async fn same_identity_returns_same_service() {
    let registry = Registry::new(CountingConnector::default());

    let a = registry
        .get_instance_for(
            source(&[("host", "db"), ("port", "3306"), ("database", "app")]),
            Driver::MySql,
            ServiceOptions::default(),
        )
        .await
        .unwrap();
    let b = registry
        .get_instance_for(
            source(&[("database", "app"), ("port", "3306"), ("host", "db")]),
            Driver::MySql,
            ServiceOptions::default(),
        )
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(registry.connector().connects.load(Ordering::SeqCst), 1);
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn different_host_or_database_gets_own_service() {
    let registry = Registry::new(CountingConnector::default());
    let opts = ServiceOptions::default;

    let base = registry
        .get_instance_for(source(&[("host", "db"), ("database", "app")]), Driver::MySql, opts())
        .await
        .unwrap();
    let host = registry
        .get_instance_for(source(&[("host", "db2"), ("database", "app")]), Driver::MySql, opts())
        .await
        .unwrap();
    let db = registry
        .get_instance_for(source(&[("host", "db"), ("database", "logs")]), Driver::MySql, opts())
        .await
        .unwrap();

    assert!(!Arc::ptr_eq(&base, &host));
    assert!(!Arc::ptr_eq(&base, &db));
    assert_eq!(registry.keys().await.len(), 3);
}

#[tokio::test]
async fn options_apply_only_at_construction() {
    let registry = Registry::new(CountingConnector::default());
    let resolved = registry
        .resolve(source(&[("host", "db"), ("database", "app")]), Driver::MySql)
        .unwrap();

    let first = registry
        .get_instance(&resolved, ServiceOptions::new().no_result_cache())
        .await
        .unwrap();
    let second = registry
        .get_instance(&resolved, ServiceOptions::default())
        .await
        .unwrap();

    assert!(Arc::ptr_eq(&first, &second));
    assert!(!second.options().result_cache.enabled);
    assert!(registry.contains(&resolved).await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_construct_once() {
    let registry = Arc::new(Registry::new(CountingConnector::default()));
    let resolved = registry
        .resolve(source(&[("socket", "/run/mysqld.sock"), ("database", "app")]), Driver::MySql)
        .unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            let registry = Arc::clone(&registry);
            let resolved = resolved.clone();
            tokio::spawn(async move {
                registry
                    .get_instance(&resolved, ServiceOptions::default())
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut services = Vec::new();
    for task in tasks {
        services.push(task.await.unwrap());
    }

    assert_eq!(registry.connector().connects.load(Ordering::SeqCst), 1);
    assert!(services.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
}

#[tokio::test]
async fn invalid_descriptor_never_connects() {
    let registry = Registry::new(CountingConnector::default());
    let err = registry
        .get_instance_for(source(&[("host", "db")]), Driver::MySql, ServiceOptions::default())
        .await
        .unwrap_err();

    assert!(err.is_config());
    assert_eq!(registry.connector().connects.load(Ordering::SeqCst), 0);
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn failed_connect_is_not_registered() {
    let registry = Registry::new(CountingConnector {
        refuse: true,
        ..CountingConnector::default()
    });
    let err = registry
        .get_instance_for(
            source(&[("host", "db"), ("database", "app")]),
            Driver::MySql,
            ServiceOptions::default(),
        )
        .await
        .unwrap_err();

    assert!(matches!(err, BridgeError::Connection(_)));
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn shutdown_closes_every_service() {
    let registry = Registry::new(CountingConnector::default());
    let mut services = Vec::new();
    for database in ["app", "flaky", "logs"] {
        services.push(
            registry
                .get_instance_for(
                    source(&[("host", "db"), ("database", database)]),
                    Driver::MySql,
                    ServiceOptions::default(),
                )
                .await
                .unwrap(),
        );
    }

    let err = registry.shutdown().await.unwrap_err();
    assert!(matches!(err, BridgeError::Connection(_)));
    assert_eq!(registry.connector().closes.load(Ordering::SeqCst), 3);
    assert!(registry.is_empty().await);
    for svc in &services {
        assert!(svc.is_closed().await);
    }
}
