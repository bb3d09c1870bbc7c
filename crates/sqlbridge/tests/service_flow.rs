//! End-to-end flows through the public API with an in-memory driver.

use sqlbridge::{
    Bind, BridgeError, BridgeResult, Connector, Credentials, DataSource, Driver, ErrorInfo,
    NativeHandle, NullPolicy, Op, Record, Registry, ResolvedDataSource, ResultSet, ServiceOptions,
    Value,
};
use std::sync::{Arc, Mutex};

/// Every statement the fake server saw, across all connections.
type Journal = Arc<Mutex<Vec<String>>>;

struct FakeConnector {
    journal: Journal,
}

struct FakeHandle {
    journal: Journal,
    in_tx: bool,
    next_id: u64,
}

impl Connector for FakeConnector {
    type Handle = FakeHandle;

    fn supported_drivers(&self) -> &[Driver] {
        Driver::ALL
    }

    async fn connect(
        &self,
        source: &ResolvedDataSource,
        _: &ServiceOptions,
    ) -> BridgeResult<FakeHandle> {
        self.journal
            .lock()
            .unwrap()
            .push(format!("CONNECT {}", source.describe()));
        Ok(FakeHandle {
            journal: Arc::clone(&self.journal),
            in_tx: false,
            next_id: 100,
        })
    }
}

impl NativeHandle for FakeHandle {
    fn driver(&self) -> Driver {
        Driver::MySql
    }

    async fn execute(&mut self, sql: &str, _: &[Bind]) -> BridgeResult<ResultSet> {
        self.journal.lock().unwrap().push(sql.to_string());

        if sql.contains("`missing`") {
            return Err(BridgeError::execution(
                sql,
                ErrorInfo::new("Table 'app.missing' doesn't exist")
                    .with_sqlstate("42S02")
                    .with_code("1146"),
            ));
        }
        if sql.starts_with("SHOW COLUMNS") {
            return Ok(ResultSet::new(
                vec!["Field".into(), "Type".into(), "Null".into()],
                vec![
                    vec!["id".into(), "int".into(), "NO".into()],
                    vec!["name".into(), "varchar(64)".into(), "NO".into()],
                    vec!["email".into(), "varchar(128)".into(), "YES".into()],
                ],
            ));
        }
        if sql.starts_with("SELECT") {
            return Ok(ResultSet::new(
                vec!["id".into(), "name".into()],
                vec![vec![7.into(), "Ana".into()]],
            ));
        }
        if sql.starts_with("INSERT") {
            self.next_id += 1;
            return Ok(ResultSet::affected(1, Some(self.next_id)));
        }
        Ok(ResultSet::affected(1, None))
    }

    async fn begin(&mut self) -> BridgeResult<()> {
        self.journal.lock().unwrap().push("BEGIN".into());
        self.in_tx = true;
        Ok(())
    }

    async fn commit(&mut self) -> BridgeResult<()> {
        self.journal.lock().unwrap().push("COMMIT".into());
        self.in_tx = false;
        Ok(())
    }

    async fn rollback(&mut self) -> BridgeResult<()> {
        self.journal.lock().unwrap().push("ROLLBACK".into());
        self.in_tx = false;
        Ok(())
    }

    fn in_transaction(&self) -> bool {
        self.in_tx
    }
}

fn registry() -> (Registry<FakeConnector>, Journal) {
    let journal = Journal::default();
    let registry = Registry::new(FakeConnector {
        journal: Arc::clone(&journal),
    });
    (registry, journal)
}

fn app_source() -> DataSource {
    DataSource::from_pairs(
        [("host", "db.local"), ("port", "3306"), ("database", "app")],
        Some(Credentials::interned(Some("app"), Some("secret"))),
    )
}

#[tokio::test]
async fn cached_select_through_builder() -> anyhow::Result<()> {
    let (registry, journal) = registry();
    let svc = registry
        .get_instance_for(app_source(), Driver::MySql, ServiceOptions::default())
        .await?;

    let query = svc
        .builder()
        .select(&["id", "name"])
        .from("users")
        .where_("id", Op::Eq, 7);
    let first = query.run().await?;
    let second = query.run().await?;

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(first.first().and_then(|r| r.get("name")), Some(&Value::from("Ana")));
    assert_eq!(
        *journal.lock().unwrap(),
        vec![
            "CONNECT mysql://db.local:3306/app".to_string(),
            "SELECT id, name FROM `users` WHERE id=?".to_string(),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn insert_in_transaction_then_commit() -> anyhow::Result<()> {
    let (registry, journal) = registry();
    let svc = registry
        .get_instance_for(app_source(), Driver::MySql, ServiceOptions::default())
        .await?;

    let mut row = Record::new();
    row.insert("name".into(), "Ana".into());
    row.insert("email".into(), Value::Null);

    svc.begin_transaction().await?;
    let inserted = svc
        .builder()
        .insert("users")
        .values(NullPolicy::NullOnNull, vec![row])
        .await?;
    assert_eq!(
        inserted.query_text(),
        "INSERT INTO `users` VALUES (?, ?, ?)"
    );
    assert_eq!(
        inserted.bound_values(),
        &[Value::Null, Value::from("Ana"), Value::Null]
    );
    inserted.run().await?;
    svc.commit().await?;

    assert_eq!(svc.last_insert_id(), Some(101));
    assert!(!svc.in_transaction().await);
    let journal = journal.lock().unwrap();
    assert_eq!(
        journal[1..],
        [
            "BEGIN",
            "SHOW COLUMNS FROM `users`",
            "INSERT INTO `users` VALUES (?, ?, ?)",
            "COMMIT",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn failed_statement_rolls_back_and_reports_info() -> anyhow::Result<()> {
    let (registry, journal) = registry();
    let svc = registry
        .get_instance_for(app_source(), Driver::MySql, ServiceOptions::default())
        .await?;

    svc.begin_transaction().await?;
    svc.update("users", [("name", "Bo")], &[("id", 7.into())])
        .await?;
    let err = svc.delete("missing", &[("id", 1.into())]).await.unwrap_err();

    assert_eq!(err.info().and_then(|i| i.sqlstate.as_deref()), Some("42S02"));
    assert_eq!(svc.error_info().and_then(|i| i.code), Some("1146".to_string()));
    assert!(!svc.in_transaction().await);
    assert_eq!(journal.lock().unwrap().last().map(String::as_str), Some("ROLLBACK"));
    Ok(())
}

#[tokio::test]
async fn injection_payload_is_rejected_before_execution() -> anyhow::Result<()> {
    let (registry, journal) = registry();
    let svc = registry
        .get_instance_for(app_source(), Driver::MySql, ServiceOptions::default())
        .await?;

    let err = svc
        .delete("users", &[("name", "1; DROP TABLE users".into())])
        .await
        .unwrap_err();

    assert!(err.is_injection());
    assert_eq!(journal.lock().unwrap().len(), 1, "only the connect was recorded");
    Ok(())
}

#[tokio::test]
async fn shutdown_closes_services() -> anyhow::Result<()> {
    let (registry, _) = registry();
    let svc = registry
        .get_instance_for(app_source(), Driver::MySql, ServiceOptions::default())
        .await?;

    registry.shutdown().await?;

    assert!(svc.is_closed().await);
    assert!(matches!(
        svc.select(&[], "users").await.unwrap_err(),
        BridgeError::Closed
    ));
    assert!(registry.is_empty().await);
    Ok(())
}
