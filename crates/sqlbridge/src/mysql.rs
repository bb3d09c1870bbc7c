//! Native MySQL driver backed by `sqlx`.
//!
//! One [`MySqlHandle`] wraps one physical `MySqlConnection`. Transaction
//! control goes over the text protocol so that the handle, not sqlx, tracks
//! whether a transaction is open.

use crate::client::{Connector, NativeHandle};
use crate::config::ServiceOptions;
use crate::datasource::{Endpoint, ResolvedDataSource};
use crate::driver::Driver;
use crate::error::{BridgeError, BridgeResult, ErrorInfo};
use crate::row::ResultSet;
use crate::value::{Bind, Value};
use sqlx::mysql::{
    MySql, MySqlArguments, MySqlConnectOptions, MySqlConnection, MySqlDatabaseError, MySqlRow,
};
use sqlx::query::Query;
use sqlx::{Column, ConnectOptions, Connection, Executor as _, Row, TypeInfo, ValueRef};

/// Opens [`MySqlHandle`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlConnector;

impl MySqlConnector {
    pub fn new() -> Self {
        Self
    }
}

/// Build sqlx connect options from a resolved descriptor.
pub fn connect_options(source: &ResolvedDataSource) -> MySqlConnectOptions {
    let mut opts = MySqlConnectOptions::new()
        .database(source.database())
        .charset(source.charset());

    opts = match source.endpoint() {
        Endpoint::Socket(path) => opts.socket(path),
        Endpoint::Tcp { host, port } => {
            let opts = opts.host(host);
            match port {
                Some(port) => opts.port(*port),
                None => opts,
            }
        }
    };

    if let Some(creds) = source.credentials() {
        if let Some(name) = creds.name() {
            opts = opts.username(name);
        }
        if let Some(password) = creds.password() {
            opts = opts.password(password);
        }
    }

    // Statements are logged by the service under `sqlbridge.sql`.
    opts.disable_statement_logging()
}

impl Connector for MySqlConnector {
    type Handle = MySqlHandle;

    fn supported_drivers(&self) -> &[Driver] {
        &[Driver::MySql]
    }

    async fn connect(
        &self,
        source: &ResolvedDataSource,
        options: &ServiceOptions,
    ) -> BridgeResult<MySqlHandle> {
        let opts = connect_options(source);
        let connecting = MySqlConnection::connect_with(&opts);

        let conn = match options.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, connecting)
                .await
                .map_err(|_| {
                    BridgeError::Connection(format!(
                        "timed out after {limit:?} connecting to {}",
                        source.describe()
                    ))
                })??,
            None => connecting.await?,
        };

        Ok(MySqlHandle {
            conn,
            in_transaction: false,
        })
    }
}

/// A single MySQL connection.
#[derive(Debug)]
pub struct MySqlHandle {
    conn: MySqlConnection,
    in_transaction: bool,
}

fn returns_rows(sql: &str) -> bool {
    let head = sql
        .trim_start_matches(|c: char| c.is_whitespace() || c == '(')
        .split(|c: char| c.is_whitespace() || c == '(')
        .next()
        .unwrap_or("");
    [
        "SELECT", "SHOW", "DESCRIBE", "DESC", "EXPLAIN", "WITH", "CALL", "TABLE", "VALUES",
    ]
        .iter()
        .any(|kw| head.eq_ignore_ascii_case(kw))
}

fn bind_value<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    value: &Value,
) -> Query<'q, MySql, MySqlArguments> {
    match value {
        Value::Null => query.bind(None::<String>),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => query.bind(*v),
        Value::Float(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.clone()),
        Value::Bytes(v) => query.bind(v.clone()),
    }
}

fn execution_error(sql: &str, err: sqlx::Error) -> BridgeError {
    if let Some(db) = err.as_database_error() {
        let mut info = ErrorInfo::new(db.message());
        if let Some(state) = db.code() {
            info = info.with_sqlstate(state.into_owned());
        }
        if let Some(mysql) = db.try_downcast_ref::<MySqlDatabaseError>() {
            info = info.with_code(mysql.number().to_string());
        }
        return BridgeError::execution(sql, info);
    }
    BridgeError::from(err)
}

fn decode_cell(row: &MySqlRow, idx: usize) -> BridgeResult<Value> {
    let raw = row.try_get_raw(idx)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }
    let type_name = raw.type_info().name().to_ascii_uppercase();

    let value = match type_name.as_str() {
        "BOOLEAN" => Value::Bool(row.try_get_unchecked::<bool, _>(idx)?),
        "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
            Value::Int(row.try_get_unchecked::<i64, _>(idx)?)
        }
        "TINYINT UNSIGNED" | "SMALLINT UNSIGNED" | "MEDIUMINT UNSIGNED" | "INT UNSIGNED"
        | "BIGINT UNSIGNED" => {
            let v = row.try_get_unchecked::<u64, _>(idx)?;
            i64::try_from(v).map_or_else(|_| Value::Text(v.to_string()), Value::Int)
        }
        "FLOAT" => Value::Float(f64::from(row.try_get_unchecked::<f32, _>(idx)?)),
        "DOUBLE" => Value::Float(row.try_get_unchecked::<f64, _>(idx)?),
        "DATETIME" | "TIMESTAMP" => {
            Value::Text(row.try_get::<chrono::NaiveDateTime, _>(idx)?.to_string())
        }
        "DATE" => Value::Text(row.try_get::<chrono::NaiveDate, _>(idx)?.to_string()),
        "TIME" => Value::Text(row.try_get::<chrono::NaiveTime, _>(idx)?.to_string()),
        "BLOB" | "TINYBLOB" | "MEDIUMBLOB" | "LONGBLOB" | "BINARY" | "VARBINARY" | "BIT"
        | "GEOMETRY" => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
        // Character types, DECIMAL, JSON, ENUM and SET all arrive as text.
        _ => match row.try_get_unchecked::<String, _>(idx) {
            Ok(text) => Value::Text(text),
            Err(_) => Value::Bytes(row.try_get_unchecked::<Vec<u8>, _>(idx)?),
        },
    };
    Ok(value)
}

fn decode_rows(rows: &[MySqlRow]) -> BridgeResult<ResultSet> {
    let columns: Vec<String> = rows
        .first()
        .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
        .unwrap_or_default();

    let values = rows
        .iter()
        .map(|row| (0..row.len()).map(|idx| decode_cell(row, idx)).collect())
        .collect::<BridgeResult<Vec<Vec<Value>>>>()?;

    Ok(ResultSet::new(columns, values))
}

impl MySqlHandle {
    async fn control(&mut self, sql: &'static str) -> BridgeResult<()> {
        sqlx::Executor::execute(&mut self.conn, sql)
            .await
            .map(|_| ())
            .map_err(|err| BridgeError::transaction(format!("{sql} failed: {err}")))
    }
}

impl NativeHandle for MySqlHandle {
    fn driver(&self) -> Driver {
        Driver::MySql
    }

    async fn prepare(&mut self, sql: &str) -> BridgeResult<()> {
        self.conn
            .prepare(sql)
            .await
            .map(|_| ())
            .map_err(|err| execution_error(sql, err))
    }

    async fn execute(&mut self, sql: &str, binds: &[Bind]) -> BridgeResult<ResultSet> {
        let query = binds
            .iter()
            .fold(sqlx::query(sql), |q, bind| bind_value(q, &bind.value));

        if returns_rows(sql) {
            let rows = query
                .fetch_all(&mut self.conn)
                .await
                .map_err(|err| execution_error(sql, err))?;
            return decode_rows(&rows);
        }

        let done = query
            .execute(&mut self.conn)
            .await
            .map_err(|err| execution_error(sql, err))?;
        let id = done.last_insert_id();
        Ok(ResultSet::affected(done.rows_affected(), (id > 0).then_some(id)))
    }

    async fn begin(&mut self) -> BridgeResult<()> {
        self.control("START TRANSACTION").await?;
        self.in_transaction = true;
        Ok(())
    }

    async fn commit(&mut self) -> BridgeResult<()> {
        self.control("COMMIT").await?;
        self.in_transaction = false;
        Ok(())
    }

    async fn rollback(&mut self) -> BridgeResult<()> {
        let result = self.control("ROLLBACK").await;
        // Cleared even when ROLLBACK fails.
        self.in_transaction = false;
        result
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    async fn close(self) -> BridgeResult<()> {
        self.conn.close().await.map_err(BridgeError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::{Credentials, DataSource};

    #[test]
    fn detects_row_returning_statements() {
        assert!(returns_rows("SELECT 1"));
        assert!(returns_rows("  show columns from `t`"));
        assert!(returns_rows("DESC users"));
        assert!(returns_rows("WITH x AS (SELECT 1) SELECT * FROM x"));
        assert!(returns_rows("(SELECT 1) UNION (SELECT 2)"));
        assert!(returns_rows("CALL report_totals()"));
        assert!(returns_rows("TABLE users"));
        assert!(returns_rows("VALUES ROW(1, 2), ROW(3, 4)"));
        assert!(!returns_rows("INSERT INTO t VALUES (1)"));
        assert!(!returns_rows("DESCRIPTION"));
    }

    #[test]
    fn builds_connect_options_from_descriptor() {
        let source = DataSource::from_pairs(
            [("host", "db.local"), ("port", "3307"), ("database", "app")],
            Some(Credentials::interned(Some("svc"), Some("pw"))),
        )
        .resolve(Driver::MySql, MySqlConnector.supported_drivers())
        .unwrap();

        let opts = connect_options(&source);
        assert_eq!(opts.get_host(), "db.local");
        assert_eq!(opts.get_port(), 3307);
        assert_eq!(opts.get_database(), Some("app"));
        assert_eq!(opts.get_username(), "svc");
        assert_eq!(opts.get_charset(), "utf8mb4");
    }
}
