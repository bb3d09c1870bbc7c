//! Basic usage example for sqlbridge
//!
//! Run with: cargo run --example basic -p sqlbridge
//!
//! Set the connection in a .env file or the environment:
//! MYSQL_HOST=127.0.0.1
//! MYSQL_PORT=3306
//! MYSQL_DATABASE=sqlbridge_example
//! MYSQL_USER=root
//! MYSQL_PASSWORD=secret

use sqlbridge::mysql::MySqlConnector;
use sqlbridge::{
    BridgeError, Credentials, DataSource, Driver, NullPolicy, Op, Record, Registry,
    ServiceOptions, Value,
};
use std::env;

#[tokio::main]
async fn main() -> Result<(), BridgeError> {
    // Load .env file
    dotenvy::dotenv().ok();

    let host = env::var("MYSQL_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = env::var("MYSQL_PORT").unwrap_or_else(|_| "3306".to_string());
    let database =
        env::var("MYSQL_DATABASE").expect("MYSQL_DATABASE must be set in .env or environment");
    let user = env::var("MYSQL_USER").ok();
    let password = env::var("MYSQL_PASSWORD").ok();

    let registry = Registry::new(MySqlConnector::new());
    let source = DataSource::from_pairs(
        [
            ("host", host.as_str()),
            ("port", port.as_str()),
            ("database", database.as_str()),
        ],
        Some(Credentials::interned(user.as_deref(), password.as_deref())),
    );
    let svc = registry
        .get_instance_for(source, Driver::MySql, ServiceOptions::default())
        .await?;

    // Setup
    svc.query(
        "CREATE TABLE IF NOT EXISTS users (
            id INT AUTO_INCREMENT PRIMARY KEY,
            name VARCHAR(64) NOT NULL,
            email VARCHAR(128) NULL
        )",
        &[],
    )
    .await?;
    svc.delete("users", &[]).await?;

    // ============================================
    // Example 1: Insert through the builder
    // ============================================
    println!("=== Insert ===");

    let rows: Vec<Record> = [("alice", Some("alice@example.com")), ("bob", None)]
        .into_iter()
        .map(|(name, email)| {
            Record::from([
                ("name".to_string(), Value::from(name)),
                ("email".to_string(), Value::from(email)),
            ])
        })
        .collect();
    let insert = svc
        .builder()
        .insert("users")
        .col_names(&["name", "email"])
        .values(NullPolicy::NullOnNull, rows)
        .await?;
    println!("SQL: {}", insert.query_text());
    insert.run().await?;
    println!("last insert id: {:?}", svc.last_insert_id());

    // ============================================
    // Example 2: Cached SELECT
    // ============================================
    println!("\n=== Select ===");

    let users = svc.select(&["id", "name", "email"], "users").await?;
    for row in users.rows() {
        println!(
            "  {} {} {}",
            row.get_idx(0).unwrap_or(&Value::Null),
            row.get_idx(1).unwrap_or(&Value::Null),
            row.get_idx(2).unwrap_or(&Value::Null),
        );
    }
    svc.select(&["id", "name", "email"], "users").await?;
    println!("cache: {:?}", svc.cache_stats());

    // ============================================
    // Example 3: Update inside a transaction
    // ============================================
    println!("\n=== Transaction ===");

    svc.begin_transaction().await?;
    let updated = svc
        .update("users", [("email", "bob@example.com")], &[("name", "bob".into())])
        .await?;
    svc.commit().await?;
    println!("rows updated: {}", updated.rows_affected());

    // ============================================
    // Example 4: Filtered, ordered SELECT
    // ============================================
    println!("\n=== Builder ===");

    let query = svc
        .builder()
        .select(&["name"])
        .from("users")
        .where_("id", Op::Gt, 0)
        .order_by(&["name DESC"])
        .limit(10, None);
    println!("SQL: {}", query.query_text());
    println!("rows: {}", query.run().await?.len());

    // ============================================
    // Example 5: Screening
    // ============================================
    println!("\n=== Injection screening ===");

    match svc
        .delete("users", &[("name", "x' OR 1=1".into())])
        .await
    {
        Err(err) if err.is_injection() => println!("rejected: {err}"),
        other => println!("unexpected: {other:?}"),
    }

    registry.shutdown().await?;
    Ok(())
}
