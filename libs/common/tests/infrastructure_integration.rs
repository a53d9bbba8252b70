//! Integration tests for the infrastructure components
//!
//! These tests verify that a database pool can be created from configuration
//! and serves queries through the `Any` driver.

use common::database::{Backend, DatabaseConfig, health_check, init_pool};
use sqlx::Row;

/// Test that verifies the in-memory database is reachable and keeps its
/// state between queries
#[tokio::test]
async fn test_infrastructure_integration() -> Result<(), Box<dyn std::error::Error>> {
    let db_config = DatabaseConfig::in_memory();
    assert_eq!(db_config.backend()?, Backend::Sqlite);

    let pool = init_pool(&db_config).await?;
    assert!(health_check(&pool).await?, "Database health check failed");

    sqlx::query("CREATE TABLE probes (id INTEGER PRIMARY KEY, label TEXT NOT NULL)")
        .execute(&pool)
        .await?;
    sqlx::query("INSERT INTO probes (label) VALUES ($1)")
        .bind("ping")
        .execute(&pool)
        .await?;

    // Same pool, same connection: the table written above is still there.
    let row = sqlx::query("SELECT label FROM probes").fetch_one(&pool).await?;
    let label: String = row.get("label");
    assert_eq!(label, "ping", "In-memory database lost its state");

    Ok(())
}

#[tokio::test]
async fn test_rejects_unknown_scheme() {
    let config = DatabaseConfig {
        database_url: "mysql://root@localhost/hairymada".to_string(),
        ..DatabaseConfig::in_memory()
    };

    assert!(init_pool(&config).await.is_err());
}
