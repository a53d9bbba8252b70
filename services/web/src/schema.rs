//! Database schema bootstrap

use common::{
    database::Backend,
    error::{DatabaseError, DatabaseResult},
};
use sqlx::AnyPool;
use tracing::info;

const POSTGRES_USERS: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id BIGSERIAL PRIMARY KEY,
    email VARCHAR(255) NOT NULL,
    phone VARCHAR(20) NOT NULL,
    password_hash VARCHAR(255) NOT NULL,
    first_name VARCHAR(100) NOT NULL,
    last_name VARCHAR(100) NOT NULL,
    address TEXT NOT NULL,
    quartier VARCHAR(100) NOT NULL,
    email_verification_token VARCHAR(64),
    phone_verification_token VARCHAR(6),
    email_verified_at TEXT,
    phone_verified_at TEXT,
    is_active BOOLEAN NOT NULL DEFAULT TRUE,
    is_blocked BOOLEAN NOT NULL DEFAULT FALSE,
    blocked_reason TEXT,
    blocked_at TEXT,
    last_login_at TEXT,
    created_at TEXT,
    updated_at TEXT,
    CONSTRAINT users_email_unique UNIQUE (email),
    CONSTRAINT users_phone_unique UNIQUE (phone)
)
"#;

const SQLITE_USERS: &str = r#"
CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL,
    phone TEXT NOT NULL,
    password_hash TEXT NOT NULL,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    address TEXT NOT NULL,
    quartier TEXT NOT NULL,
    email_verification_token TEXT,
    phone_verification_token TEXT,
    email_verified_at TEXT,
    phone_verified_at TEXT,
    is_active BOOLEAN NOT NULL DEFAULT 1,
    is_blocked BOOLEAN NOT NULL DEFAULT 0,
    blocked_reason TEXT,
    blocked_at TEXT,
    last_login_at TEXT,
    created_at TEXT,
    updated_at TEXT,
    CONSTRAINT users_email_unique UNIQUE (email),
    CONSTRAINT users_phone_unique UNIQUE (phone)
)
"#;

const INDEXES: &[&str] = &[
    "CREATE INDEX IF NOT EXISTS idx_users_quartier ON users (quartier)",
    "CREATE INDEX IF NOT EXISTS idx_users_created_at ON users (created_at)",
    "CREATE INDEX IF NOT EXISTS idx_users_active ON users (is_active, is_blocked)",
];

/// Create the `users` table and its indexes when missing
pub async fn ensure_schema(pool: &AnyPool, backend: Backend) -> DatabaseResult<()> {
    let users = match backend {
        Backend::Postgres => POSTGRES_USERS,
        Backend::Sqlite => SQLITE_USERS,
    };

    sqlx::query(users)
        .execute(pool)
        .await
        .map_err(DatabaseError::Schema)?;

    for statement in INDEXES {
        sqlx::query(statement)
            .execute(pool)
            .await
            .map_err(DatabaseError::Schema)?;
    }

    info!("Database schema is up to date ({:?})", backend);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::database::{DatabaseConfig, init_pool};

    #[tokio::test]
    async fn test_ensure_schema_is_idempotent() {
        let pool = init_pool(&DatabaseConfig::in_memory()).await.unwrap();

        ensure_schema(&pool, Backend::Sqlite).await.unwrap();
        ensure_schema(&pool, Backend::Sqlite).await.unwrap();

        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.0, 0);
    }
}
