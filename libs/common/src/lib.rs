//! Common library for the HairyMada application
//!
//! This crate provides shared functionality used by the web service,
//! including database connectivity, the Redis cache client, the error
//! taxonomy and the generic record store.
//!
//! ```rust,no_run
//! use common::database::{DatabaseConfig, health_check, init_pool};
//! use common::record::RecordStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = DatabaseConfig::from_env()?;
//!     let pool = init_pool(&config).await?;
//!     println!("Database health check: {}", health_check(&pool).await?);
//!
//!     let _store = RecordStore::new(pool);
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod database;
pub mod error;
pub mod record;
