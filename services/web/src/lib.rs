//! HairyMada web application
//!
//! User registration, login and profile pages served by axum. Requests are
//! routed through [`router::Router`] to the controllers in [`controllers`],
//! which work with [`models::User`] records through
//! [`repositories::UserRepository`].

pub mod config;
pub mod controllers;
pub mod error;
pub mod models;
pub mod repositories;
pub mod router;
pub mod routes;
pub mod schema;
pub mod session;
pub mod state;
pub mod validation;
pub mod views;

pub use state::AppState;
