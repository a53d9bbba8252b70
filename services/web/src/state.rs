//! Application state shared across handlers

use sqlx::AnyPool;
use std::sync::Arc;

use common::record::RecordStore;

use crate::{
    config::AppConfig,
    controllers::WebRouter,
    repositories::UserRepository,
    router::RouteError,
    routes,
    session::SessionStore,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db_pool: AnyPool,
    pub user_repository: UserRepository,
    pub sessions: Arc<dyn SessionStore>,
    pub router: Arc<WebRouter>,
}

impl AppState {
    /// Create a new application state, building the route table
    pub fn new(
        config: AppConfig,
        db_pool: AnyPool,
        sessions: Arc<dyn SessionStore>,
    ) -> Result<Self, RouteError> {
        let user_repository = UserRepository::new(RecordStore::new(db_pool.clone()));

        Ok(Self {
            config: Arc::new(config),
            db_pool,
            user_repository,
            sessions,
            router: Arc::new(routes::web_routes()?),
        })
    }
}
