//! Custom error types for the web service

use axum::{
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use common::error::DatabaseError;
use thiserror::Error;

use crate::{models::UserError, router::RouteError, views};

/// Error ending a request
#[derive(Error, Debug)]
pub enum AppError {
    /// Routing failure
    #[error(transparent)]
    Route(#[from] RouteError),

    /// User operation failure
    #[error("User error: {0}")]
    User(#[from] UserError),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Session storage failure
    #[error("Session error: {0:#}")]
    Session(anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Route(RouteError::NoRoute { .. }) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Error message followed by its source chain
    fn detail(&self) -> String {
        let mut detail = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            detail.push_str("\ncaused by: ");
            detail.push_str(&cause.to_string());
            source = cause.source();
        }
        detail
    }

    /// Render the HTML error page; details are shown only in debug mode
    pub fn render(&self, path: &str, debug: bool) -> Response {
        let status = self.status();
        let (title, message) = if status == StatusCode::NOT_FOUND {
            (
                "Page not found",
                format!("The requested URL {} does not exist.", path),
            )
        } else {
            (
                "Server error",
                "Something went wrong while handling your request.".to_string(),
            )
        };

        let detail = debug.then(|| self.detail());
        let page = views::error_page(status.as_u16(), title, &message, detail.as_deref());
        (status, Html(page)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;

    #[test]
    fn test_status_mapping() {
        let missing = AppError::from(RouteError::NoRoute {
            method: Method::GET,
            path: "/nope".to_string(),
        });
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let broken = AppError::from(RouteError::ControllerNotFound("X".to_string()));
        assert_eq!(broken.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let user = AppError::from(UserError::NotFound(3));
        assert_eq!(user.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_detail_includes_source_chain() {
        let error = AppError::User(UserError::Store(common::error::StoreError::Record(
            common::error::RecordError::Deleted("users"),
        )));
        assert_eq!(
            error.detail(),
            "User error: Record in 'users' was deleted\ncaused by: Record in 'users' was deleted"
        );

        let error = AppError::Session(anyhow::anyhow!("redis down").context("load failed"));
        assert_eq!(error.detail(), "Session error: load failed: redis down");
    }
}
