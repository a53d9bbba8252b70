//! Request controllers and the helpers they share
//!
//! Actions are async functions taking a [`RequestContext`] and returning a
//! [`Reply`]. They are registered by name in [`registry`] and wired to paths
//! in [`crate::routes`].

pub mod auth;
pub mod home;
pub mod user;

use axum::{
    Json,
    http::{StatusCode, header},
    response::{Html, IntoResponse, Response},
};
use std::collections::HashMap;
use tracing::warn;

use crate::{
    error::AppError,
    router::{Controllers, Router},
    session::{CSRF_FIELD, FlashLevel, Session},
    state::AppState,
    views,
};

/// Result of a controller action
pub type HandlerResult = Result<Reply, AppError>;

/// Route table of the web application
pub type WebRouter = Router<RequestContext, HandlerResult>;

/// Form fields never echoed back into a form
const SECRET_FIELDS: [&str; 3] = ["password", "password_confirm", CSRF_FIELD];

/// Query string and form body of a request
#[derive(Debug, Clone, Default)]
pub struct Input {
    query: HashMap<String, String>,
    form: HashMap<String, String>,
}

impl Input {
    /// Create a new request input
    pub fn new(query: HashMap<String, String>, form: HashMap<String, String>) -> Self {
        Self { query, form }
    }

    pub fn query(&self) -> &HashMap<String, String> {
        &self.query
    }

    pub fn form(&self) -> &HashMap<String, String> {
        &self.form
    }

    /// A form field, falling back to the query string
    pub fn get(&self, key: &str) -> Option<&str> {
        self.form
            .get(key)
            .or_else(|| self.query.get(key))
            .map(String::as_str)
    }

    /// Form fields safe to echo back after a failed submission
    pub fn without_secrets(&self) -> HashMap<String, String> {
        self.form
            .iter()
            .filter(|(key, _)| !SECRET_FIELDS.iter().any(|secret| *secret == key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }
}

/// Everything an action gets to see
#[derive(Clone)]
pub struct RequestContext {
    pub state: AppState,
    pub session: Session,
    pub input: Input,
}

impl RequestContext {
    /// Create a new request context
    pub fn new(state: AppState, session: Session, input: Input) -> Self {
        Self {
            state,
            session,
            input,
        }
    }
}

/// What an action answers with
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    Html(String),
    Redirect(String),
    Json(serde_json::Value),
}

impl IntoResponse for Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Html(page) => Html(page).into_response(),
            Reply::Redirect(location) => {
                (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
            }
            Reply::Json(body) => Json(body).into_response(),
        }
    }
}

/// Wrap `content` in the layout, consuming the pending flash message
pub fn render(ctx: &RequestContext, title: &str, content: &str) -> Reply {
    let flash = ctx.session.take_flash();
    let logged_in = ctx.session.user_id().is_some();
    Reply::Html(views::layout(title, flash.as_ref(), logged_in, content))
}

pub fn redirect(location: &str) -> Reply {
    Reply::Redirect(location.to_string())
}

/// Redirect after setting a flash message and, when given, the input to echo
pub fn redirect_with_message(
    ctx: &RequestContext,
    location: &str,
    message: &str,
    level: FlashLevel,
    old_input: Option<HashMap<String, String>>,
) -> Reply {
    ctx.session.flash(message, level);
    if let Some(old_input) = old_input {
        ctx.session.set_old_input(old_input);
    }
    redirect(location)
}

/// Send a form post back to `location` unless it carries this session's CSRF token
pub fn reject_forged_post(ctx: &RequestContext, location: &str) -> Option<Reply> {
    let submitted = ctx
        .input
        .form()
        .get(CSRF_FIELD)
        .map(String::as_str)
        .unwrap_or_default();
    if ctx.session.verify_csrf_token(submitted) {
        return None;
    }

    warn!("Rejected post to {} without a valid CSRF token", location);
    Some(redirect_with_message(
        ctx,
        location,
        "Your form has expired. Please try again.",
        FlashLevel::Error,
        Some(ctx.input.without_secrets()),
    ))
}

/// Named actions available to the route table
pub fn registry() -> Controllers<RequestContext, HandlerResult> {
    Controllers::new()
        .register("HomeController", "index", home::index)
        .register("HomeController", "about", home::about)
        .register("HomeController", "health", home::health)
        .register(
            "AuthClientController",
            "show_registration_form",
            auth::show_registration_form,
        )
        .register("AuthClientController", "register", auth::register)
        .register("AuthClientController", "show_login_form", auth::show_login_form)
        .register("AuthClientController", "login", auth::login)
        .register("UserController", "show_profile", user::show_profile)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_input_prefers_form_over_query() {
        let input = Input::new(
            HashMap::from([("email".to_string(), "query@b.mg".to_string())]),
            HashMap::from([("email".to_string(), "form@b.mg".to_string())]),
        );
        assert_eq!(input.get("email"), Some("form@b.mg"));
        assert_eq!(input.get("missing"), None);
    }

    #[test]
    fn test_old_input_drops_passwords() {
        let input = Input::new(
            HashMap::new(),
            HashMap::from([
                ("email".to_string(), "a@b.mg".to_string()),
                ("password".to_string(), "secret1".to_string()),
                ("password_confirm".to_string(), "secret1".to_string()),
                ("csrf_token".to_string(), "abc123".to_string()),
            ]),
        );
        let old_input = input.without_secrets();
        assert_eq!(old_input.len(), 1);
        assert_eq!(old_input["email"], "a@b.mg");
    }

    #[test]
    fn test_redirect_reply_is_302_with_location() {
        let response = redirect("/login").into_response();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/login");
    }
}
