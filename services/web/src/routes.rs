//! Web routes and the HTTP entry point
//!
//! axum only supplies the transport: every request goes through a single
//! fallback handler that loads the session, dispatches through the
//! application's own route table and writes the session back.

use axum::{
    extract::{Form, FromRequest, Query, Request, State},
    http::Method,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use std::collections::HashMap;
use tracing::{error, warn};

use crate::{
    controllers::{self, Input, RequestContext, WebRouter},
    error::AppError,
    router::{RouteError, Router},
    session::{SESSION_COOKIE, Session},
    state::AppState,
};

/// The application's route table
pub fn web_routes() -> Result<WebRouter, RouteError> {
    let mut router = Router::with_controllers(controllers::registry());

    router
        .get_action("/", "HomeController@index")?
        .get_action("/about", "HomeController@about")?
        .get_action("/register", "AuthClientController@show_registration_form")?
        .post_action("/register", "AuthClientController@register")?
        .get_action("/login", "AuthClientController@show_login_form")?
        .post_action("/login", "AuthClientController@login")?
        .get_action("/profile", "UserController@show_profile")?
        .get_action("/health", "HomeController@health")?;

    Ok(router)
}

/// Create the axum application
pub fn create_router(state: AppState) -> axum::Router {
    axum::Router::new()
        .fallback(handle_request)
        .with_state(state)
}

async fn read_form(request: Request, state: &AppState) -> HashMap<String, String> {
    match Form::<HashMap<String, String>>::from_request(request, state).await {
        Ok(Form(form)) => form,
        Err(rejection) => {
            warn!("Ignoring unreadable form body: {}", rejection);
            HashMap::new()
        }
    }
}

fn session_cookie(session: &Session) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, session.id().to_string()))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .build()
}

/// Dispatch one request through the route table
async fn handle_request(State(state): State<AppState>, jar: CookieJar, request: Request) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let query = Query::<HashMap<String, String>>::try_from_uri(request.uri())
        .map(|Query(query)| query)
        .unwrap_or_default();
    let form = if method == Method::POST {
        read_form(request, &state).await
    } else {
        HashMap::new()
    };

    let cookie = jar.get(SESSION_COOKIE).map(|cookie| cookie.value().to_string());
    let session = match Session::start(state.sessions.as_ref(), cookie.as_deref()).await {
        Ok(session) => session,
        Err(e) => {
            error!("Failed to load session: {:#}", e);
            return AppError::Session(e).render(&path, state.config.debug);
        }
    };

    let ctx = RequestContext::new(state.clone(), session.clone(), Input::new(query, form));
    let outcome = match state.router.dispatch(&path, &method, ctx) {
        Ok(handler) => handler.await,
        Err(e) => Err(e.into()),
    };

    let response = match outcome {
        Ok(reply) => reply.into_response(),
        Err(e) => {
            if matches!(e, AppError::Route(RouteError::NoRoute { .. })) {
                warn!("{}", e);
            } else {
                error!("Error handling {} {}: {}", method, path, e);
            }
            e.render(&path, state.config.debug)
        }
    };

    if let Err(e) = session
        .persist(state.sessions.as_ref(), state.config.session_ttl)
        .await
    {
        error!("Failed to save session {}: {:#}", session.id(), e);
    }

    (jar.add(session_cookie(&session)), response).into_response()
}
