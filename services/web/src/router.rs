//! Method + path routing with controller lookup
//!
//! Routes are matched on the exact normalized path, in registration order.
//! Handlers are plain async functions or closures taking a request context.
//! Named controller actions (`"Controller@action"`) are resolved against a
//! [`Controllers`] registry when the route is registered, so a bad reference
//! fails at startup instead of on the first request.

use axum::http::Method;
use futures::future::BoxFuture;
use std::{collections::HashMap, future::Future, sync::Arc};
use thiserror::Error;
use tracing::{debug, warn};

/// A type-erased request handler
pub type Handler<C, R> = Arc<dyn Fn(C) -> BoxFuture<'static, R> + Send + Sync>;

/// Routing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("No route for {method} {path}")]
    NoRoute { method: Method, path: String },

    #[error("Controller {0} not found")]
    ControllerNotFound(String),

    #[error("Action {action} not found on controller {controller}")]
    ActionNotFound { controller: String, action: String },

    #[error("Invalid action reference '{0}', expected Controller@action")]
    InvalidAction(String),
}

fn boxed<C, R, F, Fut>(handler: F) -> Handler<C, R>
where
    C: 'static,
    R: 'static,
    F: Fn(C) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    Arc::new(move |ctx: C| -> BoxFuture<'static, R> { Box::pin(handler(ctx)) })
}

/// Normalize a path to a single leading slash without trailing slashes
pub fn normalize_path(path: &str) -> String {
    format!("/{}", path.trim().trim_matches('/'))
}

/// Named controller actions, looked up by `"Controller@action"`
pub struct Controllers<C, R> {
    actions: HashMap<String, HashMap<String, Handler<C, R>>>,
}

impl<C, R> Default for Controllers<C, R> {
    fn default() -> Self {
        Self {
            actions: HashMap::new(),
        }
    }
}

impl<C: 'static, R: 'static> Controllers<C, R> {
    /// Create a new, empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` as `controller@action`
    pub fn register<F, Fut>(mut self, controller: &str, action: &str, handler: F) -> Self
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        self.actions
            .entry(controller.to_string())
            .or_default()
            .insert(action.to_string(), boxed(handler));
        self
    }

    /// Look up a `"Controller@action"` reference
    pub fn resolve(&self, reference: &str) -> Result<Handler<C, R>, RouteError> {
        let (controller, action) = reference
            .split_once('@')
            .filter(|(controller, action)| !controller.is_empty() && !action.is_empty())
            .ok_or_else(|| RouteError::InvalidAction(reference.to_string()))?;

        let actions = self
            .actions
            .get(controller)
            .ok_or_else(|| RouteError::ControllerNotFound(controller.to_string()))?;

        actions
            .get(action)
            .cloned()
            .ok_or_else(|| RouteError::ActionNotFound {
                controller: controller.to_string(),
                action: action.to_string(),
            })
    }
}

struct Route<C, R> {
    method: Method,
    path: String,
    handler: Handler<C, R>,
}

/// Ordered route table
pub struct Router<C, R> {
    routes: Vec<Route<C, R>>,
    controllers: Controllers<C, R>,
}

impl<C: 'static, R: 'static> Default for Router<C, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: 'static, R: 'static> Router<C, R> {
    /// Create a new router without named controllers
    pub fn new() -> Self {
        Self::with_controllers(Controllers::new())
    }

    /// Create a new router resolving named actions against `controllers`
    pub fn with_controllers(controllers: Controllers<C, R>) -> Self {
        Self {
            routes: Vec::new(),
            controllers,
        }
    }

    /// Register a handler for `method` on `path`; duplicates are kept and the
    /// first registration wins
    pub fn route<F, Fut>(&mut self, method: Method, path: &str, handler: F) -> &mut Self
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        self.push(method, path, boxed(handler))
    }

    pub fn get<F, Fut>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        self.route(Method::GET, path, handler)
    }

    pub fn post<F, Fut>(&mut self, path: &str, handler: F) -> &mut Self
    where
        F: Fn(C) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
    {
        self.route(Method::POST, path, handler)
    }

    /// Register a named controller action for `method` on `path`
    pub fn action(&mut self, method: Method, path: &str, reference: &str) -> Result<&mut Self, RouteError> {
        let handler = self.controllers.resolve(reference)?;
        Ok(self.push(method, path, handler))
    }

    pub fn get_action(&mut self, path: &str, reference: &str) -> Result<&mut Self, RouteError> {
        self.action(Method::GET, path, reference)
    }

    pub fn post_action(&mut self, path: &str, reference: &str) -> Result<&mut Self, RouteError> {
        self.action(Method::POST, path, reference)
    }

    fn push(&mut self, method: Method, path: &str, handler: Handler<C, R>) -> &mut Self {
        let path = normalize_path(path);
        debug!("Registered route {} {}", method, path);
        self.routes.push(Route {
            method,
            path,
            handler,
        });
        self
    }

    /// Number of registered routes
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Registered (method, path) pairs in registration order
    pub fn routes(&self) -> impl Iterator<Item = (&Method, &str)> {
        self.routes
            .iter()
            .map(|route| (&route.method, route.path.as_str()))
    }

    /// Find the first route for `method` and `path` and start its handler
    pub fn dispatch(&self, path: &str, method: &Method, ctx: C) -> Result<BoxFuture<'static, R>, RouteError> {
        let path = normalize_path(path);

        match self
            .routes
            .iter()
            .find(|route| route.method == *method && route.path == path)
        {
            Some(route) => Ok((route.handler)(ctx)),
            None => {
                warn!("No route for {} {}", method, path);
                Err(RouteError::NoRoute {
                    method: method.clone(),
                    path,
                })
            }
        }
    }
}
