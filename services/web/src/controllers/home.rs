//! Public pages

use common::database;
use serde_json::json;

use super::{HandlerResult, Reply, RequestContext, render};
use crate::views;

pub async fn index(ctx: RequestContext) -> HandlerResult {
    Ok(render(&ctx, "Home - HairyMada", &views::home()))
}

pub async fn about(ctx: RequestContext) -> HandlerResult {
    Ok(render(&ctx, "About - HairyMada", &views::about()))
}

/// Health check endpoint
pub async fn health(ctx: RequestContext) -> HandlerResult {
    let database = database::health_check(&ctx.state.db_pool).await?;

    Ok(Reply::Json(json!({
        "status": if database { "ok" } else { "degraded" },
        "service": "web",
        "database": database,
    })))
}
