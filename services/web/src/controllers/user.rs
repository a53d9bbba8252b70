//! Pages for logged-in users

use tracing::warn;

use super::{HandlerResult, RequestContext, redirect_with_message, render};
use crate::{session::FlashLevel, views};

/// Show the profile of the logged-in user
pub async fn show_profile(ctx: RequestContext) -> HandlerResult {
    let Some(user_id) = ctx.session.user_id() else {
        return Ok(redirect_with_message(
            &ctx,
            "/login",
            "Please log in to access your profile.",
            FlashLevel::Error,
            None,
        ));
    };

    match ctx.state.user_repository.find(user_id).await? {
        Some(user) => Ok(render(&ctx, "My profile - HairyMada", &views::profile(&user))),
        None => {
            warn!("Session refers to missing user {}", user_id);
            ctx.session.logout();
            Ok(redirect_with_message(
                &ctx,
                "/login",
                "Your account could not be found. Please log in again.",
                FlashLevel::Error,
                None,
            ))
        }
    }
}
