//! Client registration and login

use common::{error::RecordError, record::Record};
use tracing::{info, warn};

use super::{HandlerResult, RequestContext, redirect_with_message, reject_forged_post, render};
use crate::{
    models::{NewUser, User, UserError},
    session::FlashLevel,
    validation, views,
};

pub async fn show_registration_form(ctx: RequestContext) -> HandlerResult {
    let old_input = ctx.session.take_old_input();
    let csrf_token = ctx.session.csrf_token();
    Ok(render(
        &ctx,
        "Register - HairyMada",
        &views::register_form(&old_input, &csrf_token),
    ))
}

/// Validate the registration form and create the account
pub async fn register(ctx: RequestContext) -> HandlerResult {
    if let Some(reply) = reject_forged_post(&ctx, "/register") {
        return Ok(reply);
    }
    let form = ctx.input.form();

    let errors = validation::validate_registration(form);
    if !errors.is_empty() {
        return Ok(redirect_with_message(
            &ctx,
            "/register",
            &errors.summary(),
            FlashLevel::Error,
            Some(ctx.input.without_secrets()),
        ));
    }

    let new_user = NewUser::from_form(form);
    match ctx.state.user_repository.create(&new_user).await {
        Ok(user) => {
            info!("Registered user {:?} ({})", user.id(), user.email());
            Ok(redirect_with_message(
                &ctx,
                "/login",
                "Registration successful! You can now log in.",
                FlashLevel::Success,
                None,
            ))
        }
        Err(
            e @ (UserError::DuplicateEmail
            | UserError::DuplicatePhone
            | UserError::MissingField(_)),
        ) => {
            warn!("Registration refused for {}: {}", new_user.email, e);
            Ok(redirect_with_message(
                &ctx,
                "/register",
                &e.to_string(),
                FlashLevel::Error,
                Some(ctx.input.without_secrets()),
            ))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn show_login_form(ctx: RequestContext) -> HandlerResult {
    let old_input = ctx.session.take_old_input();
    let csrf_token = ctx.session.csrf_token();
    Ok(render(
        &ctx,
        "Log in - HairyMada",
        &views::login_form(&old_input, &csrf_token),
    ))
}

/// Check credentials and open the session
pub async fn login(ctx: RequestContext) -> HandlerResult {
    if let Some(reply) = reject_forged_post(&ctx, "/login") {
        return Ok(reply);
    }
    let form = ctx.input.form();

    let errors = validation::validate_login(form);
    if !errors.is_empty() {
        return Ok(redirect_with_message(
            &ctx,
            "/login",
            &errors.summary(),
            FlashLevel::Error,
            Some(ctx.input.without_secrets()),
        ));
    }

    let login = ctx.input.get("email").unwrap_or_default().trim();
    let password = ctx.input.get("password").unwrap_or_default();

    let Some(user) = ctx
        .state
        .user_repository
        .authenticate(login, password)
        .await?
    else {
        warn!("Failed login attempt for {}", login);
        return Ok(redirect_with_message(
            &ctx,
            "/login",
            "Invalid credentials or inactive account.",
            FlashLevel::Error,
            Some(ctx.input.without_secrets()),
        ));
    };

    let Some(user_id) = user.id() else {
        return Err(UserError::from(RecordError::MissingPrimaryKey(User::TABLE)).into());
    };

    info!("User {} logged in", user_id);
    ctx.session.login(user_id, user.email(), &user.full_name());
    Ok(redirect_with_message(
        &ctx,
        "/profile",
        &format!("Welcome back, {}!", user.first_name()),
        FlashLevel::Success,
        None,
    ))
}
