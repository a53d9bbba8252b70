//! Server-rendered HTML pages
//!
//! Every interpolated value goes through [`escape`].

use std::{collections::HashMap, fmt::Write};

use crate::{
    models::User,
    session::{CSRF_FIELD, Flash},
};

/// Escape text for HTML bodies and double-quoted attributes
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn old<'a>(input: &'a HashMap<String, String>, name: &str) -> &'a str {
    input.get(name).map(String::as_str).unwrap_or_default()
}

/// Page shell with navigation and the flash banner
pub fn layout(title: &str, flash: Option<&Flash>, logged_in: bool, content: &str) -> String {
    let nav = if logged_in {
        r#"<a href="/profile">My profile</a>"#
    } else {
        r#"<a href="/register">Register</a> <a href="/login">Log in</a>"#
    };

    let banner = flash
        .map(|flash| {
            format!(
                r#"<div class="flash flash-{}" role="alert">{}</div>"#,
                flash.level.as_str(),
                escape(&flash.message)
            )
        })
        .unwrap_or_default();

    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
</head>
<body>
<header><a href="/">HairyMada</a> <nav><a href="/about">About</a> {nav}</nav></header>
{banner}
<main>
{content}
</main>
<footer>&copy; HairyMada</footer>
</body>
</html>
"#,
        title = escape(title),
    )
}

pub fn home() -> String {
    r#"<h1>Welcome to HairyMada</h1>
<p>Find hairdressers and beauty services near you, wherever you are in Madagascar.</p>
<p><a href="/register">Create an account</a> or <a href="/login">log in</a>.</p>"#
        .to_string()
}

pub fn about() -> String {
    r#"<h1>About HairyMada</h1>
<p>HairyMada connects clients with hair and beauty professionals across Madagascar.</p>"#
        .to_string()
}

fn input(kind: &str, name: &str, label: &str, value: &str) -> String {
    format!(
        r#"<label for="{name}">{label}</label>
<input type="{kind}" id="{name}" name="{name}" value="{value}" required>
"#,
        value = escape(value),
    )
}

fn csrf_field(token: &str) -> String {
    format!(
        "<input type=\"hidden\" name=\"{}\" value=\"{}\">\n",
        CSRF_FIELD,
        escape(token)
    )
}

/// Registration form, repopulated from a failed submission
pub fn register_form(old_input: &HashMap<String, String>, csrf_token: &str) -> String {
    let mut form = String::from(
        "<h1>Create an account</h1>\n<form method=\"post\" action=\"/register\">\n",
    );
    form.push_str(&csrf_field(csrf_token));

    let fields = [
        ("text", "first_name", "First name"),
        ("text", "last_name", "Last name"),
        ("email", "email", "Email"),
        ("tel", "phone", "Phone"),
        ("text", "address", "Address"),
        ("text", "quartier", "Quartier"),
    ];
    for (kind, name, label) in fields {
        form.push_str(&input(kind, name, label, old(old_input, name)));
    }
    form.push_str(&input("password", "password", "Password", ""));
    form.push_str(&input(
        "password",
        "password_confirm",
        "Confirm password",
        "",
    ));

    form.push_str(
        "<button type=\"submit\">Register</button>\n</form>\n\
         <p>Already registered? <a href=\"/login\">Log in</a></p>",
    );
    form
}

/// Login form; `email` accepts an email or a phone number
pub fn login_form(old_input: &HashMap<String, String>, csrf_token: &str) -> String {
    let mut form = String::from("<h1>Log in</h1>\n<form method=\"post\" action=\"/login\">\n");
    form.push_str(&csrf_field(csrf_token));
    form.push_str(&input(
        "text",
        "email",
        "Email or phone",
        old(old_input, "email"),
    ));
    form.push_str(&input("password", "password", "Password", ""));
    form.push_str(
        "<button type=\"submit\">Log in</button>\n</form>\n\
         <p>No account yet? <a href=\"/register\">Register</a></p>",
    );
    form
}

fn status(verified: bool) -> &'static str {
    if verified { "verified" } else { "not verified" }
}

pub fn profile(user: &User) -> String {
    let mut page = String::new();
    let _ = write!(
        page,
        r#"<h1><span class="avatar">{initials}</span> {name}</h1>
<dl>
<dt>Email</dt><dd>{email} ({email_status})</dd>
<dt>Phone</dt><dd>{phone} ({phone_status})</dd>
<dt>Address</dt><dd>{address}</dd>
<dt>Quartier</dt><dd>{quartier}</dd>
"#,
        initials = escape(&user.initials()),
        name = escape(&user.full_name()),
        email = escape(user.email()),
        email_status = status(user.is_email_verified()),
        phone = escape(user.phone()),
        phone_status = status(user.is_phone_verified()),
        address = escape(user.address()),
        quartier = escape(user.quartier()),
    );

    if let Some(created_at) = user.created_at() {
        let _ = write!(
            page,
            "<dt>Member since</dt><dd>{}</dd>\n",
            created_at.format("%d/%m/%Y")
        );
    }
    if let Some(last_login_at) = user.last_login_at() {
        let _ = write!(
            page,
            "<dt>Last login</dt><dd>{}</dd>\n",
            last_login_at.format("%d/%m/%Y %H:%M")
        );
    }
    page.push_str("</dl>");
    page
}

/// Error page; `detail` is only passed in debug mode
pub fn error_page(code: u16, title: &str, message: &str, detail: Option<&str>) -> String {
    let detail = detail
        .map(|detail| format!("<pre>{}</pre>", escape(detail)))
        .unwrap_or_default();

    let content = format!(
        "<h1>{code} - {title}</h1>\n<p>{message}</p>\n{detail}\n<p><a href=\"/\">Back to home</a></p>",
        title = escape(title),
        message = escape(message),
    );
    layout(&format!("Error {code}"), None, false, &content)
}
