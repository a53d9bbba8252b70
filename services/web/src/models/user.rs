//! User model and related functionality

use chrono::NaiveDateTime;
use common::{
    error::{RecordError, StoreError},
    record::{Attribute, Record, RecordMeta, Tracked, Value, value::read},
};
use serde::{Deserialize, Serialize};
use sqlx::any::AnyRow;
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised by user operations
#[derive(Error, Debug)]
pub enum UserError {
    #[error("The {0} field is required")]
    MissingField(&'static str),

    #[error("An account with this email already exists")]
    DuplicateEmail,

    #[error("An account with this phone number already exists")]
    DuplicatePhone,

    #[error("User {0} not found")]
    NotFound(i64),

    #[error("Failed to hash password: {0}")]
    PasswordHash(String),

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// User entity, one row of `users`
#[derive(Debug, Clone)]
pub struct User {
    meta: RecordMeta,
    email: Tracked<String>,
    phone: Tracked<String>,
    password_hash: Tracked<String>,
    first_name: Tracked<String>,
    last_name: Tracked<String>,
    address: Tracked<String>,
    quartier: Tracked<String>,
    email_verification_token: Tracked<Option<String>>,
    phone_verification_token: Tracked<Option<String>>,
    email_verified_at: Tracked<Option<NaiveDateTime>>,
    phone_verified_at: Tracked<Option<NaiveDateTime>>,
    is_active: Tracked<bool>,
    is_blocked: Tracked<bool>,
    blocked_reason: Tracked<Option<String>>,
    blocked_at: Tracked<Option<NaiveDateTime>>,
    last_login_at: Tracked<Option<NaiveDateTime>>,
    created_at: Tracked<Option<NaiveDateTime>>,
    updated_at: Tracked<Option<NaiveDateTime>>,
}

impl Default for User {
    fn default() -> Self {
        Self::new()
    }
}

impl User {
    /// Create a new, unsaved user; accounts start active and unblocked
    pub fn new() -> Self {
        Self {
            meta: RecordMeta::default(),
            email: Tracked::default(),
            phone: Tracked::default(),
            password_hash: Tracked::default(),
            first_name: Tracked::default(),
            last_name: Tracked::default(),
            address: Tracked::default(),
            quartier: Tracked::default(),
            email_verification_token: Tracked::default(),
            phone_verification_token: Tracked::default(),
            email_verified_at: Tracked::default(),
            phone_verified_at: Tracked::default(),
            is_active: Tracked::new(true),
            is_blocked: Tracked::new(false),
            blocked_reason: Tracked::default(),
            blocked_at: Tracked::default(),
            last_login_at: Tracked::default(),
            created_at: Tracked::default(),
            updated_at: Tracked::default(),
        }
    }

    pub fn email(&self) -> &str {
        self.email.get()
    }

    pub fn phone(&self) -> &str {
        self.phone.get()
    }

    pub(crate) fn password_hash(&self) -> &str {
        self.password_hash.get()
    }

    pub fn first_name(&self) -> &str {
        self.first_name.get()
    }

    pub fn last_name(&self) -> &str {
        self.last_name.get()
    }

    pub fn address(&self) -> &str {
        self.address.get()
    }

    pub fn quartier(&self) -> &str {
        self.quartier.get()
    }

    pub fn email_verification_token(&self) -> Option<&str> {
        self.email_verification_token.get().as_deref()
    }

    pub fn phone_verification_token(&self) -> Option<&str> {
        self.phone_verification_token.get().as_deref()
    }

    pub fn email_verified_at(&self) -> Option<NaiveDateTime> {
        *self.email_verified_at.get()
    }

    pub fn phone_verified_at(&self) -> Option<NaiveDateTime> {
        *self.phone_verified_at.get()
    }

    pub fn is_active(&self) -> bool {
        *self.is_active.get()
    }

    pub fn is_blocked(&self) -> bool {
        *self.is_blocked.get()
    }

    pub fn blocked_reason(&self) -> Option<&str> {
        self.blocked_reason.get().as_deref()
    }

    pub fn blocked_at(&self) -> Option<NaiveDateTime> {
        *self.blocked_at.get()
    }

    pub fn last_login_at(&self) -> Option<NaiveDateTime> {
        *self.last_login_at.get()
    }

    pub fn created_at(&self) -> Option<NaiveDateTime> {
        *self.created_at.get()
    }

    pub fn updated_at(&self) -> Option<NaiveDateTime> {
        *self.updated_at.get()
    }

    pub fn is_email_verified(&self) -> bool {
        self.email_verified_at().is_some()
    }

    pub fn is_phone_verified(&self) -> bool {
        self.phone_verified_at().is_some()
    }

    pub fn is_fully_verified(&self) -> bool {
        self.is_email_verified() && self.is_phone_verified()
    }

    /// Only active, unblocked accounts may log in
    pub fn can_authenticate(&self) -> bool {
        self.is_active() && !self.is_blocked()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name(), self.last_name())
            .trim()
            .to_string()
    }

    /// Uppercased first letters of first and last name
    pub fn initials(&self) -> String {
        [self.first_name(), self.last_name()]
            .iter()
            .filter_map(|name| name.chars().next())
            .flat_map(char::to_uppercase)
            .collect()
    }

    pub(crate) fn set_password_hash(&mut self, hash: String) {
        self.password_hash.set(hash);
    }

    pub(crate) fn set_email_verification_token(&mut self, token: String) {
        self.email_verification_token.set(Some(token));
    }

    pub(crate) fn set_phone_verification_token(&mut self, code: String) {
        self.phone_verification_token.set(Some(code));
    }

    /// Consume the email token if it matches exactly
    pub(crate) fn mark_email_verified(&mut self, token: &str, at: NaiveDateTime) -> bool {
        if self.email_verification_token() != Some(token) {
            return false;
        }
        self.email_verified_at.set(Some(at));
        self.email_verification_token.set(None);
        true
    }

    /// Consume the phone code if it matches exactly
    pub(crate) fn mark_phone_verified(&mut self, code: &str, at: NaiveDateTime) -> bool {
        if self.phone_verification_token() != Some(code) {
            return false;
        }
        self.phone_verified_at.set(Some(at));
        self.phone_verification_token.set(None);
        true
    }

    pub(crate) fn mark_blocked(&mut self, reason: Option<String>, at: NaiveDateTime) {
        self.is_blocked.set(true);
        self.blocked_reason.set(reason);
        self.blocked_at.set(Some(at));
    }

    pub(crate) fn mark_unblocked(&mut self) {
        self.is_blocked.set(false);
        self.blocked_reason.set(None);
        self.blocked_at.set(None);
    }

    pub(crate) fn set_active(&mut self, active: bool) {
        self.is_active.set(active);
    }

    pub(crate) fn touch_last_login(&mut self, at: NaiveDateTime) {
        self.last_login_at.set(Some(at));
    }
}

impl Record for User {
    const TABLE: &'static str = "users";
    const FILLABLE: &'static [&'static str] = &[
        "email",
        "phone",
        "password_hash",
        "first_name",
        "last_name",
        "address",
        "quartier",
        "email_verification_token",
        "phone_verification_token",
        "is_active",
        "is_blocked",
        "blocked_reason",
    ];
    const GUARDED: &'static [&'static str] = &[
        "id",
        "email_verified_at",
        "phone_verified_at",
        "blocked_at",
        "last_login_at",
        "created_at",
        "updated_at",
    ];
    const HIDDEN: &'static [&'static str] = &[
        "password_hash",
        "email_verification_token",
        "phone_verification_token",
    ];

    fn from_row(row: &AnyRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            meta: RecordMeta::loaded(read::int(row, "id")?),
            email: Tracked::loaded(read::text(row, "email")?),
            phone: Tracked::loaded(read::text(row, "phone")?),
            password_hash: Tracked::loaded(read::text(row, "password_hash")?),
            first_name: Tracked::loaded(read::text(row, "first_name")?),
            last_name: Tracked::loaded(read::text(row, "last_name")?),
            address: Tracked::loaded(read::text(row, "address")?),
            quartier: Tracked::loaded(read::text(row, "quartier")?),
            email_verification_token: Tracked::loaded(read::opt_text(
                row,
                "email_verification_token",
            )?),
            phone_verification_token: Tracked::loaded(read::opt_text(
                row,
                "phone_verification_token",
            )?),
            email_verified_at: Tracked::loaded(read::opt_timestamp(row, "email_verified_at")?),
            phone_verified_at: Tracked::loaded(read::opt_timestamp(row, "phone_verified_at")?),
            is_active: Tracked::loaded(read::flag(row, "is_active")?),
            is_blocked: Tracked::loaded(read::flag(row, "is_blocked")?),
            blocked_reason: Tracked::loaded(read::opt_text(row, "blocked_reason")?),
            blocked_at: Tracked::loaded(read::opt_timestamp(row, "blocked_at")?),
            last_login_at: Tracked::loaded(read::opt_timestamp(row, "last_login_at")?),
            created_at: Tracked::loaded(read::opt_timestamp(row, "created_at")?),
            updated_at: Tracked::loaded(read::opt_timestamp(row, "updated_at")?),
        })
    }

    fn meta(&self) -> &RecordMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut RecordMeta {
        &mut self.meta
    }

    fn attributes(&self) -> Vec<Attribute> {
        vec![
            self.email.attribute("email"),
            self.phone.attribute("phone"),
            self.password_hash.attribute("password_hash"),
            self.first_name.attribute("first_name"),
            self.last_name.attribute("last_name"),
            self.address.attribute("address"),
            self.quartier.attribute("quartier"),
            self.email_verification_token
                .attribute("email_verification_token"),
            self.phone_verification_token
                .attribute("phone_verification_token"),
            self.email_verified_at.attribute("email_verified_at"),
            self.phone_verified_at.attribute("phone_verified_at"),
            self.is_active.attribute("is_active"),
            self.is_blocked.attribute("is_blocked"),
            self.blocked_reason.attribute("blocked_reason"),
            self.blocked_at.attribute("blocked_at"),
            self.last_login_at.attribute("last_login_at"),
            self.created_at.attribute("created_at"),
            self.updated_at.attribute("updated_at"),
        ]
    }

    fn assign(&mut self, column: &str, value: Value) -> Result<(), RecordError> {
        match column {
            "email" => self.email.set(value.into_string(column)?),
            "phone" => self.phone.set(value.into_string(column)?),
            "password_hash" => self.password_hash.set(value.into_string(column)?),
            "first_name" => self.first_name.set(value.into_string(column)?),
            "last_name" => self.last_name.set(value.into_string(column)?),
            "address" => self.address.set(value.into_string(column)?),
            "quartier" => self.quartier.set(value.into_string(column)?),
            "email_verification_token" => self
                .email_verification_token
                .set(value.into_text(column)?),
            "phone_verification_token" => self
                .phone_verification_token
                .set(value.into_text(column)?),
            "email_verified_at" => self.email_verified_at.set(value.into_timestamp(column)?),
            "phone_verified_at" => self.phone_verified_at.set(value.into_timestamp(column)?),
            "is_active" => self.is_active.set(value.into_bool(column)?),
            "is_blocked" => self.is_blocked.set(value.into_bool(column)?),
            "blocked_reason" => self.blocked_reason.set(value.into_text(column)?),
            "blocked_at" => self.blocked_at.set(value.into_timestamp(column)?),
            "last_login_at" => self.last_login_at.set(value.into_timestamp(column)?),
            "created_at" => self.created_at.set(value.into_timestamp(column)?),
            "updated_at" => self.updated_at.set(value.into_timestamp(column)?),
            _ => {
                return Err(RecordError::UnknownColumn {
                    table: Self::TABLE,
                    column: column.to_string(),
                });
            }
        }
        Ok(())
    }

    fn sync_original(&mut self) {
        self.email.sync();
        self.phone.sync();
        self.password_hash.sync();
        self.first_name.sync();
        self.last_name.sync();
        self.address.sync();
        self.quartier.sync();
        self.email_verification_token.sync();
        self.phone_verification_token.sync();
        self.email_verified_at.sync();
        self.phone_verified_at.sync();
        self.is_active.sync();
        self.is_blocked.sync();
        self.blocked_reason.sync();
        self.blocked_at.sync();
        self.last_login_at.sync();
        self.created_at.sync();
        self.updated_at.sync();
    }
}

/// New user creation payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUser {
    pub email: String,
    pub phone: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub address: String,
    pub quartier: String,
}

impl NewUser {
    /// Build from submitted form fields, trimming everything but the password
    pub fn from_form(form: &HashMap<String, String>) -> Self {
        let field = |name: &str| {
            form.get(name)
                .map(|value| value.trim().to_string())
                .unwrap_or_default()
        };

        Self {
            email: field("email"),
            phone: field("phone"),
            password: form.get("password").cloned().unwrap_or_default(),
            first_name: field("first_name"),
            last_name: field("last_name"),
            address: field("address"),
            quartier: field("quartier"),
        }
    }

    /// Every field must be non-empty
    pub fn check_required(&self) -> Result<(), UserError> {
        let fields = [
            ("email", &self.email),
            ("phone", &self.phone),
            ("password", &self.password),
            ("first_name", &self.first_name),
            ("last_name", &self.last_name),
            ("address", &self.address),
            ("quartier", &self.quartier),
        ];

        match fields.iter().find(|(_, value)| value.trim().is_empty()) {
            Some((name, _)) => Err(UserError::MissingField(*name)),
            None => Ok(()),
        }
    }
}

/// Aggregate counts over the users table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub total: i64,
    pub active: i64,
    pub verified: i64,
    pub this_week: i64,
    pub blocked: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ana() -> User {
        let mut user = User::new();
        user.fill([
            ("email", "a@b.mg"),
            ("phone", "0321234567"),
            ("password_hash", "$argon2id$hash"),
            ("first_name", "ana"),
            ("last_name", "Rabe"),
            ("address", "Lot 12 Analamanga"),
            ("quartier", "Isoraka"),
            ("email_verification_token", "abc"),
        ])
        .unwrap();
        user
    }

    #[test]
    fn test_new_user_defaults() {
        let user = User::new();
        assert!(!user.exists());
        assert!(user.is_active());
        assert!(!user.is_blocked());
        assert!(user.can_authenticate());
        assert!(user.is_dirty());
    }

    #[test]
    fn test_fill_ignores_guarded_columns() {
        let mut user = ana();
        user.fill([("email_verified_at", "2025-01-01 00:00:00"), ("id", "9")])
            .unwrap();
        assert!(!user.is_email_verified());
        assert_eq!(user.id(), None);
        assert_eq!(user.email(), "a@b.mg");
    }

    #[test]
    fn test_names() {
        let user = ana();
        assert_eq!(user.full_name(), "ana Rabe");
        assert_eq!(user.initials(), "AR");
    }

    #[test]
    fn test_email_token_is_single_use() {
        let mut user = ana();
        let at = common::record::value::now();

        assert!(!user.mark_email_verified("wrong", at));
        assert!(user.mark_email_verified("abc", at));
        assert!(user.is_email_verified());
        assert_eq!(user.email_verification_token(), None);
        assert!(!user.mark_email_verified("abc", at));
    }

    #[test]
    fn test_empty_code_never_matches_missing_token() {
        let mut user = ana();
        assert!(!user.mark_phone_verified("", common::record::value::now()));
        assert!(!user.is_phone_verified());
    }

    #[test]
    fn test_block_and_unblock() {
        let mut user = ana();
        user.mark_blocked(Some("spam".to_string()), common::record::value::now());
        assert!(user.is_blocked());
        assert!(!user.can_authenticate());
        assert_eq!(user.blocked_reason(), Some("spam"));

        user.mark_unblocked();
        assert!(user.can_authenticate());
        assert_eq!(user.blocked_reason(), None);
        assert_eq!(user.blocked_at(), None);
    }

    #[test]
    fn test_serialization_redacts_secrets() {
        let array = ana().to_array();
        assert!(!array.contains_key("password_hash"));
        assert!(!array.contains_key("email_verification_token"));
        assert!(!array.contains_key("phone_verification_token"));
        assert_eq!(array["email"], "a@b.mg");
        assert_eq!(array["is_active"], true);
    }

    #[test]
    fn test_new_user_required_fields() {
        let mut form = HashMap::new();
        form.insert("email".to_string(), " a@b.mg ".to_string());
        let new_user = NewUser::from_form(&form);

        assert_eq!(new_user.email, "a@b.mg");
        assert!(matches!(
            new_user.check_required(),
            Err(UserError::MissingField("phone"))
        ));
    }
}
