//! User repository for database operations

use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use chrono::Duration;
use common::{
    error::StoreError,
    record::{Criteria, Direction, OrderBy, Record, RecordStore, value},
};
use rand::Rng;
use tracing::{debug, info, warn};

use crate::models::{NewUser, User, UserError, UserStats};

/// Hash a password with Argon2 and a fresh salt
fn hash_password(password: &str) -> Result<String, UserError> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    let argon2 = Argon2::default();
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| UserError::PasswordHash(e.to_string()))
}

/// Check a password against a stored hash; unreadable hashes never match
fn verify_password(password: &str, password_hash: &str) -> bool {
    let parsed_hash = match PasswordHash::new(password_hash) {
        Ok(hash) => hash,
        Err(e) => {
            warn!("Failed to parse password hash: {}", e);
            return false;
        }
    };

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

/// 32 random bytes, hex encoded
fn email_token() -> String {
    hex::encode(rand::random::<[u8; 32]>())
}

/// Six digit SMS code
fn phone_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

/// Map a unique constraint failure on insert to the matching domain error
fn duplicate_or(error: StoreError) -> UserError {
    match &error {
        StoreError::UniqueViolation { constraint } if constraint.contains("email") => {
            UserError::DuplicateEmail
        }
        StoreError::UniqueViolation { constraint } if constraint.contains("phone") => {
            UserError::DuplicatePhone
        }
        _ => UserError::Store(error),
    }
}

/// User repository
#[derive(Clone)]
pub struct UserRepository {
    store: RecordStore,
}

impl UserRepository {
    /// Create a new user repository
    pub fn new(store: RecordStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    /// Create a new user
    pub async fn create(&self, new_user: &NewUser) -> Result<User, UserError> {
        info!("Creating new user: {}", new_user.email);
        new_user.check_required()?;

        if self.find_by_email(&new_user.email).await?.is_some() {
            return Err(UserError::DuplicateEmail);
        }
        if self.find_by_phone(&new_user.phone).await?.is_some() {
            return Err(UserError::DuplicatePhone);
        }

        let password_hash = hash_password(&new_user.password)?;

        let mut user = User::new();
        user.fill([
            ("email", new_user.email.clone()),
            ("phone", new_user.phone.clone()),
            ("password_hash", password_hash),
            ("first_name", new_user.first_name.clone()),
            ("last_name", new_user.last_name.clone()),
            ("address", new_user.address.clone()),
            ("quartier", new_user.quartier.clone()),
            ("email_verification_token", email_token()),
            ("phone_verification_token", phone_code()),
        ])?;

        self.store.save(&mut user).await.map_err(duplicate_or)?;

        info!("User created with id {:?}", user.id());
        Ok(user)
    }

    /// Find a user by ID
    pub async fn find(&self, id: i64) -> Result<Option<User>, UserError> {
        Ok(self.store.find(id).await?)
    }

    /// Find a user by ID; a missing user is an error
    pub async fn find_or_fail(&self, id: i64) -> Result<User, UserError> {
        self.store.find_or_fail(id).await.map_err(|e| match e {
            StoreError::NotFound { id, .. } => UserError::NotFound(id),
            other => other.into(),
        })
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserError> {
        Ok(self.store.find_by(&Criteria::new().eq("email", email)).await?)
    }

    pub async fn find_by_phone(&self, phone: &str) -> Result<Option<User>, UserError> {
        Ok(self.store.find_by(&Criteria::new().eq("phone", phone)).await?)
    }

    /// Log a user in by email or phone.
    ///
    /// Returns `None` when no account matches, the password is wrong, or the
    /// account is inactive or blocked. A successful login is stamped.
    pub async fn authenticate(&self, login: &str, password: &str) -> Result<Option<User>, UserError> {
        let user = match self.find_by_email(login).await? {
            Some(user) => Some(user),
            None => self.find_by_phone(login).await?,
        };

        let Some(mut user) = user else {
            debug!("No account for login {}", login);
            return Ok(None);
        };

        if !verify_password(password, user.password_hash()) {
            debug!("Password mismatch for user {:?}", user.id());
            return Ok(None);
        }

        if !user.can_authenticate() {
            info!("Refusing login for inactive or blocked user {:?}", user.id());
            return Ok(None);
        }

        self.update_last_login(&mut user).await?;
        Ok(Some(user))
    }

    /// Confirm the email address; `false` unless the token matches exactly
    pub async fn verify_email(&self, user: &mut User, token: &str) -> Result<bool, UserError> {
        if !user.mark_email_verified(token, value::now()) {
            return Ok(false);
        }
        self.store.save(user).await?;
        info!("Email verified for user {:?}", user.id());
        Ok(true)
    }

    /// Confirm the phone number; `false` unless the code matches exactly
    pub async fn verify_phone(&self, user: &mut User, code: &str) -> Result<bool, UserError> {
        if !user.mark_phone_verified(code, value::now()) {
            return Ok(false);
        }
        self.store.save(user).await?;
        info!("Phone verified for user {:?}", user.id());
        Ok(true)
    }

    /// Issue and persist a fresh email token
    pub async fn regenerate_email_token(&self, user: &mut User) -> Result<String, UserError> {
        let token = email_token();
        user.set_email_verification_token(token.clone());
        self.store.save(user).await?;
        Ok(token)
    }

    /// Issue and persist a fresh phone code
    pub async fn regenerate_phone_code(&self, user: &mut User) -> Result<String, UserError> {
        let code = phone_code();
        user.set_phone_verification_token(code.clone());
        self.store.save(user).await?;
        Ok(code)
    }

    pub async fn block(&self, user: &mut User, reason: Option<&str>) -> Result<(), UserError> {
        user.mark_blocked(reason.map(str::to_string), value::now());
        self.store.save(user).await?;
        info!("User {:?} blocked", user.id());
        Ok(())
    }

    pub async fn unblock(&self, user: &mut User) -> Result<(), UserError> {
        user.mark_unblocked();
        self.store.save(user).await?;
        info!("User {:?} unblocked", user.id());
        Ok(())
    }

    pub async fn activate(&self, user: &mut User) -> Result<(), UserError> {
        user.set_active(true);
        self.store.save(user).await?;
        Ok(())
    }

    pub async fn deactivate(&self, user: &mut User) -> Result<(), UserError> {
        user.set_active(false);
        self.store.save(user).await?;
        Ok(())
    }

    /// Rehash and store a new password
    pub async fn change_password(&self, user: &mut User, new_password: &str) -> Result<(), UserError> {
        user.set_password_hash(hash_password(new_password)?);
        self.store.save(user).await?;
        info!("Password changed for user {:?}", user.id());
        Ok(())
    }

    pub async fn update_last_login(&self, user: &mut User) -> Result<(), UserError> {
        user.touch_last_login(value::now());
        self.store.save(user).await?;
        Ok(())
    }

    /// Active, unblocked users; newest first unless an order is given
    pub async fn get_active(
        &self,
        order_by: Option<OrderBy>,
        limit: Option<u32>,
        offset: u32,
    ) -> Result<Vec<User>, UserError> {
        let order_by =
            order_by.unwrap_or_else(|| vec![("created_at".to_string(), Direction::Desc)]);
        let criteria = Criteria::new()
            .eq("is_active", true)
            .eq("is_blocked", false);

        Ok(self
            .store
            .fetch_where(&criteria, &order_by, limit, offset)
            .await?)
    }

    /// Active users whose quartier contains `name`
    pub async fn find_by_quartier(&self, name: &str) -> Result<Vec<User>, UserError> {
        let criteria = Criteria::new()
            .like("quartier", format!("%{}%", name))
            .eq("is_active", true);
        let order_by = vec![("last_name".to_string(), Direction::Asc)];

        Ok(self
            .store
            .fetch_where(&criteria, &order_by, None, 0)
            .await?)
    }

    pub async fn stats(&self) -> Result<UserStats, UserError> {
        let week_ago = value::now() - Duration::days(7);

        let total = self.store.count::<User>(&Criteria::new()).await?;
        let active = self
            .store
            .count::<User>(&Criteria::new().eq("is_active", true).eq("is_blocked", false))
            .await?;
        let verified = self
            .store
            .count::<User>(
                &Criteria::new()
                    .not_null("email_verified_at")
                    .not_null("phone_verified_at"),
            )
            .await?;
        let this_week = self
            .store
            .count::<User>(&Criteria::new().gte("created_at", week_ago))
            .await?;
        let blocked = self
            .store
            .count::<User>(&Criteria::new().eq("is_blocked", true))
            .await?;

        Ok(UserStats {
            total,
            active,
            verified,
            this_week,
            blocked,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::ensure_schema;
    use common::database::{Backend, DatabaseConfig, init_pool};

    async fn repository() -> UserRepository {
        let pool = init_pool(&DatabaseConfig::in_memory()).await.unwrap();
        ensure_schema(&pool, Backend::Sqlite).await.unwrap();
        UserRepository::new(RecordStore::new(pool))
    }

    fn new_user(email: &str, phone: &str, quartier: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            phone: phone.to_string(),
            password: "secret1".to_string(),
            first_name: "Ana".to_string(),
            last_name: "R".to_string(),
            address: "Lot 12 Analamanga".to_string(),
            quartier: quartier.to_string(),
        }
    }

    #[test]
    fn test_password_hash_roundtrip() {
        let hash = hash_password("secret1").unwrap();
        assert_ne!(hash, "secret1");
        assert!(verify_password("secret1", &hash));
        assert!(!verify_password("secret2", &hash));
        assert!(!verify_password("secret1", "not-a-hash"));
    }

    #[test]
    fn test_tokens_have_expected_shape() {
        let token = email_token();
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));

        let code: u32 = phone_code().parse().unwrap();
        assert!((100_000..=999_999).contains(&code));
    }

    #[test]
    fn test_unique_violations_map_to_domain_errors() {
        let email = duplicate_or(StoreError::UniqueViolation {
            constraint: "users_email_unique".to_string(),
        });
        assert!(matches!(email, UserError::DuplicateEmail));

        let phone = duplicate_or(StoreError::UniqueViolation {
            constraint: "UNIQUE constraint failed: users.phone".to_string(),
        });
        assert!(matches!(phone, UserError::DuplicatePhone));

        let other = duplicate_or(StoreError::InvalidIdentifier("x y".to_string()));
        assert!(matches!(other, UserError::Store(_)));
    }

    #[tokio::test]
    async fn test_create_persists_hashed_user() {
        let repository = repository().await;
        let user = repository
            .create(&new_user("a@b.mg", "0321234567", "Isoraka"))
            .await
            .unwrap();

        assert!(user.exists());
        assert!(user.id().is_some());
        assert_ne!(user.password_hash(), "secret1");
        assert_eq!(user.email_verification_token().map(str::len), Some(64));
        assert_eq!(user.phone_verification_token().map(str::len), Some(6));
        assert!(user.created_at().is_some());

        let stored = repository.find_or_fail(user.id().unwrap()).await.unwrap();
        assert_eq!(stored.email(), "a@b.mg");
        assert!(stored.is_active());
        assert!(!stored.is_blocked());
        assert!(!stored.is_dirty());
    }

    #[tokio::test]
    async fn test_create_rejects_duplicates() {
        let repository = repository().await;
        repository
            .create(&new_user("a@b.mg", "0321234567", "Isoraka"))
            .await
            .unwrap();

        let same_email = repository
            .create(&new_user("a@b.mg", "0331234567", "Isoraka"))
            .await;
        assert!(matches!(same_email, Err(UserError::DuplicateEmail)));

        let same_phone = repository
            .create(&new_user("c@d.mg", "0321234567", "Isoraka"))
            .await;
        assert!(matches!(same_phone, Err(UserError::DuplicatePhone)));

        assert_eq!(repository.stats().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_unique_constraint_backs_the_precheck() {
        let repository = repository().await;
        repository
            .create(&new_user("a@b.mg", "0321234567", "Isoraka"))
            .await
            .unwrap();

        let mut twin = User::new();
        twin.fill([
            ("email", "a@b.mg"),
            ("phone", "0349999999"),
            ("password_hash", "x"),
            ("first_name", "Twin"),
            ("last_name", "R"),
            ("address", "Lot 12 Analamanga"),
            ("quartier", "Isoraka"),
        ])
        .unwrap();

        let error = repository.store().save(&mut twin).await.unwrap_err();
        assert!(matches!(duplicate_or(error), UserError::DuplicateEmail));
        assert!(!twin.exists());
    }

    #[tokio::test]
    async fn test_create_requires_every_field() {
        let repository = repository().await;
        let mut incomplete = new_user("a@b.mg", "0321234567", "Isoraka");
        incomplete.address = "  ".to_string();

        let result = repository.create(&incomplete).await;
        assert!(matches!(result, Err(UserError::MissingField("address"))));
    }

    #[tokio::test]
    async fn test_authenticate_by_email_or_phone() {
        let repository = repository().await;
        repository
            .create(&new_user("a@b.mg", "0321234567", "Isoraka"))
            .await
            .unwrap();

        let by_email = repository.authenticate("a@b.mg", "secret1").await.unwrap();
        let user = by_email.expect("email login should succeed");
        assert!(user.last_login_at().is_some());

        let by_phone = repository.authenticate("0321234567", "secret1").await.unwrap();
        assert!(by_phone.is_some());

        assert!(repository.authenticate("a@b.mg", "wrong").await.unwrap().is_none());
        assert!(repository.authenticate("x@y.mg", "secret1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_authenticate_refuses_blocked_and_inactive() {
        let repository = repository().await;
        let mut user = repository
            .create(&new_user("a@b.mg", "0321234567", "Isoraka"))
            .await
            .unwrap();

        repository.block(&mut user, Some("spam")).await.unwrap();
        assert!(repository.authenticate("a@b.mg", "secret1").await.unwrap().is_none());

        let stored = repository.find_or_fail(user.id().unwrap()).await.unwrap();
        assert!(stored.is_blocked());
        assert_eq!(stored.blocked_reason(), Some("spam"));
        assert!(stored.blocked_at().is_some());

        repository.unblock(&mut user).await.unwrap();
        repository.deactivate(&mut user).await.unwrap();
        assert!(repository.authenticate("a@b.mg", "secret1").await.unwrap().is_none());

        repository.activate(&mut user).await.unwrap();
        assert!(repository.authenticate("a@b.mg", "secret1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_verification_tokens_are_single_use() {
        let repository = repository().await;
        let mut user = repository
            .create(&new_user("a@b.mg", "0321234567", "Isoraka"))
            .await
            .unwrap();
        let token = user.email_verification_token().unwrap().to_string();
        let code = user.phone_verification_token().unwrap().to_string();

        assert!(!repository.verify_email(&mut user, "nope").await.unwrap());
        assert!(repository.verify_email(&mut user, &token).await.unwrap());
        assert!(!repository.verify_email(&mut user, &token).await.unwrap());
        assert!(repository.verify_phone(&mut user, &code).await.unwrap());

        let stored = repository.find_or_fail(user.id().unwrap()).await.unwrap();
        assert!(stored.is_fully_verified());
        assert_eq!(stored.email_verification_token(), None);
        assert_eq!(repository.stats().await.unwrap().verified, 1);
    }

    #[tokio::test]
    async fn test_regenerated_code_replaces_the_old_one() {
        let repository = repository().await;
        let mut user = repository
            .create(&new_user("a@b.mg", "0321234567", "Isoraka"))
            .await
            .unwrap();
        let old_token = user.email_verification_token().unwrap().to_string();

        let new_token = repository.regenerate_email_token(&mut user).await.unwrap();
        assert_ne!(old_token, new_token);
        assert!(!repository.verify_email(&mut user, &old_token).await.unwrap());
        assert!(repository.verify_email(&mut user, &new_token).await.unwrap());

        let code = repository.regenerate_phone_code(&mut user).await.unwrap();
        let stored = repository.find_or_fail(user.id().unwrap()).await.unwrap();
        assert_eq!(stored.phone_verification_token(), Some(code.as_str()));
    }

    #[tokio::test]
    async fn test_change_password() {
        let repository = repository().await;
        let mut user = repository
            .create(&new_user("a@b.mg", "0321234567", "Isoraka"))
            .await
            .unwrap();

        repository.change_password(&mut user, "another1").await.unwrap();
        assert!(repository.authenticate("a@b.mg", "secret1").await.unwrap().is_none());
        assert!(repository.authenticate("a@b.mg", "another1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_queries_and_stats() {
        let repository = repository().await;
        repository
            .create(&new_user("a@b.mg", "0321234567", "Isoraka"))
            .await
            .unwrap();
        repository
            .create(&new_user("b@b.mg", "0331234567", "Ambohipo"))
            .await
            .unwrap();
        let mut blocked = repository
            .create(&new_user("c@b.mg", "0341234567", "Isoraka Sud"))
            .await
            .unwrap();
        repository.block(&mut blocked, None).await.unwrap();

        let active = repository.get_active(None, None, 0).await.unwrap();
        assert_eq!(active.len(), 2);

        let page = repository
            .get_active(Some(vec![("email".to_string(), Direction::Asc)]), Some(1), 1)
            .await
            .unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].email(), "b@b.mg");

        // Blocked users still show up by quartier as long as they are active.
        let isoraka = repository.find_by_quartier("Isoraka").await.unwrap();
        assert_eq!(isoraka.len(), 2);

        let stats = repository.stats().await.unwrap();
        assert_eq!(
            stats,
            UserStats {
                total: 3,
                active: 2,
                verified: 0,
                this_week: 3,
                blocked: 1,
            }
        );
    }

    #[tokio::test]
    async fn test_find_or_fail_reports_missing_user() {
        let repository = repository().await;
        assert!(repository.find(42).await.unwrap().is_none());
        assert!(matches!(
            repository.find_or_fail(42).await,
            Err(UserError::NotFound(42))
        ));
    }
}
