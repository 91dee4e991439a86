use argon2::password_hash::rand_core::{OsRng, RngCore};
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::error::{AccountError, AccountResult, DuplicateField};
use crate::models::{User, normalize_email};
use crate::password;
use crate::repository::UserRepository;

const REFERRAL_CODE_BYTES: usize = 4;
const RESET_TOKEN_BYTES: usize = 20;
const MAX_REFERRAL_CODE_ATTEMPTS: usize = 5;

/// 8 upper-case hex characters
pub fn generate_referral_code() -> String {
    let mut bytes = [0u8; REFERRAL_CODE_BYTES];
    OsRng.fill_bytes(&mut bytes);
    const_hex::encode_upper(bytes)
}

fn generate_reset_token() -> String {
    let mut bytes = [0u8; RESET_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    const_hex::encode(bytes)
}

/// Only this digest of a reset token is persisted.
pub fn reset_token_digest(token: &str) -> String {
    const_hex::encode(Sha256::digest(token.as_bytes()))
}

/// Owns account records, password hashes and reset tokens.
pub struct CredentialStore<U: UserRepository> {
    users: Arc<U>,
    reset_token_ttl: Duration,
}

impl<U: UserRepository> Clone for CredentialStore<U> {
    fn clone(&self) -> Self {
        Self {
            users: Arc::clone(&self.users),
            reset_token_ttl: self.reset_token_ttl,
        }
    }
}

impl<U: UserRepository> CredentialStore<U> {
    pub fn new(users: Arc<U>, reset_token_ttl: Duration) -> Self {
        Self {
            users,
            reset_token_ttl,
        }
    }

    pub fn users(&self) -> &Arc<U> {
        &self.users
    }

    pub async fn find_by_email(&self, email: &str) -> AccountResult<Option<User>> {
        self.users.get_by_email(&normalize_email(email)).await
    }

    pub async fn find_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> AccountResult<Option<User>> {
        self.users
            .find_by_email_or_username(&normalize_email(email), username)
            .await
    }

    pub async fn find_by_referral_code(&self, code: &str) -> AccountResult<Option<User>> {
        let code = code.trim();
        if code.is_empty() {
            return Ok(None);
        }
        self.users.get_by_referral_code(code).await
    }

    /// Hash the password and assign a referral code. Nothing is persisted.
    pub fn build_user(&self, username: &str, email: &str, plaintext: &str) -> AccountResult<User> {
        let password_hash = password::hash_password(plaintext)?;
        Ok(User::new(
            username.trim(),
            email,
            password_hash,
            generate_referral_code(),
        ))
    }

    /// Persist `user`, drawing a fresh referral code when the current one collides.
    ///
    /// Email and username collisions come back as [`AccountError::Duplicate`].
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn insert(&self, mut user: User) -> AccountResult<User> {
        for attempt in 1..=MAX_REFERRAL_CODE_ATTEMPTS {
            match self.users.create(user.clone()).await {
                Err(AccountError::Duplicate(DuplicateField::ReferralCode)) => {
                    tracing::warn!(attempt, "Referral code collision, regenerating");
                    user.referral_code = generate_referral_code();
                }
                other => return other,
            }
        }

        Err(AccountError::Internal(format!(
            "no unique referral code after {MAX_REFERRAL_CODE_ATTEMPTS} attempts"
        )))
    }

    /// [`build_user`](Self::build_user) then [`insert`](Self::insert), without a referrer.
    pub async fn create(&self, username: &str, email: &str, plaintext: &str) -> AccountResult<User> {
        let user = self.build_user(username, email, plaintext)?;
        self.insert(user).await
    }

    pub fn verify_password(&self, user: &User, plaintext: &str) -> AccountResult<bool> {
        password::verify_password(plaintext, &user.password_hash)
    }

    /// The account behind `email`, if `plaintext` is its password.
    ///
    /// Exactly one Argon2 verification runs either way: an unknown email is
    /// checked against [`password::UNKNOWN_ACCOUNT_HASH`].
    #[instrument(skip_all)]
    pub async fn authenticate(&self, email: &str, plaintext: &str) -> AccountResult<Option<User>> {
        let user = self.find_by_email(email).await?;
        let password_hash = user
            .as_ref()
            .map_or(password::UNKNOWN_ACCOUNT_HASH, |u| u.password_hash.as_str());
        let matches = password::verify_password(plaintext, password_hash)?;

        match user {
            Some(user) if matches => Ok(Some(user)),
            Some(user) => {
                tracing::info!(user_id = %user.id, "Login with wrong password");
                Ok(None)
            }
            None => {
                tracing::info!("Login for unknown email");
                Ok(None)
            }
        }
    }

    /// New single-use token; any previous token for the user stops working.
    #[instrument(skip(self, user), fields(user_id = %user.id))]
    pub async fn issue_password_reset_token(&self, user: &User) -> AccountResult<String> {
        let token = generate_reset_token();
        let expiry = Utc::now() + self.reset_token_ttl;

        let stored = self
            .users
            .set_reset_token(user.id, reset_token_digest(&token), expiry)
            .await?;
        if !stored {
            return Err(AccountError::NotFound("User not found".to_string()));
        }

        tracing::info!(expires_at = %expiry, "Issued password reset token");
        Ok(token)
    }

    /// Clear the matching token. `None` when unknown, already used or expired.
    #[instrument(skip_all)]
    pub async fn consume_reset_token(&self, token: &str) -> AccountResult<Option<User>> {
        let Some(user) = self
            .users
            .take_by_reset_token(&reset_token_digest(token.trim()))
            .await?
        else {
            return Ok(None);
        };

        match user.reset_token_expiry {
            Some(expiry) if expiry > Utc::now() => Ok(Some(user)),
            _ => {
                tracing::info!(user_id = %user.id, "Expired reset token presented");
                Ok(None)
            }
        }
    }

    pub async fn set_password(&self, user_id: Uuid, plaintext: &str) -> AccountResult<()> {
        let password_hash = password::hash_password(plaintext)?;
        self.store_password_hash(user_id, password_hash).await
    }

    async fn store_password_hash(&self, user_id: Uuid, password_hash: String) -> AccountResult<()> {
        if self.users.update_password(user_id, password_hash).await? {
            Ok(())
        } else {
            Err(AccountError::NotFound("User not found".to_string()))
        }
    }

    /// Consume `token` and store a hash of `new_password`.
    ///
    /// The hash is computed before the token is consumed, and the token is put
    /// back if the new hash cannot be stored, so a failed reset can be retried.
    /// Password rules are the caller's concern.
    pub async fn reset_password(&self, token: &str, new_password: &str) -> AccountResult<User> {
        let password_hash = password::hash_password(new_password)?;

        let user = self
            .consume_reset_token(token)
            .await?
            .ok_or(AccountError::InvalidResetToken)?;

        if let Err(e) = self.store_password_hash(user.id, password_hash).await {
            self.restore_reset_token(&user).await;
            return Err(e);
        }

        tracing::info!(user_id = %user.id, "Password reset");
        Ok(user)
    }

    async fn restore_reset_token(&self, user: &User) {
        let (Some(token_hash), Some(expiry)) =
            (user.reset_token_hash.clone(), user.reset_token_expiry)
        else {
            return;
        };

        match self.users.set_reset_token(user.id, token_hash, expiry).await {
            Ok(_) => {
                tracing::warn!(user_id = %user.id, "Password update failed, reset token restored")
            }
            Err(e) => {
                tracing::error!(user_id = %user.id, error = %e, "Failed to restore reset token")
            }
        }
    }
}
