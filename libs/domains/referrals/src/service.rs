use axum_helpers::JwtAuth;
use chrono::Duration;
use std::sync::Arc;
use tracing::instrument;
use uuid::Uuid;

use crate::credentials::CredentialStore;
use crate::error::{AccountError, AccountResult, DuplicateField};
use crate::ledger::{ReconcileReport, ReferralLedger};
use crate::models::{
    AuthResponse, ForgotPasswordResponse, LoginRequest, MessageResponse, ReferralEntry,
    ReferralStats, RegisterRequest, ResetPasswordRequest, User,
};
use crate::repository::{ReferralRepository, UserRepository};
use crate::validation::{validate_password_reset, validate_registration};

pub const DEFAULT_RESET_TOKEN_TTL_SECS: i64 = 600;

/// Tunables for [`AccountService`]
#[derive(Debug, Clone, Copy)]
pub struct AccountSettings {
    pub reset_token_ttl: Duration,
}

impl Default for AccountSettings {
    fn default() -> Self {
        Self {
            reset_token_ttl: Duration::seconds(DEFAULT_RESET_TOKEN_TTL_SECS),
        }
    }
}

/// Registration, login, password reset and referral queries.
pub struct AccountService<U: UserRepository, R: ReferralRepository> {
    credentials: CredentialStore<U>,
    ledger: ReferralLedger<R, U>,
    tokens: JwtAuth,
}

impl<U: UserRepository, R: ReferralRepository> Clone for AccountService<U, R> {
    fn clone(&self) -> Self {
        Self {
            credentials: self.credentials.clone(),
            ledger: self.ledger.clone(),
            tokens: self.tokens.clone(),
        }
    }
}

impl<U: UserRepository, R: ReferralRepository> AccountService<U, R> {
    pub fn new(users: U, referrals: R, tokens: JwtAuth, settings: AccountSettings) -> Self {
        let users = Arc::new(users);
        Self {
            credentials: CredentialStore::new(Arc::clone(&users), settings.reset_token_ttl),
            ledger: ReferralLedger::new(Arc::new(referrals), users),
            tokens,
        }
    }

    pub fn credentials(&self) -> &CredentialStore<U> {
        &self.credentials
    }

    pub fn ledger(&self) -> &ReferralLedger<R, U> {
        &self.ledger
    }

    /// Create an account, link it to the owner of `referral_code` if that code
    /// resolves, and sign the new user in.
    ///
    /// An unknown referral code is ignored.
    #[instrument(skip_all, fields(username = %request.username))]
    pub async fn register(&self, request: RegisterRequest) -> AccountResult<AuthResponse> {
        validate_registration(&request).map_err(AccountError::InvalidInput)?;

        if self
            .credentials
            .find_by_email_or_username(&request.email, request.username.trim())
            .await?
            .is_some()
        {
            return Err(AccountError::AlreadyExists);
        }

        let mut user =
            self.credentials
                .build_user(&request.username, &request.email, &request.password)?;

        let referrer = match request.referral_code.as_deref() {
            Some(code) => self.credentials.find_by_referral_code(code).await?,
            None => None,
        };

        let user = match referrer {
            Some(referrer) => {
                user.referred_by = Some(referrer.id);
                self.insert_referred(user, referrer.id).await?
            }
            None => {
                if request.referral_code.is_some() {
                    tracing::debug!("Unknown referral code ignored");
                }
                self.credentials.insert(user).await.map_err(identity_conflict)?
            }
        };

        tracing::info!(user_id = %user.id, referred_by = ?user.referred_by, "Registered user");
        self.sign_in(&user)
    }

    /// Referral first, then the user, then the link. A failed user insert
    /// removes the referral again.
    async fn insert_referred(&self, user: User, referrer_id: Uuid) -> AccountResult<User> {
        let user_id = user.id;
        let referral = self
            .ledger
            .record_successful_referral(referrer_id, user_id)
            .await
            .map_err(|e| match e {
                AccountError::Duplicate(field) => {
                    AccountError::Internal(format!("referral already recorded ({field})"))
                }
                other => other,
            })?;

        match self.credentials.insert(user).await {
            Ok(user) => {
                self.ledger.confirm_link(&referral).await.map_err(|e| {
                    tracing::error!(
                        referral_id = %referral.id,
                        user_id = %user_id,
                        %referrer_id,
                        error = %e,
                        "Referral not linked after user insert"
                    );
                    match e {
                        AccountError::Integrity(_) => e,
                        other => AccountError::Integrity(format!(
                            "referral {} not linked to user {user_id}: {other}",
                            referral.id
                        )),
                    }
                })?;
                Ok(user)
            }
            Err(insert_err) => {
                if let Err(e) = self.ledger.discard_link(&referral).await {
                    tracing::error!(
                        referral_id = %referral.id,
                        user_id = %user_id,
                        %referrer_id,
                        error = %e,
                        "Orphaned referral left after failed user insert"
                    );
                    return Err(AccountError::Integrity(format!(
                        "referral {} orphaned for user {user_id}: {e}",
                        referral.id
                    )));
                }
                Err(identity_conflict(insert_err))
            }
        }
    }

    /// Wrong password and unknown email fail identically.
    #[instrument(skip_all)]
    pub async fn login(&self, request: LoginRequest) -> AccountResult<AuthResponse> {
        let user = self
            .credentials
            .authenticate(&request.email, &request.password)
            .await?
            .ok_or(AccountError::InvalidCredentials)?;

        self.sign_in(&user)
    }

    #[instrument(skip_all)]
    pub async fn request_password_reset(&self, email: &str) -> AccountResult<ForgotPasswordResponse> {
        let user = self
            .credentials
            .find_by_email(email)
            .await?
            .ok_or_else(|| AccountError::NotFound("User not found".to_string()))?;

        let reset_token = self.credentials.issue_password_reset_token(&user).await?;
        Ok(ForgotPasswordResponse {
            message: "Password reset token generated".to_string(),
            reset_token,
        })
    }

    #[instrument(skip_all)]
    pub async fn reset_password(&self, request: ResetPasswordRequest) -> AccountResult<MessageResponse> {
        validate_password_reset(&request).map_err(AccountError::InvalidInput)?;
        self.credentials
            .reset_password(&request.token, &request.password)
            .await?;

        Ok(MessageResponse {
            message: "Password has been reset".to_string(),
        })
    }

    pub async fn list_referrals(&self, requester_id: Uuid) -> AccountResult<Vec<ReferralEntry>> {
        self.ledger.list_by_referrer(requester_id).await
    }

    pub async fn referral_stats(&self, requester_id: Uuid) -> AccountResult<ReferralStats> {
        self.ledger.aggregate_by_status(requester_id).await
    }

    /// Settle paired writes interrupted more than `grace` ago.
    pub async fn reconcile_referrals(&self, grace: Duration) -> AccountResult<ReconcileReport> {
        self.ledger.reconcile(grace).await
    }

    fn sign_in(&self, user: &User) -> AccountResult<AuthResponse> {
        let token = self
            .tokens
            .issue(user.id)
            .map_err(|e| AccountError::Token(e.to_string()))?;
        Ok(AuthResponse::new(user, token))
    }
}

/// Email or username collisions from the store are the same failure as the
/// pre-insert check.
fn identity_conflict(err: AccountError) -> AccountError {
    match err {
        AccountError::Duplicate(DuplicateField::Email | DuplicateField::Username) => {
            AccountError::AlreadyExists
        }
        AccountError::Duplicate(field) => {
            AccountError::Internal(format!("unexpected duplicate {field}"))
        }
        other => other,
    }
}
