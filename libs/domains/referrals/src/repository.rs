use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{AccountError, AccountResult, DuplicateField};
use crate::models::{LinkState, Referral, ReferralStatus, User};

/// Persistence for accounts.
///
/// Implementations enforce uniqueness of `email`, `username` and `referral_code`
/// and report a collision as [`AccountError::Duplicate`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn create(&self, user: User) -> AccountResult<User>;

    async fn get_by_id(&self, id: Uuid) -> AccountResult<Option<User>>;

    /// `email` must already be normalized
    async fn get_by_email(&self, email: &str) -> AccountResult<Option<User>>;

    async fn get_by_referral_code(&self, code: &str) -> AccountResult<Option<User>>;

    /// Matches a normalized email or an exact username
    async fn find_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> AccountResult<Option<User>>;

    /// Users with any of `ids`; unknown ids are skipped
    async fn get_many(&self, ids: &[Uuid]) -> AccountResult<Vec<User>>;

    /// Replace any outstanding reset token. `false` if the user is gone.
    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: String,
        expiry: DateTime<Utc>,
    ) -> AccountResult<bool>;

    /// Atomically clear the token matching `token_hash` and return the user as it
    /// was before, expiry included.
    async fn take_by_reset_token(&self, token_hash: &str) -> AccountResult<Option<User>>;

    async fn update_password(&self, id: Uuid, password_hash: String) -> AccountResult<bool>;
}

/// Persistence for referrals.
///
/// At most one referral exists per referred user; a second insert is
/// [`AccountError::Duplicate`] with [`DuplicateField::ReferredUser`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReferralRepository: Send + Sync {
    async fn insert(&self, referral: Referral) -> AccountResult<Referral>;

    /// Move a referral to [`LinkState::Linked`]. `false` if it does not exist.
    async fn mark_linked(&self, id: Uuid) -> AccountResult<bool>;

    /// Remove a referral. `false` if it does not exist.
    async fn discard(&self, id: Uuid) -> AccountResult<bool>;

    /// Linked referrals of `referrer_id`, oldest first
    async fn list_by_referrer(&self, referrer_id: Uuid) -> AccountResult<Vec<Referral>>;

    /// Linked referral counts of `referrer_id`, grouped by status
    async fn count_by_status(&self, referrer_id: Uuid)
    -> AccountResult<Vec<(ReferralStatus, u64)>>;

    /// Referrals still in [`LinkState::Linking`] created before `cutoff`
    async fn list_unlinked(&self, cutoff: DateTime<Utc>) -> AccountResult<Vec<Referral>>;
}

/// In-memory [`UserRepository`] for development and tests
#[derive(Debug, Default, Clone)]
pub struct InMemoryUserRepository {
    users: Arc<RwLock<HashMap<Uuid, User>>>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn create(&self, user: User) -> AccountResult<User> {
        let mut users = self.users.write().await;

        for existing in users.values() {
            if existing.email == user.email {
                return Err(AccountError::Duplicate(DuplicateField::Email));
            }
            if existing.username == user.username {
                return Err(AccountError::Duplicate(DuplicateField::Username));
            }
            if existing.referral_code == user.referral_code {
                return Err(AccountError::Duplicate(DuplicateField::ReferralCode));
            }
        }

        users.insert(user.id, user.clone());

        tracing::info!(user_id = %user.id, "Created user");
        Ok(user)
    }

    async fn get_by_id(&self, id: Uuid) -> AccountResult<Option<User>> {
        Ok(self.users.read().await.get(&id).cloned())
    }

    async fn get_by_email(&self, email: &str) -> AccountResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn get_by_referral_code(&self, code: &str) -> AccountResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users.values().find(|u| u.referral_code == code).cloned())
    }

    async fn find_by_email_or_username(
        &self,
        email: &str,
        username: &str,
    ) -> AccountResult<Option<User>> {
        let users = self.users.read().await;
        Ok(users
            .values()
            .find(|u| u.email == email || u.username == username)
            .cloned())
    }

    async fn get_many(&self, ids: &[Uuid]) -> AccountResult<Vec<User>> {
        let users = self.users.read().await;
        Ok(ids.iter().filter_map(|id| users.get(id).cloned()).collect())
    }

    async fn set_reset_token(
        &self,
        id: Uuid,
        token_hash: String,
        expiry: DateTime<Utc>,
    ) -> AccountResult<bool> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(false);
        };

        user.reset_token_hash = Some(token_hash);
        user.reset_token_expiry = Some(expiry);
        user.updated_at = Utc::now();
        Ok(true)
    }

    async fn take_by_reset_token(&self, token_hash: &str) -> AccountResult<Option<User>> {
        let mut users = self.users.write().await;
        let Some(user) = users
            .values_mut()
            .find(|u| u.reset_token_hash.as_deref() == Some(token_hash))
        else {
            return Ok(None);
        };

        let before = user.clone();
        user.reset_token_hash = None;
        user.reset_token_expiry = None;
        user.updated_at = Utc::now();
        Ok(Some(before))
    }

    async fn update_password(&self, id: Uuid, password_hash: String) -> AccountResult<bool> {
        let mut users = self.users.write().await;
        let Some(user) = users.get_mut(&id) else {
            return Ok(false);
        };

        user.password_hash = password_hash;
        user.updated_at = Utc::now();
        Ok(true)
    }
}

/// In-memory [`ReferralRepository`] for development and tests
#[derive(Debug, Default, Clone)]
pub struct InMemoryReferralRepository {
    referrals: Arc<RwLock<HashMap<Uuid, Referral>>>,
}

impl InMemoryReferralRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored referral regardless of link state
    pub async fn all(&self) -> Vec<Referral> {
        self.referrals.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl ReferralRepository for InMemoryReferralRepository {
    async fn insert(&self, referral: Referral) -> AccountResult<Referral> {
        let mut referrals = self.referrals.write().await;

        if referrals
            .values()
            .any(|r| r.referred_user_id == referral.referred_user_id)
        {
            return Err(AccountError::Duplicate(DuplicateField::ReferredUser));
        }

        referrals.insert(referral.id, referral.clone());
        Ok(referral)
    }

    async fn mark_linked(&self, id: Uuid) -> AccountResult<bool> {
        let mut referrals = self.referrals.write().await;
        Ok(match referrals.get_mut(&id) {
            Some(referral) => {
                referral.link_state = LinkState::Linked;
                true
            }
            None => false,
        })
    }

    async fn discard(&self, id: Uuid) -> AccountResult<bool> {
        Ok(self.referrals.write().await.remove(&id).is_some())
    }

    async fn list_by_referrer(&self, referrer_id: Uuid) -> AccountResult<Vec<Referral>> {
        let referrals = self.referrals.read().await;
        let mut result: Vec<Referral> = referrals
            .values()
            .filter(|r| r.referrer_id == referrer_id && r.is_linked())
            .cloned()
            .collect();

        result.sort_by(|a, b| {
            a.date_referred
                .cmp(&b.date_referred)
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(result)
    }

    async fn count_by_status(
        &self,
        referrer_id: Uuid,
    ) -> AccountResult<Vec<(ReferralStatus, u64)>> {
        let referrals = self.referrals.read().await;
        let mut counts: HashMap<ReferralStatus, u64> = HashMap::new();

        for referral in referrals
            .values()
            .filter(|r| r.referrer_id == referrer_id && r.is_linked())
        {
            *counts.entry(referral.status).or_default() += 1;
        }

        Ok(counts.into_iter().collect())
    }

    async fn list_unlinked(&self, cutoff: DateTime<Utc>) -> AccountResult<Vec<Referral>> {
        let referrals = self.referrals.read().await;
        Ok(referrals
            .values()
            .filter(|r| !r.is_linked() && r.date_referred < cutoff)
            .cloned()
            .collect())
    }
}
