use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use strum::{Display, EnumString};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::validation::{validate_email_address, validate_password_rules, validate_username};

/// Trim and lower-case an email before it is stored or compared.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Account record as persisted in the `users` collection.
///
/// Never returned to clients directly; see [`AuthResponse`] and [`UserSummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id", alias = "id")]
    pub id: Uuid,
    pub username: String,
    /// Normalized with [`normalize_email`]
    pub email: String,
    /// Argon2id PHC string
    pub password_hash: String,
    /// 8 upper-case hex characters
    pub referral_code: String,
    /// Set once, at creation, when registration used a valid referral code
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub referred_by: Option<Uuid>,
    /// SHA-256 hex digest of the outstanding reset token
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_token_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reset_token_expiry: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn new(
        username: impl Into<String>,
        email: &str,
        password_hash: String,
        referral_code: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            username: username.into(),
            email: normalize_email(email),
            password_hash,
            referral_code,
            referred_by: None,
            reset_token_hash: None,
            reset_token_expiry: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
        }
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    ToSchema,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReferralStatus {
    /// Not produced by registration; kept for referrals confirmed out of band
    Pending,
    Successful,
}

/// Progress of the paired referral/user write.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, Default,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LinkState {
    /// Referral written, referred user not yet confirmed
    #[default]
    Linking,
    /// Paired with a persisted user; visible to listings and stats
    Linked,
}

/// Referral record as persisted in the `referrals` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Referral {
    #[serde(rename = "_id", alias = "id")]
    pub id: Uuid,
    pub referrer_id: Uuid,
    /// Unique across referrals
    pub referred_user_id: Uuid,
    pub status: ReferralStatus,
    pub date_referred: DateTime<Utc>,
    pub link_state: LinkState,
}

impl Referral {
    /// A `successful` referral awaiting its user write.
    pub fn successful(referrer_id: Uuid, referred_user_id: Uuid) -> Self {
        Self {
            id: Uuid::now_v7(),
            referrer_id,
            referred_user_id,
            status: ReferralStatus::Successful,
            date_referred: Utc::now(),
            link_state: LinkState::Linking,
        }
    }

    pub fn is_linked(&self) -> bool {
        self.link_state == LinkState::Linked
    }
}

/// Public view of a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub email: String,
}

/// One row of `GET /api/referrals`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReferralEntry {
    pub id: Uuid,
    pub referrer_id: Uuid,
    pub referred_user_id: Uuid,
    /// `null` when the referred account record is missing
    pub referred_user: Option<UserSummary>,
    pub status: ReferralStatus,
    pub date_referred: DateTime<Utc>,
}

impl ReferralEntry {
    pub fn new(referral: Referral, referred_user: Option<UserSummary>) -> Self {
        Self {
            id: referral.id,
            referrer_id: referral.referrer_id,
            referred_user_id: referral.referred_user_id,
            referred_user,
            status: referral.status,
            date_referred: referral.date_referred,
        }
    }
}

/// Count per status; statuses without referrals are absent.
pub type ReferralStats = BTreeMap<ReferralStatus, u64>;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(custom(function = "validate_username"))]
    #[schema(example = "alice")]
    pub username: String,
    #[validate(custom(function = "validate_email_address"))]
    #[schema(example = "alice@example.com")]
    pub email: String,
    #[validate(custom(function = "validate_password_rules"))]
    #[schema(example = "Secret#123")]
    pub password: String,
    /// Another user's referral code
    #[serde(default)]
    #[schema(example = "1A2B3C4D")]
    pub referral_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ResetPasswordRequest {
    /// Token from `POST /api/forgot-password`
    pub token: String,
    #[validate(custom(function = "validate_password_rules"))]
    pub password: String,
}

/// Returned by register and login
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub referral_code: String,
    /// Bearer token for the protected endpoints
    pub token: String,
}

impl AuthResponse {
    pub fn new(user: &User, token: String) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            referral_code: user.referral_code.clone(),
            token,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ForgotPasswordResponse {
    pub message: String,
    /// Returned in the body; there is no email delivery
    pub reset_token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}
