use axum::response::{IntoResponse, Response};
use axum_helpers::{AppError, TokenError};
use strum::Display;
use thiserror::Error;

use crate::validation::FieldError;

/// Unique field that a store write collided on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "snake_case")]
pub enum DuplicateField {
    Email,
    Username,
    ReferralCode,
    /// A second referral for the same referred user
    ReferredUser,
}

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("Invalid input")]
    InvalidInput(Vec<FieldError>),

    #[error("User already exists")]
    AlreadyExists,

    /// Raised by repositories; workflows translate it
    #[error("Duplicate {0}")]
    Duplicate(DuplicateField),

    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Unauthenticated: {0}")]
    Unauthenticated(TokenError),

    #[error("{0}")]
    NotFound(String),

    #[error("Invalid or expired reset token")]
    InvalidResetToken,

    /// Referral and user records disagree and need reconciliation
    #[error("Referral integrity error: {0}")]
    Integrity(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Token error: {0}")]
    Token(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type AccountResult<T> = Result<T, AccountError>;

impl From<mongodb::error::Error> for AccountError {
    fn from(err: mongodb::error::Error) -> Self {
        AccountError::Database(err.to_string())
    }
}

impl From<mongodb::bson::ser::Error> for AccountError {
    fn from(err: mongodb::bson::ser::Error) -> Self {
        AccountError::Database(format!("BSON serialization: {err}"))
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::InvalidInput(errors) => AppError::InvalidInput {
                message: "Request validation failed".to_string(),
                details: serde_json::to_value(errors).unwrap_or_default(),
            },
            AccountError::AlreadyExists => AppError::AlreadyExists("User already exists".to_string()),
            AccountError::Duplicate(field) => {
                tracing::warn!(%field, "Unmapped duplicate reached the HTTP layer");
                AppError::AlreadyExists("User already exists".to_string())
            }
            AccountError::InvalidCredentials => {
                AppError::Unauthorized("Invalid email or password".to_string())
            }
            AccountError::Unauthenticated(TokenError::Expired) => AppError::TokenExpired,
            AccountError::Unauthenticated(_) => AppError::Unauthorized("Invalid token".to_string()),
            AccountError::NotFound(msg) => AppError::NotFound(msg),
            AccountError::InvalidResetToken => {
                AppError::InvalidToken("Invalid or expired reset token".to_string())
            }
            AccountError::Integrity(msg) => {
                tracing::error!(error = %msg, "Referral integrity error");
                AppError::InternalServerError(msg)
            }
            AccountError::Database(msg)
            | AccountError::PasswordHash(msg)
            | AccountError::Token(msg)
            | AccountError::Internal(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl IntoResponse for AccountError {
    fn into_response(self) -> Response {
        AppError::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    fn status_of(err: AccountError) -> StatusCode {
        err.into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(status_of(AccountError::AlreadyExists), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(AccountError::InvalidInput(vec![])), StatusCode::BAD_REQUEST);
        assert_eq!(status_of(AccountError::InvalidCredentials), StatusCode::UNAUTHORIZED);
        assert_eq!(
            status_of(AccountError::Unauthenticated(TokenError::Expired)),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            status_of(AccountError::NotFound("User not found".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(status_of(AccountError::InvalidResetToken), StatusCode::BAD_REQUEST);
        assert_eq!(
            status_of(AccountError::Integrity("referral x".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            status_of(AccountError::Database("down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_messages() {
        assert_eq!(AccountError::AlreadyExists.to_string(), "User already exists");
        assert_eq!(
            AccountError::InvalidCredentials.to_string(),
            "Invalid email or password"
        );
        assert_eq!(DuplicateField::ReferralCode.to_string(), "referral_code");
    }
}
