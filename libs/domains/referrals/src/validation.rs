//! Field rules for registration and password changes.

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use utoipa::ToSchema;
use validator::{Validate, ValidateEmail, ValidationError, ValidationErrors};

use crate::models::{RegisterRequest, ResetPasswordRequest};

pub const MIN_USERNAME_LEN: usize = 3;
pub const MIN_PASSWORD_LEN: usize = 8;
const PASSWORD_SPECIAL_CHARS: &str = "!@#$%^&*(),.?\":{}|<>";

/// One violated rule on one input field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    /// Stable rule identifier, e.g. `password_uppercase`
    pub code: String,
    pub message: String,
}

fn rule(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(Cow::Borrowed(message));
    err
}

/// Alphanumeric, at least 3 characters, after trimming.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    let username = username.trim();
    if username.is_empty() || !username.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(rule(
            "username_alphanumeric",
            "Username must be alphanumeric",
        ));
    }
    if username.chars().count() < MIN_USERNAME_LEN {
        return Err(rule(
            "username_length",
            "Username must be at least 3 characters long",
        ));
    }
    Ok(())
}

pub fn validate_email_address(email: &str) -> Result<(), ValidationError> {
    if email.trim().validate_email() {
        Ok(())
    } else {
        Err(rule("email", "Invalid email format"))
    }
}

/// At least 8 characters with a digit, an upper-case letter and a special character.
///
/// Reports the first rule that fails.
pub fn validate_password_rules(password: &str) -> Result<(), ValidationError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(rule(
            "password_length",
            "Password must be at least 8 characters long",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_digit()) {
        return Err(rule(
            "password_digit",
            "Password must contain at least one number",
        ));
    }
    if !password.chars().any(|c| c.is_ascii_uppercase()) {
        return Err(rule(
            "password_uppercase",
            "Password must contain at least one uppercase letter",
        ));
    }
    if !password.chars().any(|c| PASSWORD_SPECIAL_CHARS.contains(c)) {
        return Err(rule(
            "password_special",
            "Password must contain at least one special character",
        ));
    }
    Ok(())
}

/// Flatten `validator` output, ordered by field name.
pub fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut fields: Vec<_> = errors.field_errors().into_iter().collect();
    fields.sort_by(|a, b| a.0.cmp(&b.0));

    fields
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |err| FieldError {
                field: field.to_string(),
                code: err.code.to_string(),
                message: err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| err.code.to_string()),
            })
        })
        .collect()
}

/// Check every registration field; all violations are returned together.
pub fn validate_registration(request: &RegisterRequest) -> Result<(), Vec<FieldError>> {
    request.validate().map_err(|e| field_errors(&e))
}

pub fn validate_password_reset(request: &ResetPasswordRequest) -> Result<(), Vec<FieldError>> {
    request.validate().map_err(|e| field_errors(&e))
}
