use argon2::{
    Argon2,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
};

use crate::error::{AccountError, AccountResult};

/// A well-formed hash no password is known to match, with the same Argon2
/// parameters as [`hash_password`]. Verifying against it costs as much as a
/// real check, which keeps unknown accounts from answering faster.
pub const UNKNOWN_ACCOUNT_HASH: &str =
    "$argon2id$v=19$m=19456,t=2,p=1$b5aFihHHgoIvUBKwaX+EKA$vHAwQBz7G5mArhflro9cco0xhPB906hdlKpRA9fR/cM";

#[cfg(test)]
thread_local! {
    static VERIFICATIONS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

/// Argon2 verifications run on this thread so far.
#[cfg(test)]
pub(crate) fn verifications() -> usize {
    VERIFICATIONS.with(|n| n.get())
}

/// Argon2id with a fresh random salt, as a PHC string.
pub fn hash_password(password: &str) -> AccountResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AccountError::PasswordHash(e.to_string()))
}

/// `false` for a wrong password; an unparseable stored hash is an error.
pub fn verify_password(password: &str, password_hash: &str) -> AccountResult<bool> {
    #[cfg(test)]
    VERIFICATIONS.with(|n| n.set(n.get() + 1));

    let parsed =
        PasswordHash::new(password_hash).map_err(|e| AccountError::PasswordHash(e.to_string()))?;

    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify() {
        let hash = hash_password("Secret#123").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_password("Secret#123", &hash).unwrap());
        assert!(!verify_password("secret#123", &hash).unwrap());
    }

    #[test]
    fn test_salts_differ() {
        assert_ne!(
            hash_password("Secret#123").unwrap(),
            hash_password("Secret#123").unwrap()
        );
    }

    #[test]
    fn test_unknown_account_hash_matches_real_cost() {
        let real = hash_password("Secret#123").unwrap();
        let real = PasswordHash::new(&real).unwrap();
        let unknown = PasswordHash::new(UNKNOWN_ACCOUNT_HASH).unwrap();

        assert_eq!(unknown.algorithm, real.algorithm);
        assert_eq!(unknown.version, real.version);
        assert_eq!(unknown.params.to_string(), real.params.to_string());
        assert_eq!(unknown.hash.map(|h| h.len()), real.hash.map(|h| h.len()));
        assert!(!verify_password("Secret#123", UNKNOWN_ACCOUNT_HASH).unwrap());
    }

    #[test]
    fn test_garbage_hash_is_error() {
        assert!(matches!(
            verify_password("x", "not-a-phc-string"),
            Err(AccountError::PasswordHash(_))
        ));
    }
}
