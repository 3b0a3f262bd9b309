//! Argon2id credential hashing for the login endpoint.
//!
//! Stored hashes are PHC strings, so salt and parameters travel with them.
//! Accounts provisioned without a password carry an empty hash and can
//! never log in with one.

use std::sync::OnceLock;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{Error, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;

/// Hash `password` with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String, Error> {
    let salt = SaltString::generate(&mut OsRng);
    Ok(Argon2::default()
        .hash_password(password.as_bytes(), &salt)?
        .to_string())
}

/// Verify `password` against a stored PHC hash.
///
/// A mismatch is `Ok(false)`; only a malformed hash is an error.
pub fn verify_password(password: &str, hash: &str) -> Result<bool, Error> {
    let parsed = PasswordHash::new(hash)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(Error::Password) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Check a login attempt against the account's stored hash, if any.
///
/// Unknown accounts and passwordless accounts still pay for one Argon2
/// verification so response times do not reveal which usernames exist.
pub fn check_credentials(password: &str, stored_hash: Option<&str>) -> Result<bool, Error> {
    match stored_hash.filter(|h| !h.is_empty()) {
        Some(hash) => verify_password(password, hash),
        None => {
            if let Some(decoy) = decoy_hash() {
                let _ = verify_password(password, decoy);
            }
            Ok(false)
        }
    }
}

fn decoy_hash() -> Option<&'static str> {
    static DECOY: OnceLock<Option<String>> = OnceLock::new();
    DECOY
        .get_or_init(|| hash_password("campus-decoy-credential").ok())
        .as_deref()
}
