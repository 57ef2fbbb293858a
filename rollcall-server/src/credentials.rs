//! Password hashing
//!
//! Credentials are stored as PHC strings (`$pbkdf2-sha256$i=...`). The
//! round count is embedded in the hash, so verification works for any
//! value the hasher was configured with.

use pbkdf2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use pbkdf2::{Params, Pbkdf2};
use rand_core::OsRng;

use crate::error::{ApiError, ApiResult};

pub const DEFAULT_ROUNDS: u32 = 100_000;

const DECOY_SALT: &str = "cm9sbGNhbGxkZWNveQ";
const DECOY_OUTPUT: &str = "AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA";

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasherConfig {
    rounds: u32,
}

impl Default for PasswordHasherConfig {
    fn default() -> Self {
        Self {
            rounds: DEFAULT_ROUNDS,
        }
    }
}

impl PasswordHasherConfig {
    pub fn with_rounds(rounds: u32) -> Self {
        Self {
            rounds: rounds.max(1),
        }
    }

    /// Salted PBKDF2-SHA256 hash in PHC format
    pub fn hash(&self, password: &str) -> ApiResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let params = Params {
            rounds: self.rounds,
            output_length: 32,
        };
        Pbkdf2
            .hash_password_customized(password.as_bytes(), None, None, params, &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| ApiError::Internal(format!("password hashing failed: {}", e)))
    }

    /// Well-formed hash at the configured cost that no password matches
    ///
    /// Logins for unknown usernames verify against this so they take as
    /// long as logins for known ones.
    pub fn decoy_hash(&self) -> String {
        format!(
            "$pbkdf2-sha256$i={},l=32${}${}",
            self.rounds, DECOY_SALT, DECOY_OUTPUT
        )
    }
}

/// Constant-time check of `password` against a stored PHC hash
///
/// A malformed stored hash never matches.
pub fn verify_password(password: &str, stored: &str) -> bool {
    match PasswordHash::new(stored) {
        Ok(hash) => Pbkdf2.verify_password(password.as_bytes(), &hash).is_ok(),
        Err(_) => false,
    }
}
