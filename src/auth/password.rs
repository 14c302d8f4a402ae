//! Password hashing and password policy.
//!
//! Hashes are Argon2id PHC strings, so the parameters travel with the hash
//! and older hashes keep verifying after the configuration changes.
//!
//! ```rust,ignore
//! use plangate::auth::{PasswordHasher, PasswordPolicy};
//!
//! let hasher = PasswordHasher::default();
//! let hash = hasher.hash("correct horse battery")?;
//! assert!(hasher.verify("correct horse battery", &hash)?);
//!
//! PasswordPolicy::default().check("short")?; // BadRequest
//! ```

use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{
        PasswordHash, PasswordHasher as _, PasswordVerifier, SaltString, rand_core::OsRng,
    },
};

use crate::error::{PlanGateError, Result};

/// Argon2id cost parameters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasswordConfig {
    /// Memory cost in KiB
    pub memory_cost: u32,
    /// Iterations
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for PasswordConfig {
    fn default() -> Self {
        // OWASP minimum for Argon2id: m=19 MiB, t=2, p=1
        Self {
            memory_cost: 19 * 1024,
            time_cost: 2,
            parallelism: 1,
        }
    }
}

impl PasswordConfig {
    #[must_use]
    pub fn new(memory_cost: u32, time_cost: u32, parallelism: u32) -> Self {
        Self {
            memory_cost,
            time_cost,
            parallelism,
        }
    }

    /// Cheap parameters for tests. Never use in production.
    #[cfg(any(test, debug_assertions))]
    #[must_use]
    pub fn fast() -> Self {
        Self {
            memory_cost: 1024,
            time_cost: 1,
            parallelism: 1,
        }
    }
}

/// Argon2id password hasher.
#[derive(Clone, Debug, Default)]
pub struct PasswordHasher {
    config: PasswordConfig,
}

impl PasswordHasher {
    #[must_use]
    pub fn new(config: PasswordConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &PasswordConfig {
        &self.config
    }

    /// Hash a password into a PHC string with a fresh random salt.
    pub fn hash(&self, password: &str) -> Result<String> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon2()?
            .hash_password(password.as_bytes(), &salt)
            .map(|hash| hash.to_string())
            .map_err(|e| PlanGateError::internal(format!("Password hashing failed: {}", e)))
    }

    /// Verify a password against a stored PHC hash.
    ///
    /// A malformed stored hash is an internal error, not a failed match.
    pub fn verify(&self, password: &str, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| PlanGateError::internal(format!("Invalid password hash format: {}", e)))?;

        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok())
    }

    /// Whether `hash` was produced with different parameters or algorithm.
    pub fn needs_rehash(&self, hash: &str) -> Result<bool> {
        let parsed = PasswordHash::new(hash)
            .map_err(|e| PlanGateError::internal(format!("Invalid password hash format: {}", e)))?;

        if parsed.algorithm != argon2::ARGON2ID_IDENT {
            return Ok(true);
        }

        let (Some(m), Some(t), Some(p)) = (
            parsed.params.get("m").and_then(|v| v.decimal().ok()),
            parsed.params.get("t").and_then(|v| v.decimal().ok()),
            parsed.params.get("p").and_then(|v| v.decimal().ok()),
        ) else {
            return Ok(true);
        };

        Ok(m != self.config.memory_cost
            || t != self.config.time_cost
            || p != self.config.parallelism)
    }

    /// Burn roughly the same time as a real verification.
    ///
    /// Used when there is no stored hash to compare against.
    pub fn verify_dummy(&self, password: &str) {
        if let Ok(hash) = self.hash("plangate-dummy-password") {
            let _ = self.verify(password, &hash);
        }
    }

    fn argon2(&self) -> Result<Argon2<'static>> {
        let params = Params::new(
            self.config.memory_cost,
            self.config.time_cost,
            self.config.parallelism,
            None,
        )
        .map_err(|e| PlanGateError::internal(format!("Invalid Argon2 params: {}", e)))?;

        Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
    }
}

/// Rules a new password must satisfy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PasswordPolicy {
    /// Minimum length in characters (default 8)
    pub min_length: usize,
    /// Maximum length in characters (default 128)
    pub max_length: usize,
    pub require_letter: bool,
    pub require_digit: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_length: 128,
            require_letter: false,
            require_digit: false,
        }
    }
}

impl PasswordPolicy {
    #[must_use]
    pub fn min_length(mut self, len: usize) -> Self {
        self.min_length = len;
        self
    }

    #[must_use]
    pub fn max_length(mut self, len: usize) -> Self {
        self.max_length = len;
        self
    }

    /// Require at least one letter and one digit.
    #[must_use]
    pub fn require_mixed(mut self) -> Self {
        self.require_letter = true;
        self.require_digit = true;
        self
    }

    /// Every rule `password` breaks. Empty when the password is acceptable.
    #[must_use]
    pub fn validate(&self, password: &str) -> Vec<PasswordError> {
        let len = password.chars().count();
        let mut errors = Vec::new();

        if len < self.min_length {
            errors.push(PasswordError::TooShort {
                min: self.min_length,
            });
        }
        if len > self.max_length {
            errors.push(PasswordError::TooLong {
                max: self.max_length,
            });
        }
        if self.require_letter && !password.chars().any(char::is_alphabetic) {
            errors.push(PasswordError::MissingLetter);
        }
        if self.require_digit && !password.chars().any(|c| c.is_ascii_digit()) {
            errors.push(PasswordError::MissingDigit);
        }

        errors
    }

    /// Like [`validate`](Self::validate), as a `BadRequest` error.
    pub fn check(&self, password: &str) -> Result<()> {
        let errors = self.validate(password);
        if errors.is_empty() {
            return Ok(());
        }

        let reasons: Vec<String> = errors.iter().map(ToString::to_string).collect();
        Err(PlanGateError::bad_request(format!(
            "Password requirements not met: {}",
            reasons.join(", ")
        )))
    }
}

/// A broken password rule.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PasswordError {
    #[error("must be at least {min} characters")]
    TooShort { min: usize },
    #[error("must be at most {max} characters")]
    TooLong { max: usize },
    #[error("must contain a letter")]
    MissingLetter,
    #[error("must contain a digit")]
    MissingDigit,
}
