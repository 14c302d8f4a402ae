//! Credentials, password hashing and the login/signup core.

mod authenticator;
mod credentials;
mod password;

pub use authenticator::{Authenticator, ResolvedContact, is_valid_email};
pub use credentials::{Argon2Credentials, CredentialStore, CredentialVerifier};
pub use password::{PasswordConfig, PasswordError, PasswordHasher, PasswordPolicy};
