//! Identity provider abstraction.
//!
//! The API never talks to the identity backend directly; it goes through
//! [`IdentityProvider`], which covers token verification, account
//! administration and password sign-in.

use crate::error::IdentityError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Result type alias for identity operations.
pub type IdentityResult<T> = Result<T, IdentityError>;

// ============================================================================
// CLOCK
// ============================================================================

/// Clock abstraction for token time validation.
///
/// Implementations must be thread-safe since verifiers are shared across
/// request handlers.
pub trait Clock: Send + Sync {
    /// Current time as Unix epoch seconds.
    fn now_epoch_secs(&self) -> i64;
}

/// Production clock using system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_epoch_secs(&self) -> i64 {
        chrono::Utc::now().timestamp()
    }
}

/// Fixed clock for deterministic tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub i64);

impl Clock for FixedClock {
    fn now_epoch_secs(&self) -> i64 {
        self.0
    }
}

// ============================================================================
// TYPES
// ============================================================================

/// Claims extracted from a verified ID token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedToken {
    pub uid: String,
    pub email: Option<String>,
    pub name: Option<String>,
    /// When the user authenticated (epoch seconds).
    pub auth_time: i64,
    /// When the token was issued (epoch seconds).
    pub issued_at: i64,
}

/// An account as seen by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityUser {
    pub uid: String,
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub disabled: bool,
    /// Tokens issued before this instant (epoch seconds) are revoked.
    pub valid_since: Option<i64>,
}

/// Outcome of an email/password sign-in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInResult {
    pub uid: String,
    pub id_token: String,
    pub refresh_token: String,
    /// Lifetime of the ID token in seconds.
    pub expires_in: i64,
}

// ============================================================================
// PROVIDER TRAIT
// ============================================================================

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Verify an ID token presented by a client.
    async fn verify_id_token(&self, token: &str) -> IdentityResult<VerifiedToken>;

    /// Create an account.
    async fn create_user(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> IdentityResult<IdentityUser>;

    async fn get_user(&self, uid: &str) -> IdentityResult<Option<IdentityUser>>;

    async fn get_user_by_email(&self, email: &str) -> IdentityResult<Option<IdentityUser>>;

    async fn delete_user(&self, uid: &str) -> IdentityResult<()>;

    /// Invalidate every refresh token issued to the user so far.
    async fn revoke_refresh_tokens(&self, uid: &str) -> IdentityResult<()>;

    /// Mint a custom token the client exchanges for an ID token.
    async fn create_custom_token(&self, uid: &str) -> IdentityResult<String>;

    async fn sign_in_with_password(&self, email: &str, password: &str)
        -> IdentityResult<SignInResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_clock_returns_value() {
        assert_eq!(FixedClock(1704067200).now_epoch_secs(), 1704067200);
    }

    #[test]
    fn test_system_clock_is_after_2024() {
        assert!(SystemClock.now_epoch_secs() > 1704067200);
    }
}
