//! Colmeia Test Utilities
//!
//! Shared test infrastructure for the Colmeia workspace:
//! - `MockIdentityProvider`, an in-memory stand-in for Firebase Auth
//! - a fixed RSA key for signing test tokens (`keys`)
//! - proptest generators and fixtures

pub mod keys;

// Re-export the in-memory stores from their source crate
pub use colmeia_storage::{FailPoint, InMemoryDocumentStore, InMemoryRelationalStore};

pub use colmeia_core::{
    IdentityError, IdentityProvider, IdentityResult, IdentityUser, MemberRole, SignInResult,
    TaskDetail, Timestamp, VerifiedToken,
};

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

// ============================================================================
// MOCK IDENTITY PROVIDER
// ============================================================================

/// Identity operations that can be made to fail once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockFailure {
    CreateUser,
    DeleteUser,
    Revoke,
    CustomToken,
    Lookup,
}

#[derive(Debug, Clone)]
struct MockAccount {
    user: IdentityUser,
    password: String,
}

#[derive(Debug, Clone)]
struct IssuedToken {
    claims: VerifiedToken,
    revoked: bool,
}

#[derive(Debug, Default)]
struct MockState {
    accounts: HashMap<String, MockAccount>,
    tokens: HashMap<String, IssuedToken>,
    next_uid: u64,
    failures: HashSet<MockFailure>,
    revoked: Vec<String>,
    deleted: Vec<String>,
}

/// In-memory [`IdentityProvider`].
///
/// Tokens are opaque strings of the form `mock-token-{uid}-{n}`; only tokens
/// issued by this provider verify.
#[derive(Debug, Clone, Default)]
pub struct MockIdentityProvider {
    state: Arc<Mutex<MockState>>,
}

impl MockIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register an account and return its uid.
    pub fn add_user(&self, email: &str, password: &str, display_name: &str) -> String {
        let mut state = self.lock();
        state.next_uid += 1;
        let uid = format!("uid-{}", state.next_uid);
        state.accounts.insert(
            uid.clone(),
            MockAccount {
                user: IdentityUser {
                    uid: uid.clone(),
                    email: Some(email.to_string()),
                    display_name: Some(display_name.to_string()),
                    disabled: false,
                    valid_since: None,
                },
                password: password.to_string(),
            },
        );
        uid
    }

    /// Issue a token for a registered account.
    pub fn issue_token(&self, uid: &str) -> String {
        let (email, name) = {
            let state = self.lock();
            state
                .accounts
                .get(uid)
                .map(|a| (a.user.email.clone(), a.user.display_name.clone()))
                .unwrap_or((None, None))
        };
        self.token_for(uid, email.as_deref(), name.as_deref())
    }

    /// Issue a token with arbitrary claims, account or not.
    pub fn token_for(&self, uid: &str, email: Option<&str>, name: Option<&str>) -> String {
        let mut state = self.lock();
        let token = format!("mock-token-{}-{}", uid, state.tokens.len() + 1);
        state.tokens.insert(
            token.clone(),
            IssuedToken {
                claims: VerifiedToken {
                    uid: uid.to_string(),
                    email: email.map(str::to_string),
                    name: name.map(str::to_string),
                    auth_time: 1_704_067_200,
                    issued_at: 1_704_067_200,
                },
                revoked: false,
            },
        );
        token
    }

    /// Make the next call of `failure` fail.
    pub fn fail_next(&self, failure: MockFailure) {
        self.lock().failures.insert(failure);
    }

    fn take_failure(&self, failure: MockFailure) -> IdentityResult<()> {
        if self.lock().failures.remove(&failure) {
            return Err(IdentityError::RequestFailed {
                status: 503,
                message: format!("injected failure at {:?}", failure),
            });
        }
        Ok(())
    }

    pub fn has_user(&self, uid: &str) -> bool {
        self.lock().accounts.contains_key(uid)
    }

    pub fn user_count(&self) -> usize {
        self.lock().accounts.len()
    }

    /// Uids whose refresh tokens were revoked, in call order.
    pub fn revoked_uids(&self) -> Vec<String> {
        self.lock().revoked.clone()
    }

    /// Uids deleted through the provider, in call order.
    pub fn deleted_uids(&self) -> Vec<String> {
        self.lock().deleted.clone()
    }
}

#[async_trait]
impl IdentityProvider for MockIdentityProvider {
    async fn verify_id_token(&self, token: &str) -> IdentityResult<VerifiedToken> {
        let state = self.lock();
        match state.tokens.get(token) {
            Some(issued) if issued.revoked => Err(IdentityError::TokenRevoked),
            Some(issued) => Ok(issued.claims.clone()),
            None => Err(IdentityError::invalid_token("unknown token")),
        }
    }

    async fn create_user(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> IdentityResult<IdentityUser> {
        self.take_failure(MockFailure::CreateUser)?;
        let exists = self
            .lock()
            .accounts
            .values()
            .any(|a| a.user.email.as_deref() == Some(email));
        if exists {
            return Err(IdentityError::EmailExists {
                email: email.to_string(),
            });
        }
        let uid = self.add_user(email, password, display_name);
        let state = self.lock();
        state
            .accounts
            .get(&uid)
            .map(|a| a.user.clone())
            .ok_or_else(|| IdentityError::UserNotFound { id: uid.clone() })
    }

    async fn get_user(&self, uid: &str) -> IdentityResult<Option<IdentityUser>> {
        self.take_failure(MockFailure::Lookup)?;
        Ok(self.lock().accounts.get(uid).map(|a| a.user.clone()))
    }

    async fn get_user_by_email(&self, email: &str) -> IdentityResult<Option<IdentityUser>> {
        self.take_failure(MockFailure::Lookup)?;
        Ok(self
            .lock()
            .accounts
            .values()
            .find(|a| a.user.email.as_deref() == Some(email))
            .map(|a| a.user.clone()))
    }

    async fn delete_user(&self, uid: &str) -> IdentityResult<()> {
        self.take_failure(MockFailure::DeleteUser)?;
        let mut state = self.lock();
        if state.accounts.remove(uid).is_none() {
            return Err(IdentityError::UserNotFound {
                id: uid.to_string(),
            });
        }
        state.deleted.push(uid.to_string());
        Ok(())
    }

    async fn revoke_refresh_tokens(&self, uid: &str) -> IdentityResult<()> {
        self.take_failure(MockFailure::Revoke)?;
        let mut state = self.lock();
        for issued in state.tokens.values_mut().filter(|t| t.claims.uid == uid) {
            issued.revoked = true;
        }
        state.revoked.push(uid.to_string());
        Ok(())
    }

    async fn create_custom_token(&self, uid: &str) -> IdentityResult<String> {
        self.take_failure(MockFailure::CustomToken)?;
        Ok(format!("mock-custom-token-{}", uid))
    }

    async fn sign_in_with_password(
        &self,
        email: &str,
        password: &str,
    ) -> IdentityResult<SignInResult> {
        let uid = {
            let state = self.lock();
            let account = state
                .accounts
                .values()
                .find(|a| a.user.email.as_deref() == Some(email))
                .ok_or(IdentityError::InvalidCredentials)?;
            if account.password != password {
                return Err(IdentityError::InvalidCredentials);
            }
            if account.user.disabled {
                return Err(IdentityError::UserDisabled);
            }
            account.user.uid.clone()
        };
        let id_token = self.issue_token(&uid);
        Ok(SignInResult {
            refresh_token: format!("mock-refresh-{}", uid),
            uid,
            id_token,
            expires_in: 3600,
        })
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Colmeia types.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_member_role() -> impl Strategy<Value = MemberRole> {
        prop_oneof![Just(MemberRole::Admin), Just(MemberRole::Member)]
    }

    pub fn arb_email() -> impl Strategy<Value = String> {
        ("[a-z]{1,10}", "[a-z]{2,8}").prop_map(|(user, domain)| format!("{}@{}.io", user, domain))
    }

    pub fn arb_display_name() -> impl Strategy<Value = String> {
        "[A-Z][a-z]{1,10}( [A-Z][a-z]{1,10})?"
    }

    pub fn arb_workspace_id() -> impl Strategy<Value = i64> {
        1i64..1_000_000
    }

    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        // 2020-01-01 .. 2030-01-01
        (1_577_836_800i64..1_893_456_000).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_default()
        })
    }
}

// ============================================================================
// FIXTURES
// ============================================================================

pub mod fixtures {
    //! Ready-made values for common test scenarios.

    use super::*;
    use chrono::TimeZone;
    use colmeia_core::DEFAULT_TASK_STATUS;

    /// 2024-01-01 00:00:00 UTC
    pub fn fixed_now() -> Timestamp {
        chrono::Utc
            .timestamp_opt(1_704_067_200, 0)
            .single()
            .unwrap_or_default()
    }

    /// A task detail document created by `creator_uid` at [`fixed_now`].
    pub fn task_detail(workspace_id: i64, creator_uid: &str, title: &str) -> TaskDetail {
        TaskDetail {
            title: title.to_string(),
            description: String::new(),
            status: DEFAULT_TASK_STATUS.to_string(),
            priority: "medium".to_string(),
            expiration_date: None,
            attachment: None,
            workspace_id_pg: workspace_id,
            creator_firebase_uid: creator_uid.to_string(),
            created_at: fixed_now(),
            last_updated_at: fixed_now(),
            last_updated_by_firebase_uid: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_sign_in_issues_verifiable_token() {
        let mock = MockIdentityProvider::new();
        let uid = mock.add_user("ana@x.io", "secret1", "Ana");
        let signed = mock.sign_in_with_password("ana@x.io", "secret1").await.unwrap();
        assert_eq!(signed.uid, uid);
        let verified = mock.verify_id_token(&signed.id_token).await.unwrap();
        assert_eq!(verified.email.as_deref(), Some("ana@x.io"));
        assert!(mock.sign_in_with_password("ana@x.io", "nope").await.is_err());
    }

    #[tokio::test]
    async fn test_mock_revoke_invalidates_tokens() {
        let mock = MockIdentityProvider::new();
        let uid = mock.add_user("b@x.io", "pw1234", "B");
        let token = mock.issue_token(&uid);
        mock.revoke_refresh_tokens(&uid).await.unwrap();
        assert_eq!(
            mock.verify_id_token(&token).await.unwrap_err(),
            IdentityError::TokenRevoked
        );
        assert_eq!(mock.revoked_uids(), vec![uid]);
    }

    #[tokio::test]
    async fn test_mock_failure_fires_once() {
        let mock = MockIdentityProvider::new();
        mock.fail_next(MockFailure::CreateUser);
        assert!(mock.create_user("c@x.io", "pw1234", "C").await.is_err());
        assert!(mock.create_user("c@x.io", "pw1234", "C").await.is_ok());
        assert!(matches!(
            mock.create_user("c@x.io", "pw1234", "C").await,
            Err(IdentityError::EmailExists { .. })
        ));
    }
}
