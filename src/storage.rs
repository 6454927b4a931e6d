// ABOUTME: In-memory repository for all security-relevant entities
// ABOUTME: One coarse mutex guarantees atomic code and refresh-token redemption
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::models::{AccessToken, AuthorizationCode, Client, RefreshToken, User};

/// Process-memory storage shared by all request handlers.
///
/// Everything lives behind a single mutex. That makes lookup-and-delete
/// operations (`take_authorization_code`, `take_refresh_token`) atomic:
/// two concurrent redemptions of the same credential cannot both succeed.
/// Nothing here survives a restart.
#[derive(Debug, Default)]
pub struct Storage {
    inner: Mutex<StorageInner>,
}

#[derive(Debug, Default)]
struct StorageInner {
    clients: HashMap<String, Client>,
    users: HashMap<String, User>,
    authorization_codes: HashMap<String, AuthorizationCode>,
    access_tokens: HashMap<String, AccessToken>,
    refresh_tokens: HashMap<String, RefreshToken>,
    nonces: HashSet<String>,
}

impl Storage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, StorageInner> {
        // A poisoned lock only means another handler panicked mid-write;
        // the maps themselves are still usable for a test server.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn store_client(&self, client: Client) {
        self.lock().clients.insert(client.id.clone(), client);
    }

    #[must_use]
    pub fn get_client(&self, id: &str) -> Option<Client> {
        self.lock().clients.get(id).cloned()
    }

    /// Overwrites any existing user with the same subject.
    pub fn store_user(&self, user: User) {
        self.lock().users.insert(user.sub.clone(), user);
    }

    #[must_use]
    pub fn get_user(&self, sub: &str) -> Option<User> {
        self.lock().users.get(sub).cloned()
    }

    pub fn store_authorization_code(&self, code: AuthorizationCode) {
        self.lock()
            .authorization_codes
            .insert(code.code.clone(), code);
    }

    /// Remove and return an authorization code in one atomic step.
    ///
    /// The caller validates the returned code; a second taker observes
    /// `None` and must fail the redemption.
    #[must_use]
    pub fn take_authorization_code(&self, code: &str) -> Option<AuthorizationCode> {
        self.lock().authorization_codes.remove(code)
    }

    pub fn store_access_token(&self, token: AccessToken) {
        self.lock().access_tokens.insert(token.token.clone(), token);
    }

    /// Returns the token only while it is unexpired. Expired tokens stay in
    /// the map but are logically absent.
    #[must_use]
    pub fn get_access_token(&self, token: &str) -> Option<AccessToken> {
        self.lock()
            .access_tokens
            .get(token)
            .filter(|t| !t.is_expired())
            .cloned()
    }

    /// Hard-delete an access token, used when a refresh supersedes a grant.
    pub fn remove_access_token(&self, token: &str) {
        self.lock().access_tokens.remove(token);
    }

    pub fn store_refresh_token(&self, token: RefreshToken) {
        self.lock()
            .refresh_tokens
            .insert(token.token.clone(), token);
    }

    /// Remove and return a refresh token in one atomic step (rotation).
    #[must_use]
    pub fn take_refresh_token(&self, token: &str) -> Option<RefreshToken> {
        self.lock().refresh_tokens.remove(token)
    }

    pub fn record_nonce(&self, nonce: &str) {
        self.lock().nonces.insert(nonce.to_owned());
    }

    #[must_use]
    pub fn nonce_seen(&self, nonce: &str) -> bool {
        self.lock().nonces.contains(nonce)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::{Duration, Utc};

    use super::*;

    fn sample_code(code: &str) -> AuthorizationCode {
        AuthorizationCode {
            code: code.to_owned(),
            client_id: "client".to_owned(),
            redirect_uri: "https://rp.example/cb".to_owned(),
            sub: "alice".to_owned(),
            scope: "openid".to_owned(),
            nonce: None,
            expires_at: Utc::now() + Duration::minutes(10),
        }
    }

    #[test]
    fn authorization_code_is_taken_exactly_once() {
        let storage = Storage::new();
        storage.store_authorization_code(sample_code("abc"));

        assert!(storage.take_authorization_code("abc").is_some());
        assert!(storage.take_authorization_code("abc").is_none());
    }

    #[test]
    fn concurrent_redemption_yields_a_single_winner() {
        let storage = Arc::new(Storage::new());
        storage.store_authorization_code(sample_code("contested"));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let storage = Arc::clone(&storage);
                std::thread::spawn(move || storage.take_authorization_code("contested").is_some())
            })
            .collect();

        let wins = handles
            .into_iter()
            .map(|h| h.join().expect("thread panicked"))
            .filter(|&won| won)
            .count();
        assert_eq!(wins, 1);
    }

    #[test]
    fn expired_access_token_is_logically_absent() {
        let storage = Storage::new();
        storage.store_access_token(AccessToken {
            token: "tok".to_owned(),
            sub: "alice".to_owned(),
            client_id: "client".to_owned(),
            scope: "openid".to_owned(),
            expires_at: Utc::now() - Duration::seconds(1),
        });

        assert!(storage.get_access_token("tok").is_none());
    }

    #[test]
    fn user_is_overwritten_not_merged() {
        let storage = Storage::new();
        let mut first = User::implicit("alice");
        first
            .claims
            .insert("name".to_owned(), "Alice".to_owned().into());
        storage.store_user(first);

        storage.store_user(User {
            sub: "alice".to_owned(),
            claims: HashMap::new(),
            userinfo: HashMap::new(),
        });

        let stored = storage.get_user("alice").expect("user exists");
        assert!(stored.claims.is_empty());
    }

    #[test]
    fn nonce_registry_detects_duplicates() {
        let storage = Storage::new();
        assert!(!storage.nonce_seen("n1"));
        storage.record_nonce("n1");
        assert!(storage.nonce_seen("n1"));
    }
}
