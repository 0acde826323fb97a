//! Credentials held on behalf of a user.
//!
//! Secrets never implement a revealing `Debug` or `Display`.

pub mod cache;
pub mod resolver;
pub mod store;

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

pub use cache::CredentialCache;
pub use resolver::{Authenticated, Failure, Resolution, Resolver, Session};
pub use store::{CredentialStore, EncryptedCredential, StoreError, UserProfile};

/// Stable identifier of an end user, issued by the identity provider.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserIdentity(String);

impl UserIdentity {
    /// Create a new [`UserIdentity`].
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for UserIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Short-lived credential usable against the provider resource APIs.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerCredential(String);

impl BearerCredential {
    /// Create a new [`BearerCredential`].
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    /// Raw value, to be placed in an `Authorization: Bearer` header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for BearerCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("BearerCredential(**redacted**)")
    }
}

/// Long-lived credential exchangeable for a new [`BearerCredential`].
///
/// Plaintext only lives in memory between decryption and the exchange call.
#[derive(Clone, PartialEq, Eq)]
pub struct LongLivedCredential(Zeroizing<String>);

impl LongLivedCredential {
    /// Create a new [`LongLivedCredential`].
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Zeroizing::new(secret.into()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<Zeroizing<String>> for LongLivedCredential {
    fn from(secret: Zeroizing<String>) -> Self {
        Self(secret)
    }
}

impl std::fmt::Debug for LongLivedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("LongLivedCredential(**redacted**)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secrets_are_redacted() {
        let bearer = BearerCredential::new("ya29.secret");
        let long_lived = LongLivedCredential::new("1//secret");

        assert!(!format!("{bearer:?}").contains("secret"));
        assert!(!format!("{long_lived:?}").contains("secret"));
        assert_eq!(bearer.expose(), "ya29.secret");
        assert_eq!(long_lived.expose(), "1//secret");
    }

    #[test]
    fn test_identity_serializes_as_string() {
        let user = UserIdentity::new("1234567890");
        assert_eq!(serde_json::to_string(&user).unwrap(), "\"1234567890\"");
        assert_eq!(user.to_string(), "1234567890");
    }
}
