//! Durable credential store interface.
//!
//! No plaintext long-lived credential ever crosses this boundary: the store
//! only sees the hex encoded output of
//! [`SymmetricCipher::seal`](crate::crypto::SymmetricCipher::seal).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserIdentity;

/// Errors raised by a durable credential store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("SQL request failed: {0}")]
    Sql(#[from] sqlx::Error),
    #[error("store call timed out")]
    Timeout,
}

/// Encrypted long-lived credential as saved on database.
#[derive(Clone, Debug, PartialEq, sqlx::FromRow)]
pub struct EncryptedCredential {
    /// Hex encoded `nonce || ciphertext || tag`.
    pub ciphertext: String,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

/// Public profile of a user, as returned by the provider userinfo endpoint.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserProfile {
    pub id: String,
    pub name: String,
    pub email: String,
}

/// Keyed by user identity. At most one record per user.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Find the encrypted credential record of `user`, revoked or not.
    async fn get_encrypted_credential(
        &self,
        user: &UserIdentity,
    ) -> Result<Option<EncryptedCredential>, StoreError>;

    /// Insert or overwrite the record of `user`.
    ///
    /// Overwriting clears the revoked flag and refreshes the creation time.
    async fn put_encrypted_credential(
        &self,
        user: &UserIdentity,
        ciphertext: &str,
    ) -> Result<(), StoreError>;

    /// Mark the record of `user` as revoked. Missing records are ignored.
    async fn revoke(&self, user: &UserIdentity) -> Result<(), StoreError>;

    /// Insert or update a user profile.
    async fn save_user(&self, profile: &UserProfile) -> Result<(), StoreError>;

    /// Find a user profile.
    async fn find_user(&self, user: &UserIdentity) -> Result<Option<UserProfile>, StoreError>;
}
