//! In-memory collaborators. MUST NEVER be used in production.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use url::Url;

use crate::credential::{
    BearerCredential, CredentialStore, EncryptedCredential, LongLivedCredential, StoreError,
    UserIdentity, UserProfile,
};
use crate::crypto::{SymmetricCipher, SymmetricKey};
use crate::provider::{Grant, IdentityProvider, ProviderError, Renewal};

pub fn cipher() -> SymmetricCipher {
    SymmetricCipher::new(SymmetricKey::from_bytes(&[0x42; 32]).unwrap())
}

/// Durable credential store counting its calls.
#[derive(Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<UserIdentity, EncryptedCredential>>,
    users: Mutex<HashMap<String, UserProfile>>,
    pub gets: AtomicUsize,
    pub puts: AtomicUsize,
    /// Make every credential write fail.
    pub fail_puts: AtomicBool,
    pub delay: Option<Duration>,
}

impl MemoryStore {
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }

    /// Seed a record sealing `long_lived` with [`cipher`].
    pub fn seed(&self, user: &str, long_lived: &str, revoked: bool) {
        self.seed_raw(user, &cipher().seal_to_hex(long_lived).unwrap(), revoked);
    }

    pub fn seed_raw(&self, user: &str, ciphertext: &str, revoked: bool) {
        self.records.lock().unwrap().insert(
            UserIdentity::new(user),
            EncryptedCredential {
                ciphertext: ciphertext.to_owned(),
                revoked,
                created_at: Utc::now(),
            },
        );
    }

    pub fn record(&self, user: &str) -> Option<EncryptedCredential> {
        self.records
            .lock()
            .unwrap()
            .get(&UserIdentity::new(user))
            .cloned()
    }

    pub fn user(&self, id: &str) -> Option<UserProfile> {
        self.users.lock().unwrap().get(id).cloned()
    }

    async fn wait(&self) {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl CredentialStore for MemoryStore {
    async fn get_encrypted_credential(
        &self,
        user: &UserIdentity,
    ) -> Result<Option<EncryptedCredential>, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        Ok(self.records.lock().unwrap().get(user).cloned())
    }

    async fn put_encrypted_credential(
        &self,
        user: &UserIdentity,
        ciphertext: &str,
    ) -> Result<(), StoreError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.wait().await;
        if self.fail_puts.load(Ordering::SeqCst) {
            return Err(StoreError::Timeout);
        }
        self.seed_raw(user.as_str(), ciphertext, false);
        Ok(())
    }

    async fn revoke(&self, user: &UserIdentity) -> Result<(), StoreError> {
        if let Some(record) = self.records.lock().unwrap().get_mut(user) {
            record.revoked = true;
        }
        Ok(())
    }

    async fn save_user(&self, profile: &UserProfile) -> Result<(), StoreError> {
        self.users
            .lock()
            .unwrap()
            .insert(profile.id.clone(), profile.clone());
        Ok(())
    }

    async fn find_user(&self, user: &UserIdentity) -> Result<Option<UserProfile>, StoreError> {
        self.wait().await;
        Ok(self.users.lock().unwrap().get(user.as_str()).cloned())
    }
}

/// Identity provider knowing authorization code `AC1` for user `U1` and the
/// long-lived credential `long-U1`.
#[derive(Default)]
pub struct FakeProvider {
    pub exchanges: AtomicUsize,
    pub renewals: AtomicUsize,
    pub reject: AtomicBool,
    pub rotate: bool,
    pub delay: Option<Duration>,
}

impl FakeProvider {
    pub fn rotating() -> Self {
        Self {
            rotate: true,
            ..Default::default()
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Default::default()
        }
    }
}

#[async_trait]
impl IdentityProvider for FakeProvider {
    fn authorization_url(&self) -> Url {
        Url::parse("https://provider.test/authorize?access_type=offline").unwrap()
    }

    async fn exchange_authorization_code(&self, code: &str) -> Result<Grant, ProviderError> {
        self.exchanges.fetch_add(1, Ordering::SeqCst);
        if code != "AC1" || self.reject.load(Ordering::SeqCst) {
            return Err(ProviderError::Rejected {
                operation: "authorization code exchange",
                status: 400,
            });
        }

        Ok(Grant {
            bearer: BearerCredential::new("bearer-AC1"),
            long_lived: LongLivedCredential::new("long-U1"),
        })
    }

    async fn user_info(&self, bearer: &BearerCredential) -> Result<UserProfile, ProviderError> {
        match bearer.expose() {
            "bearer-AC1" => Ok(UserProfile {
                id: "U1".into(),
                name: "Creator".into(),
                email: "creator@example.com".into(),
            }),
            _ => Err(ProviderError::Rejected {
                operation: "userinfo request",
                status: 401,
            }),
        }
    }

    async fn renew(&self, long_lived: &LongLivedCredential) -> Result<Renewal, ProviderError> {
        let call = self.renewals.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.reject.load(Ordering::SeqCst) {
            return Err(ProviderError::Rejected {
                operation: "refresh",
                status: 400,
            });
        }

        Ok(Renewal {
            bearer: BearerCredential::new(format!("bearer-{}-{call}", long_lived.expose())),
            long_lived: self
                .rotate
                .then(|| LongLivedCredential::new(format!("{}-rotated", long_lived.expose()))),
        })
    }
}
