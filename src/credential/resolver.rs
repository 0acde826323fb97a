//! Bearer credential resolution.
//!
//! Resolution walks a small state machine, one transition at a time:
//!
//! ```text
//! CacheProbe ──hit──────────────────────────────────────▶ Resolved
//!     │ miss
//!     ▼
//! FetchDurable ──missing/revoked──▶ Failed(NoDurableCredential)
//!     │         ──undecryptable───▶ Failed(CorruptDurableCredential)
//!     ▼
//! Exchange ──rejected/timeout─────▶ Failed(RenewalFailed)
//!     │
//!     ▼
//! Refill ───────────────────────────────────────────────▶ Resolved
//! ```
//!
//! States only move forward, so one invocation performs at most one
//! provider exchange. Concurrent misses for the same user may both renew;
//! the last cache write wins.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::timeout;

use super::{
    BearerCredential, CredentialCache, CredentialStore, LongLivedCredential, StoreError,
    UserIdentity, UserProfile,
};
use crate::crypto::SymmetricCipher;
use crate::error::AuthError;
use crate::provider::{IdentityProvider, ProviderError, Renewal};
use crate::telemetry::{SESSIONS_ESTABLISHED_TOTAL, record_resolution};
use crate::token::SessionCodec;

const DEFAULT_STORE_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);

/// Terminal failure of a resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    /// No record, or a revoked one.
    NoDurableCredential,
    /// Record does not decrypt. Key loss or tampering.
    CorruptDurableCredential,
    /// Provider rejected the exchange, or a call timed out.
    RenewalFailed,
}

impl Failure {
    fn outcome(&self) -> &'static str {
        match self {
            Failure::NoDurableCredential => "no_durable_credential",
            Failure::CorruptDurableCredential => "corrupt_durable_credential",
            Failure::RenewalFailed => "renewal_failed",
        }
    }
}

impl From<Failure> for AuthError {
    fn from(failure: Failure) -> Self {
        match failure {
            Failure::NoDurableCredential => AuthError::NoDurableCredential,
            Failure::CorruptDurableCredential => AuthError::CorruptDurableCredential,
            Failure::RenewalFailed => AuthError::RenewalFailed,
        }
    }
}

/// Outcome of [`Resolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(BearerCredential),
    Failed(Failure),
}

impl Resolution {
    pub fn into_result(self) -> Result<BearerCredential, AuthError> {
        match self {
            Resolution::Resolved(credential) => Ok(credential),
            Resolution::Failed(failure) => Err(failure.into()),
        }
    }
}

enum State {
    CacheProbe,
    FetchDurable,
    Exchange(LongLivedCredential),
    Refill(Renewal),
}

/// A freshly established session.
#[derive(Debug, Clone)]
pub struct Session {
    /// Signed token to hand to the client.
    pub token: String,
    pub user: UserIdentity,
}

/// Verified user with a usable bearer credential.
#[derive(Debug, Clone)]
pub struct Authenticated {
    pub user: UserIdentity,
    pub bearer: BearerCredential,
}

/// Ties the session codec, the cache, the durable store and the identity
/// provider together.
#[derive(Clone)]
pub struct Resolver {
    store: Arc<dyn CredentialStore>,
    provider: Arc<dyn IdentityProvider>,
    cache: Arc<CredentialCache>,
    cipher: Arc<SymmetricCipher>,
    codec: SessionCodec,
    store_timeout: Duration,
    provider_timeout: Duration,
}

impl Resolver {
    /// Create a new [`Resolver`].
    pub fn new(
        store: Arc<dyn CredentialStore>,
        provider: Arc<dyn IdentityProvider>,
        cache: Arc<CredentialCache>,
        cipher: Arc<SymmetricCipher>,
        codec: SessionCodec,
    ) -> Self {
        Self {
            store,
            provider,
            cache,
            cipher,
            codec,
            store_timeout: DEFAULT_STORE_TIMEOUT,
            provider_timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }

    /// Update the bounds on store and provider calls.
    pub fn with_timeouts(mut self, store: Duration, provider: Duration) -> Self {
        self.store_timeout = store;
        self.provider_timeout = provider;
        self
    }

    pub fn codec(&self) -> &SessionCodec {
        &self.codec
    }

    pub fn provider(&self) -> &dyn IdentityProvider {
        self.provider.as_ref()
    }

    /// Stored profile of `user`, bounded by the store timeout.
    pub async fn find_user(&self, user: &UserIdentity) -> Result<Option<UserProfile>, StoreError> {
        self.store_call(self.store.find_user(user)).await
    }

    async fn store_call<T>(
        &self,
        call: impl Future<Output = Result<T, StoreError>>,
    ) -> Result<T, StoreError> {
        timeout(self.store_timeout, call)
            .await
            .unwrap_or(Err(StoreError::Timeout))
    }

    async fn provider_call<T>(
        &self,
        call: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        timeout(self.provider_timeout, call)
            .await
            .unwrap_or(Err(ProviderError::Timeout))
    }

    /// Produce a usable bearer credential for `user`.
    pub async fn resolve(&self, user: &UserIdentity) -> Resolution {
        let mut state = State::CacheProbe;

        loop {
            state = match state {
                State::CacheProbe => match self.cache.get(user) {
                    Some(credential) => {
                        record_resolution("cache_hit");
                        return Resolution::Resolved(credential);
                    },
                    None => State::FetchDurable,
                },
                State::FetchDurable => match self.fetch_durable(user).await {
                    Ok(long_lived) => State::Exchange(long_lived),
                    Err(failure) => return self.fail(failure),
                },
                State::Exchange(long_lived) => {
                    match self.provider_call(self.provider.renew(&long_lived)).await {
                        Ok(renewal) => State::Refill(renewal),
                        Err(err) => {
                            tracing::warn!(user_id = %user, error = %err, "bearer credential renewal failed");
                            return self.fail(Failure::RenewalFailed);
                        },
                    }
                },
                State::Refill(renewal) => {
                    let credential = self.refill(user, renewal).await;
                    record_resolution("renewed");
                    return Resolution::Resolved(credential);
                },
            };
        }
    }

    fn fail(&self, failure: Failure) -> Resolution {
        record_resolution(failure.outcome());
        Resolution::Failed(failure)
    }

    async fn fetch_durable(&self, user: &UserIdentity) -> Result<LongLivedCredential, Failure> {
        let record = self
            .store_call(self.store.get_encrypted_credential(user))
            .await
            .map_err(|err| {
                tracing::warn!(user_id = %user, error = %err, "durable credential lookup failed");
                Failure::RenewalFailed
            })?;

        let Some(record) = record.filter(|record| !record.revoked) else {
            tracing::info!(user_id = %user, "no live durable credential");
            return Err(Failure::NoDurableCredential);
        };

        self.cipher
            .open_from_hex(&record.ciphertext)
            .map(LongLivedCredential::from)
            .map_err(|err| {
                tracing::error!(
                    target: "security",
                    user_id = %user,
                    created_at = %record.created_at,
                    error = %err,
                    "durable credential failed to decrypt"
                );
                Failure::CorruptDurableCredential
            })
    }

    async fn refill(&self, user: &UserIdentity, renewal: Renewal) -> BearerCredential {
        self.cache.put(user.clone(), renewal.bearer.clone());

        if let Some(rotated) = renewal.long_lived {
            if let Err(err) = self.persist(user, &rotated).await {
                tracing::warn!(user_id = %user, error = %err, "rotated durable credential not persisted");
            }
        }

        renewal.bearer
    }

    async fn persist(
        &self,
        user: &UserIdentity,
        long_lived: &LongLivedCredential,
    ) -> Result<(), AuthError> {
        let ciphertext = self.cipher.seal_to_hex(long_lived.expose())?;
        self.store_call(self.store.put_encrypted_credential(user, &ciphertext))
            .await?;
        Ok(())
    }

    /// Verify `token` then resolve a bearer credential for its subject.
    pub async fn authenticate(&self, token: &str, now: u64) -> Result<Authenticated, AuthError> {
        let user = self.codec.verify(token, now)?;
        let bearer = self.resolve(&user).await.into_result()?;

        Ok(Authenticated { user, bearer })
    }

    /// Verify `token` then resolve a bearer credential for its subject.
    pub async fn resolve_bearer_credential(
        &self,
        token: &str,
        now: u64,
    ) -> Result<BearerCredential, AuthError> {
        Ok(self.authenticate(token, now).await?.bearer)
    }

    /// First-time authorization: exchange `code`, persist the sealed
    /// long-lived credential, issue a session token and fill the cache.
    pub async fn establish_session(&self, code: &str, now: u64) -> Result<Session, AuthError> {
        let grant = self
            .provider_call(self.provider.exchange_authorization_code(code))
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, "authorization code exchange failed");
                AuthError::ExchangeFailed
            })?;

        let profile = self
            .provider_call(self.provider.user_info(&grant.bearer))
            .await
            .map_err(|err| {
                tracing::warn!(error = %err, "user info request failed");
                AuthError::ExchangeFailed
            })?;
        let user = UserIdentity::new(profile.id.clone());

        self.store_call(self.store.save_user(&profile)).await?;
        self.persist(&user, &grant.long_lived).await?;

        let token = self.codec.issue(&user, now)?;
        self.cache.put(user.clone(), grant.bearer);

        metrics::counter!(SESSIONS_ESTABLISHED_TOTAL).increment(1);
        tracing::info!(user_id = %user, "session established");

        Ok(Session { token, user })
    }

    /// Drop the cached bearer credential of `user`, forcing a renewal on the
    /// next resolution. Used after a downstream call rejected it.
    pub fn invalidate(&self, user: &UserIdentity) {
        self.cache.invalidate(user);
    }

    /// Revoke the durable credential of `user` and forget its bearer
    /// credential.
    pub async fn revoke(&self, user: &UserIdentity) -> Result<(), AuthError> {
        self.cache.invalidate(user);
        self.store_call(self.store.revoke(user)).await?;
        tracing::info!(user_id = %user, "durable credential revoked");
        Ok(())
    }
}
