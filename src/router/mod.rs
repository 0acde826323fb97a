//! HTTP API.
pub mod auth;
pub mod me;
pub mod status;

/// Build a state backed by in-memory collaborators.
///
/// MUST NEVER be used in production.
#[cfg(test)]
pub fn state(
    store: std::sync::Arc<crate::testing::MemoryStore>,
    provider: std::sync::Arc<crate::testing::FakeProvider>,
    now: u64,
) -> crate::AppState {
    use std::sync::Arc;

    use crate::credential::{CredentialCache, Resolver};
    use crate::token::{DEFAULT_TTL, SessionCodec};

    let resolver = Resolver::new(
        store,
        provider,
        Arc::new(CredentialCache::new()),
        Arc::new(crate::testing::cipher()),
        SessionCodec::new(b"secret", DEFAULT_TTL),
    );

    crate::AppState {
        config: Arc::new(crate::config::Configuration::default()),
        resolver,
        clock: Arc::new(crate::clock::FixedClock::new(now)),
        metrics: None,
    }
}
