//! OAuth identity provider client.
//!
//! Exchanges authorization codes and long-lived credentials for bearer
//! credentials against an OAuth 2.0 token endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;
use zeroize::Zeroizing;

use crate::config::Provider as ProviderConfig;
use crate::credential::{BearerCredential, LongLivedCredential, UserProfile};

/// Errors raised while talking to the identity provider.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{operation} rejected with status {status}")]
    Rejected { operation: &'static str, status: u16 },
    #[error("provider granted no long-lived credential")]
    MissingLongLivedCredential,
    #[error("provider call timed out")]
    Timeout,
    #[error("invalid provider URL: {0}")]
    Url(#[from] url::ParseError),
}

/// Result of the first-time authorization code exchange.
#[derive(Debug, Clone)]
pub struct Grant {
    pub bearer: BearerCredential,
    pub long_lived: LongLivedCredential,
}

/// Result of a renewal. `long_lived` is set when the provider rotated it.
#[derive(Debug, Clone)]
pub struct Renewal {
    pub bearer: BearerCredential,
    pub long_lived: Option<LongLivedCredential>,
}

/// Identity provider operations consumed by the resolver.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Consent page the user is sent to, requesting offline access.
    fn authorization_url(&self) -> Url;

    /// Exchange an authorization code for a bearer and a long-lived credential.
    async fn exchange_authorization_code(&self, code: &str) -> Result<Grant, ProviderError>;

    /// Fetch the profile of the user owning `bearer`.
    async fn user_info(&self, bearer: &BearerCredential) -> Result<UserProfile, ProviderError>;

    /// Exchange a long-lived credential for a new bearer credential.
    async fn renew(&self, long_lived: &LongLivedCredential) -> Result<Renewal, ProviderError>;
}

/// Token response from the token endpoint.
#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
}

/// User info from the userinfo endpoint.
#[derive(Deserialize)]
struct UserInfo {
    sub: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    email: Option<String>,
}

/// OAuth 2.0 client for the configured provider.
#[derive(Clone)]
pub struct OAuthClient {
    client_id: String,
    client_secret: Zeroizing<String>,
    redirect_uri: String,
    scopes: String,
    authorization_url: Url,
    token_url: Url,
    userinfo_url: Url,
    http: reqwest::Client,
}

impl OAuthClient {
    /// Create a new [`OAuthClient`]. Every request is bounded by
    /// `config.timeout_ms`.
    pub fn new(
        config: &ProviderConfig,
        client_secret: Option<Zeroizing<String>>,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder().timeout(config.timeout()).build()?;

        Ok(Self {
            client_id: config.client_id.clone(),
            client_secret: client_secret
                .unwrap_or_else(|| Zeroizing::new(config.client_secret.clone())),
            redirect_uri: config.redirect_uri.clone(),
            scopes: config.scopes.join(" "),
            authorization_url: Url::parse(&config.authorization_url)?,
            token_url: Url::parse(&config.token_url)?,
            userinfo_url: Url::parse(&config.userinfo_url)?,
            http,
        })
    }

    async fn token_request(
        &self,
        operation: &'static str,
        params: &[(&str, &str)],
    ) -> Result<TokenResponse, ProviderError> {
        let response = self
            .http
            .post(self.token_url.clone())
            .form(params)
            .send()
            .await
            .map_err(Self::transport)?;

        let response = Self::ensure_success(response, operation).await?;
        Ok(response.json::<TokenResponse>().await?)
    }

    fn transport(err: reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            ProviderError::Timeout
        } else {
            ProviderError::Http(err)
        }
    }

    /// Checks HTTP response status. Body is only logged at debug level.
    async fn ensure_success(
        response: reqwest::Response,
        operation: &'static str,
    ) -> Result<reqwest::Response, ProviderError> {
        if response.status().is_success() {
            return Ok(response);
        }

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(operation, status, %body, "identity provider rejected request");

        Err(ProviderError::Rejected { operation, status })
    }
}

#[async_trait]
impl IdentityProvider for OAuthClient {
    fn authorization_url(&self) -> Url {
        let mut url = self.authorization_url.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", self.client_id.as_str())
            .append_pair("redirect_uri", &self.redirect_uri)
            .append_pair("scope", &self.scopes)
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("include_granted_scopes", "true");
        url
    }

    async fn exchange_authorization_code(&self, code: &str) -> Result<Grant, ProviderError> {
        let response = self
            .token_request(
                "authorization code exchange",
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code),
                    ("client_id", self.client_id.as_str()),
                    ("client_secret", self.client_secret.as_str()),
                    ("redirect_uri", self.redirect_uri.as_str()),
                ],
            )
            .await?;

        let long_lived = response
            .refresh_token
            .filter(|token| !token.is_empty())
            .map(LongLivedCredential::new)
            .ok_or(ProviderError::MissingLongLivedCredential)?;

        Ok(Grant {
            bearer: BearerCredential::new(response.access_token),
            long_lived,
        })
    }

    async fn user_info(&self, bearer: &BearerCredential) -> Result<UserProfile, ProviderError> {
        let response = self
            .http
            .get(self.userinfo_url.clone())
            .bearer_auth(bearer.expose())
            .send()
            .await
            .map_err(Self::transport)?;

        let info = Self::ensure_success(response, "userinfo request")
            .await?
            .json::<UserInfo>()
            .await?;

        Ok(UserProfile {
            id: info.sub,
            name: info.name.unwrap_or_default(),
            email: info.email.unwrap_or_default(),
        })
    }

    async fn renew(&self, long_lived: &LongLivedCredential) -> Result<Renewal, ProviderError> {
        let response = self
            .token_request(
                "refresh",
                &[
                    ("grant_type", "refresh_token"),
                    ("refresh_token", long_lived.expose()),
                    ("client_id", self.client_id.as_str()),
                    ("client_secret", self.client_secret.as_str()),
                ],
            )
            .await?;

        Ok(Renewal {
            bearer: BearerCredential::new(response.access_token),
            long_lived: response
                .refresh_token
                .filter(|token| !token.is_empty() && token != long_lived.expose())
                .map(LongLivedCredential::new),
        })
    }
}
