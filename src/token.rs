//! Manage session tokens.
//!
//! A session token is a HS256 JSON web token carried by the client in a
//! cookie. It asserts the user identity and is re-verified, never re-signed,
//! on every request until it expires.

use std::collections::HashSet;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::credential::UserIdentity;
use crate::error::AuthError;

/// Default session lifetime, 24 hours.
pub const DEFAULT_TTL: u64 = 60 * 60 * 24;

/// Pieces of information asserted on a session token.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    /// User identity issued by the identity provider.
    pub sub: String,
    /// Identifies the time at which the token was issued.
    pub iat: u64,
    /// Identifies the expiration time on or after which the token must not
    /// be accepted for processing.
    pub exp: u64,
}

/// Signs and verifies session tokens with a symmetric key.
#[derive(Clone)]
pub struct SessionCodec {
    algorithm: Algorithm,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: u64,
}

impl SessionCodec {
    /// Create a new [`SessionCodec`] from an HMAC secret.
    pub fn new(secret: impl AsRef<[u8]>, ttl: u64) -> Self {
        let secret = secret.as_ref();

        Self {
            algorithm: Algorithm::HS256,
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    /// Lifetime of issued tokens, in seconds.
    pub fn ttl(&self) -> u64 {
        self.ttl
    }

    /// Issue a token for `user` valid from `now` for the configured TTL.
    pub fn issue(&self, user: &UserIdentity, now: u64) -> Result<String, AuthError> {
        let claims = Claims {
            sub: user.to_string(),
            iat: now,
            exp: now.saturating_add(self.ttl),
        };

        Ok(encode(&Header::new(self.algorithm), &claims, &self.encoding_key)?)
    }

    /// Verify `token` and return the asserted user identity.
    ///
    /// The signature is checked before any claim is read. Expiry is checked
    /// against `now` rather than the library clock.
    pub fn verify(&self, token: &str, now: u64) -> Result<UserIdentity, AuthError> {
        let mut validation = Validation::new(self.algorithm);
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims = HashSet::new();

        let claims = decode::<Map<String, Value>>(token, &self.decoding_key, &validation)
            .map_err(|err| {
                tracing::debug!(error = %err, "session token rejected");
                AuthError::InvalidSignature
            })?
            .claims;

        let sub = claims
            .get("sub")
            .and_then(Value::as_str)
            .filter(|sub| !sub.is_empty())
            .ok_or(AuthError::MalformedClaims)?;
        let exp = claims
            .get("exp")
            .and_then(Value::as_u64)
            .ok_or(AuthError::MalformedClaims)?;

        if now >= exp {
            return Err(AuthError::Expired);
        }

        Ok(UserIdentity::new(sub))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &[u8] = b"session-secret";
    const NOW: u64 = 1_760_000_000;

    fn codec() -> SessionCodec {
        SessionCodec::new(SECRET, DEFAULT_TTL)
    }

    fn sign(claims: serde_json::Value) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(SECRET),
        )
        .unwrap()
    }

    #[test]
    fn test_issue_then_verify() {
        let codec = codec();
        let user = UserIdentity::new("U1");

        let token = codec.issue(&user, NOW).unwrap();
        assert_eq!(codec.verify(&token, NOW).unwrap(), user);
        assert_eq!(codec.verify(&token, NOW + DEFAULT_TTL - 1).unwrap(), user);
    }

    #[test]
    fn test_expiry_boundary() {
        let codec = codec();
        let token = codec.issue(&UserIdentity::new("U1"), NOW).unwrap();

        assert!(matches!(
            codec.verify(&token, NOW + DEFAULT_TTL),
            Err(AuthError::Expired)
        ));
        assert!(matches!(
            codec.verify(&token, NOW + DEFAULT_TTL * 2),
            Err(AuthError::Expired)
        ));
    }

    #[test]
    fn test_altered_signature() {
        let codec = codec();
        let token = codec.issue(&UserIdentity::new("U1"), NOW).unwrap();
        let signature_start = token.rfind('.').unwrap() + 1;

        for index in signature_start..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[index] = if bytes[index] == b'A' { b'B' } else { b'A' };
            let altered = String::from_utf8(bytes).unwrap();

            assert!(matches!(
                codec.verify(&altered, NOW),
                Err(AuthError::InvalidSignature)
            ));
        }
    }

    #[test]
    fn test_altered_claims() {
        let codec = codec();
        let token = codec.issue(&UserIdentity::new("U1"), NOW).unwrap();
        let parts: Vec<&str> = token.split('.').collect();

        let forged = sign(serde_json::json!({ "sub": "U2", "iat": NOW, "exp": NOW + 10 }));
        let forged_payload = forged.split('.').nth(1).unwrap();
        let spliced = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);

        assert!(matches!(
            codec.verify(&spliced, NOW),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn test_wrong_key() {
        let token = SessionCodec::new(b"other", DEFAULT_TTL)
            .issue(&UserIdentity::new("U1"), NOW)
            .unwrap();

        assert!(matches!(
            codec().verify(&token, NOW),
            Err(AuthError::InvalidSignature)
        ));
    }

    #[test]
    fn test_garbage() {
        for token in ["", "abc", "a.b.c", "..."] {
            assert!(matches!(
                codec().verify(token, NOW),
                Err(AuthError::InvalidSignature)
            ));
        }
    }

    #[test]
    fn test_malformed_claims() {
        let codec = codec();

        let missing_sub = sign(serde_json::json!({ "iat": NOW, "exp": NOW + 10 }));
        let numeric_sub = sign(serde_json::json!({ "sub": 42, "iat": NOW, "exp": NOW + 10 }));
        let missing_exp = sign(serde_json::json!({ "sub": "U1", "iat": NOW }));

        for token in [missing_sub, numeric_sub, missing_exp] {
            assert!(matches!(
                codec.verify(&token, NOW),
                Err(AuthError::MalformedClaims)
            ));
        }
    }
}
