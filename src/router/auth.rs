//! Authorization flow: consent redirect, callback and logout.

use axum::extract::{Extension, Query, State};
use axum::http::StatusCode;
use axum::response::Redirect;
use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use serde::Deserialize;
use time::Duration;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::AppState;
use crate::credential::UserIdentity;
use crate::error::{AuthError, Result};

const POST_LOGIN_PATH: &str = "/channels";

/// Query sent back by the provider.
#[derive(Debug, Deserialize, Validate)]
pub struct Callback {
    #[validate(length(min = 1, max = 2048))]
    code: Option<String>,
    #[validate(length(max = 256))]
    error: Option<String>,
}

fn missing_code() -> ValidationErrors {
    let mut errors = ValidationErrors::new();
    errors.add(
        "code",
        ValidationError::new("code").with_message("Missing authorization code.".into()),
    );
    errors
}

/// Create session cookie.
fn session_cookie(name: &str, token: String, ttl_seconds: u64, secure: bool) -> Cookie<'static> {
    Cookie::build((name.to_owned(), token))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(Duration::seconds(
            i64::try_from(ttl_seconds).unwrap_or(i64::MAX),
        ))
        .build()
}

/// Create removal cookie for session.
fn clear_session_cookie(name: &str) -> Cookie<'static> {
    Cookie::build((name.to_owned(), ""))
        .path("/")
        .max_age(Duration::ZERO)
        .build()
}

/// Send the user to the provider consent page.
pub async fn login(State(state): State<AppState>) -> Redirect {
    Redirect::to(state.resolver.provider().authorization_url().as_str())
}

/// Establish a session from the authorization code.
pub async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<Callback>,
) -> Result<(CookieJar, Redirect)> {
    query.validate()?;

    if let Some(error) = query.error {
        tracing::info!(%error, "provider denied authorization");
        return Err(AuthError::ExchangeFailed.into());
    }
    let code = query.code.ok_or_else(missing_code)?;

    let session = state
        .resolver
        .establish_session(&code, state.clock.now())
        .await?;

    let cookie = session_cookie(
        &state.config.session.cookie_name,
        session.token,
        state.resolver.codec().ttl(),
        state.config.secure_cookies,
    );

    Ok((
        jar.add(cookie),
        Redirect::to(&state.config.frontend(POST_LOGIN_PATH)),
    ))
}

/// Revoke the durable credential and clear the session cookie.
///
/// Only the session token is required: a lapsed durable credential or an
/// unreachable provider never prevents logging out.
pub async fn logout(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    jar: CookieJar,
) -> Result<(CookieJar, StatusCode)> {
    state.resolver.revoke(&user).await?;

    Ok((
        jar.remove(clear_session_cookie(&state.config.session.cookie_name)),
        StatusCode::NO_CONTENT,
    ))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::Ordering;

    use axum::http::{Method, StatusCode, header};
    use http_body_util::BodyExt;

    use crate::testing::{FakeProvider, MemoryStore};
    use crate::*;

    const NOW: u64 = 1_760_000_000;

    fn set_cookie(response: &axum::http::Response<axum::body::Body>) -> String {
        response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_owned()
    }

    #[tokio::test]
    async fn test_login_redirect() {
        let state = router::state(
            Arc::new(MemoryStore::default()),
            Arc::new(FakeProvider::default()),
            NOW,
        );

        let response = make_request(app(state), Method::GET, "/auth/login", None).await;
        assert!(response.status().is_redirection());

        let location = response.headers()[header::LOCATION].to_str().unwrap();
        let url = url::Url::parse(location).unwrap();
        let query: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(query["access_type"], "offline");
    }

    #[tokio::test]
    async fn test_full_session() {
        let store = Arc::new(MemoryStore::default());
        let provider = Arc::new(FakeProvider::default());
        let state = router::state(Arc::clone(&store), Arc::clone(&provider), NOW);
        let app = app(state);

        let response = make_request(
            app.clone(),
            Method::GET,
            "/auth/callback?code=AC1",
            None,
        )
        .await;
        assert!(response.status().is_redirection());
        assert_eq!(
            response.headers()[header::LOCATION],
            "http://localhost:5173/channels"
        );

        let cookie = set_cookie(&response);
        assert!(cookie.starts_with("session="));
        assert!(cookie.contains("HttpOnly"));
        assert!(cookie.contains("SameSite=Lax"));
        assert!(cookie.contains("Max-Age=86400"));
        let session = cookie.split(';').next().unwrap().to_owned();

        let response = make_request(app.clone(), Method::GET, "/me", Some(&session)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body["id"], "U1");
        assert_eq!(body["email"], "creator@example.com");

        let response =
            make_request(app.clone(), Method::POST, "/auth/logout", Some(&session)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(set_cookie(&response).contains("Max-Age=0"));
        assert!(store.record("U1").unwrap().revoked);

        // Session token still verifies but the durable credential is gone.
        let response = make_request(app, Method::GET, "/me", Some(&session)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(provider.renewals.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_logout_without_usable_credential() {
        let store = Arc::new(MemoryStore::default());
        let provider = Arc::new(FakeProvider::default());
        let state = router::state(Arc::clone(&store), Arc::clone(&provider), NOW);
        let session = state.resolver.establish_session("AC1", NOW).await.unwrap();

        // Cold cache and a provider refusing every renewal.
        state.resolver.invalidate(&session.user);
        provider.reject.store(true, Ordering::SeqCst);

        let response = make_request(
            app(state),
            Method::POST,
            "/auth/logout",
            Some(&format!("session={}", session.token)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(set_cookie(&response).contains("Max-Age=0"));
        assert!(store.record("U1").unwrap().revoked);
        assert_eq!(provider.renewals.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_logout_requires_valid_session() {
        let store = Arc::new(MemoryStore::default());
        let state = router::state(
            Arc::clone(&store),
            Arc::new(FakeProvider::default()),
            NOW,
        );
        let session = state.resolver.establish_session("AC1", NOW).await.unwrap();
        let app = app(state);

        let response = make_request(app.clone(), Method::POST, "/auth/logout", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let forged = format!("session={}x", session.token);
        let response = make_request(app, Method::POST, "/auth/logout", Some(&forged)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(!store.record("U1").unwrap().revoked);
    }

    #[tokio::test]
    async fn test_callback_failures() {
        let store = Arc::new(MemoryStore::default());
        let state = router::state(
            Arc::clone(&store),
            Arc::new(FakeProvider::default()),
            NOW,
        );
        let app = app(state);

        let response = make_request(
            app.clone(),
            Method::GET,
            "/auth/callback?error=access_denied",
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response =
            make_request(app.clone(), Method::GET, "/auth/callback?code=AC9", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(response.headers().get(header::SET_COOKIE).is_none());

        let response = make_request(app.clone(), Method::GET, "/auth/callback", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response =
            make_request(app, Method::GET, "/auth/callback?code=", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert!(store.record("U1").is_none());
    }
}
