//! Middlewares for routes.

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use axum_extra::extract::CookieJar;

use crate::AppState;
use crate::credential::UserIdentity;
use crate::error::{Result, ServerError};

fn session_token(state: &AppState, jar: &CookieJar) -> Result<String> {
    jar.get(&state.config.session.cookie_name)
        .map(|cookie| cookie.value().to_owned())
        .ok_or(ServerError::Unauthorized)
}

/// Require a valid session cookie.
///
/// On success the request carries a
/// [`Authenticated`](crate::credential::resolver::Authenticated) extension
/// holding the user and a usable bearer credential.
pub async fn authenticate(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let token = session_token(&state, &jar)?;

    let authenticated = state
        .resolver
        .authenticate(&token, state.clock.now())
        .await?;

    req.extensions_mut().insert(authenticated);
    Ok(next.run(req).await)
}

/// Require a verified session token, without resolving a bearer credential.
///
/// On success the request carries the [`UserIdentity`] extension.
pub async fn verify_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response> {
    let token = session_token(&state, &jar)?;
    let user = state
        .resolver
        .codec()
        .verify(&token, state.clock.now())?;

    req.extensions_mut().insert(user);
    Ok(next.run(req).await)
}
