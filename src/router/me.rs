//! Profile of the authenticated user.

use axum::Json;
use axum::extract::{Extension, State};

use crate::AppState;
use crate::credential::UserProfile;
use crate::credential::resolver::Authenticated;
use crate::error::{Result, ServerError};

/// Handle `GET /me`.
pub async fn handler(
    State(state): State<AppState>,
    Extension(auth): Extension<Authenticated>,
) -> Result<Json<UserProfile>> {
    let profile = state
        .resolver
        .find_user(&auth.user)
        .await?
        .ok_or(ServerError::Unauthorized)?;

    Ok(Json(profile))
}
