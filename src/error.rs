//! Error handler for creator-desk.

use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;
use validator::ValidationErrors;

use crate::credential::store::StoreError;

pub type Result<T> = std::result::Result<T, ServerError>;

/// Why a session could not be authenticated or a bearer credential could
/// not be produced.
///
/// Storage, signing and encryption failures are server errors. Every other
/// variant is answered with "re-authorize". Details stay in the logs.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("session token signature does not verify")]
    InvalidSignature,
    #[error("session token is expired")]
    Expired,
    #[error("session token claims are malformed")]
    MalformedClaims,

    #[error("no live durable credential for user")]
    NoDurableCredential,
    #[error("durable credential cannot be decrypted")]
    CorruptDurableCredential,
    #[error("bearer credential renewal failed")]
    RenewalFailed,
    #[error("authorization code exchange failed")]
    ExchangeFailed,

    #[error("failed to persist credential: {0}")]
    Storage(#[from] StoreError),
    #[error("failed to sign session token: {0}")]
    Signing(#[from] jsonwebtoken::errors::Error),
    #[error("failed to seal durable credential: {0}")]
    Encryption(#[from] crate::crypto::CryptoError),
}

impl AuthError {
    /// Whether the error points to a key-management or storage-integrity
    /// incident rather than a routine session lapse.
    pub fn is_security_incident(&self) -> bool {
        matches!(self, AuthError::CorruptDurableCredential)
    }

    /// Whether the client is expected to restart the authorization flow.
    pub fn requires_reauthorization(&self) -> bool {
        !matches!(
            self,
            AuthError::Storage(_) | AuthError::Signing(_) | AuthError::Encryption(_)
        )
    }
}

/// Enum representing server-side errors.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("validation error occurred")]
    Validation(#[from] ValidationErrors),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("storage request failed: {0}")]
    Store(#[from] StoreError),

    #[error("missing or invalid session")]
    Unauthorized,
}

/// Structure for detailed error responses.
#[derive(Debug, Serialize)]
pub struct ResponseError {
    r#type: Option<String>,
    title: String,
    status: u16,
    detail: String,
    instance: Option<String>,
    errors: Option<Vec<FieldError>>,
}

impl ResponseError {
    /// Update error status code.
    pub fn status(mut self, code: StatusCode) -> Self {
        self.status = code.as_u16();
        self
    }

    /// Update `title` field.
    pub fn title(mut self, title: &str) -> Self {
        self.title = title.into();
        self
    }

    /// Add detailed error.
    pub fn details(mut self, description: &str) -> Self {
        self.detail = description.into();
        self
    }

    /// Automatically add errors field.
    pub fn errors(mut self, errors: &ValidationErrors) -> Self {
        self.errors = Some(parse_validation_errors(errors));
        self
    }

    /// Transform [`ResponseError`] into axum [`Response`].
    pub fn into_response(self) -> std::result::Result<Response, axum::http::Error> {
        if let Ok(body) = serde_json::to_string(&self) {
            Response::builder()
                .status(self.status)
                .header(header::CONTENT_TYPE, "application/json")
                .body(body.into())
        } else {
            Ok(internal_server_error())
        }
    }
}

impl Default for ResponseError {
    fn default() -> Self {
        Self {
            r#type: None,
            title: "Internal server error.".to_owned(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
            detail: String::default(),
            instance: None,
            errors: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct FieldError {
    field: String,
    message: String,
}

fn parse_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, issues)| {
            issues.iter().map(move |issue| FieldError {
                field: field.to_string(),
                message: issue
                    .message
                    .as_ref()
                    .map(|message| message.to_string())
                    .unwrap_or_else(|| issue.code.to_string()),
            })
        })
        .collect()
}

fn reauthorize() -> ResponseError {
    ResponseError::default()
        .title("Not authenticated.")
        .details("Session is missing or lapsed, restart the authorization flow.")
        .status(StatusCode::UNAUTHORIZED)
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let response = match &self {
            ServerError::Validation(validation_errors) => ResponseError::default()
                .title("There were validation errors with your request.")
                .status(StatusCode::BAD_REQUEST)
                .errors(validation_errors),

            ServerError::Unauthorized => reauthorize(),

            ServerError::Auth(err) if err.requires_reauthorization() => {
                if err.is_security_incident() {
                    tracing::error!(target: "security", error = %err, "request rejected");
                } else {
                    tracing::debug!(error = %err, "request rejected");
                }

                reauthorize()
            },

            ServerError::Auth(err) => {
                tracing::error!(error = %err, "server returned 500 status");
                ResponseError::default()
            },

            ServerError::Store(err) => {
                tracing::error!(error = %err, "server returned 500 status");
                ResponseError::default()
            },
        };

        response
            .into_response()
            .unwrap_or_else(|_| internal_server_error())
    }
}

fn internal_server_error() -> Response {
    Response::builder()
        .status(StatusCode::INTERNAL_SERVER_ERROR)
        .header(header::CONTENT_TYPE, "application/json")
        .body(
            serde_json::json!({
                "type": null,
                "title": "Internal server error.",
                "status": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "detail": null,
                "instance": null,
                "errors": null,
            })
            .to_string()
            .into(),
        )
        .unwrap_or_else(|_| Response::new("Internal server error".into()))
}
