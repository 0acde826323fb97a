//! Creator Desk keeps creators signed in to their video platform account.
//!
//! A session cookie identifies the user, and every request gets a usable
//! bearer credential for the platform API, renewed from a sealed long-lived
//! credential when needed.

#![forbid(unsafe_code)]

pub mod clock;
pub mod config;
pub mod credential;
pub mod crypto;
pub mod database;
pub mod error;
mod middleware;
pub mod provider;
mod router;
pub mod telemetry;
#[cfg(test)]
mod testing;
pub mod token;

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::http::{HeaderValue, Method, StatusCode, header};
use axum::routing::{get, post};
use axum::{Router, middleware as AxumMiddleware};
use credential::{CredentialCache, Resolver};
use metrics_exporter_prometheus::PrometheusHandle;
use tower::ServiceBuilder;
use tower_http::LatencyUnit;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::sensitive_headers::{
    SetSensitiveRequestHeadersLayer, SetSensitiveResponseHeadersLayer,
};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};

/// MUST NEVER be used in production.
#[cfg(test)]
pub async fn make_request(
    app: Router,
    method: Method,
    path: &str,
    cookie: Option<&str>,
) -> axum::http::Response<axum::body::Body> {
    use axum::extract::Request;
    use tower::util::ServiceExt;

    let mut request = Request::builder().method(method).uri(path);
    if let Some(cookie) = cookie {
        request = request.header(header::COOKIE, cookie);
    }

    app.oneshot(request.body(axum::body::Body::empty()).unwrap())
        .await
        .unwrap()
}

/// State sharing between routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<config::Configuration>,
    pub resolver: Resolver,
    pub clock: Arc<dyn clock::Clock>,
    pub metrics: Option<PrometheusHandle>,
}

/// Origin allowed to send credentialed cross-origin requests.
fn allowed_origin(config: &config::Configuration) -> AllowOrigin {
    let origin = url::Url::parse(&config.frontend_url)
        .ok()
        .and_then(|url| HeaderValue::from_str(&url.origin().ascii_serialization()).ok());

    AllowOrigin::list(origin)
}

/// Create router.
pub fn app(state: AppState) -> Router {
    let middleware = ServiceBuilder::new()
        // Mark credentials sensitive before the request span records headers.
        .layer(SetSensitiveRequestHeadersLayer::new([header::AUTHORIZATION, header::COOKIE]))
        // Add high level tracing/logging to all requests.
        .layer(
            TraceLayer::new_for_http()
                .on_body_chunk(|chunk: &Bytes, latency: Duration, _span: &tracing::Span| {
                    tracing::trace!(size_bytes = chunk.len(), latency = ?latency, "sending body chunk")
                })
                .make_span_with(DefaultMakeSpan::new().include_headers(true).level(tracing::Level::INFO))
                .on_request(DefaultOnRequest::new())
                .on_response(DefaultOnResponse::new().include_headers(true).latency_unit(LatencyUnit::Micros)),
        )
        // Set a timeout.
        .layer(TimeoutLayer::with_status_code(StatusCode::REQUEST_TIMEOUT, Duration::from_secs(30)))
        // Remove senstive response headers from trace.
        .layer(SetSensitiveResponseHeadersLayer::new([header::SET_COOKIE]))
        // Add CORS preflight support.
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origin(&state.config))
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::CONTENT_TYPE])
                .allow_credentials(true),
        );

    let authenticated = Router::new()
        // `GET /me` goes to `me`.
        .route("/me", get(router::me::handler))
        .route_layer(AxumMiddleware::from_fn_with_state(
            state.clone(),
            middleware::authenticate,
        ));

    let session = Router::new()
        // `POST /auth/logout` goes to `logout`.
        .route("/auth/logout", post(router::auth::logout))
        .route_layer(AxumMiddleware::from_fn_with_state(
            state.clone(),
            middleware::verify_session,
        ));

    Router::new()
        // `GET /status.json` goes to `status`.
        .route("/status.json", get(router::status::status))
        .route("/metrics", get(router::status::metrics))
        .route("/auth/login", get(router::auth::login))
        .route("/auth/callback", get(router::auth::callback))
        .merge(authenticated)
        .merge(session)
        .with_state(state)
        .route_layer(AxumMiddleware::from_fn(telemetry::track))
        .layer(middleware)
}

/// Initialize the application state.
///
/// Fails before serving any traffic if a secret is missing or unusable.
pub async fn initialize_state(
    metrics: Option<PrometheusHandle>,
) -> Result<AppState, Box<dyn std::error::Error>> {
    let secrets = config::Secrets::from_env()?;

    // read configuration file. let it in memory.
    let config = config::Configuration::default()
        .path(std::env::var("CONFIG_PATH").unwrap_or_default().into())
        .read()?;

    let Some(postgres) = &config.postgres else {
        return Err("missing `postgres` entry on `config.yaml` file".into());
    };
    let db = database::Database::from_config(postgres).await?;

    // execute migrations scripts on start.
    db.migrate().await?;

    let provider = provider::OAuthClient::new(&config.provider, secrets.client_secret)?;
    let codec = token::SessionCodec::new(
        secrets.session_secret.as_slice(),
        config.session.ttl_seconds,
    );

    let resolver = Resolver::new(
        Arc::new(database::PgCredentialStore::from(&db)),
        Arc::new(provider),
        Arc::new(CredentialCache::new()),
        Arc::new(crypto::SymmetricCipher::new(secrets.encryption_key)),
        codec,
    )
    .with_timeouts(config.store_timeout(), config.provider.timeout());

    Ok(AppState {
        config,
        resolver,
        clock: Arc::new(clock::SystemClock),
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use crate::testing::{FakeProvider, MemoryStore};
    use crate::*;

    const NOW: u64 = 1_760_000_000;

    /// Log sink shared between the subscriber and the test.
    #[derive(Clone, Default)]
    struct Logs(Arc<Mutex<Vec<u8>>>);

    impl Write for Logs {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Logs {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[tokio::test]
    async fn test_session_token_never_logged() {
        let logs = Logs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let store = Arc::new(MemoryStore::default());
        let app = app(router::state(
            Arc::clone(&store),
            Arc::new(FakeProvider::default()),
            NOW,
        ));

        // Issues the token through `Set-Cookie`.
        let response =
            make_request(app.clone(), Method::GET, "/auth/callback?code=AC1", None).await;
        let cookie = response.headers()[header::SET_COOKIE]
            .to_str()
            .unwrap()
            .to_owned();
        let session = cookie.split(';').next().unwrap().to_owned();
        let token = session.trim_start_matches("session=").to_owned();

        let response = make_request(app.clone(), Method::GET, "/me", Some(&session)).await;
        assert_eq!(response.status(), StatusCode::OK);

        let response =
            make_request(app.clone(), Method::POST, "/auth/logout", Some(&session)).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(store.record("U1").unwrap().revoked);

        // Revoked record: resolution logs inside the request span.
        let response = make_request(app, Method::GET, "/me", Some(&session)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let logs = logs.contents();
        assert!(logs.contains("uri=/me"));
        assert!(logs.contains("no live durable credential"));
        assert!(!logs.contains(&token));
        assert!(!logs.contains(token.split('.').nth(2).unwrap()));
    }
}
