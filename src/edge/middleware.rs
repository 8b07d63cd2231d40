//! Admission middleware for axum routers.

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::{HOST, RETRY_AFTER};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use super::client::client_key;
use super::exempt::ExemptPaths;
use super::headers::SecurityHeaders;
use crate::ratelimit::{AdmissionController, AdmissionDecision, Timestamp};

/// Message returned in the body of a rejected request.
pub const REJECTION_MESSAGE: &str = "Too many requests. Please try again later.";

pub const X_RATELIMIT_LIMIT: HeaderName = HeaderName::from_static("x-ratelimit-limit");
pub const X_RATELIMIT_REMAINING: HeaderName = HeaderName::from_static("x-ratelimit-remaining");
pub const X_RATELIMIT_RESET: HeaderName = HeaderName::from_static("x-ratelimit-reset");

const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Shared state for [`admission_middleware`].
#[derive(Clone)]
pub struct EdgeState {
    /// The admission controller every request is evaluated against
    pub controller: Arc<AdmissionController>,
    /// Headers added to every response
    pub security_headers: Arc<SecurityHeaders>,
    /// Honour `X-Forwarded-For` / `X-Real-IP`
    pub trust_forwarded_headers: bool,
    /// Redirect requests forwarded over plain HTTP
    pub enforce_https: bool,
    /// Paths passed straight to the inner service
    pub exempt_paths: Arc<ExemptPaths>,
}

impl EdgeState {
    /// Create edge state with forwarded headers trusted, HTTPS not enforced
    /// and the default static asset exemptions.
    pub fn new(controller: Arc<AdmissionController>, security_headers: SecurityHeaders) -> Self {
        Self {
            controller,
            security_headers: Arc::new(security_headers),
            trust_forwarded_headers: true,
            enforce_https: false,
            exempt_paths: Arc::new(ExemptPaths::default()),
        }
    }
}

/// Gate a request through the admission controller.
///
/// Rejected requests get a `429` without reaching the inner service. Every
/// gated response, including rejections and redirects, carries the quota and
/// security headers. Exempt paths are passed through untouched.
#[instrument(skip_all, fields(path = %request.uri().path()))]
pub async fn admission_middleware(
    State(state): State<EdgeState>,
    request: Request,
    next: Next,
) -> Response {
    if state.exempt_paths.is_exempt(request.uri().path()) {
        return next.run(request).await;
    }

    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let client = client_key(request.headers(), peer, state.trust_forwarded_headers);
    let decision = state
        .controller
        .evaluate(&client, request.uri().path(), Timestamp::now());

    let mut response = if !decision.allowed {
        info!(
            client = %client,
            policy = %decision.policy,
            retry_after = decision.retry_after_secs,
            "Request rejected by rate limit"
        );
        rejection_response(&decision)
    } else if let Some(redirect) = https_redirect(&state, &request) {
        debug!(client = %client, "Redirecting plain HTTP request");
        redirect
    } else {
        next.run(request).await
    };

    apply_quota_headers(response.headers_mut(), &decision);
    state.security_headers.apply(response.headers_mut());
    response
}

/// Build the `429 Too Many Requests` response for a denied decision.
pub fn rejection_response(decision: &AdmissionDecision) -> Response {
    let body = Json(serde_json::json!({
        "error": REJECTION_MESSAGE,
        "retryAfter": decision.retry_after_secs,
    }));

    let mut response = (StatusCode::TOO_MANY_REQUESTS, body).into_response();
    response
        .headers_mut()
        .insert(RETRY_AFTER, HeaderValue::from(decision.retry_after_secs));
    response
}

/// Attach `X-RateLimit-*` headers describing the decision.
pub fn apply_quota_headers(headers: &mut HeaderMap, decision: &AdmissionDecision) {
    headers.insert(X_RATELIMIT_LIMIT, HeaderValue::from(decision.limit));
    headers.insert(X_RATELIMIT_REMAINING, HeaderValue::from(decision.remaining));
    if let Ok(reset) = HeaderValue::from_str(&decision.reset_at.to_rfc3339()) {
        headers.insert(X_RATELIMIT_RESET, reset);
    }
}

// X-Forwarded-Proto is only meaningful behind a trusted proxy.
fn https_redirect(state: &EdgeState, request: &Request) -> Option<Response> {
    if !state.enforce_https || !state.trust_forwarded_headers {
        return None;
    }

    let headers = request.headers();
    let proto = headers.get(X_FORWARDED_PROTO)?.to_str().ok()?;
    if !proto.trim().eq_ignore_ascii_case("http") {
        return None;
    }

    let host = headers.get(HOST)?.to_str().ok()?;
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let location = format!("https://{}{}", host, path_and_query);
    Some(Redirect::permanent(&location).into_response())
}
