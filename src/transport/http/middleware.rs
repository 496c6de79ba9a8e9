//! Middleware for authentication, CORS, request ids and logging

use std::sync::Arc;
use std::time::Instant;

use axum::{
    body::Body,
    extract::{Request, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::{info, warn};

use crate::auth::{bearer_token, Authenticator, Claims};
use crate::error::RpcError;
use crate::transport::Rendered;

/// Header carrying the request id in both directions.
pub const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

/// Largest body buffered by the content-type check.
const MAX_BODY_BYTES: usize = 2 * 1024 * 1024;

/// JSON error body for a failure detected by the HTTP layer itself.
///
/// These statuses have no counterpart in [`ErrorCode`], so the code is sent
/// with the status the HTTP layer chose.
///
/// [`ErrorCode`]: crate::error::ErrorCode
pub fn transport_error(status: StatusCode, code: &str) -> Response {
    Rendered {
        status,
        body: Some(RpcError::new(code).to_body()),
    }
    .into_response()
}

/// Request id assigned to the current request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

/// Reuse the caller's `x-request-id` or generate one, and echo it back.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(&REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    request.extensions_mut().insert(RequestId(request_id.clone()));

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

/// Request logging middleware
pub async fn logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();
    let start = Instant::now();

    let response = next.run(request).await;

    let duration = start.elapsed();
    let status = response.status();

    if status.is_client_error() || status.is_server_error() {
        warn!(request_id = %request_id, "{} {} {} ({:?})", method, uri, status, duration);
    } else {
        info!(request_id = %request_id, "{} {} {} ({:?})", method, uri, status, duration);
    }

    response
}

/// Reject non-empty bodies that are not declared as JSON.
pub async fn json_content_type_middleware(request: Request, next: Next) -> Response {
    if request.method() == Method::OPTIONS || is_json(request.headers()) {
        return next.run(request).await;
    }

    let (parts, body) = request.into_parts();
    let bytes = match axum::body::to_bytes(body, MAX_BODY_BYTES).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("reading request body failed: {}", e);
            return transport_error(StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large");
        }
    };

    if !bytes.is_empty() {
        return transport_error(StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_media_type");
    }

    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Give the bare timeout response a JSON error body.
pub async fn timeout_body_middleware(request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    if response.status() == StatusCode::REQUEST_TIMEOUT
        && !response.headers().contains_key(header::CONTENT_TYPE)
    {
        return transport_error(StatusCode::REQUEST_TIMEOUT, "request_timeout");
    }
    response
}

fn is_json(headers: &HeaderMap) -> bool {
    headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .is_some_and(|mime| mime.trim().eq_ignore_ascii_case("application/json"))
}

/// Permissive CORS headers; preflight requests are answered here.
pub async fn cors_middleware(request: Request, next: Next) -> Response {
    let mut response = if request.method() == Method::OPTIONS {
        StatusCode::NO_CONTENT.into_response()
    } else {
        next.run(request).await
    };

    set_cors_headers(response.headers_mut());
    response
}

fn set_cors_headers(headers: &mut HeaderMap) {
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("DELETE,GET,HEAD,PUT,POST,PATCH,OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("Authorization,Content-Type,Host,Origin,Accept"),
    );
}

#[derive(Clone)]
pub struct AuthState {
    pub authenticator: Arc<dyn Authenticator>,
}

/// Bearer token authentication middleware
///
/// On success the caller's [`Claims`] are stored in the request extensions.
pub async fn auth_middleware(
    State(state): State<AuthState>,
    mut request: Request,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS {
        return next.run(request).await;
    }

    let token = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(bearer_token)
        .map(str::to_owned);

    let Some(token) = token else {
        return RpcError::no_authentication().into_response();
    };

    match state.authenticator.authenticate(&token).await {
        Ok(claims) => {
            let claims = Claims::from_token_claims(&claims);
            request.extensions_mut().insert(Arc::new(claims));
            next.run(request).await
        }
        Err(err) => {
            warn!(code = %err.code, "authentication failed");
            err.into_response()
        }
    }
}
