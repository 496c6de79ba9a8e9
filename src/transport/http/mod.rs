//! Local HTTP development server.
//!
//! Every registered service is mounted under its own path prefix and each of
//! its methods answers `POST /{path}/{method}` with a JSON body:
//!
//! - `200` and the JSON result,
//! - `204` with no body when the method produced nothing,
//! - the mapped status and a JSON error body otherwise.
//!
//! Paths that match no route answer `method_not_found`. CORS wraps every
//! route and the fallback, so preflights succeed for any path.

pub mod middleware;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::header,
    middleware::{from_fn, from_fn_with_state},
    response::{IntoResponse, Response},
    routing::post,
    Extension, Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

use self::middleware::{AuthState, RequestId};
use super::{Rendered, JSON_CONTENT_TYPE};
use crate::auth::{Authenticator, Claims};
use crate::config::ServerConfig;
use crate::error::RpcError;
use crate::service::Service;

impl IntoResponse for Rendered {
    fn into_response(self) -> Response {
        match self.body {
            Some(body) => (
                self.status,
                [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)],
                body,
            )
                .into_response(),
            None => self.status.into_response(),
        }
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        Rendered::from_error(&self).into_response()
    }
}

#[derive(Clone)]
struct ServiceState {
    service: Arc<Service>,
}

/// HTTP server hosting one or more services.
pub struct DevServer {
    listen_address: String,
    request_timeout: Duration,
    routes: Router,
    mounted: Vec<String>,
}

impl DevServer {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            listen_address: config.listen_address.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
            routes: Router::new(),
            mounted: Vec::new(),
        }
    }

    /// Mount `service` under `/{path}`.
    ///
    /// With an authenticator every non-preflight request must carry an
    /// `Authorization` header; the verified claims reach the call context.
    pub fn add_service(
        mut self,
        path: &str,
        service: Arc<Service>,
        authenticator: Option<Arc<dyn Authenticator>>,
    ) -> Self {
        let prefix = format!("/{}", path.trim_matches('/'));
        info!(
            path = %prefix,
            service = service.name(),
            methods = ?service.names(),
            authenticated = authenticator.is_some(),
            "mounting service"
        );

        let mut routes = Router::new()
            .route("/:method", post(invoke_method))
            .with_state(ServiceState { service });

        if let Some(authenticator) = authenticator {
            routes = routes.layer(from_fn_with_state(
                AuthState { authenticator },
                middleware::auth_middleware,
            ));
        }

        self.routes = if prefix == "/" {
            self.routes.merge(routes)
        } else {
            self.routes.nest(&prefix, routes)
        };
        self.mounted.push(prefix);
        self
    }

    /// The complete application router.
    ///
    /// CORS sits outside every service's authentication, so preflights never
    /// need credentials.
    pub fn router(&self) -> Router {
        self.routes
            .clone()
            .fallback(route_not_found)
            .layer(from_fn(middleware::json_content_type_middleware))
            .layer(TimeoutLayer::new(self.request_timeout))
            .layer(from_fn(middleware::timeout_body_middleware))
            .layer(from_fn(middleware::cors_middleware))
            .layer(from_fn(middleware::logging_middleware))
            .layer(from_fn(middleware::request_id_middleware))
            .layer(TraceLayer::new_for_http())
    }

    /// Serve until interrupted.
    pub async fn listen(self) -> Result<()> {
        let listener = TcpListener::bind(&self.listen_address)
            .await
            .with_context(|| format!("could not listen on {:?}", self.listen_address))?;

        info!("dev server listening on {}", self.listen_address);
        for prefix in &self.mounted {
            info!("service available at http://{}{}/{{method}}", self.listen_address, prefix);
        }

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("dev server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn route_not_found() -> RpcError {
    RpcError::method_not_found()
}

/// Run one method call.
///
/// The call's cancellation token fires when this future is dropped, which
/// happens when the client goes away or the timeout layer gives up.
async fn invoke_method(
    State(state): State<ServiceState>,
    Path(method): Path<String>,
    request_id: Option<Extension<RequestId>>,
    claims: Option<Extension<Arc<Claims>>>,
    body: Bytes,
) -> Response {
    let request_id = request_id
        .map(|Extension(RequestId(id))| id)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let cancellation = CancellationToken::new();
    let _cancel_on_drop = cancellation.clone().drop_guard();

    let mut ctx = state
        .service
        .context(request_id)
        .with_cancellation(cancellation);
    if let Some(Extension(claims)) = claims {
        ctx = ctx.with_claims(claims);
    }

    let outcome = state.service.invoke(&method, &body, ctx).await;
    Rendered::from_outcome(outcome).into_response()
}
