//! Per-call context.
//!
//! A [`CallContext`] is created by the transport for every inbound call and
//! threaded by value through the pipeline. It carries the request logger, the
//! caller's claims, data injected by context providers and the caller's
//! cancellation token.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::Span;

use crate::auth::Claims;

/// Request-scoped state handed to providers and handlers.
#[derive(Clone)]
pub struct CallContext {
    request_id: String,
    span: Span,
    claims: Option<Arc<Claims>>,
    extensions: Extensions,
    cancellation: CancellationToken,
}

impl CallContext {
    /// Create a context whose logger is `span`.
    ///
    /// The span should declare empty `method` and `subject` fields so they can
    /// be recorded later; [`Service::context`](crate::service::Service::context)
    /// builds one that does.
    pub fn new(request_id: impl Into<String>, span: Span) -> Self {
        Self {
            request_id: request_id.into(),
            span,
            claims: None,
            extensions: Extensions::default(),
            cancellation: CancellationToken::new(),
        }
    }

    /// Context with a disabled logger, for in-process calls and tests.
    pub fn detached(request_id: impl Into<String>) -> Self {
        Self::new(request_id, Span::none())
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Logger bound to this call.
    pub fn span(&self) -> &Span {
        &self.span
    }

    pub fn claims(&self) -> Option<&Arc<Claims>> {
        self.claims.as_ref()
    }

    /// Attach the caller's identity and record its subject on the logger.
    pub fn with_claims(mut self, claims: impl Into<Arc<Claims>>) -> Self {
        let claims = claims.into();
        self.span.record("subject", claims.subject());
        self.claims = Some(claims);
        self
    }

    /// Replace the cancellation token with one owned by the caller.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// True once the caller gave up on this call.
    ///
    /// Advisory only: nothing in the pipeline aborts on it.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Store a value, replacing any previous value of the same type.
    pub fn with<T: Send + Sync + 'static>(mut self, value: T) -> Self {
        self.extensions.insert(value);
        self
    }

    pub fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }

    pub(crate) fn record_method(&self, method: &str) {
        self.span.record("method", method);
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("request_id", &self.request_id)
            .field("claims", &self.claims)
            .field("extensions", &self.extensions.len())
            .field("cancelled", &self.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Type-keyed map of provider data.
///
/// Values are shared behind `Arc`, so cloning a context never clones them.
#[derive(Clone, Default)]
struct Extensions {
    map: HashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

impl Extensions {
    fn insert<T: Send + Sync + 'static>(&mut self, value: T) {
        self.map.insert(TypeId::of::<T>(), Arc::new(value));
    }

    fn get<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.map
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref::<T>())
    }

    fn len(&self) -> usize {
        self.map.len()
    }
}
