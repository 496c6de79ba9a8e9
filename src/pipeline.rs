//! Invocation pipeline.
//!
//! Turns a method descriptor, a raw payload and a call context into either a
//! result value or a classified error:
//!
//! ```text
//! payload ─► presence ─► decode ─► schema ─► typed argument
//!                                                 │
//! context ─► identity provider ─► context providers (in order)
//!                                                 │
//!                                                 ▼
//!                                  handler ─► result / "no content"
//! ```
//!
//! Every step is a possible exit. Nothing is retried, and the pipeline neither
//! times out nor cancels the handler; cancellation is the caller's business
//! and travels in the context. A panic in a provider or handler is contained
//! here and reported as `unknown`.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, error, warn, Instrument};

use crate::context::CallContext;
use crate::error::{classify, RpcError};
use crate::registry::Method;
use crate::service::providers::{ContextProvider, IdentityProvider};

/// Context augmentation configured on a service.
#[derive(Clone, Copy, Default)]
pub struct Pipeline<'a> {
    identity_provider: Option<&'a dyn IdentityProvider>,
    context_providers: &'a [Arc<dyn ContextProvider>],
}

impl<'a> Pipeline<'a> {
    /// Pipeline applying `context_providers` in slice order.
    pub fn new(context_providers: &'a [Arc<dyn ContextProvider>]) -> Self {
        Self {
            identity_provider: None,
            context_providers,
        }
    }

    pub fn with_identity_provider(mut self, provider: Option<&'a dyn IdentityProvider>) -> Self {
        self.identity_provider = provider;
        self
    }

    /// Run one call.
    ///
    /// Returns `Ok(None)` when the handler produced no value.
    pub async fn invoke(
        &self,
        method: &Method,
        payload: &[u8],
        ctx: CallContext,
    ) -> Result<Option<Value>, RpcError> {
        ctx.record_method(method.name());
        let span = ctx.span().clone();

        async move {
            let outcome = self.run(method, payload, ctx).await;
            if let Err(err) = &outcome {
                warn!(code = %err.code, status = err.status().as_u16(), "call failed");
            }
            outcome
        }
        .instrument(span)
        .await
    }

    async fn run(
        &self,
        method: &Method,
        payload: &[u8],
        ctx: CallContext,
    ) -> Result<Option<Value>, RpcError> {
        let argument = decode_argument(method, payload)?;

        if let Some(schema) = method.schema() {
            if let Some(argument) = &argument {
                schema.validate(argument)?;
            }
        }

        let call = method.bind(argument).map_err(|e| {
            debug!(error = %e, "argument does not fit handler type");
            RpcError::invalid_body().with_message(e.to_string())
        })?;

        let ctx = self.augment(ctx).await?;

        debug!("invoking handler");
        let result = contained("handler", call(ctx)).await?;

        Ok(match result {
            Value::Null => None,
            value => Some(value),
        })
    }

    /// Apply the identity provider, then every context provider in order.
    async fn augment(&self, mut ctx: CallContext) -> Result<CallContext, RpcError> {
        if let (Some(provider), Some(claims)) = (self.identity_provider, ctx.claims().cloned()) {
            ctx = contained("identity provider", provider.resolve(ctx, claims)).await?;
        }

        for provider in self.context_providers {
            debug!(provider = provider.name(), "applying context provider");
            ctx = contained(provider.name(), provider.provide(ctx)).await?;
        }

        Ok(ctx)
    }
}

/// Await application code, classifying its error and turning a panic into
/// `unknown`.
async fn contained<T>(
    stage: &str,
    fut: impl Future<Output = anyhow::Result<T>>,
) -> Result<T, RpcError> {
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(outcome) => outcome.map_err(classify),
        Err(panic) => {
            error!(stage, panic = panic_message(panic.as_ref()), "call panicked");
            Err(RpcError::unknown())
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// Presence check and JSON decode.
///
/// Methods without an argument never look at the payload.
fn decode_argument(method: &Method, payload: &[u8]) -> Result<Option<Value>, RpcError> {
    if !method.expects_argument() {
        if !payload.is_empty() {
            debug!(bytes = payload.len(), "ignoring payload for method without argument");
        }
        return Ok(None);
    }

    if payload.iter().all(u8::is_ascii_whitespace) {
        return Err(RpcError::missing_body());
    }

    serde_json::from_slice(payload)
        .map(Some)
        .map_err(|e| RpcError::invalid_body().with_message(e.to_string()))
}
