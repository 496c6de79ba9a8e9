//! Context augmentation hooks.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::auth::Claims;
use crate::context::CallContext;

/// Augments the call context before the handler runs.
///
/// Providers run in registration order, each receiving the context produced
/// by the previous one. Returning an error aborts the call.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn provide(&self, ctx: CallContext) -> anyhow::Result<CallContext>;

    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Application hook that accepts or rejects the caller's identity.
///
/// Runs once per call that carries claims, before any [`ContextProvider`].
/// Rejections should use `forbidden`.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn resolve(&self, ctx: CallContext, claims: Arc<Claims>) -> anyhow::Result<CallContext>;
}

/// [`ContextProvider`] backed by an async closure.
pub struct FnContextProvider<F> {
    name: String,
    f: F,
}

/// Wrap an async closure as a [`ContextProvider`].
pub fn provider_fn<F, Fut>(name: impl Into<String>, f: F) -> FnContextProvider<F>
where
    F: Fn(CallContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<CallContext>> + Send,
{
    FnContextProvider {
        name: name.into(),
        f,
    }
}

#[async_trait]
impl<F, Fut> ContextProvider for FnContextProvider<F>
where
    F: Fn(CallContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<CallContext>> + Send,
{
    async fn provide(&self, ctx: CallContext) -> anyhow::Result<CallContext> {
        (self.f)(ctx).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// [`IdentityProvider`] backed by an async closure.
pub struct FnIdentityProvider<F> {
    f: F,
}

/// Wrap an async closure as an [`IdentityProvider`].
pub fn identity_fn<F, Fut>(f: F) -> FnIdentityProvider<F>
where
    F: Fn(CallContext, Arc<Claims>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<CallContext>> + Send,
{
    FnIdentityProvider { f }
}

#[async_trait]
impl<F, Fut> IdentityProvider for FnIdentityProvider<F>
where
    F: Fn(CallContext, Arc<Claims>) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<CallContext>> + Send,
{
    async fn resolve(&self, ctx: CallContext, claims: Arc<Claims>) -> anyhow::Result<CallContext> {
        (self.f)(ctx, claims).await
    }
}
