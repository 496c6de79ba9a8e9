//! Services: a method registry plus the providers that shape each call.
//!
//! A [`Service`] is built once with [`ServiceBuilder`] and then shared by
//! every transport behind an `Arc`. Nothing about it changes after `build`.

pub mod providers;

use std::sync::Arc;

use serde_json::Value;
use tracing::field::Empty;

pub use providers::{
    identity_fn, provider_fn, ContextProvider, FnContextProvider, FnIdentityProvider,
    IdentityProvider,
};

use crate::context::CallContext;
use crate::error::RpcError;
use crate::pipeline::Pipeline;
use crate::registry::{Method, MethodRegistry, RegistryError};

/// Builder for [`Service`].
pub struct ServiceBuilder {
    name: String,
    registry: MethodRegistry,
    identity_provider: Option<Arc<dyn IdentityProvider>>,
    context_providers: Vec<Arc<dyn ContextProvider>>,
}

impl ServiceBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            registry: MethodRegistry::new(),
            identity_provider: None,
            context_providers: Vec::new(),
        }
    }

    /// Register a method.
    ///
    /// # Errors
    ///
    /// Fails if the name is empty or already registered.
    pub fn method(mut self, method: Method) -> Result<Self, RegistryError> {
        self.registry.register(method)?;
        Ok(self)
    }

    /// Set the identity provider, replacing any previous one.
    pub fn identity_provider(mut self, provider: impl IdentityProvider + 'static) -> Self {
        self.identity_provider = Some(Arc::new(provider));
        self
    }

    /// Append a context provider; providers run in the order they are added.
    pub fn context_provider(mut self, provider: impl ContextProvider + 'static) -> Self {
        self.context_providers.push(Arc::new(provider));
        self
    }

    pub fn build(self) -> Service {
        tracing::info!(
            service = %self.name,
            methods = self.registry.len(),
            providers = self.context_providers.len(),
            identity = self.identity_provider.is_some(),
            "service built"
        );
        Service {
            name: self.name,
            registry: self.registry,
            identity_provider: self.identity_provider,
            context_providers: self.context_providers,
        }
    }
}

/// A named set of methods with their call pipeline.
pub struct Service {
    name: String,
    registry: MethodRegistry,
    identity_provider: Option<Arc<dyn IdentityProvider>>,
    context_providers: Vec<Arc<dyn ContextProvider>>,
}

impl Service {
    pub fn builder(name: impl Into<String>) -> ServiceBuilder {
        ServiceBuilder::new(name)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fresh context for one call, with a logger carrying the service name
    /// and request id.
    pub fn context(&self, request_id: impl Into<String>) -> CallContext {
        let request_id = request_id.into();
        let span = tracing::info_span!(
            "rpc_call",
            service = %self.name,
            request_id = %request_id,
            method = Empty,
            subject = Empty,
        );
        CallContext::new(request_id, span)
    }

    /// Look up a method by exact name.
    pub fn get_method(&self, name: &str) -> Option<MethodHandle<'_>> {
        self.registry
            .lookup(name)
            .map(|method| MethodHandle { service: self, method })
    }

    /// Look up `name` and run it.
    ///
    /// # Errors
    ///
    /// `method_not_found` for unknown names, otherwise whatever the pipeline
    /// produced.
    pub async fn invoke(
        &self,
        name: &str,
        payload: &[u8],
        ctx: CallContext,
    ) -> Result<Option<Value>, RpcError> {
        match self.get_method(name) {
            Some(handle) => handle.invoke(payload, ctx).await,
            None => {
                tracing::debug!(parent: ctx.span(), method = name, "no such method");
                Err(RpcError::method_not_found().with_meta("method", name))
            }
        }
    }

    pub fn methods(&self) -> &MethodRegistry {
        &self.registry
    }

    /// Registered method names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.registry.names()
    }

    fn pipeline(&self) -> Pipeline<'_> {
        Pipeline::new(&self.context_providers)
            .with_identity_provider(self.identity_provider.as_deref())
    }
}

impl std::fmt::Debug for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("name", &self.name)
            .field("methods", &self.registry.names())
            .field("context_providers", &self.context_providers.len())
            .field("identity_provider", &self.identity_provider.is_some())
            .finish()
    }
}

/// A method resolved on a specific service.
#[derive(Clone, Copy)]
pub struct MethodHandle<'a> {
    service: &'a Service,
    method: &'a Method,
}

impl<'a> MethodHandle<'a> {
    pub fn method(&self) -> &'a Method {
        self.method
    }

    pub fn name(&self) -> &'a str {
        self.method.name()
    }

    /// Run the pipeline with the owning service's providers.
    pub async fn invoke(
        &self,
        payload: &[u8],
        ctx: CallContext,
    ) -> Result<Option<Value>, RpcError> {
        self.service.pipeline().invoke(self.method, payload, ctx).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;

    async fn ping(_ctx: CallContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn greet(_ctx: CallContext, name: String) -> anyhow::Result<String> {
        Ok(format!("hello {name}"))
    }

    fn service() -> Service {
        ServiceBuilder::new("demo")
            .method(Method::without_argument("ping", ping))
            .unwrap()
            .method(Method::new("greet", greet))
            .unwrap()
            .build()
    }

    #[test]
    fn test_builder_rejects_duplicates() {
        let err = ServiceBuilder::new("demo")
            .method(Method::without_argument("ping", ping))
            .unwrap()
            .method(Method::without_argument("ping", ping))
            .err()
            .unwrap();
        assert_eq!(err, RegistryError::DuplicateMethod("ping".to_owned()));
    }

    #[test]
    fn test_get_method() {
        let service = service();
        assert_eq!(service.name(), "demo");
        assert_eq!(service.names(), ["greet", "ping"]);
        assert_eq!(service.get_method("greet").map(|m| m.name()), Some("greet"));
        assert!(service.get_method("missing").is_none());
    }

    #[tokio::test]
    async fn test_invoke_unknown_method() {
        let service = service();
        let err = service
            .invoke("missing", b"", service.context("req-1"))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::MethodNotFound);
        assert_eq!(err.metadata["method"], "missing");
    }

    #[tokio::test]
    async fn test_invoke_through_handle() {
        let service = service();
        let handle = service.get_method("greet").unwrap();
        let result = handle
            .invoke(br#""ada""#, service.context("req-1"))
            .await
            .unwrap();
        assert_eq!(result, Some(Value::from("hello ada")));

        let result = service
            .invoke("ping", b"", service.context("req-2"))
            .await
            .unwrap();
        assert_eq!(result, None);
    }

    #[test]
    fn test_context_carries_request_id() {
        let ctx = service().context("req-42");
        assert_eq!(ctx.request_id(), "req-42");
        assert!(ctx.claims().is_none());
    }
}
