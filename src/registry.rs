//! Method registry.
//!
//! Handlers are plain async functions with a typed argument and result. At
//! registration time [`Method`] erases them behind one uniform signature, so
//! dispatch needs no reflection: the registry is a name-keyed map of
//! descriptors that all look alike to the pipeline.
//!
//! # Usage
//!
//! ```
//! use rpcservice::registry::{Method, MethodRegistry};
//! use rpcservice::CallContext;
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Deserialize, Serialize)]
//! struct Echo {
//!     text: String,
//! }
//!
//! async fn echo(_ctx: CallContext, arg: Echo) -> anyhow::Result<Echo> {
//!     Ok(arg)
//! }
//!
//! let mut registry = MethodRegistry::new();
//! registry.register(Method::new("echo", echo)).unwrap();
//! assert!(registry.lookup("echo").is_some());
//! assert!(registry.lookup("Echo").is_none());
//! ```

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::context::CallContext;
use crate::schema::ArgumentSchema;

/// Errors from building a registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("method {0:?} is already registered")]
    DuplicateMethod(String),

    #[error("method name must not be empty")]
    EmptyName,
}

/// A decoded argument bound to its handler, waiting for the final context.
pub(crate) type BoundCall = Box<dyn FnOnce(CallContext) -> BoxFuture<'static, anyhow::Result<Value>> + Send>;

/// Type-erased handler: typed decode of the argument, then the call itself.
type ErasedHandler = dyn Fn(Option<Value>) -> Result<BoundCall, serde_json::Error> + Send + Sync;

/// Descriptor of one registered method.
///
/// Cheap to clone; all clones share the same handler. The schema belongs to
/// each descriptor, so attaching one to a clone leaves the others unchanged.
#[derive(Clone)]
pub struct Method {
    inner: Arc<MethodInner>,
    schema: Option<Arc<ArgumentSchema>>,
}

struct MethodInner {
    name: String,
    expects_argument: bool,
    argument_type: &'static str,
    result_type: &'static str,
    handler: Box<ErasedHandler>,
}

impl Method {
    /// Bind a handler taking a typed argument.
    ///
    /// The handler's result is serialized to JSON by the pipeline; a result
    /// serializing to `null` (such as `()`) means "no content".
    pub fn new<A, R, F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        A: DeserializeOwned + Send + 'static,
        R: Serialize + Send + 'static,
        F: Fn(CallContext, A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased = move |argument: Option<Value>| -> Result<BoundCall, serde_json::Error> {
            let argument: A = serde_json::from_value(argument.unwrap_or(Value::Null))?;
            let handler = Arc::clone(&handler);
            Ok(Box::new(move |ctx: CallContext| -> BoxFuture<'static, anyhow::Result<Value>> {
                Box::pin(async move {
                    let result = handler(ctx, argument).await?;
                    Ok(serde_json::to_value(result)?)
                })
            }))
        };

        Self::from_parts(
            name.into(),
            true,
            std::any::type_name::<A>(),
            std::any::type_name::<R>(),
            Box::new(erased),
        )
    }

    /// Bind a handler that takes no argument; any payload is ignored.
    pub fn without_argument<R, F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        R: Serialize + Send + 'static,
        F: Fn(CallContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<R>> + Send + 'static,
    {
        let handler = Arc::new(handler);
        let erased = move |_: Option<Value>| -> Result<BoundCall, serde_json::Error> {
            let handler = Arc::clone(&handler);
            Ok(Box::new(move |ctx: CallContext| -> BoxFuture<'static, anyhow::Result<Value>> {
                Box::pin(async move {
                    let result = handler(ctx).await?;
                    Ok(serde_json::to_value(result)?)
                })
            }))
        };

        Self::from_parts(
            name.into(),
            false,
            "()",
            std::any::type_name::<R>(),
            Box::new(erased),
        )
    }

    fn from_parts(
        name: String,
        expects_argument: bool,
        argument_type: &'static str,
        result_type: &'static str,
        handler: Box<ErasedHandler>,
    ) -> Self {
        Self {
            inner: Arc::new(MethodInner {
                name,
                expects_argument,
                argument_type,
                result_type,
                handler,
            }),
            schema: None,
        }
    }

    /// Declare the argument schema.
    pub fn with_schema(mut self, schema: ArgumentSchema) -> Self {
        self.schema = Some(Arc::new(schema));
        self
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn schema(&self) -> Option<&ArgumentSchema> {
        self.schema.as_deref()
    }

    /// Whether an empty payload is a `missing_body` failure.
    pub fn expects_argument(&self) -> bool {
        self.inner.expects_argument
    }

    pub fn argument_type(&self) -> &'static str {
        self.inner.argument_type
    }

    pub fn result_type(&self) -> &'static str {
        self.inner.result_type
    }

    /// Decode `argument` into the handler's type and bind it.
    pub(crate) fn bind(&self, argument: Option<Value>) -> Result<BoundCall, serde_json::Error> {
        (self.inner.handler)(argument)
    }

    fn same_handler(&self, other: &Method) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn same_schema(&self, other: &Method) -> bool {
        match (&self.schema, &other.schema) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("name", &self.inner.name)
            .field("argument_type", &self.inner.argument_type)
            .field("result_type", &self.inner.result_type)
            .field("has_schema", &self.schema.is_some())
            .finish_non_exhaustive()
    }
}

impl PartialEq for Method {
    fn eq(&self, other: &Self) -> bool {
        self.same_handler(other) && self.same_schema(other)
    }
}

/// Name-keyed map of method descriptors.
///
/// Populated at construction and read-only afterwards; duplicate names are
/// rejected rather than replaced.
#[derive(Debug, Clone, Default)]
pub struct MethodRegistry {
    methods: HashMap<String, Method>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a method.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DuplicateMethod`] if the name is taken,
    /// [`RegistryError::EmptyName`] if it is empty.
    pub fn register(&mut self, method: Method) -> Result<(), RegistryError> {
        if method.name().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.methods.contains_key(method.name()) {
            return Err(RegistryError::DuplicateMethod(method.name().to_owned()));
        }

        tracing::debug!(
            method = method.name(),
            argument = method.argument_type(),
            result = method.result_type(),
            "method registered"
        );
        self.methods.insert(method.name().to_owned(), method);
        Ok(())
    }

    /// Exact, case-sensitive lookup.
    pub fn lookup(&self, name: &str) -> Option<&Method> {
        self.methods.get(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
