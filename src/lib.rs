//! Transport-agnostic RPC dispatch.
//!
//! Named methods are bound to typed async handlers, arguments are validated
//! and decoded, request-scoped context (including the caller's identity) is
//! assembled, and every outcome is reduced to a value, "no content", or a
//! classified [`RpcError`] that any transport can render.
//!
//! ```
//! use rpcservice::{CallContext, Method, ServiceBuilder};
//!
//! async fn add(_ctx: CallContext, (a, b): (i64, i64)) -> anyhow::Result<i64> {
//!     Ok(a + b)
//! }
//!
//! # #[tokio::main]
//! # async fn main() {
//! let service = ServiceBuilder::new("math")
//!     .method(Method::new("add", add))
//!     .unwrap()
//!     .build();
//!
//! let result = service
//!     .invoke("add", b"[2, 3]", service.context("req-1"))
//!     .await
//!     .unwrap();
//! assert_eq!(result, Some(serde_json::json!(5)));
//! # }
//! ```

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod registry;
pub mod schema;
pub mod service;
pub mod transport;

pub use auth::{Authenticator, Claims};
pub use context::CallContext;
pub use error::{classify, ErrorCode, RpcError};
pub use pipeline::Pipeline;
pub use registry::{Method, MethodRegistry, RegistryError};
pub use schema::{ArgumentSchema, SchemaError};
pub use service::{
    identity_fn, provider_fn, ContextProvider, IdentityProvider, MethodHandle, Service,
    ServiceBuilder,
};
