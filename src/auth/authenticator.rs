//! Bearer token authentication seam.
//!
//! Token verification lives outside this crate. Transports hand the raw token
//! to an [`Authenticator`] and normalize the returned claim map with
//! [`Claims::from_token_claims`](super::Claims::from_token_claims).

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::RpcError;

/// Verifies bearer tokens on behalf of a transport.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Verify `token` and return its claims.
    ///
    /// Rejections should use `invalid_authentication`.
    async fn authenticate(&self, token: &str) -> Result<Map<String, Value>, RpcError>;
}

/// Extract the token from an `Authorization` header value.
///
/// The `Bearer` scheme prefix is optional and matched case-insensitively.
pub fn bearer_token(header: &str) -> Option<&str> {
    let header = header.trim();
    let token = match (header.get(..6), header.get(6..)) {
        (Some(scheme), Some(rest))
            if scheme.eq_ignore_ascii_case("bearer") && (rest.is_empty() || rest.starts_with(' ')) =>
        {
            rest.trim()
        }
        _ => header,
    };

    (!token.is_empty()).then_some(token)
}
