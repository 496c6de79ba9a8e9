//! Transport adapters.
//!
//! Each adapter maps its native request onto [`Service::invoke`] and renders
//! the outcome with [`Rendered::from_outcome`], so every transport agrees on
//! status codes and body shapes.
//!
//! [`Service::invoke`]: crate::service::Service::invoke

pub mod gateway;
pub mod http;

use ::http::StatusCode;
use serde_json::Value;

use crate::error::RpcError;

/// Content type of every JSON body produced by the adapters.
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

/// Transport-neutral response.
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    pub status: StatusCode,
    /// JSON body; `None` for "no content".
    pub body: Option<Vec<u8>>,
}

impl Rendered {
    pub fn from_outcome(outcome: Result<Option<Value>, RpcError>) -> Self {
        match outcome {
            Ok(None) => Self {
                status: StatusCode::NO_CONTENT,
                body: None,
            },
            Ok(Some(value)) => match serde_json::to_vec(&value) {
                Ok(body) => Self {
                    status: StatusCode::OK,
                    body: Some(body),
                },
                Err(e) => {
                    tracing::error!(error = %e, "encoding response body failed");
                    Self::from_error(&RpcError::unknown())
                }
            },
            Err(err) => Self::from_error(&err),
        }
    }

    pub fn from_error(err: &RpcError) -> Self {
        Self {
            status: err.status(),
            body: Some(err.to_body()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_no_content() {
        let rendered = Rendered::from_outcome(Ok(None));
        assert_eq!(rendered.status, StatusCode::NO_CONTENT);
        assert!(rendered.body.is_none());
    }

    #[test]
    fn test_value() {
        let rendered = Rendered::from_outcome(Ok(Some(json!({"text": "hi"}))));
        assert_eq!(rendered.status, StatusCode::OK);
        assert_eq!(rendered.body.unwrap(), br#"{"text":"hi"}"#);
    }

    #[test]
    fn test_error() {
        let rendered = Rendered::from_outcome(Err(RpcError::forbidden()));
        assert_eq!(rendered.status, StatusCode::FORBIDDEN);
        assert_eq!(rendered.body.unwrap(), br#"{"code":"forbidden"}"#);
    }
}
