//! Classified error taxonomy shared by every transport.
//!
//! A [`RpcError`] is the only failure a transport adapter ever sees. Anything
//! else produced inside a call is logged and collapsed into
//! [`ErrorCode::Unknown`] by [`classify`] before it crosses the boundary.

use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::error::Error as StdError;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::result;

/// A specialized Result type for RPC calls.
pub type Result<T> = result::Result<T, RpcError>;

/// Body rendered when an error cannot be serialized.
pub const SERIALISATION_FAILURE_BODY: &[u8] = br#"{"code":"error_serialisation_fail"}"#;

/// Machine-readable error classification.
///
/// Codes compare by their wire string, so `Custom("forbidden")` is the same
/// code as `Forbidden`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ErrorCode {
    /// Generic client error
    BadRequest,
    /// Payload could not be decoded
    InvalidBody,
    /// Payload decoded but violates the method's argument schema
    SchemaFailure,
    /// Method expects an argument and none was sent
    MissingBody,
    /// Caller is authenticated but not allowed
    Forbidden,
    /// No credentials were presented
    NoAuthentication,
    /// Credentials were presented and rejected
    InvalidAuthentication,
    /// No method is registered under the requested name
    MethodNotFound,
    /// Internal failure, details withheld
    Unknown,
    /// Application-defined code
    Custom(String),
}

impl ErrorCode {
    /// Wire representation of the code.
    pub fn as_str(&self) -> &str {
        match self {
            ErrorCode::BadRequest => "bad_request",
            ErrorCode::InvalidBody => "invalid_body",
            ErrorCode::SchemaFailure => "schema_failure",
            ErrorCode::MissingBody => "missing_body",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::NoAuthentication => "no_authentication",
            ErrorCode::InvalidAuthentication => "invalid_authentication",
            ErrorCode::MethodNotFound => "method_not_found",
            ErrorCode::Unknown => "unknown",
            ErrorCode::Custom(code) => code,
        }
    }

    /// Status every transport uses for this code.
    ///
    /// Application-defined codes are treated like `Unknown`. A `Custom` code
    /// spelling a reserved one gets the reserved status.
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::BadRequest
            | ErrorCode::InvalidBody
            | ErrorCode::SchemaFailure
            | ErrorCode::MissingBody => StatusCode::BAD_REQUEST,
            ErrorCode::NoAuthentication | ErrorCode::InvalidAuthentication => {
                StatusCode::UNAUTHORIZED
            }
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::MethodNotFound | ErrorCode::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::Custom(code) => match ErrorCode::from(code.as_str()) {
                ErrorCode::Custom(_) => StatusCode::INTERNAL_SERVER_ERROR,
                reserved => reserved.status(),
            },
        }
    }

    /// Every code reserved by the core, in table order.
    pub fn reserved() -> &'static [ErrorCode] {
        &[
            ErrorCode::BadRequest,
            ErrorCode::InvalidBody,
            ErrorCode::SchemaFailure,
            ErrorCode::MissingBody,
            ErrorCode::Forbidden,
            ErrorCode::NoAuthentication,
            ErrorCode::InvalidAuthentication,
            ErrorCode::MethodNotFound,
            ErrorCode::Unknown,
        ]
    }
}

impl PartialEq for ErrorCode {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl Eq for ErrorCode {}

impl Hash for ErrorCode {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.as_str().hash(state);
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for ErrorCode {
    fn from(code: &str) -> Self {
        match code {
            "bad_request" => ErrorCode::BadRequest,
            "invalid_body" => ErrorCode::InvalidBody,
            "schema_failure" => ErrorCode::SchemaFailure,
            "missing_body" => ErrorCode::MissingBody,
            "forbidden" => ErrorCode::Forbidden,
            "no_authentication" => ErrorCode::NoAuthentication,
            "invalid_authentication" => ErrorCode::InvalidAuthentication,
            "method_not_found" => ErrorCode::MethodNotFound,
            "unknown" => ErrorCode::Unknown,
            other => ErrorCode::Custom(other.to_owned()),
        }
    }
}

impl From<String> for ErrorCode {
    fn from(code: String) -> Self {
        ErrorCode::from(code.as_str())
    }
}

impl From<ErrorCode> for String {
    fn from(code: ErrorCode) -> Self {
        match code {
            ErrorCode::Custom(code) => code,
            reserved => reserved.as_str().to_owned(),
        }
    }
}

/// An error tagged with an [`ErrorCode`], safe to send to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcError {
    pub code: ErrorCode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl RpcError {
    pub fn new(code: impl Into<ErrorCode>) -> Self {
        Self {
            code: code.into(),
            message: None,
            metadata: Map::new(),
        }
    }

    pub fn bad_request() -> Self {
        Self::new(ErrorCode::BadRequest)
    }

    pub fn invalid_body() -> Self {
        Self::new(ErrorCode::InvalidBody)
    }

    pub fn schema_failure() -> Self {
        Self::new(ErrorCode::SchemaFailure)
    }

    pub fn missing_body() -> Self {
        Self::new(ErrorCode::MissingBody)
    }

    pub fn forbidden() -> Self {
        Self::new(ErrorCode::Forbidden)
    }

    pub fn no_authentication() -> Self {
        Self::new(ErrorCode::NoAuthentication)
    }

    pub fn invalid_authentication() -> Self {
        Self::new(ErrorCode::InvalidAuthentication)
    }

    pub fn method_not_found() -> Self {
        Self::new(ErrorCode::MethodNotFound)
    }

    pub fn unknown() -> Self {
        Self::new(ErrorCode::Unknown)
    }

    /// Attach a client-safe message.
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    /// Attach one metadata entry, replacing any previous value for `key`.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.code.status()
    }

    /// JSON body for transports that render JSON.
    pub fn to_body(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_else(|e| {
            tracing::error!("error body serialization failed: {}", e);
            SERIALISATION_FAILURE_BODY.to_vec()
        })
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(message) => write!(f, "{}: {}", self.code, message),
            None => write!(f, "{}", self.code),
        }
    }
}

impl StdError for RpcError {}

impl From<ErrorCode> for RpcError {
    fn from(code: ErrorCode) -> Self {
        RpcError::new(code)
    }
}

/// Collapse an arbitrary failure into a classified error.
///
/// Classified errors pass through unchanged. Anything else is logged with its
/// full chain in the current span and replaced by a bare `Unknown`.
pub fn classify(err: anyhow::Error) -> RpcError {
    match err.downcast::<RpcError>() {
        Ok(classified) => classified,
        Err(internal) => {
            tracing::error!(error = ?internal, "unclassified error coerced to unknown");
            RpcError::unknown()
        }
    }
}
