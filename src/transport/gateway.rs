//! Serverless API-gateway proxy events.
//!
//! The event and response types mirror the gateway's proxy integration JSON,
//! so a function runtime can deserialize the event, call [`handle_event`] and
//! serialize the response back unchanged.

use std::collections::HashMap;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Rendered, JSON_CONTENT_TYPE};
use crate::auth::Claims;
use crate::error::RpcError;
use crate::service::Service;

/// Inbound proxy event. Fields the adapter does not use are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayRequest {
    #[serde(default)]
    pub path_parameters: Option<HashMap<String, String>>,
    #[serde(default)]
    pub body: Option<String>,
    #[serde(default)]
    pub is_base64_encoded: bool,
    #[serde(default)]
    pub request_context: RequestContext,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    #[serde(default)]
    pub request_id: String,
    /// Output of the gateway's authorizer, if one ran.
    #[serde(default)]
    pub authorizer: Option<Value>,
}

/// Proxy response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    pub status_code: u16,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub is_base64_encoded: bool,
}

impl From<Rendered> for GatewayResponse {
    fn from(rendered: Rendered) -> Self {
        let mut headers = HashMap::new();
        let body = match rendered.body {
            Some(body) => {
                headers.insert("Content-Type".to_owned(), JSON_CONTENT_TYPE.to_owned());
                String::from_utf8_lossy(&body).into_owned()
            }
            None => String::new(),
        };

        Self {
            status_code: rendered.status.as_u16(),
            headers,
            body,
            is_base64_encoded: false,
        }
    }
}

/// Dispatch one gateway event to `service`.
///
/// Never fails: every problem is rendered as an error response.
pub async fn handle_event(service: &Service, event: GatewayRequest) -> GatewayResponse {
    let request_id = if event.request_context.request_id.is_empty() {
        uuid::Uuid::new_v4().to_string()
    } else {
        event.request_context.request_id.clone()
    };

    let mut ctx = service.context(request_id);
    if let Some(authorizer) = &event.request_context.authorizer {
        ctx = ctx.with_claims(Claims::from_authorizer(authorizer));
    }

    let outcome = match method_name(&event) {
        Some(name) => match decode_body(&event) {
            Ok(payload) => service.invoke(name, &payload, ctx).await,
            Err(err) => Err(err),
        },
        None => {
            tracing::warn!(parent: ctx.span(), "method path parameter not found");
            Err(RpcError::method_not_found())
        }
    };

    Rendered::from_outcome(outcome).into()
}

fn method_name(event: &GatewayRequest) -> Option<&str> {
    event
        .path_parameters
        .as_ref()
        .and_then(|params| params.get("method"))
        .map(String::as_str)
}

fn decode_body(event: &GatewayRequest) -> Result<Vec<u8>, RpcError> {
    let body = event.body.as_deref().unwrap_or_default();
    if !event.is_base64_encoded {
        return Ok(body.as_bytes().to_vec());
    }

    BASE64.decode(body).map_err(|e| {
        RpcError::invalid_body().with_message(format!("body is not valid base64: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_event_deserializes_from_gateway_json() {
        let event: GatewayRequest = serde_json::from_value(json!({
            "resource": "/rpc/{method}",
            "pathParameters": {"method": "echo"},
            "body": "{\"text\":\"hi\"}",
            "isBase64Encoded": false,
            "requestContext": {
                "requestId": "abc-123",
                "authorizer": {"claims": {"sub": "u1"}}
            }
        }))
        .unwrap();

        assert_eq!(method_name(&event), Some("echo"));
        assert_eq!(event.request_context.request_id, "abc-123");
        assert!(event.request_context.authorizer.is_some());
    }

    #[test]
    fn test_base64_body_decoded() {
        let event = GatewayRequest {
            body: Some(BASE64.encode(br#"{"a":1}"#)),
            is_base64_encoded: true,
            ..Default::default()
        };
        assert_eq!(decode_body(&event).unwrap(), br#"{"a":1}"#);
    }

    #[test]
    fn test_bad_base64_is_invalid_body() {
        let event = GatewayRequest {
            body: Some("***".to_owned()),
            is_base64_encoded: true,
            ..Default::default()
        };
        let err = decode_body(&event).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::InvalidBody);
    }

    #[test]
    fn test_response_serializes_camel_case() {
        let response: GatewayResponse = Rendered::from_outcome(Ok(None)).into();
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["statusCode"], 204);
        assert_eq!(json["body"], "");
        assert_eq!(json["isBase64Encoded"], false);
        assert!(response.headers.is_empty());
    }
}
