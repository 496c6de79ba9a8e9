//! Serverless gateway adapter tests.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine as _;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use rpcservice::transport::gateway::{handle_event, GatewayRequest, RequestContext};
use rpcservice::{
    identity_fn, ArgumentSchema, CallContext, Claims, Method, RpcError, Service, ServiceBuilder,
};

#[derive(Debug, Deserialize, Serialize)]
struct EchoRequest {
    text: String,
}

async fn ping(_ctx: CallContext) -> anyhow::Result<()> {
    Ok(())
}

async fn echo(_ctx: CallContext, req: EchoRequest) -> anyhow::Result<EchoRequest> {
    Ok(req)
}

async fn whoami(ctx: CallContext) -> anyhow::Result<Value> {
    let claims = ctx.claims().cloned().unwrap_or_default();
    Ok(json!({
        "subject": claims.subject(),
        "audience": claims.audience(),
        "scopes": claims.scopes(),
        "request_id": ctx.request_id(),
    }))
}

fn service() -> Service {
    let schema = ArgumentSchema::new(json!({
        "type": "object",
        "properties": { "text": { "type": "string" } },
        "required": ["text"]
    }))
    .unwrap();

    ServiceBuilder::new("gateway-test")
        .method(Method::without_argument("ping", ping))
        .unwrap()
        .method(Method::new("echo", echo).with_schema(schema))
        .unwrap()
        .method(Method::without_argument("whoami", whoami))
        .unwrap()
        .identity_provider(identity_fn(|ctx: CallContext, claims: Arc<Claims>| async move {
            if claims.subject() == "banned" {
                return Err(anyhow::Error::new(RpcError::forbidden()));
            }
            Ok(ctx)
        }))
        .build()
}

fn event(method: Option<&str>, body: Option<&str>) -> GatewayRequest {
    GatewayRequest {
        path_parameters: method.map(|m| HashMap::from([("method".to_owned(), m.to_owned())])),
        body: body.map(str::to_owned),
        is_base64_encoded: false,
        request_context: RequestContext {
            request_id: "gw-req-1".to_owned(),
            authorizer: None,
        },
    }
}

fn body_json(body: &str) -> Value {
    serde_json::from_str(body).unwrap()
}

#[tokio::test]
async fn test_ping_is_no_content() {
    let response = handle_event(&service(), event(Some("ping"), None)).await;
    assert_eq!(response.status_code, 204);
    assert_eq!(response.body, "");
    assert!(!response.is_base64_encoded);
}

#[tokio::test]
async fn test_echo() {
    let response = handle_event(&service(), event(Some("echo"), Some(r#"{"text":"hi"}"#))).await;
    assert_eq!(response.status_code, 200);
    assert_eq!(body_json(&response.body), json!({"text": "hi"}));
    assert_eq!(
        response.headers.get("Content-Type").map(String::as_str),
        Some("application/json; charset=utf-8")
    );
}

#[tokio::test]
async fn test_echo_schema_failure() {
    let response = handle_event(&service(), event(Some("echo"), Some("{}"))).await;
    assert_eq!(response.status_code, 400);
    assert_eq!(body_json(&response.body)["code"], "schema_failure");
}

#[tokio::test]
async fn test_missing_body() {
    let response = handle_event(&service(), event(Some("echo"), None)).await;
    assert_eq!(response.status_code, 400);
    assert_eq!(body_json(&response.body), json!({"code": "missing_body"}));
}

#[tokio::test]
async fn test_base64_body() {
    let mut request = event(Some("echo"), None);
    request.body = Some(base64::engine::general_purpose::STANDARD.encode(br#"{"text":"b64"}"#));
    request.is_base64_encoded = true;

    let response = handle_event(&service(), request).await;
    assert_eq!(response.status_code, 200);
    assert_eq!(body_json(&response.body), json!({"text": "b64"}));
}

#[tokio::test]
async fn test_missing_method_parameter() {
    for request in [event(None, None), {
        let mut request = event(None, None);
        request.path_parameters = Some(HashMap::from([("proxy".to_owned(), "x".to_owned())]));
        request
    }] {
        let response = handle_event(&service(), request).await;
        assert_eq!(response.status_code, 500);
        assert_eq!(body_json(&response.body)["code"], "method_not_found");
    }
}

#[tokio::test]
async fn test_unknown_method() {
    let response = handle_event(&service(), event(Some("nope"), None)).await;
    assert_eq!(response.status_code, 500);
    assert_eq!(body_json(&response.body)["code"], "method_not_found");
}

#[tokio::test]
async fn test_authorizer_claims_reach_handler() {
    let mut request = event(Some("whoami"), None);
    request.request_context.authorizer = Some(json!({
        "claims": {"sub": "u1", "iss": "issuer", "aud": "[a b]"},
        "scopes": ["read", "write"]
    }));

    let response = handle_event(&service(), request).await;
    assert_eq!(response.status_code, 200);
    assert_eq!(
        body_json(&response.body),
        json!({
            "subject": "u1",
            "audience": ["a", "b"],
            "scopes": ["read", "write"],
            "request_id": "gw-req-1",
        })
    );
}

#[tokio::test]
async fn test_identity_rejection() {
    let mut request = event(Some("whoami"), None);
    request.request_context.authorizer = Some(json!({"claims": {"sub": "banned"}}));

    let response = handle_event(&service(), request).await;
    assert_eq!(response.status_code, 403);
    assert_eq!(body_json(&response.body), json!({"code": "forbidden"}));
}

#[tokio::test]
async fn test_event_from_raw_json() {
    let request: GatewayRequest = serde_json::from_value(json!({
        "httpMethod": "POST",
        "path": "/rpc/echo",
        "pathParameters": {"method": "echo"},
        "headers": {"content-type": "application/json"},
        "body": "{\"text\":\"raw\"}",
        "isBase64Encoded": false,
        "requestContext": {"requestId": "raw-1"}
    }))
    .unwrap();

    let response = handle_event(&service(), request).await;
    let rendered = serde_json::to_value(&response).unwrap();
    assert_eq!(rendered["statusCode"], 200);
    assert_eq!(rendered["isBase64Encoded"], false);
    assert_eq!(body_json(&response.body), json!({"text": "raw"}));
}
