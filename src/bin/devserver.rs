//! rpcservice dev server binary
//!
//! Serves a small demo service over HTTP:
//!
//! ```text
//! curl -X POST localhost:8080/rpc/ping
//! curl -X POST -H 'content-type: application/json' -d '{"text":"hi"}' localhost:8080/rpc/echo
//! curl -X POST localhost:8080/rpc/whoami
//! ```

use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use rpcservice::config::{Args, ServerConfig};
use rpcservice::transport::http::DevServer;
use rpcservice::{ArgumentSchema, CallContext, Method, Service, ServiceBuilder};

#[derive(Debug, Deserialize, Serialize)]
struct EchoRequest {
    text: String,
}

#[derive(Debug, Serialize)]
struct Identity {
    request_id: String,
    subject: Option<String>,
    scopes: Vec<String>,
}

async fn ping(_ctx: CallContext) -> Result<()> {
    Ok(())
}

async fn echo(_ctx: CallContext, req: EchoRequest) -> Result<EchoRequest> {
    Ok(req)
}

async fn whoami(ctx: CallContext) -> Result<Identity> {
    let claims = ctx.claims();
    Ok(Identity {
        request_id: ctx.request_id().to_owned(),
        subject: claims.map(|c| c.subject().to_owned()),
        scopes: claims.map(|c| c.scopes().to_vec()).unwrap_or_default(),
    })
}

fn demo_service() -> Result<Service> {
    let echo_schema = ArgumentSchema::new(json!({
        "type": "object",
        "properties": { "text": { "type": "string", "minLength": 1 } },
        "required": ["text"]
    }))?;

    let service = ServiceBuilder::new("demo")
        .method(Method::without_argument("ping", ping))?
        .method(Method::new("echo", echo).with_schema(echo_schema))?
        .method(Method::without_argument("whoami", whoami))?
        .build();

    Ok(service)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = ServerConfig::load(&args).context("failed to load configuration")?;

    // Keep the guard alive for the entire program lifetime
    let _log_guard = rpcservice::logging::init(&config.log)?;

    info!("rpcservice dev server v{} starting up", env!("CARGO_PKG_VERSION"));

    let service = Arc::new(demo_service()?);

    DevServer::new(&config)
        .add_service(&config.service_path, service, None)
        .listen()
        .await
}
