use std::{net::SocketAddr, time::Instant};

use axum::{
    extract::{connect_info::ConnectInfo, Request},
    middleware::Next,
    response::Response,
};
use serde_json::Value;
use tracing::{debug, error, info};
use tracing_subscriber::{fmt, EnvFilter};

use crate::jsonrpc::codec::{DecodeError, Params, RequestId};

pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().to_string();
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "-".to_string());
    let started_at = Instant::now();

    let response = next.run(request).await;
    let status = response.status();
    let elapsed_ms = started_at.elapsed().as_millis();

    info!(
        remote_addr = %remote_addr,
        method = %method,
        uri = %uri,
        status = status.as_u16(),
        duration_ms = elapsed_ms,
        "request summary"
    );

    response
}

/// Diagnostic events emitted by the dispatcher.
#[derive(Debug)]
pub enum DispatchEvent<'a> {
    DecodeFailed {
        error: &'a DecodeError,
    },
    BatchReceived {
        size: usize,
    },
    InvalidCall {
        id: Option<&'a RequestId>,
        reason: &'a str,
    },
    CallAborted {
        id: Option<&'a RequestId>,
        reason: &'a str,
    },
    CallStarted {
        method: &'a str,
        id: Option<&'a RequestId>,
        params: &'a Params,
    },
    CallFinished {
        method: &'a str,
        id: Option<&'a RequestId>,
        error_code: Option<i64>,
    },
}

/// Where the dispatcher sends its debug traces.
pub trait TraceSink: Send + Sync {
    fn record(&self, event: &DispatchEvent<'_>);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl TraceSink for NoopSink {
    fn record(&self, _event: &DispatchEvent<'_>) {}
}

/// Forwards dispatch events to `tracing` at debug level with params redacted.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl TraceSink for TracingSink {
    fn record(&self, event: &DispatchEvent<'_>) {
        match event {
            DispatchEvent::DecodeFailed { error } => {
                debug!(error = %error, "request body rejected");
            }
            DispatchEvent::BatchReceived { size } => {
                debug!(size, "batch received");
            }
            DispatchEvent::InvalidCall { id, reason } => {
                debug!(id = ?id, reason, "invalid call");
            }
            DispatchEvent::CallAborted { id, reason } => {
                error!(id = ?id, reason, "call task aborted");
            }
            DispatchEvent::CallStarted { method, id, params } => {
                let params = params.as_value().map(redact_value).unwrap_or(Value::Null);
                debug!(method, id = ?id, params = %params, "call started");
            }
            DispatchEvent::CallFinished {
                method,
                id,
                error_code,
            } => {
                let outcome = if error_code.is_some() { "failure" } else { "success" };
                debug!(method, id = ?id, outcome, error_code = ?error_code, "call finished");
            }
        }
    }
}

pub fn redact_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, item)| {
                    if is_sensitive_key(key) {
                        (key.clone(), Value::String("[REDACTED]".to_string()))
                    } else {
                        (key.clone(), redact_value(item))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(redact_value).collect()),
        _ => value.clone(),
    }
}

pub fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.trim().to_ascii_lowercase();
    ["password", "token", "secret", "credential"]
        .iter()
        .any(|family| normalized.contains(family))
}
