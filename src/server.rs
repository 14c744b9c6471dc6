//! Service Server
//!
//! This module exposes the services to a host platform using JSON-RPC 2.0 over stdio.
//!
//! # Architecture
//!
//! - **Transport**: JSON-RPC 2.0 over stdio (line-based)
//! - **Dispatch**: every request runs on its own tokio task, so slow database I/O never
//!   blocks reading further requests; responses may arrive out of order (match on `id`)
//! - **Output**: stdout carries JSON responses only; logs go to stderr
//! - **Notifications**: requests without an `id` are executed but never answered
//!
//! # Methods
//!
//! - `initialize` - server metadata
//! - `services/list` - service descriptions
//! - `services/call` - `{"service": "query" | "execute", "data": {...}}`
//! - `entries/reload` - re-read the entry store and sync instances
//! - `entries/unload` - `{"entry_id": "..."}` tear down one instance

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use crate::config::load_registry;
use crate::engine::Connector;
use crate::error::MysqlQueryError;
use crate::service::{ServiceContext, SERVICE_EXECUTE, SERVICE_QUERY};

const PARSE_ERROR: i32 = -32700;
const METHOD_NOT_FOUND: i32 = -32601;
const INVALID_PARAMS: i32 = -32602;
const SERVICE_FAULT: i32 = -32000;

// ============================================================================
// JSON-RPC 2.0 Structures
// ============================================================================

/// JSON-RPC 2.0 Request
#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

/// JSON-RPC 2.0 Response
#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 Error
#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
}

impl JsonRpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), data: None }
    }
}

impl From<MysqlQueryError> for JsonRpcError {
    fn from(err: MysqlQueryError) -> Self {
        let code = match err {
            MysqlQueryError::InvalidInput(_) => INVALID_PARAMS,
            _ => SERVICE_FAULT,
        };
        Self {
            code,
            message: err.message(),
            data: Some(serde_json::json!({ "code": err.error_code() })),
        }
    }
}

impl JsonRpcResponse {
    fn reply(id: Option<Value>, outcome: std::result::Result<Value, JsonRpcError>) -> Self {
        match outcome {
            Ok(value) => Self { jsonrpc: "2.0".to_string(), id, result: Some(value), error: None },
            Err(error) => Self { jsonrpc: "2.0".to_string(), id, result: None, error: Some(error) },
        }
    }
}

#[derive(Debug, Deserialize)]
struct CallParams {
    service: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct UnloadParams {
    entry_id: String,
}

// ============================================================================
// Server
// ============================================================================

/// Run the service server until stdin closes
///
/// # Errors
///
/// Returns an error if stdio communication fails.
pub async fn serve<C: Connector>(context: Arc<ServiceContext<C>>, registry_path: PathBuf) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    let writer = tokio::spawn(async move {
        let mut stdout = tokio::io::stdout();
        while let Some(line) = rx.recv().await {
            stdout.write_all(line.as_bytes()).await?;
            stdout.write_all(b"\n").await?;
            stdout.flush().await?;
        }
        Ok::<_, std::io::Error>(())
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut in_flight = JoinSet::new();
    let registry_path = Arc::new(registry_path);

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let request: JsonRpcRequest = match serde_json::from_str(&line) {
            Ok(req) => req,
            Err(e) => {
                let response = JsonRpcResponse::reply(
                    None,
                    Err(JsonRpcError::new(PARSE_ERROR, format!("Parse error: {e}"))),
                );
                tx.send(serde_json::to_string(&response)?)?;
                continue;
            }
        };

        let context = Arc::clone(&context);
        let registry_path = Arc::clone(&registry_path);
        let tx = tx.clone();
        in_flight.spawn(async move {
            let Some(response) = handle_request(&context, &registry_path, request).await else {
                return;
            };
            match serde_json::to_string(&response) {
                Ok(json) => {
                    let _ = tx.send(json);
                }
                Err(e) => tracing::error!("Could not encode response: {e}"),
            }
        });

        // Reap finished calls so the set does not grow without bound
        while in_flight.try_join_next().is_some() {}
    }

    tracing::info!("Input closed, waiting for {} in-flight call(s)", in_flight.len());
    while in_flight.join_next().await.is_some() {}

    drop(tx);
    writer.await??;

    context.shutdown().await;
    Ok(())
}

/// Route a JSON-RPC request by method name
///
/// Notifications (no `id`) are executed but get no response.
async fn handle_request<C: Connector>(
    context: &ServiceContext<C>,
    registry_path: &std::path::Path,
    request: JsonRpcRequest,
) -> Option<JsonRpcResponse> {
    let params = request.params.unwrap_or(Value::Null);

    let outcome = match request.method.as_str() {
        "initialize" => Ok(handle_initialize()),
        "services/list" => Ok(handle_list_services()),
        "services/call" => handle_call_service(context, params).await,
        "entries/reload" => handle_reload(context, registry_path).await,
        "entries/unload" => handle_unload(context, params).await,
        other => Err(JsonRpcError::new(METHOD_NOT_FOUND, format!("Unknown method: {other}"))),
    };

    if request.id.is_none() {
        tracing::debug!(method = %request.method, "Notification handled, no response sent");
        return None;
    }
    Some(JsonRpcResponse::reply(request.id, outcome))
}

// ============================================================================
// Method Handlers
// ============================================================================

fn handle_initialize() -> Value {
    serde_json::json!({
        "serverInfo": {
            "name": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION")
        },
        "services": [SERVICE_QUERY, SERVICE_EXECUTE]
    })
}

fn handle_list_services() -> Value {
    let fields = serde_json::json!({
        "query": { "required": true, "description": "SQL statement, executed verbatim" },
        "db4query": { "required": false, "description": "Database to run the statement against instead of the instance default" },
        "config_entry": { "required": false, "description": "Entry id of the target instance; the first configured instance is used if omitted" }
    });

    serde_json::json!({
        "services": [
            {
                "name": SERVICE_QUERY,
                "description": "Run a statement and return {\"result\": [rows]}. Any error fails the call.",
                "fields": fields
            },
            {
                "name": SERVICE_EXECUTE,
                "description": "Run a statement and return the full response with metadata. Statement errors are reported in the response's error record.",
                "fields": fields
            }
        ]
    })
}

async fn handle_call_service<C: Connector>(
    context: &ServiceContext<C>,
    params: Value,
) -> std::result::Result<Value, JsonRpcError> {
    let params: CallParams = serde_json::from_value(params)
        .map_err(|e| JsonRpcError::new(INVALID_PARAMS, format!("Invalid params: {e}")))?;

    let data = if params.data.is_null() { serde_json::json!({}) } else { params.data };
    context.call(&params.service, data).await.map_err(|e| {
        tracing::error!(service = %params.service, "Service call failed: {e}");
        JsonRpcError::from(e)
    })
}

async fn handle_reload<C: Connector>(
    context: &ServiceContext<C>,
    registry_path: &std::path::Path,
) -> std::result::Result<Value, JsonRpcError> {
    let registry = load_registry(registry_path)?;
    let report = context.sync_entries(&registry).await;
    serde_json::to_value(report)
        .map_err(|e| JsonRpcError::new(SERVICE_FAULT, format!("Could not encode report: {e}")))
}

async fn handle_unload<C: Connector>(
    context: &ServiceContext<C>,
    params: Value,
) -> std::result::Result<Value, JsonRpcError> {
    let params: UnloadParams = serde_json::from_value(params)
        .map_err(|e| JsonRpcError::new(INVALID_PARAMS, format!("Invalid params: {e}")))?;

    let unloaded = context.unload_entry(&params.entry_id).await;
    Ok(serde_json::json!({ "entry_id": params.entry_id, "unloaded": unloaded }))
}
