//! JSON-RPC 2.0 server over stdio.
//!
//! Messages are newline-delimited JSON. A client that sends `Content-Length`
//! headers gets its replies framed the same way.

use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value, json};
use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::dispatch::Dispatcher;
use crate::tools::{closest_tool_name, find_tool, tools_list_payload};
use crate::util::to_pretty_json;
use crate::{MCP_PROTOCOL_VERSION, MCP_SERVER_NAME};

/// Largest `Content-Length` body accepted from a client.
const MAX_MESSAGE_BYTES: usize = 16 * 1024 * 1024;

/// Outcome of the startup connection, reported in `initialize`.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_mode: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_url: Option<String>,
    pub api_version: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connected_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ConnectionStatus {
    pub fn connected(auth_mode: &'static str, instance_url: &str, api_version: &str) -> Self {
        Self {
            connected: true,
            auth_mode: Some(auth_mode),
            instance_url: Some(instance_url.to_string()),
            api_version: api_version.to_string(),
            connected_at: Some(Utc::now()),
            reason: None,
        }
    }

    pub fn degraded(
        auth_mode: Option<&'static str>,
        api_version: &str,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            connected: false,
            auth_mode,
            instance_url: None,
            api_version: api_version.to_string(),
            connected_at: None,
            reason: Some(reason.into()),
        }
    }
}

#[derive(Debug)]
pub(crate) struct RpcError {
    code: i64,
    message: String,
    data: Option<Value>,
}

impl RpcError {
    fn parse_error(message: impl Into<String>) -> Self {
        Self {
            code: -32700,
            message: message.into(),
            data: None,
        }
    }

    fn invalid_request(message: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: message.into(),
            data: None,
        }
    }

    fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("Method not found: {method}"),
            data: None,
        }
    }

    fn invalid_params(message: impl Into<String>) -> Self {
        Self {
            code: -32602,
            message: message.into(),
            data: None,
        }
    }

    fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Framing {
    Lines,
    ContentLength,
}

pub struct McpServer {
    dispatcher: Dispatcher,
    status: ConnectionStatus,
    session_id: String,
}

impl McpServer {
    pub fn new(dispatcher: Dispatcher, status: ConnectionStatus) -> Self {
        Self {
            dispatcher,
            status,
            session_id: format!("stdio-{}", Uuid::now_v7()),
        }
    }

    pub async fn serve_stdio(&self) -> Result<(), String> {
        let reader = io::BufReader::new(io::stdin());
        let writer = io::stdout();
        self.serve(reader, writer).await
    }

    /// Answer messages until the reader hits EOF.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<(), String>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let span = info_span!("mcp_session", session_id = %self.session_id);
        async move {
            info!(
                connected = self.status.connected,
                "MCP server ready on stdio"
            );
            loop {
                let incoming = read_message(&mut reader)
                    .await
                    .map_err(|e| format!("Failed to read MCP message: {e}"))?;
                let Some((incoming, framing)) = incoming else {
                    info!("stdin closed, shutting down");
                    break;
                };

                let responses = match incoming {
                    Ok(message) => self.handle_incoming_message(message).await,
                    Err(reason) => vec![error_response(Value::Null, RpcError::parse_error(reason))],
                };
                for response in responses {
                    write_message(&mut writer, &response, framing)
                        .await
                        .map_err(|e| format!("Failed to write MCP response: {e}"))?;
                }
            }
            Ok(())
        }
        .instrument(span)
        .await
    }

    pub(crate) async fn handle_incoming_message(&self, incoming: Value) -> Vec<Value> {
        let mut responses = Vec::new();

        if let Some(batch) = incoming.as_array() {
            if batch.is_empty() {
                responses.push(error_response(
                    Value::Null,
                    RpcError::invalid_request("Batch request must not be empty"),
                ));
                return responses;
            }
            for item in batch {
                if let Some(response) = self.handle_single_message(item.clone()).await {
                    responses.push(response);
                }
            }
            return responses;
        }

        if let Some(response) = self.handle_single_message(incoming).await {
            responses.push(response);
        }
        responses
    }

    async fn handle_single_message(&self, incoming: Value) -> Option<Value> {
        let Some(obj) = incoming.as_object() else {
            return Some(error_response(
                Value::Null,
                RpcError::invalid_request("Request must be a JSON object"),
            ));
        };

        if obj.get("jsonrpc").and_then(Value::as_str) != Some("2.0") {
            let id = obj.get("id").cloned().unwrap_or(Value::Null);
            return Some(error_response(
                id,
                RpcError::invalid_request("jsonrpc must be '2.0'"),
            ));
        }

        let Some(method) = obj.get("method").and_then(Value::as_str) else {
            // A client response; this server never issues requests.
            return None;
        };

        let params = obj.get("params").cloned().unwrap_or(Value::Null);
        if let Some(id) = obj.get("id").cloned() {
            debug!(method, "request");
            Some(match self.handle_request(method, params).await {
                Ok(payload) => success_response(id, payload),
                Err(err) => error_response(id, err),
            })
        } else {
            debug!(method, "notification ignored");
            None
        }
    }

    async fn handle_request(&self, method: &str, params: Value) -> Result<Value, RpcError> {
        match method {
            "initialize" => Ok(self.initialize_payload()),
            "ping" => Ok(json!({})),
            "tools/list" => Ok(tools_list_payload()),
            "tools/call" => self.handle_tools_call(params).await,
            "resources/list" => Ok(json!({ "resources": [] })),
            "prompts/list" => Ok(json!({ "prompts": [] })),
            _ => Err(RpcError::method_not_found(method)),
        }
    }

    fn initialize_payload(&self) -> Value {
        let instructions = if self.status.connected {
            "Salesforce tools are live. Use get_object_fields or get_field_details to learn API names before writing SOQL or records; field metadata is cached per object until clear_field_cache is called."
        } else {
            "Salesforce connection is not established; every org-bound tool will return a not_connected error until the server is restarted with valid credentials."
        };
        json!({
            "protocolVersion": MCP_PROTOCOL_VERSION,
            "capabilities": {
                "tools": { "listChanged": false },
                "resources": { "listChanged": false },
                "prompts": { "listChanged": false }
            },
            "serverInfo": {
                "name": MCP_SERVER_NAME,
                "version": env!("CARGO_PKG_VERSION")
            },
            "instructions": instructions,
            "connectionStatus": self.status
        })
    }

    async fn handle_tools_call(&self, params: Value) -> Result<Value, RpcError> {
        let params = params
            .as_object()
            .ok_or_else(|| RpcError::invalid_params("tools/call params must be an object"))?;

        let name = params
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::invalid_params("tools/call requires string field 'name'"))?;

        let args = match params.get("arguments") {
            Some(Value::Object(map)) => map.clone(),
            Some(Value::Null) | None => Map::new(),
            Some(_) => {
                return Err(RpcError::invalid_params(
                    "tools/call 'arguments' must be an object",
                ));
            }
        };

        if find_tool(name).is_none() {
            let mut data = json!({ "tool": name });
            if let Some(suggestion) = closest_tool_name(name) {
                data["suggestion"] = json!(suggestion);
            }
            return Err(RpcError::invalid_params(format!("Unknown tool: {name}")).with_data(data));
        }

        let started = Instant::now();
        let response = match self.dispatcher.call(name, &args).await {
            Ok(text) => {
                info!(
                    tool = name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "tool call succeeded"
                );
                json!({
                    "content": [{ "type": "text", "text": text }]
                })
            }
            Err(err) => {
                warn!(
                    tool = name,
                    code = %err.code,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "tool call failed: {}",
                    err.message
                );
                let payload = err.to_value();
                json!({
                    "isError": true,
                    "content": [{ "type": "text", "text": to_pretty_json(&payload) }],
                    "structuredContent": payload
                })
            }
        };
        Ok(response)
    }
}

fn success_response(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result
    })
}

fn error_response(id: Value, error: RpcError) -> Value {
    let mut payload = json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": {
            "code": error.code,
            "message": error.message
        }
    });
    if let Some(data) = error.data {
        payload["error"]["data"] = data;
    }
    payload
}

/// Next message and the framing it arrived in. `Ok(None)` on clean EOF; the
/// inner `Err` carries a JSON parse failure to answer with -32700.
async fn read_message<R>(
    reader: &mut R,
) -> Result<Option<(Result<Value, String>, Framing)>, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if let Some(length) = content_length_header(trimmed)? {
            skip_remaining_headers(reader).await?;
            let mut payload = vec![0_u8; length];
            reader.read_exact(&mut payload).await?;
            let parsed = serde_json::from_slice(&payload).map_err(|e| format!("Parse error: {e}"));
            return Ok(Some((parsed, Framing::ContentLength)));
        }

        let parsed = serde_json::from_str(trimmed).map_err(|e| format!("Parse error: {e}"));
        return Ok(Some((parsed, Framing::Lines)));
    }
}

fn content_length_header(line: &str) -> Result<Option<usize>, std::io::Error> {
    let Some((name, value)) = line.split_once(':') else {
        return Ok(None);
    };
    if !name.trim().eq_ignore_ascii_case("content-length") {
        return Ok(None);
    }
    let length = value.trim().parse::<usize>().map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Invalid Content-Length header",
        )
    })?;
    if length > MAX_MESSAGE_BYTES {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Content-Length {length} exceeds the {MAX_MESSAGE_BYTES} byte limit"),
        ));
    }
    Ok(Some(length))
}

async fn skip_remaining_headers<R>(reader: &mut R) -> Result<(), std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).await? == 0 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "Unexpected EOF while reading MCP headers",
            ));
        }
        if line.trim().is_empty() {
            return Ok(());
        }
    }
}

async fn write_message<W>(writer: &mut W, value: &Value, framing: Framing) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin,
{
    let body = serde_json::to_vec(value).map_err(|e| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("Failed to serialize JSON: {e}"),
        )
    })?;
    match framing {
        Framing::Lines => {
            writer.write_all(&body).await?;
            writer.write_all(b"\n").await?;
        }
        Framing::ContentLength => {
            let header = format!(
                "Content-Length: {}\r\nContent-Type: application/json\r\n\r\n",
                body.len()
            );
            writer.write_all(header.as_bytes()).await?;
            writer.write_all(&body).await?;
        }
    }
    writer.flush().await
}
