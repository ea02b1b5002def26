use crate::config::ToolServerConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::error::Error;
use std::fmt;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum ExecError {
    /// The database rejected the statement; the message is fed back to the
    /// model for another drafting round.
    Sql(String),
    /// The tool server is unreachable or broke the protocol. Not retryable.
    Protocol(String),
}

impl fmt::Display for ExecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecError::Sql(msg) => write!(f, "SQL error: {}", msg),
            ExecError::Protocol(msg) => write!(f, "Tool server error: {}", msg),
        }
    }
}

impl Error for ExecError {}

/// Tabular result of one executed statement: ordered columns, ordered rows.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

/// The one capability the agent needs from the tool server: run a single
/// statement, get rows or an error back.
#[async_trait]
pub trait QueryExecutor: Send {
    async fn run_query(&mut self, sql: &str) -> Result<QueryResult, ExecError>;
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    result: Option<Value>,
    error: Option<JsonRpcError>,
    id: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// JSON-RPC 2.0 client for an MCP tool server spoken to over the child
/// process's stdio, one message per line. The child is killed when the
/// client is dropped, so no exit path can leak the connection.
pub struct ToolServerClient {
    // Held so the server lives exactly as long as the client; kill_on_drop
    // reaps it on any exit path.
    _child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: u64,
    timeout: Duration,
}

impl ToolServerClient {
    /// Spawn the configured server command and run the initialize handshake.
    pub async fn connect(config: &ToolServerConfig) -> Result<Self, ExecError> {
        info!(
            "Starting tool server: {} {}",
            config.command,
            config.args.join(" ")
        );

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ExecError::Protocol(format!("failed to start {}: {}", config.command, e))
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| ExecError::Protocol("tool server stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecError::Protocol("tool server stdout unavailable".to_string()))?;

        let mut client = Self {
            _child: child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 0,
            timeout: Duration::from_secs(config.timeout_secs),
        };

        client.initialize().await?;
        Ok(client)
    }

    async fn initialize(&mut self) -> Result<(), ExecError> {
        let reply = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": "2024-11-05",
                    "capabilities": {},
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                }),
            )
            .await?
            .map_err(|msg| ExecError::Protocol(format!("initialize rejected: {}", msg)))?;
        debug!("Tool server initialize result: {}", reply);

        self.notify("notifications/initialized", json!({})).await?;

        // Surface what the server offers; useful when the configured command
        // points at the wrong server.
        match self.request("tools/list", json!({})).await? {
            Ok(result) => {
                let names: Vec<String> = result
                    .get("tools")
                    .and_then(|t| t.as_array())
                    .map(|tools| {
                        tools
                            .iter()
                            .filter_map(|t| t.get("name").and_then(|n| n.as_str()))
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                info!("Connected to tool server, available tools: {:?}", names);
            }
            Err(msg) => warn!("tools/list failed: {}", msg),
        }

        Ok(())
    }

    /// Send a request and wait for the matching response, bounded by the
    /// configured timeout. The outer error is transport failure; the inner
    /// one is a JSON-RPC error returned by the server.
    async fn request(
        &mut self,
        method: &str,
        params: Value,
    ) -> Result<Result<Value, String>, ExecError> {
        self.next_id += 1;
        let id = self.next_id;

        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: Some(params),
            id: Some(json!(id)),
        };
        let line = serde_json::to_string(&request)
            .map_err(|e| ExecError::Protocol(format!("failed to encode request: {}", e)))?;

        let deadline = self.timeout;
        timeout(deadline, self.send_and_wait(line, id))
            .await
            .map_err(|_| {
                ExecError::Protocol(format!(
                    "tool server did not answer within {}s",
                    deadline.as_secs()
                ))
            })?
    }

    async fn send_and_wait(
        &mut self,
        line: String,
        id: u64,
    ) -> Result<Result<Value, String>, ExecError> {
        self.write_line(&line).await?;

        loop {
            let line = self
                .stdout
                .next_line()
                .await
                .map_err(|e| ExecError::Protocol(format!("failed to read from tool server: {}", e)))?
                .ok_or_else(|| ExecError::Protocol("tool server closed its stdout".to_string()))?;

            if line.trim().is_empty() {
                continue;
            }

            let response: JsonRpcResponse = match serde_json::from_str(&line) {
                Ok(r) => r,
                Err(e) => {
                    warn!("Skipping unparseable line from tool server: {}", e);
                    continue;
                }
            };

            // Server-initiated notifications and stale responses are not for
            // us; keep reading until our id comes back.
            if response.id.as_ref().and_then(Value::as_u64) != Some(id) {
                debug!("Ignoring tool server message with id {:?}", response.id);
                continue;
            }

            if let Some(error) = response.error {
                return Ok(Err(format!("{} (code {})", error.message, error.code)));
            }

            return Ok(Ok(response.result.unwrap_or(Value::Null)));
        }
    }

    async fn notify(&mut self, method: &str, params: Value) -> Result<(), ExecError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params: Some(params),
            id: None,
        };
        let line = serde_json::to_string(&request)
            .map_err(|e| ExecError::Protocol(format!("failed to encode notification: {}", e)))?;
        self.write_line(&line).await
    }

    async fn write_line(&mut self, line: &str) -> Result<(), ExecError> {
        self.stdin
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ExecError::Protocol(format!("failed to write to tool server: {}", e)))?;
        self.stdin
            .write_all(b"\n")
            .await
            .map_err(|e| ExecError::Protocol(format!("failed to write to tool server: {}", e)))?;
        self.stdin
            .flush()
            .await
            .map_err(|e| ExecError::Protocol(format!("failed to flush tool server stdin: {}", e)))
    }
}

#[async_trait]
impl QueryExecutor for ToolServerClient {
    async fn run_query(&mut self, sql: &str) -> Result<QueryResult, ExecError> {
        debug!("Executing through tool server: {}", sql);

        let reply = self
            .request(
                "tools/call",
                json!({ "name": "query", "arguments": { "sql": sql } }),
            )
            .await?;

        match reply {
            Ok(result) => parse_tool_result(&result),
            // The server answered; a JSON-RPC error here is its verdict on
            // the statement, so it goes back to the model.
            Err(message) => Err(ExecError::Sql(message)),
        }
    }
}

/// Decode an MCP tool result into a tabular QueryResult. The payload is a
/// content block whose text is JSON: an array of row objects, an object
/// with an "error" field, or a bare value for scalar results.
fn parse_tool_result(result: &Value) -> Result<QueryResult, ExecError> {
    let is_error = result
        .get("isError")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    let text = result
        .get("content")
        .and_then(|c| c.as_array())
        .and_then(|blocks| blocks.first())
        .and_then(|block| block.get("text"))
        .and_then(Value::as_str)
        .ok_or_else(|| ExecError::Protocol("tool result carried no text content".to_string()))?;

    let data: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) if is_error => return Err(ExecError::Sql(text.trim().to_string())),
        Err(e) => {
            return Err(ExecError::Protocol(format!(
                "unexpected tool result payload: {}",
                e
            )))
        }
    };

    if let Some(message) = error_message(&data) {
        return Err(ExecError::Sql(message));
    }
    if is_error {
        return Err(ExecError::Sql(text.trim().to_string()));
    }

    match data {
        Value::Array(items) => Ok(rows_from_items(items)),
        Value::Null => Ok(QueryResult {
            columns: Vec::new(),
            rows: Vec::new(),
        }),
        other => Ok(rows_from_items(vec![other])),
    }
}

fn error_message(data: &Value) -> Option<String> {
    let error = data.get("error")?;
    match error {
        Value::String(msg) => Some(msg.clone()),
        other => other
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or_else(|| Some(other.to_string())),
    }
}

/// Column order comes from the first row object; later rows may miss keys
/// and get nulls. Non-object rows become a single "value" column.
fn rows_from_items(items: Vec<Value>) -> QueryResult {
    let columns: Vec<String> = match items.first() {
        Some(Value::Object(first)) => first.keys().cloned().collect(),
        Some(_) => vec!["value".to_string()],
        None => Vec::new(),
    };

    let rows = items
        .into_iter()
        .map(|item| match item {
            Value::Object(mut obj) => columns
                .iter()
                .map(|col| obj.remove(col).unwrap_or(Value::Null))
                .collect(),
            other => vec![other],
        })
        .collect();

    QueryResult { columns, rows }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_result(text: &str, is_error: bool) -> Value {
        json!({
            "content": [{ "type": "text", "text": text }],
            "isError": is_error,
        })
    }

    #[test]
    fn parses_row_objects_in_order() {
        let payload = r#"[{"first_name":"Ada","last_name":"Lovelace"},{"first_name":"Alan","last_name":"Turing"}]"#;
        let result = parse_tool_result(&tool_result(payload, false)).unwrap();
        assert_eq!(result.columns, vec!["first_name", "last_name"]);
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0][0], json!("Ada"));
        assert_eq!(result.rows[1][1], json!("Turing"));
    }

    #[test]
    fn parses_scalar_result_as_single_row() {
        let result = parse_tool_result(&tool_result("42", false)).unwrap();
        assert_eq!(result.columns, vec!["value"]);
        assert_eq!(result.rows, vec![vec![json!(42)]]);
    }

    #[test]
    fn empty_array_is_an_empty_result() {
        let result = parse_tool_result(&tool_result("[]", false)).unwrap();
        assert!(result.columns.is_empty());
        assert!(result.rows.is_empty());
    }

    #[test]
    fn error_object_surfaces_as_sql_error() {
        let payload = r#"{"error":"column \"nam\" does not exist"}"#;
        let err = parse_tool_result(&tool_result(payload, false)).unwrap_err();
        match err {
            ExecError::Sql(msg) => assert!(msg.contains("does not exist")),
            other => panic!("expected Sql error, got {:?}", other),
        }
    }

    #[test]
    fn is_error_flag_with_plain_text_surfaces_as_sql_error() {
        let err = parse_tool_result(&tool_result("syntax error at or near \"FORM\"", true))
            .unwrap_err();
        assert!(matches!(err, ExecError::Sql(_)));
    }

    #[test]
    fn missing_content_is_a_protocol_error() {
        let err = parse_tool_result(&json!({ "isError": false })).unwrap_err();
        assert!(matches!(err, ExecError::Protocol(_)));
    }

    #[test]
    fn rows_with_missing_keys_get_nulls() {
        let payload = r#"[{"code":"CS201","title":"Algorithms"},{"code":"MATH101"}]"#;
        let result = parse_tool_result(&tool_result(payload, false)).unwrap();
        assert_eq!(result.rows[1], vec![json!("MATH101"), Value::Null]);
    }

    #[test]
    fn decodes_json_rpc_error_response() {
        let line = r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"Method not found"},"id":7}"#;
        let response: JsonRpcResponse = serde_json::from_str(line).unwrap();
        assert_eq!(response.id.as_ref().and_then(Value::as_u64), Some(7));
        assert_eq!(response.error.unwrap().code, -32601);
    }
}
