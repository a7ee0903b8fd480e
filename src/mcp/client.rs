//! MCP Client
//!
//! Talks to an MCP server over newline-delimited JSON-RPC, either a child
//! process spawned with piped stdio or any in-memory reader/writer pair.

use crate::mcp::errors::McpError;
use crate::mcp::protocol::{
    CallToolParams, CallToolResult, Implementation, InitializeResult, JsonRpcMessage,
    JsonRpcNotification, JsonRpcRequest, ListResourcesResult, ListToolsResult, MCP_VERSION,
    ReadResourceParams, ReadResourceResult, RequestId, Resource, Tool,
};
use crate::mcp::server::send_message;
use anyhow::{Context, Result, anyhow};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader, Lines};
use tokio::process::{Child, Command};
use tracing::{debug, info, warn};

type BoxedReader = Box<dyn AsyncRead + Unpin + Send>;
type BoxedWriter = Box<dyn AsyncWrite + Unpin + Send>;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub struct McpClient {
    reader: Lines<BufReader<BoxedReader>>,
    writer: BoxedWriter,
    child: Option<Child>,
    next_id: i64,
    server_info: Option<Implementation>,
}

impl McpClient {
    /// Spawn `command` with piped stdio and complete the initialize handshake
    #[inline]
    pub async fn spawn(command: &str, args: &[String]) -> Result<Self> {
        info!("Spawning MCP server: {} {}", command, args.join(" "));

        let mut child = Command::new(command)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("Failed to spawn MCP server '{}'", command))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("MCP server stdin was not piped"))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| anyhow!("MCP server stdout was not piped"))?;

        let mut client = Self::new(Box::new(stdout), Box::new(stdin));
        client.child = Some(child);
        client.initialize().await?;
        Ok(client)
    }

    /// Connect over an existing transport and complete the initialize handshake
    #[inline]
    pub async fn connect<R, W>(reader: R, writer: W) -> Result<Self>
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut client = Self::new(Box::new(reader), Box::new(writer));
        client.initialize().await?;
        Ok(client)
    }

    fn new(reader: BoxedReader, writer: BoxedWriter) -> Self {
        Self {
            reader: BufReader::new(reader).lines(),
            writer,
            child: None,
            next_id: 1,
            server_info: None,
        }
    }

    /// Server identity reported during the handshake
    #[inline]
    pub fn server_info(&self) -> Option<&Implementation> {
        self.server_info.as_ref()
    }

    async fn initialize(&mut self) -> Result<()> {
        let result: InitializeResult = self
            .request(
                "initialize",
                json!({
                    "protocolVersion": MCP_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": concat!(env!("CARGO_PKG_NAME"), "-relay"),
                        "version": env!("CARGO_PKG_VERSION"),
                    }
                }),
            )
            .await
            .context("MCP initialize handshake failed")?;

        info!(
            "Connected to MCP server {} {} (protocol {})",
            result.server_info.name, result.server_info.version, result.protocol_version
        );
        self.server_info = Some(result.server_info);

        self.notify("notifications/initialized").await
    }

    #[inline]
    pub async fn list_tools(&mut self) -> Result<Vec<Tool>> {
        let result: ListToolsResult = self.request("tools/list", json!({})).await?;
        Ok(result.tools)
    }

    #[inline]
    pub async fn call_tool(
        &mut self,
        name: &str,
        arguments: Map<String, Value>,
    ) -> Result<CallToolResult> {
        let params = CallToolParams {
            name: name.to_string(),
            arguments: Some(arguments),
        };
        self.request("tools/call", params).await
    }

    #[inline]
    pub async fn list_resources(&mut self) -> Result<Vec<Resource>> {
        let result: ListResourcesResult = self.request("resources/list", json!({})).await?;
        Ok(result.resources)
    }

    #[inline]
    pub async fn read_resource(&mut self, uri: &str) -> Result<ReadResourceResult> {
        let params = ReadResourceParams {
            uri: uri.to_string(),
        };
        self.request("resources/read", params).await
    }

    /// Close the transport and wait for a spawned server to exit
    #[inline]
    pub async fn shutdown(self) -> Result<()> {
        let Self {
            writer, mut child, ..
        } = self;
        drop(writer);

        if let Some(child) = child.as_mut() {
            match tokio::time::timeout(SHUTDOWN_GRACE, child.wait()).await {
                Ok(status) => {
                    let status = status.context("Failed to wait for MCP server")?;
                    debug!("MCP server exited with {}", status);
                }
                Err(_) => {
                    warn!("MCP server did not exit after closing stdin, killing it");
                    child.kill().await.context("Failed to kill MCP server")?;
                }
            }
        }
        Ok(())
    }

    async fn request<P, T>(&mut self, method: &str, params: P) -> Result<T>
    where
        P: Serialize,
        T: DeserializeOwned,
    {
        let id = RequestId::Number(self.next_id);
        self.next_id += 1;

        let request = JsonRpcRequest::new(method, Some(serde_json::to_value(params)?), id.clone());
        debug!("-> {} ({:?})", method, id);
        send_message(&mut self.writer, &JsonRpcMessage::Request(request)).await?;

        let result = tokio::time::timeout(REQUEST_TIMEOUT, self.await_response(&id))
            .await
            .map_err(|_| anyhow!("Timed out waiting for {} response", method))??;

        serde_json::from_value(result)
            .with_context(|| format!("Unexpected {} result shape", method))
    }

    async fn notify(&mut self, method: &str) -> Result<()> {
        let notification = JsonRpcNotification::new(method, None);
        send_message(
            &mut self.writer,
            &JsonRpcMessage::Notification(notification),
        )
        .await
    }

    /// Read until the response to `id` arrives, skipping anything else
    async fn await_response(&mut self, id: &RequestId) -> Result<Value> {
        loop {
            let Some(line) = self.reader.next_line().await? else {
                return Err(McpError::ConnectionClosed.into());
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcMessage>(line) {
                Ok(JsonRpcMessage::Response(response)) if response.id == *id => {
                    return Ok(response.result);
                }
                Ok(JsonRpcMessage::ErrorResponse(response))
                    if response.id.as_ref().is_none_or(|rid| rid == id) =>
                {
                    return Err(McpError::Remote {
                        code: response.error.code,
                        message: response.error.message,
                    }
                    .into());
                }
                Ok(other) => debug!("Skipping unrelated message: {:?}", other),
                Err(e) => warn!("Ignoring unreadable line from server: {}", e),
            }
        }
    }
}
